//! `armature-hal` – hardware and robot-model seams for the arm stack.
//!
//! # Modules
//!
//! - [`hardware`] – the [`HardwareInterface`][hardware::HardwareInterface]
//!   trait every vendor driver implements, plus the RAII
//!   [`HardwareHandle`][hardware::HardwareHandle] that owns an opened device.
//! - [`sim`] – [`SimArm`][sim::SimArm], a damped simulated arm with fault
//!   injection for tests and headless runs.
//! - [`kinematics`] – [`KinematicsProvider`][kinematics::KinematicsProvider]
//!   and its URDF-backed implementation.

pub mod hardware;
pub mod kinematics;
pub mod sim;

pub use hardware::{ArmMode, DeviceConfig, HardwareHandle, HardwareInterface, SafetyThreshold};
pub use kinematics::{FixedChain, KinematicChain, KinematicsProvider, UrdfKinematics};
pub use sim::{SimArm, SimArmState, SimFaults, SimHandle};
