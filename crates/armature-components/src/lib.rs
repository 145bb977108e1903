//! `armature-components` – the two components of the arm control path.
//!
//! - [`driver`] – [`ArmDriver`], the hardware interface component, and its
//!   remote [`ArmDriverHandle`].
//! - [`mux`] – [`ControllerMux`], which blends the torque outputs of
//!   dynamically loaded controllers, and its remote [`MuxHandle`].
//! - [`telemetry`] – `tracing` subscriber and OTLP exporter setup.

pub mod driver;
pub mod mux;
pub mod telemetry;

pub use driver::{ArmDriver, ArmDriverHandle, DeviceFactory, DriverConfig};
pub use mux::{ControllerInfo, ControllerMux, MuxCommand, MuxConfig, MuxHandle};
