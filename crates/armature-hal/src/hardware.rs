//! The [`HardwareInterface`] capability and its single-owner
//! [`HardwareHandle`].
//!
//! Vendor drivers (CAN transport plus robot protocol) implement
//! [`HardwareInterface`].  The arm driver component never holds a raw driver:
//! it acquires a [`HardwareHandle`], which opens and initialises the device
//! and guarantees the transport is closed again on every exit path, whether
//! that is an explicit [`HardwareHandle::release`], an early return out of a
//! failed configure, or a plain drop.

use std::fmt;

use armature_types::{ArmError, JointVector};
use tracing::{debug, warn};

/// Actuator mode of the arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmMode {
    /// Brakes engaged, torque commands ignored.
    #[default]
    Idle,
    /// Motors live, torque commands applied.
    Activated,
}

/// Pendant thresholds the device enforces on its own.
///
/// Warnings light the pendant; faults shut the arm down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyThreshold {
    VelocityWarning,
    VelocityFault,
    TorqueWarning,
    TorqueFault,
}

impl fmt::Display for SafetyThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SafetyThreshold::VelocityWarning => "velocity-warning",
            SafetyThreshold::VelocityFault => "velocity-fault",
            SafetyThreshold::TorqueWarning => "torque-warning",
            SafetyThreshold::TorqueFault => "torque-fault",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SafetyThreshold {
    type Err = ArmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "velocity-warning" => Ok(SafetyThreshold::VelocityWarning),
            "velocity-fault" => Ok(SafetyThreshold::VelocityFault),
            "torque-warning" => Ok(SafetyThreshold::TorqueWarning),
            "torque-fault" => Ok(SafetyThreshold::TorqueFault),
            other => Err(ArmError::Configuration(format!(
                "unknown safety threshold '{other}'"
            ))),
        }
    }
}

/// Parameters passed to [`HardwareInterface::initialize`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub degrees_of_freedom: usize,
}

/// Low-level access to one physical manipulator.
///
/// Every call is expected to return within one control cycle; timeouts are
/// the implementation's concern.
pub trait HardwareInterface: Send {
    /// Open the transport at `device_id` (e.g. `"rtcan0"`).
    fn open(&mut self, device_id: &str) -> Result<(), ArmError>;

    /// Close the transport.
    fn close(&mut self) -> Result<(), ArmError>;

    /// Bring up the robot session on an open transport.
    fn initialize(&mut self, config: &DeviceConfig) -> Result<(), ArmError>;

    /// Read the measured joint positions into `positions`.
    fn get_positions(&mut self, positions: &mut JointVector) -> Result<(), ArmError>;

    /// Command joint torques.
    fn set_torques(&mut self, torques: &JointVector) -> Result<(), ArmError>;

    fn set_mode(&mut self, mode: ArmMode) -> Result<(), ArmError>;

    /// Declare `positions` to be the arm's current joint angles (encoder
    /// zero reference).
    fn set_positions(&mut self, positions: &JointVector) -> Result<(), ArmError>;

    fn set_safety_threshold(&mut self, kind: SafetyThreshold, value: f64) -> Result<(), ArmError>;
}

/// Exclusive owner of an opened and initialised [`HardwareInterface`].
pub struct HardwareHandle {
    device_id: String,
    device: Box<dyn HardwareInterface>,
    open: bool,
}

impl HardwareHandle {
    /// Open `device` on `device_id` and initialise it.
    ///
    /// # Errors
    ///
    /// Returns the failing call's error.  If `open` succeeded but
    /// `initialize` failed, the transport has already been closed again.
    pub fn acquire(
        mut device: Box<dyn HardwareInterface>,
        device_id: &str,
        config: &DeviceConfig,
    ) -> Result<Self, ArmError> {
        device.open(device_id)?;
        let mut handle = Self {
            device_id: device_id.to_string(),
            device,
            open: true,
        };
        // Dropping `handle` on error closes the transport.
        handle.device.initialize(config)?;
        debug!(device = %handle.device_id, "hardware handle acquired");
        Ok(handle)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn get_positions(&mut self, positions: &mut JointVector) -> Result<(), ArmError> {
        self.device.get_positions(positions)
    }

    pub fn set_torques(&mut self, torques: &JointVector) -> Result<(), ArmError> {
        self.device.set_torques(torques)
    }

    pub fn set_mode(&mut self, mode: ArmMode) -> Result<(), ArmError> {
        self.device.set_mode(mode)
    }

    pub fn set_positions(&mut self, positions: &JointVector) -> Result<(), ArmError> {
        self.device.set_positions(positions)
    }

    pub fn set_safety_threshold(&mut self, kind: SafetyThreshold, value: f64) -> Result<(), ArmError> {
        self.device.set_safety_threshold(kind, value)
    }

    /// Close the transport and give up the device.
    ///
    /// # Errors
    ///
    /// Returns the driver's `close` error.  The device is released either way.
    pub fn release(mut self) -> Result<(), ArmError> {
        self.close_once()
    }

    fn close_once(&mut self) -> Result<(), ArmError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        debug!(device = %self.device_id, "closing hardware handle");
        self.device.close()
    }
}

impl Drop for HardwareHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close_once() {
            warn!(device = %self.device_id, error = %e, "failed to close device");
        }
    }
}
