//! In-process simulated arm for tests and headless runs.
//!
//! [`SimArm`] implements [`HardwareInterface`] on top of a unit-inertia,
//! viscously damped joint model.  All observable state lives in a shared
//! [`SimArmState`], so a test can keep a [`SimHandle`] to inspect what the
//! driver commanded and to inject faults after the arm has been handed over.
//!
//! # Example
//!
//! ```rust
//! use armature_hal::hardware::{DeviceConfig, HardwareHandle};
//! use armature_hal::sim::SimArm;
//!
//! let arm = SimArm::new();
//! let sim = arm.handle();
//! let handle = HardwareHandle::acquire(
//!     Box::new(arm),
//!     "sim0",
//!     &DeviceConfig { degrees_of_freedom: 4 },
//! )
//! .expect("sim arm must open");
//! assert_eq!(sim.state().open_device.as_deref(), Some("sim0"));
//! drop(handle);
//! assert!(sim.state().open_device.is_none());
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use armature_types::{ArmError, JointVector};
use tracing::debug;

use crate::hardware::{ArmMode, DeviceConfig, HardwareInterface, SafetyThreshold};

const DEVICE: &str = "sim";

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    pub open: bool,
    pub initialize: bool,
    pub read: bool,
    pub write: bool,
    pub set_mode: bool,
    pub calibrate: bool,
    pub close: bool,
}

/// Everything the simulated arm has observed.
#[derive(Debug, Clone, Default)]
pub struct SimArmState {
    pub open_device: Option<String>,
    pub initialized: bool,
    pub mode: ArmMode,
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    /// Most recent torque vector passed to `set_torques`.
    pub last_torques: Option<JointVector>,
    pub torque_writes: usize,
    pub position_reads: usize,
    pub calibrations: Vec<JointVector>,
    pub thresholds: Vec<(SafetyThreshold, f64)>,
    pub close_calls: usize,
    pub faults: SimFaults,
}

/// Cloneable view onto a [`SimArm`]'s state.
#[derive(Debug, Clone, Default)]
pub struct SimHandle(Arc<Mutex<SimArmState>>);

impl SimHandle {
    /// Lock the state.  A poisoned lock is recovered, the state is plain data.
    pub fn state(&self) -> MutexGuard<'_, SimArmState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_faults(&self, faults: SimFaults) {
        self.state().faults = faults;
    }

    /// Overwrite the simulated joint positions, e.g. to fake an external push.
    pub fn set_positions(&self, positions: &[f64]) {
        let mut state = self.state();
        state.positions = positions.to_vec();
        state.velocities = vec![0.0; positions.len()];
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated arm
// ────────────────────────────────────────────────────────────────────────────

/// Simulated torque-controlled arm.
///
/// Each `get_positions` call advances the model by `dt` seconds.  While the
/// arm is [`ArmMode::Idle`] the brakes hold every joint still.
#[derive(Debug)]
pub struct SimArm {
    shared: SimHandle,
    dt: f64,
    damping: f64,
}

impl Default for SimArm {
    fn default() -> Self {
        Self::new()
    }
}

impl SimArm {
    /// A simulated arm stepping at 500 Hz with light damping.
    pub fn new() -> Self {
        Self::with_dynamics(0.002, 0.5)
    }

    pub fn with_dynamics(dt: f64, damping: f64) -> Self {
        Self {
            shared: SimHandle::default(),
            dt,
            damping,
        }
    }

    /// A new arm object backed by existing shared state, as a device factory
    /// would produce on every (re)configure.
    pub fn attached(shared: SimHandle) -> Self {
        Self {
            shared,
            ..Self::new()
        }
    }

    pub fn with_faults(self, faults: SimFaults) -> Self {
        self.shared.set_faults(faults);
        self
    }

    /// Handle sharing this arm's state.
    pub fn handle(&self) -> SimHandle {
        self.shared.clone()
    }

    fn step(state: &mut SimArmState, dt: f64, damping: f64) {
        if state.mode != ArmMode::Activated {
            state.velocities.iter_mut().for_each(|v| *v = 0.0);
            return;
        }
        let torques = state.last_torques.clone().unwrap_or_default();
        let SimArmState {
            positions,
            velocities,
            ..
        } = state;
        for (i, (q, qd)) in positions.iter_mut().zip(velocities.iter_mut()).enumerate() {
            let tau = torques.as_slice().get(i).copied().unwrap_or(0.0);
            *qd += (tau - damping * *qd) * dt;
            *q += *qd * dt;
        }
    }
}

fn require_initialized(state: &SimArmState) -> Result<(), ArmError> {
    if state.open_device.is_none() {
        return Err(ArmError::NotConnected(DEVICE.to_string()));
    }
    if !state.initialized {
        return Err(ArmError::hardware(DEVICE, "robot session not initialised"));
    }
    Ok(())
}

fn check_dof(state: &SimArmState, len: usize) -> Result<(), ArmError> {
    if len != state.positions.len() {
        return Err(ArmError::DofMismatch {
            expected: state.positions.len(),
            actual: len,
        });
    }
    Ok(())
}

impl HardwareInterface for SimArm {
    fn open(&mut self, device_id: &str) -> Result<(), ArmError> {
        let mut state = self.shared.state();
        if state.faults.open {
            return Err(ArmError::hardware(device_id, "cannot open transport"));
        }
        debug!(device = device_id, "sim arm opened");
        state.open_device = Some(device_id.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), ArmError> {
        let mut state = self.shared.state();
        state.close_calls += 1;
        state.open_device = None;
        state.initialized = false;
        state.mode = ArmMode::Idle;
        if state.faults.close {
            return Err(ArmError::hardware(DEVICE, "transport close failed"));
        }
        Ok(())
    }

    fn initialize(&mut self, config: &DeviceConfig) -> Result<(), ArmError> {
        let mut state = self.shared.state();
        if state.open_device.is_none() {
            return Err(ArmError::NotConnected(DEVICE.to_string()));
        }
        if state.faults.initialize {
            return Err(ArmError::hardware(DEVICE, "no pucks answered"));
        }
        let dof = config.degrees_of_freedom;
        if state.positions.len() != dof {
            state.positions = vec![0.0; dof];
        }
        state.velocities = vec![0.0; dof];
        state.initialized = true;
        Ok(())
    }

    fn get_positions(&mut self, positions: &mut JointVector) -> Result<(), ArmError> {
        let mut state = self.shared.state();
        require_initialized(&state)?;
        if state.faults.read {
            return Err(ArmError::hardware(DEVICE, "position read timed out"));
        }
        check_dof(&state, positions.len())?;
        Self::step(&mut state, self.dt, self.damping);
        positions.as_mut_slice().copy_from_slice(&state.positions);
        state.position_reads += 1;
        Ok(())
    }

    fn set_torques(&mut self, torques: &JointVector) -> Result<(), ArmError> {
        let mut state = self.shared.state();
        require_initialized(&state)?;
        if state.faults.write {
            return Err(ArmError::hardware(DEVICE, "torque write rejected"));
        }
        check_dof(&state, torques.len())?;
        state.last_torques = Some(torques.clone());
        state.torque_writes += 1;
        Ok(())
    }

    fn set_mode(&mut self, mode: ArmMode) -> Result<(), ArmError> {
        let mut state = self.shared.state();
        require_initialized(&state)?;
        if state.faults.set_mode {
            return Err(ArmError::hardware(DEVICE, "mode change refused"));
        }
        state.mode = mode;
        Ok(())
    }

    fn set_positions(&mut self, positions: &JointVector) -> Result<(), ArmError> {
        let mut state = self.shared.state();
        require_initialized(&state)?;
        if state.faults.calibrate {
            return Err(ArmError::hardware(DEVICE, "calibration rejected"));
        }
        check_dof(&state, positions.len())?;
        state.positions = positions.as_slice().to_vec();
        state.velocities.iter_mut().for_each(|v| *v = 0.0);
        state.calibrations.push(positions.clone());
        Ok(())
    }

    fn set_safety_threshold(&mut self, kind: SafetyThreshold, value: f64) -> Result<(), ArmError> {
        let mut state = self.shared.state();
        require_initialized(&state)?;
        state.thresholds.push((kind, value));
        Ok(())
    }
}
