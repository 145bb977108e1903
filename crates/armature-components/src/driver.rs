//! [`ArmDriver`] – the hardware interface component.
//!
//! Owns the connection to one torque-controlled arm.  Every cycle it reads
//! the measured joint positions, forwards the newest torque command (if one
//! arrived), republishes the positions and, at most once per
//! `joint_state_throttle_period`, a [`JointStateSnapshot`].
//!
//! | Port | Direction | Type | Required to start |
//! |---|---|---|---|
//! | `torques_in` | in | [`JointVector`] | yes |
//! | `positions_out` | out | [`JointVector`] | no (warning) |
//! | `joint_state_out` | out | [`JointStateSnapshot`] | no |

use std::ops::Deref;
use std::time::Duration;

use armature_hal::{ArmMode, DeviceConfig, HardwareHandle, HardwareInterface, SafetyThreshold};
use armature_kernel::{ActivityHandle, Component, Throttle, VelocityEstimator};
use armature_middleware::{InputPort, OutputPort, PortLink};
use armature_types::{
    ArmError, JointStateSnapshot, JointVector, LifecycleState, canonical_joint_names, validate_dof,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Builds a fresh, unopened device each time the driver is configured.
pub type DeviceFactory = Box<dyn FnMut() -> Box<dyn HardwareInterface> + Send>;

/// States in which device operations may be invoked remotely.
const DEVICE_OPS: [LifecycleState; 2] = [LifecycleState::Configured, LifecycleState::Running];

/// Driver settings, fixed before `configure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// 4 or 7.
    pub degrees_of_freedom: usize,
    pub device_identifier: String,
    /// Prepended to the canonical joint names in published snapshots.
    pub joint_name_prefix: String,
    /// Encoder reference applied during `configure`; zeros when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_positions: Option<Vec<f64>>,
    /// Minimum seconds between two joint state snapshots.
    pub joint_state_throttle_period: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            degrees_of_freedom: 7,
            device_identifier: "rtcan0".to_string(),
            joint_name_prefix: "wam".to_string(),
            initial_positions: None,
            joint_state_throttle_period: 0.1,
        }
    }
}

impl DriverConfig {
    /// Check the settings and return the calibration vector to apply.
    ///
    /// # Errors
    ///
    /// [`ArmError::Configuration`] for an unsupported DOF, an empty device
    /// identifier, a bad throttle period or an `initial_positions` of the
    /// wrong length.
    pub fn validate(&self) -> Result<JointVector, ArmError> {
        let dof = validate_dof(self.degrees_of_freedom)?;
        if self.device_identifier.trim().is_empty() {
            return Err(ArmError::Configuration("device_identifier is empty".into()));
        }
        if !self.joint_state_throttle_period.is_finite() || self.joint_state_throttle_period < 0.0 {
            return Err(ArmError::Configuration(format!(
                "joint_state_throttle_period must be a non-negative number of seconds, got {}",
                self.joint_state_throttle_period
            )));
        }
        match &self.initial_positions {
            None => Ok(JointVector::zeros(dof)),
            Some(q) if q.len() == dof => Ok(JointVector::from(q.clone())),
            Some(q) => Err(ArmError::Configuration(format!(
                "initial_positions has {} entries, expected {dof}",
                q.len()
            ))),
        }
    }
}

pub struct ArmDriver {
    name: String,
    config: DriverConfig,
    factory: DeviceFactory,
    hardware: Option<HardwareHandle>,

    joint_names: Vec<String>,
    positions: JointVector,
    reading: JointVector,
    command: JointVector,
    applied: JointVector,
    estimator: VelocityEstimator,
    snapshot: JointStateSnapshot,
    throttle: Throttle,

    torques_in: InputPort<JointVector>,
    positions_out: OutputPort<JointVector>,
    joint_state_out: OutputPort<JointStateSnapshot>,
}

impl ArmDriver {
    pub fn new(name: impl Into<String>, config: DriverConfig, factory: DeviceFactory) -> Self {
        let name = name.into();
        Self {
            torques_in: InputPort::new(format!("{name}.torques_in")),
            positions_out: OutputPort::new(format!("{name}.positions_out")),
            joint_state_out: OutputPort::new(format!("{name}.joint_state_out")),
            name,
            config,
            factory,
            hardware: None,
            joint_names: Vec::new(),
            positions: JointVector::default(),
            reading: JointVector::default(),
            command: JointVector::default(),
            applied: JointVector::default(),
            estimator: VelocityEstimator::new(0),
            snapshot: JointStateSnapshot::new(Vec::new()),
            throttle: Throttle::new(Duration::ZERO),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Replace the configuration.  Takes effect at the next `configure`.
    pub fn set_config(&mut self, config: DriverConfig) {
        self.config = config;
    }

    /// `true` while a device connection is held.
    pub fn is_connected(&self) -> bool {
        self.hardware.is_some()
    }

    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    /// Last successfully read joint positions.
    pub fn positions(&self) -> &JointVector {
        &self.positions
    }

    /// Last torque vector accepted by the device.
    pub fn applied_torques(&self) -> &JointVector {
        &self.applied
    }

    pub fn torques_in_mut(&mut self) -> &mut InputPort<JointVector> {
        &mut self.torques_in
    }

    pub fn positions_out(&self) -> &OutputPort<JointVector> {
        &self.positions_out
    }

    pub fn joint_state_out(&self) -> &OutputPort<JointStateSnapshot> {
        &self.joint_state_out
    }

    /// Declare `positions` to be the arm's current joint angles.
    ///
    /// # Errors
    ///
    /// [`ArmError::NotConnected`] without an open device,
    /// [`ArmError::DofMismatch`] for a vector of the wrong length, or the
    /// device's own error.
    pub fn calibrate(&mut self, positions: &JointVector) -> Result<(), ArmError> {
        let device = self.config.device_identifier.clone();
        let dof = self.config.degrees_of_freedom;
        let Some(hw) = self.hardware.as_mut() else {
            error!(driver = %self.name, device = %device, "cannot calibrate, device connection is not open");
            return Err(ArmError::NotConnected(device));
        };
        positions.check_len(dof)?;
        match hw.set_positions(positions) {
            Ok(()) => {
                info!(driver = %self.name, device = %device, positions = ?positions.as_slice(), "encoders calibrated");
                self.positions.clone_from(positions);
                self.estimator.reset();
                Ok(())
            }
            Err(e) => {
                error!(driver = %self.name, device = %device, error = %e, "failed to calibrate encoders");
                Err(e)
            }
        }
    }

    /// Forward a pendant warning or fault threshold to the device.
    ///
    /// # Errors
    ///
    /// [`ArmError::Configuration`] for a negative or non-finite value,
    /// [`ArmError::NotConnected`] without an open device, or the device's
    /// own error.
    pub fn set_safety_threshold(&mut self, kind: SafetyThreshold, value: f64) -> Result<(), ArmError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ArmError::Configuration(format!(
                "{kind} threshold must be a non-negative number, got {value}"
            )));
        }
        let Some(hw) = self.hardware.as_mut() else {
            return Err(ArmError::NotConnected(self.config.device_identifier.clone()));
        };
        hw.set_safety_threshold(kind, value)?;
        info!(driver = %self.name, threshold = %kind, value, "safety threshold set");
        Ok(())
    }

    fn forward_torques(&mut self) {
        if !self.torques_in.read(&mut self.command).is_new() {
            return;
        }
        if let Err(e) = self.command.check_len(self.config.degrees_of_freedom) {
            warn!(driver = %self.name, error = %e, "dropping torque command");
            return;
        }
        let Some(hw) = self.hardware.as_mut() else {
            return;
        };
        match hw.set_torques(&self.command) {
            Ok(()) => self.applied.clone_from(&self.command),
            Err(e) => warn!(driver = %self.name, error = %e, "failed to set torques"),
        }
    }
}

impl Component for ArmDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure_hook(&mut self) -> Result<(), ArmError> {
        let initial = self.config.validate()?;
        let dof = self.config.degrees_of_freedom;

        self.joint_names = canonical_joint_names(&self.config.joint_name_prefix, dof);
        self.positions = JointVector::zeros(dof);
        self.reading = JointVector::zeros(dof);
        self.command = JointVector::zeros(dof);
        self.applied = JointVector::zeros(dof);
        self.estimator = VelocityEstimator::new(dof);
        self.snapshot = JointStateSnapshot::new(self.joint_names.clone());
        self.throttle = Throttle::from_secs_f64(self.config.joint_state_throttle_period);

        let device = (self.factory)();
        let handle = HardwareHandle::acquire(
            device,
            &self.config.device_identifier,
            &DeviceConfig {
                degrees_of_freedom: dof,
            },
        )?;
        self.hardware = Some(handle);

        if let Err(e) = self.calibrate(&initial) {
            // Closes the transport.
            self.hardware = None;
            return Err(ArmError::Configuration(format!(
                "initial calibration failed: {e}"
            )));
        }

        info!(
            driver = %self.name,
            device = %self.config.device_identifier,
            dof,
            "arm connected"
        );
        Ok(())
    }

    fn start_hook(&mut self) -> Result<(), ArmError> {
        if !self.torques_in.connected() {
            return Err(ArmError::NotConnected(self.torques_in.name().to_string()));
        }
        if !self.positions_out.connected() {
            warn!(driver = %self.name, port = %self.positions_out.name(), "output port has no readers");
        }
        if let Some(hw) = self.hardware.as_mut()
            && let Err(e) = hw.set_mode(ArmMode::Activated)
        {
            error!(driver = %self.name, error = %e, "failed to activate arm");
        }
        self.throttle.reset();
        self.estimator.reset();
        info!(driver = %self.name, device = %self.config.device_identifier, "arm started");
        Ok(())
    }

    fn update_hook(&mut self) {
        let Some(hw) = self.hardware.as_mut() else {
            return;
        };
        match hw.get_positions(&mut self.reading) {
            Ok(()) => {
                std::mem::swap(&mut self.positions, &mut self.reading);
                self.estimator.update(&self.positions);
            }
            Err(e) => warn!(driver = %self.name, error = %e, "failed to read positions"),
        }

        self.forward_torques();

        self.positions_out.write(self.positions.clone());

        if self.throttle.ready() {
            self.snapshot
                .fill(&self.positions, self.estimator.velocity(), &self.applied);
            self.joint_state_out.write(self.snapshot.clone());
            debug!(driver = %self.name, "joint state published");
        }
    }

    fn stop_hook(&mut self) {
        if let Some(hw) = self.hardware.as_mut()
            && let Err(e) = hw.set_mode(ArmMode::Idle)
        {
            error!(driver = %self.name, error = %e, "failed to idle arm");
        }
    }

    fn cleanup_hook(&mut self) {
        if let Some(hw) = self.hardware.take()
            && let Err(e) = hw.release()
        {
            warn!(driver = %self.name, error = %e, "failed to close device");
        }
    }
}

/// Typed handle to an [`ArmDriver`] running on an activity.
///
/// Dereferences to the [`ActivityHandle`] for lifecycle transitions.
#[derive(Clone)]
pub struct ArmDriverHandle(ActivityHandle<ArmDriver>);

impl ArmDriverHandle {
    pub fn new(inner: ActivityHandle<ArmDriver>) -> Self {
        Self(inner)
    }

    /// See [`ArmDriver::calibrate`].  Available while `Configured` or
    /// `Running`.
    pub async fn calibrate(&self, positions: JointVector) -> Result<(), ArmError> {
        self.0
            .call(move |lc| lc.operate(&DEVICE_OPS, "calibrate", |d| d.calibrate(&positions)))
            .await?
    }

    /// See [`ArmDriver::set_safety_threshold`].
    pub async fn set_safety_threshold(&self, kind: SafetyThreshold, value: f64) -> Result<(), ArmError> {
        self.0
            .call(move |lc| {
                lc.operate(&DEVICE_OPS, "set_safety_threshold", |d| {
                    d.set_safety_threshold(kind, value)
                })
            })
            .await?
    }

    pub async fn positions(&self) -> Result<JointVector, ArmError> {
        self.0.call(|lc| lc.component().positions().clone()).await
    }

    pub async fn joint_names(&self) -> Result<Vec<String>, ArmError> {
        self.0.call(|lc| lc.component().joint_names().to_vec()).await
    }

    /// Link for reading the driver's position output.
    pub async fn link_positions(&self) -> Result<PortLink<JointVector>, ArmError> {
        self.0.call(|lc| lc.component().positions_out().link()).await
    }

    pub async fn link_joint_state(&self) -> Result<PortLink<JointStateSnapshot>, ArmError> {
        self.0.call(|lc| lc.component().joint_state_out().link()).await
    }

    /// Attach the torque input to `link`.
    pub async fn connect_torques(&self, link: PortLink<JointVector>) -> Result<(), ArmError> {
        self.0
            .call(move |lc| lc.component_mut().torques_in_mut().connect(link))
            .await
    }
}

impl Deref for ArmDriverHandle {
    type Target = ActivityHandle<ArmDriver>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armature_hal::{SimArm, SimFaults, SimHandle};
    use armature_kernel::{Activity, Lifecycle};
    use armature_middleware::FlowStatus;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    fn sim_factory(sim: &SimHandle) -> DeviceFactory {
        let sim = sim.clone();
        Box::new(move || Box::new(SimArm::attached(sim.clone())) as Box<dyn HardwareInterface>)
    }

    fn config(dof: usize) -> DriverConfig {
        DriverConfig {
            degrees_of_freedom: dof,
            device_identifier: "sim0".into(),
            joint_name_prefix: "left".into(),
            initial_positions: None,
            joint_state_throttle_period: 0.0,
        }
    }

    struct Rig {
        lc: Lifecycle<ArmDriver>,
        sim: SimHandle,
        torques: OutputPort<JointVector>,
        positions: InputPort<JointVector>,
        states: InputPort<JointStateSnapshot>,
    }

    fn rig(cfg: DriverConfig) -> Rig {
        let sim = SimHandle::default();
        let mut driver = ArmDriver::new("wam", cfg, sim_factory(&sim));
        let torques = OutputPort::new("test.torques");
        driver.torques_in_mut().connect(torques.link());
        let mut positions = InputPort::new("test.positions");
        positions.connect(driver.positions_out().link());
        let mut states = InputPort::new("test.states");
        states.connect(driver.joint_state_out().link());
        Rig {
            lc: Lifecycle::new(driver),
            sim,
            torques,
            positions,
            states,
        }
    }

    #[test]
    fn config_fills_defaults_from_toml() {
        let cfg: DriverConfig =
            toml::from_str("degrees_of_freedom = 4\ninitial_positions = [0.0, 1.0, 0.0, 0.0]\n")
                .unwrap();
        assert_eq!(cfg.device_identifier, "rtcan0");
        assert_eq!(cfg.joint_state_throttle_period, 0.1);
        assert_eq!(cfg.validate().unwrap(), JointVector::from(vec![0.0, 1.0, 0.0, 0.0]));
    }

    #[test]
    fn configure_opens_and_calibrates() {
        let mut r = rig(DriverConfig {
            initial_positions: Some(vec![0.0, -2.0, 0.0, 3.1]),
            ..config(4)
        });
        r.lc.configure().unwrap();
        assert!(r.lc.component().is_connected());
        assert_eq!(
            r.lc.component().joint_names(),
            ["left/YawJoint", "left/ShoulderPitchJoint", "left/ShoulderYawJoint", "left/ElbowJoint"]
        );
        let state = r.sim.state();
        assert_eq!(state.open_device.as_deref(), Some("sim0"));
        assert_eq!(
            state.calibrations,
            vec![JointVector::from(vec![0.0, -2.0, 0.0, 3.1])]
        );
    }

    #[test]
    fn missing_initial_positions_calibrate_to_zero() {
        let mut r = rig(config(7));
        r.lc.configure().unwrap();
        assert_eq!(r.sim.state().calibrations, vec![JointVector::zeros(7)]);
    }

    #[test]
    fn bad_configuration_is_rejected_before_touching_hardware() {
        for cfg in [
            config(5),
            DriverConfig {
                initial_positions: Some(vec![0.0; 3]),
                ..config(4)
            },
            DriverConfig {
                device_identifier: " ".into(),
                ..config(4)
            },
        ] {
            let mut r = rig(cfg);
            let err = r.lc.configure().unwrap_err();
            assert!(matches!(err, ArmError::Configuration(_)), "{err}");
            assert_eq!(r.lc.state(), LifecycleState::PreOperational);
            assert!(r.sim.state().open_device.is_none());
        }
    }

    #[test]
    fn failed_open_rolls_back_and_stays_reconfigurable() {
        let mut r = rig(config(4));
        r.sim.set_faults(SimFaults {
            open: true,
            ..SimFaults::default()
        });
        assert!(r.lc.configure().is_err());
        assert_eq!(r.lc.state(), LifecycleState::PreOperational);
        assert!(!r.lc.component().is_connected());

        r.sim.set_faults(SimFaults::default());
        r.lc.configure().unwrap();
        assert_eq!(r.lc.state(), LifecycleState::Configured);
    }

    #[test]
    fn failed_open_then_cleanup_is_harmless() {
        let mut r = rig(config(4));
        r.sim.set_faults(SimFaults {
            open: true,
            ..SimFaults::default()
        });
        assert!(r.lc.configure().is_err());
        r.lc.cleanup().unwrap();
        assert_eq!(r.lc.state(), LifecycleState::Cleaned);
        assert_eq!(r.sim.state().close_calls, 0);
    }

    #[test]
    fn failed_initialize_closes_transport() {
        let mut r = rig(config(4));
        r.sim.set_faults(SimFaults {
            initialize: true,
            ..SimFaults::default()
        });
        assert!(r.lc.configure().is_err());
        let state = r.sim.state();
        assert!(state.open_device.is_none());
        assert_eq!(state.close_calls, 1);
    }

    #[test]
    fn failed_initial_calibration_is_a_configuration_error() {
        let mut r = rig(config(4));
        r.sim.set_faults(SimFaults {
            calibrate: true,
            ..SimFaults::default()
        });
        let err = r.lc.configure().unwrap_err();
        assert!(matches!(err, ArmError::Configuration(_)));
        assert!(!r.lc.component().is_connected());
        assert!(r.sim.state().open_device.is_none());
    }

    #[test]
    fn start_requires_torque_input() {
        let sim = SimHandle::default();
        let mut lc = Lifecycle::new(ArmDriver::new("wam", config(4), sim_factory(&sim)));
        lc.configure().unwrap();
        let err = lc.start().unwrap_err();
        assert!(matches!(err, ArmError::NotConnected(port) if port == "wam.torques_in"));
        assert_eq!(lc.state(), LifecycleState::Configured);
    }

    #[test]
    fn start_activates_and_stop_idles() {
        let mut r = rig(config(4));
        r.lc.configure().unwrap();
        r.lc.start().unwrap();
        assert_eq!(r.sim.state().mode, ArmMode::Activated);
        r.lc.stop();
        assert_eq!(r.sim.state().mode, ArmMode::Idle);
        assert_eq!(r.lc.state(), LifecycleState::Stopped);
    }

    #[test]
    fn start_survives_activation_failure() {
        let mut r = rig(config(4));
        r.lc.configure().unwrap();
        r.sim.set_faults(SimFaults {
            set_mode: true,
            ..SimFaults::default()
        });
        r.lc.start().unwrap();
        assert!(r.lc.is_running());
        // Stop must not fail either.
        r.lc.stop();
        assert_eq!(r.lc.state(), LifecycleState::Stopped);
    }

    #[test]
    fn update_forwards_new_torques_once() {
        let mut r = rig(config(4));
        r.lc.configure().unwrap();
        r.lc.start().unwrap();

        r.torques.write(JointVector::from(vec![1.0, 2.0, 3.0, 4.0]));
        r.lc.update();
        r.lc.update();
        let state = r.sim.state();
        assert_eq!(state.torque_writes, 1);
        assert_eq!(
            state.last_torques,
            Some(JointVector::from(vec![1.0, 2.0, 3.0, 4.0]))
        );
    }

    #[test]
    fn update_rejects_wrong_length_torques() {
        let mut r = rig(config(4));
        r.lc.configure().unwrap();
        r.lc.start().unwrap();
        r.torques.write(JointVector::from(vec![1.0, 2.0]));
        r.lc.update();
        assert_eq!(r.sim.state().torque_writes, 0);
        assert!(r.lc.component().applied_torques().is_zero());
    }

    #[test]
    fn update_publishes_positions_every_cycle() {
        let mut r = rig(DriverConfig {
            initial_positions: Some(vec![0.5, 0.0, 0.0, 0.0]),
            ..config(4)
        });
        r.lc.configure().unwrap();
        r.lc.start().unwrap();
        let mut q = JointVector::default();
        r.lc.update();
        assert_eq!(r.positions.read(&mut q), FlowStatus::NewData);
        assert_eq!(q.len(), 4);
        assert!((q[0] - 0.5).abs() < 1e-6);
        r.lc.update();
        assert_eq!(r.positions.read(&mut q), FlowStatus::NewData);
    }

    #[test]
    fn read_failure_keeps_previous_positions() {
        let mut r = rig(DriverConfig {
            initial_positions: Some(vec![1.0, 1.0, 1.0, 1.0]),
            ..config(4)
        });
        r.lc.configure().unwrap();
        r.lc.start().unwrap();
        r.lc.update();
        r.sim.set_faults(SimFaults {
            read: true,
            ..SimFaults::default()
        });
        r.lc.update();
        let mut q = JointVector::default();
        r.positions.read(&mut q);
        assert_eq!(q, JointVector::from(vec![1.0, 1.0, 1.0, 1.0]));
        assert!(r.lc.is_running());
    }

    #[test]
    fn snapshot_reports_applied_effort() {
        let mut r = rig(config(4));
        r.lc.configure().unwrap();
        r.lc.start().unwrap();
        r.torques.write(JointVector::from(vec![0.1, 0.2, 0.3, 0.4]));
        r.lc.update();

        let mut snap = JointStateSnapshot::new(Vec::new());
        assert!(r.states.read(&mut snap).is_new());
        assert_eq!(snap.dof(), 4);
        assert_eq!(snap.name[0], "left/YawJoint");
        assert_eq!(snap.effort, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(snap.velocity.len(), 4);
    }

    #[test]
    fn snapshots_are_throttled() {
        let mut r = rig(DriverConfig {
            joint_state_throttle_period: 60.0,
            ..config(4)
        });
        r.lc.configure().unwrap();
        r.lc.start().unwrap();
        let mut snap = JointStateSnapshot::new(Vec::new());
        let mut published = 0;
        for _ in 0..20 {
            r.lc.update();
            if r.states.read(&mut snap).is_new() {
                published += 1;
            }
        }
        assert_eq!(published, 1);
    }

    #[test]
    fn calibrate_requires_connection() {
        let sim = SimHandle::default();
        let mut driver = ArmDriver::new("wam", config(4), sim_factory(&sim));
        let err = driver.calibrate(&JointVector::zeros(4)).unwrap_err();
        assert_eq!(err, ArmError::NotConnected("sim0".into()));
    }

    #[test]
    fn calibrate_checks_length() {
        let mut r = rig(config(4));
        r.lc.configure().unwrap();
        let err = r
            .lc
            .component_mut()
            .calibrate(&JointVector::zeros(7))
            .unwrap_err();
        assert!(matches!(err, ArmError::DofMismatch { expected: 4, actual: 7 }));
    }

    #[test]
    fn cleanup_closes_device_and_is_idempotent() {
        let mut r = rig(config(4));
        r.lc.configure().unwrap();
        r.lc.cleanup().unwrap();
        r.lc.cleanup().unwrap();
        assert!(!r.lc.component().is_connected());
        assert_eq!(r.sim.state().close_calls, 1);
    }

    #[test]
    fn torque_write_failure_keeps_running_without_retry() {
        let mut r = rig(config(4));
        r.lc.configure().unwrap();
        r.lc.start().unwrap();
        r.torques.write(JointVector::from(vec![1.0, 1.0, 1.0, 1.0]));
        r.lc.update();

        r.sim.set_faults(SimFaults {
            write: true,
            ..SimFaults::default()
        });
        r.torques.write(JointVector::from(vec![2.0, 2.0, 2.0, 2.0]));
        r.lc.update();
        r.lc.update();

        assert!(r.lc.is_running());
        assert_eq!(
            r.lc.component().applied_torques(),
            &JointVector::from(vec![1.0, 1.0, 1.0, 1.0])
        );
        assert_eq!(r.sim.state().torque_writes, 1);
        let mut q = JointVector::default();
        assert_eq!(r.positions.read(&mut q), FlowStatus::NewData);
        assert_eq!(q.len(), 4);
    }

    #[test]
    fn cleanup_survives_close_failure() {
        let mut r = rig(config(4));
        r.lc.configure().unwrap();
        r.sim.set_faults(SimFaults {
            close: true,
            ..SimFaults::default()
        });
        r.lc.cleanup().unwrap();
        assert_eq!(r.lc.state(), LifecycleState::Cleaned);
        assert!(!r.lc.component().is_connected());
        assert_eq!(r.sim.state().close_calls, 1);
    }

    #[test]
    fn safety_threshold_validation() {
        let mut r = rig(config(4));
        assert!(matches!(
            r.lc.component_mut()
                .set_safety_threshold(SafetyThreshold::TorqueFault, 10.0),
            Err(ArmError::NotConnected(_))
        ));
        r.lc.configure().unwrap();
        assert!(matches!(
            r.lc.component_mut()
                .set_safety_threshold(SafetyThreshold::TorqueFault, f64::NAN),
            Err(ArmError::Configuration(_))
        ));
        r.lc.component_mut()
            .set_safety_threshold(SafetyThreshold::TorqueFault, 10.0)
            .unwrap();
        assert_eq!(
            r.sim.state().thresholds,
            vec![(SafetyThreshold::TorqueFault, 10.0)]
        );
    }

    #[tokio::test]
    async fn handle_gates_calibrate_by_state() {
        let sim = SimHandle::default();
        let torques = OutputPort::<JointVector>::new("test.torques");
        let driver = ArmDriver::new("wam", config(4), sim_factory(&sim));
        let (activity, handle) = Activity::new(Lifecycle::new(driver), Duration::from_millis(2));
        let handle = ArmDriverHandle::new(handle);
        let shutdown = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(activity.run(Arc::clone(&shutdown)));

        let err = handle.calibrate(JointVector::zeros(4)).await.unwrap_err();
        assert!(matches!(err, ArmError::Unavailable { .. }));

        handle.connect_torques(torques.link()).await.unwrap();
        handle.configure().await.unwrap();
        handle.start().await.unwrap();
        handle
            .calibrate(JointVector::from(vec![0.1, 0.2, 0.3, 0.4]))
            .await
            .unwrap();
        handle
            .set_safety_threshold(SafetyThreshold::VelocityWarning, 1.0)
            .await
            .unwrap();
        assert_eq!(sim.state().calibrations.len(), 2);
        assert_eq!(handle.joint_names().await.unwrap().len(), 4);

        handle.stop().await.unwrap();
        handle.cleanup().await.unwrap();
        shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        let lc = task.await.unwrap();
        assert_eq!(lc.state(), LifecycleState::Cleaned);
        assert!(sim.state().open_device.is_none());
    }
}
