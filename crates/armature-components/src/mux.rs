//! [`ControllerMux`] – blends torque commands from many controllers into one.
//!
//! Controllers are registered at runtime with [`ControllerMux::load`]; each
//! gets its own torque input.  Every cycle the mux sums the fresh samples of
//! all enabled controllers (in name order) into one vector of the chain's
//! DOF and writes it to `torques_out`, or writes zeros while the mux is
//! globally disabled.
//!
//! | Port | Direction | Type |
//! |---|---|---|
//! | `config_in` | in | [`MuxCommand`] |
//! | `positions_in` | in | [`JointVector`] |
//! | `<controller>` | in | [`JointVector`], one per loaded controller |
//! | `torques_out` | out | [`JointVector`] |
//! | `joint_state_out` | out | [`JointStateSnapshot`] |

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;
use std::time::Duration;

use armature_hal::KinematicsProvider;
use armature_kernel::{ActivityHandle, Component, Throttle, VelocityEstimator};
use armature_middleware::{FlowStatus, InputPort, OutputPort, PortLink};
use armature_types::{ArmError, JointStateSnapshot, JointVector, LifecycleState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Registry operations are refused only once the mux is cleaned up.
const REGISTRY_OPS: [LifecycleState; 4] = [
    LifecycleState::PreOperational,
    LifecycleState::Configured,
    LifecycleState::Running,
    LifecycleState::Stopped,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Robot description document (URDF XML).
    pub robot_description: String,
    pub root_link: String,
    pub tip_link: String,
    /// Minimum seconds between two joint state snapshots.
    pub joint_state_throttle_period: f64,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            robot_description: String::new(),
            root_link: String::new(),
            tip_link: String::new(),
            joint_state_throttle_period: 0.1,
        }
    }
}

/// Batch reconfiguration received on `config_in`.
///
/// Applied in field order: `enable`, then `disable`, then `mux_enabled`.
/// Unknown controller names are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxCommand {
    pub enable: BTreeSet<String>,
    pub disable: BTreeSet<String>,
    pub mux_enabled: Option<bool>,
}

/// Public view of one registered controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerInfo {
    pub name: String,
    pub dof: usize,
    pub enabled: bool,
    pub connected: bool,
}

struct ControllerChannel {
    dof: usize,
    enabled: bool,
    input: InputPort<JointVector>,
}

pub struct ControllerMux {
    name: String,
    config: MuxConfig,
    kinematics: Box<dyn KinematicsProvider>,

    joint_names: Vec<String>,
    n_dof: usize,
    controllers: BTreeMap<String, ControllerChannel>,
    enabled: bool,

    position: JointVector,
    position_sample: JointVector,
    controller_sample: JointVector,
    torques: JointVector,
    zeros: JointVector,
    command: MuxCommand,
    estimator: VelocityEstimator,
    snapshot: JointStateSnapshot,
    throttle: Throttle,

    config_in: InputPort<MuxCommand>,
    positions_in: InputPort<JointVector>,
    torques_out: OutputPort<JointVector>,
    joint_state_out: OutputPort<JointStateSnapshot>,
}

impl ControllerMux {
    pub fn new(
        name: impl Into<String>,
        config: MuxConfig,
        kinematics: Box<dyn KinematicsProvider>,
    ) -> Self {
        let name = name.into();
        Self {
            config_in: InputPort::new(format!("{name}.config_in")),
            positions_in: InputPort::new(format!("{name}.positions_in")),
            torques_out: OutputPort::new(format!("{name}.torques_out")),
            joint_state_out: OutputPort::new(format!("{name}.joint_state_out")),
            name,
            config,
            kinematics,
            joint_names: Vec::new(),
            n_dof: 0,
            controllers: BTreeMap::new(),
            enabled: true,
            position: JointVector::default(),
            position_sample: JointVector::default(),
            controller_sample: JointVector::default(),
            torques: JointVector::default(),
            zeros: JointVector::default(),
            command: MuxCommand::default(),
            estimator: VelocityEstimator::new(0),
            snapshot: JointStateSnapshot::new(Vec::new()),
            throttle: Throttle::new(Duration::ZERO),
        }
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: MuxConfig) {
        self.config = config;
    }

    /// Chain DOF resolved at configure; zero before.
    pub fn dof(&self) -> usize {
        self.n_dof
    }

    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Registered controllers in name order.
    pub fn controllers(&self) -> Vec<ControllerInfo> {
        self.controllers
            .iter()
            .map(|(name, c)| ControllerInfo {
                name: name.clone(),
                dof: c.dof,
                enabled: c.enabled,
                connected: c.input.connected(),
            })
            .collect()
    }

    /// Register a controller with its own torque input.  New controllers
    /// start disabled.
    ///
    /// # Errors
    ///
    /// [`ArmError::DuplicateController`] if `name` is taken (the existing
    /// controller is left untouched), [`ArmError::Configuration`] for an
    /// empty name or zero DOF.
    pub fn load(&mut self, name: &str, dof: usize) -> Result<(), ArmError> {
        if name.is_empty() {
            return Err(ArmError::Configuration("controller name is empty".into()));
        }
        if dof == 0 {
            return Err(ArmError::Configuration(format!(
                "controller '{name}' must have at least one DOF"
            )));
        }
        if self.controllers.contains_key(name) {
            warn!(mux = %self.name, controller = name, "controller already loaded");
            return Err(ArmError::DuplicateController(name.to_string()));
        }
        if self.n_dof > 0 && dof > self.n_dof {
            warn!(
                mux = %self.name,
                controller = name,
                dof,
                n_dof = self.n_dof,
                "controller output will be truncated"
            );
        }
        self.controllers.insert(
            name.to_string(),
            ControllerChannel {
                dof,
                enabled: false,
                input: InputPort::new(format!("{}.{name}", self.name)),
            },
        );
        info!(mux = %self.name, controller = name, dof, "controller loaded");
        Ok(())
    }

    /// Remove a controller and release its input.  Returns whether it was
    /// registered.
    pub fn unload(&mut self, name: &str) -> bool {
        match self.controllers.remove(name) {
            Some(mut channel) => {
                channel.input.disconnect();
                info!(mux = %self.name, controller = name, "controller unloaded");
                true
            }
            None => {
                debug!(mux = %self.name, controller = name, "unload of unknown controller ignored");
                false
            }
        }
    }

    /// Attach a loaded controller's input to an upstream output.
    ///
    /// # Errors
    ///
    /// [`ArmError::Configuration`] when no controller named `name` exists.
    pub fn connect_controller(&mut self, name: &str, link: PortLink<JointVector>) -> Result<(), ArmError> {
        let channel = self
            .controllers
            .get_mut(name)
            .ok_or_else(|| ArmError::Configuration(format!("no controller named '{name}'")))?;
        channel.input.connect(link);
        Ok(())
    }

    /// Transmit the blended torques.
    pub fn enable(&mut self) {
        if !self.enabled {
            info!(mux = %self.name, "mux enabled");
        }
        self.enabled = true;
    }

    /// Transmit zeros.  The blend is still computed and reported.
    pub fn disable(&mut self) {
        if self.enabled {
            info!(mux = %self.name, "mux disabled");
        }
        self.enabled = false;
    }

    /// Enable then disable controllers by name.  A name in both sets ends up
    /// disabled; unknown names are ignored.
    pub fn toggle<E, D>(&mut self, enable: E, disable: D)
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        for name in enable {
            self.set_controller_enabled(name.as_ref(), true);
        }
        for name in disable {
            self.set_controller_enabled(name.as_ref(), false);
        }
    }

    /// Apply a [`MuxCommand`].
    pub fn apply_command(&mut self, command: &MuxCommand) {
        self.toggle(&command.enable, &command.disable);
        match command.mux_enabled {
            Some(true) => self.enable(),
            Some(false) => self.disable(),
            None => {}
        }
    }

    fn set_controller_enabled(&mut self, name: &str, enabled: bool) {
        match self.controllers.get_mut(name) {
            Some(c) => {
                if c.enabled != enabled {
                    debug!(mux = %self.name, controller = name, enabled, "controller toggled");
                }
                c.enabled = enabled;
            }
            None => debug!(mux = %self.name, controller = name, "toggle of unknown controller ignored"),
        }
    }

    pub fn config_in_mut(&mut self) -> &mut InputPort<MuxCommand> {
        &mut self.config_in
    }

    pub fn positions_in_mut(&mut self) -> &mut InputPort<JointVector> {
        &mut self.positions_in
    }

    pub fn torques_out(&self) -> &OutputPort<JointVector> {
        &self.torques_out
    }

    pub fn joint_state_out(&self) -> &OutputPort<JointStateSnapshot> {
        &self.joint_state_out
    }

    fn read_config(&mut self) {
        if self.config_in.read(&mut self.command).is_new() {
            let command = std::mem::take(&mut self.command);
            debug!(mux = %self.name, ?command, "config command received");
            self.apply_command(&command);
        }
    }

    fn read_position(&mut self) {
        let status = self.positions_in.read(&mut self.position_sample);
        if status == FlowStatus::NoData {
            return;
        }
        if let Err(e) = self.position_sample.check_len(self.n_dof) {
            if status.is_new() {
                warn!(mux = %self.name, error = %e, "dropping position sample");
            }
            return;
        }
        self.position.clone_from(&self.position_sample);
        if status.is_new() {
            self.estimator.update(&self.position);
        }
    }

    fn accumulate(&mut self) {
        self.torques.set_zero();
        for channel in self.controllers.values_mut() {
            if !channel.enabled {
                continue;
            }
            if channel.input.read(&mut self.controller_sample).is_new() {
                let limit = channel.dof.min(self.n_dof);
                self.torques.add_truncated(&self.controller_sample, limit);
            }
        }
    }
}

impl Component for ControllerMux {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure_hook(&mut self) -> Result<(), ArmError> {
        let period = self.config.joint_state_throttle_period;
        if !period.is_finite() || period < 0.0 {
            return Err(ArmError::Configuration(format!(
                "joint_state_throttle_period must be a non-negative number of seconds, got {period}"
            )));
        }
        let chain = self
            .kinematics
            .resolve_chain(
                &self.config.robot_description,
                &self.config.root_link,
                &self.config.tip_link,
            )
            .map_err(|e| ArmError::Configuration(format!("could not initialise kinematics: {e}")))?;

        let n = chain.dof();
        self.n_dof = n;
        self.joint_names = chain.joint_names;
        self.position = JointVector::zeros(n);
        self.position_sample = JointVector::zeros(n);
        self.torques = JointVector::zeros(n);
        self.zeros = JointVector::zeros(n);
        self.estimator = VelocityEstimator::new(n);
        self.snapshot = JointStateSnapshot::new(self.joint_names.clone());
        self.throttle = Throttle::from_secs_f64(period);

        info!(mux = %self.name, n_dof = n, joints = ?self.joint_names, "mux configured");
        Ok(())
    }

    fn start_hook(&mut self) -> Result<(), ArmError> {
        if !self.positions_in.connected() {
            warn!(mux = %self.name, port = %self.positions_in.name(), "input port not connected");
        }
        if !self.torques_out.connected() {
            warn!(mux = %self.name, port = %self.torques_out.name(), "output port has no readers");
        }
        self.throttle.reset();
        self.estimator.reset();
        info!(mux = %self.name, controllers = self.controllers.len(), "mux started");
        Ok(())
    }

    fn update_hook(&mut self) {
        self.read_config();
        self.read_position();
        self.accumulate();

        if self.enabled {
            self.torques_out.write(self.torques.clone());
        } else {
            self.torques_out.write(self.zeros.clone());
        }

        if self.throttle.ready() {
            self.snapshot
                .fill(&self.position, self.estimator.velocity(), &self.torques);
            self.joint_state_out.write(self.snapshot.clone());
        }
    }

    fn stop_hook(&mut self) {
        self.torques_out.write(self.zeros.clone());
    }

    fn cleanup_hook(&mut self) {
        let names: Vec<String> = self.controllers.keys().cloned().collect();
        for name in names {
            self.unload(&name);
        }
    }
}

/// Typed handle to a [`ControllerMux`] running on an activity.
#[derive(Clone)]
pub struct MuxHandle(ActivityHandle<ControllerMux>);

impl MuxHandle {
    pub fn new(inner: ActivityHandle<ControllerMux>) -> Self {
        Self(inner)
    }

    pub async fn load(&self, name: impl Into<String>, dof: usize) -> Result<(), ArmError> {
        let name = name.into();
        self.0
            .call(move |lc| lc.operate(&REGISTRY_OPS, "load", |m| m.load(&name, dof)))
            .await?
    }

    pub async fn unload(&self, name: impl Into<String>) -> Result<bool, ArmError> {
        let name = name.into();
        self.0
            .call(move |lc| lc.operate(&REGISTRY_OPS, "unload", |m| Ok(m.unload(&name))))
            .await?
    }

    pub async fn enable(&self) -> Result<(), ArmError> {
        self.0
            .call(|lc| {
                lc.operate(&REGISTRY_OPS, "enable", |m| {
                    m.enable();
                    Ok(())
                })
            })
            .await?
    }

    pub async fn disable(&self) -> Result<(), ArmError> {
        self.0
            .call(|lc| {
                lc.operate(&REGISTRY_OPS, "disable", |m| {
                    m.disable();
                    Ok(())
                })
            })
            .await?
    }

    pub async fn toggle(&self, enable: Vec<String>, disable: Vec<String>) -> Result<(), ArmError> {
        self.0
            .call(move |lc| {
                lc.operate(&REGISTRY_OPS, "toggle", |m| {
                    m.toggle(&enable, &disable);
                    Ok(())
                })
            })
            .await?
    }

    pub async fn connect_controller(
        &self,
        name: impl Into<String>,
        link: PortLink<JointVector>,
    ) -> Result<(), ArmError> {
        let name = name.into();
        self.0
            .call(move |lc| {
                lc.operate(&REGISTRY_OPS, "connect_controller", |m| {
                    m.connect_controller(&name, link)
                })
            })
            .await?
    }

    pub async fn controllers(&self) -> Result<Vec<ControllerInfo>, ArmError> {
        self.0.call(|lc| lc.component().controllers()).await
    }

    pub async fn is_enabled(&self) -> Result<bool, ArmError> {
        self.0.call(|lc| lc.component().is_enabled()).await
    }

    pub async fn link_torques(&self) -> Result<PortLink<JointVector>, ArmError> {
        self.0.call(|lc| lc.component().torques_out().link()).await
    }

    pub async fn link_joint_state(&self) -> Result<PortLink<JointStateSnapshot>, ArmError> {
        self.0.call(|lc| lc.component().joint_state_out().link()).await
    }

    pub async fn connect_positions(&self, link: PortLink<JointVector>) -> Result<(), ArmError> {
        self.0
            .call(move |lc| lc.component_mut().positions_in_mut().connect(link))
            .await
    }

    pub async fn connect_config(&self, link: PortLink<MuxCommand>) -> Result<(), ArmError> {
        self.0
            .call(move |lc| lc.component_mut().config_in_mut().connect(link))
            .await
    }
}

impl Deref for MuxHandle {
    type Target = ActivityHandle<ControllerMux>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
