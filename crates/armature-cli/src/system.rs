//! Process wiring: one simulated arm driver fed by one controller mux.
//!
//! ```text
//!  controllers ──► mux.torques_out ──► driver.torques_in ──► SimArm
//!                  mux.positions_in ◄── driver.positions_out ◄──┘
//! ```

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use armature_components::{
    ArmDriver, ArmDriverHandle, ControllerMux, DeviceFactory, MuxConfig, MuxHandle,
};
use armature_hal::{FixedChain, HardwareInterface, KinematicsProvider, SimArm, SimHandle, UrdfKinematics};
use armature_kernel::{Activity, Lifecycle};
use armature_middleware::InputPort;
use armature_types::{ArmError, JointStateSnapshot, canonical_joint_names};
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;

/// Everything the operator console needs; cheap to move to another thread.
pub struct Controls {
    pub runtime: Handle,
    pub driver: ArmDriverHandle,
    pub mux: MuxHandle,
    pub sim: SimHandle,
    pub driver_state: InputPort<JointStateSnapshot>,
    pub mux_state: InputPort<JointStateSnapshot>,
}

pub struct ArmSystem {
    runtime: Runtime,
    shutdown: Arc<AtomicBool>,
    driver: ArmDriverHandle,
    mux: MuxHandle,
    driver_task: JoinHandle<Lifecycle<ArmDriver>>,
    mux_task: JoinHandle<Lifecycle<ControllerMux>>,
}

/// Mux settings plus the kinematics provider that goes with them.
pub fn mux_setup(cfg: &Config) -> Result<(MuxConfig, Box<dyn KinematicsProvider>), ArmError> {
    let section = &cfg.mux;
    match &section.robot_description_path {
        Some(path) => {
            let description = fs::read_to_string(path).map_err(|e| {
                ArmError::Configuration(format!(
                    "failed to read robot description {}: {e}",
                    path.display()
                ))
            })?;
            let config = MuxConfig {
                robot_description: description,
                root_link: section.root_link.clone(),
                tip_link: section.tip_link.clone(),
                joint_state_throttle_period: section.joint_state_throttle_period,
            };
            Ok((config, Box::new(UrdfKinematics)))
        }
        None => {
            let names = canonical_joint_names(
                &cfg.driver.joint_name_prefix,
                cfg.driver.degrees_of_freedom,
            );
            let config = MuxConfig {
                joint_state_throttle_period: section.joint_state_throttle_period,
                ..MuxConfig::default()
            };
            Ok((config, Box::new(FixedChain::new(names))))
        }
    }
}

impl ArmSystem {
    /// Build, wire, configure and start both components.
    pub fn start(cfg: &Config) -> Result<(Self, Controls), ArmError> {
        let period = cfg.host.period()?;
        let (mux_config, kinematics) = mux_setup(cfg)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("armature-rt")
            .enable_all()
            .build()
            .map_err(|e| ArmError::Configuration(format!("failed to start runtime: {e}")))?;

        let sim = SimHandle::default();
        let factory: DeviceFactory = {
            let sim = sim.clone();
            Box::new(move || Box::new(SimArm::attached(sim.clone())) as Box<dyn HardwareInterface>)
        };
        let mut driver = ArmDriver::new("wam", cfg.driver.clone(), factory);
        let mut mux = ControllerMux::new("mux", mux_config, kinematics);

        driver.torques_in_mut().connect(mux.torques_out().link());
        mux.positions_in_mut().connect(driver.positions_out().link());
        let mut driver_state = InputPort::new("console.driver_state");
        driver_state.connect(driver.joint_state_out().link());
        let mut mux_state = InputPort::new("console.mux_state");
        mux_state.connect(mux.joint_state_out().link());

        let shutdown = Arc::new(AtomicBool::new(false));
        let (driver_activity, driver) = Activity::new(Lifecycle::new(driver), period);
        let (mux_activity, mux) = Activity::new(Lifecycle::new(mux), period);
        let driver = ArmDriverHandle::new(driver);
        let mux = MuxHandle::new(mux);
        let driver_task = runtime.spawn(driver_activity.run(Arc::clone(&shutdown)));
        let mux_task = runtime.spawn(mux_activity.run(Arc::clone(&shutdown)));

        let system = Self {
            runtime,
            shutdown,
            driver: driver.clone(),
            mux: mux.clone(),
            driver_task,
            mux_task,
        };
        let controls = Controls {
            runtime: system.runtime.handle().clone(),
            driver,
            mux,
            sim,
            driver_state,
            mux_state,
        };

        if let Err(e) = system.bring_up(cfg.driver.degrees_of_freedom) {
            system.shutdown();
            return Err(e);
        }
        info!(period_us = period.as_micros() as u64, "arm system running");
        Ok((system, controls))
    }

    /// The mux chain must match the arm before the device is opened.
    fn bring_up(&self, arm_dof: usize) -> Result<(), ArmError> {
        self.runtime.block_on(async {
            self.mux.configure().await?;
            let chain_dof = self.mux.call(|lc| lc.component().dof()).await?;
            if chain_dof != arm_dof {
                error!(chain_dof, arm_dof, "mux chain does not match the arm");
                return Err(ArmError::Configuration(format!(
                    "mux chain has {chain_dof} joints but the arm has {arm_dof}"
                )));
            }
            self.driver.configure().await?;
            self.mux.start().await?;
            self.driver.start().await
        })
    }

    /// Stop and clean up both components, then end their activities.
    pub fn shutdown(self) {
        let Self {
            runtime,
            shutdown,
            driver,
            mux,
            driver_task,
            mux_task,
        } = self;

        runtime.block_on(async {
            // Idle the arm before the mux goes quiet.
            if let Err(e) = driver.stop().await {
                error!(error = %e, "driver stop failed");
            }
            if let Err(e) = mux.stop().await {
                error!(error = %e, "mux stop failed");
            }
            if let Err(e) = driver.cleanup().await {
                error!(error = %e, "driver cleanup failed");
            }
            if let Err(e) = mux.cleanup().await {
                error!(error = %e, "mux cleanup failed");
            }

            shutdown.store(true, Ordering::SeqCst);
            match driver_task.await {
                Ok(lc) => info!(state = %lc.state(), "driver finished"),
                Err(e) => error!(error = %e, "driver activity panicked"),
            }
            match mux_task.await {
                Ok(lc) => info!(state = %lc.state(), "mux finished"),
                Err(e) => error!(error = %e, "mux activity panicked"),
            }
        });
    }
}
