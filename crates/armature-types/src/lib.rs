//! Shared vocabulary of the armature stack: joint-space values, the
//! component lifecycle states and the workspace-wide error type.

pub mod joint;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use joint::{
    CANONICAL_JOINT_NAMES, JointStateSnapshot, JointVector, SUPPORTED_DOF, canonical_joint_names,
    validate_dof,
};

/// Lifecycle state shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    PreOperational,
    Configured,
    Running,
    Stopped,
    /// Terminal: resources released, the component cannot be configured again.
    Cleaned,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::PreOperational => "PreOperational",
            LifecycleState::Configured => "Configured",
            LifecycleState::Running => "Running",
            LifecycleState::Stopped => "Stopped",
            LifecycleState::Cleaned => "Cleaned",
        };
        f.write_str(s)
    }
}

/// A lifecycle transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Configure,
    Start,
    Stop,
    Cleanup,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Transition::Configure => "configure",
            Transition::Start => "start",
            Transition::Stop => "stop",
            Transition::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Error type spanning configuration, hardware, channel and registry faults.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArmError {
    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Hardware Fault on {device}: {details}")]
    HardwareFault { device: String, details: String },

    #[error("Channel Not Connected: {0}")]
    NotConnected(String),

    #[error("Invalid Transition: cannot {transition} '{component}' in state {state}")]
    InvalidTransition {
        component: String,
        state: LifecycleState,
        transition: Transition,
    },

    #[error("Operation '{operation}' unavailable on '{component}' in state {state}")]
    Unavailable {
        component: String,
        state: LifecycleState,
        operation: String,
    },

    #[error("Controller '{0}' is already loaded")]
    DuplicateController(String),

    #[error("DOF Mismatch: expected {expected} joints, got {actual}")]
    DofMismatch { expected: usize, actual: usize },

    #[error("Kinematics Error: {0}")]
    Kinematics(String),

    #[error("Activity '{0}' is no longer running")]
    ActivityClosed(String),
}

impl ArmError {
    /// Shorthand for [`ArmError::HardwareFault`].
    pub fn hardware(device: impl Into<String>, details: impl Into<String>) -> Self {
        ArmError::HardwareFault {
            device: device.into(),
            details: details.into(),
        }
    }
}
