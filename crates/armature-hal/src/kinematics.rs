//! Joint-chain resolution from a robot description.
//!
//! The controller mux only needs to know which movable joints lie between
//! a root and a tip link, in root-to-tip order.  [`UrdfKinematics`] derives
//! that from a URDF document; [`FixedChain`] returns a pre-computed chain for
//! setups without a description.

use std::collections::HashMap;

use armature_types::ArmError;
use tracing::debug;
use urdf_rs::{JointType, Robot};

/// Ordered movable joints from a root link to a tip link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KinematicChain {
    pub joint_names: Vec<String>,
}

impl KinematicChain {
    pub fn dof(&self) -> usize {
        self.joint_names.len()
    }
}

pub trait KinematicsProvider: Send {
    /// Resolve the chain of movable joints from `root_link` down to
    /// `tip_link` in `description`.
    ///
    /// # Errors
    ///
    /// [`ArmError::Kinematics`] if the description cannot be parsed, a link
    /// is missing, or `tip_link` does not hang below `root_link`.
    fn resolve_chain(
        &self,
        description: &str,
        root_link: &str,
        tip_link: &str,
    ) -> Result<KinematicChain, ArmError>;
}

/// Resolves chains by parsing URDF XML.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrdfKinematics;

impl KinematicsProvider for UrdfKinematics {
    fn resolve_chain(
        &self,
        description: &str,
        root_link: &str,
        tip_link: &str,
    ) -> Result<KinematicChain, ArmError> {
        let robot = urdf_rs::read_from_string(description)
            .map_err(|e| ArmError::Kinematics(format!("failed to parse robot description: {e}")))?;
        let chain = chain_between(&robot, root_link, tip_link)?;
        debug!(
            robot = %robot.name,
            root = root_link,
            tip = tip_link,
            dof = chain.dof(),
            "resolved kinematic chain"
        );
        Ok(chain)
    }
}

fn chain_between(robot: &Robot, root: &str, tip: &str) -> Result<KinematicChain, ArmError> {
    for link in [root, tip] {
        if !robot.links.iter().any(|l| l.name == link) {
            return Err(ArmError::Kinematics(format!(
                "link '{link}' not found in robot '{}'",
                robot.name
            )));
        }
    }

    let by_child: HashMap<&str, &urdf_rs::Joint> = robot
        .joints
        .iter()
        .map(|j| (j.child.link.as_str(), j))
        .collect();

    let mut names = Vec::new();
    let mut link = tip;
    let mut hops = 0;
    while link != root {
        let Some(joint) = by_child.get(link) else {
            return Err(ArmError::Kinematics(format!(
                "link '{tip}' is not a descendant of '{root}'"
            )));
        };
        hops += 1;
        if hops > robot.joints.len() {
            return Err(ArmError::Kinematics(format!(
                "cycle detected walking from '{tip}' to '{root}'"
            )));
        }
        if !matches!(joint.joint_type, JointType::Fixed) {
            names.push(joint.name.clone());
        }
        link = joint.parent.link.as_str();
    }
    names.reverse();

    if names.is_empty() {
        return Err(ArmError::Kinematics(format!(
            "no movable joints between '{root}' and '{tip}'"
        )));
    }
    Ok(KinematicChain { joint_names: names })
}

/// Provider that ignores the description and always yields the same chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedChain {
    joint_names: Vec<String>,
}

impl FixedChain {
    pub fn new(joint_names: Vec<String>) -> Self {
        Self { joint_names }
    }
}

impl KinematicsProvider for FixedChain {
    fn resolve_chain(
        &self,
        _description: &str,
        _root_link: &str,
        _tip_link: &str,
    ) -> Result<KinematicChain, ArmError> {
        if self.joint_names.is_empty() {
            return Err(ArmError::Kinematics("fixed chain is empty".into()));
        }
        Ok(KinematicChain {
            joint_names: self.joint_names.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARM: &str = r#"<?xml version="1.0"?>
<robot name="test_arm">
  <link name="world"/>
  <link name="base"/>
  <link name="shoulder"/>
  <link name="upper_arm"/>
  <link name="forearm"/>
  <link name="tool"/>
  <link name="camera"/>
  <joint name="mount" type="fixed">
    <parent link="world"/>
    <child link="base"/>
  </joint>
  <joint name="yaw" type="revolute">
    <parent link="base"/>
    <child link="shoulder"/>
    <axis xyz="0 0 1"/>
    <limit lower="-2.6" upper="2.6" effort="20" velocity="1"/>
  </joint>
  <joint name="pitch" type="revolute">
    <parent link="shoulder"/>
    <child link="upper_arm"/>
    <axis xyz="0 1 0"/>
    <limit lower="-2.0" upper="2.0" effort="20" velocity="1"/>
  </joint>
  <joint name="elbow" type="continuous">
    <parent link="upper_arm"/>
    <child link="forearm"/>
    <axis xyz="0 1 0"/>
    <limit lower="0" upper="0" effort="10" velocity="1"/>
  </joint>
  <joint name="flange" type="fixed">
    <parent link="forearm"/>
    <child link="tool"/>
  </joint>
  <joint name="camera_mount" type="fixed">
    <parent link="shoulder"/>
    <child link="camera"/>
  </joint>
</robot>
"#;

    #[test]
    fn resolves_movable_joints_root_to_tip() {
        let chain = UrdfKinematics.resolve_chain(ARM, "world", "tool").unwrap();
        assert_eq!(chain.joint_names, vec!["yaw", "pitch", "elbow"]);
        assert_eq!(chain.dof(), 3);
    }

    #[test]
    fn partial_chain() {
        let chain = UrdfKinematics.resolve_chain(ARM, "shoulder", "forearm").unwrap();
        assert_eq!(chain.joint_names, vec!["pitch", "elbow"]);
    }

    #[test]
    fn unknown_link_is_an_error() {
        let err = UrdfKinematics.resolve_chain(ARM, "base", "gripper").unwrap_err();
        assert!(matches!(err, ArmError::Kinematics(msg) if msg.contains("gripper")));
    }

    #[test]
    fn tip_on_another_branch_is_an_error() {
        let err = UrdfKinematics.resolve_chain(ARM, "upper_arm", "camera").unwrap_err();
        assert!(matches!(err, ArmError::Kinematics(_)));
    }

    #[test]
    fn fixed_only_chain_is_an_error() {
        let err = UrdfKinematics.resolve_chain(ARM, "forearm", "tool").unwrap_err();
        assert!(matches!(err, ArmError::Kinematics(msg) if msg.contains("no movable joints")));
    }

    #[test]
    fn garbage_description_is_an_error() {
        let err = UrdfKinematics.resolve_chain("not xml", "a", "b").unwrap_err();
        assert!(matches!(err, ArmError::Kinematics(_)));
    }

    #[test]
    fn fixed_chain_ignores_the_description() {
        let provider = FixedChain::new(vec!["j1".into(), "j2".into()]);
        let chain = provider.resolve_chain("", "", "").unwrap();
        assert_eq!(chain.dof(), 2);
        assert!(FixedChain::new(Vec::new()).resolve_chain("", "", "").is_err());
    }
}
