//! Joint-space value types exchanged between components.
//!
//! [`JointVector`] is the unit of data on every torque and position channel.
//! Its length is fixed per component instance at configure time; consumers
//! check it with [`JointVector::check_len`] before using a received value.

use std::ops::{Index, IndexMut};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ArmError;

/// Joint names of the seven-axis arm in canonical base-to-tip order.
///
/// A four-axis arm uses the first four entries.
pub const CANONICAL_JOINT_NAMES: [&str; 7] = [
    "YawJoint",
    "ShoulderPitchJoint",
    "ShoulderYawJoint",
    "ElbowJoint",
    "UpperWristYawJoint",
    "UpperWristPitchJoint",
    "LowerWristYawJoint",
];

/// Degree-of-freedom counts the arm hardware can be built with.
pub const SUPPORTED_DOF: [usize; 2] = [4, 7];

/// Return `dof` if the arm hardware supports it.
///
/// # Errors
///
/// Returns [`ArmError::Configuration`] for any count other than 4 or 7.
pub fn validate_dof(dof: usize) -> Result<usize, ArmError> {
    if SUPPORTED_DOF.contains(&dof) {
        Ok(dof)
    } else {
        Err(ArmError::Configuration(format!(
            "unsupported degrees_of_freedom {dof} (expected one of {SUPPORTED_DOF:?})"
        )))
    }
}

/// Label the first `dof` canonical joints with `prefix`, e.g.
/// `"left/YawJoint"`.
///
/// Counts beyond the canonical seven get a generic `JointN` suffix so the
/// returned list always has exactly `dof` entries.
pub fn canonical_joint_names(prefix: &str, dof: usize) -> Vec<String> {
    (0..dof)
        .map(|i| match CANONICAL_JOINT_NAMES.get(i) {
            Some(name) => format!("{prefix}/{name}"),
            None => format!("{prefix}/Joint{}", i + 1),
        })
        .collect()
}

/// Fixed-length vector of per-joint scalars (positions, torques, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointVector(Vec<f64>);

impl JointVector {
    /// All-zero vector of length `n`.
    pub fn zeros(n: usize) -> Self {
        Self(vec![0.0; n])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.0
    }

    /// Overwrite every element with zero, keeping the length.
    pub fn set_zero(&mut self) {
        self.0.iter_mut().for_each(|v| *v = 0.0);
    }

    /// `true` when every element is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Verify that this vector has exactly `expected` elements.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::DofMismatch`] otherwise.
    pub fn check_len(&self, expected: usize) -> Result<(), ArmError> {
        if self.0.len() == expected {
            Ok(())
        } else {
            Err(ArmError::DofMismatch {
                expected,
                actual: self.0.len(),
            })
        }
    }

    /// Element-wise add the first `limit` components of `other` into `self`.
    ///
    /// Indices past the end of either vector are dropped, so the length of
    /// `self` never changes.
    pub fn add_truncated(&mut self, other: &JointVector, limit: usize) {
        for (acc, v) in self.0.iter_mut().zip(other.0.iter()).take(limit) {
            *acc += v;
        }
    }
}

impl From<Vec<f64>> for JointVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl From<&[f64]> for JointVector {
    fn from(values: &[f64]) -> Self {
        Self(values.to_vec())
    }
}

impl From<JointVector> for Vec<f64> {
    fn from(v: JointVector) -> Self {
        v.0
    }
}

impl Index<usize> for JointVector {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl IndexMut<usize> for JointVector {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.0[i]
    }
}

/// Timestamped per-joint state published for external observers.
///
/// All four sequences have the same length as `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointStateSnapshot {
    pub stamp: DateTime<Utc>,
    pub name: Vec<String>,
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    pub effort: Vec<f64>,
}

impl JointStateSnapshot {
    /// Zeroed snapshot labelled with `names`.
    pub fn new(names: Vec<String>) -> Self {
        let n = names.len();
        Self {
            stamp: Utc::now(),
            name: names,
            position: vec![0.0; n],
            velocity: vec![0.0; n],
            effort: vec![0.0; n],
        }
    }

    pub fn dof(&self) -> usize {
        self.name.len()
    }

    /// Copy the given vectors into the snapshot and stamp it with the current
    /// time. Elements beyond the snapshot's length are ignored; missing ones
    /// keep their previous value.
    pub fn fill(&mut self, position: &JointVector, velocity: &JointVector, effort: &JointVector) {
        self.stamp = Utc::now();
        copy_prefix(&mut self.position, position.as_slice());
        copy_prefix(&mut self.velocity, velocity.as_slice());
        copy_prefix(&mut self.effort, effort.as_slice());
    }
}

fn copy_prefix(dst: &mut [f64], src: &[f64]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = *s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_for_four_dof_arm() {
        let names = canonical_joint_names("wam", 4);
        assert_eq!(
            names,
            vec![
                "wam/YawJoint",
                "wam/ShoulderPitchJoint",
                "wam/ShoulderYawJoint",
                "wam/ElbowJoint"
            ]
        );
    }

    #[test]
    fn canonical_names_extend_past_seven() {
        let names = canonical_joint_names("x", 8);
        assert_eq!(names.len(), 8);
        assert_eq!(names[6], "x/LowerWristYawJoint");
        assert_eq!(names[7], "x/Joint8");
    }

    #[test]
    fn validate_dof_accepts_only_four_and_seven() {
        assert_eq!(validate_dof(4).unwrap(), 4);
        assert_eq!(validate_dof(7).unwrap(), 7);
        assert!(matches!(validate_dof(6), Err(ArmError::Configuration(_))));
        assert!(validate_dof(0).is_err());
    }

    #[test]
    fn add_truncated_respects_limit_and_length() {
        let mut acc = JointVector::zeros(2);
        acc.add_truncated(&JointVector::from(vec![1.0, 2.0, 3.0, 4.0]), 4);
        assert_eq!(acc.as_slice(), &[1.0, 2.0]);

        acc.add_truncated(&JointVector::from(vec![10.0, 10.0]), 1);
        assert_eq!(acc.as_slice(), &[11.0, 2.0]);
    }

    #[test]
    fn add_truncated_with_short_source() {
        let mut acc = JointVector::zeros(3);
        acc.add_truncated(&JointVector::from(vec![5.0]), 3);
        assert_eq!(acc.as_slice(), &[5.0, 0.0, 0.0]);
    }

    #[test]
    fn check_len_reports_mismatch() {
        let v = JointVector::zeros(3);
        assert!(v.check_len(3).is_ok());
        assert_eq!(
            v.check_len(7),
            Err(ArmError::DofMismatch {
                expected: 7,
                actual: 3
            })
        );
    }

    #[test]
    fn set_zero_keeps_length() {
        let mut v = JointVector::from(vec![1.0, -2.0, 3.0]);
        assert!(!v.is_zero());
        v.set_zero();
        assert_eq!(v.len(), 3);
        assert!(v.is_zero());
    }

    #[test]
    fn snapshot_fill_copies_values() {
        let mut snap = JointStateSnapshot::new(canonical_joint_names("a", 4));
        snap.fill(
            &JointVector::from(vec![0.1, 0.2, 0.3, 0.4]),
            &JointVector::zeros(4),
            &JointVector::from(vec![1.0, 2.0, 3.0, 4.0]),
        );
        assert_eq!(snap.dof(), 4);
        assert_eq!(snap.position, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(snap.effort, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn snapshot_serializes_as_json() {
        let snap = JointStateSnapshot::new(canonical_joint_names("a", 4));
        let json = serde_json::to_string(&snap).unwrap();
        let back: JointStateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, snap.name);
        assert_eq!(back.stamp, snap.stamp);
    }

    #[test]
    fn joint_vector_is_a_plain_json_array() {
        let v = JointVector::from(vec![1.0, 2.5]);
        assert_eq!(serde_json::to_string(&v).unwrap(), "[1.0,2.5]");
    }
}
