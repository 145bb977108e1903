//! Backward-difference joint velocity estimate from successive position
//! samples.

use std::time::Instant;

use armature_types::JointVector;

#[derive(Debug, Clone)]
pub struct VelocityEstimator {
    last_position: JointVector,
    last_stamp: Option<Instant>,
    velocity: JointVector,
}

impl VelocityEstimator {
    pub fn new(dof: usize) -> Self {
        Self {
            last_position: JointVector::zeros(dof),
            last_stamp: None,
            velocity: JointVector::zeros(dof),
        }
    }

    pub fn velocity(&self) -> &JointVector {
        &self.velocity
    }

    pub fn update(&mut self, position: &JointVector) {
        self.update_at(Instant::now(), position);
    }

    /// Feed a position sample taken at `now`.
    ///
    /// Samples whose length differs from the configured DOF are ignored.
    /// The velocity stays zero until two samples have been seen.
    pub fn update_at(&mut self, now: Instant, position: &JointVector) {
        if position.len() != self.last_position.len() {
            return;
        }
        if let Some(last) = self.last_stamp {
            let dt = now.saturating_duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let vel = self.velocity.as_mut_slice();
                let cur = position.as_slice();
                let prev = self.last_position.as_slice();
                for i in 0..vel.len() {
                    vel[i] = (cur[i] - prev[i]) / dt;
                }
            }
        }
        self.last_position.clone_from(position);
        self.last_stamp = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_stamp = None;
        self.velocity.set_zero();
    }
}
