//! `armature-kernel` – lifecycle and scheduling for components.
//!
//! # Modules
//!
//! - [`lifecycle`] – [`Component`][lifecycle::Component] hooks and the
//!   [`Lifecycle`][lifecycle::Lifecycle] state machine that decides when each
//!   hook may run (configure / start / update / stop / cleanup) and how
//!   failures are rolled back.
//! - [`activity`] – [`Activity`][activity::Activity]: a periodic Tokio task
//!   that owns one lifecycle and serialises remote operations submitted via
//!   an [`ActivityHandle`][activity::ActivityHandle] with the update cycle.
//! - [`throttle`] – [`Throttle`][throttle::Throttle]: elapsed-time limiter
//!   for status publication.
//! - [`estimator`] – [`VelocityEstimator`][estimator::VelocityEstimator]:
//!   finite-difference joint velocities for published joint states.

pub mod activity;
pub mod estimator;
pub mod lifecycle;
pub mod throttle;

pub use activity::{Activity, ActivityHandle, Job};
pub use estimator::VelocityEstimator;
pub use lifecycle::{Component, Lifecycle};
pub use throttle::Throttle;
