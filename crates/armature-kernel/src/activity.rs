//! [`Activity`] – the execution context a component lives on.
//!
//! An activity owns one [`Lifecycle`] and drives it from a single Tokio task:
//! a fixed-period ticker calls [`Lifecycle::update`], and jobs submitted
//! through an [`ActivityHandle`] are executed on the same task between
//! cycles.  Because there is only ever one task touching the component,
//! operations like `load` or `calibrate` run to completion without ever
//! interleaving with an update, and the component needs no locks.
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::{Arc, atomic::AtomicBool};
//! # use std::time::Duration;
//! # use armature_kernel::{Activity, Component, Lifecycle};
//! # async fn demo<C: Component + 'static>(component: C) {
//! let shutdown = Arc::new(AtomicBool::new(false));
//! let (activity, handle) = Activity::new(Lifecycle::new(component), Duration::from_millis(2));
//! let task = tokio::spawn(activity.run(Arc::clone(&shutdown)));
//!
//! handle.configure().await.expect("configure");
//! handle.start().await.expect("start");
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use armature_types::{ArmError, LifecycleState};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::lifecycle::{Component, Lifecycle};

/// A unit of work executed on the activity's task.
pub type Job<C> = Box<dyn FnOnce(&mut Lifecycle<C>) + Send>;

/// Periodic execution context for one component.
pub struct Activity<C: Component> {
    name: String,
    period: Duration,
    lifecycle: Lifecycle<C>,
    jobs: mpsc::UnboundedReceiver<Job<C>>,
}

impl<C: Component + 'static> Activity<C> {
    /// Create an activity ticking every `period` and a handle for submitting
    /// work to it.
    pub fn new(lifecycle: Lifecycle<C>, period: Duration) -> (Self, ActivityHandle<C>) {
        let name = lifecycle.component().name().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let activity = Self {
            name: name.clone(),
            period,
            lifecycle,
            jobs: rx,
        };
        (activity, ActivityHandle { name, jobs: tx })
    }

    pub fn lifecycle(&self) -> &Lifecycle<C> {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut Lifecycle<C> {
        &mut self.lifecycle
    }

    /// Execute every queued job, then run one update cycle.
    ///
    /// Returns whether the update hook ran.  Useful for driving an activity
    /// by hand in tests or from an external scheduler.
    pub fn step(&mut self) -> bool {
        while let Ok(job) = self.jobs.try_recv() {
            job(&mut self.lifecycle);
        }
        run_cycle(&mut self.lifecycle, self.period, &self.name)
    }

    /// Drive the component until `shutdown` is raised, then hand the
    /// lifecycle back so the caller can stop and clean it up.
    ///
    /// Missed ticks are skipped rather than replayed in a burst.
    pub async fn run(self, shutdown: Arc<AtomicBool>) -> Lifecycle<C> {
        let Activity {
            name,
            period,
            mut lifecycle,
            mut jobs,
        } = self;

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut accepting = true;
        info!(activity = %name, period_us = period.as_micros() as u64, "activity started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    run_cycle(&mut lifecycle, period, &name);
                }
                job = jobs.recv(), if accepting => match job {
                    Some(job) => job(&mut lifecycle),
                    None => {
                        debug!(activity = %name, "all handles dropped");
                        accepting = false;
                    }
                },
            }
        }

        info!(activity = %name, state = %lifecycle.state(), "activity finished");
        lifecycle
    }
}

fn run_cycle<C: Component>(lifecycle: &mut Lifecycle<C>, period: Duration, name: &str) -> bool {
    let started = Instant::now();
    let ran = lifecycle.update();
    if ran {
        let elapsed = started.elapsed();
        if elapsed > period {
            warn!(
                activity = %name,
                elapsed_us = elapsed.as_micros() as u64,
                period_us = period.as_micros() as u64,
                "update overran its period"
            );
        }
    }
    ran
}

/// Cloneable handle for running work on an [`Activity`] from any task or
/// thread.
pub struct ActivityHandle<C: Component> {
    name: String,
    jobs: mpsc::UnboundedSender<Job<C>>,
}

impl<C: Component> Clone for ActivityHandle<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            jobs: self.jobs.clone(),
        }
    }
}

impl<C: Component + 'static> ActivityHandle<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` on the activity's task and wait for its result.
    ///
    /// # Errors
    ///
    /// [`ArmError::ActivityClosed`] when the activity has finished before
    /// the job could run.
    pub async fn call<R, F>(&self, f: F) -> Result<R, ArmError>
    where
        F: FnOnce(&mut Lifecycle<C>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let rx = self.submit(f)?;
        rx.await.map_err(|_| self.closed())
    }

    /// Blocking variant of [`call`](Self::call) for threads outside the Tokio
    /// runtime (e.g. an interactive console).  Must not be used from within
    /// an async context.
    ///
    /// # Errors
    ///
    /// [`ArmError::ActivityClosed`], as for [`call`](Self::call).
    pub fn blocking_call<R, F>(&self, f: F) -> Result<R, ArmError>
    where
        F: FnOnce(&mut Lifecycle<C>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let rx = self.submit(f)?;
        rx.blocking_recv().map_err(|_| self.closed())
    }

    pub async fn configure(&self) -> Result<(), ArmError> {
        self.call(|lc| lc.configure()).await?
    }

    pub async fn start(&self) -> Result<(), ArmError> {
        self.call(|lc| lc.start()).await?
    }

    pub async fn stop(&self) -> Result<(), ArmError> {
        self.call(|lc| lc.stop()).await
    }

    pub async fn cleanup(&self) -> Result<(), ArmError> {
        self.call(|lc| lc.cleanup()).await?
    }

    pub async fn state(&self) -> Result<LifecycleState, ArmError> {
        self.call(|lc| lc.state()).await
    }

    fn submit<R, F>(&self, f: F) -> Result<oneshot::Receiver<R>, ArmError>
    where
        F: FnOnce(&mut Lifecycle<C>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job<C> = Box::new(move |lc| {
            // The caller may have given up waiting; nothing to do then.
            let _ = tx.send(f(lc));
        });
        self.jobs.send(job).map_err(|_| self.closed())?;
        Ok(rx)
    }

    fn closed(&self) -> ArmError {
        ArmError::ActivityClosed(self.name.clone())
    }
}
