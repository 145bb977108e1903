//! [`Lifecycle`] – the state machine every component runs under.
//!
//! A component implements the [`Component`] hooks; [`Lifecycle`] owns it and
//! decides which hook may run in which state:
//!
//! ```text
//!                 configure            start
//! PreOperational ──────────► Configured ─────► Running
//!       │                        │   ▲           │ stop
//!       │ cleanup                │   └─ start ── Stopped
//!       ▼                        ▼               │
//!    Cleaned ◄─────────────── cleanup ◄──────────┘
//! ```
//!
//! * A failed `configure` leaves the component in `PreOperational`; the hook
//!   is responsible for releasing whatever it acquired before failing.
//! * `stop` is accepted in every state and only runs the hook when `Running`.
//! * `cleanup` is rejected while `Running` and is a no-op once `Cleaned`.
//! * `update` only runs while `Running` and never changes the state.

use armature_types::{ArmError, LifecycleState, Transition};
use tracing::{error, info, warn};

/// Hooks a component supplies to the [`Lifecycle`] state machine.
pub trait Component: Send {
    /// Instance name used in log records and errors.
    fn name(&self) -> &str;

    /// Allocate buffers and acquire resources.
    ///
    /// # Errors
    ///
    /// Any error aborts the transition.  Implementations must release every
    /// resource acquired before the failure.
    fn configure_hook(&mut self) -> Result<(), ArmError>;

    /// Verify connections and go live.
    ///
    /// # Errors
    ///
    /// An error aborts the transition and leaves the state unchanged.
    fn start_hook(&mut self) -> Result<(), ArmError> {
        Ok(())
    }

    /// One periodic cycle.  Must not block; faults are logged, not returned.
    fn update_hook(&mut self);

    /// Bring the component to a safe idle.  Cannot fail.
    fn stop_hook(&mut self) {}

    /// Release resources.  Must tolerate a partially configured component.
    fn cleanup_hook(&mut self) {}
}

/// Owns a [`Component`] and enforces its lifecycle.
///
/// Dropping a `Lifecycle` stops and cleans up the component if that has not
/// happened yet.
pub struct Lifecycle<C: Component> {
    component: C,
    state: LifecycleState,
}

impl<C: Component> Lifecycle<C> {
    /// Wrap `component` in the `PreOperational` state.
    pub fn new(component: C) -> Self {
        Self {
            component,
            state: LifecycleState::PreOperational,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    pub fn component(&self) -> &C {
        &self.component
    }

    pub fn component_mut(&mut self) -> &mut C {
        &mut self.component
    }

    /// `PreOperational → Configured`.
    ///
    /// # Errors
    ///
    /// [`ArmError::InvalidTransition`] outside `PreOperational`, or the
    /// hook's error (state stays `PreOperational`).
    pub fn configure(&mut self) -> Result<(), ArmError> {
        self.require(&[LifecycleState::PreOperational], Transition::Configure)?;
        match self.component.configure_hook() {
            Ok(()) => {
                self.enter(LifecycleState::Configured);
                Ok(())
            }
            Err(e) => {
                error!(component = %self.component.name(), error = %e, "configure failed");
                Err(e)
            }
        }
    }

    /// `Configured | Stopped → Running`.
    ///
    /// # Errors
    ///
    /// [`ArmError::InvalidTransition`] from any other state, or the hook's
    /// error (state unchanged).
    pub fn start(&mut self) -> Result<(), ArmError> {
        self.require(
            &[LifecycleState::Configured, LifecycleState::Stopped],
            Transition::Start,
        )?;
        match self.component.start_hook() {
            Ok(()) => {
                self.enter(LifecycleState::Running);
                Ok(())
            }
            Err(e) => {
                error!(component = %self.component.name(), error = %e, "start failed");
                Err(e)
            }
        }
    }

    /// Run one cycle.  Returns `false` without touching the component when
    /// it is not `Running`.
    pub fn update(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.component.update_hook();
        true
    }

    /// `Running → Stopped`.  A no-op in every other state.
    pub fn stop(&mut self) {
        if self.is_running() {
            self.component.stop_hook();
            self.enter(LifecycleState::Stopped);
        }
    }

    /// `PreOperational | Configured | Stopped → Cleaned`.  A no-op once
    /// `Cleaned`.
    ///
    /// # Errors
    ///
    /// [`ArmError::InvalidTransition`] while `Running`.
    pub fn cleanup(&mut self) -> Result<(), ArmError> {
        match self.state {
            LifecycleState::Cleaned => Ok(()),
            LifecycleState::Running => Err(self.invalid(Transition::Cleanup)),
            _ => {
                self.component.cleanup_hook();
                self.enter(LifecycleState::Cleaned);
                Ok(())
            }
        }
    }

    /// Run `op` on the component if the current state is one of `allowed`.
    ///
    /// # Errors
    ///
    /// [`ArmError::Unavailable`] when the state does not permit the
    /// operation, otherwise whatever `op` returns.
    pub fn operate<R>(
        &mut self,
        allowed: &[LifecycleState],
        operation: &str,
        op: impl FnOnce(&mut C) -> Result<R, ArmError>,
    ) -> Result<R, ArmError> {
        if !allowed.contains(&self.state) {
            warn!(
                component = %self.component.name(),
                state = %self.state,
                operation,
                "operation rejected"
            );
            return Err(ArmError::Unavailable {
                component: self.component.name().to_string(),
                state: self.state,
                operation: operation.to_string(),
            });
        }
        op(&mut self.component)
    }

    fn require(&self, allowed: &[LifecycleState], transition: Transition) -> Result<(), ArmError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(transition))
        }
    }

    fn invalid(&self, transition: Transition) -> ArmError {
        ArmError::InvalidTransition {
            component: self.component.name().to_string(),
            state: self.state,
            transition,
        }
    }

    fn enter(&mut self, next: LifecycleState) {
        info!(component = %self.component.name(), from = %self.state, to = %next, "lifecycle transition");
        self.state = next;
    }
}

impl<C: Component> Drop for Lifecycle<C> {
    fn drop(&mut self) {
        self.stop();
        let _ = self.cleanup();
    }
}
