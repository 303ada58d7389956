//! Platform abstraction traits for the reconciler's scheduling services.
//!
//! The reconciler never sleeps or polls on its own. The host platform owns
//! the idle-time primitive: it calls [`Reconciler::work_loop`] with a
//! deadline and is asked, through [`IdleScheduler`], to do so again.
//!
//! [`Reconciler::work_loop`]: crate::Reconciler::work_loop

use std::time::Duration;

/// Requests idle-time callbacks from the host platform.
///
/// Implementations must eventually invoke the reconciler's work loop after
/// each request. They must be safe to share across threads even though the
/// reconciler itself only runs on one.
pub trait IdleScheduler: Send + Sync {
    /// Ask the host to run the work loop again when it is idle.
    fn request_idle_callback(&self);
}

/// Time budget handed to one invocation of the work loop.
pub trait IdleDeadline {
    /// Time left before the invocation should yield back to the host.
    fn time_remaining(&self) -> Duration;
}

/// Provides timing information for deadline implementations.
pub trait Clock: Send + Sync {
    /// Instant type produced by this clock implementation.
    type Instant: Copy + Send + Sync;

    /// Returns the current instant.
    fn now(&self) -> Self::Instant;

    /// Returns the time elapsed since `since`.
    fn elapsed(&self, since: Self::Instant) -> Duration;
}

/// Deadline that never runs out; used to flush a generation synchronously.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbounded;

impl IdleDeadline for Unbounded {
    fn time_remaining(&self) -> Duration {
        Duration::MAX
    }
}

/// Deadline measured against a [`Clock`] from the moment it was started.
#[derive(Debug, Clone)]
pub struct ClockDeadline<C: Clock> {
    clock: C,
    start: C::Instant,
    budget: Duration,
}

impl<C: Clock> ClockDeadline<C> {
    pub fn start(clock: C, budget: Duration) -> Self {
        let start = clock.now();
        Self {
            clock,
            start,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

impl<C: Clock> IdleDeadline for ClockDeadline<C> {
    fn time_remaining(&self) -> Duration {
        self.budget.saturating_sub(self.clock.elapsed(self.start))
    }
}
