//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform
//! abstraction traits defined in `fiber-core`. Applications can construct
//! a [`StdRuntime`], hand its runtime to a [`Reconciler`], and drive the
//! reconciler in time slices with an [`IdleDriver`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use fiber_core::{
    Clock, ClockDeadline, HostRenderer, IdleScheduler, Reconciler, RenderError, Runtime,
    RuntimeHandle, WorkStatus,
};

type Waker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Idle scheduler that records requests and optionally wakes an event loop.
pub struct StdIdleScheduler {
    idle_requested: AtomicBool,
    idle_waker: RwLock<Option<Waker>>,
}

impl StdIdleScheduler {
    pub fn new() -> Self {
        Self {
            idle_requested: AtomicBool::new(false),
            idle_waker: RwLock::new(None),
        }
    }

    /// Returns whether idle time has been requested since the last call.
    pub fn take_idle_request(&self) -> bool {
        self.idle_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker that will be invoked whenever idle time is requested.
    pub fn set_idle_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self
            .idle_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    /// Clears any registered idle waker.
    pub fn clear_idle_waker(&self) {
        *self
            .idle_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wake(&self) {
        let waker = self
            .idle_waker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdIdleScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdIdleScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdIdleScheduler")
            .field("idle_requested", &self.idle_requested.load(Ordering::SeqCst))
            .finish()
    }
}

impl IdleScheduler for StdIdleScheduler {
    fn request_idle_callback(&self) {
        self.idle_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Clock implementation backed by [`std::time`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn elapsed(&self, since: Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Convenience container bundling the standard scheduler and clock.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdIdleScheduler>,
    clock: StdClock,
    runtime: Runtime,
}

impl StdRuntime {
    pub fn new() -> Self {
        let scheduler = Arc::new(StdIdleScheduler::default());
        let runtime = Runtime::new(scheduler.clone());
        Self {
            scheduler,
            clock: StdClock,
            runtime,
        }
    }

    /// Returns a [`fiber_core::Runtime`] configured with the standard scheduler.
    pub fn runtime(&self) -> Runtime {
        self.runtime.clone()
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn scheduler(&self) -> Arc<StdIdleScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn clock(&self) -> StdClock {
        self.clock
    }

    /// Builds a reconciler over `host` that reports idle requests here.
    pub fn reconciler<H: HostRenderer>(&self, host: H) -> Reconciler<H> {
        Reconciler::with_runtime(host, self.runtime())
    }

    /// Returns whether idle time was requested since the last poll.
    pub fn take_idle_request(&self) -> bool {
        self.scheduler.take_idle_request()
    }

    pub fn set_idle_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_idle_waker(waker);
    }

    pub fn clear_idle_waker(&self) {
        self.scheduler.clear_idle_waker();
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Feeds a reconciler fixed-size time slices, standing in for a host's
/// idle callback.
#[derive(Debug, Clone)]
pub struct IdleDriver<C: Clock + Clone = StdClock> {
    clock: C,
    budget: Duration,
}

impl IdleDriver<StdClock> {
    pub fn new(budget: Duration) -> Self {
        Self::with_clock(StdClock, budget)
    }
}

impl<C: Clock + Clone> IdleDriver<C> {
    pub fn with_clock(clock: C, budget: Duration) -> Self {
        Self { clock, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Runs one idle slice.
    pub fn tick<H: HostRenderer>(
        &self,
        reconciler: &mut Reconciler<H>,
    ) -> Result<WorkStatus, RenderError> {
        let deadline = ClockDeadline::start(self.clock.clone(), self.budget);
        reconciler.work_loop(&deadline)
    }

    /// Runs slices until the reconciler has nothing left to do. Returns the
    /// number of slices used.
    pub fn run_until_idle<H: HostRenderer>(
        &self,
        reconciler: &mut Reconciler<H>,
    ) -> Result<usize, RenderError> {
        let mut slices = 0;
        while reconciler.has_pending_work() {
            let status = self.tick(reconciler)?;
            slices += 1;
            log::trace!("idle slice {slices}: {status:?}");
        }
        Ok(slices)
    }
}

impl Default for IdleDriver<StdClock> {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use fiber_core::{
        children, component, create_element, use_state, MemoryHost, Props, SetState, WorkStatus,
    };

    use super::{IdleDriver, StdRuntime};

    #[test]
    fn state_updates_request_idle_time_and_rerender() {
        thread_local! {
            static SETTER: RefCell<Option<SetState<i32>>> = const { RefCell::new(None) };
        }
        let counter = component(|_props: &Props| {
            let (count, set) = use_state(0)?;
            SETTER.with(|slot| *slot.borrow_mut() = Some(set));
            Ok(create_element("p", Props::new(), children![count]))
        });

        let runtime = StdRuntime::new();
        let wakes = Arc::new(AtomicUsize::new(0));
        {
            let wakes = Arc::clone(&wakes);
            runtime.set_idle_waker(move || {
                wakes.fetch_add(1, Ordering::SeqCst);
            });
        }
        let mut host = MemoryHost::new();
        let container = host.create_container("root");
        let mut reconciler = runtime.reconciler(host);
        reconciler.render(create_element(counter, Props::new(), []), container);
        assert!(runtime.take_idle_request(), "render should request idle time");

        let driver = IdleDriver::new(Duration::from_secs(1));
        assert!(driver.run_until_idle(&mut reconciler).unwrap() >= 1);
        assert_eq!(reconciler.host().text_content(container), "0");
        assert!(runtime.take_idle_request(), "work loop re-requests idle time");

        SETTER.with(|slot| slot.borrow().as_ref().unwrap().set(7));
        assert!(runtime.take_idle_request(), "setter should request idle time");
        assert_eq!(driver.tick(&mut reconciler).unwrap(), WorkStatus::Committed);
        assert_eq!(reconciler.host().text_content(container), "7");
        assert!(wakes.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn exhausted_budget_still_advances_one_unit_per_slice() {
        let runtime = StdRuntime::new();
        let mut host = MemoryHost::new();
        let container = host.create_container("root");
        let mut reconciler = runtime.reconciler(host);
        reconciler.render(
            create_element("ul", Props::new(), children![create_element("li", Props::new(), [])]),
            container,
        );
        let driver = IdleDriver::new(Duration::ZERO);
        // root, ul, li
        assert_eq!(driver.run_until_idle(&mut reconciler).unwrap(), 3);
        assert_eq!(reconciler.host().children(container).len(), 1);
    }
}
