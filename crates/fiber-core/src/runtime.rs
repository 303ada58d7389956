use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::fiber::FiberId;
use crate::platform::IdleScheduler;

struct RuntimeInner {
    scheduler: Arc<dyn IdleScheduler>,
    pending_updates: RefCell<VecDeque<FiberId>>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn IdleScheduler>) -> Self {
        Self {
            scheduler,
            pending_updates: RefCell::new(VecDeque::new()),
        }
    }

    fn request_idle_callback(&self) {
        self.scheduler.request_idle_callback();
    }

    fn request_update(&self, fiber: FiberId) {
        {
            let mut pending = self.pending_updates.borrow_mut();
            if !pending.contains(&fiber) {
                pending.push_back(fiber);
            }
        }
        self.request_idle_callback();
    }

    fn take_pending_updates(&self) -> Vec<FiberId> {
        self.pending_updates.borrow_mut().drain(..).collect()
    }

    fn has_pending_updates(&self) -> bool {
        !self.pending_updates.borrow().is_empty()
    }
}

/// Shared state between a reconciler and the setters it hands out.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn IdleScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn has_pending_updates(&self) -> bool {
        self.inner.has_pending_updates()
    }

    pub fn request_idle_callback(&self) {
        self.inner.request_idle_callback();
    }

    pub(crate) fn take_pending_updates(&self) -> Vec<FiberId> {
        self.inner.take_pending_updates()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Arc::new(DefaultScheduler))
    }
}

#[derive(Default)]
pub struct DefaultScheduler;

impl IdleScheduler for DefaultScheduler {
    fn request_idle_callback(&self) {}
}

/// Weak reference to a [`Runtime`]. Outlives the reconciler harmlessly:
/// requests made after it is dropped are ignored.
#[derive(Clone, Default)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    /// Queues a re-render of `fiber` and asks the host for idle time.
    pub fn request_update(&self, fiber: FiberId) {
        if let Some(inner) = self.0.upgrade() {
            inner.request_update(fiber);
        }
    }

    pub fn request_idle_callback(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.request_idle_callback();
        }
    }

    pub fn has_pending_updates(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.has_pending_updates())
            .unwrap_or(false)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}
