use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fiber_core::{
    Clock, DefaultScheduler, Element, HostError, HostOp, IdleDeadline, MemoryHost, NodeId,
    ReconcilerConfig, Reconciler, RenderError, Runtime, RuntimeHandle, WorkStatus,
};

/// Headless harness for exercising renders in tests.
///
/// `RenderTestRule` owns a reconciler over an in-memory host plus a root
/// container, and exposes helpers for stepping the work loop unit by unit,
/// settling all pending work, and dispatching events without a real
/// platform.
pub struct RenderTestRule {
    reconciler: Reconciler<MemoryHost>,
    container: NodeId,
    content: Option<Element>,
}

impl RenderTestRule {
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        let mut host = MemoryHost::new();
        let container = host.create_container("root");
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        Self {
            reconciler: Reconciler::with_runtime(host, runtime).with_config(config),
            container,
            content: None,
        }
    }

    /// Install `element` as the root content and render it to completion.
    pub fn set_content(&mut self, element: Element) -> Result<(), RenderError> {
        self.schedule(element);
        self.settle()
    }

    /// Seed a render of `element` without performing any work.
    pub fn schedule(&mut self, element: Element) {
        self.content = Some(element.clone());
        self.reconciler.render(element, self.container);
    }

    /// Render the installed content again.
    pub fn rerender(&mut self) -> Result<(), RenderError> {
        if let Some(element) = self.content.clone() {
            self.reconciler.render(element, self.container);
        }
        self.settle()
    }

    /// Drive the reconciler until no units, commits, or state updates remain.
    pub fn settle(&mut self) -> Result<(), RenderError> {
        self.reconciler.flush()
    }

    /// Run one work loop invocation that performs at most `units` units.
    pub fn step(&mut self, units: usize) -> Result<WorkStatus, RenderError> {
        self.reconciler.work_loop(&UnitBudget::new(units))
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn host(&self) -> &MemoryHost {
        self.reconciler.host()
    }

    pub fn host_mut(&mut self) -> &mut MemoryHost {
        self.reconciler.host_mut()
    }

    pub fn reconciler(&self) -> &Reconciler<MemoryHost> {
        &self.reconciler
    }

    pub fn reconciler_mut(&mut self) -> &mut Reconciler<MemoryHost> {
        &mut self.reconciler
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.reconciler.runtime_handle()
    }

    /// Text of every text node under the container, in tree order.
    pub fn text(&self) -> String {
        self.host().text_content(self.container)
    }

    pub fn dump_tree(&self) -> String {
        self.host().dump_tree(self.container)
    }

    /// Host children of the container.
    pub fn root_nodes(&self) -> Vec<NodeId> {
        self.host().children(self.container).to_vec()
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.host().find_by_tag(self.container, tag)
    }

    /// First node with `tag`, if any.
    pub fn find_one(&self, tag: &str) -> Option<NodeId> {
        self.find_by_tag(tag).into_iter().next()
    }

    pub fn dispatch(&self, node: NodeId, event: &str) -> Result<usize, HostError> {
        self.host().dispatch(node, event)
    }

    pub fn click(&self, node: NodeId) -> Result<usize, HostError> {
        self.dispatch(node, "click")
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        self.host_mut().take_ops()
    }
}

impl Default for RenderTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `RenderTestRule`.
pub fn run_test_render<R>(f: impl FnOnce(&mut RenderTestRule) -> R) -> R {
    let mut rule = RenderTestRule::new();
    f(&mut rule)
}

/// Deadline that admits a fixed number of units per work loop invocation.
///
/// The work loop always performs its first unit and consults the deadline
/// before each further one, so `UnitBudget::new(n)` allows `n` units in
/// total (at least one).
#[derive(Debug)]
pub struct UnitBudget {
    checks_left: Cell<usize>,
}

impl UnitBudget {
    pub fn new(units: usize) -> Self {
        Self {
            checks_left: Cell::new(units.saturating_sub(1)),
        }
    }
}

impl IdleDeadline for UnitBudget {
    fn time_remaining(&self) -> Duration {
        let left = self.checks_left.get();
        if left == 0 {
            return Duration::ZERO;
        }
        self.checks_left.set(left - 1);
        Duration::MAX
    }
}

/// Clock whose time only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
    step: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock that also moves forward by `step` every time it is read.
    pub fn auto_advancing(step: Duration) -> Self {
        let clock = Self::default();
        clock.step.store(duration_nanos(step), Ordering::SeqCst);
        clock
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(duration_nanos(by), Ordering::SeqCst);
    }

    pub fn elapsed_since_start(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl Clock for ManualClock {
    type Instant = u64;

    fn now(&self) -> u64 {
        let step = self.step.load(Ordering::SeqCst);
        self.nanos.fetch_add(step, Ordering::SeqCst)
    }

    fn elapsed(&self, since: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(since))
    }
}
