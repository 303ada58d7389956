//! Generation lifecycle and the time-sliced work loop.

use std::rc::Rc;
use std::sync::Arc;

use crate::config::ReconcilerConfig;
use crate::element::{Element, Props};
use crate::error::RenderError;
use crate::fiber::{EffectTag, Fiber, FiberArena, FiberId, FiberKind};
use crate::host::{HostRenderer, NodeId};
use crate::platform::{IdleDeadline, IdleScheduler, Unbounded};
use crate::runtime::{Runtime, RuntimeHandle};

/// Outcome of one [`Reconciler::work_loop`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// No generation was in progress.
    Idle,
    /// The deadline ran out with units left; call again.
    Yielded,
    /// The generation finished building and was committed.
    Committed,
}

pub(crate) struct PendingDeletion {
    pub(crate) fiber: FiberId,
    tag: EffectTag,
}

type ErrorHandler = Box<dyn FnMut(&RenderError)>;

/// Owns one host tree and every generation rendered into it.
pub struct Reconciler<H: HostRenderer> {
    pub(crate) host: H,
    pub(crate) fibers: FiberArena,
    pub(crate) runtime: Runtime,
    pub(crate) config: ReconcilerConfig,
    pub(crate) next_unit: Option<FiberId>,
    pub(crate) wip_root: Option<FiberId>,
    pub(crate) current_root: Option<FiberId>,
    pub(crate) deletions: Vec<PendingDeletion>,
    generation: u64,
    poisoned: bool,
    error_handler: Option<ErrorHandler>,
}

impl<H: HostRenderer> Reconciler<H> {
    pub fn new(host: H, scheduler: Arc<dyn IdleScheduler>) -> Self {
        Self::with_runtime(host, Runtime::new(scheduler))
    }

    pub fn with_runtime(host: H, runtime: Runtime) -> Self {
        Self {
            host,
            fibers: FiberArena::default(),
            runtime,
            config: ReconcilerConfig::default(),
            next_unit: None,
            wip_root: None,
            current_root: None,
            deletions: Vec::new(),
            generation: 0,
            poisoned: false,
            error_handler: None,
        }
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs a callback that observes every render error before it is
    /// returned from [`work_loop`](Self::work_loop).
    pub fn set_error_handler(&mut self, handler: impl FnMut(&RenderError) + 'static) {
        self.error_handler = Some(Box::new(handler));
    }

    /// Schedules `element` to be rendered into `container`.
    ///
    /// No work happens here; the tree is built by subsequent
    /// [`work_loop`](Self::work_loop) calls. A generation already in
    /// progress is abandoned. Ignored once the reconciler is
    /// [poisoned](Self::is_poisoned).
    pub fn render(&mut self, element: Element, container: NodeId) {
        if self.poisoned {
            log::error!("ignoring render: reconciler is poisoned");
            return;
        }
        let mut props = Props::new();
        props.set_children(vec![element]);
        let mut root = Fiber::new(FiberKind::HostRoot, Rc::new(props), EffectTag::None);
        root.host = Some(container);
        root.previous = self.current_root;
        let root = self.fibers.insert(root);
        self.seed(root);
    }

    /// Performs units of work until the deadline runs low, committing the
    /// generation once it is fully built. Always asks the idle scheduler
    /// to call again.
    ///
    /// An error from the commit phase poisons the reconciler: the host tree
    /// may be half updated, so every later call fails with
    /// [`RenderError::Poisoned`].
    pub fn work_loop(&mut self, deadline: &dyn IdleDeadline) -> Result<WorkStatus, RenderError> {
        if self.poisoned {
            return Err(RenderError::Poisoned);
        }
        let result = self.run_slice(deadline);
        self.runtime.request_idle_callback();
        if let Err(err) = &result {
            log::error!("generation {} aborted: {err}", self.generation);
            self.abort();
            if let Some(handler) = self.error_handler.as_mut() {
                handler(err);
            }
        }
        result
    }

    /// Runs work loops without a time limit until nothing is pending,
    /// including generations scheduled by effects.
    pub fn flush(&mut self) -> Result<(), RenderError> {
        while self.has_pending_work() {
            self.work_loop(&Unbounded)?;
        }
        Ok(())
    }

    pub fn has_pending_work(&self) -> bool {
        !self.poisoned
            && (self.next_unit.is_some()
                || self.wip_root.is_some()
                || self.runtime.has_pending_updates())
    }

    /// Whether a failed commit left the host tree out of step with the
    /// fibers.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn is_rendering(&self) -> bool {
        self.wip_root.is_some()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn fiber(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    /// Structural children of `id`, in sibling order.
    pub fn fiber_children(&self, id: FiberId) -> Vec<FiberId> {
        self.fibers.children(id).collect()
    }

    /// Number of fibers held across all live generations.
    pub fn fiber_count(&self) -> usize {
        self.fibers.len()
    }

    pub fn current_root(&self) -> Option<FiberId> {
        self.current_root
    }

    pub fn wip_root(&self) -> Option<FiberId> {
        self.wip_root
    }

    pub fn next_unit(&self) -> Option<FiberId> {
        self.next_unit
    }

    pub fn pending_deletions(&self) -> Vec<FiberId> {
        self.deletions.iter().map(|entry| entry.fiber).collect()
    }

    /// Number of generations seeded so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn run_slice(&mut self, deadline: &dyn IdleDeadline) -> Result<WorkStatus, RenderError> {
        self.apply_pending_updates();
        let mut performed = false;
        while let Some(unit) = self.next_unit {
            if performed && deadline.time_remaining() < self.config.yield_threshold {
                log::trace!("yielding with {unit:?} pending");
                return Ok(WorkStatus::Yielded);
            }
            self.next_unit = self.perform_unit_of_work(unit)?;
            performed = true;
            self.apply_pending_updates();
        }
        if self.wip_root.is_some() {
            if let Err(err) = self.commit_root() {
                self.poisoned = true;
                return Err(err);
            }
            return Ok(WorkStatus::Committed);
        }
        Ok(WorkStatus::Idle)
    }

    pub(crate) fn record_deletion(&mut self, fiber: FiberId) {
        if let Some(old) = self.fibers.get_mut(fiber) {
            self.deletions.push(PendingDeletion {
                fiber,
                tag: old.tag,
            });
            old.tag = EffectTag::Deletion;
        }
    }

    /// Forgets pending deletions, restoring the tags they overwrote on
    /// committed fibers.
    fn reset_deletions(&mut self) {
        for entry in std::mem::take(&mut self.deletions) {
            if let Some(fiber) = self.fibers.get_mut(entry.fiber) {
                fiber.tag = entry.tag;
            }
        }
    }

    fn seed(&mut self, root: FiberId) {
        self.reset_deletions();
        self.wip_root = Some(root);
        self.next_unit = Some(root);
        self.generation += 1;
        log::debug!(
            "seeded generation {} at {root:?} ({})",
            self.generation,
            self.fibers
                .get(root)
                .map(|fiber| fiber.kind.label())
                .unwrap_or("?")
        );
        self.runtime.request_idle_callback();
    }

    fn abort(&mut self) {
        self.reset_deletions();
        self.wip_root = None;
        self.next_unit = None;
        self.collect_garbage();
    }

    /// Frees fibers not reachable from the current root.
    pub(crate) fn collect_garbage(&mut self) {
        let freed = match self.current_root {
            Some(root) => self.fibers.retain_reachable(root),
            None => {
                let count = self.fibers.len();
                self.fibers = FiberArena::default();
                count
            }
        };
        if freed > 0 {
            log::debug!("freed {freed} unreachable fibers");
        }
    }

    /// Turns queued state updates into a generation.
    ///
    /// Updates from fibers outside the committed tree are dropped. An
    /// in-flight root render restarts from the same root element. Otherwise
    /// the new generation starts at the lowest common ancestor of every
    /// requester and of the in-flight generation's origin.
    fn apply_pending_updates(&mut self) {
        let requested = self.runtime.take_pending_updates();
        if requested.is_empty() {
            return;
        }
        let Some(current) = self.current_root else {
            log::warn!(
                "dropping {} state updates: nothing has been committed",
                requested.len()
            );
            return;
        };

        let mut targets = Vec::with_capacity(requested.len());
        for fiber in requested {
            if self.fibers.is_attached(fiber, current) {
                targets.push(fiber);
            } else {
                log::warn!("dropping state update from detached fiber {fiber:?}");
            }
        }
        if targets.is_empty() {
            return;
        }

        let in_flight = self
            .wip_root
            .and_then(|root| self.fibers.get(root))
            .map(|root| (root.kind.clone(), root.previous));
        match in_flight {
            Some((FiberKind::HostRoot, _)) => self.restart_root(),
            Some((_, Some(origin))) => {
                targets.push(origin);
                self.seed_subtree(&targets);
            }
            _ => self.seed_subtree(&targets),
        }
    }

    fn restart_root(&mut self) {
        let Some(old) = self.wip_root.and_then(|root| self.fibers.get(root)) else {
            return;
        };
        let mut root = Fiber::new(FiberKind::HostRoot, Rc::clone(&old.props), EffectTag::None);
        root.host = old.host;
        root.previous = old.previous;
        log::debug!("restarting root render for state updates");
        let root = self.fibers.insert(root);
        self.seed(root);
    }

    fn seed_subtree(&mut self, targets: &[FiberId]) {
        let Some((&first, rest)) = targets.split_first() else {
            return;
        };
        let anchor = rest.iter().try_fold(first, |anchor, &target| {
            self.fibers.lowest_common_ancestor(anchor, target)
        });
        let Some(anchor) = anchor else {
            log::warn!("state updates share no ancestor; dropping them");
            return;
        };
        let Some(origin) = self.fibers.get(anchor) else {
            return;
        };
        let tag = match origin.kind {
            FiberKind::HostRoot => EffectTag::None,
            _ => EffectTag::Update,
        };
        let mut copy = Fiber::new(origin.kind.clone(), Rc::clone(&origin.props), tag);
        copy.host = origin.host;
        copy.parent = origin.parent;
        copy.sibling = origin.sibling;
        copy.previous = Some(anchor);
        let copy = self.fibers.insert(copy);
        self.seed(copy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::children;
    use crate::element::{component, create_element, Props};
    use crate::hooks::{use_state, SetState};
    use crate::element::{EventHandler, PropValue};
    use crate::error::HostError;
    use crate::host::MemoryHost;
    use crate::runtime::DefaultScheduler;
    use std::cell::{Cell, RefCell};
    use std::time::Duration;

    /// Deadline that admits a fixed number of units after the first.
    struct Units(Cell<usize>);

    impl IdleDeadline for Units {
        fn time_remaining(&self) -> Duration {
            let left = self.0.get();
            if left == 0 {
                return Duration::ZERO;
            }
            self.0.set(left - 1);
            Duration::from_secs(1)
        }
    }

    fn reconciler() -> (Reconciler<MemoryHost>, NodeId) {
        let mut host = MemoryHost::new();
        let container = host.create_container("root");
        (Reconciler::new(host, Arc::new(DefaultScheduler)), container)
    }

    fn tree() -> Element {
        create_element(
            "div",
            Props::new(),
            children![
                create_element("h1", Props::new(), children!["1"]),
                create_element("p", Props::new(), []),
            ],
        )
    }

    #[test]
    fn render_performs_no_work_until_the_loop_runs() {
        let (mut reconciler, container) = reconciler();
        reconciler.render(tree(), container);
        assert!(reconciler.has_pending_work());
        assert!(reconciler.host().children(container).is_empty());
        assert_eq!(reconciler.next_unit(), reconciler.wip_root());
        assert_eq!(reconciler.work_loop(&Unbounded).unwrap(), WorkStatus::Committed);
        assert_eq!(reconciler.work_loop(&Unbounded).unwrap(), WorkStatus::Idle);
        assert_eq!(reconciler.host().text_content(container), "1");
    }

    #[test]
    fn host_tree_is_untouched_until_the_final_slice() {
        let (mut reconciler, container) = reconciler();
        reconciler.render(tree(), container);
        let mut slices = 0;
        loop {
            slices += 1;
            match reconciler.work_loop(&Units(Cell::new(0))).unwrap() {
                WorkStatus::Yielded => assert!(reconciler.host().children(container).is_empty()),
                WorkStatus::Committed => break,
                WorkStatus::Idle => panic!("generation vanished"),
            }
        }
        // root, div, h1, text, p
        assert_eq!(slices, 5);
        assert_eq!(reconciler.host().children(container).len(), 1);
    }

    #[test]
    fn updates_during_a_root_render_restart_it() {
        thread_local! {
            static SETTER: RefCell<Option<SetState<i32>>> = const { RefCell::new(None) };
        }
        let counter = component(|_props: &Props| {
            let (count, set) = use_state(0)?;
            SETTER.with(|slot| {
                slot.borrow_mut().get_or_insert(set);
            });
            Ok(create_element("span", Props::new(), [count.into()]))
        });
        let (mut reconciler, container) = reconciler();
        let app = create_element(counter, Props::new(), []);
        reconciler.render(app.clone(), container);
        reconciler.flush().unwrap();

        reconciler.render(app, container);
        reconciler.work_loop(&Units(Cell::new(1))).unwrap();
        let superseded = reconciler.wip_root();
        SETTER.with(|slot| slot.borrow().as_ref().unwrap().set(5));
        reconciler.flush().unwrap();

        assert_ne!(reconciler.current_root(), superseded);
        assert_eq!(reconciler.host().text_content(container), "5");
        assert_eq!(reconciler.generation(), 3);
    }

    /// Memory host whose `remove_child` can be made to fail.
    #[derive(Default)]
    struct BrittleHost {
        inner: MemoryHost,
        refuse_removals: bool,
    }

    impl HostRenderer for BrittleHost {
        fn create_element(&mut self, tag: &str) -> Result<NodeId, HostError> {
            self.inner.create_element(tag)
        }

        fn create_text_node(&mut self) -> Result<NodeId, HostError> {
            self.inner.create_text_node()
        }

        fn set_attribute(
            &mut self,
            node: NodeId,
            name: &str,
            value: &PropValue,
        ) -> Result<(), HostError> {
            self.inner.set_attribute(node, name, value)
        }

        fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), HostError> {
            self.inner.remove_attribute(node, name)
        }

        fn add_event_listener(
            &mut self,
            node: NodeId,
            event: &str,
            handler: &EventHandler,
        ) -> Result<(), HostError> {
            self.inner.add_event_listener(node, event, handler)
        }

        fn remove_event_listener(
            &mut self,
            node: NodeId,
            event: &str,
            handler: &EventHandler,
        ) -> Result<(), HostError> {
            self.inner.remove_event_listener(node, event, handler)
        }

        fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
            self.inner.append_child(parent, child)
        }

        fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
            if self.refuse_removals {
                return Err(HostError::NotAChild { parent, child });
            }
            self.inner.remove_child(parent, child)
        }
    }

    #[test]
    fn failed_commit_poisons_the_reconciler() {
        let mut host = BrittleHost::default();
        let container = host.inner.create_container("root");
        let mut reconciler = Reconciler::new(host, Arc::new(DefaultScheduler));
        let errors = Rc::new(Cell::new(0));
        {
            let errors = Rc::clone(&errors);
            reconciler.set_error_handler(move |_| errors.set(errors.get() + 1));
        }
        reconciler.render(tree(), container);
        reconciler.flush().unwrap();

        reconciler.host_mut().refuse_removals = true;
        reconciler.render(create_element("div", Props::new(), []), container);
        assert!(matches!(
            reconciler.flush(),
            Err(RenderError::Host(HostError::NotAChild { .. }))
        ));
        assert!(reconciler.is_poisoned());
        assert!(!reconciler.has_pending_work());
        assert_eq!(errors.get(), 1);

        reconciler.host_mut().refuse_removals = false;
        reconciler.render(tree(), container);
        assert!(reconciler.wip_root().is_none());
        assert!(matches!(
            reconciler.work_loop(&Unbounded),
            Err(RenderError::Poisoned)
        ));
        assert!(reconciler.flush().is_ok());
    }
}
