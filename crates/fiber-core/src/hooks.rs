//! State and effect hooks.
//!
//! Hooks are identified by call order within one component evaluation. The
//! reconciler installs a [`HookFrame`] for the fiber being evaluated; hook
//! functions find it through a thread-local and append to it.

use std::any::{type_name, Any};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::{HookError, HookKind, OrderViolation};
use crate::fiber::FiberId;
use crate::runtime::RuntimeHandle;

enum Action<T> {
    Replace(T),
    Update(Rc<dyn Fn(&T) -> T>),
}

impl<T: Clone> Clone for Action<T> {
    fn clone(&self) -> Self {
        match self {
            Action::Replace(value) => Action::Replace(value.clone()),
            Action::Update(update) => Action::Update(Rc::clone(update)),
        }
    }
}

/// Type-erased state hook. One cell lives as long as its hook position
/// stays mounted, shared by every generation of the component.
pub(crate) trait StateCell: Any {
    fn pending_actions(&self) -> usize;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
    /// Adopts `staged` as the committed value, drops the first `consumed`
    /// queued actions and binds the cell to `fiber`. Returns whether
    /// actions queued after evaluation remain.
    fn commit(&self, fiber: FiberId, staged: &dyn Any, consumed: usize) -> bool;
}

pub(crate) struct StateSlot<T> {
    fiber: Cell<FiberId>,
    value: RefCell<T>,
    queue: RefCell<Vec<Action<T>>>,
}

impl<T: Clone> StateSlot<T> {
    fn new(value: T, fiber: FiberId) -> Self {
        Self {
            fiber: Cell::new(fiber),
            value: RefCell::new(value),
            queue: RefCell::new(Vec::new()),
        }
    }

    /// Committed value with every queued action applied in enqueue order,
    /// and how many actions that took. The queue is only drained at commit
    /// so an abandoned generation can be rebuilt from the same cell.
    fn folded(&self) -> (T, usize) {
        let actions: Vec<Action<T>> = self.queue.borrow().clone();
        let consumed = actions.len();
        let value = actions
            .into_iter()
            .fold(self.value.borrow().clone(), |state, action| match action {
                Action::Replace(value) => value,
                Action::Update(update) => update(&state),
            });
        (value, consumed)
    }
}

impl<T: Clone + 'static> StateCell for StateSlot<T> {
    fn pending_actions(&self) -> usize {
        self.queue.borrow().len()
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }

    fn commit(&self, fiber: FiberId, staged: &dyn Any, consumed: usize) -> bool {
        self.fiber.set(fiber);
        if let Some(value) = staged.downcast_ref::<T>() {
            *self.value.borrow_mut() = value.clone();
        }
        let mut queue = self.queue.borrow_mut();
        let consumed = consumed.min(queue.len());
        queue.drain(..consumed);
        !queue.is_empty()
    }
}

/// A state hook as one generation evaluated it.
#[derive(Clone)]
pub(crate) struct StateRecord {
    cell: Rc<dyn StateCell>,
    staged: Rc<dyn Any>,
    consumed: usize,
}

impl StateRecord {
    pub(crate) fn pending_actions(&self) -> usize {
        self.cell.pending_actions()
    }

    pub(crate) fn commit(&self, fiber: FiberId) -> bool {
        self.cell.commit(fiber, &*self.staged, self.consumed)
    }
}

/// Updater returned by [`use_state`].
///
/// A setter stays valid for as long as its component is mounted, across
/// any number of re-renders.
pub struct SetState<T> {
    slot: Rc<StateSlot<T>>,
    runtime: RuntimeHandle,
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: 'static> SetState<T> {
    /// Replaces the state on the next render.
    pub fn set(&self, value: T) {
        self.dispatch(Action::Replace(value));
    }

    /// Derives the next state from the previous one on the next render.
    pub fn update(&self, update: impl Fn(&T) -> T + 'static) {
        self.dispatch(Action::Update(Rc::new(update)));
    }

    /// Committed fiber whose state this setter changes.
    pub fn fiber(&self) -> FiberId {
        self.slot.fiber.get()
    }

    fn dispatch(&self, action: Action<T>) {
        self.slot.queue.borrow_mut().push(action);
        self.runtime.request_update(self.slot.fiber.get());
    }
}

impl<T> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetState")
            .field("fiber", &self.slot.fiber.get())
            .field("pending", &self.slot.queue.borrow().len())
            .finish()
    }
}

/// Teardown returned by an effect.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(cleanup: impl FnOnce() + 'static) -> Self {
        Self(Box::new(cleanup))
    }

    pub(crate) fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect callback may return.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

pub trait DepValue: fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn dep_eq(&self, other: &dyn DepValue) -> bool;
}

impl<T: PartialEq + fmt::Debug + 'static> DepValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dep_eq(&self, other: &dyn DepValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// One entry of an effect's dependency list. Entries of different types
/// are never equal.
#[derive(Clone, Debug)]
pub struct Dep(Rc<dyn DepValue>);

impl Dep {
    pub fn new<T: PartialEq + fmt::Debug + 'static>(value: T) -> Self {
        Self(Rc::new(value))
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        self.0.dep_eq(&*other.0)
    }
}

/// Builds an effect dependency list: `deps![]` runs once, `deps![a, b]`
/// re-runs when `a` or `b` changes.
#[macro_export]
macro_rules! deps {
    () => {
        ::std::option::Option::Some(::std::vec::Vec::<$crate::Dep>::new())
    };
    ($($dep:expr),+ $(,)?) => {
        ::std::option::Option::Some(::std::vec![$($crate::Dep::new($dep)),+])
    };
}

pub(crate) type EffectCallback = Box<dyn FnOnce() -> Option<Cleanup>>;

pub(crate) struct EffectSlot {
    pub(crate) deps: Option<Vec<Dep>>,
    pub(crate) callback: Option<EffectCallback>,
    pub(crate) cleanup: Option<Cleanup>,
}

impl EffectSlot {
    /// Whether this effect runs at commit given the hook it replaces.
    pub(crate) fn should_run(&self, previous: Option<&EffectSlot>) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        match (&self.deps, &previous.deps) {
            (None, _) => true,
            (Some(deps), _) if deps.is_empty() => false,
            (Some(_), None) => true,
            (Some(deps), Some(old)) => deps != old,
        }
    }
}

/// Hook state of the fiber currently being evaluated.
#[derive(Default)]
pub(crate) struct HookFrame {
    fiber: FiberId,
    runtime: RuntimeHandle,
    has_previous: bool,
    previous_states: Vec<Rc<dyn StateCell>>,
    previous_effects: usize,
    strict: bool,
    states: Vec<StateRecord>,
    effects: Vec<EffectSlot>,
}

impl HookFrame {
    pub(crate) fn new(fiber: FiberId, runtime: RuntimeHandle, strict: bool) -> Self {
        Self {
            fiber,
            runtime,
            strict,
            ..Self::default()
        }
    }

    /// Hooks of the fiber this one replaces.
    pub(crate) fn with_previous(mut self, states: &[StateRecord], effect_count: usize) -> Self {
        self.has_previous = true;
        self.previous_states = states.iter().map(|record| Rc::clone(&record.cell)).collect();
        self.previous_effects = effect_count;
        self
    }

    fn order_error(&self, hook: HookKind, violation: OrderViolation) -> Result<(), HookError> {
        if self.strict && self.has_previous {
            Err(HookError::Order { hook, violation })
        } else {
            Ok(())
        }
    }

    /// Verifies hook counts against the previous render and hands the
    /// collected hooks back to the reconciler.
    pub(crate) fn finish(self) -> Result<(Vec<StateRecord>, Vec<EffectSlot>), HookError> {
        if self.states.len() != self.previous_states.len() {
            self.order_error(
                HookKind::State,
                OrderViolation::CountChanged {
                    previous: self.previous_states.len(),
                    current: self.states.len(),
                },
            )?;
        }
        if self.effects.len() != self.previous_effects {
            self.order_error(
                HookKind::Effect,
                OrderViolation::CountChanged {
                    previous: self.previous_effects,
                    current: self.effects.len(),
                },
            )?;
        }
        Ok((self.states, self.effects))
    }
}

thread_local! {
    static ACTIVE_FRAME: RefCell<Option<Rc<RefCell<HookFrame>>>> = const { RefCell::new(None) };
}

struct RestoreFrame(Option<Option<Rc<RefCell<HookFrame>>>>);

impl Drop for RestoreFrame {
    fn drop(&mut self) {
        if let Some(outer) = self.0.take() {
            ACTIVE_FRAME.with(|slot| *slot.borrow_mut() = outer);
        }
    }
}

/// Runs `body` with `frame` installed as the active hook frame.
pub(crate) fn evaluate<R>(frame: HookFrame, body: impl FnOnce() -> R) -> (R, HookFrame) {
    let shared = Rc::new(RefCell::new(frame));
    let outer = ACTIVE_FRAME.with(|slot| slot.borrow_mut().replace(Rc::clone(&shared)));
    let restore = RestoreFrame(Some(outer));
    let result = body();
    drop(restore);
    let frame = Rc::try_unwrap(shared)
        .map(RefCell::into_inner)
        .unwrap_or_else(|shared| shared.take());
    (result, frame)
}

fn active_frame(hook: &'static str) -> Result<Rc<RefCell<HookFrame>>, HookError> {
    ACTIVE_FRAME
        .with(|slot| slot.borrow().clone())
        .ok_or(HookError::Misuse { hook })
}

/// Declares a piece of component state.
///
/// Returns the current value and a setter. Actions queued through the
/// setter are folded in order on the component's next render and become
/// the committed state once that render commits.
pub fn use_state<T: Clone + 'static>(initial: T) -> Result<(T, SetState<T>), HookError> {
    let frame = active_frame("use_state")?;
    let (index, previous) = {
        let frame = frame.borrow();
        let index = frame.states.len();
        (index, frame.previous_states.get(index).cloned())
    };

    let fiber = frame.borrow().fiber;
    let previous = previous.map(|cell| cell.into_any().downcast::<StateSlot<T>>());
    let (slot, value, consumed) = match previous {
        Some(Ok(slot)) => {
            let (value, consumed) = slot.folded();
            (slot, value, consumed)
        }
        Some(Err(_)) => {
            frame.borrow().order_error(
                HookKind::State,
                OrderViolation::TypeChanged {
                    index,
                    expected: type_name::<T>(),
                },
            )?;
            (Rc::new(StateSlot::new(initial.clone(), fiber)), initial, 0)
        }
        None => {
            {
                let frame = frame.borrow();
                frame.order_error(
                    HookKind::State,
                    OrderViolation::OutOfRange {
                        index,
                        previous_count: frame.previous_states.len(),
                    },
                )?;
            }
            (Rc::new(StateSlot::new(initial.clone(), fiber)), initial, 0)
        }
    };

    frame.borrow_mut().states.push(StateRecord {
        cell: Rc::clone(&slot) as Rc<dyn StateCell>,
        staged: Rc::new(value.clone()),
        consumed,
    });
    let setter = SetState {
        slot,
        runtime: frame.borrow().runtime.clone(),
    };
    Ok((value, setter))
}

/// Registers a side effect to run after the render commits.
///
/// `deps` of `None` re-runs the effect after every commit; an empty list
/// runs it once; otherwise it re-runs whenever an entry changes. The
/// previous run's cleanup is invoked first.
pub fn use_effect<F, C>(effect: F, deps: Option<Vec<Dep>>) -> Result<(), HookError>
where
    F: FnOnce() -> C + 'static,
    C: IntoCleanup,
{
    let frame = active_frame("use_effect")?;
    let mut frame = frame.borrow_mut();
    let index = frame.effects.len();
    if index >= frame.previous_effects {
        frame.order_error(
            HookKind::Effect,
            OrderViolation::OutOfRange {
                index,
                previous_count: frame.previous_effects,
            },
        )?;
    }
    frame.effects.push(EffectSlot {
        deps,
        callback: Some(Box::new(move || effect().into_cleanup())),
        cleanup: None,
    });
    Ok(())
}
