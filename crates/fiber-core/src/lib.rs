#![doc = r"Core reconciler for an incremental, time-sliced UI renderer."]

pub mod collections;
pub mod config;
pub mod element;
pub mod error;
pub mod fiber;
pub mod hooks;
pub mod host;
pub mod platform;
pub mod runtime;

mod commit;
mod reconcile;
mod scheduler;

pub use config::ReconcilerConfig;
pub use element::{
    component, create_element, create_text_element, Child, Component, ComponentResult, Element,
    ElementKind, Event, EventHandler, PropValue, Props, NODE_VALUE,
};
pub use error::{HookError, HookKind, HostError, OrderViolation, RenderError};
pub use fiber::{EffectTag, Fiber, FiberId, FiberKind};
pub use hooks::{use_effect, use_state, Cleanup, Dep, DepValue, IntoCleanup, SetState};
pub use host::{HostOp, HostRenderer, MemoryHost, MemoryNode, MemoryNodeKind, NodeId};
pub use platform::{Clock, ClockDeadline, IdleDeadline, IdleScheduler, Unbounded};
pub use runtime::{DefaultScheduler, Runtime, RuntimeHandle};
pub use scheduler::{Reconciler, WorkStatus};
