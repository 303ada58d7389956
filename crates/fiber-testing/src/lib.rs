//! Testing utilities and harness for the fiber reconciler

pub mod testing;

// Re-export testing utilities
pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
    pub use fiber_core::{
        children, component, create_element, deps, use_effect, use_state, Child, Cleanup,
        Component, ComponentResult, Element, PropValue, Props, RenderError, SetState, WorkStatus,
    };
}
