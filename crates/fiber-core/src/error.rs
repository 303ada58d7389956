use std::fmt;

use crate::fiber::FiberId;
use crate::host::NodeId;

/// Failure reported by a [`HostRenderer`](crate::HostRenderer) operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Missing { id: NodeId },
    NotAChild { parent: NodeId, child: NodeId },
    InvalidParent { id: NodeId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { id } => write!(f, "host node {id} missing"),
            HostError::NotAChild { parent, child } => {
                write!(f, "host node {child} is not a child of {parent}")
            }
            HostError::InvalidParent { id } => {
                write!(f, "host node {id} cannot hold children")
            }
        }
    }
}

impl std::error::Error for HostError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    State,
    Effect,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::State => f.write_str("use_state"),
            HookKind::Effect => f.write_str("use_effect"),
        }
    }
}

/// How a component broke the call-order contract of its hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderViolation {
    OutOfRange { index: usize, previous_count: usize },
    CountChanged { previous: usize, current: usize },
    TypeChanged { index: usize, expected: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// A hook was called while no component was being evaluated.
    Misuse { hook: &'static str },
    /// Hook calls differ in order, count, or type from the previous render.
    Order {
        hook: HookKind,
        violation: OrderViolation,
    },
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::Misuse { hook } => {
                write!(f, "{hook} called outside of component evaluation")
            }
            HookError::Order { hook, violation } => match violation {
                OrderViolation::OutOfRange {
                    index,
                    previous_count,
                } => write!(
                    f,
                    "{hook} call #{index} has no counterpart in the previous render ({previous_count} calls)"
                ),
                OrderViolation::CountChanged { previous, current } => write!(
                    f,
                    "{hook} called {current} times, previous render called it {previous} times"
                ),
                OrderViolation::TypeChanged { index, expected } => write!(
                    f,
                    "{hook} call #{index} changed its state type; expected {expected}"
                ),
            },
        }
    }
}

impl std::error::Error for HookError {}

/// Fatal failure of one render cycle. The generation that raised it is
/// discarded; the committed host tree is left as it was.
#[derive(Debug)]
pub enum RenderError {
    Component {
        component: &'static str,
        source: anyhow::Error,
    },
    Hook {
        component: &'static str,
        error: HookError,
    },
    Host(HostError),
    MissingFiber { id: FiberId },
    NoHostParent { id: FiberId },
    /// An earlier commit failed partway, so the host tree no longer matches
    /// any fiber generation. The reconciler refuses further work.
    Poisoned,
}

impl RenderError {
    /// Hook error behind this failure, whether the component returned it
    /// through `?` or the reconciler detected it after evaluation.
    pub fn hook_error(&self) -> Option<&HookError> {
        match self {
            RenderError::Hook { error, .. } => Some(error),
            RenderError::Component { source, .. } => source.downcast_ref::<HookError>(),
            _ => None,
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Component { component, source } => {
                write!(f, "component {component} failed: {source}")
            }
            RenderError::Hook { component, error } => {
                write!(f, "component {component}: {error}")
            }
            RenderError::Host(err) => write!(f, "host renderer failed: {err}"),
            RenderError::MissingFiber { id } => write!(f, "fiber {id:?} missing"),
            RenderError::NoHostParent { id } => {
                write!(f, "fiber {id:?} has no host ancestor")
            }
            RenderError::Poisoned => f.write_str("reconciler poisoned by a failed commit"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Component { source, .. } => Some(&**source),
            RenderError::Hook { error, .. } => Some(error),
            RenderError::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HostError> for RenderError {
    fn from(err: HostError) -> Self {
        RenderError::Host(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_error_is_recovered_through_anyhow() {
        let misuse = HookError::Misuse { hook: "use_state" };
        let err = RenderError::Component {
            component: "counter",
            source: anyhow::Error::from(misuse.clone()),
        };
        assert_eq!(err.hook_error(), Some(&misuse));
        assert_eq!(
            err.to_string(),
            "component counter failed: use_state called outside of component evaluation"
        );
    }

    #[test]
    fn host_errors_have_no_hook_error() {
        let err = RenderError::from(HostError::Missing { id: 4 });
        assert!(err.hook_error().is_none());
        assert_eq!(err.to_string(), "host renderer failed: host node 4 missing");
    }
}
