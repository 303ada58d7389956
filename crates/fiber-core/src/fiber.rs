//! Work tree storage.
//!
//! Fibers of every live generation share one [`SlotMap`]. Structural links
//! (`parent`, `child`, `sibling`) and the cross-generation `previous` link
//! are plain keys, so a fiber freed by garbage collection simply stops
//! resolving instead of dangling.

use std::fmt;
use std::rc::Rc;

use slotmap::SlotMap;

use crate::collections::map::HashSet;
use crate::element::{Component, ElementKind, Props};
use crate::hooks::{EffectSlot, StateRecord};
use crate::host::NodeId;

slotmap::new_key_type! {
    pub struct FiberId;
}

#[derive(Clone, Debug, PartialEq)]
pub enum FiberKind {
    /// Synthetic root of a generation; owns the host container.
    HostRoot,
    Host(Rc<str>),
    Text,
    Component(Component),
}

impl FiberKind {
    pub(crate) fn from_element(kind: &ElementKind) -> Self {
        match kind {
            ElementKind::Host(tag) => FiberKind::Host(Rc::clone(tag)),
            ElementKind::Text => FiberKind::Text,
            ElementKind::Component(component) => FiberKind::Component(component.clone()),
        }
    }

    /// Whether a fiber of this kind can be reused for `element`.
    pub fn matches(&self, element: &ElementKind) -> bool {
        match (self, element) {
            (FiberKind::Host(tag), ElementKind::Host(other)) => tag == other,
            (FiberKind::Text, ElementKind::Text) => true,
            (FiberKind::Component(component), ElementKind::Component(other)) => component == other,
            _ => false,
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self, FiberKind::Component(_))
    }

    pub fn label(&self) -> &str {
        match self {
            FiberKind::HostRoot => "#root",
            FiberKind::Host(tag) => tag,
            FiberKind::Text => "#text",
            FiberKind::Component(component) => component.name(),
        }
    }
}

/// Mutation a fiber asks the commit phase to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectTag {
    Placement,
    Update,
    Deletion,
    None,
}

pub struct Fiber {
    pub(crate) kind: FiberKind,
    pub(crate) props: Rc<Props>,
    pub(crate) host: Option<NodeId>,
    pub(crate) parent: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,
    pub(crate) previous: Option<FiberId>,
    pub(crate) tag: EffectTag,
    pub(crate) states: Vec<StateRecord>,
    pub(crate) effects: Vec<EffectSlot>,
}

impl Fiber {
    pub(crate) fn new(kind: FiberKind, props: Rc<Props>, tag: EffectTag) -> Self {
        Self {
            kind,
            props,
            host: None,
            parent: None,
            child: None,
            sibling: None,
            previous: None,
            tag,
            states: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn kind(&self) -> &FiberKind {
        &self.kind
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn host(&self) -> Option<NodeId> {
        self.host
    }

    pub fn parent(&self) -> Option<FiberId> {
        self.parent
    }

    pub fn child(&self) -> Option<FiberId> {
        self.child
    }

    pub fn sibling(&self) -> Option<FiberId> {
        self.sibling
    }

    pub fn previous(&self) -> Option<FiberId> {
        self.previous
    }

    pub fn tag(&self) -> EffectTag {
        self.tag
    }

    pub fn state_hook_count(&self) -> usize {
        self.states.len()
    }

    pub fn effect_hook_count(&self) -> usize {
        self.effects.len()
    }

    /// Actions queued on the state hook at `index` and not yet folded
    /// into a committed generation. The queue is shared by every
    /// generation of the component.
    pub fn pending_state_actions(&self, index: usize) -> Option<usize> {
        self.states.get(index).map(StateRecord::pending_actions)
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("kind", &self.kind.label())
            .field("host", &self.host)
            .field("parent", &self.parent)
            .field("child", &self.child)
            .field("sibling", &self.sibling)
            .field("previous", &self.previous)
            .field("tag", &self.tag)
            .field("states", &self.states.len())
            .field("effects", &self.effects.len())
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct FiberArena {
    fibers: SlotMap<FiberId, Fiber>,
}

impl FiberArena {
    pub(crate) fn insert(&mut self, fiber: Fiber) -> FiberId {
        self.fibers.insert(fiber)
    }

    pub(crate) fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.fibers.get_mut(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.fibers.len()
    }

    /// Depth-first successor of `id` that never leaves the subtree of `root`.
    pub(crate) fn next_in_subtree(&self, id: FiberId, root: FiberId) -> Option<FiberId> {
        let fiber = self.get(id)?;
        if let Some(child) = fiber.child {
            return Some(child);
        }
        let mut cursor = id;
        while cursor != root {
            let current = self.get(cursor)?;
            if let Some(sibling) = current.sibling {
                return Some(sibling);
            }
            cursor = current.parent?;
        }
        None
    }

    /// Fibers strictly below `root`, parents before children and children
    /// before later siblings.
    pub(crate) fn descendants(&self, root: FiberId) -> Vec<FiberId> {
        let mut order = Vec::new();
        let mut cursor = self.next_in_subtree(root, root);
        while let Some(id) = cursor {
            order.push(id);
            cursor = self.next_in_subtree(id, root);
        }
        order
    }

    /// `root` followed by its descendants.
    pub(crate) fn subtree(&self, root: FiberId) -> Vec<FiberId> {
        let mut order = vec![root];
        order.extend(self.descendants(root));
        order
    }

    /// Host handle of the closest ancestor that owns one.
    pub(crate) fn nearest_host_ancestor(&self, id: FiberId) -> Option<NodeId> {
        let mut cursor = self.get(id)?.parent;
        while let Some(parent) = cursor {
            let fiber = self.get(parent)?;
            if let Some(host) = fiber.host {
                return Some(host);
            }
            cursor = fiber.parent;
        }
        None
    }

    /// Whether `id` is linked into the tree under `root` through the
    /// parent's child chain, not merely through a stale parent pointer.
    pub(crate) fn is_attached(&self, id: FiberId, root: FiberId) -> bool {
        let mut cursor = id;
        while cursor != root {
            let Some(parent) = self.get(cursor).and_then(|fiber| fiber.parent) else {
                return false;
            };
            if !self.children(parent).any(|child| child == cursor) {
                return false;
            }
            cursor = parent;
        }
        self.fibers.contains_key(root)
    }

    pub(crate) fn children(&self, parent: FiberId) -> impl Iterator<Item = FiberId> + '_ {
        let first = self.get(parent).and_then(|fiber| fiber.child);
        std::iter::successors(first, move |&id| self.get(id).and_then(|fiber| fiber.sibling))
    }

    fn ancestors_inclusive(&self, id: FiberId) -> Vec<FiberId> {
        let mut chain = vec![id];
        let mut cursor = self.get(id).and_then(|fiber| fiber.parent);
        while let Some(parent) = cursor {
            chain.push(parent);
            cursor = self.get(parent).and_then(|fiber| fiber.parent);
        }
        chain
    }

    pub(crate) fn lowest_common_ancestor(&self, a: FiberId, b: FiberId) -> Option<FiberId> {
        let mut seen: HashSet<FiberId> = HashSet::default();
        seen.extend(self.ancestors_inclusive(a));
        self.ancestors_inclusive(b)
            .into_iter()
            .find(|id| seen.contains(id))
    }

    /// Frees every fiber not reachable from `root`. Returns how many were freed.
    pub(crate) fn retain_reachable(&mut self, root: FiberId) -> usize {
        let reachable: HashSet<FiberId> = self.subtree(root).into_iter().collect();
        let before = self.fibers.len();
        self.fibers.retain(|id, _| reachable.contains(&id));
        before - self.fibers.len()
    }

    /// Replaces `old` with `new` in the child chain of `old`'s parent.
    pub(crate) fn splice(&mut self, old: FiberId, new: FiberId) -> bool {
        let Some(parent) = self.get(old).and_then(|fiber| fiber.parent) else {
            return false;
        };
        let previous_sibling = self.children(parent).take_while(|&id| id != old).last();
        let is_first = self.get(parent).and_then(|fiber| fiber.child) == Some(old);
        let slot = if is_first {
            self.get_mut(parent).map(|fiber| &mut fiber.child)
        } else {
            previous_sibling
                .and_then(|id| self.get_mut(id))
                .filter(|fiber| fiber.sibling == Some(old))
                .map(|fiber| &mut fiber.sibling)
        };
        match slot {
            Some(link) => {
                *link = Some(new);
                true
            }
            None => false,
        }
    }
}
