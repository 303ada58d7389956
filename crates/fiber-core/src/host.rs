//! Host renderer contract and an in-memory implementation.

use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::element::{Event, EventHandler, PropValue, NODE_VALUE};
use crate::error::HostError;

pub type NodeId = usize;

/// Primitive operations the commit engine performs on the host tree.
///
/// Handles are created detached; nothing becomes visible until
/// [`append_child`](HostRenderer::append_child) attaches it under a node
/// that is already part of the tree.
pub trait HostRenderer {
    fn create_element(&mut self, tag: &str) -> Result<NodeId, HostError>;
    fn create_text_node(&mut self) -> Result<NodeId, HostError>;
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &PropValue)
        -> Result<(), HostError>;
    fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), HostError>;
    fn add_event_listener(
        &mut self,
        node: NodeId,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError>;
    fn remove_event_listener(
        &mut self,
        node: NodeId,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError>;
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError>;
    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError>;
}

/// One call made against a [`MemoryHost`], recorded in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    CreateElement { node: NodeId, tag: String },
    CreateText { node: NodeId },
    SetAttribute { node: NodeId, name: String },
    RemoveAttribute { node: NodeId, name: String },
    AddListener { node: NodeId, event: String },
    RemoveListener { node: NodeId, event: String },
    AppendChild { parent: NodeId, child: NodeId },
    RemoveChild { parent: NodeId, child: NodeId },
}

impl HostOp {
    /// Host node the operation mutates.
    pub fn target(&self) -> NodeId {
        match self {
            HostOp::CreateElement { node, .. }
            | HostOp::CreateText { node }
            | HostOp::SetAttribute { node, .. }
            | HostOp::RemoveAttribute { node, .. }
            | HostOp::AddListener { node, .. }
            | HostOp::RemoveListener { node, .. } => *node,
            HostOp::AppendChild { parent, .. } | HostOp::RemoveChild { parent, .. } => *parent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryNodeKind {
    Element(String),
    Text,
}

#[derive(Debug)]
pub struct MemoryNode {
    kind: MemoryNodeKind,
    attributes: IndexMap<String, PropValue>,
    listeners: Vec<(String, EventHandler)>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl MemoryNode {
    fn new(kind: MemoryNodeKind) -> Self {
        Self {
            kind,
            attributes: IndexMap::new(),
            listeners: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn kind(&self) -> &MemoryNodeKind {
        &self.kind
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            MemoryNodeKind::Element(tag) => Some(tag),
            MemoryNodeKind::Text => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&PropValue> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }
}

/// Host tree kept in memory. Nodes are never freed; removed nodes simply
/// become detached, as in a document tree.
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: Vec<MemoryNode>,
    ops: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a root container without recording it in the op log.
    pub fn create_container(&mut self, tag: &str) -> NodeId {
        self.push(MemoryNodeKind::Element(tag.to_owned()))
    }

    pub fn node(&self, id: NodeId) -> Option<&MemoryNode> {
        self.nodes.get(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Concatenated text of every text node under `id`, in tree order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut output = String::new();
        self.collect_text(id, &mut output);
        output
    }

    fn collect_text(&self, id: NodeId, output: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if node.kind == MemoryNodeKind::Text {
            if let Some(value) = node.attributes.get(NODE_VALUE) {
                let _ = write!(output, "{value}");
            }
        }
        for &child in &node.children {
            self.collect_text(child, output);
        }
    }

    /// Element nodes under `root` (inclusive) with the given tag, in tree order.
    pub fn find_by_tag(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if node.tag() == Some(tag) {
                found.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        found
    }

    /// Invokes every listener bound to `event` on `node`. Returns how many ran.
    pub fn dispatch(&self, node: NodeId, event: &str) -> Result<usize, HostError> {
        let target = self.nodes.get(node).ok_or(HostError::Missing { id: node })?;
        let handlers: Vec<EventHandler> = target
            .listeners
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, handler)| handler.clone())
            .collect();
        let payload = Event {
            name: event.to_owned(),
            target: node,
        };
        for handler in &handlers {
            handler.call(&payload);
        }
        Ok(handlers.len())
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn dump_tree(&self, root: NodeId) -> String {
        let mut output = String::new();
        self.dump_node(&mut output, root, 0);
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Some(node) = self.nodes.get(id) else {
            let _ = writeln!(output, "{indent}[{id}] (missing)");
            return;
        };
        match &node.kind {
            MemoryNodeKind::Text => {
                let value = node
                    .attributes
                    .get(NODE_VALUE)
                    .map(|value| value.to_string())
                    .unwrap_or_default();
                let _ = writeln!(output, "{indent}[{id}] {value:?}");
            }
            MemoryNodeKind::Element(tag) => {
                let _ = write!(output, "{indent}[{id}] <{tag}");
                for (name, value) in &node.attributes {
                    let _ = write!(output, " {name}={:?}", value.to_string());
                }
                for (event, _) in &node.listeners {
                    let _ = write!(output, " on:{event}");
                }
                let _ = writeln!(output, ">");
                for &child in &node.children {
                    self.dump_node(output, child, depth + 1);
                }
            }
        }
    }

    fn push(&mut self, kind: MemoryNodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(MemoryNode::new(kind));
        id
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MemoryNode, HostError> {
        self.nodes.get_mut(id).ok_or(HostError::Missing { id })
    }

    fn detach(&mut self, child: NodeId) -> Result<(), HostError> {
        if let Some(parent) = self.node_mut(child)?.parent.take() {
            self.node_mut(parent)?.children.retain(|&id| id != child);
        }
        Ok(())
    }
}

impl HostRenderer for MemoryHost {
    fn create_element(&mut self, tag: &str) -> Result<NodeId, HostError> {
        let node = self.push(MemoryNodeKind::Element(tag.to_owned()));
        self.ops.push(HostOp::CreateElement {
            node,
            tag: tag.to_owned(),
        });
        Ok(node)
    }

    fn create_text_node(&mut self) -> Result<NodeId, HostError> {
        let node = self.push(MemoryNodeKind::Text);
        self.ops.push(HostOp::CreateText { node });
        Ok(node)
    }

    fn set_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        value: &PropValue,
    ) -> Result<(), HostError> {
        self.node_mut(node)?
            .attributes
            .insert(name.to_owned(), value.clone());
        self.ops.push(HostOp::SetAttribute {
            node,
            name: name.to_owned(),
        });
        Ok(())
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), HostError> {
        self.node_mut(node)?.attributes.shift_remove(name);
        self.ops.push(HostOp::RemoveAttribute {
            node,
            name: name.to_owned(),
        });
        Ok(())
    }

    fn add_event_listener(
        &mut self,
        node: NodeId,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError> {
        self.node_mut(node)?
            .listeners
            .push((event.to_owned(), handler.clone()));
        self.ops.push(HostOp::AddListener {
            node,
            event: event.to_owned(),
        });
        Ok(())
    }

    fn remove_event_listener(
        &mut self,
        node: NodeId,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError> {
        let listeners = &mut self.node_mut(node)?.listeners;
        if let Some(index) = listeners
            .iter()
            .position(|(name, bound)| name == event && bound == handler)
        {
            listeners.remove(index);
        }
        self.ops.push(HostOp::RemoveListener {
            node,
            event: event.to_owned(),
        });
        Ok(())
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        if self.node_mut(parent)?.kind == MemoryNodeKind::Text {
            return Err(HostError::InvalidParent { id: parent });
        }
        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        self.ops.push(HostOp::AppendChild { parent, child });
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        if self.node_mut(child)?.parent != Some(parent) {
            return Err(HostError::NotAChild { parent, child });
        }
        self.detach(child)?;
        self.ops.push(HostOp::RemoveChild { parent, child });
        Ok(())
    }
}
