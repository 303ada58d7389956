//! Declarative node model.
//!
//! An [`Element`] describes what a position in the tree should look like for
//! one render. Elements are cheap to clone and carry no identity: the
//! reconciler consumes them and keeps everything long-lived in fibers.

use std::any::{type_name, TypeId};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::host::NodeId;

/// Property that holds the text of a text node.
pub const NODE_VALUE: &str = "nodeValue";

/// Payload delivered to an [`EventHandler`] by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub target: NodeId,
}

/// Event callback bound to a host node. Two handlers are equal only when
/// they share the same allocation.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);

impl EventHandler {
    pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Text(Rc<str>),
    Number(f64),
    Bool(bool),
    Handler(EventHandler),
}

impl PropValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            PropValue::Handler(handler) => Some(handler),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Text(text) => f.write_str(text),
            PropValue::Number(value) => write!(f, "{value}"),
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Handler(_) => f.write_str("<handler>"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(Rc::from(value))
    }
}

impl From<Rc<str>> for PropValue {
    fn from(value: Rc<str>) -> Self {
        PropValue::Text(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Number(value)
    }
}

impl From<f32> for PropValue {
    fn from(value: f32) -> Self {
        PropValue::Number(value as f64)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Number(value as f64)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Number(value as f64)
    }
}

impl From<u32> for PropValue {
    fn from(value: u32) -> Self {
        PropValue::Number(value as f64)
    }
}

impl From<usize> for PropValue {
    fn from(value: usize) -> Self {
        PropValue::Number(value as f64)
    }
}

impl From<EventHandler> for PropValue {
    fn from(value: EventHandler) -> Self {
        PropValue::Handler(value)
    }
}

/// Result returned by a component body.
pub type ComponentResult = anyhow::Result<Element>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Identity {
    Type(TypeId),
    Instance,
}

/// Reference to a component function.
///
/// Components built with [`Component::new`] compare by the type of the
/// wrapped callable, so wrapping the same function or closure definition
/// twice yields equal components and positions keep matching across renders
/// even when the component is re-wrapped every time. Components built with
/// [`Component::distinct`] compare by allocation instead.
#[derive(Clone)]
pub struct Component {
    identity: Identity,
    name: &'static str,
    render: Rc<dyn Fn(&Props) -> ComponentResult>,
}

impl Component {
    /// Wraps `render` with identity by type.
    ///
    /// Closures returned by one factory share a type whatever they capture:
    /// swapping two of them at a position keeps the fiber and its state but
    /// runs the other closure. Use [`Component::distinct`] for those.
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&Props) -> ComponentResult + 'static,
    {
        Self {
            identity: Identity::Type(TypeId::of::<F>()),
            name: type_name::<F>(),
            render: Rc::new(render),
        }
    }

    /// Wraps `render` with identity by allocation: only clones of the
    /// returned component are equal to it.
    pub fn distinct<F>(render: F) -> Self
    where
        F: Fn(&Props) -> ComponentResult + 'static,
    {
        Self {
            identity: Identity::Instance,
            ..Self::new(render)
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn call(&self, props: &Props) -> ComponentResult {
        (self.render)(props)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        match (self.identity, other.identity) {
            (Identity::Type(a), Identity::Type(b)) => a == b,
            (Identity::Instance, Identity::Instance) => {
                std::ptr::addr_eq(Rc::as_ptr(&self.render), Rc::as_ptr(&other.render))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

/// Shorthand for [`Component::new`].
pub fn component<F>(render: F) -> Component
where
    F: Fn(&Props) -> ComponentResult + 'static,
{
    Component::new(render)
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementKind {
    Host(Rc<str>),
    Text,
    Component(Component),
}

impl From<&str> for ElementKind {
    fn from(tag: &str) -> Self {
        ElementKind::Host(Rc::from(tag))
    }
}

impl From<String> for ElementKind {
    fn from(tag: String) -> Self {
        ElementKind::Host(Rc::from(tag))
    }
}

impl From<Component> for ElementKind {
    fn from(component: Component) -> Self {
        ElementKind::Component(component)
    }
}

/// Ordered property map plus the element's children.
#[derive(Clone, Debug, Default)]
pub struct Props {
    values: IndexMap<String, PropValue>,
    children: Vec<Element>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds an event handler under `name`, e.g. `"onclick"`.
    pub fn listener(self, name: impl Into<String>, handler: impl Fn(&Event) + 'static) -> Self {
        self.with(name, EventHandler::new(handler))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PropValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub(crate) fn set_children(&mut self, children: Vec<Element>) {
        self.children = children;
    }
}

/// Immutable declarative node.
#[derive(Clone, Debug)]
pub struct Element {
    kind: ElementKind,
    props: Rc<Props>,
}

impl Element {
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn children(&self) -> &[Element] {
        self.props.children()
    }

    pub(crate) fn shared_props(&self) -> Rc<Props> {
        Rc::clone(&self.props)
    }
}

/// Anything that may appear in a child list before normalization.
#[derive(Clone, Debug)]
pub enum Child {
    Element(Element),
    Text(PropValue),
}

impl Child {
    fn into_element(self) -> Element {
        match self {
            Child::Element(element) => element,
            Child::Text(value) => create_text_element(value),
        }
    }
}

impl From<Element> for Child {
    fn from(element: Element) -> Self {
        Child::Element(element)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.into())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(text.into())
    }
}

impl From<i32> for Child {
    fn from(value: i32) -> Self {
        Child::Text(value.into())
    }
}

impl From<i64> for Child {
    fn from(value: i64) -> Self {
        Child::Text(value.into())
    }
}

impl From<u32> for Child {
    fn from(value: u32) -> Self {
        Child::Text(value.into())
    }
}

impl From<usize> for Child {
    fn from(value: usize) -> Self {
        Child::Text(value.into())
    }
}

impl From<f64> for Child {
    fn from(value: f64) -> Self {
        Child::Text(value.into())
    }
}

/// Builds an element, wrapping bare text and numbers into text elements.
pub fn create_element(
    kind: impl Into<ElementKind>,
    props: Props,
    children: impl IntoIterator<Item = Child>,
) -> Element {
    let mut props = props;
    props.set_children(children.into_iter().map(Child::into_element).collect());
    Element {
        kind: kind.into(),
        props: Rc::new(props),
    }
}

pub fn create_text_element(value: impl Into<PropValue>) -> Element {
    Element {
        kind: ElementKind::Text,
        props: Rc::new(Props::new().with(NODE_VALUE, value)),
    }
}

/// Builds a `Vec<Child>` from heterogeneous child expressions.
#[macro_export]
macro_rules! children {
    () => {
        ::std::vec::Vec::<$crate::Child>::new()
    };
    ($($child:expr),+ $(,)?) => {
        ::std::vec![$($crate::Child::from($child)),+]
    };
}
