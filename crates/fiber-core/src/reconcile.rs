//! Build phase: one unit of work per fiber, and the positional child diff.

use std::rc::Rc;

use crate::commit::apply_props;
use crate::element::{Component, Element, Props};
use crate::error::RenderError;
use crate::fiber::{EffectTag, Fiber, FiberId, FiberKind};
use crate::hooks::{self, HookFrame};
use crate::host::HostRenderer;
use crate::scheduler::Reconciler;

impl<H: HostRenderer> Reconciler<H> {
    /// Expands `id` and returns the next fiber to work on, if any remains
    /// in the current generation.
    pub(crate) fn perform_unit_of_work(
        &mut self,
        id: FiberId,
    ) -> Result<Option<FiberId>, RenderError> {
        let fiber = self
            .fibers
            .get(id)
            .ok_or(RenderError::MissingFiber { id })?;
        log::trace!("unit {id:?} ({}, {:?})", fiber.kind.label(), fiber.tag);
        match fiber.kind.clone() {
            FiberKind::Component(component) => self.update_component(id, &component)?,
            _ => self.update_host(id)?,
        }
        let root = self.wip_root.unwrap_or(id);
        Ok(self.fibers.next_in_subtree(id, root))
    }

    fn update_component(&mut self, id: FiberId, component: &Component) -> Result<(), RenderError> {
        let fiber = self
            .fibers
            .get(id)
            .ok_or(RenderError::MissingFiber { id })?;
        let props = Rc::clone(&fiber.props);
        let mut frame = HookFrame::new(id, self.runtime.handle(), self.config.strict_hooks);
        if let Some(previous) = fiber.previous.and_then(|previous| self.fibers.get(previous)) {
            frame = frame.with_previous(&previous.states, previous.effects.len());
        }

        let (result, frame) = hooks::evaluate(frame, || component.call(&props));
        let element = result.map_err(|source| RenderError::Component {
            component: component.name(),
            source,
        })?;
        let (states, effects) = frame.finish().map_err(|error| RenderError::Hook {
            component: component.name(),
            error,
        })?;

        let fiber = self
            .fibers
            .get_mut(id)
            .ok_or(RenderError::MissingFiber { id })?;
        fiber.states = states;
        fiber.effects = effects;
        self.reconcile_children(id, std::slice::from_ref(&element))
    }

    fn update_host(&mut self, id: FiberId) -> Result<(), RenderError> {
        let fiber = self
            .fibers
            .get(id)
            .ok_or(RenderError::MissingFiber { id })?;
        let props = Rc::clone(&fiber.props);
        if fiber.host.is_none() {
            let node = match &fiber.kind {
                FiberKind::Text => Some(self.host.create_text_node()?),
                FiberKind::Host(tag) => Some(self.host.create_element(tag)?),
                _ => None,
            };
            if let Some(node) = node {
                apply_props(&mut self.host, &self.config, node, &Props::new(), &props)?;
                if let Some(fiber) = self.fibers.get_mut(id) {
                    fiber.host = Some(node);
                }
            }
        }
        self.reconcile_children(id, props.children())
    }

    /// Diffs `elements` index by index against the children of the fiber
    /// `wip` replaces. Matching kinds become updates that keep the old host
    /// node; anything else is a placement plus a deletion.
    fn reconcile_children(&mut self, wip: FiberId, elements: &[Element]) -> Result<(), RenderError> {
        let mut old = self
            .fibers
            .get(wip)
            .ok_or(RenderError::MissingFiber { id: wip })?
            .previous
            .and_then(|previous| self.fibers.get(previous))
            .and_then(|previous| previous.child);
        let mut last: Option<FiberId> = None;
        let mut index = 0;

        while index < elements.len() || old.is_some() {
            let element = elements.get(index);
            let old_fiber = old.and_then(|id| self.fibers.get(id).map(|fiber| (id, fiber)));
            let same = matches!(
                (element, &old_fiber),
                (Some(element), Some((_, fiber))) if fiber.kind.matches(element.kind())
            );

            let new_fiber = match (element, &old_fiber) {
                (Some(element), Some((old_id, fiber))) if same => {
                    let mut next =
                        Fiber::new(fiber.kind.clone(), element.shared_props(), EffectTag::Update);
                    next.host = fiber.host;
                    next.previous = Some(*old_id);
                    Some(next)
                }
                (Some(element), _) => Some(Fiber::new(
                    FiberKind::from_element(element.kind()),
                    element.shared_props(),
                    EffectTag::Placement,
                )),
                (None, _) => None,
            };
            let stale = old_fiber.as_ref().filter(|_| !same).map(|(id, _)| *id);
            old = old_fiber.and_then(|(_, fiber)| fiber.sibling);

            if let Some(stale) = stale {
                self.record_deletion(stale);
            }
            if let Some(mut fiber) = new_fiber {
                fiber.parent = Some(wip);
                let id = self.fibers.insert(fiber);
                let link = match last {
                    Some(previous) => self.fibers.get_mut(previous).map(|f| &mut f.sibling),
                    None => self.fibers.get_mut(wip).map(|f| &mut f.child),
                };
                if let Some(link) = link {
                    *link = Some(id);
                }
                last = Some(id);
            }
            index += 1;
        }
        Ok(())
    }
}
