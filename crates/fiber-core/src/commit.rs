//! Commit phase: applies a finished generation to the host tree in one pass.

use std::rc::Rc;

use crate::config::ReconcilerConfig;
use crate::element::Props;
use crate::error::{HostError, RenderError};
use crate::fiber::{EffectTag, FiberId, FiberKind};
use crate::hooks::Cleanup;
use crate::host::{HostRenderer, NodeId};
use crate::scheduler::Reconciler;

const CHILDREN: &str = "children";

/// Brings the attributes and listeners of `node` from `previous` to `next`.
pub(crate) fn apply_props<H: HostRenderer>(
    host: &mut H,
    config: &ReconcilerConfig,
    node: NodeId,
    previous: &Props,
    next: &Props,
) -> Result<(), HostError> {
    for (name, old) in previous.iter() {
        let Some(event) = config.event_name(name) else {
            continue;
        };
        if next.get(name) != Some(old) {
            if let Some(handler) = old.as_handler() {
                host.remove_event_listener(node, &event, handler)?;
            }
        }
    }

    for (name, _) in previous.iter() {
        if name != CHILDREN && config.event_name(name).is_none() && !next.contains(name) {
            host.remove_attribute(node, name)?;
        }
    }

    for (name, value) in next.iter() {
        if name != CHILDREN && config.event_name(name).is_none() && previous.get(name) != Some(value)
        {
            host.set_attribute(node, name, value)?;
        }
    }

    for (name, value) in next.iter() {
        let Some(event) = config.event_name(name) else {
            continue;
        };
        if previous.get(name) == Some(value) {
            continue;
        }
        match value.as_handler() {
            Some(handler) => host.add_event_listener(node, &event, handler)?,
            None => log::warn!("ignoring non-callable value for event prop {name}"),
        }
    }
    Ok(())
}

impl<H: HostRenderer> Reconciler<H> {
    pub(crate) fn commit_root(&mut self) -> Result<(), RenderError> {
        let Some(root) = self.wip_root else {
            return Ok(());
        };
        let deletions = std::mem::take(&mut self.deletions);
        for entry in &deletions {
            self.commit_deletion(entry.fiber)?;
        }

        for id in self.fibers.descendants(root) {
            self.commit_work(id)?;
        }

        self.commit_state(root);
        self.commit_effects(root);
        self.promote(root)?;
        self.wip_root = None;
        self.collect_garbage();
        log::debug!(
            "committed generation {} ({} deletions, {} fibers live)",
            self.generation(),
            deletions.len(),
            self.fibers.len()
        );
        Ok(())
    }

    fn commit_work(&mut self, id: FiberId) -> Result<(), RenderError> {
        let fiber = self
            .fibers
            .get(id)
            .ok_or(RenderError::MissingFiber { id })?;
        let Some(node) = fiber.host else {
            if fiber.tag == EffectTag::Deletion {
                self.commit_deletion(id)?;
            }
            return Ok(());
        };
        match fiber.tag {
            EffectTag::Placement => {
                let parent = self
                    .fibers
                    .nearest_host_ancestor(id)
                    .ok_or(RenderError::NoHostParent { id })?;
                self.host.append_child(parent, node)?;
            }
            EffectTag::Update => {
                let props = Rc::clone(&fiber.props);
                let previous = fiber
                    .previous
                    .and_then(|previous| self.fibers.get(previous))
                    .map(|previous| Rc::clone(&previous.props))
                    .unwrap_or_default();
                apply_props(&mut self.host, &self.config, node, &previous, &props)?;
            }
            EffectTag::Deletion => self.commit_deletion(id)?,
            EffectTag::None => {}
        }
        Ok(())
    }

    /// Makes the values folded by this generation the committed state and
    /// binds every state hook, and so every setter, to its new fiber.
    /// Hooks that were given more actions after evaluation ask for another
    /// render.
    fn commit_state(&mut self, root: FiberId) {
        let handle = self.runtime.handle();
        for id in self.fibers.subtree(root) {
            let Some(fiber) = self.fibers.get(id) else {
                continue;
            };
            let mut stale = false;
            for record in &fiber.states {
                stale |= record.commit(id);
            }
            if stale {
                log::debug!("{id:?} received state actions while rendering");
                handle.request_update(id);
            }
        }
    }

    /// Detaches the host nodes of the subtree at `id` and runs the effect
    /// cleanups it still holds.
    fn commit_deletion(&mut self, id: FiberId) -> Result<(), RenderError> {
        let parent = self
            .fibers
            .nearest_host_ancestor(id)
            .ok_or(RenderError::NoHostParent { id })?;
        self.delete_subtree(id, parent)?;

        let mut cleanups = Vec::new();
        for fiber in self.fibers.subtree(id) {
            if let Some(fiber) = self.fibers.get_mut(fiber) {
                cleanups.extend(fiber.effects.iter_mut().filter_map(|slot| slot.cleanup.take()));
            }
        }
        run_cleanups(cleanups);
        Ok(())
    }

    fn delete_subtree(&mut self, id: FiberId, parent: NodeId) -> Result<(), RenderError> {
        if let Some(node) = self.fibers.get(id).and_then(|fiber| fiber.host) {
            self.host.remove_child(parent, node)?;
            return Ok(());
        }
        let children: Vec<FiberId> = self.fibers.children(id).collect();
        for child in children {
            self.delete_subtree(child, parent)?;
        }
        Ok(())
    }

    /// Runs stale cleanups across the whole generation, then the effects
    /// that are due. Cleanups of effects that stay put move to the new hook.
    fn commit_effects(&mut self, root: FiberId) {
        let order: Vec<FiberId> = self
            .fibers
            .subtree(root)
            .into_iter()
            .filter(|id| {
                self.fibers
                    .get(*id)
                    .is_some_and(|fiber| fiber.kind.is_component())
            })
            .collect();

        let mut due: Vec<(FiberId, Vec<bool>)> = Vec::with_capacity(order.len());
        let mut stale = Vec::new();
        for &id in &order {
            let Some(fiber) = self.fibers.get(id) else {
                continue;
            };
            let previous = fiber.previous;
            let runs: Vec<bool> = {
                let old = previous.and_then(|previous| self.fibers.get(previous));
                fiber
                    .effects
                    .iter()
                    .enumerate()
                    .map(|(index, slot)| {
                        slot.should_run(old.and_then(|old| old.effects.get(index)))
                    })
                    .collect()
            };
            if let Some(old) = previous.and_then(|previous| self.fibers.get_mut(previous)) {
                for (index, slot) in old.effects.iter_mut().enumerate() {
                    // Hooks past the new count have no successor to inherit them.
                    if runs.get(index).copied().unwrap_or(true) {
                        stale.extend(slot.cleanup.take());
                    }
                }
            }
            due.push((id, runs));
        }
        run_cleanups(stale);

        for (id, runs) in due {
            let previous = self.fibers.get(id).and_then(|fiber| fiber.previous);
            for (index, run) in runs.into_iter().enumerate() {
                if run {
                    let callback = self
                        .fibers
                        .get_mut(id)
                        .and_then(|fiber| fiber.effects.get_mut(index))
                        .and_then(|slot| slot.callback.take());
                    let cleanup = callback.and_then(|callback| callback());
                    if let Some(slot) = self
                        .fibers
                        .get_mut(id)
                        .and_then(|fiber| fiber.effects.get_mut(index))
                    {
                        slot.cleanup = cleanup;
                    }
                } else {
                    let carried = previous
                        .and_then(|previous| self.fibers.get_mut(previous))
                        .and_then(|old| old.effects.get_mut(index))
                        .and_then(|slot| slot.cleanup.take());
                    if let Some(slot) = self
                        .fibers
                        .get_mut(id)
                        .and_then(|fiber| fiber.effects.get_mut(index))
                    {
                        slot.callback = None;
                        slot.cleanup = carried;
                    }
                }
            }
        }
    }

    /// Makes the committed generation current. A root generation replaces
    /// the current root; a state-update generation is spliced in place of
    /// the fiber it was copied from.
    fn promote(&mut self, root: FiberId) -> Result<(), RenderError> {
        let fiber = self
            .fibers
            .get(root)
            .ok_or(RenderError::MissingFiber { id: root })?;
        let anchor = fiber.previous;
        if fiber.kind == FiberKind::HostRoot {
            self.current_root = Some(root);
            return Ok(());
        }
        let anchor = anchor.ok_or(RenderError::MissingFiber { id: root })?;
        if !self.fibers.splice(anchor, root) {
            return Err(RenderError::MissingFiber { id: anchor });
        }
        Ok(())
    }
}

fn run_cleanups(cleanups: Vec<Cleanup>) {
    for cleanup in cleanups {
        cleanup.run();
    }
}
