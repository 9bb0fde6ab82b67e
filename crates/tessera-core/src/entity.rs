//! Entity handles and the entity container.
//!
//! An [`EntityId`] names one registry slot at one point in time: the slot's
//! index plus the generation it had when issued. [`HandleTable`] bumps a slot's
//! generation when it is retired, so a handle kept past its entity's reaping
//! never aliases a newer entity. The table also remembers which name each slot
//! was issued for, which is how the registry resolves entities by name.
//!
//! An [`Entity`] is the behaviour container: a string identifier, an explicit
//! kind, free-form tags, an optional owning level and a typed set of
//! [`Component`]s updated in an explicit order. Destruction is a flag; the
//! registry reaps flagged entities at the end of the update pass.
//!
//! # Example
//!
//! ```
//! use tessera_core::prelude::*;
//!
//! struct Counter(u32);
//! impl Component for Counter {}
//!
//! let mut entity = Entity::new("crate0", "crate").with_tag("breakable");
//! entity.add(Counter(3));
//!
//! assert!(entity.has::<Counter>());
//! assert_eq!(entity.get::<Counter>().map(|c| c.0), Some(3));
//! assert!(entity.destroy());
//! assert!(!entity.destroy(), "second destroy is a no-op");
//! ```

use std::any::TypeId;
use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::component::{Component, ComponentKind, ComponentSet};
use crate::context::TickContext;
use crate::identity::{EntityKind, Tags};
use crate::CoreError;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Runtime handle of a registered entity. Handles order by generation first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    generation: u32,
    index: u32,
}

impl EntityId {
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self { generation, index }
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

// ---------------------------------------------------------------------------
// HandleTable
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    /// Name the slot is currently issued for; `None` while free.
    name: Option<String>,
}

/// Issues [`EntityId`]s for named entities and resolves names back to them.
///
/// Retired slots are reused oldest-first. Several live handles may share a
/// name; [`named`](Self::named) lists them in issue order.
#[derive(Debug, Default)]
pub struct HandleTable {
    slots: Vec<Slot>,
    free: VecDeque<u32>,
    by_name: HashMap<String, Vec<EntityId>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh handle for an entity called `name`.
    pub fn issue(&mut self, name: &str) -> EntityId {
        let index = match self.free.pop_front() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.name = Some(name.to_owned());
        let id = EntityId::new(index, slot.generation);
        self.by_name.entry(name.to_owned()).or_default().push(id);
        id
    }

    /// Free the handle's slot and return the name it was issued for.
    /// A stale or unknown handle yields `None` and changes nothing.
    pub fn retire(&mut self, id: EntityId) -> Option<String> {
        if !self.is_current(id) {
            return None;
        }
        let slot = &mut self.slots[id.index as usize];
        let name = slot.name.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push_back(id.index);
        if let Some(ids) = self.by_name.get_mut(&name) {
            ids.retain(|&other| other != id);
            if ids.is_empty() {
                self.by_name.remove(&name);
            }
        }
        Some(name)
    }

    /// Whether `id` is the live issue of its slot.
    pub fn is_current(&self, id: EntityId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.name.is_some() && slot.generation == id.generation)
    }

    /// Live handles issued for `name`, oldest first.
    pub fn named(&self, name: &str) -> &[EntityId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn name_of(&self, id: EntityId) -> Option<&str> {
        if !self.is_current(id) {
            return None;
        }
        self.slots[id.index as usize].name.as_deref()
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A simulated object: identity plus an ordered set of components.
pub struct Entity {
    handle: Option<EntityId>,
    name: String,
    kind: EntityKind,
    tags: Tags,
    level: Option<String>,
    components: ComponentSet,
    destroyed: bool,
    finalized: bool,
}

impl Entity {
    /// Create an entity with the given unique identifier and kind.
    pub fn new(name: impl Into<String>, kind: impl Into<EntityKind>) -> Self {
        Self {
            handle: None,
            name: name.into(),
            kind: kind.into(),
            tags: Tags::new(),
            level: None,
            components: ComponentSet::new(),
            destroyed: false,
            finalized: false,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// The unique string identifier (`"bug_base3"`, `"player"`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Runtime handle, assigned when the entity enters a registry.
    pub fn handle(&self) -> Option<EntityId> {
        self.handle
    }

    pub(crate) fn assign_handle(&mut self, id: EntityId) {
        self.handle = Some(id);
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    /// Owning level, used only for persistence bookkeeping.
    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    pub fn set_level(&mut self, level: impl Into<String>) {
        self.level = Some(level.into());
    }

    // -- components ---------------------------------------------------------

    /// Attach a component, running its `init` hook first.
    ///
    /// A component of the same kind already present is replaced; the new one
    /// keeps the old one's position in the update order.
    pub fn add<T: Component>(&mut self, mut component: T) -> &mut T {
        component.init(self);
        let kind = ComponentKind::of::<T>();
        if self.components.insert(kind, Box::new(component)).is_some() {
            warn!(entity = %self.name, component = %kind, "component replaced on entity");
        }
        self.components
            .get_mut::<T>()
            .unwrap_or_else(|| unreachable!("component {kind} was just inserted"))
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.components.get::<T>()
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components.get_mut::<T>()
    }

    pub fn has<T: Component>(&self) -> bool {
        self.components.contains(TypeId::of::<T>())
    }

    /// Like [`get`](Self::get), but reports the miss as an error.
    pub fn require<T: Component>(&self) -> Result<&T, CoreError> {
        self.get::<T>().ok_or_else(|| self.missing::<T>())
    }

    pub fn require_mut<T: Component>(&mut self) -> Result<&mut T, CoreError> {
        let err = self.missing::<T>();
        self.get_mut::<T>().ok_or(err)
    }

    fn missing<T: Component>(&self) -> CoreError {
        CoreError::MissingComponent {
            entity: self.name.clone(),
            component: ComponentKind::of::<T>().short_name(),
        }
    }

    /// Run `f` with the component of type `T` detached from the entity, so the
    /// component and its owner can both be borrowed mutably.
    ///
    /// Returns `None` if the entity has no such component.
    pub fn with_component<T: Component, R>(
        &mut self,
        f: impl FnOnce(&mut T, &mut Entity) -> R,
    ) -> Option<R> {
        let slot = self.components.position(TypeId::of::<T>())?;
        let mut detached = self.components.take(slot)?;
        let result = detached
            .as_mut()
            .as_any_mut()
            .downcast_mut::<T>()
            .map(|component| f(component, self));
        self.components.restore(slot, detached);
        result
    }

    /// Set the explicit update order. Only the listed kinds are updated;
    /// kinds this entity does not carry are ignored.
    pub fn set_update_order(&mut self, order: &[ComponentKind]) {
        self.components.set_update_order(order);
    }

    pub fn update_order(&self) -> Vec<ComponentKind> {
        self.components.update_order()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Run every component's update hook in update order.
    ///
    /// Stops early if a component destroys the entity.
    pub fn update(&mut self, ctx: &mut TickContext<'_>) {
        for slot in self.components.update_slots() {
            if self.destroyed {
                break;
            }
            let Some(mut component) = self.components.take(slot) else {
                continue;
            };
            component.as_mut().update(self, ctx);
            self.components.restore(slot, component);
        }
    }

    /// Mark the entity destroyed. Returns `true` only on the first call.
    pub fn destroy(&mut self) -> bool {
        !std::mem::replace(&mut self.destroyed, true)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Run every component's destruction hook exactly once and drop the
    /// components. Implies [`destroy`](Self::destroy).
    pub fn finalize(&mut self, ctx: &mut TickContext<'_>) {
        if self.finalized {
            return;
        }
        self.destroyed = true;
        self.finalized = true;
        for slot in 0..self.components.len() {
            if let Some(mut component) = self.components.take(slot) {
                component.as_mut().on_destroy(self, ctx);
                self.components.restore(slot, component);
            }
        }
        self.components.clear();
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("tags", &self.tags)
            .field("level", &self.level)
            .field("components", &self.components.kinds())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBuffer;
    use crate::event::EventBus;
    use crate::grid::Grid;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        label: &'static str,
        log: Log,
    }

    impl Component for Recorder {
        fn update(&mut self, _owner: &mut Entity, _ctx: &mut TickContext<'_>) {
            self.log.borrow_mut().push(format!("update:{}", self.label));
        }

        fn on_destroy(&mut self, _owner: &mut Entity, _ctx: &mut TickContext<'_>) {
            self.log.borrow_mut().push(format!("destroy:{}", self.label));
        }
    }

    struct Other(Recorder);

    impl Component for Other {
        fn update(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
            self.0.update(owner, ctx);
        }
    }

    #[derive(Debug)]
    struct SelfDestruct;

    impl Component for SelfDestruct {
        fn update(&mut self, owner: &mut Entity, _ctx: &mut TickContext<'_>) {
            owner.destroy();
        }
    }

    fn run_update(entity: &mut Entity) {
        let mut grid = Grid::new(4, 4, 64.0);
        let events = EventBus::new();
        let commands = CommandBuffer::new();
        let mut ctx = TickContext::new(1.0 / 60.0, &mut grid, &events, &commands);
        entity.update(&mut ctx);
    }

    // -- 1. Handles ---------------------------------------------------------

    #[test]
    fn retired_slot_comes_back_with_a_new_generation() {
        let mut table = HandleTable::new();
        let first = table.issue("bug0");
        let other = table.issue("bug1");
        assert_ne!(first.index(), other.index());

        assert_eq!(table.retire(first).as_deref(), Some("bug0"));
        assert_eq!(table.retire(first), None, "already retired");
        let reused = table.issue("bug2");
        assert_eq!(reused.index(), first.index());
        assert_eq!(reused.generation(), 1);
        assert!(!table.is_current(first), "stale handle must not alias the new one");
        assert_eq!(table.name_of(first), None);
        assert_eq!(table.name_of(reused), Some("bug2"));
        assert_eq!(table.live_count(), 2);
    }

    #[test]
    fn names_resolve_to_live_handles_in_issue_order() {
        let mut table = HandleTable::new();
        let a = table.issue("door");
        let b = table.issue("door");
        assert_eq!(table.named("door"), [a, b]);
        table.retire(a);
        assert_eq!(table.named("door"), [b]);
        table.retire(b);
        assert!(table.named("door").is_empty());
        assert!(table.named("never").is_empty());
    }

    #[test]
    fn handles_order_by_generation_then_index() {
        assert!(EntityId::new(5, 0) < EntityId::new(0, 1));
        assert!(EntityId::new(1, 2) < EntityId::new(3, 2));
    }

    // -- 2. Component lookup -------------------------------------------------

    #[test]
    fn require_reports_missing_component() {
        let entity = Entity::new("skeleton0", "skeleton");
        let err = entity.require::<SelfDestruct>().unwrap_err();
        assert!(err.to_string().contains("skeleton0"));
        assert!(err.to_string().contains("SelfDestruct"));
    }

    #[test]
    fn with_component_lends_owner_mutably() {
        struct Hits(u32);
        impl Component for Hits {}

        let mut entity = Entity::new("crate0", "crate");
        entity.add(Hits(0));
        let seen = entity.with_component::<Hits, _>(|hits, owner| {
            hits.0 += 1;
            owner.add_tag("hit");
            owner.has::<Hits>()
        });
        assert_eq!(seen, Some(false), "component is detached while lent");
        assert!(entity.has_tag("hit"));
        assert_eq!(entity.get::<Hits>().map(|h| h.0), Some(1));
    }

    // -- 3. Update order -----------------------------------------------------

    #[test]
    fn explicit_update_order_is_honoured() {
        let log: Log = Rc::default();
        let mut entity = Entity::new("e", "test");
        entity.add(Recorder { label: "a", log: log.clone() });
        entity.add(Other(Recorder { label: "b", log: log.clone() }));
        entity.set_update_order(&[ComponentKind::of::<Other>(), ComponentKind::of::<Recorder>()]);

        run_update(&mut entity);
        assert_eq!(*log.borrow(), vec!["update:b", "update:a"]);
    }

    #[test]
    fn destroyed_entity_stops_updating_mid_pass() {
        let log: Log = Rc::default();
        let mut entity = Entity::new("e", "test");
        entity.add(SelfDestruct);
        entity.add(Recorder { label: "late", log: log.clone() });

        run_update(&mut entity);
        assert!(entity.is_destroyed());
        assert!(log.borrow().is_empty());
    }

    // -- 4. Finalize ----------------------------------------------------------

    #[test]
    fn finalize_runs_destroy_hooks_once() {
        let log: Log = Rc::default();
        let mut entity = Entity::new("e", "test");
        entity.add(Recorder { label: "a", log: log.clone() });

        let mut grid = Grid::new(2, 2, 64.0);
        let events = EventBus::new();
        let commands = CommandBuffer::new();
        let mut ctx = TickContext::new(0.0, &mut grid, &events, &commands);
        entity.finalize(&mut ctx);
        entity.finalize(&mut ctx);

        assert_eq!(*log.borrow(), vec!["destroy:a"]);
        assert!(entity.is_destroyed());
        assert_eq!(entity.component_count(), 0);
    }
}
