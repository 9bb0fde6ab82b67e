//! Components and the per-entity typed component set.
//!
//! A [`Component`] is a behaviour unit owned by exactly one [`Entity`]. Each
//! entity stores its components in a [`ComponentSet`], keyed by the Rust
//! `TypeId` of the component, so lookups by kind are a hash probe plus a
//! downcast. There is no global registry of components by type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::context::TickContext;
use crate::entity::Entity;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Upcast helper so boxed components can be downcast to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A behaviour unit attached to one entity.
///
/// All hooks are optional. While a hook runs the component is detached from
/// its owner, so `owner` can be borrowed mutably alongside `self`; looking up
/// the running component's own kind on `owner` returns `None`.
pub trait Component: AsAny {
    /// Called once, when the component is attached.
    fn init(&mut self, _owner: &mut Entity) {}

    /// Called every tick while the owner is alive, in the owner's update order.
    fn update(&mut self, _owner: &mut Entity, _ctx: &mut TickContext<'_>) {}

    /// Called exactly once when the owner is reaped or removed.
    fn on_destroy(&mut self, _owner: &mut Entity, _ctx: &mut TickContext<'_>) {}
}

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// Stable identifier of a component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentKind {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentKind {
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Full type path, e.g. `tessera_core::transform::Transform`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path.
    pub fn short_name(&self) -> String {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base).to_owned()
    }
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKind({})", self.short_name())
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

struct Slot {
    kind: ComponentKind,
    // `None` only while the component is detached for one of its hooks.
    component: Option<Box<dyn Component>>,
}

/// Typed storage for one entity's components plus its update order.
///
/// Slots keep insertion order; the update order is a list of slot indices.
#[derive(Default)]
pub struct ComponentSet {
    slots: Vec<Slot>,
    by_type: HashMap<TypeId, usize>,
    update_order: Vec<usize>,
}

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a component, returning the one it replaced.
    ///
    /// New kinds are appended to the update order.
    pub fn insert(
        &mut self,
        kind: ComponentKind,
        component: Box<dyn Component>,
    ) -> Option<Box<dyn Component>> {
        if let Some(&slot) = self.by_type.get(&kind.type_id) {
            return self.slots[slot].component.replace(component);
        }
        let slot = self.slots.len();
        self.slots.push(Slot {
            kind,
            component: Some(component),
        });
        self.by_type.insert(kind.type_id, slot);
        self.update_order.push(slot);
        None
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        let slot = self.position(TypeId::of::<T>())?;
        let component = self.slots[slot].component.as_deref()?;
        component.as_any().downcast_ref::<T>()
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        let slot = self.position(TypeId::of::<T>())?;
        let component = self.slots[slot].component.as_deref_mut()?;
        component.as_any_mut().downcast_mut::<T>()
    }

    /// Whether a component of this type is present and attached.
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.position(type_id)
            .is_some_and(|slot| self.slots[slot].component.is_some())
    }

    pub fn position(&self, type_id: TypeId) -> Option<usize> {
        self.by_type.get(&type_id).copied()
    }

    /// Detach the component in `slot`.
    pub fn take(&mut self, slot: usize) -> Option<Box<dyn Component>> {
        self.slots.get_mut(slot)?.component.take()
    }

    /// Reattach a component previously detached with [`take`](Self::take).
    ///
    /// If the slot was refilled meanwhile (the component re-added its own
    /// kind during a hook), the newer component wins.
    pub fn restore(&mut self, slot: usize, component: Box<dyn Component>) {
        if let Some(entry) = self.slots.get_mut(slot) {
            if entry.component.is_none() {
                entry.component = Some(component);
            }
        }
    }

    pub fn set_update_order(&mut self, order: &[ComponentKind]) {
        self.update_order = order
            .iter()
            .filter_map(|kind| {
                let slot = self.by_type.get(&kind.type_id).copied();
                if slot.is_none() {
                    debug!(component = %kind, "update order names a component the entity lacks");
                }
                slot
            })
            .collect();
    }

    pub fn update_order(&self) -> Vec<ComponentKind> {
        self.update_order
            .iter()
            .map(|&slot| self.slots[slot].kind)
            .collect()
    }

    /// Slot indices in update order.
    pub fn update_slots(&self) -> Vec<usize> {
        self.update_order.clone()
    }

    pub fn kinds(&self) -> Vec<ComponentKind> {
        self.slots.iter().map(|s| s.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.by_type.clear();
        self.update_order.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    #[derive(Debug, PartialEq)]
    struct Speed(f64);
    impl Component for Speed {}

    #[test]
    fn insert_and_lookup_by_kind() {
        let mut set = ComponentSet::new();
        set.insert(ComponentKind::of::<Health>(), Box::new(Health(10)));
        set.insert(ComponentKind::of::<Speed>(), Box::new(Speed(2.5)));

        assert_eq!(set.get::<Health>(), Some(&Health(10)));
        assert_eq!(set.get::<Speed>(), Some(&Speed(2.5)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn reinsert_replaces_and_keeps_order() {
        let mut set = ComponentSet::new();
        set.insert(ComponentKind::of::<Health>(), Box::new(Health(10)));
        set.insert(ComponentKind::of::<Speed>(), Box::new(Speed(1.0)));
        let old = set.insert(ComponentKind::of::<Health>(), Box::new(Health(3)));

        assert!(old.is_some());
        assert_eq!(set.get::<Health>(), Some(&Health(3)));
        assert_eq!(
            set.update_order(),
            vec![ComponentKind::of::<Health>(), ComponentKind::of::<Speed>()]
        );
    }

    #[test]
    fn detached_component_is_invisible() {
        let mut set = ComponentSet::new();
        set.insert(ComponentKind::of::<Health>(), Box::new(Health(1)));
        let slot = set.position(TypeId::of::<Health>()).unwrap();
        let taken = set.take(slot).unwrap();

        assert!(set.get::<Health>().is_none());
        assert!(!set.contains(TypeId::of::<Health>()));
        set.restore(slot, taken);
        assert!(set.contains(TypeId::of::<Health>()));
    }

    #[test]
    fn update_order_skips_absent_kinds() {
        let mut set = ComponentSet::new();
        set.insert(ComponentKind::of::<Speed>(), Box::new(Speed(1.0)));
        set.set_update_order(&[ComponentKind::of::<Health>(), ComponentKind::of::<Speed>()]);
        assert_eq!(set.update_order(), vec![ComponentKind::of::<Speed>()]);
    }

    #[test]
    fn short_name_strips_module_path() {
        assert_eq!(ComponentKind::of::<Health>().short_name(), "Health");
        assert_eq!(ComponentKind::of::<Health>().to_string(), "Health");
    }
}
