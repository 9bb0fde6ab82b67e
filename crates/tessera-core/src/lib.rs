//! Tessera core -- entity/component runtime, spatial grid, collision and
//! event bus for a tick-driven 2D action game.
//!
//! Entities are containers of typed [`Component`](component::Component)s
//! updated in an explicit order. The [`EntityRegistry`](registry::EntityRegistry)
//! drives their lifecycle; destruction is a flag honoured at the end of the
//! update pass. The [`Grid`](grid::Grid) holds terrain, elevation layers and
//! explicit occupancy, which the [`CollisionSystem`](collision::CollisionSystem)
//! uses to limit candidate pairs to a 3x3 neighbourhood. The
//! [`EventBus`](event::EventBus) is a synchronous, re-entrant named
//! publish/subscribe channel.
//!
//! Everything runs on one thread; shared state uses `Rc` and `RefCell`.
//!
//! # Quick Start
//!
//! ```
//! use std::rc::Rc;
//! use tessera_core::prelude::*;
//!
//! struct Spin(u32);
//! impl Component for Spin {
//!     fn update(&mut self, _owner: &mut Entity, _ctx: &mut TickContext<'_>) {
//!         self.0 += 1;
//!     }
//! }
//!
//! let mut grid = Grid::new(10, 10, 64.0);
//! let events = Rc::new(EventBus::new());
//! let commands = CommandBuffer::new();
//! let mut registry = EntityRegistry::new();
//! registry.attach_events(events.clone());
//!
//! let mut top = Entity::new("top0", "top");
//! top.add(Spin(0));
//! let id = registry.add(top);
//!
//! let mut ctx = TickContext::new(1.0 / 60.0, &mut grid, &events, &commands);
//! registry.update(&mut ctx);
//! registry.update(&mut ctx);
//!
//! assert_eq!(registry.get(id).and_then(|e| e.get::<Spin>()).map(|s| s.0), Some(2));
//! ```

#![deny(unsafe_code)]

pub mod collision;
pub mod command;
pub mod component;
pub mod context;
pub mod entity;
pub mod event;
pub mod grid;
pub mod identity;
pub mod registry;
pub mod transform;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A required component lookup missed.
    #[error("entity '{entity}' has no {component} component")]
    MissingComponent { entity: String, component: String },

    /// The handle does not name a tracked entity (stale or never allocated).
    #[error("entity {entity} is not tracked by the registry")]
    UnknownEntity { entity: entity::EntityId },

    /// Grid occupancy disagrees with reported grid positions.
    #[error("occupancy violated for '{entity}': {detail}")]
    OccupancyViolation { entity: String, detail: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::collision::{
        Aabb, Collision, CollisionBox, CollisionReport, CollisionSystem, Contact, HitCallback,
    };
    pub use crate::command::{ApplyReport, Command, CommandBuffer};
    pub use crate::component::{Component, ComponentKind, ComponentSet};
    pub use crate::context::TickContext;
    pub use crate::entity::{Entity, EntityId, HandleTable};
    pub use crate::event::{listener_fn, EventBus, EventListener, FnListener};
    pub use crate::grid::{
        Cell, CellCoord, CellOverride, CellPatch, CellProperty, Grid, DEFAULT_CELL_SIZE,
    };
    pub use crate::identity::{EntityKind, Tags};
    pub use crate::registry::{destroyed_event, DestructionJournal, EntityRegistry, UpdateReport};
    pub use crate::transform::{GridPosition, Transform, Velocity};
    pub use crate::CoreError;
}
