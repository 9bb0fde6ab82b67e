//! Gameplay components and the level-data blueprints that assemble them.
//!
//! Each submodule owns one kind of level entity: its payload type, its
//! components and the [`Blueprint`](crate::loader::Blueprint) registered for it
//! by [`register_defaults`].
//!
//! | kind          | payload                                      |
//! |---------------|----------------------------------------------|
//! | `trigger`     | `eventToRaise`, `triggerCells`, `oneShot`    |
//! | `exit`        | `targetLevel`, `targetCol`, `targetRow`, `triggerCells`, `oneShot` |
//! | `eventchainer`| `eventsToRaise`, `startOnEvent`              |
//! | `cellmodifier`| `cellsToModify`                              |
//! | `bug_base`    | `col`, `row`, `difficulty`                   |
//! | `breakable`   | `col`, `row`, `health`, `rarity`             |

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tessera_core::grid::CellCoord;
use tessera_core::transform::Transform;

use crate::loader::EntityCatalog;

pub mod breakable;
pub mod bug;
pub mod bug_base;
pub mod cell_modifier;
pub mod chainer;
pub mod exit;
pub mod health;
pub mod pickup;
pub mod player;
pub mod projectile;
pub mod trigger;

pub use breakable::{Breakable, Rarity};
pub use bug::{spawn_bug, BroodMember, Chaser};
pub use bug_base::{spawn_bug_base, BugBase, BugSpawner, Difficulty};
pub use cell_modifier::{CellEdit, CellModifier};
pub use chainer::{ChainStep, EventChainer};
pub use exit::{exit_event, LevelExit};
pub use health::Health;
pub use pickup::Pickup;
pub use player::{spawn_player, PlayerBeacon, PlayerInput};
pub use projectile::Projectile;
pub use trigger::TriggerZone;

/// Identifier of the player entity.
pub const PLAYER_NAME: &str = "player";
pub const PLAYER_TAG: &str = "player";
pub const ENEMY_TAG: &str = "enemy";
pub const PLAYER_PROJECTILE_TAG: &str = "player_projectile";
pub const BREAKABLE_TAG: &str = "breakable";
pub const CELL_MODIFIER_TAG: &str = "cell_modifier";

/// Raised by the session once a level's entities are in place.
pub const LEVEL_LOADED_EVENT: &str = "level_loaded";

/// Register every built-in level entity kind.
pub fn register_defaults(catalog: &mut EntityCatalog) {
    catalog.register("trigger", trigger::blueprint());
    catalog.register("exit", exit::blueprint());
    catalog.register("eventchainer", chainer::blueprint());
    catalog.register("cellmodifier", cell_modifier::blueprint());
    catalog.register("bug_base", bug_base::blueprint());
    catalog.register("breakable", breakable::blueprint());
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// A requested move to another level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub target_level: String,
    pub target_cell: CellCoord,
}

/// Shared slot an exit writes its transition into; the session takes it after
/// the tick completes.
#[derive(Debug, Clone, Default)]
pub struct TransitionSlot(Rc<RefCell<Option<Transition>>>);

impl TransitionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a transition. A request already pending is kept.
    pub fn request(&self, transition: Transition) -> bool {
        let mut slot = self.0.borrow_mut();
        if slot.is_some() {
            return false;
        }
        *slot = Some(transition);
        true
    }

    pub fn take(&self) -> Option<Transition> {
        self.0.borrow_mut().take()
    }

    pub fn pending(&self) -> Option<Transition> {
        self.0.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.0.borrow().is_some()
    }
}

// ---------------------------------------------------------------------------
// Player location
// ---------------------------------------------------------------------------

/// The cell the player stands in, published by the player's [`PlayerBeacon`]
/// once per tick. Zones and enemies read it instead of searching the grid.
#[derive(Debug, Clone, Default)]
pub struct PlayerLocator(Rc<Cell<Option<CellCoord>>>);

impl PlayerLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(&self) -> Option<CellCoord> {
        self.0.get()
    }

    pub fn set(&self, cell: Option<CellCoord>) {
        self.0.set(cell);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// World position of a cell's centre for a grid with `cell_size` cells.
pub(crate) fn cell_center(cell_size: f64, cell: CellCoord) -> Transform {
    Transform::new(
        (f64::from(cell.col) + 0.5) * cell_size,
        (f64::from(cell.row) + 0.5) * cell_size,
    )
}
