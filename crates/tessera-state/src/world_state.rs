//! The world-state document and its shared store handle.
//!
//! [`WorldState`] is the serializable document: player-global values plus a
//! [`LevelJournal`] per level name. [`WorldStateStore`] wraps it in a shared,
//! cloneable handle so the registry (through [`DestructionJournal`]), the
//! deferred-creator manager, gameplay components and the session all write to
//! the same journal.
//!
//! Destruction tracking can be suspended, which the session does while tearing
//! a level down so that unloading does not read as destruction.
//!
//! # Example
//!
//! ```
//! use tessera_state::world_state::WorldStateStore;
//!
//! let store = WorldStateStore::new();
//! store.add_live_entity("dungeon1", "ghost_door0");
//! store.add_destroyed_entity("dungeon1", "ghost_door0");
//!
//! let json = store.to_json().unwrap();
//! let reloaded = WorldStateStore::from_json(&json).unwrap();
//! assert!(reloaded.is_destroyed("dungeon1", "ghost_door0"));
//! assert!(!reloaded.is_live("dungeon1", "ghost_door0"));
//! assert_eq!(store.digest().unwrap(), reloaded.digest().unwrap());
//! ```

use std::cell::{Cell as Flag, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tessera_core::grid::{CellCoord, CellOverride, Grid};
use tessera_core::registry::DestructionJournal;
use tracing::{debug, info};

use crate::journal::LevelJournal;
use crate::StateError;

pub const DEFAULT_PLAYER_HEALTH: i32 = 100;
pub const DEFAULT_STARTING_LEVEL: &str = "dungeon1";

// ---------------------------------------------------------------------------
// PlayerState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    #[serde(default = "default_health")]
    pub health: i32,
    #[serde(default)]
    pub overheal: i32,
    #[serde(default)]
    pub coins: u32,
    #[serde(default = "default_level")]
    pub current_level: String,
    /// Cell to place the player on when the next level loads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_col: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_row: Option<i32>,
    /// Where the player entered the current level.
    #[serde(default)]
    pub entry_cell: CellCoord,
}

fn default_health() -> i32 {
    DEFAULT_PLAYER_HEALTH
}

fn default_level() -> String {
    DEFAULT_STARTING_LEVEL.to_owned()
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            health: DEFAULT_PLAYER_HEALTH,
            overheal: 0,
            coins: 0,
            current_level: default_level(),
            spawn_col: None,
            spawn_row: None,
            entry_cell: CellCoord::default(),
        }
    }
}

impl PlayerState {
    pub fn spawn_cell(&self) -> Option<CellCoord> {
        Some(CellCoord::new(self.spawn_col?, self.spawn_row?))
    }
}

// ---------------------------------------------------------------------------
// WorldState
// ---------------------------------------------------------------------------

/// The persistent document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldState {
    #[serde(default)]
    pub player: PlayerState,
    #[serde(default)]
    pub levels: BTreeMap<String, LevelJournal>,
}

impl WorldState {
    pub fn level(&self, name: &str) -> Option<&LevelJournal> {
        self.levels.get(name)
    }

    /// The journal for `name`, created empty on first access.
    pub fn level_mut(&mut self, name: &str) -> &mut LevelJournal {
        self.levels.entry(name.to_owned()).or_default()
    }
}

// ---------------------------------------------------------------------------
// WorldStateStore
// ---------------------------------------------------------------------------

/// Shared handle to one [`WorldState`]. Clones refer to the same document.
#[derive(Debug, Clone)]
pub struct WorldStateStore {
    state: Rc<RefCell<WorldState>>,
    track_destructions: Rc<Flag<bool>>,
}

impl Default for WorldStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldStateStore {
    pub fn new() -> Self {
        Self::with_state(WorldState::default())
    }

    pub fn with_state(state: WorldState) -> Self {
        Self {
            state: Rc::new(RefCell::new(state)),
            track_destructions: Rc::new(Flag::new(true)),
        }
    }

    // -- tracking -----------------------------------------------------------

    pub fn set_track_destructions(&self, enabled: bool) {
        self.track_destructions.set(enabled);
    }

    pub fn tracks_destructions(&self) -> bool {
        self.track_destructions.get()
    }

    // -- level journal ------------------------------------------------------

    pub fn add_live_entity(&self, level: &str, id: &str) {
        if self.state.borrow_mut().level_mut(level).add_live(id) {
            debug!(level, entity = id, "journaled live entity");
        }
    }

    pub fn add_destroyed_entity(&self, level: &str, id: &str) {
        if self.state.borrow_mut().level_mut(level).add_destroyed(id) {
            debug!(level, entity = id, "journaled destroyed entity");
        }
    }

    pub fn add_fired_trigger(&self, level: &str, event: &str) {
        if self.state.borrow_mut().level_mut(level).add_fired(event) {
            debug!(level, event, "journaled fired trigger");
        }
    }

    pub fn mark_cells_touched(&self, level: &str, cells: impl IntoIterator<Item = CellCoord>) {
        let added = self.state.borrow_mut().level_mut(level).mark_touched(cells);
        if added > 0 {
            debug!(level, added, "journaled touched cells");
        }
    }

    /// Diff `grid` against the level document's cells and store the result as
    /// the level's modified-cell list.
    pub fn update_modified_cells(&self, level: &str, grid: &Grid, original: &[CellOverride]) {
        let count = self
            .state
            .borrow_mut()
            .level_mut(level)
            .record_modified_cells(grid, original);
        info!(level, count, "recorded modified cells");
    }

    pub fn is_live(&self, level: &str, id: &str) -> bool {
        self.read_level(level, |j| j.is_live(id))
    }

    pub fn is_destroyed(&self, level: &str, id: &str) -> bool {
        self.read_level(level, |j| j.is_destroyed(id))
    }

    pub fn has_fired_trigger(&self, level: &str, event: &str) -> bool {
        self.read_level(level, |j| j.has_fired(event))
    }

    /// A copy of the level's journal (empty if never written).
    pub fn level(&self, name: &str) -> LevelJournal {
        self.state.borrow().level(name).cloned().unwrap_or_default()
    }

    fn read_level(&self, level: &str, f: impl FnOnce(&LevelJournal) -> bool) -> bool {
        self.state.borrow().level(level).is_some_and(f)
    }

    // -- player -------------------------------------------------------------

    pub fn player(&self) -> PlayerState {
        self.state.borrow().player.clone()
    }

    pub fn player_health(&self) -> i32 {
        self.state.borrow().player.health
    }

    pub fn set_player_health(&self, health: i32) {
        self.state.borrow_mut().player.health = health;
    }

    pub fn player_overheal(&self) -> i32 {
        self.state.borrow().player.overheal
    }

    pub fn set_player_overheal(&self, overheal: i32) {
        self.state.borrow_mut().player.overheal = overheal;
    }

    pub fn coins(&self) -> u32 {
        self.state.borrow().player.coins
    }

    /// Returns the new total.
    pub fn add_coins(&self, amount: u32) -> u32 {
        let mut state = self.state.borrow_mut();
        state.player.coins = state.player.coins.saturating_add(amount);
        state.player.coins
    }

    pub fn current_level(&self) -> String {
        self.state.borrow().player.current_level.clone()
    }

    pub fn set_current_level(&self, level: &str) {
        self.state.borrow_mut().player.current_level = level.to_owned();
    }

    /// Sets the next spawn cell, which also becomes the entry cell.
    pub fn set_player_spawn(&self, cell: CellCoord) {
        let mut state = self.state.borrow_mut();
        let player = &mut state.player;
        player.spawn_col = Some(cell.col);
        player.spawn_row = Some(cell.row);
        player.entry_cell = cell;
    }

    pub fn clear_player_spawn(&self) {
        let mut state = self.state.borrow_mut();
        let player = &mut state.player;
        player.spawn_col = None;
        player.spawn_row = None;
    }

    pub fn player_spawn(&self) -> Option<CellCoord> {
        self.state.borrow().player.spawn_cell()
    }

    pub fn entry_cell(&self) -> CellCoord {
        self.state.borrow().player.entry_cell
    }

    // -- whole document -----------------------------------------------------

    pub fn snapshot(&self) -> WorldState {
        self.state.borrow().clone()
    }

    /// Replace the document. Handles cloned from this one see the new state.
    pub fn restore(&self, state: WorldState) {
        *self.state.borrow_mut() = state;
    }

    pub fn reset(&self) {
        self.restore(WorldState::default());
    }

    pub fn to_json(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string_pretty(&*self.state.borrow())?)
    }

    pub fn from_json(json: &str) -> Result<Self, StateError> {
        Ok(Self::with_state(serde_json::from_str(json)?))
    }

    /// Load a saved document, or start fresh if the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => {
                let store = Self::from_json(&json)?;
                info!(path = %path.display(), "loaded world state");
                Ok(store)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no saved world state, starting fresh");
                Ok(Self::new())
            }
            Err(source) => Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StateError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| StateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "saved world state");
        Ok(())
    }

    /// BLAKE3 hex digest of the compact JSON document. Level journals are
    /// keyed in sorted order, so equal documents hash equal.
    pub fn digest(&self) -> Result<String, StateError> {
        let bytes = serde_json::to_vec(&*self.state.borrow())?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

impl DestructionJournal for WorldStateStore {
    fn record_destroyed(&self, level: &str, entity: &str) {
        if self.tracks_destructions() {
            self.add_destroyed_entity(level, entity);
        } else {
            debug!(level, entity, "destruction tracking suspended");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
