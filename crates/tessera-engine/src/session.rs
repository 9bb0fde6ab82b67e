//! Level sessions.
//!
//! [`GameSession`] is the composition root. It owns the world-state store,
//! the entity catalog, the level source, the deferred-creator manager and the
//! [`Simulation`] (which in turn owns the grid, registry and event bus), and it
//! moves the player between levels.
//!
//! Loading a level folds the outgoing level's terrain into its journal, tears
//! it down without journaling destructions, builds the grid from the document
//! plus the journal's modified cells,
//! records the world state as it stood on entry, places the player and hands
//! the definitions to [`load_entities`]. Exits and player death are handled
//! between ticks: a pending [`Transition`] loads its target level, and a dead
//! player reloads the current level from the entry snapshot, discarding
//! whatever changed since.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tessera_core::event::EventBus;
use tessera_core::grid::{CellCoord, Grid};
use tessera_core::registry::{DestructionJournal, EntityRegistry};
use tessera_state::world_state::{WorldState, WorldStateStore};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::creator::DeferredCreatorManager;
use crate::gameplay::{
    spawn_player, Health, PlayerInput, PlayerLocator, Transition, TransitionSlot, LEVEL_LOADED_EVENT, PLAYER_NAME,
};
use crate::level::{LevelDocument, LevelError};
use crate::loader::{load_entities, EntityCatalog, LoadReport, SpawnContext};
use crate::tick::{Simulation, TickReport};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Level sources
// ---------------------------------------------------------------------------

/// Where level documents come from.
pub trait LevelSource {
    fn fetch(&self, name: &str) -> Result<LevelDocument, LevelError>;
}

/// Levels held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLevels {
    levels: HashMap<String, LevelDocument>,
}

impl InMemoryLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `doc` under its own name.
    pub fn insert(&mut self, doc: LevelDocument) {
        self.levels.insert(doc.name.clone(), doc);
    }

    /// Parse and store a document. Its `name` field is the key.
    pub fn insert_json(&mut self, json: &str) -> Result<(), LevelError> {
        self.insert(LevelDocument::from_json(json)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl LevelSource for InMemoryLevels {
    fn fetch(&self, name: &str) -> Result<LevelDocument, LevelError> {
        self.levels
            .get(name)
            .cloned()
            .ok_or_else(|| LevelError::MissingLevel(name.to_owned()))
    }
}

/// Levels stored as `<root>/<name>.json`.
#[derive(Debug, Clone)]
pub struct LevelDirectory {
    root: PathBuf,
}

impl LevelDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }
}

impl LevelSource for LevelDirectory {
    fn fetch(&self, name: &str) -> Result<LevelDocument, LevelError> {
        let path = self.path_of(name);
        if !path.exists() {
            return Err(LevelError::MissingLevel(name.to_owned()));
        }
        let json = fs::read_to_string(&path).map_err(|source| LevelError::Io { path, source })?;
        let mut doc = LevelDocument::from_json(&json)?;
        if doc.name.is_empty() {
            doc.name = name.to_owned();
        }
        Ok(doc)
    }
}

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

pub struct GameSession {
    config: EngineConfig,
    store: WorldStateStore,
    catalog: Rc<EntityCatalog>,
    source: Box<dyn LevelSource>,
    simulation: Simulation,
    creators: DeferredCreatorManager,
    transitions: TransitionSlot,
    player: PlayerLocator,
    document: Option<LevelDocument>,
    entry: Option<WorldState>,
}

impl GameSession {
    /// A session with every built-in entity kind and no level loaded.
    pub fn new(config: EngineConfig, source: impl LevelSource + 'static, store: WorldStateStore) -> Self {
        let mut simulation = Simulation::new(Grid::new(1, 1, config.cell_size), config.tick.clone());
        let journal: Rc<dyn DestructionJournal> = Rc::new(store.clone());
        simulation.registry_mut().attach_journal(journal);
        store.set_track_destructions(config.track_destructions);

        let creators = DeferredCreatorManager::new(
            simulation.events().clone(),
            simulation.commands().clone(),
            store.clone(),
        );
        Self {
            config,
            store,
            catalog: Rc::new(EntityCatalog::with_defaults()),
            source: Box::new(source),
            simulation,
            creators,
            transitions: TransitionSlot::new(),
            player: PlayerLocator::new(),
            document: None,
            entry: None,
        }
    }

    /// Replace the entity catalog. Takes effect on the next load.
    pub fn with_catalog(mut self, catalog: EntityCatalog) -> Self {
        self.catalog = Rc::new(catalog);
        self
    }

    // -- loading ------------------------------------------------------------

    /// Load `name`, placing the player on `spawn`.
    ///
    /// The level being left is recorded first, so edited terrain survives a
    /// later visit, including re-entering the same level. Without an explicit
    /// spawn the player starts on the stored spawn cell when re-entering the
    /// current level, and on the document's start cell otherwise.
    pub fn load_level(&mut self, name: &str, spawn: Option<CellCoord>) -> Result<LoadReport, EngineError> {
        let doc = self.fetch_level(name)?;
        self.record_level_state();
        self.enter(doc, spawn)
    }

    fn fetch_level(&self, name: &str) -> Result<LevelDocument, EngineError> {
        let mut doc = self.source.fetch(name)?;
        if doc.name.is_empty() {
            doc.name = name.to_owned();
        }
        self.catalog.validate(&doc)?;
        Ok(doc)
    }

    fn enter(&mut self, doc: LevelDocument, spawn: Option<CellCoord>) -> Result<LoadReport, EngineError> {
        let reentering = self.store.current_level() == doc.name;
        self.teardown();

        let cell = spawn
            .or_else(|| self.store.player_spawn().filter(|_| reentering))
            .unwrap_or_else(|| doc.player_start_cell());
        self.store.set_current_level(&doc.name);
        self.store.set_player_spawn(cell);

        let mut grid = doc.build_grid(self.config.cell_size);
        let journal = self.store.level(&doc.name);
        grid.apply_overrides(&journal.modified_cells);
        self.simulation.replace_grid(grid);

        self.entry = Some(self.store.snapshot());

        let stored = self.store.player_health();
        let health = if stored > 0 {
            Health::with_current(self.config.default_player_health, stored)
        } else {
            Health::new(self.config.default_player_health)
        };
        self.simulation.registry_mut().add(spawn_player(
            cell,
            self.config.cell_size,
            health,
            self.config.player_speed,
            self.player.clone(),
        ));

        let ctx = SpawnContext {
            level: doc.name.clone(),
            cell_size: self.config.cell_size,
            events: self.simulation.events().clone(),
            store: self.store.clone(),
            transitions: self.transitions.clone(),
            player: self.player.clone(),
        };
        let report = load_entities(&doc, &self.catalog, &ctx, self.simulation.registry_mut(), &self.creators)?;

        info!(level = %doc.name, %cell, entities = report.spawned, "level loaded");
        self.document = Some(doc);
        self.simulation.events().raise_event(LEVEL_LOADED_EVENT);
        Ok(report)
    }

    /// Load `level` with the player on `cell`.
    pub fn transition_to(&mut self, level: &str, cell: CellCoord) -> Result<LoadReport, EngineError> {
        info!(from = ?self.current_level(), to = level, %cell, "level transition");
        self.load_level(level, Some(cell))
    }

    /// Restore the world state captured on entry and load the level afresh.
    /// Nothing from the abandoned attempt is recorded.
    pub fn reload_current_level(&mut self) -> Result<LoadReport, EngineError> {
        let level = self.current_level().ok_or(EngineError::NoLevel)?.to_owned();
        let doc = self.fetch_level(&level)?;
        if let Some(entry) = self.entry.take() {
            self.store.restore(entry);
        }
        info!(level = %level, "reloading level");
        self.enter(doc, None)
    }

    /// Drop every entity, creator and pending transition without journaling.
    pub fn teardown(&mut self) {
        let tracking = self.store.tracks_destructions();
        self.store.set_track_destructions(false);
        self.simulation.with_context(|registry, ctx| registry.destroy_all(ctx));
        self.store.set_track_destructions(tracking);

        self.creators.clear();
        if let Some(dropped) = self.transitions.take() {
            debug!(level = %dropped.target_level, "pending transition dropped");
        }
        self.simulation.grid_mut().clear_all_occupants();
    }

    // -- ticking ------------------------------------------------------------

    /// Advance one tick, then act on a pending transition or a dead player.
    pub fn tick(&mut self) -> Result<TickReport, EngineError> {
        if self.document.is_none() {
            return Err(EngineError::NoLevel);
        }
        let report = self.simulation.tick();

        let health = self.player_health();
        if let Some(health) = health {
            self.store.set_player_health(health.current());
        }

        if let Some(Transition {
            target_level,
            target_cell,
        }) = self.transitions.take()
        {
            self.transition_to(&target_level, target_cell)?;
        } else if health.map_or(true, |h| h.is_dead()) {
            warn!(level = ?self.current_level(), "player died");
            self.reload_current_level()?;
        }
        Ok(report)
    }

    /// Advance `n` ticks. Returns the number of collision hits.
    pub fn run_ticks(&mut self, n: u64) -> Result<usize, EngineError> {
        let mut hits = 0;
        for _ in 0..n {
            hits += self.tick()?.collision.hits;
        }
        Ok(hits)
    }

    // -- persistence --------------------------------------------------------

    /// Fold the current grid into the level's journal and write the world
    /// state to `path`.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        self.record_level_state();
        self.store.save(path)?;
        Ok(())
    }

    fn record_level_state(&self) {
        let Some(doc) = &self.document else { return };
        self.store.update_modified_cells(&doc.name, self.simulation.grid(), &doc.cells);
        if let Some(health) = self.player_health() {
            self.store.set_player_health(health.current());
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &WorldStateStore {
        &self.store
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    pub fn current_level(&self) -> Option<&str> {
        self.document.as_ref().map(|doc| doc.name.as_str())
    }

    pub fn document(&self) -> Option<&LevelDocument> {
        self.document.as_ref()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }

    pub fn registry(&self) -> &EntityRegistry {
        self.simulation.registry()
    }

    pub fn grid(&self) -> &Grid {
        self.simulation.grid()
    }

    pub fn events(&self) -> &Rc<EventBus> {
        self.simulation.events()
    }

    pub fn creators(&self) -> &DeferredCreatorManager {
        &self.creators
    }

    pub fn transitions(&self) -> &TransitionSlot {
        &self.transitions
    }

    pub fn player_input(&mut self) -> Option<&mut PlayerInput> {
        self.simulation
            .registry_mut()
            .find_by_name_mut(PLAYER_NAME)?
            .get_mut::<PlayerInput>()
    }

    pub fn player_health(&self) -> Option<Health> {
        self.registry().find_by_name(PLAYER_NAME)?.get::<Health>().copied()
    }

    /// The player's cell as of the last tick.
    pub fn player_cell(&self) -> Option<CellCoord> {
        self.player.cell()
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("level", &self.current_level())
            .field("entities", &self.registry().len())
            .field("creators", &self.creators)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
