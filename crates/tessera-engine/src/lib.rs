//! Tessera engine -- level loading, deferred creation, movement rules,
//! gameplay components and the simulation driver.
//!
//! This crate builds on [`tessera_core`] and [`tessera_state`]. A
//! [`GameSession`](session::GameSession) is the composition root: it owns the
//! world-state store, the entity catalog, the event bus, the registry, the grid
//! and the deferred-creator manager, and drives the fixed-timestep
//! [`Simulation`](tick::Simulation).
//!
//! # Quick Start
//!
//! ```
//! use tessera_engine::prelude::*;
//!
//! let level = r#"{
//!     "name": "dungeon1",
//!     "width": 8,
//!     "height": 8,
//!     "playerStart": { "x": 1, "y": 1 },
//!     "cells": [],
//!     "entities": [
//!         { "id": "crate0", "type": "breakable", "data": { "col": 5, "row": 5, "health": 20 } }
//!     ]
//! }"#;
//!
//! let mut levels = InMemoryLevels::new();
//! levels.insert_json(level).unwrap();
//!
//! let mut session = GameSession::new(EngineConfig::default(), levels, WorldStateStore::new());
//! session.load_level("dungeon1", None).unwrap();
//! session.run_ticks(10).unwrap();
//!
//! assert!(session.registry().find_by_name("crate0").is_some());
//! assert!(session.registry().find_by_name("player").is_some());
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod creator;
pub mod gameplay;
pub mod level;
pub mod loader;
pub mod movement;
pub mod pathfinding;
pub mod session;
pub mod tick;

use std::path::PathBuf;

/// Re-export the core crate for convenience.
pub use tessera_core;

/// Re-export the state crate for convenience.
pub use tessera_state;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] tessera_core::CoreError),

    #[error(transparent)]
    State(#[from] tessera_state::StateError),

    #[error(transparent)]
    Level(#[from] level::LevelError),

    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed engine configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no level is loaded")]
    NoLevel,
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use tessera_core::prelude::*;
    pub use tessera_state::prelude::*;

    pub use crate::config::{EngineConfig, TickConfig};
    pub use crate::creator::{CreationGate, CreationPolicy, Creator, DeferredCreatorManager};
    pub use crate::gameplay::{
        exit_event, register_defaults, spawn_bug, spawn_bug_base, spawn_player, Breakable,
        BroodMember, BugBase, BugSpawner, CellEdit, CellModifier, ChainStep, Chaser, Difficulty,
        EventChainer, Health, LevelExit, Pickup, PlayerBeacon, PlayerInput, PlayerLocator, Projectile, Rarity, Transition,
        TransitionSlot, TriggerZone, BREAKABLE_TAG, CELL_MODIFIER_TAG, ENEMY_TAG,
        LEVEL_LOADED_EVENT, PLAYER_NAME, PLAYER_PROJECTILE_TAG, PLAYER_TAG,
    };
    pub use crate::level::{EntityDef, LevelDocument, LevelError, PlayerStart};
    pub use crate::loader::{
        load_entities, Blueprint, EntityCatalog, EntityFactory, LoadReport, SpawnContext,
    };
    pub use crate::movement::{can_move, teleport, GridAnchor, GridMover, CELL_BLOCKER_TAG};
    pub use crate::pathfinding::find_path;
    pub use crate::session::{GameSession, InMemoryLevels, LevelDirectory, LevelSource};
    pub use crate::tick::{Simulation, TickDiagnostics, TickReport};
    pub use crate::EngineError;
}
