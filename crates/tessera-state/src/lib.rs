//! Tessera state -- the persistent world-state journal.
//!
//! Records, per level, which event-spawned entities are live, which
//! level-defined entities were destroyed, which triggers have fired and which
//! cells differ from the level document, plus a handful of player-global
//! values. The level loader consults it to reconcile a level on re-entry.
//!
//! The store is constructed explicitly and shared through the cloneable
//! [`WorldStateStore`](world_state::WorldStateStore) handle.

#![deny(unsafe_code)]

pub mod journal;
pub mod world_state;

use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while reading or writing world-state documents.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to access world state at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed world-state document: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::journal::LevelJournal;
    pub use crate::world_state::{
        PlayerState, WorldState, WorldStateStore, DEFAULT_PLAYER_HEALTH, DEFAULT_STARTING_LEVEL,
    };
    pub use crate::StateError;
}
