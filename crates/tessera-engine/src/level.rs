//! Level documents.
//!
//! A level document describes the grid (dimensions plus the cells that differ
//! from plain ground), the player's default start cell and the entity
//! definitions the loader instantiates. Entity definitions may be gated on
//! events through `createOnAnyEvent` or `createOnAllEvents`; at most one of the
//! two may be present.
//!
//! ```
//! use tessera_engine::level::LevelDocument;
//!
//! let doc = LevelDocument::from_json(r#"{
//!     "name": "dungeon1",
//!     "width": 10,
//!     "height": 10,
//!     "playerStart": { "x": 4, "y": 3 },
//!     "cells": [{ "col": 4, "row": 1, "layer": 1, "properties": ["stairs"] }],
//!     "entities": [{ "id": "door0", "type": "trigger", "createOnAllEvents": ["a", "b"],
//!                    "data": { "eventToRaise": "door_open", "triggerCells": [] } }]
//! }"#).unwrap();
//!
//! assert!(doc.validate().is_ok());
//! let grid = doc.build_grid(64.0);
//! assert!(grid.is_transition(4, 1));
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tessera_core::grid::{CellCoord, CellOverride, Grid};

use crate::creator::{CreationGate, CreationPolicy};

// ---------------------------------------------------------------------------
// LevelError
// ---------------------------------------------------------------------------

/// Configuration errors that halt a level load.
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("level '{level}' defines entity id '{id}' more than once")]
    DuplicateId { level: String, id: String },

    #[error("entity '{id}' declares both createOnAnyEvent and createOnAllEvents")]
    ConflictingPolicy { id: String },

    #[error("entity '{id}' has an empty creation event list")]
    EmptyGate { id: String },

    #[error("entity '{id}' has unknown type '{kind}'")]
    UnknownKind { id: String, kind: String },

    #[error("entity '{id}' has an invalid '{kind}' payload: {source}")]
    InvalidPayload {
        id: String,
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("level '{0}' not found")]
    MissingLevel(String),

    #[error("failed to read level file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed level document: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// Default player start, in cell coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStart {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_on_any_event: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_on_all_events: Option<Vec<String>>,
    #[serde(default = "empty_payload")]
    pub data: Value,
}

fn empty_payload() -> Value {
    Value::Object(Map::new())
}

impl EntityDef {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            create_on_any_event: None,
            create_on_all_events: None,
            data,
        }
    }

    pub fn on_any(mut self, events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.create_on_any_event = Some(events.into_iter().map(Into::into).collect());
        self
    }

    pub fn on_all(mut self, events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.create_on_all_events = Some(events.into_iter().map(Into::into).collect());
        self
    }

    /// The creation gate, or `None` for an entity spawned at load.
    pub fn gate(&self) -> Result<Option<CreationGate>, LevelError> {
        let (policy, events) = match (&self.create_on_any_event, &self.create_on_all_events) {
            (Some(_), Some(_)) => {
                return Err(LevelError::ConflictingPolicy { id: self.id.clone() });
            }
            (Some(events), None) => (CreationPolicy::Any, events),
            (None, Some(events)) => (CreationPolicy::All, events),
            (None, None) => return Ok(None),
        };
        if events.is_empty() {
            return Err(LevelError::EmptyGate { id: self.id.clone() });
        }
        Ok(Some(CreationGate::new(policy, events.iter().cloned())))
    }

    /// Decode the payload into the kind's typed data.
    pub fn payload<D: serde::de::DeserializeOwned>(&self) -> Result<D, LevelError> {
        serde_json::from_value(self.data.clone()).map_err(|source| LevelError::InvalidPayload {
            id: self.id.clone(),
            kind: self.kind.clone(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDocument {
    /// Filled from the source key when empty.
    #[serde(default)]
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub player_start: PlayerStart,
    #[serde(default)]
    pub cells: Vec<CellOverride>,
    #[serde(default)]
    pub entities: Vec<EntityDef>,
}

impl LevelDocument {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            player_start: PlayerStart::default(),
            cells: Vec::new(),
            entities: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Structural checks independent of the entity catalog.
    pub fn validate(&self) -> Result<(), LevelError> {
        let mut seen = HashSet::new();
        for def in &self.entities {
            if !seen.insert(def.id.as_str()) {
                return Err(LevelError::DuplicateId {
                    level: self.name.clone(),
                    id: def.id.clone(),
                });
            }
            def.gate()?;
        }
        Ok(())
    }

    pub fn player_start_cell(&self) -> CellCoord {
        CellCoord::new(self.player_start.x, self.player_start.y)
    }

    /// A fresh grid with the document's cells applied.
    pub fn build_grid(&self, cell_size: f64) -> Grid {
        let mut grid = Grid::new(self.width, self.height, cell_size);
        grid.apply_overrides(&self.cells);
        grid
    }

    pub fn entity(&self, id: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|def| def.id == id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
