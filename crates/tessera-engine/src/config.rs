//! Engine configuration.
//!
//! Both structs deserialize from camelCase JSON with every field optional, so
//! a config file only needs the values it overrides.
//!
//! ```
//! use tessera_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "cellSize": 32, "tick": { "fixedDt": 0.02 } }"#).unwrap();
//! assert_eq!(config.cell_size, 32.0);
//! assert_eq!(config.tick.fixed_dt, 0.02);
//! assert_eq!(config.starting_level, "dungeon1");
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_core::grid::DEFAULT_CELL_SIZE;
use tessera_state::world_state::{DEFAULT_PLAYER_HEALTH, DEFAULT_STARTING_LEVEL};

use crate::EngineError;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Configuration for the fixed-timestep simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TickConfig {
    /// Fixed time step in seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
    /// Headless mode: no presentation layer, tick as fast as possible.
    pub headless: bool,
}

impl Default for TickConfig {
    /// Defaults to 60 Hz (1/60 second per tick), headless off.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            headless: false,
        }
    }
}

impl TickConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.fixed_dt > 0.0 && self.fixed_dt.is_finite() {
            Ok(())
        } else {
            Err(EngineError::Config(format!(
                "fixed_dt must be positive and finite, got {}",
                self.fixed_dt
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub tick: TickConfig,
    /// Edge length of a grid cell in world units.
    pub cell_size: f64,
    /// Level entered when the world state names none.
    pub starting_level: String,
    /// Health restored on a reload without an entry snapshot.
    pub default_player_health: i32,
    /// Journal destruction of level-defined entities.
    pub track_destructions: bool,
    /// Player walking speed in world units per second.
    pub player_speed: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            cell_size: DEFAULT_CELL_SIZE,
            starting_level: DEFAULT_STARTING_LEVEL.to_owned(),
            default_player_health: DEFAULT_PLAYER_HEALTH,
            track_destructions: true,
            player_speed: 240.0,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.tick.validate()?;
        if !(self.cell_size > 0.0 && self.cell_size.is_finite()) {
            return Err(EngineError::Config(format!(
                "cell_size must be positive and finite, got {}",
                self.cell_size
            )));
        }
        if self.starting_level.is_empty() {
            return Err(EngineError::Config("starting_level must not be empty".to_owned()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick.fixed_dt, 1.0 / 60.0);
        assert_eq!(config.default_player_health, 100);
        assert!(config.track_destructions);
    }

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn rejects_bad_timestep() {
        let err = EngineConfig::from_json_str(r#"{ "tick": { "fixedDt": 0 } }"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)), "{err}");
    }

    #[test]
    fn rejects_bad_cell_size() {
        let err = EngineConfig::from_json_str(r#"{ "cellSize": -4 }"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)), "{err}");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = EngineConfig::from_path("/nonexistent/tessera/config.json").unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }), "{err}");
    }
}
