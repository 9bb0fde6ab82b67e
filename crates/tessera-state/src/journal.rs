//! Per-level journal entry.
//!
//! A [`LevelJournal`] holds everything needed to reconcile one level with its
//! document on re-entry:
//!
//! - **live entities**: ids spawned by deferred creators, respawned directly.
//! - **destroyed entities**: level-defined ids that must not come back.
//! - **fired triggers**: event names raised by one-shot trigger zones.
//! - **modified cells**: cells whose terrain differs from the document.
//! - **touched cells**: cells a cell modifier wrote, recorded even when the
//!   final value equals the document's.
//!
//! An id is never both live and destroyed.
//!
//! # Example
//!
//! ```
//! use tessera_state::journal::LevelJournal;
//!
//! let mut journal = LevelJournal::default();
//! journal.add_live("ghost_door0");
//! journal.add_destroyed("ghost_door0");
//!
//! assert!(!journal.is_live("ghost_door0"));
//! assert!(journal.is_destroyed("ghost_door0"));
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tessera_core::grid::{CellCoord, CellOverride, CellProperty, Grid};
use tracing::debug;

// ---------------------------------------------------------------------------
// LevelJournal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelJournal {
    #[serde(default)]
    pub live_entities: Vec<String>,
    #[serde(default)]
    pub destroyed_entities: Vec<String>,
    #[serde(default)]
    pub fired_triggers: Vec<String>,
    #[serde(default)]
    pub modified_cells: Vec<CellOverride>,
    #[serde(default)]
    pub cell_modifier_cells: Vec<CellCoord>,
}

impl LevelJournal {
    /// Returns `false` if the id was already live.
    pub fn add_live(&mut self, id: &str) -> bool {
        push_unique(&mut self.live_entities, id)
    }

    /// Moves `id` out of the live list. Returns `false` if it was already
    /// recorded as destroyed.
    pub fn add_destroyed(&mut self, id: &str) -> bool {
        self.live_entities.retain(|live| live != id);
        push_unique(&mut self.destroyed_entities, id)
    }

    pub fn add_fired(&mut self, event: &str) -> bool {
        push_unique(&mut self.fired_triggers, event)
    }

    /// Record cells written by a cell modifier. Returns how many were new.
    pub fn mark_touched(&mut self, cells: impl IntoIterator<Item = CellCoord>) -> usize {
        let mut added = 0;
        for cell in cells {
            if !self.cell_modifier_cells.contains(&cell) {
                self.cell_modifier_cells.push(cell);
                added += 1;
            }
        }
        added
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.live_entities.iter().any(|live| live == id)
    }

    pub fn is_destroyed(&self, id: &str) -> bool {
        self.destroyed_entities.iter().any(|dead| dead == id)
    }

    pub fn has_fired(&self, event: &str) -> bool {
        self.fired_triggers.iter().any(|fired| fired == event)
    }

    pub fn is_touched(&self, cell: CellCoord) -> bool {
        self.cell_modifier_cells.contains(&cell)
    }

    /// Replace the modified-cell list with every cell of `grid` that differs
    /// from `original` or was touched by a cell modifier.
    ///
    /// Cells absent from `original` compare against ground: layer 0, no
    /// properties, no texture. Returns the number of cells recorded.
    pub fn record_modified_cells(&mut self, grid: &Grid, original: &[CellOverride]) -> usize {
        let baseline: HashMap<CellCoord, &CellOverride> =
            original.iter().map(|cell| (cell.coord(), cell)).collect();
        let touched: HashSet<CellCoord> = self.cell_modifier_cells.iter().copied().collect();

        let mut modified = Vec::new();
        for (coord, cell) in grid.cells() {
            let base = baseline.get(&coord);
            let base_layer = base.and_then(|c| c.layer).unwrap_or(0);
            let empty = BTreeSet::new();
            let base_props: &BTreeSet<CellProperty> =
                base.and_then(|c| c.properties.as_ref()).unwrap_or(&empty);
            let base_texture = base
                .and_then(|c| c.background_texture.as_deref())
                .unwrap_or("");
            let texture = cell.background_texture.as_deref().unwrap_or("");

            let changed = cell.layer != base_layer
                || &cell.properties != base_props
                || texture != base_texture;
            let was_touched = touched.contains(&coord);
            if !(changed || was_touched) {
                continue;
            }
            debug!(
                %coord,
                changed,
                touched = was_touched,
                layer = cell.layer,
                "journaling modified cell"
            );
            modified.push(CellOverride {
                col: coord.col,
                row: coord.row,
                layer: Some(cell.layer),
                properties: (!cell.properties.is_empty()).then(|| cell.properties.clone()),
                background_texture: (!texture.is_empty()).then(|| texture.to_owned()),
            });
        }
        self.modified_cells = modified;
        self.modified_cells.len()
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_owned());
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::grid::CellPatch;

    // -- helpers ------------------------------------------------------------

    fn stairs_at(col: i32, row: i32) -> CellOverride {
        CellOverride {
            col,
            row,
            layer: Some(1),
            properties: Some([CellProperty::Stairs].into_iter().collect()),
            background_texture: Some("stairs".to_owned()),
        }
    }

    fn grid_from(original: &[CellOverride]) -> Grid {
        let mut grid = Grid::new(6, 6, 32.0);
        grid.apply_overrides(original);
        grid
    }

    // -- 1. Live / destroyed exclusivity ------------------------------------

    #[test]
    fn destroyed_moves_out_of_live() {
        let mut journal = LevelJournal::default();
        assert!(journal.add_live("a"));
        assert!(!journal.add_live("a"));
        assert!(journal.add_destroyed("a"));
        assert!(!journal.add_destroyed("a"));
        assert!(journal.live_entities.is_empty());
        assert_eq!(journal.destroyed_entities, vec!["a".to_owned()]);
    }

    // -- 2. Fired triggers are deduplicated ----------------------------------

    #[test]
    fn fired_triggers_dedup() {
        let mut journal = LevelJournal::default();
        assert!(journal.add_fired("lever_pulled"));
        assert!(!journal.add_fired("lever_pulled"));
        assert!(journal.has_fired("lever_pulled"));
        assert!(!journal.has_fired("other"));
    }

    // -- 3. Unchanged grid records nothing -----------------------------------

    #[test]
    fn unchanged_grid_records_nothing() {
        let original = vec![stairs_at(2, 2)];
        let grid = grid_from(&original);
        let mut journal = LevelJournal::default();
        assert_eq!(journal.record_modified_cells(&grid, &original), 0);
    }

    // -- 4. Changed cells are recorded in full -------------------------------

    #[test]
    fn changed_cell_is_recorded() {
        let original = vec![stairs_at(2, 2)];
        let mut grid = grid_from(&original);
        grid.set_cell(3, 3, CellPatch::default().properties([CellProperty::Wall]));
        grid.set_cell(2, 2, CellPatch::default().texture(None));

        let mut journal = LevelJournal::default();
        assert_eq!(journal.record_modified_cells(&grid, &original), 2);

        let wall = journal
            .modified_cells
            .iter()
            .find(|c| c.coord() == CellCoord::new(3, 3))
            .unwrap();
        assert_eq!(wall.layer, Some(0));
        assert!(wall.properties.as_ref().unwrap().contains(&CellProperty::Wall));
        assert_eq!(wall.background_texture, None);

        let stairs = journal
            .modified_cells
            .iter()
            .find(|c| c.coord() == CellCoord::new(2, 2))
            .unwrap();
        assert_eq!(stairs.layer, Some(1));
        assert_eq!(stairs.background_texture, None);
    }

    // -- 5. Touched cells are recorded even when restored --------------------

    #[test]
    fn touched_cell_recorded_without_diff() {
        let original = vec![stairs_at(2, 2)];
        let grid = grid_from(&original);
        let mut journal = LevelJournal::default();
        assert_eq!(journal.mark_touched([CellCoord::new(2, 2), CellCoord::new(2, 2)]), 1);
        assert_eq!(journal.record_modified_cells(&grid, &original), 1);
        assert_eq!(journal.modified_cells[0], stairs_at(2, 2));
    }

    // -- 6. Recording replaces the previous list -----------------------------

    #[test]
    fn recording_replaces_previous_list() {
        let original = Vec::new();
        let mut grid = grid_from(&original);
        grid.set_cell(1, 1, CellPatch::default().layer(2));
        let mut journal = LevelJournal::default();
        journal.record_modified_cells(&grid, &original);
        assert_eq!(journal.modified_cells.len(), 1);

        grid.set_cell(1, 1, CellPatch::default().layer(0));
        journal.record_modified_cells(&grid, &original);
        assert!(journal.modified_cells.is_empty());
    }

    // -- 7. Replaying recorded cells reproduces the grid ---------------------

    #[test]
    fn recorded_cells_reproduce_terrain() {
        let original = vec![stairs_at(2, 2)];
        let mut grid = grid_from(&original);
        grid.set_cell(
            4,
            1,
            CellPatch::default()
                .layer(1)
                .properties([CellProperty::Bridge])
                .texture(Some("bridge".to_owned())),
        );
        grid.set_cell(2, 2, CellPatch::default().properties([]).layer(0));
        let mut journal = LevelJournal::default();
        journal.record_modified_cells(&grid, &original);

        let mut replay = grid_from(&original);
        replay.apply_overrides(&journal.modified_cells);
        for (coord, cell) in grid.cells() {
            let other = replay.get_cell(coord.col, coord.row).unwrap();
            assert_eq!(cell.layer, other.layer, "{coord}");
            assert_eq!(cell.properties, other.properties, "{coord}");
            assert_eq!(cell.background_texture, other.background_texture, "{coord}");
        }
    }

    // -- 8. Serialized field names -------------------------------------------

    #[test]
    fn serializes_camel_case() {
        let mut journal = LevelJournal::default();
        journal.add_live("x");
        journal.mark_touched([CellCoord::new(1, 2)]);
        let json = serde_json::to_value(&journal).unwrap();
        assert_eq!(json["liveEntities"][0], "x");
        assert_eq!(json["cellModifierCells"][0]["col"], 1);
        assert_eq!(json["cellModifierCells"][0]["row"], 2);
        assert!(json.get("destroyedEntities").is_some());
    }
}
