//! Multi-layer spatial grid with explicit occupancy.
//!
//! The grid is a row-major array of [`Cell`]s. Each cell carries an elevation
//! layer, a set of terrain [`CellProperty`] flags, an optional background
//! texture and the set of entities registered as occupying it.
//!
//! Occupancy is never inferred from positions: movement logic registers and
//! withdraws occupants explicitly through [`Grid::add_occupant`] and
//! [`Grid::remove_occupant`]. The grid remembers each occupant's tags at
//! registration time so tag lookups ([`Grid::get_entities_with_tag`]) do not
//! need the registry.
//!
//! # Example
//!
//! ```
//! use tessera_core::prelude::*;
//!
//! let mut grid = Grid::new(10, 10, 64.0);
//! let stairs = CellPatch::default()
//!     .layer(1)
//!     .properties([CellProperty::Stairs]);
//! assert!(grid.set_cell(4, 1, stairs));
//! assert!(!grid.set_cell(40, 1, CellPatch::default().layer(2)), "out of range is a no-op");
//!
//! assert_eq!(grid.world_to_cell(300.0, 100.0), CellCoord::new(4, 1));
//! assert!(grid.is_transition(4, 1));
//! assert_eq!(grid.layer(4, 1), Some(1));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entity::{Entity, EntityId};
use crate::identity::Tags;

/// Default edge length of a cell in world units.
pub const DEFAULT_CELL_SIZE: f64 = 64.0;

// ---------------------------------------------------------------------------
// CellCoord
// ---------------------------------------------------------------------------

/// A (column, row) grid address. May lie outside the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub col: i32,
    pub row: i32,
}

impl CellCoord {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    pub fn offset(self, dcol: i32, drow: i32) -> Self {
        Self::new(self.col + dcol, self.row + drow)
    }

    pub fn manhattan(self, other: CellCoord) -> u32 {
        self.col.abs_diff(other.col) + self.row.abs_diff(other.row)
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.col, self.row)
    }
}

// ---------------------------------------------------------------------------
// CellProperty
// ---------------------------------------------------------------------------

/// Terrain flags. `Stairs` marks a transition cell connecting two layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellProperty {
    Platform,
    Wall,
    Stairs,
    Path,
    Water,
    Blocked,
    Bridge,
}

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub layer: i32,
    pub properties: BTreeSet<CellProperty>,
    /// Presentation only.
    pub background_texture: Option<String>,
    occupants: BTreeSet<EntityId>,
}

impl Cell {
    pub fn has(&self, property: CellProperty) -> bool {
        self.properties.contains(&property)
    }

    pub fn is_transition(&self) -> bool {
        self.has(CellProperty::Stairs)
    }

    pub fn is_wall(&self) -> bool {
        self.has(CellProperty::Wall)
    }

    pub fn occupants(&self) -> &BTreeSet<EntityId> {
        &self.occupants
    }

    pub fn is_occupied(&self) -> bool {
        !self.occupants.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CellPatch
// ---------------------------------------------------------------------------

/// A partial cell update. `None` fields leave the cell untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellPatch {
    pub layer: Option<i32>,
    /// Replaces the whole property set when present.
    pub properties: Option<BTreeSet<CellProperty>>,
    /// `Some(None)` clears the texture.
    pub background_texture: Option<Option<String>>,
}

impl CellPatch {
    pub fn layer(mut self, layer: i32) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn properties(mut self, properties: impl IntoIterator<Item = CellProperty>) -> Self {
        self.properties = Some(properties.into_iter().collect());
        self
    }

    pub fn texture(mut self, texture: Option<String>) -> Self {
        self.background_texture = Some(texture.filter(|t| !t.is_empty()));
        self
    }
}

// ---------------------------------------------------------------------------
// CellOverride
// ---------------------------------------------------------------------------

/// A serialized cell description, as found in level documents and in the
/// world-state journal's modified-cell list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellOverride {
    pub col: i32,
    pub row: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeSet<CellProperty>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_texture: Option<String>,
}

impl CellOverride {
    pub fn coord(&self) -> CellCoord {
        CellCoord::new(self.col, self.row)
    }

    /// Patch describing the whole cell: absent layer means ground, absent
    /// properties or texture mean none.
    pub fn to_patch(&self) -> CellPatch {
        CellPatch {
            layer: Some(self.layer.unwrap_or(0)),
            properties: Some(self.properties.clone().unwrap_or_default()),
            background_texture: Some(self.background_texture.clone().filter(|t| !t.is_empty())),
        }
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct OccupantRecord {
    tags: Tags,
    cells: usize,
}

/// The spatial grid.
#[derive(Debug, Clone)]
pub struct Grid {
    width: i32,
    height: i32,
    cell_size: f64,
    cells: Vec<Cell>,
    occupants: HashMap<EntityId, OccupantRecord>,
}

impl Grid {
    /// Create a `width` x `height` grid of ground-layer cells with no
    /// properties.
    pub fn new(width: u32, height: u32, cell_size: f64) -> Self {
        debug_assert!(cell_size > 0.0, "cell size must be positive");
        let width = width.max(1) as i32;
        let height = height.max(1) as i32;
        Self {
            width,
            height,
            cell_size,
            cells: vec![Cell::default(); (width * height) as usize],
            occupants: HashMap::new(),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn in_bounds(&self, col: i32, row: i32) -> bool {
        (0..self.width).contains(&col) && (0..self.height).contains(&row)
    }

    fn index(&self, col: i32, row: i32) -> Option<usize> {
        self.in_bounds(col, row)
            .then(|| (row * self.width + col) as usize)
    }

    // -- coordinates --------------------------------------------------------

    pub fn world_to_cell(&self, x: f64, y: f64) -> CellCoord {
        CellCoord::new(
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    /// Top-left corner of the cell in world units.
    pub fn cell_to_world(&self, col: i32, row: i32) -> (f64, f64) {
        (col as f64 * self.cell_size, row as f64 * self.cell_size)
    }

    pub fn cell_center(&self, col: i32, row: i32) -> (f64, f64) {
        let (x, y) = self.cell_to_world(col, row);
        (x + self.cell_size / 2.0, y + self.cell_size / 2.0)
    }

    // -- cells --------------------------------------------------------------

    pub fn get_cell(&self, col: i32, row: i32) -> Option<&Cell> {
        self.index(col, row).map(|i| &self.cells[i])
    }

    /// Merge `patch` into the cell. Out of range is a no-op returning `false`.
    pub fn set_cell(&mut self, col: i32, row: i32, patch: CellPatch) -> bool {
        let Some(i) = self.index(col, row) else {
            debug!(col, row, "set_cell outside grid ignored");
            return false;
        };
        let cell = &mut self.cells[i];
        if let Some(layer) = patch.layer {
            cell.layer = layer;
        }
        if let Some(properties) = patch.properties {
            cell.properties = properties;
        }
        if let Some(texture) = patch.background_texture {
            cell.background_texture = texture.filter(|t| !t.is_empty());
        }
        true
    }

    /// Apply a batch of serialized cells, each describing the whole cell.
    pub fn apply_overrides<'a>(&mut self, overrides: impl IntoIterator<Item = &'a CellOverride>) {
        for cell in overrides {
            self.set_cell(cell.col, cell.row, cell.to_patch());
        }
    }

    pub fn layer(&self, col: i32, row: i32) -> Option<i32> {
        self.get_cell(col, row).map(|c| c.layer)
    }

    pub fn is_transition(&self, col: i32, row: i32) -> bool {
        self.get_cell(col, row).is_some_and(Cell::is_transition)
    }

    pub fn is_wall(&self, col: i32, row: i32) -> bool {
        self.get_cell(col, row).is_some_and(Cell::is_wall)
    }

    /// Every cell with its address, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (CellCoord, &Cell)> + '_ {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (CellCoord::new(i as i32 % width, i as i32 / width), cell))
    }

    /// The in-bounds cells of the 3x3 block centred on `center`.
    pub fn neighborhood(&self, center: CellCoord) -> impl Iterator<Item = CellCoord> + '_ {
        (-1..=1)
            .flat_map(move |drow| (-1..=1).map(move |dcol| center.offset(dcol, drow)))
            .filter(|c| self.in_bounds(c.col, c.row))
    }

    // -- occupancy ------------------------------------------------------------

    /// Register `entity` as occupying the cell.
    ///
    /// Returns `false` when the cell is out of range, the entity has no
    /// runtime handle, or it was already registered there.
    pub fn add_occupant(&mut self, col: i32, row: i32, entity: &Entity) -> bool {
        let Some(handle) = entity.handle() else {
            warn!(entity = entity.name(), "cannot register an entity without a handle");
            return false;
        };
        debug_assert!(!entity.is_destroyed(), "destroyed entity registered as occupant");
        let Some(i) = self.index(col, row) else {
            return false;
        };
        if !self.cells[i].occupants.insert(handle) {
            return false;
        }
        let record = self.occupants.entry(handle).or_insert_with(|| OccupantRecord {
            tags: Tags::new(),
            cells: 0,
        });
        record.tags = entity.tags().clone();
        record.cells += 1;
        true
    }

    /// Withdraw an occupant. Returns `false` if it was not registered there.
    pub fn remove_occupant(&mut self, col: i32, row: i32, id: EntityId) -> bool {
        let Some(i) = self.index(col, row) else {
            return false;
        };
        if !self.cells[i].occupants.remove(&id) {
            return false;
        }
        if let Some(record) = self.occupants.get_mut(&id) {
            record.cells -= 1;
            if record.cells == 0 {
                self.occupants.remove(&id);
            }
        }
        true
    }

    pub fn is_occupied(&self, col: i32, row: i32) -> bool {
        self.get_cell(col, row).is_some_and(Cell::is_occupied)
    }

    pub fn occupants(&self, col: i32, row: i32) -> impl Iterator<Item = EntityId> + '_ {
        self.get_cell(col, row)
            .into_iter()
            .flat_map(|cell| cell.occupants.iter().copied())
    }

    /// Tags an occupant was registered with.
    pub fn occupant_tags(&self, id: EntityId) -> Option<&Tags> {
        self.occupants.get(&id).map(|r| &r.tags)
    }

    pub fn has_occupant_tagged(&self, col: i32, row: i32, tag: &str) -> bool {
        self.occupants(col, row)
            .any(|id| self.occupant_tags(id).is_some_and(|tags| tags.contains(tag)))
    }

    /// Every registered occupant carrying `tag`. Scans all cells.
    pub fn get_entities_with_tag(&self, tag: &str) -> Vec<EntityId> {
        let found: BTreeSet<EntityId> = self
            .cells
            .iter()
            .flat_map(|cell| cell.occupants.iter().copied())
            .filter(|&id| self.occupant_tags(id).is_some_and(|tags| tags.contains(tag)))
            .collect();
        found.into_iter().collect()
    }

    /// Every cell `id` is registered in.
    pub fn cells_occupied_by(&self, id: EntityId) -> Vec<CellCoord> {
        if !self.occupants.contains_key(&id) {
            return Vec::new();
        }
        self.cells()
            .filter(|(_, cell)| cell.occupants.contains(&id))
            .map(|(coord, _)| coord)
            .collect()
    }

    /// Number of distinct registered occupants.
    pub fn occupant_count(&self) -> usize {
        self.occupants.len()
    }

    pub fn clear_all_occupants(&mut self) {
        for cell in &mut self.cells {
            cell.occupants.clear();
        }
        self.occupants.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(name: &str, index: u32, tags: &[&str]) -> Entity {
        let mut entity = Entity::new(name, "test").with_tags(tags.iter().copied());
        entity.assign_handle(EntityId::new(index, 0));
        entity
    }

    // -- 1. Coordinates --------------------------------------------------------

    #[test]
    fn world_to_cell_floors() {
        let grid = Grid::new(10, 10, 64.0);
        assert_eq!(grid.world_to_cell(0.0, 0.0), CellCoord::new(0, 0));
        assert_eq!(grid.world_to_cell(63.9, 64.0), CellCoord::new(0, 1));
        assert_eq!(grid.world_to_cell(-0.5, 10.0), CellCoord::new(-1, 0));
    }

    #[test]
    fn cell_to_world_is_top_left() {
        let grid = Grid::new(10, 10, 32.0);
        assert_eq!(grid.cell_to_world(2, 3), (64.0, 96.0));
        assert_eq!(grid.cell_center(2, 3), (80.0, 112.0));
    }

    // -- 2. Cell edits -----------------------------------------------------------

    #[test]
    fn set_cell_merges_only_present_fields() {
        let mut grid = Grid::new(4, 4, 64.0);
        grid.set_cell(1, 1, CellPatch::default().layer(2).texture(Some("moss".into())));
        grid.set_cell(1, 1, CellPatch::default().properties([CellProperty::Wall]));

        let cell = grid.get_cell(1, 1).unwrap();
        assert_eq!(cell.layer, 2);
        assert!(cell.is_wall());
        assert_eq!(cell.background_texture.as_deref(), Some("moss"));
    }

    #[test]
    fn out_of_range_access_is_soft() {
        let mut grid = Grid::new(4, 4, 64.0);
        assert!(grid.get_cell(4, 0).is_none());
        assert!(grid.get_cell(0, -1).is_none());
        assert!(!grid.set_cell(-1, 2, CellPatch::default().layer(1)));
        assert_eq!(grid.layer(9, 9), None);
        assert!(!grid.is_transition(9, 9));
    }

    #[test]
    fn override_without_fields_resets_cell() {
        let mut grid = Grid::new(4, 4, 64.0);
        grid.set_cell(
            2,
            2,
            CellPatch::default().layer(3).properties([CellProperty::Water]).texture(Some("t".into())),
        );
        grid.apply_overrides(&[CellOverride { col: 2, row: 2, ..Default::default() }]);

        let cell = grid.get_cell(2, 2).unwrap();
        assert_eq!(cell.layer, 0);
        assert!(cell.properties.is_empty());
        assert_eq!(cell.background_texture, None);
    }

    #[test]
    fn override_serializes_camel_case_and_omits_absent_fields() {
        let cell = CellOverride {
            col: 1,
            row: 2,
            layer: Some(1),
            properties: Some([CellProperty::Stairs].into()),
            background_texture: None,
        };
        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "col": 1, "row": 2, "layer": 1, "properties": ["stairs"] })
        );
        let back: CellOverride = serde_json::from_value(
            serde_json::json!({ "col": 0, "row": 0, "backgroundTexture": "grass" }),
        )
        .unwrap();
        assert_eq!(back.background_texture.as_deref(), Some("grass"));
    }

    // -- 3. Occupancy ------------------------------------------------------------

    #[test]
    fn occupancy_is_explicit() {
        let mut grid = Grid::new(4, 4, 64.0);
        let player = registered("player", 0, &["player"]);
        let id = player.handle().unwrap();

        assert!(grid.add_occupant(1, 2, &player));
        assert!(!grid.add_occupant(1, 2, &player), "duplicate registration");
        assert!(grid.is_occupied(1, 2));
        assert_eq!(grid.cells_occupied_by(id), vec![CellCoord::new(1, 2)]);

        assert!(grid.remove_occupant(1, 2, id));
        assert!(!grid.remove_occupant(1, 2, id));
        assert!(!grid.is_occupied(1, 2));
        assert_eq!(grid.occupant_count(), 0);
    }

    #[test]
    fn unregistered_entity_cannot_occupy() {
        let mut grid = Grid::new(4, 4, 64.0);
        let loose = Entity::new("loose", "test");
        assert!(!grid.add_occupant(0, 0, &loose));
    }

    #[test]
    fn entities_with_tag_are_deduplicated() {
        let mut grid = Grid::new(4, 4, 64.0);
        let player = registered("player", 0, &["player"]);
        let bug = registered("bug", 1, &["enemy"]);
        grid.add_occupant(0, 0, &player);
        grid.add_occupant(0, 1, &player);
        grid.add_occupant(3, 3, &bug);

        assert_eq!(grid.get_entities_with_tag("player"), vec![player.handle().unwrap()]);
        assert!(grid.has_occupant_tagged(3, 3, "enemy"));
        assert!(!grid.has_occupant_tagged(0, 0, "enemy"));
        assert!(grid.get_entities_with_tag("coin").is_empty());
    }

    #[test]
    fn neighborhood_clips_to_bounds() {
        let grid = Grid::new(4, 4, 64.0);
        assert_eq!(grid.neighborhood(CellCoord::new(0, 0)).count(), 4);
        assert_eq!(grid.neighborhood(CellCoord::new(1, 1)).count(), 9);
        assert_eq!(grid.neighborhood(CellCoord::new(3, 1)).count(), 6);
    }

    #[test]
    fn clear_all_occupants_empties_every_cell() {
        let mut grid = Grid::new(2, 2, 64.0);
        grid.add_occupant(0, 0, &registered("a", 0, &[]));
        grid.add_occupant(1, 1, &registered("b", 1, &[]));
        grid.clear_all_occupants();
        assert!(grid.cells().all(|(_, c)| !c.is_occupied()));
        assert_eq!(grid.occupant_count(), 0);
    }
}
