//! Position data shared by movement, collision and rendering collaborators.

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::grid::CellCoord;

/// World-space position of an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
}

impl Transform {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Component for Transform {}

/// World-space velocity in units per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub dx: f64,
    pub dy: f64,
}

impl Velocity {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }
}

impl Component for Velocity {}

/// The entity's last reported grid position.
///
/// `cell` is the one cell whose occupant set holds the entity; `None` means
/// the entity is not grid-tracked (collision falls back to a full scan).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPosition {
    pub cell: Option<CellCoord>,
    pub previous: Option<CellCoord>,
    pub layer: i32,
}

impl GridPosition {
    pub fn at(cell: CellCoord, layer: i32) -> Self {
        Self {
            cell: Some(cell),
            previous: None,
            layer,
        }
    }

    /// Record a move to `cell`, remembering where the entity came from.
    pub fn move_to(&mut self, cell: CellCoord, layer: i32) {
        self.previous = self.cell;
        self.cell = Some(cell);
        self.layer = layer;
    }
}

impl Component for GridPosition {}
