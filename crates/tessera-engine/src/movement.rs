//! Layer-aware grid movement.
//!
//! [`can_move`] decides whether an entity standing in one cell may enter a
//! neighbouring cell. The rules, in order:
//!
//! 1. Both cells must exist, and the target must hold no `cell_blocker`.
//! 2. Transition (stairs) to transition is always allowed.
//! 3. Climbing to a higher layer needs a transition on one side.
//! 4. Walls block, unless leaving a transition toward one.
//! 5. Water and blocked cells block.
//! 6. From a transition: walls block, other cells within one layer are fine.
//! 7. Into a transition: allowed from anywhere.
//! 8. Otherwise the layers must match, and a diagonal step may not cut past a
//!    corner on another layer.
//!
//! [`GridMover`] moves an entity by its [`Velocity`], sliding along one axis
//! when the full step is rejected, and keeps its single-cell occupancy and
//! reported layer in step with the cell it stands in. [`GridAnchor`] registers
//! a static entity in its cell.

use tessera_core::component::Component;
use tessera_core::context::TickContext;
use tessera_core::entity::Entity;
use tessera_core::grid::{CellCoord, CellProperty, Grid};
use tessera_core::transform::{GridPosition, Transform, Velocity};
use tracing::{debug, trace};

/// Occupants carrying this tag make their cell impassable.
pub const CELL_BLOCKER_TAG: &str = "cell_blocker";

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

pub fn can_move(grid: &Grid, from: CellCoord, to: CellCoord) -> bool {
    let (Some(from_cell), Some(to_cell)) = (grid.get_cell(from.col, from.row), grid.get_cell(to.col, to.row))
    else {
        return false;
    };

    if grid.has_occupant_tagged(to.col, to.row, CELL_BLOCKER_TAG) {
        return false;
    }

    let from_stairs = from_cell.is_transition();
    let to_stairs = to_cell.is_transition();
    if from_stairs && to_stairs {
        return true;
    }

    if to_cell.layer > from_cell.layer && !from_stairs && !to_stairs {
        return false;
    }
    if to_cell.is_wall() && !from_stairs {
        return false;
    }
    if to_cell.has(CellProperty::Water) || to_cell.has(CellProperty::Blocked) {
        return false;
    }

    if from_stairs {
        if to_cell.is_wall() {
            return false;
        }
        return (to_cell.layer - from_cell.layer).abs() <= 1;
    }
    if to_stairs {
        return true;
    }

    if to_cell.layer != from_cell.layer {
        return false;
    }
    if from.col != to.col && from.row != to.row {
        let corners = [CellCoord::new(to.col, from.row), CellCoord::new(from.col, to.row)];
        for corner in corners {
            if let Some(cell) = grid.get_cell(corner.col, corner.row) {
                if cell.layer != from_cell.layer && !cell.is_transition() {
                    return false;
                }
            }
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Occupancy helpers
// ---------------------------------------------------------------------------

/// Register `owner` in the cell under its transform and record the cell as
/// its grid position. Leaves the entity untracked outside the grid.
fn settle(owner: &mut Entity, grid: &mut Grid) -> Option<CellCoord> {
    let transform = *owner.get::<Transform>()?;
    let cell = grid.world_to_cell(transform.x, transform.y);
    if !grid.add_occupant(cell.col, cell.row, owner) {
        debug!(entity = owner.name(), %cell, "spawned outside the grid; not tracked");
        return None;
    }
    let layer = grid.layer(cell.col, cell.row).unwrap_or(0);
    match owner.get_mut::<GridPosition>() {
        Some(position) => *position = GridPosition::at(cell, layer),
        None => {
            owner.add(GridPosition::at(cell, layer));
        }
    }
    Some(cell)
}

fn withdraw(owner: &mut Entity, grid: &mut Grid) {
    let (Some(handle), Some(cell)) = (owner.handle(), owner.get::<GridPosition>().and_then(|p| p.cell)) else {
        return;
    };
    grid.remove_occupant(cell.col, cell.row, handle);
    if let Some(position) = owner.get_mut::<GridPosition>() {
        position.previous = position.cell.take();
    }
}

/// Put `owner` on the centre of `cell` without consulting [`can_move`],
/// moving its occupancy along. Returns `false` for a cell outside the grid or
/// an entity without a handle.
pub fn teleport(owner: &mut Entity, grid: &mut Grid, cell: CellCoord) -> bool {
    if !grid.in_bounds(cell.col, cell.row) || owner.handle().is_none() {
        return false;
    }
    withdraw(owner, grid);
    let (x, y) = grid.cell_center(cell.col, cell.row);
    match owner.get_mut::<Transform>() {
        Some(transform) => *transform = Transform::new(x, y),
        None => {
            owner.add(Transform::new(x, y));
        }
    }
    settle(owner, grid).is_some()
}

// ---------------------------------------------------------------------------
// GridMover
// ---------------------------------------------------------------------------

/// Velocity-driven movement constrained by [`can_move`].
#[derive(Debug, Clone, Default)]
pub struct GridMover {
    /// Steps rejected since the entity last moved.
    pub blocked_steps: u32,
}

impl GridMover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try `(dx, dy)`, then each axis alone.
    fn step(&mut self, owner: &mut Entity, grid: &mut Grid, current: CellCoord, dx: f64, dy: f64) -> CellCoord {
        let Some(transform) = owner.get::<Transform>().copied() else {
            return current;
        };
        let attempts = [(dx, dy), (dx, 0.0), (0.0, dy)];
        for (mx, my) in attempts {
            if mx == 0.0 && my == 0.0 {
                continue;
            }
            let next = Transform::new(transform.x + mx, transform.y + my);
            let cell = grid.world_to_cell(next.x, next.y);
            if cell != current && !can_move(grid, current, cell) {
                continue;
            }
            if let Some(t) = owner.get_mut::<Transform>() {
                *t = next;
            }
            if cell != current {
                self.enter(owner, grid, current, cell);
            }
            self.blocked_steps = 0;
            return cell;
        }
        self.blocked_steps += 1;
        current
    }

    fn enter(&self, owner: &mut Entity, grid: &mut Grid, from: CellCoord, to: CellCoord) {
        let Some(handle) = owner.handle() else { return };
        grid.remove_occupant(from.col, from.row, handle);
        grid.add_occupant(to.col, to.row, owner);
        let layer = grid.layer(to.col, to.row).unwrap_or(0);
        if let Some(position) = owner.get_mut::<GridPosition>() {
            position.move_to(to, layer);
        }
        trace!(entity = owner.name(), %from, %to, layer, "entered cell");
    }
}

impl Component for GridMover {
    fn update(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        let current = match owner.get::<GridPosition>().and_then(|p| p.cell) {
            Some(cell) => cell,
            None => match settle(owner, ctx.grid) {
                Some(cell) => cell,
                None => return,
            },
        };
        let Some(velocity) = owner.get::<Velocity>().copied() else { return };
        if velocity.is_zero() {
            return;
        }

        // Sub-step so no single step crosses more than half a cell.
        let (dx, dy) = (velocity.dx * ctx.dt, velocity.dy * ctx.dt);
        let limit = ctx.grid.cell_size() / 2.0;
        let steps = (dx.abs().max(dy.abs()) / limit).ceil().max(1.0) as u32;
        let mut cell = current;
        for _ in 0..steps {
            cell = self.step(owner, ctx.grid, cell, dx / steps as f64, dy / steps as f64);
        }
    }

    fn on_destroy(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        withdraw(owner, ctx.grid);
    }
}

// ---------------------------------------------------------------------------
// GridAnchor
// ---------------------------------------------------------------------------

/// Static occupancy for an entity that never moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridAnchor;

impl Component for GridAnchor {
    fn update(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        if owner.get::<GridPosition>().and_then(|p| p.cell).is_none() {
            settle(owner, ctx.grid);
        }
    }

    fn on_destroy(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        withdraw(owner, ctx.grid);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use tessera_core::prelude::*;

    // -- helpers ------------------------------------------------------------

    fn patch(layer: i32, properties: &[CellProperty]) -> CellPatch {
        CellPatch::default().layer(layer).properties(properties.iter().copied())
    }

    fn tracked(grid: &mut Grid, registry: &mut EntityRegistry, name: &str, col: i32, row: i32, tags: &[&str]) -> EntityId {
        let (x, y) = grid.cell_center(col, row);
        let mut entity = Entity::new(name, "test").with_tags(tags.iter().copied());
        entity.add(Transform::new(x, y));
        entity.add(GridAnchor);
        let id = registry.add(entity);
        let events = EventBus::new();
        let commands = CommandBuffer::new();
        let mut ctx = TickContext::new(0.0, grid, &events, &commands);
        registry.update(&mut ctx);
        id
    }

    // -- 1. Same-layer and out-of-grid moves --------------------------------

    #[test]
    fn flat_ground_and_bounds() {
        let grid = Grid::new(5, 5, 32.0);
        assert!(can_move(&grid, CellCoord::new(1, 1), CellCoord::new(2, 1)));
        assert!(can_move(&grid, CellCoord::new(1, 1), CellCoord::new(2, 2)));
        assert!(!can_move(&grid, CellCoord::new(0, 0), CellCoord::new(-1, 0)));
        assert!(!can_move(&grid, CellCoord::new(4, 4), CellCoord::new(4, 5)));
    }

    // -- 2. Layers need stairs ----------------------------------------------

    #[test]
    fn climbing_needs_stairs() {
        let mut grid = Grid::new(5, 5, 32.0);
        grid.set_cell(2, 1, patch(1, &[CellProperty::Platform]));
        grid.set_cell(2, 2, patch(1, &[CellProperty::Stairs]));

        assert!(!can_move(&grid, CellCoord::new(1, 1), CellCoord::new(2, 1)), "no climbing");
        assert!(can_move(&grid, CellCoord::new(2, 3), CellCoord::new(2, 2)), "into stairs");
        assert!(can_move(&grid, CellCoord::new(2, 2), CellCoord::new(2, 1)), "stairs to layer 1");
        assert!(can_move(&grid, CellCoord::new(2, 2), CellCoord::new(2, 3)), "stairs to layer 0");
        assert!(!can_move(&grid, CellCoord::new(2, 1), CellCoord::new(1, 1)), "no dropping off a ledge");
    }

    #[test]
    fn stairs_reach_only_adjacent_layers() {
        let mut grid = Grid::new(5, 5, 32.0);
        grid.set_cell(1, 1, patch(1, &[CellProperty::Stairs]));
        grid.set_cell(2, 1, patch(3, &[]));
        grid.set_cell(1, 2, patch(2, &[CellProperty::Stairs]));
        assert!(!can_move(&grid, CellCoord::new(1, 1), CellCoord::new(2, 1)));
        assert!(can_move(&grid, CellCoord::new(1, 1), CellCoord::new(1, 2)), "stairs to stairs");
    }

    // -- 3. Terrain flags -----------------------------------------------------

    #[test]
    fn walls_water_and_blocked() {
        let mut grid = Grid::new(5, 5, 32.0);
        grid.set_cell(2, 0, patch(0, &[CellProperty::Wall]));
        grid.set_cell(2, 1, patch(0, &[CellProperty::Water]));
        grid.set_cell(2, 2, patch(0, &[CellProperty::Blocked]));
        grid.set_cell(1, 3, patch(0, &[CellProperty::Stairs]));
        grid.set_cell(2, 3, patch(0, &[CellProperty::Wall]));

        assert!(!can_move(&grid, CellCoord::new(1, 0), CellCoord::new(2, 0)));
        assert!(!can_move(&grid, CellCoord::new(1, 1), CellCoord::new(2, 1)));
        assert!(!can_move(&grid, CellCoord::new(1, 2), CellCoord::new(2, 2)));
        assert!(!can_move(&grid, CellCoord::new(1, 3), CellCoord::new(2, 3)), "stairs into wall");
    }

    // -- 4. Corner cutting ---------------------------------------------------

    #[test]
    fn diagonal_cannot_cut_raised_corner() {
        let mut grid = Grid::new(5, 5, 32.0);
        grid.set_cell(2, 1, patch(1, &[]));
        assert!(!can_move(&grid, CellCoord::new(1, 1), CellCoord::new(2, 2)));
        assert!(can_move(&grid, CellCoord::new(1, 2), CellCoord::new(2, 3)));
    }

    // -- 5. Cell blockers ---------------------------------------------------

    #[test]
    fn cell_blocker_occupant_blocks() {
        let mut grid = Grid::new(5, 5, 32.0);
        let mut registry = EntityRegistry::new();
        tracked(&mut grid, &mut registry, "base", 2, 2, &[CELL_BLOCKER_TAG]);
        tracked(&mut grid, &mut registry, "rock", 3, 3, &["scenery"]);
        assert!(!can_move(&grid, CellCoord::new(1, 2), CellCoord::new(2, 2)));
        assert!(can_move(&grid, CellCoord::new(3, 2), CellCoord::new(3, 3)));
    }

    // -- 6. Mover slides and keeps occupancy --------------------------------

    #[test]
    fn mover_slides_along_wall() {
        let mut grid = Grid::new(6, 6, 32.0);
        for col in 0..6 {
            grid.set_cell(col, 1, patch(0, &[CellProperty::Wall]));
        }
        let events = Rc::new(EventBus::new());
        let commands = CommandBuffer::new();
        let mut registry = EntityRegistry::new();

        let (x, y) = grid.cell_center(1, 2);
        let mut entity = Entity::new("walker", "test");
        entity.add(Transform::new(x, y));
        entity.add(Velocity::new(32.0, -32.0));
        entity.add(GridMover::new());
        let id = registry.add(entity);

        for _ in 0..30 {
            let mut ctx = TickContext::new(0.1, &mut grid, &events, &commands);
            registry.update(&mut ctx);
            assert!(registry.verify_occupancy(&grid).is_ok());
        }
        let position = registry.get(id).and_then(|e| e.get::<GridPosition>()).copied().unwrap();
        let cell = position.cell.unwrap();
        assert_eq!(cell.row, 2, "never entered the wall row");
        assert!(cell.col > 1, "slid along the wall");
    }

    #[test]
    fn anchor_withdraws_on_destroy() {
        let mut grid = Grid::new(4, 4, 32.0);
        let mut registry = EntityRegistry::new();
        let id = tracked(&mut grid, &mut registry, "post", 1, 1, &[]);
        assert!(grid.is_occupied(1, 1));

        registry.get_mut(id).unwrap().destroy();
        let events = EventBus::new();
        let commands = CommandBuffer::new();
        let mut ctx = TickContext::new(0.0, &mut grid, &events, &commands);
        registry.update(&mut ctx);
        assert!(!grid.is_occupied(1, 1));
    }

    #[test]
    fn teleport_moves_occupancy() {
        let mut grid = Grid::new(4, 4, 32.0);
        grid.set_cell(3, 3, patch(2, &[]));
        let mut registry = EntityRegistry::new();
        let id = tracked(&mut grid, &mut registry, "ghost", 0, 0, &[]);

        let entity = registry.get_mut(id).unwrap();
        assert!(teleport(entity, &mut grid, CellCoord::new(3, 3)));
        assert!(!teleport(entity, &mut grid, CellCoord::new(9, 9)));
        assert_eq!(entity.get::<GridPosition>().map(|p| p.layer), Some(2));
        assert!(!grid.is_occupied(0, 0));
        assert!(registry.verify_occupancy(&grid).is_ok());
    }
}
