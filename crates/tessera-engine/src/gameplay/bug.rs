//! Bugs: small enemies hatched by a bug base that chase the player along
//! A* paths and burst on contact.

use std::cell::Cell;
use std::rc::Rc;

use tessera_core::collision::{Collision, CollisionBox, Contact};
use tessera_core::component::{Component, ComponentKind};
use tessera_core::context::TickContext;
use tessera_core::entity::Entity;
use tessera_core::grid::CellCoord;
use tessera_core::transform::{GridPosition, Transform, Velocity};
use tracing::{debug, trace};

use super::projectile::PROJECTILE_DAMAGE;
use super::{cell_center, Health, PlayerLocator, ENEMY_TAG, PLAYER_PROJECTILE_TAG, PLAYER_TAG};
use crate::movement::GridMover;
use crate::pathfinding::find_path;

pub const PATH_RECALC_INTERVAL_MS: f64 = 500.0;
pub const BUG_HEALTH: i32 = 1;

// ---------------------------------------------------------------------------
// Chaser
// ---------------------------------------------------------------------------

/// Steers the owner's [`Velocity`] along a path to the player, replanning
/// every [`PATH_RECALC_INTERVAL_MS`].
#[derive(Debug, Clone)]
pub struct Chaser {
    pub speed: f64,
    player: PlayerLocator,
    path: Vec<CellCoord>,
    index: usize,
    recalc_timer_ms: f64,
}

impl Chaser {
    pub fn new(speed: f64, player: PlayerLocator) -> Self {
        Self {
            speed,
            player,
            path: Vec::new(),
            index: 0,
            // Plan on the first update.
            recalc_timer_ms: PATH_RECALC_INTERVAL_MS,
        }
    }

    /// Cells still ahead on the current path.
    pub fn remaining(&self) -> &[CellCoord] {
        self.path.get(self.index..).unwrap_or_default()
    }

    fn stop(owner: &mut Entity) {
        if let Some(velocity) = owner.get_mut::<Velocity>() {
            *velocity = Velocity::default();
        }
    }
}

impl Component for Chaser {
    fn update(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        let Some(current) = owner.get::<GridPosition>().and_then(|p| p.cell) else {
            return;
        };

        self.recalc_timer_ms += ctx.dt_ms();
        if self.recalc_timer_ms >= PATH_RECALC_INTERVAL_MS {
            self.recalc_timer_ms = 0.0;
            self.path = self
                .player
                .cell()
                .and_then(|goal| find_path(ctx.grid, current, goal))
                .unwrap_or_default();
            self.index = 0;
            trace!(bug = owner.name(), steps = self.path.len(), "path replanned");
        }

        while self.path.get(self.index) == Some(&current) {
            self.index += 1;
        }
        let Some(&next) = self.path.get(self.index) else {
            Self::stop(owner);
            return;
        };

        let Some(at) = owner.get::<Transform>().copied() else { return };
        let target = cell_center(ctx.grid.cell_size(), next);
        let (dx, dy) = (target.x - at.x, target.y - at.y);
        let distance = dx.hypot(dy);
        if distance <= f64::EPSILON {
            Self::stop(owner);
            return;
        }
        // Never overshoot the waypoint in one tick.
        let speed = self.speed.min(distance / ctx.dt.max(f64::EPSILON));
        if let Some(velocity) = owner.get_mut::<Velocity>() {
            *velocity = Velocity::new(dx / distance * speed, dy / distance * speed);
        }
    }
}

// ---------------------------------------------------------------------------
// BroodMember
// ---------------------------------------------------------------------------

/// Ties a bug to its base's live-bug count.
#[derive(Debug, Clone)]
pub struct BroodMember(Rc<Cell<usize>>);

impl BroodMember {
    /// Joins the brood, counting the new member.
    pub fn join(brood: Rc<Cell<usize>>) -> Self {
        brood.set(brood.get() + 1);
        Self(brood)
    }
}

impl Component for BroodMember {
    fn on_destroy(&mut self, _owner: &mut Entity, _ctx: &mut TickContext<'_>) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

// ---------------------------------------------------------------------------
// Bug entity
// ---------------------------------------------------------------------------

fn on_bug_hit(owner: &mut Entity, other: &Contact, _ctx: &mut TickContext<'_>) {
    if other.has_tag(PLAYER_TAG) {
        debug!(bug = owner.name(), "bug burst on the player");
        owner.destroy();
        return;
    }
    if !other.has_tag(PLAYER_PROJECTILE_TAG) {
        return;
    }
    let killed = owner.get_mut::<Health>().is_some_and(|health| health.damage(PROJECTILE_DAMAGE));
    if killed {
        debug!(bug = owner.name(), "bug shot");
        owner.destroy();
    }
}

/// A bug standing on `cell` that hunts whoever `player` tracks, counted in
/// `brood` until destroyed.
pub fn spawn_bug(
    name: impl Into<String>,
    cell: CellCoord,
    cell_size: f64,
    speed: f64,
    brood: Rc<Cell<usize>>,
    player: PlayerLocator,
) -> Entity {
    let mut bug = Entity::new(name, "bug").with_tag(ENEMY_TAG);
    bug.add(cell_center(cell_size, cell));
    bug.add(Velocity::default());
    bug.add(GridPosition::default());
    bug.add(Health::new(BUG_HEALTH));
    bug.add(Chaser::new(speed, player));
    bug.add(GridMover::new());
    bug.add(BroodMember::join(brood));
    let size = cell_size / 2.0;
    bug.add(Collision::new(CollisionBox::centered(size, size), [PLAYER_PROJECTILE_TAG, PLAYER_TAG]).on_hit(on_bug_hit));
    bug.set_update_order(&[ComponentKind::of::<Chaser>(), ComponentKind::of::<GridMover>()]);
    bug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TickConfig;
    use crate::gameplay::{spawn_player, PLAYER_NAME};
    use crate::tick::Simulation;
    use tessera_core::grid::{CellPatch, CellProperty, Grid};

    fn player_health(sim: &Simulation) -> i32 {
        sim.registry()
            .find_by_name(PLAYER_NAME)
            .and_then(|p| p.get::<Health>())
            .map_or(0, Health::current)
    }

    #[test]
    fn chases_around_a_wall_and_bursts_on_contact() {
        let mut grid = Grid::new(8, 5, 32.0);
        for row in 0..4 {
            grid.set_cell(3, row, CellPatch::default().properties([CellProperty::Wall]));
        }
        let mut sim = Simulation::new(grid, TickConfig::default());
        let locator = PlayerLocator::new();
        sim.registry_mut()
            .add(spawn_player(CellCoord::new(6, 1), 32.0, Health::new(100), 0.0, locator.clone()));
        let brood = Rc::new(Cell::new(0));
        sim.registry_mut()
            .add(spawn_bug("bug0", CellCoord::new(1, 1), 32.0, 150.0, brood.clone(), locator));
        assert_eq!(brood.get(), 1);

        sim.run_ticks(600);
        assert!(sim.registry().find_by_name("bug0").is_none(), "reached the player");
        assert_eq!(brood.get(), 0);
        assert_eq!(player_health(&sim), 90);
        assert!(sim.registry().verify_occupancy(sim.grid()).is_ok());
    }

    #[test]
    fn idles_without_a_player() {
        let mut sim = Simulation::new(Grid::new(4, 4, 32.0), TickConfig::default());
        let brood = Rc::new(Cell::new(0));
        sim.registry_mut()
            .add(spawn_bug("bug0", CellCoord::new(1, 1), 32.0, 150.0, brood, PlayerLocator::new()));
        sim.run_ticks(60);
        let bug = sim.registry().find_by_name("bug0").unwrap();
        assert_eq!(bug.get::<GridPosition>().and_then(|p| p.cell), Some(CellCoord::new(1, 1)));
        assert!(bug.get::<Chaser>().unwrap().remaining().is_empty());
    }
}
