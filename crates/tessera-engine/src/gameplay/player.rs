//! The player entity.
//!
//! Input arrives through [`PlayerInput`]: a desired direction and a fire
//! request, both set by whatever drives the session (a controller, a replay,
//! a test). Movement itself goes through [`GridMover`], so the player obeys the
//! same layer rules as everything else. Touching an `enemy` costs health, at
//! most once per [`HURT_COOLDOWN_MS`]. After moving, [`PlayerBeacon`] publishes
//! the player's cell to a [`PlayerLocator`].

use tessera_core::collision::{Collision, CollisionBox, Contact};
use tessera_core::component::{Component, ComponentKind};
use tessera_core::context::TickContext;
use tessera_core::entity::Entity;
use tessera_core::grid::CellCoord;
use tessera_core::transform::{GridPosition, Transform, Velocity};
use tracing::{debug, info};

use super::projectile::{Projectile, PROJECTILE_SPEED};
use super::{cell_center, Health, PlayerLocator, ENEMY_TAG, PLAYER_NAME, PLAYER_TAG};
use crate::movement::GridMover;

pub const FIRE_COOLDOWN_MS: f64 = 250.0;
pub const HURT_COOLDOWN_MS: f64 = 1000.0;
pub const CONTACT_DAMAGE: i32 = 10;

// ---------------------------------------------------------------------------
// PlayerInput
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PlayerInput {
    direction: (f64, f64),
    facing: (f64, f64),
    speed: f64,
    fire_requested: bool,
    since_fire_ms: f64,
    shots: u64,
}

impl PlayerInput {
    pub fn new(speed: f64) -> Self {
        Self {
            direction: (0.0, 0.0),
            facing: (0.0, 1.0),
            speed,
            fire_requested: false,
            since_fire_ms: FIRE_COOLDOWN_MS,
            shots: 0,
        }
    }

    /// Walk toward `(dx, dy)`; the vector is normalized. `(0, 0)` stops.
    pub fn set_direction(&mut self, dx: f64, dy: f64) {
        self.direction = normalize(dx, dy).unwrap_or((0.0, 0.0));
    }

    pub fn direction(&self) -> (f64, f64) {
        self.direction
    }

    pub fn facing(&self) -> (f64, f64) {
        self.facing
    }

    /// Shoot along the facing direction on the next update, if not cooling down.
    pub fn fire(&mut self) {
        self.fire_requested = true;
    }

    pub fn shots(&self) -> u64 {
        self.shots
    }
}

fn normalize(dx: f64, dy: f64) -> Option<(f64, f64)> {
    let length = dx.hypot(dy);
    (length > f64::EPSILON).then(|| (dx / length, dy / length))
}

impl Component for PlayerInput {
    fn update(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        let (dx, dy) = self.direction;
        if dx != 0.0 || dy != 0.0 {
            self.facing = self.direction;
        }
        if let Some(velocity) = owner.get_mut::<Velocity>() {
            *velocity = Velocity::new(dx * self.speed, dy * self.speed);
        }

        self.since_fire_ms += ctx.dt_ms();
        if !std::mem::take(&mut self.fire_requested) {
            return;
        }
        if self.since_fire_ms < FIRE_COOLDOWN_MS {
            debug!("fire request dropped during cooldown");
            return;
        }
        let Some(origin) = owner.get::<Transform>().copied() else {
            return;
        };
        let reach = ctx.grid.cell_size() / 2.0;
        let (fx, fy) = self.facing;
        let from = Transform::new(origin.x + fx * reach, origin.y + fy * reach);
        let velocity = Velocity::new(fx * PROJECTILE_SPEED, fy * PROJECTILE_SPEED);
        ctx.commands
            .spawn(Projectile::spawn(format!("player_projectile{}", self.shots), from, velocity));
        self.shots += 1;
        self.since_fire_ms = 0.0;
    }
}

// ---------------------------------------------------------------------------
// PlayerBeacon
// ---------------------------------------------------------------------------

/// Writes the owner's registered cell into a [`PlayerLocator`] every update
/// and clears it when the owner goes away.
#[derive(Debug, Clone)]
pub struct PlayerBeacon(PlayerLocator);

impl PlayerBeacon {
    pub fn new(locator: PlayerLocator) -> Self {
        Self(locator)
    }
}

impl Component for PlayerBeacon {
    fn update(&mut self, owner: &mut Entity, _ctx: &mut TickContext<'_>) {
        self.0.set(owner.get::<GridPosition>().and_then(|p| p.cell));
    }

    fn on_destroy(&mut self, _owner: &mut Entity, _ctx: &mut TickContext<'_>) {
        self.0.set(None);
    }
}

// ---------------------------------------------------------------------------
// Player entity
// ---------------------------------------------------------------------------

/// Build the player standing on `cell`, reporting its position to `locator`.
pub fn spawn_player(cell: CellCoord, cell_size: f64, health: Health, speed: f64, locator: PlayerLocator) -> Entity {
    let mut player = Entity::new(PLAYER_NAME, "player").with_tag(PLAYER_TAG);
    player.add(cell_center(cell_size, cell));
    player.add(Velocity::default());
    player.add(GridPosition::default());
    player.add(PlayerInput::new(speed));
    player.add(GridMover::new());
    player.add(PlayerBeacon::new(locator));
    player.add(health);

    let mut last_hurt: Option<u64> = None;
    let size = cell_size / 2.0;
    player.add(Collision::new(CollisionBox::centered(size, size), [ENEMY_TAG]).on_hit(
        move |owner: &mut Entity, other: &Contact, ctx: &mut TickContext<'_>| {
            if !other.has_tag(ENEMY_TAG) {
                return;
            }
            let ready = last_hurt
                .map_or(true, |tick| ctx.tick.saturating_sub(tick) as f64 * ctx.dt_ms() >= HURT_COOLDOWN_MS);
            if !ready {
                return;
            }
            last_hurt = Some(ctx.tick);
            if let Some(health) = owner.get_mut::<Health>() {
                if health.damage(CONTACT_DAMAGE) {
                    info!(by = %other.name, "player died");
                } else {
                    debug!(by = %other.name, health = health.current(), "player hurt");
                }
            }
        },
    ));

    player.set_update_order(&[
        ComponentKind::of::<PlayerInput>(),
        ComponentKind::of::<GridMover>(),
        ComponentKind::of::<PlayerBeacon>(),
    ]);
    player
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TickConfig;
    use crate::tick::Simulation;
    use tessera_core::grid::{CellPatch, CellProperty, Grid};

    fn sim_with_player(grid: Grid, cell: CellCoord) -> Simulation {
        let size = grid.cell_size();
        let mut sim = Simulation::new(grid, TickConfig::default());
        sim.registry_mut()
            .add(spawn_player(cell, size, Health::new(100), 240.0, PlayerLocator::new()));
        sim.tick();
        sim
    }

    fn input(sim: &mut Simulation) -> &mut PlayerInput {
        sim.registry_mut()
            .find_by_name_mut(PLAYER_NAME)
            .and_then(|p| p.get_mut::<PlayerInput>())
            .unwrap()
    }

    fn player_cell(sim: &Simulation) -> Option<CellCoord> {
        sim.registry().find_by_name(PLAYER_NAME)?.get::<GridPosition>()?.cell
    }

    #[test]
    fn walks_and_stops() {
        let mut sim = sim_with_player(Grid::new(10, 10, 64.0), CellCoord::new(1, 1));
        assert_eq!(player_cell(&sim), Some(CellCoord::new(1, 1)));

        input(&mut sim).set_direction(1.0, 0.0);
        sim.run_ticks(32); // 128 units at 4 per tick
        input(&mut sim).set_direction(0.0, 0.0);
        sim.run_ticks(5);
        assert_eq!(player_cell(&sim), Some(CellCoord::new(3, 1)));
    }

    #[test]
    fn cannot_walk_into_water() {
        let mut grid = Grid::new(6, 3, 64.0);
        for row in 0..3 {
            grid.set_cell(3, row, CellPatch::default().properties([CellProperty::Water]));
        }
        let mut sim = sim_with_player(grid, CellCoord::new(1, 1));
        input(&mut sim).set_direction(1.0, 0.0);
        sim.run_ticks(120);
        assert_eq!(player_cell(&sim), Some(CellCoord::new(2, 1)));
    }

    #[test]
    fn locator_follows_the_player_until_destroyed() {
        let locator = PlayerLocator::new();
        let mut sim = Simulation::new(Grid::new(10, 10, 64.0), TickConfig::default());
        sim.registry_mut()
            .add(spawn_player(CellCoord::new(1, 1), 64.0, Health::new(100), 240.0, locator.clone()));
        assert_eq!(locator.cell(), None, "published on the first update");
        sim.tick();
        assert_eq!(locator.cell(), Some(CellCoord::new(1, 1)));

        input(&mut sim).set_direction(0.0, 1.0);
        sim.run_ticks(32);
        assert_eq!(locator.cell(), player_cell(&sim));
        assert_eq!(locator.cell(), Some(CellCoord::new(1, 3)));

        sim.registry_mut().find_by_name_mut(PLAYER_NAME).unwrap().destroy();
        sim.tick();
        assert!(sim.registry().find_by_name(PLAYER_NAME).is_none());
        assert_eq!(locator.cell(), None);
    }

    #[test]
    fn fire_spawns_projectile_with_cooldown() {
        let mut sim = sim_with_player(Grid::new(10, 10, 64.0), CellCoord::new(1, 1));
        input(&mut sim).fire();
        sim.tick();
        input(&mut sim).fire();
        sim.tick();
        assert_eq!(sim.registry().get_by_kind("projectile").len(), 1);
        assert_eq!(input(&mut sim).shots(), 1);
    }
}
