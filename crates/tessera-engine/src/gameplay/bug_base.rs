//! Bug bases: static enemy nests that hatch [bugs](super::bug) once the
//! player comes near or shoots them.
//!
//! A base blocks its cell and wakes when the player is within
//! [`ACTIVATION_RANGE`] or the base is hit. While awake it hatches one bug per
//! spawn interval onto a free side cell on its own layer, keeping at most
//! [`MAX_BUGS`] alive. A destroyed base is journaled by the registry; on the
//! next visit it is replaced by an inert `<id>_exhausted` husk.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tessera_core::collision::{Collision, CollisionBox, Contact};
use tessera_core::component::{Component, ComponentKind};
use tessera_core::context::TickContext;
use tessera_core::entity::Entity;
use tessera_core::grid::{CellCoord, Grid};
use tessera_core::transform::{GridPosition, Transform};
use tracing::{debug, info};

use super::bug::spawn_bug;
use super::projectile::PROJECTILE_DAMAGE;
use super::{cell_center, Health, PlayerLocator, ENEMY_TAG, PLAYER_PROJECTILE_TAG};
use crate::level::EntityDef;
use crate::loader::{Blueprint, SpawnContext};
use crate::movement::{can_move, GridAnchor, CELL_BLOCKER_TAG};

/// Distance from the player at which a dormant base wakes.
pub const ACTIVATION_RANGE: f64 = 400.0;
/// Live bugs a single base sustains.
pub const MAX_BUGS: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn base_health(self) -> i32 {
        match self {
            Difficulty::Easy => 200,
            Difficulty::Medium => 300,
            Difficulty::Hard => 400,
        }
    }

    pub fn spawn_interval_ms(self) -> f64 {
        match self {
            Difficulty::Easy => 3000.0,
            Difficulty::Medium => 2000.0,
            Difficulty::Hard => 1000.0,
        }
    }

    pub fn bug_speed(self) -> f64 {
        match self {
            Difficulty::Easy => 100.0,
            Difficulty::Medium => 150.0,
            Difficulty::Hard => 200.0,
        }
    }
}

/// Marks an entity as a bug base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BugBase {
    pub difficulty: Difficulty,
}

impl Component for BugBase {}

// ---------------------------------------------------------------------------
// BugSpawner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BugSpawner {
    interval_ms: f64,
    timer_ms: f64,
    active: bool,
    brood: Rc<Cell<usize>>,
    spawned: u32,
    bug_speed: f64,
    player: PlayerLocator,
}

impl BugSpawner {
    pub fn new(difficulty: Difficulty, player: PlayerLocator) -> Self {
        Self {
            interval_ms: difficulty.spawn_interval_ms(),
            timer_ms: 0.0,
            active: false,
            brood: Rc::new(Cell::new(0)),
            spawned: 0,
            bug_speed: difficulty.bug_speed(),
            player,
        }
    }

    pub fn activate(&mut self) {
        if !self.active {
            debug!("bug spawner activated");
        }
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Bugs from this base still alive.
    pub fn live_bugs(&self) -> usize {
        self.brood.get()
    }

    pub fn spawned(&self) -> u32 {
        self.spawned
    }

    fn player_in_range(&self, cell_size: f64, at: Transform) -> bool {
        self.player.cell().is_some_and(|cell| {
            let player = cell_center(cell_size, cell);
            (player.x - at.x).hypot(player.y - at.y) < ACTIVATION_RANGE
        })
    }

    /// Side cells (N, S, W, E) a bug may hatch onto.
    fn hatch_sites(grid: &Grid, home: CellCoord) -> Vec<CellCoord> {
        let layer = grid.layer(home.col, home.row);
        [home.offset(0, -1), home.offset(0, 1), home.offset(-1, 0), home.offset(1, 0)]
            .into_iter()
            .filter(|site| grid.layer(site.col, site.row) == layer && can_move(grid, home, *site))
            .collect()
    }
}

impl Component for BugSpawner {
    fn update(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        let (Some(home), Some(at)) = (
            owner.get::<GridPosition>().and_then(|p| p.cell),
            owner.get::<Transform>().copied(),
        ) else {
            return;
        };

        if !self.active && self.player_in_range(ctx.grid.cell_size(), at) {
            info!(base = owner.name(), "player near; bug base waking");
            self.active = true;
        }
        if !self.active || self.brood.get() >= MAX_BUGS {
            return;
        }

        self.timer_ms += ctx.dt_ms();
        if self.timer_ms < self.interval_ms {
            return;
        }
        self.timer_ms = 0.0;

        let sites = Self::hatch_sites(ctx.grid, home);
        if sites.is_empty() {
            debug!(base = owner.name(), "no free cell to hatch onto");
            return;
        }
        // Rotate through the free sides.
        let site = sites[self.spawned as usize % sites.len()];
        let name = format!("{}_bug{}", owner.name(), self.spawned);
        debug!(base = owner.name(), bug = %name, cell = %site, "bug hatched");
        ctx.commands.spawn(spawn_bug(
            name,
            site,
            ctx.grid.cell_size(),
            self.bug_speed,
            self.brood.clone(),
            self.player.clone(),
        ));
        self.spawned += 1;
    }
}

fn on_base_hit(owner: &mut Entity, other: &Contact, _ctx: &mut TickContext<'_>) {
    if !other.has_tag(PLAYER_PROJECTILE_TAG) {
        return;
    }
    if let Some(spawner) = owner.get_mut::<BugSpawner>() {
        spawner.activate();
    }
    let Some(health) = owner.get_mut::<Health>() else { return };
    if health.is_dead() {
        return;
    }
    let killed = health.damage(PROJECTILE_DAMAGE);
    let remaining = health.current();
    if killed {
        info!(base = owner.name(), "bug base destroyed");
        owner.destroy();
    } else {
        debug!(base = owner.name(), health = remaining, "bug base hit");
    }
}

/// A bug base at `cell`, woken by the player `player` tracks.
pub fn spawn_bug_base(
    name: impl Into<String>,
    cell: CellCoord,
    cell_size: f64,
    difficulty: Difficulty,
    player: PlayerLocator,
) -> Entity {
    let mut base = Entity::new(name, "bug_base").with_tags([ENEMY_TAG, CELL_BLOCKER_TAG]);
    base.add(cell_center(cell_size, cell));
    base.add(GridAnchor);
    base.add(BugBase { difficulty });
    base.add(Health::new(difficulty.base_health()));
    base.add(BugSpawner::new(difficulty, player));
    let size = cell_size * 0.75;
    base.add(Collision::new(CollisionBox::centered(size, size), [PLAYER_PROJECTILE_TAG]).on_hit(on_base_hit));
    base.set_update_order(&[ComponentKind::of::<GridAnchor>(), ComponentKind::of::<BugSpawner>()]);
    base
}

// ---------------------------------------------------------------------------
// Level data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BugBaseData {
    pub col: i32,
    pub row: i32,
    #[serde(default)]
    pub difficulty: Difficulty,
}

pub(crate) fn blueprint() -> Blueprint<BugBaseData> {
    Blueprint::new(build).with_stand_in(exhausted)
}

fn build(def: &EntityDef, data: BugBaseData, ctx: &SpawnContext) -> Vec<Entity> {
    vec![spawn_bug_base(
        def.id.clone(),
        CellCoord::new(data.col, data.row),
        ctx.cell_size,
        data.difficulty,
        ctx.player.clone(),
    )]
}

fn exhausted(def: &EntityDef, data: &BugBaseData, ctx: &SpawnContext) -> Vec<Entity> {
    let mut husk = Entity::new(format!("{}_exhausted", def.id), "bug_base_exhausted");
    husk.add(cell_center(ctx.cell_size, CellCoord::new(data.col, data.row)));
    vec![husk]
}
