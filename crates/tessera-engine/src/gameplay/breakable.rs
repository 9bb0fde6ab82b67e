//! Breakable scenery: crates and pots that block their cell until shot apart,
//! then scatter coins according to their rarity.

use serde::{Deserialize, Serialize};
use tessera_core::collision::{Collision, CollisionBox, Contact};
use tessera_core::component::{Component, ComponentKind};
use tessera_core::context::TickContext;
use tessera_core::entity::Entity;
use tessera_core::grid::CellCoord;
use tessera_core::transform::Transform;
use tessera_state::world_state::WorldStateStore;
use tracing::{debug, info};

use super::pickup::Pickup;
use super::projectile::PROJECTILE_DAMAGE;
use super::{cell_center, Health, BREAKABLE_TAG, PLAYER_PROJECTILE_TAG};
use crate::level::EntityDef;
use crate::loader::{Blueprint, SpawnContext};
use crate::movement::{GridAnchor, CELL_BLOCKER_TAG};

pub const DEFAULT_BREAKABLE_HEALTH: i32 = 30;

/// Loot tier of a breakable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Nothing,
    Rare,
    #[default]
    Epic,
    Mythic,
    Legendary,
}

impl Rarity {
    /// Coins dropped when broken.
    pub fn coin_drop(self) -> u32 {
        match self {
            Rarity::Nothing => 0,
            Rarity::Rare => 1,
            Rarity::Epic => 2,
            Rarity::Mythic => 5,
            Rarity::Legendary => 15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Breakable {
    pub rarity: Rarity,
    store: WorldStateStore,
}

impl Breakable {
    pub fn new(rarity: Rarity, store: WorldStateStore) -> Self {
        Self { rarity, store }
    }

    /// Queue this breakable's coins around `at`.
    fn scatter_coins(&self, owner: &Entity, at: Transform, ctx: &mut TickContext<'_>) -> u32 {
        let count = self.rarity.coin_drop();
        let size = ctx.grid.cell_size();
        let spread = size / 4.0;
        for i in 0..count {
            let angle = std::f64::consts::TAU * f64::from(i) / f64::from(count);
            let spot = Transform::new(at.x + spread * angle.cos(), at.y + spread * angle.sin());
            ctx.commands.spawn(Pickup::coin(
                format!("{}_coin{i}", owner.name()),
                spot,
                1,
                size / 4.0,
                self.store.clone(),
            ));
        }
        count
    }
}

impl Component for Breakable {}

fn on_projectile_hit(owner: &mut Entity, other: &Contact, ctx: &mut TickContext<'_>) {
    if !other.has_tag(PLAYER_PROJECTILE_TAG) {
        return;
    }
    let Some(health) = owner.get_mut::<Health>() else { return };
    let killed = health.damage(PROJECTILE_DAMAGE);
    let remaining = health.current();
    if !killed {
        debug!(breakable = owner.name(), health = remaining, "breakable hit");
        return;
    }
    let at = owner.get::<Transform>().copied().unwrap_or_default();
    let coins = owner
        .get::<Breakable>()
        .map_or(0, |breakable| breakable.scatter_coins(owner, at, ctx));
    info!(breakable = owner.name(), coins, "breakable broken");
    owner.destroy();
}

// ---------------------------------------------------------------------------
// Level data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BreakableData {
    pub col: i32,
    pub row: i32,
    #[serde(default = "default_health")]
    pub health: i32,
    #[serde(default)]
    pub rarity: Rarity,
}

fn default_health() -> i32 {
    DEFAULT_BREAKABLE_HEALTH
}

pub(crate) fn blueprint() -> Blueprint<BreakableData> {
    Blueprint::new(build)
}

fn build(def: &EntityDef, data: BreakableData, ctx: &SpawnContext) -> Vec<Entity> {
    let size = ctx.cell_size;
    let mut entity = Entity::new(def.id.clone(), def.kind.clone()).with_tags([BREAKABLE_TAG, CELL_BLOCKER_TAG]);
    entity.add(cell_center(size, CellCoord::new(data.col, data.row)));
    entity.add(GridAnchor);
    entity.add(Health::new(data.health));
    entity.add(Breakable::new(data.rarity, ctx.store.clone()));
    entity.add(Collision::new(CollisionBox::centered(size, size), [PLAYER_PROJECTILE_TAG]).on_hit(on_projectile_hit));
    entity.set_update_order(&[ComponentKind::of::<GridAnchor>()]);
    vec![entity]
}
