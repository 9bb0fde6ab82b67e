//! Coins dropped by breakables.
//!
//! A pickup cannot be collected during its first [`COLLECT_DELAY_MS`] and
//! vanishes after [`COIN_LIFETIME_MS`]. Like projectiles, pickups stay out of
//! the grid.

use tessera_core::collision::{Collision, CollisionBox, Contact};
use tessera_core::component::{Component, ComponentKind};
use tessera_core::context::TickContext;
use tessera_core::entity::Entity;
use tessera_core::transform::Transform;
use tessera_state::world_state::WorldStateStore;
use tracing::{debug, trace};

use super::PLAYER_TAG;

pub const COIN_LIFETIME_MS: f64 = 8000.0;
pub const COLLECT_DELAY_MS: f64 = 500.0;

#[derive(Debug, Clone)]
pub struct Pickup {
    pub value: u32,
    age_ms: f64,
    collect_delay_ms: f64,
    lifetime_ms: f64,
    store: WorldStateStore,
}

impl Pickup {
    pub fn new(value: u32, store: WorldStateStore) -> Self {
        Self {
            value,
            age_ms: 0.0,
            collect_delay_ms: COLLECT_DELAY_MS,
            lifetime_ms: COIN_LIFETIME_MS,
            store,
        }
    }

    pub fn age_ms(&self) -> f64 {
        self.age_ms
    }

    pub fn is_collectable(&self) -> bool {
        self.age_ms >= self.collect_delay_ms
    }

    /// A coin worth `value` lying at `at`.
    pub fn coin(name: impl Into<String>, at: Transform, value: u32, size: f64, store: WorldStateStore) -> Entity {
        let mut entity = Entity::new(name, "coin");
        entity.add(at);
        entity.add(Pickup::new(value, store));
        entity.add(Collision::new(CollisionBox::centered(size, size), [PLAYER_TAG]).on_hit(
            |owner: &mut Entity, other: &Contact, _ctx: &mut TickContext<'_>| {
                if !other.has_tag(PLAYER_TAG) || owner.is_destroyed() {
                    return;
                }
                let Some(pickup) = owner.get::<Pickup>() else { return };
                if !pickup.is_collectable() {
                    return;
                }
                let total = pickup.store.add_coins(pickup.value);
                debug!(coin = owner.name(), value = pickup.value, total, "coin collected");
                owner.destroy();
            },
        ));
        entity.set_update_order(&[ComponentKind::of::<Pickup>()]);
        entity
    }
}

impl Component for Pickup {
    fn update(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        self.age_ms += ctx.dt_ms();
        if self.age_ms >= self.lifetime_ms {
            trace!(coin = owner.name(), "coin expired");
            owner.destroy();
        }
    }
}
