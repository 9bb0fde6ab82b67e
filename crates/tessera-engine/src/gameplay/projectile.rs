use tessera_core::collision::{Collision, CollisionBox, Contact};
use tessera_core::component::{Component, ComponentKind};
use tessera_core::context::TickContext;
use tessera_core::entity::Entity;
use tessera_core::transform::{Transform, Velocity};
use tracing::trace;

use super::PLAYER_PROJECTILE_TAG;

pub const PROJECTILE_SPEED: f64 = 480.0;
pub const PROJECTILE_LIFETIME_MS: f64 = 1500.0;
/// Health a player shot takes from whatever it hits.
pub const PROJECTILE_DAMAGE: i32 = 10;
const PROJECTILE_SIZE: f64 = 12.0;

/// A shot that flies in a straight line and is gone on its first hit.
///
/// Projectiles are not registered in the grid; the collision system checks
/// them against every collidable.
#[derive(Debug, Clone)]
pub struct Projectile {
    pub age_ms: f64,
    pub lifetime_ms: f64,
}

impl Projectile {
    pub fn new(lifetime_ms: f64) -> Self {
        Self {
            age_ms: 0.0,
            lifetime_ms,
        }
    }

    /// A player shot at `from` travelling along `velocity`.
    pub fn spawn(name: impl Into<String>, from: Transform, velocity: Velocity) -> Entity {
        let mut entity = Entity::new(name, "projectile").with_tag(PLAYER_PROJECTILE_TAG);
        entity.add(from);
        entity.add(velocity);
        entity.add(Projectile::new(PROJECTILE_LIFETIME_MS));
        entity.add(
            Collision::new(CollisionBox::centered(PROJECTILE_SIZE, PROJECTILE_SIZE), Vec::<String>::new()).on_hit(
                |owner: &mut Entity, other: &Contact, _ctx: &mut TickContext<'_>| {
                    trace!(projectile = owner.name(), target = %other.name, "projectile hit");
                    owner.destroy();
                },
            ),
        );
        entity.set_update_order(&[ComponentKind::of::<Projectile>()]);
        entity
    }
}

impl Component for Projectile {
    fn update(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        self.age_ms += ctx.dt_ms();
        let velocity = owner.get::<Velocity>().copied().unwrap_or_default();
        let Some(transform) = owner.get_mut::<Transform>() else {
            owner.destroy();
            return;
        };
        transform.x += velocity.dx * ctx.dt;
        transform.y += velocity.dy * ctx.dt;

        let cell = ctx.grid.world_to_cell(transform.x, transform.y);
        let outside = !ctx.grid.in_bounds(cell.col, cell.row) || ctx.grid.is_wall(cell.col, cell.row);
        if outside || self.age_ms >= self.lifetime_ms {
            owner.destroy();
        }
    }
}
