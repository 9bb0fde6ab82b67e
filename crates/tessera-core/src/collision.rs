//! Grid-partitioned collision detection.
//!
//! Each tick the [`CollisionSystem`] collects every live entity that carries an
//! enabled [`Collision`] with both a box and a tag list, plus a [`Transform`].
//! Entities with a known grid cell are *indexed*: their candidates are the
//! occupants of the 3x3 block of cells around them. The rest are *unindexed*
//! and are checked against every collidable.
//!
//! A pair is eligible when either side lists one of the other side's tags.
//! Eligible pairs whose boxes overlap strictly (touching edges do not count)
//! invoke **both** hit callbacks, once per pair per tick. There is no
//! debouncing; continued overlap fires again next tick.
//!
//! Detection never mutates entities; callbacks run afterwards, each with its
//! own entity borrowed mutably and a [`Contact`] describing the other side.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::component::Component;
use crate::context::TickContext;
use crate::entity::{Entity, EntityId};
use crate::grid::CellCoord;
use crate::identity::{intersects, EntityKind, Tags};
use crate::registry::EntityRegistry;
use crate::transform::{GridPosition, Transform};

// ---------------------------------------------------------------------------
// Boxes
// ---------------------------------------------------------------------------

/// Collision box relative to the entity position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionBox {
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
}

impl CollisionBox {
    pub fn new(offset_x: f64, offset_y: f64, width: f64, height: f64) -> Self {
        Self {
            offset_x,
            offset_y,
            width,
            height,
        }
    }

    /// A `width` x `height` box centred on the entity position.
    pub fn centered(width: f64, height: f64) -> Self {
        Self::new(-width / 2.0, -height / 2.0, width, height)
    }

    pub fn at(&self, transform: &Transform) -> Aabb {
        let left = transform.x + self.offset_x;
        let top = transform.y + self.offset_y;
        Aabb {
            left,
            top,
            right: left + self.width,
            bottom: top + self.height,
        }
    }
}

/// World-space axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Aabb {
    /// Strict interior overlap on both axes.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.top < other.bottom
            && self.bottom > other.top
    }
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// What a hit callback learns about the other side of a collision.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub handle: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub tags: Tags,
    pub position: Transform,
    /// Reported layer, if the other side is grid-tracked.
    pub layer: Option<i32>,
}

impl Contact {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

// ---------------------------------------------------------------------------
// Collision component
// ---------------------------------------------------------------------------

pub type HitCallback = Box<dyn FnMut(&mut Entity, &Contact, &mut TickContext<'_>)>;

/// Collision capability of an entity.
///
/// `bounds` and `collides_with` are optional so data-driven construction can
/// leave them out; such a capability is skipped by the system.
pub struct Collision {
    pub bounds: Option<CollisionBox>,
    pub collides_with: Option<Vec<String>>,
    pub enabled: bool,
    on_hit: Option<HitCallback>,
}

impl Collision {
    pub fn new<I, S>(bounds: CollisionBox, collides_with: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_parts(
            Some(bounds),
            Some(collides_with.into_iter().map(Into::into).collect()),
        )
    }

    pub fn from_parts(bounds: Option<CollisionBox>, collides_with: Option<Vec<String>>) -> Self {
        Self {
            bounds,
            collides_with,
            enabled: true,
            on_hit: None,
        }
    }

    pub fn on_hit<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut Entity, &Contact, &mut TickContext<'_>) + 'static,
    {
        self.on_hit = Some(Box::new(callback));
        self
    }

    pub fn set_on_hit<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Entity, &Contact, &mut TickContext<'_>) + 'static,
    {
        self.on_hit = Some(Box::new(callback));
    }

    /// Box and tag list, when both are present.
    fn shape(&self) -> Option<(CollisionBox, &[String])> {
        Some((self.bounds?, self.collides_with.as_deref()?))
    }

    /// Invoke the hit callback, if any.
    pub fn hit(&mut self, owner: &mut Entity, other: &Contact, ctx: &mut TickContext<'_>) {
        if let Some(callback) = self.on_hit.as_mut() {
            callback(owner, other, ctx);
        }
    }
}

impl fmt::Debug for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collision")
            .field("bounds", &self.bounds)
            .field("collides_with", &self.collides_with)
            .field("enabled", &self.enabled)
            .field("has_callback", &self.on_hit.is_some())
            .finish()
    }
}

impl Component for Collision {}

// ---------------------------------------------------------------------------
// CollisionSystem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionReport {
    pub collidables: usize,
    pub indexed: usize,
    /// Candidate pairs tested for eligibility and overlap.
    pub checks: usize,
    /// Overlapping eligible pairs; each fired two callbacks.
    pub hits: usize,
}

struct Collidable {
    contact: Contact,
    aabb: Aabb,
    wants: Vec<String>,
    cell: Option<CellCoord>,
}

/// Per-tick collision pass over an [`EntityRegistry`].
#[derive(Debug, Default)]
pub struct CollisionSystem {
    last_report: CollisionReport,
    last_pairs: Vec<(EntityId, EntityId)>,
}

impl CollisionSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_report(&self) -> CollisionReport {
        self.last_report
    }

    /// Pairs that fired during the last update, in dispatch order.
    pub fn last_pairs(&self) -> &[(EntityId, EntityId)] {
        &self.last_pairs
    }

    /// Detect overlaps and invoke both sides' hit callbacks.
    pub fn update(&mut self, registry: &mut EntityRegistry, ctx: &mut TickContext<'_>) -> CollisionReport {
        let collidables = Self::collect(registry);
        let (pairs, checks) = Self::detect(&collidables, ctx);

        let mut report = CollisionReport {
            collidables: collidables.len(),
            indexed: collidables.iter().filter(|c| c.cell.is_some()).count(),
            checks,
            hits: pairs.len(),
        };
        self.last_pairs.clear();

        for &(a, b) in &pairs {
            let (first, second) = (&collidables[a], &collidables[b]);
            trace!(a = %first.contact.name, b = %second.contact.name, "collision");
            Self::notify(registry, first.contact.handle, &second.contact, ctx);
            Self::notify(registry, second.contact.handle, &first.contact, ctx);
            self.last_pairs.push((first.contact.handle, second.contact.handle));
        }

        report.hits = self.last_pairs.len();
        self.last_report = report;
        report
    }

    fn collect(registry: &EntityRegistry) -> Vec<Collidable> {
        registry
            .iter()
            .filter_map(|entity| {
                let collision = entity.get::<Collision>().filter(|c| c.enabled)?;
                let (bounds, wants) = collision.shape()?;
                let transform = *entity.get::<Transform>()?;
                let grid_position = entity.get::<GridPosition>();
                Some(Collidable {
                    contact: Contact {
                        handle: entity.handle()?,
                        name: entity.name().to_owned(),
                        kind: entity.kind().clone(),
                        tags: entity.tags().clone(),
                        position: transform,
                        layer: grid_position.filter(|p| p.cell.is_some()).map(|p| p.layer),
                    },
                    aabb: bounds.at(&transform),
                    wants: wants.to_vec(),
                    cell: grid_position.and_then(|p| p.cell),
                })
            })
            .collect()
    }

    fn detect(collidables: &[Collidable], ctx: &TickContext<'_>) -> (Vec<(usize, usize)>, usize) {
        let lookup: HashMap<EntityId, usize> = collidables
            .iter()
            .enumerate()
            .map(|(i, c)| (c.contact.handle, i))
            .collect();
        let mut tested: HashSet<(EntityId, EntityId)> = HashSet::new();
        let mut pairs = Vec::new();

        for (ai, a) in collidables.iter().enumerate() {
            let candidates: Vec<usize> = match a.cell {
                Some(cell) => {
                    let nearby: BTreeSet<EntityId> = ctx
                        .grid
                        .neighborhood(cell)
                        .flat_map(|c| ctx.grid.occupants(c.col, c.row))
                        .collect();
                    nearby.iter().filter_map(|id| lookup.get(id).copied()).collect()
                }
                None => (0..collidables.len()).collect(),
            };

            for bi in candidates {
                if bi == ai {
                    continue;
                }
                let b = &collidables[bi];
                let key = ordered(a.contact.handle, b.contact.handle);
                if !tested.insert(key) {
                    continue;
                }
                let eligible = intersects(&a.wants, &b.contact.tags) || intersects(&b.wants, &a.contact.tags);
                if eligible && a.aabb.overlaps(&b.aabb) {
                    pairs.push((ai, bi));
                }
            }
        }
        (pairs, tested.len())
    }

    fn notify(registry: &mut EntityRegistry, target: EntityId, other: &Contact, ctx: &mut TickContext<'_>) {
        if let Some(entity) = registry.get_mut(target) {
            entity.with_component::<Collision, _>(|collision, owner| collision.hit(owner, other, ctx));
        }
    }
}

fn ordered(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
