//! Entity catalog and level loading.
//!
//! An [`EntityCatalog`] maps a level entity kind (`"bug_base"`) to the
//! [`EntityFactory`] that validates its payload and builds its entities.
//! [`load_entities`] instantiates a [`LevelDocument`] against the world-state
//! journal:
//!
//! - a definition journaled as destroyed is skipped, or replaced by its kind's
//!   stand-in (a destroyed `bug_base` leaves `"<id>_exhausted"`);
//! - a one-shot trigger whose event already fired is skipped;
//! - an event-gated definition already created once (journaled live) is
//!   spawned immediately;
//! - any other event-gated definition is handed to the
//!   [`DeferredCreatorManager`];
//! - everything else is spawned directly.
//!
//! Every entity produced for a definition is tagged with the owning level.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use tessera_core::entity::Entity;
use tessera_core::event::EventBus;
use tessera_core::registry::EntityRegistry;
use tessera_state::world_state::WorldStateStore;
use tracing::{debug, info, warn};

use crate::creator::DeferredCreatorManager;
use crate::gameplay::{PlayerLocator, TransitionSlot};
use crate::level::{EntityDef, LevelDocument, LevelError};

// ---------------------------------------------------------------------------
// SpawnContext
// ---------------------------------------------------------------------------

/// What factories may capture when building entities.
///
/// Builders may run long after loading (from a deferred creator), so the
/// context holds shared handles only and never the grid.
#[derive(Clone)]
pub struct SpawnContext {
    pub level: String,
    pub cell_size: f64,
    pub events: Rc<EventBus>,
    pub store: WorldStateStore,
    pub transitions: TransitionSlot,
    pub player: PlayerLocator,
}

impl fmt::Debug for SpawnContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnContext")
            .field("level", &self.level)
            .field("cell_size", &self.cell_size)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EntityFactory
// ---------------------------------------------------------------------------

/// Builds the entities for one level entity kind.
pub trait EntityFactory {
    /// Check the definition's payload without building anything.
    fn validate(&self, def: &EntityDef) -> Result<(), LevelError>;

    fn build(&self, def: &EntityDef, ctx: &SpawnContext) -> Result<Vec<Entity>, LevelError>;

    /// What remains of the definition once it has been destroyed, if anything.
    fn stand_in(&self, _def: &EntityDef, _ctx: &SpawnContext) -> Result<Option<Vec<Entity>>, LevelError> {
        Ok(None)
    }

    /// Whether the definition has already done its job and must not reappear.
    fn is_spent(&self, _def: &EntityDef, _ctx: &SpawnContext) -> bool {
        false
    }
}

type BuildFn<D> = fn(&EntityDef, D, &SpawnContext) -> Vec<Entity>;
type StandInFn<D> = fn(&EntityDef, &D, &SpawnContext) -> Vec<Entity>;
type SpentFn<D> = fn(&D, &SpawnContext) -> bool;

/// A factory driven by a typed payload `D` decoded from the definition's data.
pub struct Blueprint<D> {
    build: BuildFn<D>,
    stand_in: Option<StandInFn<D>>,
    spent: Option<SpentFn<D>>,
    _payload: PhantomData<fn() -> D>,
}

impl<D: DeserializeOwned> Blueprint<D> {
    pub fn new(build: BuildFn<D>) -> Self {
        Self {
            build,
            stand_in: None,
            spent: None,
            _payload: PhantomData,
        }
    }

    pub fn with_stand_in(mut self, stand_in: StandInFn<D>) -> Self {
        self.stand_in = Some(stand_in);
        self
    }

    pub fn spent_when(mut self, spent: SpentFn<D>) -> Self {
        self.spent = Some(spent);
        self
    }
}

impl<D: DeserializeOwned> EntityFactory for Blueprint<D> {
    fn validate(&self, def: &EntityDef) -> Result<(), LevelError> {
        def.payload::<D>().map(|_| ())
    }

    fn build(&self, def: &EntityDef, ctx: &SpawnContext) -> Result<Vec<Entity>, LevelError> {
        let payload = def.payload::<D>()?;
        Ok((self.build)(def, payload, ctx))
    }

    fn stand_in(&self, def: &EntityDef, ctx: &SpawnContext) -> Result<Option<Vec<Entity>>, LevelError> {
        let Some(stand_in) = self.stand_in else {
            return Ok(None);
        };
        let payload = def.payload::<D>()?;
        Ok(Some(stand_in(def, &payload, ctx)))
    }

    fn is_spent(&self, def: &EntityDef, ctx: &SpawnContext) -> bool {
        match (self.spent, def.payload::<D>()) {
            (Some(spent), Ok(payload)) => spent(&payload, ctx),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// EntityCatalog
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct EntityCatalog {
    factories: HashMap<String, Box<dyn EntityFactory>>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding every built-in kind.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        crate::gameplay::register_defaults(&mut catalog);
        catalog
    }

    /// Register `factory` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: &str, factory: impl EntityFactory + 'static) {
        if self.factories.insert(kind.to_owned(), Box::new(factory)).is_some() {
            debug!(kind, "entity factory replaced");
        }
    }

    pub fn get(&self, kind: &str) -> Option<&dyn EntityFactory> {
        self.factories.get(kind).map(|factory| factory.as_ref())
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    fn factory_for(&self, def: &EntityDef) -> Result<&dyn EntityFactory, LevelError> {
        self.get(&def.kind).ok_or_else(|| LevelError::UnknownKind {
            id: def.id.clone(),
            kind: def.kind.clone(),
        })
    }

    /// Every configuration error in `doc`, reported before anything spawns.
    pub fn validate(&self, doc: &LevelDocument) -> Result<(), LevelError> {
        doc.validate()?;
        for def in &doc.entities {
            self.factory_for(def)?.validate(def)?;
        }
        Ok(())
    }
}

impl fmt::Debug for EntityCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCatalog").field("kinds", &self.kinds()).finish()
    }
}

// ---------------------------------------------------------------------------
// load_entities
// ---------------------------------------------------------------------------

/// How each definition of a document was handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Entities inserted into the registry.
    pub spawned: usize,
    /// Definitions handed to the deferred-creator manager.
    pub deferred: usize,
    /// Definitions left out entirely.
    pub skipped: usize,
    /// Destroyed definitions replaced by their stand-in.
    pub stand_ins: usize,
    /// Event-gated definitions spawned because they were created before.
    pub restored_live: usize,
}

pub fn load_entities(
    doc: &LevelDocument,
    catalog: &Rc<EntityCatalog>,
    ctx: &SpawnContext,
    registry: &mut EntityRegistry,
    creators: &DeferredCreatorManager,
) -> Result<LoadReport, LevelError> {
    catalog.validate(doc)?;
    let mut report = LoadReport::default();

    for def in &doc.entities {
        let factory = catalog.factory_for(def)?;

        if ctx.store.is_destroyed(&ctx.level, &def.id) {
            match factory.stand_in(def, ctx)? {
                Some(entities) => {
                    debug!(entity = %def.id, "destroyed; spawning stand-in");
                    report.spawned += spawn(registry, entities, &ctx.level);
                    report.stand_ins += 1;
                }
                None => {
                    debug!(entity = %def.id, "destroyed; skipped");
                    report.skipped += 1;
                }
            }
            continue;
        }

        if factory.is_spent(def, ctx) {
            debug!(entity = %def.id, "already fired; skipped");
            report.skipped += 1;
            continue;
        }

        match def.gate()? {
            Some(_) if ctx.store.is_live(&ctx.level, &def.id) => {
                report.spawned += spawn(registry, factory.build(def, ctx)?, &ctx.level);
                report.restored_live += 1;
            }
            Some(gate) => {
                let id = def.id.clone();
                let def = def.clone();
                let catalog = Rc::clone(catalog);
                let spawn_ctx = ctx.clone();
                creators.register(
                    &id,
                    &ctx.level,
                    gate,
                    Box::new(move || build_deferred(&catalog, &def, &spawn_ctx)),
                );
                report.deferred += 1;
            }
            None => {
                report.spawned += spawn(registry, factory.build(def, ctx)?, &ctx.level);
            }
        }
    }

    info!(
        level = %ctx.level,
        spawned = report.spawned,
        deferred = report.deferred,
        skipped = report.skipped,
        stand_ins = report.stand_ins,
        "level entities loaded"
    );
    Ok(report)
}

fn spawn(registry: &mut EntityRegistry, entities: Vec<Entity>, level: &str) -> usize {
    let count = entities.len();
    for mut entity in entities {
        entity.set_level(level);
        registry.add(entity);
    }
    count
}

fn build_deferred(catalog: &EntityCatalog, def: &EntityDef, ctx: &SpawnContext) -> Vec<Entity> {
    let built = catalog.factory_for(def).and_then(|factory| factory.build(def, ctx));
    match built {
        Ok(entities) => entities,
        Err(err) => {
            warn!(entity = %def.id, error = %err, "deferred creation failed");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
