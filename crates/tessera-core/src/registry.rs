//! The [`EntityRegistry`] owns the live entities and drives their lifecycle.
//!
//! Each tick, [`EntityRegistry::update`] runs three phases:
//!
//! 1. Every live entity is updated in insertion order. An entity destroyed
//!    during the pass receives no further updates.
//! 2. Deferred commands queued during the pass are applied (FIFO). Spawned
//!    entities join at the end of the list.
//! 3. Every destroyed entity is reaped: its destruction hooks run once, its
//!    destruction is journaled when it belongs to a level, and
//!    `"<id>_destroyed"` is announced on the attached bus. Commands queued by
//!    those announcements are applied before the pass returns.
//!
//! No destroyed entity survives into the next tick.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::command::{ApplyReport, Command};
use crate::context::TickContext;
use crate::entity::{Entity, EntityId, HandleTable};
use crate::event::EventBus;
use crate::grid::Grid;
use crate::identity::EntityKind;
use crate::transform::GridPosition;
use crate::CoreError;

/// Upper bound on reap/apply rounds in one pass, in case announcements keep
/// destroying entities.
const MAX_REAP_ROUNDS: usize = 64;

/// Receives the destruction of level-owned entities.
pub trait DestructionJournal {
    fn record_destroyed(&self, level: &str, entity: &str);
}

/// Event announced when `entity` is reaped or removed.
pub fn destroyed_event(entity: &str) -> String {
    format!("{entity}_destroyed")
}

// ---------------------------------------------------------------------------
// UpdateReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Entities whose update hooks ran.
    pub updated: usize,
    pub reaped: usize,
    pub commands: ApplyReport,
}

// ---------------------------------------------------------------------------
// EntityRegistry
// ---------------------------------------------------------------------------

/// Insertion-ordered set of live entities.
#[derive(Default)]
pub struct EntityRegistry {
    handles: HandleTable,
    entities: Vec<Entity>,
    positions: HashMap<EntityId, usize>,
    by_kind: HashMap<EntityKind, Vec<EntityId>>,
    events: Option<Rc<EventBus>>,
    journal: Option<Rc<dyn DestructionJournal>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce `"<id>_destroyed"` on `events` from now on.
    pub fn attach_events(&mut self, events: Rc<EventBus>) {
        self.events = Some(events);
    }

    pub fn attach_journal(&mut self, journal: Rc<dyn DestructionJournal>) {
        self.journal = Some(journal);
    }

    // -- insertion / removal --------------------------------------------------

    /// Insert an entity, assigning its runtime handle. Bookkeeping only.
    pub fn add(&mut self, mut entity: Entity) -> EntityId {
        if self.find_by_name(entity.name()).is_some() {
            warn!(entity = entity.name(), "registry already holds an entity with this id");
        }
        let id = self.handles.issue(entity.name());
        entity.assign_handle(id);
        self.by_kind.entry(entity.kind().clone()).or_default().push(id);
        self.positions.insert(id, self.entities.len());
        self.entities.push(entity);
        id
    }

    /// Finalize and drop an entity immediately.
    pub fn remove(&mut self, id: EntityId, ctx: &mut TickContext<'_>) -> Result<(), CoreError> {
        let pos = self
            .positions
            .get(&id)
            .copied()
            .ok_or(CoreError::UnknownEntity { entity: id })?;
        let entity = self.entities.remove(pos);
        self.reindex();
        self.retire(entity, ctx, true);
        Ok(())
    }

    /// Finalize every entity without journaling or announcing anything, and
    /// drop pending commands.
    pub fn destroy_all(&mut self, ctx: &mut TickContext<'_>) {
        let entities = std::mem::take(&mut self.entities);
        self.reindex();
        let count = entities.len();
        for entity in entities {
            self.retire(entity, ctx, false);
        }
        ctx.commands.clear();
        debug!(count, "registry torn down");
    }

    // -- tick -------------------------------------------------------------------

    /// Update every live entity, apply deferred commands, then reap.
    pub fn update(&mut self, ctx: &mut TickContext<'_>) -> UpdateReport {
        let mut report = UpdateReport::default();
        for entity in &mut self.entities {
            if entity.is_destroyed() {
                continue;
            }
            entity.update(ctx);
            report.updated += 1;
        }
        report.commands = self.apply_commands(ctx);
        let (reaped, commands) = self.reap_rounds(ctx);
        report.reaped = reaped;
        report.commands.merge(commands);
        report
    }

    /// Reap destroyed entities outside the update pass (e.g. after collision).
    pub fn reap_destroyed(&mut self, ctx: &mut TickContext<'_>) -> usize {
        self.apply_commands(ctx);
        self.reap_rounds(ctx).0
    }

    /// Apply every queued command in FIFO order.
    pub fn apply_commands(&mut self, ctx: &mut TickContext<'_>) -> ApplyReport {
        let mut report = ApplyReport::default();
        for command in ctx.commands.drain() {
            match command {
                Command::Spawn(entity) => {
                    debug!(entity = entity.name(), kind = %entity.kind(), "spawning deferred entity");
                    self.add(entity);
                    report.spawned += 1;
                }
                Command::Destroy(id) => match self.get_mut(id) {
                    Some(entity) => {
                        entity.destroy();
                        report.destroyed += 1;
                    }
                    None => report.failed += 1,
                },
                Command::DestroyNamed(name) => match self.find_by_name_mut(&name) {
                    Some(entity) => {
                        entity.destroy();
                        report.destroyed += 1;
                    }
                    None => {
                        debug!(entity = %name, "destroy command for unknown entity");
                        report.failed += 1;
                    }
                },
            }
        }
        report
    }

    fn reap_rounds(&mut self, ctx: &mut TickContext<'_>) -> (usize, ApplyReport) {
        let mut reaped = 0;
        let mut commands = ApplyReport::default();
        for _ in 0..MAX_REAP_ROUNDS {
            if !self.entities.iter().any(Entity::is_destroyed) {
                return (reaped, commands);
            }
            let (dead, live): (Vec<Entity>, Vec<Entity>) = std::mem::take(&mut self.entities)
                .into_iter()
                .partition(Entity::is_destroyed);
            self.entities = live;
            self.reindex();
            for entity in dead {
                self.retire(entity, ctx, true);
                reaped += 1;
            }
            commands.merge(self.apply_commands(ctx));
        }
        warn!(rounds = MAX_REAP_ROUNDS, "reaping did not settle; remaining entities reaped next pass");
        (reaped, commands)
    }

    /// Finalize an entity already detached from the registry.
    fn retire(&mut self, mut entity: Entity, ctx: &mut TickContext<'_>, announce: bool) {
        entity.finalize(ctx);
        if let Some(id) = entity.handle() {
            self.handles.retire(id);
            if let Some(ids) = self.by_kind.get_mut(entity.kind()) {
                ids.retain(|&other| other != id);
            }
            for cell in ctx.grid.cells_occupied_by(id) {
                debug!(entity = entity.name(), %cell, "scrubbing stale occupant");
                ctx.grid.remove_occupant(cell.col, cell.row, id);
            }
        }
        if !announce {
            return;
        }
        if let (Some(journal), Some(level)) = (&self.journal, entity.level()) {
            journal.record_destroyed(level, entity.name());
        }
        if let Some(events) = &self.events {
            events.raise_event(&destroyed_event(entity.name()));
        }
    }

    fn reindex(&mut self) {
        self.positions = self
            .entities
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.handle().map(|h| (h, i)))
            .collect();
    }

    // -- queries ----------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.positions.get(&id).map(|&i| &self.entities[i])
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.positions.get(&id).map(|&i| &mut self.entities[i])
    }

    /// The oldest live entity called `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&Entity> {
        let pos = self.live_position_of(name)?;
        Some(&self.entities[pos])
    }

    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut Entity> {
        let pos = self.live_position_of(name)?;
        Some(&mut self.entities[pos])
    }

    fn live_position_of(&self, name: &str) -> Option<usize> {
        self.handles
            .named(name)
            .iter()
            .filter_map(|id| self.positions.get(id).copied())
            .find(|&pos| !self.entities[pos].is_destroyed())
    }

    /// Live entities whose identifier starts with `prefix`.
    pub fn get_by_type(&self, prefix: &str) -> Vec<&Entity> {
        self.iter().filter(|e| e.name().starts_with(prefix)).collect()
    }

    pub fn get_first(&self, prefix: &str) -> Option<&Entity> {
        self.iter().find(|e| e.name().starts_with(prefix))
    }

    /// Live entities of exactly this kind, in insertion order.
    pub fn get_by_kind(&self, kind: &str) -> Vec<&Entity> {
        let Some(ids) = self.by_kind.get(&EntityKind::from(kind)) else {
            return Vec::new();
        };
        let mut found: Vec<(usize, &Entity)> = ids
            .iter()
            .filter_map(|id| self.positions.get(id).map(|&i| (i, &self.entities[i])))
            .filter(|(_, e)| !e.is_destroyed())
            .collect();
        found.sort_by_key(|(i, _)| *i);
        found.into_iter().map(|(_, e)| e).collect()
    }

    /// Live (not destroyed) entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| !e.is_destroyed())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut().filter(|e| !e.is_destroyed())
    }

    pub fn handles(&self) -> Vec<EntityId> {
        self.iter().filter_map(Entity::handle).collect()
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.handles.is_current(id) && self.get(id).is_some_and(|e| !e.is_destroyed())
    }

    /// Number of tracked entities, including ones destroyed but not yet reaped.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // -- invariants ---------------------------------------------------------------

    /// Check that occupancy matches reported grid positions: every occupant is
    /// a live entity, and every grid-tracked entity sits in exactly the cell
    /// its [`GridPosition`] reports.
    pub fn verify_occupancy(&self, grid: &Grid) -> Result<(), CoreError> {
        for (coord, cell) in grid.cells() {
            for &id in cell.occupants() {
                if !self.is_alive(id) {
                    return Err(CoreError::OccupancyViolation {
                        entity: id.to_string(),
                        detail: format!("cell {coord} lists a dead entity"),
                    });
                }
            }
        }
        for entity in self.iter() {
            let Some(id) = entity.handle() else { continue };
            let occupied = grid.cells_occupied_by(id);
            let expected: Vec<_> = entity
                .get::<GridPosition>()
                .and_then(|p| p.cell)
                .into_iter()
                .collect();
            if occupied != expected {
                return Err(CoreError::OccupancyViolation {
                    entity: entity.name().to_owned(),
                    detail: format!("registered in {occupied:?}, reports {expected:?}"),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
