//! Fixed-timestep simulation driver.
//!
//! The [`Simulation`] owns the grid, the entity registry, the collision
//! system, the event bus and the command buffer. Each tick:
//!
//! 1. The registry updates every live entity, applies deferred commands and
//!    reaps what was destroyed.
//! 2. The collision system dispatches hit callbacks.
//! 3. Commands queued by callbacks are applied and the entities they destroyed
//!    are reaped.
//! 4. The tick counter advances.
//!
//! Ordering is fixed and the command buffer is FIFO, so the same level, the
//! same world state and the same inputs give the same result.
//!
//! # Example
//!
//! ```
//! use tessera_core::prelude::*;
//! use tessera_engine::config::TickConfig;
//! use tessera_engine::tick::Simulation;
//!
//! let mut sim = Simulation::new(Grid::new(8, 8, 64.0), TickConfig::default());
//! sim.registry_mut().add(Entity::new("rock0", "rock"));
//! sim.run_ticks(10);
//!
//! assert_eq!(sim.tick_count(), 10);
//! assert!((sim.sim_time() - 10.0 / 60.0).abs() < 1e-12);
//! ```

use std::rc::Rc;
use std::time::{Duration, Instant};

use tessera_core::collision::{CollisionReport, CollisionSystem};
use tessera_core::command::CommandBuffer;
use tessera_core::context::TickContext;
use tessera_core::event::EventBus;
use tessera_core::grid::Grid;
use tessera_core::registry::{EntityRegistry, UpdateReport};
use tracing::trace;

use crate::config::TickConfig;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Wall-clock timing of the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    pub update_time: Duration,
    pub collision_time: Duration,
    /// Applying post-collision commands and reaping.
    pub reap_time: Duration,
    pub total_time: Duration,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Index of the tick that ran.
    pub tick: u64,
    pub update: UpdateReport,
    pub collision: CollisionReport,
    /// Entities reaped after collision callbacks.
    pub reaped_after_collision: usize,
}

impl TickReport {
    pub fn reaped(&self) -> usize {
        self.update.reaped + self.reaped_after_collision
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

pub struct Simulation {
    grid: Grid,
    registry: EntityRegistry,
    collisions: CollisionSystem,
    events: Rc<EventBus>,
    commands: CommandBuffer,
    tick_counter: u64,
    fixed_dt: f64,
    config: TickConfig,
    last_diagnostics: TickDiagnostics,
}

impl Simulation {
    /// Create a simulation over `grid` with a fresh bus, command buffer and
    /// registry. The registry announces destructions on the bus.
    ///
    /// # Panics
    ///
    /// If `config.fixed_dt` is not positive and finite.
    pub fn new(grid: Grid, config: TickConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        let events = Rc::new(EventBus::new());
        let mut registry = EntityRegistry::new();
        registry.attach_events(events.clone());
        Self {
            grid,
            registry,
            collisions: CollisionSystem::new(),
            events,
            commands: CommandBuffer::new(),
            tick_counter: 0,
            fixed_dt: config.fixed_dt,
            config,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    /// Advance the simulation by one fixed step.
    pub fn tick(&mut self) -> TickReport {
        let tick_start = Instant::now();
        let tick = self.tick_counter;
        let mut ctx = TickContext::new(self.fixed_dt, &mut self.grid, &self.events, &self.commands).at_tick(tick);

        let update_start = Instant::now();
        let update = self.registry.update(&mut ctx);
        let update_time = update_start.elapsed();

        let collision_start = Instant::now();
        let collision = self.collisions.update(&mut self.registry, &mut ctx);
        let collision_time = collision_start.elapsed();

        let reap_start = Instant::now();
        let reaped_after_collision = self.registry.reap_destroyed(&mut ctx);
        let reap_time = reap_start.elapsed();

        debug_assert!(
            self.registry.verify_occupancy(&self.grid).is_ok(),
            "{:?}",
            self.registry.verify_occupancy(&self.grid)
        );

        self.tick_counter += 1;
        self.last_diagnostics = TickDiagnostics {
            update_time,
            collision_time,
            reap_time,
            total_time: tick_start.elapsed(),
        };
        trace!(tick, updated = update.updated, hits = collision.hits, "tick complete");

        TickReport {
            tick,
            update,
            collision,
            reaped_after_collision,
        }
    }

    /// Run `count` ticks. Returns the number of collision pairs that fired.
    pub fn run_ticks(&mut self, count: u64) -> usize {
        (0..count).map(|_| self.tick().collision.hits).sum()
    }

    /// Run `f` against the registry with a context for the next tick, for
    /// setup and teardown work outside the update pass.
    pub fn with_context<R>(&mut self, f: impl FnOnce(&mut EntityRegistry, &mut TickContext<'_>) -> R) -> R {
        let mut ctx = TickContext::new(self.fixed_dt, &mut self.grid, &self.events, &self.commands)
            .at_tick(self.tick_counter);
        f(&mut self.registry, &mut ctx)
    }

    /// Swap in a new grid, returning the old one.
    pub fn replace_grid(&mut self, grid: Grid) -> Grid {
        std::mem::replace(&mut self.grid, grid)
    }

    // -- accessors ----------------------------------------------------------

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Computed as `tick_count * fixed_dt` to avoid drift from repeated
    /// addition.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    pub fn events(&self) -> &Rc<EventBus> {
        &self.events
    }

    pub fn commands(&self) -> &CommandBuffer {
        &self.commands
    }

    pub fn collisions(&self) -> &CollisionSystem {
        &self.collisions
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }

    pub fn is_headless(&self) -> bool {
        self.config.headless
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
