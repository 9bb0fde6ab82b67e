//! Per-tick context handed to component hooks and hit callbacks.

use crate::command::CommandBuffer;
use crate::event::EventBus;
use crate::grid::Grid;

/// Shared simulation resources for one tick.
pub struct TickContext<'a> {
    /// Fixed time step in seconds.
    pub dt: f64,
    /// Index of the tick being run.
    pub tick: u64,
    pub grid: &'a mut Grid,
    pub events: &'a EventBus,
    pub commands: &'a CommandBuffer,
}

impl<'a> TickContext<'a> {
    pub fn new(dt: f64, grid: &'a mut Grid, events: &'a EventBus, commands: &'a CommandBuffer) -> Self {
        Self {
            dt,
            tick: 0,
            grid,
            events,
            commands,
        }
    }

    pub fn at_tick(mut self, tick: u64) -> Self {
        self.tick = tick;
        self
    }

    /// Time step in milliseconds.
    pub fn dt_ms(&self) -> f64 {
        self.dt * 1000.0
    }
}
