//! Event chainers raise a timed sequence of events.
//!
//! Each step waits `delayMs` after the previous one (or after the chain
//! started) and raises its event; at most one step fires per update. A chain
//! with `startOnEvent` sits idle until that event is raised. The chainer
//! destroys itself after its last step.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tessera_core::component::{Component, ComponentKind};
use tessera_core::context::TickContext;
use tessera_core::entity::Entity;
use tessera_core::event::{EventBus, EventListener};
use tessera_core::grid::CellCoord;
use tracing::debug;

use super::cell_center;
use crate::level::EntityDef;
use crate::loader::{Blueprint, SpawnContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStep {
    pub event: String,
    #[serde(default)]
    pub delay_ms: f64,
}

impl ChainStep {
    pub fn new(event: impl Into<String>, delay_ms: f64) -> Self {
        Self {
            event: event.into(),
            delay_ms,
        }
    }
}

struct StartSignal {
    event: String,
    started: Cell<bool>,
}

impl EventListener for StartSignal {
    fn on_event(&self, _event: &str, bus: &EventBus) {
        self.started.set(true);
        bus.deregister(&self.event, self);
    }
}

pub struct EventChainer {
    steps: Vec<ChainStep>,
    next: usize,
    elapsed_ms: f64,
    start: Option<(Rc<StartSignal>, Rc<EventBus>)>,
}

impl EventChainer {
    /// A chain that starts running immediately.
    pub fn new(steps: Vec<ChainStep>) -> Self {
        Self {
            steps,
            next: 0,
            elapsed_ms: 0.0,
            start: None,
        }
    }

    /// A chain that waits for `event` before its first step.
    pub fn started_by(steps: Vec<ChainStep>, event: impl Into<String>, events: Rc<EventBus>) -> Self {
        let signal = Rc::new(StartSignal {
            event: event.into(),
            started: Cell::new(false),
        });
        events.register(&signal.event, signal.clone());
        Self {
            start: Some((signal, events)),
            ..Self::new(steps)
        }
    }

    pub fn is_started(&self) -> bool {
        self.start.as_ref().map_or(true, |(signal, _)| signal.started.get())
    }

    /// Steps already raised.
    pub fn progress(&self) -> usize {
        self.next
    }
}

impl Component for EventChainer {
    fn update(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        if !self.is_started() {
            return;
        }
        let Some(step) = self.steps.get(self.next) else {
            owner.destroy();
            return;
        };

        self.elapsed_ms += ctx.dt_ms();
        if self.elapsed_ms < step.delay_ms {
            return;
        }
        debug!(chainer = owner.name(), event = %step.event, step = self.next, "chained event");
        let event = step.event.clone();
        self.next += 1;
        self.elapsed_ms = 0.0;
        ctx.events.raise_event(&event);

        if self.next >= self.steps.len() {
            owner.destroy();
        }
    }

    fn on_destroy(&mut self, _owner: &mut Entity, _ctx: &mut TickContext<'_>) {
        if let Some((signal, events)) = &self.start {
            events.deregister(&signal.event, &**signal);
        }
    }
}

// ---------------------------------------------------------------------------
// Level data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChainerData {
    #[serde(default)]
    pub events_to_raise: Vec<ChainStep>,
    #[serde(default)]
    pub start_on_event: Option<String>,
    #[serde(default)]
    pub col: Option<i32>,
    #[serde(default)]
    pub row: Option<i32>,
}

pub(crate) fn blueprint() -> Blueprint<ChainerData> {
    Blueprint::new(build)
}

fn build(def: &EntityDef, data: ChainerData, ctx: &SpawnContext) -> Vec<Entity> {
    let mut entity = Entity::new(def.id.clone(), def.kind.clone());
    if let (Some(col), Some(row)) = (data.col, data.row) {
        entity.add(cell_center(ctx.cell_size, CellCoord::new(col, row)));
    }
    let chainer = match data.start_on_event {
        Some(event) => EventChainer::started_by(data.events_to_raise, event, ctx.events.clone()),
        None => EventChainer::new(data.events_to_raise),
    };
    entity.add(chainer);
    entity.set_update_order(&[ComponentKind::of::<EventChainer>()]);
    vec![entity]
}
