//! Level exits.
//!
//! An `exit` definition yields two entities: the [`LevelExit`], which listens
//! for `exit_<id>`, and a companion trigger zone `<id>_trigger` over the exit's
//! cells that raises it. Hearing the event, the exit requests a
//! [`Transition`] in the shared slot; the session performs it once the tick is
//! over. The companion zone is not journaled, so the exit works again every
//! time the level is entered.

use std::rc::Rc;

use serde::Deserialize;
use tessera_core::component::Component;
use tessera_core::context::TickContext;
use tessera_core::entity::Entity;
use tessera_core::event::{EventBus, EventListener};
use tessera_core::grid::CellCoord;
use tracing::{info, warn};

use super::trigger::{one_shot_default, TriggerZone};
use super::{PlayerLocator, Transition, TransitionSlot};
use crate::level::EntityDef;
use crate::loader::{Blueprint, SpawnContext};

/// Event an exit listens for.
pub fn exit_event(id: &str) -> String {
    format!("exit_{id}")
}

struct ExitListener {
    transition: Transition,
    slot: TransitionSlot,
}

impl EventListener for ExitListener {
    fn on_event(&self, event: &str, _bus: &EventBus) {
        if self.slot.request(self.transition.clone()) {
            info!(
                event,
                level = %self.transition.target_level,
                cell = %self.transition.target_cell,
                "transition requested"
            );
        } else {
            warn!(event, "transition already pending; request ignored");
        }
    }
}

pub struct LevelExit {
    event: String,
    listener: Rc<ExitListener>,
    events: Rc<EventBus>,
}

impl LevelExit {
    /// Subscribe to `event` immediately; unsubscribed when the owner is destroyed.
    pub fn new(events: Rc<EventBus>, event: impl Into<String>, transition: Transition, slot: TransitionSlot) -> Self {
        let event = event.into();
        let listener = Rc::new(ExitListener { transition, slot });
        events.register(&event, listener.clone());
        Self {
            event,
            listener,
            events,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn transition(&self) -> &Transition {
        &self.listener.transition
    }
}

impl Component for LevelExit {
    fn on_destroy(&mut self, _owner: &mut Entity, _ctx: &mut TickContext<'_>) {
        self.events.deregister(&self.event, &*self.listener);
    }
}

// ---------------------------------------------------------------------------
// Level data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExitData {
    pub target_level: String,
    pub target_col: i32,
    pub target_row: i32,
    #[serde(default)]
    pub trigger_cells: Vec<CellCoord>,
    #[serde(default = "one_shot_default")]
    pub one_shot: bool,
}

pub(crate) fn blueprint() -> Blueprint<ExitData> {
    Blueprint::new(build)
}

fn build(def: &EntityDef, data: ExitData, ctx: &SpawnContext) -> Vec<Entity> {
    let event = exit_event(&def.id);

    let mut zone = TriggerZone::new(event.clone(), data.trigger_cells, ctx.player.clone());
    zone.one_shot = data.one_shot;
    let trigger = zone.into_entity(format!("{}_trigger", def.id), "trigger", ctx.cell_size);

    let transition = Transition {
        target_level: data.target_level,
        target_cell: CellCoord::new(data.target_col, data.target_row),
    };
    let mut exit = Entity::new(def.id.clone(), def.kind.clone());
    exit.add(LevelExit::new(ctx.events.clone(), event, transition, ctx.transitions.clone()));

    vec![trigger, exit]
}
