//! Trigger zones: raise an event when the player steps onto one of a set of
//! cells.
//!
//! A zone fires when the player *arrives* on a trigger cell. A one-shot zone
//! then records the event as fired in the world state and destroys itself; a
//! repeating zone re-arms once the player leaves all of its cells.

use serde::Deserialize;
use tessera_core::component::{Component, ComponentKind};
use tessera_core::context::TickContext;
use tessera_core::entity::Entity;
use tessera_core::grid::CellCoord;
use tessera_state::world_state::WorldStateStore;
use tracing::info;

use super::{cell_center, PlayerLocator};
use crate::level::EntityDef;
use crate::loader::{Blueprint, SpawnContext};

pub struct TriggerZone {
    pub event: String,
    pub cells: Vec<CellCoord>,
    pub one_shot: bool,
    occupied: bool,
    player: PlayerLocator,
    journal: Option<(WorldStateStore, String)>,
}

impl TriggerZone {
    /// A one-shot zone over `cells`, watching the player `player` tracks.
    pub fn new(event: impl Into<String>, cells: impl IntoIterator<Item = CellCoord>, player: PlayerLocator) -> Self {
        Self {
            event: event.into(),
            cells: cells.into_iter().collect(),
            one_shot: true,
            occupied: false,
            player,
            journal: None,
        }
    }

    pub fn repeating(mut self) -> Self {
        self.one_shot = false;
        self
    }

    /// Record the event as fired for `level` when a one-shot zone goes off.
    pub fn journaled(mut self, store: WorldStateStore, level: impl Into<String>) -> Self {
        self.journal = Some((store, level.into()));
        self
    }

    /// An entity carrying only this zone, placed on its first cell.
    pub fn into_entity(self, name: impl Into<String>, kind: &str, cell_size: f64) -> Entity {
        let mut entity = Entity::new(name, kind);
        if let Some(&first) = self.cells.first() {
            entity.add(cell_center(cell_size, first));
        }
        entity.add(self);
        entity.set_update_order(&[ComponentKind::of::<TriggerZone>()]);
        entity
    }
}

impl Component for TriggerZone {
    fn update(&mut self, owner: &mut Entity, ctx: &mut TickContext<'_>) {
        let inside = self.player.cell().is_some_and(|cell| self.cells.contains(&cell));
        if !inside {
            self.occupied = false;
            return;
        }
        if std::mem::replace(&mut self.occupied, true) {
            return;
        }

        info!(trigger = owner.name(), event = %self.event, "trigger fired");
        ctx.events.raise_event(&self.event);
        if self.one_shot {
            if let Some((store, level)) = &self.journal {
                store.add_fired_trigger(level, &self.event);
            }
            owner.destroy();
        }
    }
}

// ---------------------------------------------------------------------------
// Level data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TriggerData {
    pub event_to_raise: String,
    #[serde(default)]
    pub trigger_cells: Vec<CellCoord>,
    #[serde(default = "one_shot_default")]
    pub one_shot: bool,
}

pub(crate) fn one_shot_default() -> bool {
    true
}

pub(crate) fn blueprint() -> Blueprint<TriggerData> {
    Blueprint::new(build).spent_when(|data, ctx| data.one_shot && ctx.store.has_fired_trigger(&ctx.level, &data.event_to_raise))
}

fn build(def: &EntityDef, data: TriggerData, ctx: &SpawnContext) -> Vec<Entity> {
    let mut zone = TriggerZone::new(data.event_to_raise, data.trigger_cells, ctx.player.clone())
        .journaled(ctx.store.clone(), ctx.level.clone());
    zone.one_shot = data.one_shot;
    vec![zone.into_entity(def.id.clone(), &def.kind, ctx.cell_size)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::config::TickConfig;
    use crate::gameplay::{spawn_player, Health, PLAYER_NAME};
    use crate::movement::teleport;
    use crate::tick::Simulation;
    use tessera_core::event::listener_fn;
    use tessera_core::grid::Grid;

    /// Player first, so its position is published before the zone looks.
    fn rig(build: impl FnOnce(PlayerLocator) -> TriggerZone) -> (Simulation, Rc<Cell<u32>>) {
        let mut sim = Simulation::new(Grid::new(6, 6, 32.0), TickConfig::default());
        let locator = PlayerLocator::new();
        sim.registry_mut()
            .add(spawn_player(CellCoord::new(0, 0), 32.0, Health::new(100), 0.0, locator.clone()));
        let zone = build(locator);
        let event = zone.event.clone();
        sim.registry_mut().add(zone.into_entity("trigger0", "trigger", 32.0));

        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        sim.events().register(&event, listener_fn(move |_, _| seen.set(seen.get() + 1)));
        (sim, count)
    }

    fn walk_to(sim: &mut Simulation, cell: CellCoord) {
        sim.with_context(|registry, ctx| {
            let player = registry.find_by_name_mut(PLAYER_NAME).unwrap();
            assert!(teleport(player, ctx.grid, cell));
        });
    }

    #[test]
    fn one_shot_fires_once_and_journals() {
        let store = WorldStateStore::new();
        let journal = store.clone();
        let (mut sim, count) =
            rig(|player| TriggerZone::new("gate_open", [CellCoord::new(2, 2)], player).journaled(journal, "dungeon1"));

        sim.run_ticks(3);
        assert_eq!(count.get(), 0);

        walk_to(&mut sim, CellCoord::new(2, 2));
        sim.run_ticks(3);
        assert_eq!(count.get(), 1);
        assert!(sim.registry().find_by_name("trigger0").is_none());
        assert!(store.has_fired_trigger("dungeon1", "gate_open"));
    }

    #[test]
    fn repeating_fires_on_each_arrival() {
        let (mut sim, count) =
            rig(|player| TriggerZone::new("step", [CellCoord::new(1, 0), CellCoord::new(2, 0)], player).repeating());
        sim.tick();

        walk_to(&mut sim, CellCoord::new(1, 0));
        sim.run_ticks(2);
        walk_to(&mut sim, CellCoord::new(2, 0));
        sim.run_ticks(2);
        assert_eq!(count.get(), 1, "moving within the zone does not re-fire");

        walk_to(&mut sim, CellCoord::new(4, 4));
        sim.tick();
        walk_to(&mut sim, CellCoord::new(1, 0));
        sim.tick();
        assert_eq!(count.get(), 2);
        assert!(sim.registry().find_by_name("trigger0").is_some());
    }

    #[test]
    fn spent_one_shot_is_not_rebuilt() {
        use crate::loader::EntityFactory;
        use serde_json::json;

        let store = WorldStateStore::new();
        let ctx = SpawnContext {
            level: "dungeon1".to_owned(),
            cell_size: 32.0,
            events: Rc::new(tessera_core::event::EventBus::new()),
            store: store.clone(),
            transitions: Default::default(),
            player: PlayerLocator::new(),
        };
        let def = EntityDef::new("t0", "trigger", json!({ "eventToRaise": "boom", "triggerCells": [] }));
        let factory = blueprint();
        assert!(!factory.is_spent(&def, &ctx));
        store.add_fired_trigger("dungeon1", "boom");
        assert!(factory.is_spent(&def, &ctx));

        let repeating = EntityDef::new("t1", "trigger", json!({ "eventToRaise": "boom", "oneShot": false }));
        assert!(!factory.is_spent(&repeating, &ctx));
    }
}
