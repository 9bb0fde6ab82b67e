//! Event-gated creation driven through a running simulation.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use proptest::prelude::*;
use tessera_core::prelude::*;
use tessera_engine::config::TickConfig;
use tessera_engine::creator::{CreationGate, CreationPolicy, Creator, DeferredCreatorManager};
use tessera_engine::tick::Simulation;
use tessera_state::world_state::WorldStateStore;

const EVENTS: [&str; 4] = ["lever_a", "lever_b", "plate", "bell"];

fn counted(name: String, runs: Rc<Cell<u32>>) -> Creator {
    Box::new(move || {
        runs.set(runs.get() + 1);
        vec![Entity::new(name.clone(), "gated")]
    })
}

fn harness() -> (Simulation, WorldStateStore, DeferredCreatorManager) {
    let sim = Simulation::new(Grid::new(4, 4, 64.0), TickConfig::default());
    let store = WorldStateStore::new();
    let creators = DeferredCreatorManager::new(sim.events().clone(), sim.commands().clone(), store.clone());
    (sim, store, creators)
}

#[test]
fn alternating_events_create_exactly_one_entity() {
    let (mut sim, store, creators) = harness();
    let runs = Rc::new(Cell::new(0));
    creators.register(
        "door0",
        "dungeon1",
        CreationGate::new(CreationPolicy::All, ["A", "B"]),
        counted("door0".to_owned(), runs.clone()),
    );

    for event in ["A", "B", "A", "B", "A"] {
        sim.events().raise_event(event);
        sim.tick();
    }

    assert_eq!(runs.get(), 1);
    assert_eq!(sim.registry().get_by_kind("gated").len(), 1);
    assert_eq!(sim.registry().find_by_name("door0").and_then(Entity::level), Some("dungeon1"));
    assert!(store.is_live("dungeon1", "door0"));
}

#[test]
fn entities_created_mid_pass_join_at_its_end() {
    let (mut sim, _store, creators) = harness();
    creators.register(
        "chest0",
        "dungeon1",
        CreationGate::new(CreationPolicy::Any, ["open"]),
        counted("chest0".to_owned(), Rc::default()),
    );

    sim.events().raise_event("open");
    assert!(sim.registry().find_by_name("chest0").is_none(), "queued, not inserted");
    sim.tick();
    assert!(sim.registry().find_by_name("chest0").is_some());
}

#[derive(Debug, Clone)]
struct GatePlan {
    all: bool,
    events: BTreeSet<usize>,
}

fn gate_strategy() -> impl Strategy<Value = GatePlan> {
    (any::<bool>(), prop::collection::btree_set(0..EVENTS.len(), 1..=3))
        .prop_map(|(all, events)| GatePlan { all, events })
}

impl GatePlan {
    fn gate(&self) -> CreationGate {
        let policy = if self.all { CreationPolicy::All } else { CreationPolicy::Any };
        CreationGate::new(policy, self.events.iter().map(|&i| EVENTS[i]))
    }

    fn satisfied_by(&self, raised: &BTreeSet<usize>) -> bool {
        if self.all {
            self.events.is_subset(raised)
        } else {
            !self.events.is_disjoint(raised)
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn every_gate_creates_at_most_once(
        gates in prop::collection::vec(gate_strategy(), 1..6),
        sequence in prop::collection::vec(0..EVENTS.len(), 0..16),
    ) {
        let (mut sim, store, creators) = harness();
        let runs: Vec<Rc<Cell<u32>>> = gates.iter().map(|_| Rc::default()).collect();
        for (i, plan) in gates.iter().enumerate() {
            let id = format!("gated{i}");
            creators.register(&id, "dungeon1", plan.gate(), counted(id.clone(), runs[i].clone()));
        }

        for &event in &sequence {
            sim.events().raise_event(EVENTS[event]);
            sim.tick();
        }
        let raised: BTreeSet<usize> = sequence.iter().copied().collect();
        for (i, plan) in gates.iter().enumerate() {
            let id = format!("gated{i}");
            let expected = plan.satisfied_by(&raised);
            prop_assert_eq!(runs[i].get(), u32::from(expected), "{} after the sequence", id);
            prop_assert_eq!(store.is_live("dungeon1", &id), expected);
            prop_assert_eq!(sim.registry().find_by_name(&id).is_some(), expected);
        }

        // Raising everything again must not create anything twice.
        for event in EVENTS.iter().chain(EVENTS.iter()) {
            sim.events().raise_event(event);
            sim.tick();
        }
        for (i, runs) in runs.iter().enumerate() {
            let id = format!("gated{i}");
            prop_assert_eq!(runs.get(), 1);
            let copies = sim.registry().iter().filter(|e| e.name() == id).count();
            prop_assert_eq!(copies, 1, "{} present once", id);
        }
        prop_assert_eq!(creators.pending_count(), 0);
        for event in EVENTS {
            prop_assert!(!creators.is_subscribed(event));
        }
    }
}
