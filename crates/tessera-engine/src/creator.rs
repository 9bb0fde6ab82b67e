//! Deferred entity creation gated on events.
//!
//! The [`DeferredCreatorManager`] holds one tracker per gated entity
//! definition. A tracker names its events and a [`CreationPolicy`]: `Any`
//! creates on the first of its events, `All` once every one of them has been
//! raised. When a tracker is satisfied its creator runs, each created entity
//! is tagged with the owning level, journaled as live in the world state, and
//! queued on the command buffer for insertion at the end of the current pass.
//!
//! Each event name is acted on at most once per manager lifetime. Events raised
//! before a tracker registers count toward it. The manager subscribes to an
//! event only while some tracker still waits on it.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use tessera_core::prelude::*;
//! use tessera_engine::creator::{CreationGate, CreationPolicy, DeferredCreatorManager};
//! use tessera_state::world_state::WorldStateStore;
//!
//! let events = Rc::new(EventBus::new());
//! let commands = CommandBuffer::new();
//! let store = WorldStateStore::new();
//! let creators = DeferredCreatorManager::new(events.clone(), commands.clone(), store.clone());
//!
//! creators.register(
//!     "door0",
//!     "dungeon1",
//!     CreationGate::new(CreationPolicy::All, ["lever_a", "lever_b"]),
//!     Box::new(|| vec![Entity::new("door0", "door")]),
//! );
//!
//! events.raise_event("lever_a");
//! assert!(commands.is_empty());
//! events.raise_event("lever_b");
//! assert_eq!(commands.len(), 1);
//! assert!(store.is_live("dungeon1", "door0"));
//! ```

use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::rc::Rc;

use tessera_core::command::CommandBuffer;
use tessera_core::entity::Entity;
use tessera_core::event::{EventBus, EventListener};
use tessera_state::world_state::WorldStateStore;
use tracing::{debug, info};

/// Produces the entities for one gated definition.
pub type Creator = Box<dyn FnMut() -> Vec<Entity>>;

// ---------------------------------------------------------------------------
// CreationGate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationPolicy {
    /// Create on the first listed event.
    Any,
    /// Create once every listed event has been raised.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationGate {
    pub policy: CreationPolicy,
    pub events: Vec<String>,
}

impl CreationGate {
    pub fn new(policy: CreationPolicy, events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            policy,
            events: events.into_iter().map(Into::into).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracker state
// ---------------------------------------------------------------------------

struct Tracker {
    id: String,
    level: String,
    policy: CreationPolicy,
    total: usize,
    /// Events still awaited.
    pending: BTreeSet<String>,
    creator: Creator,
}

impl Tracker {
    fn observe(&mut self, event: &str) -> bool {
        self.pending.remove(event) && self.is_satisfied()
    }

    fn is_satisfied(&self) -> bool {
        match self.policy {
            CreationPolicy::Any => self.pending.len() < self.total,
            CreationPolicy::All => self.pending.is_empty(),
        }
    }
}

#[derive(Default)]
struct CreatorState {
    trackers: Vec<Tracker>,
    fired: HashSet<String>,
    subscribed: HashSet<String>,
}

/// The bus-facing half of the manager.
struct CreatorListener {
    state: RefCell<CreatorState>,
    commands: CommandBuffer,
    store: WorldStateStore,
}

impl CreatorListener {
    /// Drop subscriptions no remaining tracker waits on.
    fn release_unneeded(&self, bus: &EventBus) {
        let stale: Vec<String> = {
            let mut state = self.state.borrow_mut();
            let needed: HashSet<&String> = state
                .trackers
                .iter()
                .flat_map(|tracker| tracker.pending.iter())
                .collect();
            let stale: Vec<String> = state
                .subscribed
                .iter()
                .filter(|event| !needed.contains(event))
                .cloned()
                .collect();
            for event in &stale {
                state.subscribed.remove(event);
            }
            stale
        };
        for event in stale {
            bus.deregister(&event, self);
        }
    }

    fn run(&self, mut tracker: Tracker, cause: &str) {
        let entities = (tracker.creator)();
        info!(
            entity = %tracker.id,
            level = %tracker.level,
            event = cause,
            created = entities.len(),
            "deferred creation"
        );
        self.store.add_live_entity(&tracker.level, &tracker.id);
        for mut entity in entities {
            entity.set_level(tracker.level.clone());
            self.commands.spawn(entity);
        }
    }
}

impl EventListener for CreatorListener {
    fn on_event(&self, event: &str, bus: &EventBus) {
        let satisfied: Vec<Tracker> = {
            let mut state = self.state.borrow_mut();
            if !state.fired.insert(event.to_owned()) {
                debug!(event, "creation event already handled");
                return;
            }
            let mut satisfied = Vec::new();
            let mut remaining = Vec::with_capacity(state.trackers.len());
            for mut tracker in std::mem::take(&mut state.trackers) {
                if tracker.observe(event) {
                    satisfied.push(tracker);
                } else {
                    remaining.push(tracker);
                }
            }
            state.trackers = remaining;
            satisfied
        };
        self.release_unneeded(bus);
        for tracker in satisfied {
            self.run(tracker, event);
        }
    }
}

// ---------------------------------------------------------------------------
// DeferredCreatorManager
// ---------------------------------------------------------------------------

/// Creates gated entities when their events are raised.
pub struct DeferredCreatorManager {
    listener: Rc<CreatorListener>,
    events: Rc<EventBus>,
}

impl DeferredCreatorManager {
    pub fn new(events: Rc<EventBus>, commands: CommandBuffer, store: WorldStateStore) -> Self {
        Self {
            listener: Rc::new(CreatorListener {
                state: RefCell::new(CreatorState::default()),
                commands,
                store,
            }),
            events,
        }
    }

    /// Track a gated definition. A gate already satisfied by earlier events
    /// creates immediately.
    pub fn register(&self, id: &str, level: &str, gate: CreationGate, creator: Creator) {
        let pending: BTreeSet<String> = gate.events.into_iter().collect();
        let total = pending.len();
        let mut tracker = Tracker {
            id: id.to_owned(),
            level: level.to_owned(),
            policy: gate.policy,
            total,
            pending,
            creator,
        };

        let to_subscribe: Vec<String> = {
            let mut state = self.listener.state.borrow_mut();
            let fired: Vec<String> = tracker
                .pending
                .iter()
                .filter(|event| state.fired.contains(*event))
                .cloned()
                .collect();
            for event in &fired {
                tracker.pending.remove(event);
            }
            if total > 0 && tracker.is_satisfied() {
                drop(state);
                debug!(entity = id, "creation gate already satisfied");
                self.listener.run(tracker, "(already raised)");
                return;
            }
            let fresh: Vec<String> = tracker
                .pending
                .iter()
                .filter(|event| !state.subscribed.contains(*event))
                .cloned()
                .collect();
            state.subscribed.extend(fresh.iter().cloned());
            state.trackers.push(tracker);
            fresh
        };

        let listener: Rc<dyn EventListener> = self.listener.clone();
        for event in to_subscribe {
            self.events.register(&event, listener.clone());
        }
    }

    /// Drop every tracker, subscription and fired-event memory.
    pub fn clear(&self) {
        let subscribed: Vec<String> = {
            let mut state = self.listener.state.borrow_mut();
            let subscribed = state.subscribed.drain().collect();
            state.trackers.clear();
            state.fired.clear();
            subscribed
        };
        for event in subscribed {
            self.events.deregister(&event, &*self.listener);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.listener.state.borrow().trackers.len()
    }

    pub fn has_fired(&self, event: &str) -> bool {
        self.listener.state.borrow().fired.contains(event)
    }

    pub fn is_subscribed(&self, event: &str) -> bool {
        self.listener.state.borrow().subscribed.contains(event)
    }
}

impl fmt::Debug for DeferredCreatorManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.listener.state.borrow();
        f.debug_struct("DeferredCreatorManager")
            .field("pending", &state.trackers.len())
            .field("fired", &state.fired.len())
            .field("subscribed", &state.subscribed.len())
            .finish()
    }
}

impl Drop for DeferredCreatorManager {
    fn drop(&mut self) {
        self.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
