//! Synchronous named-event publish/subscribe.
//!
//! [`EventBus::raise_event`] iterates a snapshot of the subscriber list taken
//! when the raise starts, and calls each listener only if it is still
//! registered at that moment. A listener that deregisters itself (or another
//! listener) mid-dispatch therefore neither skips nor duplicates anyone; a
//! listener registered mid-dispatch is first called on the next raise.
//! Dispatch is re-entrant: a listener may raise further events, which resolve
//! fully before control returns.
//!
//! Listener identity is the address of the shared listener object.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use tessera_core::prelude::*;
//!
//! let bus = EventBus::new();
//! let hits = Rc::new(Cell::new(0));
//! let counter = hits.clone();
//! let listener = listener_fn(move |_event, _bus| counter.set(counter.get() + 1));
//!
//! bus.register("door_opened", listener.clone());
//! bus.raise_event("door_opened");
//! bus.deregister("door_opened", &*listener);
//! bus.raise_event("door_opened");
//!
//! assert_eq!(hits.get(), 1);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

// ---------------------------------------------------------------------------
// EventListener
// ---------------------------------------------------------------------------

/// Something that reacts to named events.
///
/// Listeners take `&self`; state they mutate lives behind interior
/// mutability.
pub trait EventListener {
    fn on_event(&self, event: &str, bus: &EventBus);
}

/// Adapter turning a closure into a listener.
pub struct FnListener<F>(F);

impl<F> EventListener for FnListener<F>
where
    F: Fn(&str, &EventBus),
{
    fn on_event(&self, event: &str, bus: &EventBus) {
        (self.0)(event, bus)
    }
}

/// Wrap a closure as a shareable listener.
pub fn listener_fn<F>(f: F) -> Rc<dyn EventListener>
where
    F: Fn(&str, &EventBus) + 'static,
{
    Rc::new(FnListener(f))
}

fn same_listener(a: &dyn EventListener, b: &dyn EventListener) -> bool {
    std::ptr::addr_eq(a as *const dyn EventListener, b as *const dyn EventListener)
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Mapping from event name to an ordered list of listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<HashMap<String, Vec<Rc<dyn EventListener>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `listener` to the subscribers of `name`.
    pub fn register(&self, name: &str, listener: Rc<dyn EventListener>) {
        self.listeners
            .borrow_mut()
            .entry(name.to_owned())
            .or_default()
            .push(listener);
    }

    /// Remove the first registration of `listener` for `name`.
    ///
    /// Returns `false` if it was not registered.
    pub fn deregister(&self, name: &str, listener: &dyn EventListener) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(name) else {
            return false;
        };
        let Some(pos) = list.iter().position(|l| same_listener(&**l, listener)) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            listeners.remove(name);
        }
        true
    }

    /// Whether `listener` is currently registered for `name`.
    pub fn is_registered(&self, name: &str, listener: &dyn EventListener) -> bool {
        self.listeners
            .borrow()
            .get(name)
            .is_some_and(|list| list.iter().any(|l| same_listener(&**l, listener)))
    }

    /// Dispatch `name` synchronously to its current subscribers.
    pub fn raise_event(&self, name: &str) {
        let snapshot = match self.listeners.borrow().get(name) {
            Some(list) => list.clone(),
            None => {
                trace!(event = name, "event raised with no subscribers");
                return;
            }
        };
        trace!(event = name, listeners = snapshot.len(), "raising event");
        for listener in snapshot {
            if self.is_registered(name, &*listener) {
                listener.on_event(name, self);
            }
        }
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.borrow().get(name).map_or(0, Vec::len)
    }

    pub fn has_listeners(&self, name: &str) -> bool {
        self.listener_count(name) > 0
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        let mut names: Vec<(&String, usize)> =
            listeners.iter().map(|(k, v)| (k, v.len())).collect();
        names.sort();
        f.debug_struct("EventBus").field("listeners", &names).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
