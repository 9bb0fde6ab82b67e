//! Deferred registry mutations.
//!
//! Components, hit callbacks and event listeners never touch the registry
//! directly while it is iterating. They queue [`Command`]s on a shared
//! [`CommandBuffer`] instead; the registry applies the queue in FIFO order
//! after the update pass. A spawned entity therefore joins the registry at the
//! end of the tick that created it and receives its first update on the next.
//!
//! # Example
//!
//! ```
//! use tessera_core::prelude::*;
//!
//! let commands = CommandBuffer::new();
//! let handle = commands.clone();
//! handle.spawn(Entity::new("coin0", "coin"));
//!
//! assert_eq!(commands.len(), 1);
//! let drained = commands.drain();
//! assert!(matches!(drained[0], Command::Spawn(_)));
//! assert!(commands.is_empty());
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::entity::{Entity, EntityId};

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A single deferred mutation.
pub enum Command {
    /// Insert a new entity.
    Spawn(Entity),
    /// Mark an entity destroyed by handle.
    Destroy(EntityId),
    /// Mark an entity destroyed by its string identifier.
    DestroyNamed(String),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Spawn(entity) => write!(f, "Spawn({})", entity.name()),
            Command::Destroy(id) => write!(f, "Destroy({id})"),
            Command::DestroyNamed(name) => write!(f, "DestroyNamed({name})"),
        }
    }
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Summary of one application of the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub spawned: usize,
    pub destroyed: usize,
    /// Commands targeting entities that no longer exist.
    pub failed: usize,
}

impl ApplyReport {
    pub fn merge(&mut self, other: ApplyReport) {
        self.spawned += other.spawned;
        self.destroyed += other.destroyed;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.spawned + self.destroyed + self.failed
    }
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

/// Shared FIFO queue of deferred commands.
///
/// Cloning yields another handle onto the same queue.
#[derive(Clone, Default)]
pub struct CommandBuffer {
    queue: Rc<RefCell<VecDeque<Command>>>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: Command) {
        self.queue.borrow_mut().push_back(command);
    }

    pub fn spawn(&self, entity: Entity) {
        self.push(Command::Spawn(entity));
    }

    pub fn destroy(&self, id: EntityId) {
        self.push(Command::Destroy(id));
    }

    pub fn destroy_named(&self, name: impl Into<String>) {
        self.push(Command::DestroyNamed(name.into()));
    }

    /// Take every queued command, oldest first.
    pub fn drain(&self) -> Vec<Command> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Drop every queued command without applying it.
    pub fn clear(&self) {
        self.queue.borrow_mut().clear();
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("pending", &self.len())
            .finish()
    }
}
