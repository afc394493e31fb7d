//! Input command queue for externally-submitted engine mutations.
//!
//! Commands are queued by the game client (UI, scripting, the replication
//! layer) and executed at tick boundaries to keep the simulation
//! deterministic. Each command is a single atomic operation; the
//! replication collaborator replays already-validated commands through the
//! same queue.

use crate::behavior::NodeBehavior;
use crate::fixed::{Quantity, Ticks};
use crate::grid::TileCoord;
use crate::id::{NodeId, ResourceTypeId};
use crate::registry::ResourceCategory;
use crate::resources::ResourceList;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Command enum
// ---------------------------------------------------------------------------

/// A single command that can be submitted to the engine. Executed at the
/// start of the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Place a transport segment.
    PlaceSegment {
        category: ResourceCategory,
        tile: TileCoord,
    },
    /// Remove a transport segment.
    RemoveSegment {
        category: ResourceCategory,
        tile: TileCoord,
    },
    /// Push resources from a node into its network.
    PushResources {
        from: NodeId,
        resources: ResourceList,
    },
    /// Operator-issued transfer into a specific node.
    ForceSend {
        to: NodeId,
        resource: ResourceTypeId,
        quantity: Quantity,
    },
    /// Operator-issued transfer out of a specific node.
    ForceTake {
        from: NodeId,
        resource: ResourceTypeId,
        quantity: Quantity,
    },
    /// Replace a node's behavior rules.
    SetBehavior {
        node: NodeId,
        behavior: NodeBehavior,
    },
}

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

/// A queue of commands waiting to be executed at the next tick boundary.
/// Supports optional bounded history for replay and debugging.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Vec<Command>,
    /// History of executed commands: (tick, command).
    history: Vec<(Ticks, Command)>,
    /// Maximum history entries to retain. 0 = no history.
    max_history: usize,
}

impl CommandQueue {
    /// A new empty queue with no history tracking.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new queue that retains up to `max_history` executed commands.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            max_history,
            ..Self::default()
        }
    }

    /// Push a single command onto the queue.
    pub fn push(&mut self, command: Command) {
        self.pending.push(command);
    }

    /// Push multiple commands at once.
    pub fn push_batch(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.pending.extend(commands);
    }

    /// Drain all pending commands, moving them to history with the given
    /// tick. Returns the drained commands in submission order.
    pub fn drain(&mut self, tick: Ticks) -> Vec<Command> {
        let commands: Vec<Command> = self.pending.drain(..).collect();
        if self.max_history > 0 {
            for command in &commands {
                self.history.push((tick, command.clone()));
            }
            let excess = self.history.len().saturating_sub(self.max_history);
            if excess > 0 {
                self.history.drain(..excess);
            }
        }
        commands
    }

    /// Number of commands waiting to be executed.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Executed command history, oldest first.
    pub fn history(&self) -> &[(Ticks, Command)] {
        &self.history
    }
}
