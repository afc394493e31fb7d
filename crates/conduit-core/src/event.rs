//! Typed event system with pre-allocated ring buffers.
//!
//! Events are emitted while a tick runs (container mutations, topology
//! changes, package lifecycle) and delivered in batch during the post-tick
//! phase. Each event kind has its own [`EventBuffer`] ring buffer with a
//! configurable capacity. Container change notifications travel this bus;
//! dependent endpoints poll it instead of registering callbacks.
//!
//! # Suppression
//!
//! Event kinds can be suppressed via [`EventBus::suppress`], which prevents
//! any recording for that kind. Suppressed events have zero cost.

use crate::fixed::{Quantity, Ticks};
use crate::grid::TileCoord;
use crate::id::*;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Containers --
    ResourceAdded {
        container: ContainerId,
        resource: ResourceTypeId,
        quantity: Quantity,
        tick: Ticks,
    },
    ResourceRemoved {
        container: ContainerId,
        resource: ResourceTypeId,
        quantity: Quantity,
        tick: Ticks,
    },
    ContainerCleared {
        container: ContainerId,
        tick: Ticks,
    },

    // -- Packages --
    PackageCreated {
        package: PackageId,
        from: NodeId,
        to: NodeId,
        resource: ResourceTypeId,
        quantity: Quantity,
        tick: Ticks,
    },
    PackageDelivered {
        package: PackageId,
        to: NodeId,
        resource: ResourceTypeId,
        quantity: Quantity,
        tick: Ticks,
    },
    PackageRerouted {
        package: PackageId,
        old_to: NodeId,
        new_to: NodeId,
        tick: Ticks,
    },
    PackageAwaitingRoute {
        package: PackageId,
        tick: Ticks,
    },

    // -- Topology --
    SegmentPlaced {
        segment: SegmentId,
        tile: TileCoord,
        network: NetworkId,
        tick: Ticks,
    },
    SegmentRemoved {
        tile: TileCoord,
        network: NetworkId,
        tick: Ticks,
    },
    NetworksMerged {
        absorbed: NetworkId,
        into: NetworkId,
        tick: Ticks,
    },
    NetworkSplit {
        from: NetworkId,
        into: NetworkId,
        tick: Ticks,
    },
    NodeAttached {
        node: NodeId,
        network: NetworkId,
        tick: Ticks,
    },
    NodeDetached {
        node: NodeId,
        network: NetworkId,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ResourceAdded,
    ResourceRemoved,
    ContainerCleared,
    PackageCreated,
    PackageDelivered,
    PackageRerouted,
    PackageAwaitingRoute,
    SegmentPlaced,
    SegmentRemoved,
    NetworksMerged,
    NetworkSplit,
    NodeAttached,
    NodeDetached,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 13;

impl Event {
    /// Get the discriminant kind for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ResourceAdded { .. } => EventKind::ResourceAdded,
            Event::ResourceRemoved { .. } => EventKind::ResourceRemoved,
            Event::ContainerCleared { .. } => EventKind::ContainerCleared,
            Event::PackageCreated { .. } => EventKind::PackageCreated,
            Event::PackageDelivered { .. } => EventKind::PackageDelivered,
            Event::PackageRerouted { .. } => EventKind::PackageRerouted,
            Event::PackageAwaitingRoute { .. } => EventKind::PackageAwaitingRoute,
            Event::SegmentPlaced { .. } => EventKind::SegmentPlaced,
            Event::SegmentRemoved { .. } => EventKind::SegmentRemoved,
            Event::NetworksMerged { .. } => EventKind::NetworksMerged,
            Event::NetworkSplit { .. } => EventKind::NetworkSplit,
            Event::NodeAttached { .. } => EventKind::NodeAttached,
            Event::NodeDetached { .. } => EventKind::NodeDetached,
        }
    }
}

impl EventKind {
    /// Convert to usize index for array lookups.
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer — pre-allocated ring buffer
// ---------------------------------------------------------------------------

/// A pre-allocated ring buffer for events. Fixed capacity; when full, the
/// oldest events are dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Option<Event>>,
    /// Write position (wraps around).
    head: usize,
    /// Number of events currently stored (may be less than capacity).
    len: usize,
    /// Total events ever written (including dropped).
    total_written: u64,
}

impl EventBuffer {
    /// Create a new ring buffer with the given capacity.
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    /// Push an event into the ring buffer. If full, the oldest event is dropped.
    pub fn push(&mut self, event: Event) {
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Iterate stored events oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        let cap = self.capacity();
        let start = (self.head + cap - self.len) % cap;
        (0..self.len).filter_map(move |i| self.events[(start + i) % cap].as_ref())
    }

    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default per-kind ring buffer capacity.
const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Collects events during a tick and delivers them in batch to per-kind ring
/// buffers during the post-tick phase.
#[derive(Debug)]
pub struct EventBus {
    /// Events emitted this tick, awaiting delivery.
    pending: Vec<Event>,
    /// One ring buffer per event kind.
    buffers: Vec<EventBuffer>,
    suppressed: [bool; EVENT_KIND_COUNT],
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a bus whose per-kind buffers hold `capacity` events each.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Vec::new(),
            buffers: (0..EVENT_KIND_COUNT)
                .map(|_| EventBuffer::new(capacity))
                .collect(),
            suppressed: [false; EVENT_KIND_COUNT],
        }
    }

    /// Record an event for delivery at the end of the tick. Suppressed
    /// kinds are dropped without allocation.
    pub fn emit(&mut self, event: Event) {
        if self.suppressed[event.kind().index()] {
            return;
        }
        self.pending.push(event);
    }

    /// Deliver all pending events into their per-kind buffers, in emission
    /// order. Called once per tick during the post-tick phase.
    pub fn deliver(&mut self) {
        for event in self.pending.drain(..) {
            let idx = event.kind().index();
            self.buffers[idx].push(event);
        }
    }

    /// Suppress an event kind. Subsequent emissions of it are dropped.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
    }

    /// Re-enable a suppressed event kind.
    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    /// The delivered events of one kind, oldest-first.
    pub fn events(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.buffers[kind.index()].iter()
    }

    /// Number of events emitted this tick but not yet delivered.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Clear the delivered buffer for one kind.
    pub fn clear(&mut self, kind: EventKind) {
        self.buffers[kind.index()].clear();
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::qty;
    use slotmap::SlotMap;

    fn container_id() -> ContainerId {
        let mut sm: SlotMap<ContainerId, ()> = SlotMap::with_key();
        sm.insert(())
    }

    fn added_event(tick: Ticks) -> Event {
        Event::ResourceAdded {
            container: container_id(),
            resource: ResourceTypeId(0),
            quantity: qty(1),
            tick,
        }
    }

    #[test]
    fn emit_then_deliver() {
        let mut bus = EventBus::new();
        bus.emit(added_event(0));
        assert_eq!(bus.pending_count(), 1);
        assert_eq!(bus.events(EventKind::ResourceAdded).count(), 0);

        bus.deliver();
        assert_eq!(bus.pending_count(), 0);
        assert_eq!(bus.events(EventKind::ResourceAdded).count(), 1);
    }

    #[test]
    fn suppression_drops_events() {
        let mut bus = EventBus::new();
        bus.suppress(EventKind::ResourceAdded);
        bus.emit(added_event(0));
        assert_eq!(bus.pending_count(), 0);

        bus.unsuppress(EventKind::ResourceAdded);
        bus.emit(added_event(1));
        bus.deliver();
        assert_eq!(bus.events(EventKind::ResourceAdded).count(), 1);
    }

    #[test]
    fn ring_buffer_drops_oldest() {
        let mut buffer = EventBuffer::new(2);
        buffer.push(added_event(0));
        buffer.push(added_event(1));
        buffer.push(added_event(2));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.total_written(), 3);

        let ticks: Vec<Ticks> = buffer
            .iter()
            .map(|e| match e {
                Event::ResourceAdded { tick, .. } => *tick,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ticks, vec![1, 2]);
    }

    #[test]
    fn buffer_iterates_oldest_first() {
        let mut buffer = EventBuffer::new(8);
        for tick in 0..3 {
            buffer.push(added_event(tick));
        }
        let ticks: Vec<Ticks> = buffer
            .iter()
            .map(|e| match e {
                Event::ResourceAdded { tick, .. } => *tick,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ticks, vec![0, 1, 2]);
    }

    #[test]
    fn zero_capacity_clamped() {
        let buffer = EventBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
    }

    #[test]
    fn clear_resets_buffer() {
        let mut bus = EventBus::new();
        bus.emit(added_event(0));
        bus.deliver();
        bus.clear(EventKind::ResourceAdded);
        assert_eq!(bus.events(EventKind::ResourceAdded).count(), 0);
    }
}
