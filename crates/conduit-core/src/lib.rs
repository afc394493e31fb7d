//! Conduit Core -- the logistics engine for factory-building games.
//!
//! This crate provides the transport-network subsystem: directional
//! segments on a tile grid, an incrementally-maintained junction graph,
//! A* routing over that compressed graph, a stepwise transit simulation,
//! and the capacity-reservation protocol that keeps concurrent transfers
//! from racing for the same destination slot.
//!
//! # Four-Phase Tick Pipeline
//!
//! Each call to [`engine::Engine::step`] advances the simulation by one
//! tick through the following phases:
//!
//! 1. **Commands** -- Apply queued external mutations (placement, removal,
//!    operator transfers).
//! 2. **Transit** -- Advance in-flight packages in insertion order, per
//!    network; arrivals, lazy invalidation, and rerouting happen here.
//! 3. **Force rules** -- Evaluate force-input/output rules on attached
//!    nodes and issue the resulting transfers.
//! 4. **Post-tick** -- Deliver buffered events and increment the tick.
//!
//! # Reservation Protocol
//!
//! A transfer is accepted in one synchronous call: the destination
//! container's capacity is claimed (`expect`) *before* the package is
//! created, and the claim converts into real stock on arrival. The network
//! facade itself rejects `expect`: reservations always target a physical
//! container, never the aggregate.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Arena owner and tick orchestrator.
//! - [`network::NetworkGraph`] -- Segments, junction classification, and
//!   per-direction junction distances; merge and split maintenance.
//! - [`router`] -- A* over the junction graph; `None` means "no route",
//!   never an error.
//! - [`transit::Package`] -- An in-flight transfer unit with its route,
//!   position, and awaiting-reroute state.
//! - [`container::ResourceContainer`] -- Typed quantity store with the
//!   reserved-capacity ledger.
//! - [`registry::Registry`] -- Immutable resource-type registry, frozen at
//!   engine construction.
//! - [`event::EventBus`] -- Buffered per-kind event delivery.

pub mod behavior;
pub mod command;
pub mod container;
#[cfg(feature = "data-loader")]
pub mod data_loader;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod grid;
pub mod id;
pub mod network;
pub mod node;
pub mod registry;
pub mod resources;
pub mod router;
pub mod transit;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
