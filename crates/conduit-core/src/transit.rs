//! The transit simulator: in-flight packages and their per-tick lifecycle.
//!
//! A package is born `EnRoute` the moment a transfer is accepted: the
//! destination reservation is taken and the route computed inside the same
//! synchronous call, so no second transfer can race for the claimed slot.
//! Each tick a package either retries routing (`AwaitingReroute`), arrives
//! (within one tick's travel of the final waypoint, re-validating the
//! destination before the physical transfer), or advances along its route
//! by the network's speed.
//!
//! Destination invalidation is detected lazily each tick, never via push
//! notification: a node whose allow-input rule flips, detaches, or
//! disappears sends the package back through rerouting from its current
//! position. Package lists are never mutated while being traversed;
//! [`PackageList`] defers adds and removes until the traversal finishes.

use crate::container::ContainerError;
use crate::engine::Engine;
use crate::event::Event;
use crate::fixed::{Fixed64, Quantity};
use crate::grid::{Direction, WorldPos};
use crate::id::{NetworkId, NodeId, PackageId, ResourceTypeId};
use crate::router::{self, Route};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a transfer request could not be accepted. All variants mean "cannot
/// transfer now"; none of them is fatal.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("node is not attached to a network")]
    NotAttached,
    #[error("node cannot output {0:?} right now")]
    CannotOutput(ResourceTypeId),
    #[error("node cannot input {0:?} right now")]
    CannotInput(ResourceTypeId),
    #[error("no eligible destination for {0:?}")]
    NoDestination(ResourceTypeId),
    #[error("no eligible source for {0:?}")]
    NoSource(ResourceTypeId),
    #[error("no route to the selected destination")]
    NoRoute,
    #[error(transparent)]
    Container(#[from] ContainerError),
}

// ---------------------------------------------------------------------------
// Packages
// ---------------------------------------------------------------------------

/// An in-flight transfer unit. Mutated in place on re-route: the old
/// destination becomes the source and a fresh route is substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub from: NodeId,
    pub to: NodeId,
    pub resource: ResourceTypeId,
    pub quantity: Quantity,
    pub route: Route,
    /// Index of the waypoint currently being approached.
    pub step_index: usize,
    pub position: WorldPos,
    pub dir: Direction,
    /// Set when no destination or route is available; retried every tick.
    pub awaiting_reroute: bool,
    /// Whether this package holds a reservation at its destination.
    pub has_reservation: bool,
}

impl Package {
    pub fn new(
        from: NodeId,
        to: NodeId,
        resource: ResourceTypeId,
        quantity: Quantity,
        route: Route,
    ) -> Self {
        let start = route.steps()[0];
        Self {
            from,
            to,
            resource,
            quantity,
            position: WorldPos::tile_center(start.tile),
            dir: start.next_dir.unwrap_or(Direction::North),
            route,
            step_index: 0,
            awaiting_reroute: false,
            has_reservation: true,
        }
    }
}

// ---------------------------------------------------------------------------
// PackageList — deferred mutation while traversing
// ---------------------------------------------------------------------------

/// An insertion-ordered list of package ids that tolerates mutation during
/// its own traversal. While the traversing flag is up, adds and removes go
/// to side queues that are flushed once the traversal completes; the live
/// collection is never mutated mid-iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageList {
    items: Vec<PackageId>,
    #[serde(skip)]
    traversing: bool,
    #[serde(skip)]
    deferred_add: Vec<PackageId>,
    #[serde(skip)]
    deferred_remove: Vec<PackageId>,
}

impl PackageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: PackageId) -> bool {
        self.items.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = PackageId> + '_ {
        self.items.iter().copied()
    }

    /// Add a package, deferring if a traversal is active.
    pub fn push(&mut self, id: PackageId) {
        if self.traversing {
            self.deferred_add.push(id);
        } else {
            self.items.push(id);
        }
    }

    /// Remove a package, deferring if a traversal is active.
    pub fn remove(&mut self, id: PackageId) {
        if self.traversing {
            self.deferred_remove.push(id);
        } else {
            self.items.retain(|&p| p != id);
        }
    }

    /// Begin a traversal: raises the flag and returns a snapshot of the
    /// current items in insertion order.
    pub fn begin_traversal(&mut self) -> Vec<PackageId> {
        debug_assert!(!self.traversing, "traversal already active");
        self.traversing = true;
        self.items.clone()
    }

    /// Finish a traversal: drops the flag and flushes the deferred queues,
    /// removals first.
    pub fn finish_traversal(&mut self) {
        debug_assert!(self.traversing, "no traversal active");
        self.traversing = false;
        if !self.deferred_remove.is_empty() {
            let removals = std::mem::take(&mut self.deferred_remove);
            self.items.retain(|p| !removals.contains(p));
        }
        self.items.append(&mut self.deferred_add);
    }

    /// Union another list into this one (network merge).
    pub fn absorb(&mut self, mut other: PackageList) {
        debug_assert!(!self.traversing && !other.traversing);
        self.items.append(&mut other.items);
    }
}

// ---------------------------------------------------------------------------
// Per-tick advancement
// ---------------------------------------------------------------------------

impl Engine {
    /// Advance every package of a network by one tick, in insertion order.
    pub(crate) fn advance_packages(&mut self, network: NetworkId) {
        let Some(net) = self.graph.network_mut(network) else {
            return;
        };
        let speed = net.speed;
        let ids = net.packages.begin_traversal();
        for id in ids {
            if self.packages.contains_key(id) {
                self.advance_package(network, id, speed);
            }
        }
        if let Some(net) = self.graph.network_mut(network) {
            net.packages.finish_traversal();
        }
    }

    fn advance_package(&mut self, network: NetworkId, id: PackageId, speed: Fixed64) {
        if self.packages[id].awaiting_reroute {
            self.reroute_package(network, id);
            return;
        }

        // Lazy invalidation: the destination may have detached, changed its
        // rules, or vanished since the route was computed.
        if !self.destination_valid(network, id) {
            self.reroute_package(network, id);
            return;
        }

        let at_destination = {
            let pack = &self.packages[id];
            let final_pos = WorldPos::tile_center(pack.route.last().tile);
            pack.position.manhattan_distance(&final_pos) <= speed
        };

        if at_destination {
            self.deliver_package(network, id);
        } else {
            self.move_package(id, speed);
        }
    }

    /// Whether the package's destination node can still receive it. The
    /// capacity side is covered by the reservation; what can change under
    /// the package is the node itself and its allow-input rule.
    fn destination_valid(&self, network: NetworkId, id: PackageId) -> bool {
        let pack = &self.packages[id];
        let Some(node) = self.nodes.get(pack.to) else {
            return false;
        };
        if node.network != Some(network) {
            return false;
        }
        let Some(container) = self.containers.get(node.container) else {
            return false;
        };
        node.is_right_type(&self.registry, pack.resource)
            && node.behavior.allow_in.check(pack.resource, container)
    }

    /// Complete the transfer at the destination. The reservation converts
    /// into real stock; capacity is re-validated because reservations are
    /// provisional. A destination that refuses at the door sends the
    /// package back through rerouting, never panics, never drops cargo.
    fn deliver_package(&mut self, network: NetworkId, id: PackageId) {
        let (to, resource, quantity) = {
            let pack = &self.packages[id];
            (pack.to, pack.resource, pack.quantity)
        };
        let container_id = self.nodes[to].container;
        let delivered = self.containers[container_id]
            .add(&self.registry, resource, quantity)
            .is_ok();

        if !delivered {
            self.reroute_package(network, id);
            return;
        }

        let tick = self.tick;
        self.bus.emit(Event::ResourceAdded {
            container: container_id,
            resource,
            quantity,
            tick,
        });
        self.bus.emit(Event::PackageDelivered {
            package: id,
            to,
            resource,
            quantity,
            tick,
        });
        self.packages.remove(id);
        if let Some(net) = self.graph.network_mut(network) {
            net.packages.remove(id);
        }
    }

    fn move_package(&mut self, id: PackageId, speed: Fixed64) {
        let pack = &mut self.packages[id];
        let mut budget = speed;
        if let Some(step) = pack.route.get(pack.step_index) {
            let step_pos = WorldPos::tile_center(step.tile);
            let to_waypoint = pack.position.manhattan_distance(&step_pos);
            if to_waypoint <= budget {
                // Snap onto the waypoint before turning, so packages stay
                // on the grid lines the route runs along; the distance
                // already covered comes out of this tick's budget.
                pack.position = step_pos;
                budget -= to_waypoint;
                if let Some(dir) = step.next_dir {
                    pack.dir = dir;
                }
                pack.step_index += 1;
            }
        }
        pack.position = pack.position.advanced(pack.dir, budget);
    }

    /// Recompute a destination and route for a package from its current
    /// position. The new reservation is taken before the stale one is
    /// released, so the reservation bound never dips below the truth.
    pub(crate) fn reroute_package(&mut self, network: NetworkId, id: PackageId) {
        let (resource, quantity, old_to, position, heading, had_reservation) = {
            let pack = &self.packages[id];
            (
                pack.resource,
                pack.quantity,
                pack.to,
                pack.position,
                pack.dir,
                pack.has_reservation,
            )
        };

        let new_to = self.find_destination_for(network, resource, quantity, None);
        let route = new_to.and_then(|dest| {
            router::route_from(
                &self.graph,
                position.containing_tile(),
                heading,
                &self.nodes[dest],
            )
        });

        let (Some(new_to), Some(route)) = (new_to, route) else {
            self.park_package(id);
            return;
        };

        let new_container = self.nodes[new_to].container;
        if self.containers[new_container]
            .expect(&self.registry, resource, quantity)
            .is_err()
        {
            self.park_package(id);
            return;
        }
        if had_reservation
            && let Some(old_node) = self.nodes.get(old_to)
            && let Some(old_container) = self.containers.get_mut(old_node.container)
        {
            old_container.cancel_expectation(resource, quantity);
        }

        let tick = self.tick;
        let pack = &mut self.packages[id];
        pack.from = old_to;
        pack.to = new_to;
        pack.route = route;
        pack.step_index = 0;
        pack.awaiting_reroute = false;
        pack.has_reservation = true;
        if let Some(dir) = pack.route.steps()[0].next_dir {
            pack.dir = dir;
        }
        self.bus.emit(Event::PackageRerouted {
            package: id,
            old_to,
            new_to,
            tick,
        });
    }

    /// Park a package in the awaiting-reroute state; retried next tick.
    fn park_package(&mut self, id: PackageId) {
        let tick = self.tick;
        let pack = &mut self.packages[id];
        if !pack.awaiting_reroute {
            pack.awaiting_reroute = true;
            self.bus.emit(Event::PackageAwaitingRoute { package: id, tick });
        }
    }

    // -----------------------------------------------------------------------
    // Destination / source selection
    // -----------------------------------------------------------------------

    /// Select an eligible destination node: prefer one whose force-input
    /// rule currently holds, otherwise spread load round-robin among
    /// eligible nodes not recently served.
    pub(crate) fn find_destination_for(
        &self,
        network: NetworkId,
        resource: ResourceTypeId,
        quantity: Quantity,
        exclude: Option<NodeId>,
    ) -> Option<NodeId> {
        let net = self.graph.network(network)?;
        let eligible: Vec<NodeId> = net
            .attached_nodes
            .iter()
            .copied()
            .filter(|&id| Some(id) != exclude)
            .filter(|&id| {
                let Some(node) = self.nodes.get(id) else {
                    return false;
                };
                let Some(container) = self.containers.get(node.container) else {
                    return false;
                };
                node.can_input(&self.registry, container, resource, quantity)
            })
            .collect();

        // A forced input always wins, regardless of round-robin state.
        for &id in &eligible {
            let node = &self.nodes[id];
            if node
                .behavior
                .force_in
                .check(resource, &self.containers[node.container])
            {
                return Some(id);
            }
        }

        eligible
            .iter()
            .copied()
            .find(|id| !net.sent_to.contains(id))
            .or_else(|| eligible.first().copied())
    }

    /// Select an eligible source node, preferring one whose force-output
    /// rule currently holds.
    pub(crate) fn find_source_for(
        &self,
        network: NetworkId,
        resource: ResourceTypeId,
        quantity: Quantity,
        exclude: Option<NodeId>,
    ) -> Option<NodeId> {
        let net = self.graph.network(network)?;
        let eligible: Vec<NodeId> = net
            .attached_nodes
            .iter()
            .copied()
            .filter(|&id| Some(id) != exclude)
            .filter(|&id| {
                let Some(node) = self.nodes.get(id) else {
                    return false;
                };
                let Some(container) = self.containers.get(node.container) else {
                    return false;
                };
                node.can_output(&self.registry, container, resource, quantity)
            })
            .collect();

        for &id in &eligible {
            let node = &self.nodes[id];
            if node
                .behavior
                .force_out
                .check(resource, &self.containers[node.container])
            {
                return Some(id);
            }
        }
        eligible.first().copied()
    }

    /// Record a round-robin serving. Once every input-capable node has been
    /// served, the rotation restarts.
    fn mark_sent(&mut self, network: NetworkId, node: NodeId) {
        let possible: usize = {
            let Some(net) = self.graph.network(network) else {
                return;
            };
            net.attached_nodes
                .iter()
                .filter(|&&id| {
                    self.nodes
                        .get(id)
                        .is_some_and(|n| n.behavior.allow_in.is_possible())
                })
                .count()
        };
        let Some(net) = self.graph.network_mut(network) else {
            return;
        };
        if !net.sent_to.contains(&node) {
            net.sent_to.push(node);
        }
        if net.sent_to.len() >= possible {
            net.sent_to.clear();
        }
    }

    // -----------------------------------------------------------------------
    // Transfer entry points
    // -----------------------------------------------------------------------

    /// The committed middle of every transfer: reserve at the destination,
    /// debit the source container, then create the package, all in one
    /// synchronous call so the reservation always precedes the package.
    fn create_transfer(
        &mut self,
        network: NetworkId,
        from: NodeId,
        to: NodeId,
        resource: ResourceTypeId,
        quantity: Quantity,
    ) -> Result<PackageId, TransferError> {
        let route = router::route_between(&self.graph, &self.nodes[from], &self.nodes[to])
            .ok_or(TransferError::NoRoute)?;

        let to_container = self.nodes[to].container;
        self.containers[to_container].expect(&self.registry, resource, quantity)?;

        let from_container = self.nodes[from].container;
        self.containers[from_container].remove_unchecked(resource, quantity);
        let tick = self.tick;
        self.bus.emit(Event::ResourceRemoved {
            container: from_container,
            resource,
            quantity,
            tick,
        });

        let id = self
            .packages
            .insert(Package::new(from, to, resource, quantity, route));
        if let Some(net) = self.graph.network_mut(network) {
            net.packages.push(id);
        }
        self.mark_sent(network, to);
        self.bus.emit(Event::PackageCreated {
            package: id,
            from,
            to,
            resource,
            quantity,
            tick,
        });
        Ok(id)
    }

    /// Push one resource line from a node into its network. Fails without
    /// side effects when the node cannot output, no destination is
    /// eligible, or no route exists.
    pub fn push_from(
        &mut self,
        from: NodeId,
        resource: ResourceTypeId,
        quantity: Quantity,
    ) -> Result<PackageId, TransferError> {
        let node = self.nodes.get(from).ok_or(TransferError::NotAttached)?;
        let network = node.network.ok_or(TransferError::NotAttached)?;
        let container = self
            .containers
            .get(node.container)
            .ok_or(TransferError::NotAttached)?;
        if !node.can_output(&self.registry, container, resource, quantity) {
            return Err(TransferError::CannotOutput(resource));
        }
        let to = self
            .find_destination_for(network, resource, quantity, Some(from))
            .ok_or(TransferError::NoDestination(resource))?;
        self.create_transfer(network, from, to, resource, quantity)
    }

    /// Push a whole resource list from a node into its network. Every line
    /// must have an eligible destination before anything moves; on success
    /// each line becomes its own package.
    pub fn on_add_resources(
        &mut self,
        from: NodeId,
        resources: &crate::resources::ResourceList,
    ) -> Result<(), TransferError> {
        let node = self.nodes.get(from).ok_or(TransferError::NotAttached)?;
        let network = node.network.ok_or(TransferError::NotAttached)?;
        let container = self
            .containers
            .get(node.container)
            .ok_or(TransferError::NotAttached)?;
        for (resource, quantity) in resources.iter() {
            if !node.can_output(&self.registry, container, resource, quantity) {
                return Err(TransferError::CannotOutput(resource));
            }
            if self
                .find_destination_for(network, resource, quantity, Some(from))
                .is_none()
            {
                return Err(TransferError::NoDestination(resource));
            }
        }
        for (resource, quantity) in resources.iter() {
            self.push_from(from, resource, quantity)?;
        }
        Ok(())
    }

    /// Operator-issued transfer into a specific node, bypassing normal push
    /// routing. A source is selected elsewhere in the network, preferring
    /// force-output nodes.
    pub fn force_send_to(
        &mut self,
        to: NodeId,
        resource: ResourceTypeId,
        quantity: Quantity,
    ) -> Result<PackageId, TransferError> {
        let node = self.nodes.get(to).ok_or(TransferError::NotAttached)?;
        let network = node.network.ok_or(TransferError::NotAttached)?;
        let container = self
            .containers
            .get(node.container)
            .ok_or(TransferError::NotAttached)?;
        if !node.can_input(&self.registry, container, resource, quantity) {
            return Err(TransferError::CannotInput(resource));
        }
        let from = self
            .find_source_for(network, resource, quantity, Some(to))
            .ok_or(TransferError::NoSource(resource))?;
        self.create_transfer(network, from, to, resource, quantity)
    }

    /// Operator-issued transfer out of a specific node: its resources are
    /// sent to whichever node the network selects.
    pub fn force_take_from(
        &mut self,
        from: NodeId,
        resource: ResourceTypeId,
        quantity: Quantity,
    ) -> Result<PackageId, TransferError> {
        self.push_from(from, resource, quantity)
    }

    /// Release the reservations of every package targeting `node` and park
    /// those packages for rerouting. Called when a node or its container is
    /// removed mid-transit; cargo is never dropped or duplicated.
    pub(crate) fn orphan_packages_targeting(&mut self, node: NodeId) {
        let affected: Vec<PackageId> = self
            .packages
            .iter()
            .filter(|(_, p)| p.to == node)
            .map(|(id, _)| id)
            .collect();
        for id in affected {
            let (resource, quantity, had_reservation) = {
                let pack = &self.packages[id];
                (pack.resource, pack.quantity, pack.has_reservation)
            };
            if had_reservation
                && let Some(target) = self.nodes.get(node)
                && let Some(container) = self.containers.get_mut(target.container)
            {
                container.cancel_expectation(resource, quantity);
            }
            self.packages[id].has_reservation = false;
            self.park_package(id);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
