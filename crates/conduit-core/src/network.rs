//! The network graph: segments, junctions, and incremental maintenance.
//!
//! Transport segments are single grid cells linked to same-category
//! neighbors. A segment is classified as a **junction** (a vertex of the
//! routing graph) when it branches (3 or 4 links), turns a corner (exactly
//! 2 non-opposite links), or has any attached node. Each junction caches,
//! per direction, the nearest other junction and the tile distance to it;
//! the cache is rebuilt only when local topology changes, never per tick.
//!
//! Placing a segment that bridges two networks merges the smaller into the
//! larger. Removing a bridge segment recomputes connected components over
//! the affected region and splits the network, keeping the identity of the
//! largest component.

use crate::fixed::Fixed64;
use crate::grid::{Direction, TileCoord};
use crate::id::{NetworkId, NodeId, SegmentId};
use crate::registry::ResourceCategory;
use crate::transit::PackageList;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors from network graph operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("a segment of this category already occupies {0:?}")]
    Occupied(TileCoord),
    #[error("no segment at {0:?}")]
    NoSegment(TileCoord),
    #[error("network not found")]
    NetworkNotFound,
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
}

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

/// One grid cell of transport medium.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub tile: TileCoord,
    pub category: ResourceCategory,
    pub network: NetworkId,
    /// Same-category neighbor segments, indexed by [`Direction::index`].
    pub links: [Option<SegmentId>; 4],
    /// Nodes attached on each side, indexed by the direction from this
    /// segment toward the node's tile.
    pub attached: [Vec<NodeId>; 4],
}

impl Segment {
    fn new(tile: TileCoord, category: ResourceCategory, network: NetworkId) -> Self {
        Self {
            tile,
            category,
            network,
            links: [None; 4],
            attached: Default::default(),
        }
    }

    /// Number of linked neighbor segments.
    pub fn link_count(&self) -> usize {
        self.links.iter().filter(|l| l.is_some()).count()
    }

    /// Whether any node is attached on any side.
    pub fn has_attached_nodes(&self) -> bool {
        self.attached.iter().any(|side| !side.is_empty())
    }

    /// Whether this segment is a routing-graph vertex: a 3- or 4-way
    /// branch, a corner, or a segment with an attached node.
    pub fn is_junction_shape(&self) -> bool {
        if self.has_attached_nodes() {
            return true;
        }
        match self.link_count() {
            0 | 1 => false,
            2 => {
                let straight = (self.links[Direction::North.index()].is_some()
                    && self.links[Direction::South.index()].is_some())
                    || (self.links[Direction::East.index()].is_some()
                        && self.links[Direction::West.index()].is_some());
                !straight
            }
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Junction connection table
// ---------------------------------------------------------------------------

/// Per-direction nearest junction and tile distance, cached on a junction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connections {
    entries: [Option<(SegmentId, u32)>; 4],
}

impl Connections {
    pub fn get(&self, dir: Direction) -> Option<(SegmentId, u32)> {
        self.entries[dir.index()]
    }

    pub fn set(&mut self, dir: Direction, value: Option<(SegmentId, u32)>) {
        self.entries[dir.index()] = value;
    }

    /// Iterate the populated directions.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, SegmentId, u32)> + '_ {
        Direction::all()
            .into_iter()
            .filter_map(|d| self.entries[d.index()].map(|(s, dist)| (d, s, dist)))
    }
}

// ---------------------------------------------------------------------------
// Networks
// ---------------------------------------------------------------------------

/// A maximal connected set of segments plus everything riding on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub category: ResourceCategory,
    pub segments: BTreeSet<SegmentId>,
    /// Junction cache: segment -> per-direction nearest junction.
    pub junctions: BTreeMap<SegmentId, Connections>,
    /// Attached endpoint nodes, in attachment order.
    pub attached_nodes: Vec<NodeId>,
    /// Round-robin memory: nodes already served this rotation.
    pub sent_to: Vec<NodeId>,
    /// In-flight packages, in insertion order.
    pub packages: PackageList,
    /// Package travel speed in tiles per tick.
    pub speed: Fixed64,
}

impl Network {
    pub fn new(category: ResourceCategory) -> Self {
        Self {
            category,
            segments: BTreeSet::new(),
            junctions: BTreeMap::new(),
            attached_nodes: Vec::new(),
            sent_to: Vec::new(),
            packages: PackageList::new(),
            speed: Fixed64::ONE,
        }
    }

    /// Reservation always targets a physical destination container; the
    /// aggregate facade cannot hold expectations.
    pub fn expect(&self) -> Result<(), NetworkError> {
        Err(NetworkError::InvalidOperation(
            "routing networks cannot expect resources",
        ))
    }
}

// ---------------------------------------------------------------------------
// Mutation reports
// ---------------------------------------------------------------------------

/// What a segment placement did, for event emission by the caller.
#[derive(Debug)]
pub struct PlacementReport {
    pub segment: SegmentId,
    pub network: NetworkId,
    /// Networks absorbed into `network` by this placement.
    pub absorbed: Vec<NetworkId>,
}

/// What a segment removal did.
#[derive(Debug)]
pub struct RemovalReport {
    pub tile: TileCoord,
    pub network: NetworkId,
    /// Nodes that were attached to the removed segment.
    pub detached_nodes: Vec<NodeId>,
    /// New networks created because the removal disconnected the graph.
    pub split_off: Vec<NetworkId>,
}

// ---------------------------------------------------------------------------
// NetworkGraph
// ---------------------------------------------------------------------------

/// Owns every segment and network. All cross-references are arena ids; the
/// tile index resolves grid positions per category.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NetworkGraph {
    segments: slotmap::SlotMap<SegmentId, Segment>,
    networks: slotmap::SlotMap<NetworkId, Network>,
    tile_index: HashMap<(ResourceCategory, TileCoord), SegmentId>,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn segment_at(&self, category: ResourceCategory, tile: TileCoord) -> Option<SegmentId> {
        self.tile_index.get(&(category, tile)).copied()
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id)
    }

    pub fn network(&self, id: NetworkId) -> Option<&Network> {
        self.networks.get(id)
    }

    pub fn network_mut(&mut self, id: NetworkId) -> Option<&mut Network> {
        self.networks.get_mut(id)
    }

    pub fn network_ids(&self) -> Vec<NetworkId> {
        self.networks.keys().collect()
    }

    /// Whether the segment is currently registered as a junction.
    pub fn is_junction(&self, id: SegmentId) -> bool {
        self.segments
            .get(id)
            .and_then(|s| self.networks.get(s.network))
            .is_some_and(|n| n.junctions.contains_key(&id))
    }

    /// The cached connections of a junction.
    pub fn connections(&self, id: SegmentId) -> Option<&Connections> {
        let seg = self.segments.get(id)?;
        self.networks.get(seg.network)?.junctions.get(&id)
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Add a segment at `tile`, linking it to same-category neighbors and
    /// merging any networks it bridges (smaller absorbed into larger).
    pub fn add_segment(
        &mut self,
        category: ResourceCategory,
        tile: TileCoord,
    ) -> Result<PlacementReport, NetworkError> {
        if self.tile_index.contains_key(&(category, tile)) {
            return Err(NetworkError::Occupied(tile));
        }

        // Link to existing neighbors and collect their networks in
        // direction order for deterministic merge selection.
        let mut neighbor_networks: Vec<NetworkId> = Vec::new();
        let mut links: [Option<SegmentId>; 4] = [None; 4];
        for dir in Direction::all() {
            if let Some(&other) = self.tile_index.get(&(category, tile.neighbor(dir))) {
                links[dir.index()] = Some(other);
                let net = self.segments[other].network;
                if !neighbor_networks.contains(&net) {
                    neighbor_networks.push(net);
                }
            }
        }

        // Pick the surviving network: the largest among the bridged ones,
        // or a fresh one for an isolated segment.
        let target = match neighbor_networks
            .iter()
            .copied()
            .max_by_key(|&n| self.networks[n].segments.len())
        {
            Some(net) => net,
            None => self.networks.insert(Network::new(category)),
        };

        let id = self.segments.insert(Segment::new(tile, category, target));
        self.segments[id].links = links;
        self.tile_index.insert((category, tile), id);
        self.networks[target].segments.insert(id);

        // Point neighbors back at the new segment.
        for dir in Direction::all() {
            if let Some(other) = links[dir.index()] {
                self.segments[other].links[dir.opposite().index()] = Some(id);
            }
        }

        // Absorb the other bridged networks.
        let absorbed: Vec<NetworkId> = neighbor_networks
            .into_iter()
            .filter(|&n| n != target)
            .collect();
        for &other in &absorbed {
            self.merge_into(target, other);
        }

        // Reclassify the new segment and its neighbors, then refresh the
        // junctions whose corridors now run through the new tile (a plain
        // corridor placement changes no shapes but can bridge two dead
        // ends into one longer corridor).
        self.update_junction(id);
        for dir in Direction::all() {
            if let Some(other) = links[dir.index()] {
                self.update_junction(other);
            }
        }
        let affected: Vec<SegmentId> = Direction::all()
            .into_iter()
            .filter_map(|d| self.walk_to_junction(id, d).map(|(j, _)| j))
            .collect();
        for junction in affected {
            if self.is_junction(junction) {
                self.refresh_connections(junction);
            }
        }

        Ok(PlacementReport {
            segment: id,
            network: target,
            absorbed,
        })
    }

    /// Absorb every segment, junction, node, and in-flight package of
    /// `other` into `target`. The emptied network stays allocated and inert.
    fn merge_into(&mut self, target: NetworkId, other: NetworkId) {
        debug_assert_ne!(target, other);
        let Some(source_ref) = self.networks.get_mut(other) else {
            return;
        };
        let category = source_ref.category;
        let mut source = std::mem::replace(source_ref, Network::new(category));
        for &seg in &source.segments {
            self.segments[seg].network = target;
        }
        let dest = &mut self.networks[target];
        dest.segments.append(&mut source.segments);
        dest.junctions.append(&mut source.junctions);
        for node in source.attached_nodes {
            if !dest.attached_nodes.contains(&node) {
                dest.attached_nodes.push(node);
            }
        }
        dest.packages.absorb(source.packages);
        // Round-robin memory of the absorbed network is not carried over.
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Remove the segment at `tile`. Drops its junction entry, detaches its
    /// nodes, refreshes every junction whose cached connections ran through
    /// it, and splits the network when the segment was a bridge.
    pub fn remove_segment(
        &mut self,
        category: ResourceCategory,
        tile: TileCoord,
    ) -> Result<RemovalReport, NetworkError> {
        let id = self
            .tile_index
            .remove(&(category, tile))
            .ok_or(NetworkError::NoSegment(tile))?;

        // Junctions reachable along each axis see their corridors change;
        // collect them before links are torn down.
        let affected: Vec<SegmentId> = Direction::all()
            .into_iter()
            .filter_map(|d| self.walk_to_junction(id, d).map(|(j, _)| j))
            .collect();

        let Some(segment) = self.segments.remove(id) else {
            return Err(NetworkError::NoSegment(tile));
        };
        let network = segment.network;
        let detached_nodes: Vec<NodeId> = segment.attached.iter().flatten().copied().collect();

        // Unlink neighbors.
        let mut neighbors: Vec<SegmentId> = Vec::new();
        for dir in Direction::all() {
            if let Some(other) = segment.links[dir.index()] {
                self.segments[other].links[dir.opposite().index()] = None;
                neighbors.push(other);
            }
        }

        {
            let net = &mut self.networks[network];
            net.segments.remove(&id);
            net.junctions.remove(&id);
            net.attached_nodes.retain(|n| !detached_nodes.contains(n));
            net.sent_to.retain(|n| !detached_nodes.contains(n));
        }

        // Reclassify the segments whose local shape changed, then refresh
        // the junctions whose corridors ran through the removed tile.
        for &other in &neighbors {
            self.update_junction(other);
        }
        for j in affected {
            if j != id && self.is_junction(j) {
                self.refresh_connections(j);
            }
        }

        let split_off = self.split_components(network, &neighbors);

        Ok(RemovalReport {
            tile,
            network,
            detached_nodes,
            split_off,
        })
    }

    /// Bounded connected-components pass over the former neighbors of a
    /// removed segment. Every component not connected to the largest one is
    /// moved into a fresh network. Returns the new network ids.
    fn split_components(
        &mut self,
        network: NetworkId,
        seeds: &[SegmentId],
    ) -> Vec<NetworkId> {
        if seeds.len() < 2 {
            return Vec::new();
        }

        // Flood fill from each seed that is not already claimed.
        let mut components: Vec<BTreeSet<SegmentId>> = Vec::new();
        for &seed in seeds {
            if components.iter().any(|c| c.contains(&seed)) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut queue = VecDeque::from([seed]);
            while let Some(current) = queue.pop_front() {
                if !component.insert(current) {
                    continue;
                }
                for link in self.segments[current].links.into_iter().flatten() {
                    if !component.contains(&link) {
                        queue.push_back(link);
                    }
                }
            }
            components.push(component);
        }

        if components.len() < 2 {
            return Vec::new();
        }

        // The largest component keeps the network identity; ties go to the
        // earliest-discovered component.
        let mut keep = 0;
        for (i, component) in components.iter().enumerate() {
            if component.len() > components[keep].len() {
                keep = i;
            }
        }

        let category = self.networks[network].category;
        let speed = self.networks[network].speed;
        let mut split_off = Vec::new();
        for (i, component) in components.into_iter().enumerate() {
            if i == keep {
                continue;
            }
            let new_id = self.networks.insert(Network::new(category));
            let mut moved_nodes: Vec<NodeId> = Vec::new();
            for &seg in &component {
                self.segments[seg].network = new_id;
                moved_nodes.extend(self.segments[seg].attached.iter().flatten().copied());
                self.networks[network].segments.remove(&seg);
                if let Some(connections) = self.networks[network].junctions.remove(&seg) {
                    self.networks[new_id].junctions.insert(seg, connections);
                }
            }
            {
                let old = &mut self.networks[network];
                old.attached_nodes.retain(|n| !moved_nodes.contains(n));
                old.sent_to.retain(|n| !moved_nodes.contains(n));
            }
            let new = &mut self.networks[new_id];
            new.segments = component;
            new.attached_nodes = moved_nodes;
            new.speed = speed;
            split_off.push(new_id);
        }
        split_off
    }

    // -----------------------------------------------------------------------
    // Junction maintenance
    // -----------------------------------------------------------------------

    /// Reclassify a segment after a local topology change. Promotion
    /// computes and stores its connections (and the symmetric entries on
    /// the junctions it reaches); demotion drops its entry and re-walks its
    /// former neighbors.
    pub fn update_junction(&mut self, id: SegmentId) {
        let Some(segment) = self.segments.get(id) else {
            return;
        };
        let network = segment.network;

        if self.segments[id].is_junction_shape() {
            self.refresh_connections(id);
        } else if let Some(old) = self.networks[network].junctions.remove(&id) {
            // Demoted: junctions it pointed at re-walk through it.
            for (_, neighbor, _) in old.iter() {
                if self.is_junction(neighbor) {
                    self.refresh_connections(neighbor);
                }
            }
        }
    }

    /// Recompute and store the connection table for a junction, updating
    /// the reverse entries on each junction found.
    fn refresh_connections(&mut self, id: SegmentId) {
        let network = self.segments[id].network;
        let mut connections = Connections::default();
        for dir in Direction::all() {
            let found = self.walk_to_junction(id, dir);
            connections.set(dir, found);
            if let Some((other, dist)) = found {
                // Junctions discover each other: keep the reverse edge
                // current without a second walk.
                let other_net = self.segments[other].network;
                let entry = self.networks[other_net]
                    .junctions
                    .entry(other)
                    .or_default();
                entry.set(dir.opposite(), Some((id, dist)));
            }
        }
        self.networks[network].junctions.insert(id, connections);
    }

    /// Walk from `start` in `dir` through consecutive non-junction
    /// segments, counting tiles, until another junction or a dead end.
    /// Bounded by the local corridor length; never iterates the grid.
    pub fn walk_to_junction(&self, start: SegmentId, dir: Direction) -> Option<(SegmentId, u32)> {
        let mut current = self.segments.get(start)?.links[dir.index()];
        let mut dist = 1u32;
        while let Some(seg) = current {
            if self.segments[seg].is_junction_shape() {
                return if seg == start { None } else { Some((seg, dist)) };
            }
            current = self.segments[seg].links[dir.index()];
            dist += 1;
        }
        None
    }

    /// The connection table to use for a route starting at `id`: the cached
    /// table when `id` is a junction, otherwise a transient walk from the
    /// corridor segment.
    pub fn connections_from(&self, id: SegmentId) -> Connections {
        if let Some(cached) = self.connections(id) {
            return cached.clone();
        }
        let mut connections = Connections::default();
        for dir in Direction::all() {
            connections.set(dir, self.walk_to_junction(id, dir));
        }
        connections
    }

    // -----------------------------------------------------------------------
    // Node attachment
    // -----------------------------------------------------------------------

    /// Attach a node to the segment it faces. `toward_node` is the
    /// direction from the segment to the node's tile. Returns the network
    /// the node joined.
    pub fn attach_node(
        &mut self,
        segment: SegmentId,
        toward_node: Direction,
        node: NodeId,
    ) -> Result<NetworkId, NetworkError> {
        let seg = self
            .segments
            .get_mut(segment)
            .ok_or(NetworkError::NetworkNotFound)?;
        let network = seg.network;
        seg.attached[toward_node.index()].push(node);
        let net = &mut self.networks[network];
        if !net.attached_nodes.contains(&node) {
            net.attached_nodes.push(node);
        }
        // Any attached node makes the segment a junction.
        self.update_junction(segment);
        Ok(network)
    }

    /// Detach a node from a segment, demoting the junction if nothing else
    /// qualifies it. Returns the network the node left.
    pub fn detach_node(
        &mut self,
        segment: SegmentId,
        node: NodeId,
    ) -> Result<NetworkId, NetworkError> {
        let seg = self
            .segments
            .get_mut(segment)
            .ok_or(NetworkError::NetworkNotFound)?;
        let network = seg.network;
        for side in &mut seg.attached {
            side.retain(|&n| n != node);
        }
        let net = &mut self.networks[network];
        net.attached_nodes.retain(|&n| n != node);
        net.sent_to.retain(|&n| n != node);
        self.update_junction(segment);
        Ok(network)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
