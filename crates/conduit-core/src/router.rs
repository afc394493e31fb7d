//! Shortest-path routing over the junction graph.
//!
//! The router never iterates individual grid tiles: it expands junctions
//! using the per-direction distances the network graph maintains, with a
//! Manhattan-distance heuristic (admissible on an axis-aligned grid). The
//! open set pops the lowest f = g + h; ties break by discovery order. An
//! unreachable destination yields `None`, which callers treat as "cannot
//! transfer now", never as an error.

use crate::grid::{Direction, TileCoord};
use crate::id::SegmentId;
use crate::network::NetworkGraph;
use crate::node::ResourceNode;
use serde::{Deserialize, Serialize};
use std::collections::{BinaryHeap, HashMap, HashSet};

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// One waypoint of a route: a tile and the direction toward the next
/// waypoint. The final waypoint has no direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStep {
    pub tile: TileCoord,
    pub next_dir: Option<Direction>,
}

/// An ordered, immutable sequence of waypoints. Computed once, consumed
/// stepwise by the transit simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    steps: Vec<RouteStep>,
}

impl Route {
    fn new(steps: Vec<RouteStep>) -> Self {
        debug_assert!(steps.len() >= 2, "a route spans at least two cells");
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RouteStep> {
        self.steps.get(index)
    }

    pub fn last(&self) -> &RouteStep {
        self.steps.last().expect("routes are never empty")
    }

    pub fn steps(&self) -> &[RouteStep] {
        &self.steps
    }

    /// Total tile length: the sum of the axis-aligned leg lengths.
    pub fn total_length(&self) -> u32 {
        self.steps
            .windows(2)
            .map(|pair| pair[0].tile.manhattan_distance(&pair[1].tile))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// A* search
// ---------------------------------------------------------------------------

/// An open-set entry. Ordered so the binary max-heap pops the entry with
/// the lowest f, breaking ties by earliest discovery.
#[derive(Debug, PartialEq, Eq)]
struct OpenEntry {
    f: u32,
    seq: u64,
    seg: SegmentId,
    g: u32,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.f, other.seq).cmp(&(self.f, self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn heuristic(from: TileCoord, goal: TileCoord) -> u32 {
    from.manhattan_distance(&goal)
}

/// Route from a source node into the network and on to the destination
/// node. Prepends the "exit source cell" waypoint.
pub fn route_between(
    graph: &NetworkGraph,
    source: &ResourceNode,
    dest: &ResourceNode,
) -> Option<Route> {
    let exit = RouteStep {
        tile: source.tile,
        next_dir: Some(source.dir),
    };
    let core = route_core(graph, source.segment_tile(), dest)?;
    let mut steps = Vec::with_capacity(core.len() + 1);
    steps.push(exit);
    steps.extend(core);
    Some(Route::new(steps))
}

/// Route from an arbitrary position and heading (the re-route entry
/// point) to the destination node. When the starting tile is not itself a
/// segment -- a package still leaving its source cell -- the first hop in
/// the direction of travel is used to enter the network.
pub fn route_from(
    graph: &NetworkGraph,
    start_tile: TileCoord,
    heading: Direction,
    dest: &ResourceNode,
) -> Option<Route> {
    if graph.segment_at(dest.category, start_tile).is_some() {
        return route_core(graph, start_tile, dest).map(Route::new);
    }
    let hop = start_tile.neighbor(heading);
    let core = route_core(graph, hop, dest)?;
    let mut steps = Vec::with_capacity(core.len() + 1);
    steps.push(RouteStep {
        tile: start_tile,
        next_dir: Some(heading),
    });
    steps.extend(core);
    Some(Route::new(steps))
}

/// The shared middle of a route: from the segment at `start_tile` to the
/// destination node's cell, ending with the "enter destination cell"
/// waypoint.
fn route_core(
    graph: &NetworkGraph,
    start_tile: TileCoord,
    dest: &ResourceNode,
) -> Option<Vec<RouteStep>> {
    let start_seg = graph.segment_at(dest.category, start_tile)?;
    let goal_seg = graph.segment_at(dest.category, dest.segment_tile())?;
    let into_dest = Some(dest.dir.opposite());
    let enter = RouteStep {
        tile: dest.tile,
        next_dir: None,
    };

    // Starting at the destination's own cell: leave the source, enter the
    // destination, done.
    if start_seg == goal_seg {
        return Some(vec![
            RouteStep {
                tile: start_tile,
                next_dir: into_dest,
            },
            enter,
        ]);
    }

    // Different networks can never connect.
    let start = graph.segment(start_seg)?;
    let goal = graph.segment(goal_seg)?;
    if start.network != goal.network {
        return None;
    }
    let goal_tile = goal.tile;

    let mut open = BinaryHeap::new();
    let mut closed: HashSet<SegmentId> = HashSet::new();
    let mut g_score: HashMap<SegmentId, u32> = HashMap::new();
    let mut parent: HashMap<SegmentId, (SegmentId, Direction)> = HashMap::new();
    let mut seq = 0u64;

    g_score.insert(start_seg, 0);
    open.push(OpenEntry {
        f: heuristic(start_tile, goal_tile),
        seq,
        seg: start_seg,
        g: 0,
    });

    let mut found = false;
    while let Some(entry) = open.pop() {
        if entry.seg == goal_seg {
            found = true;
            break;
        }
        if !closed.insert(entry.seg) {
            continue;
        }
        // A stale heap entry for an already-improved node.
        if g_score.get(&entry.seg).copied() != Some(entry.g) {
            continue;
        }

        let connections = graph.connections_from(entry.seg);
        for (dir, neighbor, dist) in connections.iter() {
            if closed.contains(&neighbor) {
                continue;
            }
            let tentative = entry.g + dist;
            if g_score
                .get(&neighbor)
                .is_none_or(|&existing| tentative < existing)
            {
                g_score.insert(neighbor, tentative);
                parent.insert(neighbor, (entry.seg, dir));
                seq += 1;
                let neighbor_tile = graph.segment(neighbor)?.tile;
                open.push(OpenEntry {
                    f: tentative + heuristic(neighbor_tile, goal_tile),
                    seq,
                    seg: neighbor,
                    g: tentative,
                });
            }
        }
    }

    if !found {
        return None;
    }

    // Walk parent pointers goal-to-start, then reverse into waypoints.
    let mut chain: Vec<(SegmentId, Direction)> = Vec::new();
    let mut current = goal_seg;
    while let Some(&(prev, dir)) = parent.get(&current) {
        chain.push((current, dir));
        current = prev;
    }
    chain.reverse();

    let mut steps = Vec::with_capacity(chain.len() + 3);
    let mut cursor_tile = start_tile;
    for (seg, dir) in chain {
        steps.push(RouteStep {
            tile: cursor_tile,
            next_dir: Some(dir),
        });
        cursor_tile = graph.segment(seg)?.tile;
    }
    steps.push(RouteStep {
        tile: cursor_tile,
        next_dir: into_dest,
    });
    steps.push(enter);
    Some(steps)
}

// ===========================================================================
// Tests
// ===========================================================================
