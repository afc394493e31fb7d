//! Scenario-building helpers shared by unit, integration, and property
//! tests. Enabled with the `test-utils` feature (and always in-crate tests).

use crate::container::ResourceContainer;
use crate::engine::Engine;
use crate::fixed::qty;
use crate::grid::{Direction, TileCoord};
use crate::id::{ContainerId, NodeId, ResourceTypeId};
use crate::registry::{Registry, RegistryBuilder, ResourceCategory};

/// A registry with one item resource ("iron_ingot") and one fluid
/// ("water"). Returns (registry, iron, water).
pub fn full_registry() -> (Registry, ResourceTypeId, ResourceTypeId) {
    let mut builder = RegistryBuilder::new();
    let iron = builder
        .register_resource("iron_ingot", ResourceCategory::Item)
        .expect("fresh builder");
    let water = builder
        .register_resource("water", ResourceCategory::Fluid)
        .expect("fresh builder");
    (builder.build(), iron, water)
}

/// A registry with a single item resource. Returns (registry, iron).
pub fn item_registry() -> (Registry, ResourceTypeId) {
    let (registry, iron, _) = full_registry();
    (registry, iron)
}

/// An empty engine over the item registry.
pub fn item_engine() -> Engine {
    Engine::new(item_registry().0)
}

/// An engine with a straight horizontal run of `len` item segments at
/// tiles (1, 0) ..= (len, 0). Returns (engine, iron).
pub fn straight_run(len: i32) -> (Engine, ResourceTypeId) {
    let (registry, iron) = item_registry();
    let mut engine = Engine::new(registry);
    for x in 1..=len {
        engine
            .place_segment(ResourceCategory::Item, TileCoord::new(x, 0))
            .expect("empty tiles");
    }
    (engine, iron)
}

/// Create a bounded item container and a node at (x, y) facing `dir`.
/// The node attaches immediately if a segment already faces it.
pub fn add_endpoint(
    engine: &mut Engine,
    x: i32,
    y: i32,
    dir: Direction,
    capacity: u32,
) -> (NodeId, ContainerId) {
    let container = engine.add_container(ResourceContainer::with_capacity(
        ResourceCategory::Item,
        qty(capacity),
    ));
    let node = engine
        .add_node(TileCoord::new(x, y), dir, container)
        .expect("container just created");
    (node, container)
}

/// Step the engine until no packages remain in flight, with a generous
/// bound so a stuck package fails the test instead of hanging it.
pub fn run_until_idle(engine: &mut Engine, max_ticks: u32) -> bool {
    for _ in 0..max_ticks {
        if engine.packages_in_flight() == 0 {
            return true;
        }
        engine.step();
    }
    engine.packages_in_flight() == 0
}
