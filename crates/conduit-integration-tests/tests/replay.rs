//! Command-stream replay tests.
//!
//! The replication collaborator replays already-validated mutations through
//! the command queue. Two engines fed the same stream must converge, and a
//! command that no longer applies must be dropped without derailing the
//! tick.

use conduit_core::command::Command;
use conduit_core::engine::Engine;
use conduit_core::fixed::{Quantity, qty};
use conduit_core::grid::{Direction, TileCoord};
use conduit_core::registry::ResourceCategory;
use conduit_core::resources::ResourceList;
use conduit_core::test_utils::*;

const ITEM: ResourceCategory = ResourceCategory::Item;

fn tile(x: i32, y: i32) -> TileCoord {
    TileCoord::new(x, y)
}

#[test]
fn identical_streams_converge() {
    // Node ids are engine-local, so each replica builds its own stream the
    // same deterministic way; the observable outcomes must match exactly.
    let build = || -> (Quantity, Quantity, usize) {
        let (registry, iron) = item_registry();
        let mut engine = Engine::new(registry);
        for x in 1..=4 {
            engine.place_segment(ITEM, tile(x, 0)).unwrap();
        }
        let (producer, source) = add_endpoint(&mut engine, 0, 0, Direction::East, 100);
        let (_consumer, sink) = add_endpoint(&mut engine, 5, 0, Direction::West, 100);
        engine.container_add(source, iron, qty(20)).unwrap();

        engine.submit(Command::PushResources {
            from: producer,
            resources: ResourceList::of(iron, qty(5)),
        });
        for _ in 0..4 {
            engine.step();
        }
        engine.submit(Command::PushResources {
            from: producer,
            resources: ResourceList::of(iron, qty(3)),
        });
        for _ in 0..12 {
            engine.step();
        }
        (
            engine.quantity(source, iron),
            engine.quantity(sink, iron),
            engine.packages_in_flight(),
        )
    };

    let first = build();
    assert_eq!(first, build());
    assert_eq!(first.0, qty(12));
    assert_eq!(first.1, qty(8));
    assert_eq!(first.2, 0);
}

#[test]
fn stale_commands_are_dropped_not_fatal() {
    let (registry, _) = item_registry();
    let mut engine = Engine::new(registry);
    engine.place_segment(ITEM, tile(0, 0)).unwrap();

    // Placing over an occupied tile and removing a missing one: both are
    // stale replays and must not prevent the valid command that follows.
    engine.submit(Command::PlaceSegment {
        category: ITEM,
        tile: tile(0, 0),
    });
    engine.submit(Command::RemoveSegment {
        category: ITEM,
        tile: tile(9, 9),
    });
    engine.submit(Command::PlaceSegment {
        category: ITEM,
        tile: tile(1, 0),
    });
    engine.step();

    assert!(engine.graph().segment_at(ITEM, tile(1, 0)).is_some());
}

#[test]
fn operator_commands_route_through_queue() {
    let (registry, iron) = item_registry();
    let mut engine = Engine::new(registry);
    for x in 1..=3 {
        engine.place_segment(ITEM, tile(x, 0)).unwrap();
    }
    let (_giver, giver_box) = add_endpoint(&mut engine, 0, 0, Direction::East, 100);
    let (taker, taker_box) = add_endpoint(&mut engine, 4, 0, Direction::West, 100);
    engine.container_add(giver_box, iron, qty(8)).unwrap();

    engine.submit(Command::ForceSend {
        to: taker,
        resource: iron,
        quantity: qty(8),
    });
    for _ in 0..15 {
        engine.step();
    }
    assert_eq!(engine.quantity(taker_box, iron), qty(8));
    assert_eq!(engine.quantity(giver_box, iron), qty(0));
}
