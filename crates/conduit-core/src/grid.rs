//! Tile-grid geometry: coordinates, cardinal directions, and the
//! fixed-point world positions used by in-flight packages.

use crate::fixed::Fixed64;
use serde::{Deserialize, Serialize};

/// A position on the 2D tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another tile.
    pub fn manhattan_distance(&self, other: &TileCoord) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    /// The adjacent tile in the given direction.
    pub fn neighbor(&self, dir: Direction) -> TileCoord {
        let (dx, dy) = dir.offset();
        TileCoord::new(self.x + dx, self.y + dy)
    }

    /// Direction from this tile to an adjacent tile, if they are adjacent.
    pub fn direction_to(&self, other: &TileCoord) -> Option<Direction> {
        Direction::all()
            .into_iter()
            .find(|d| self.neighbor(*d) == *other)
    }
}

/// Cardinal directions. Index order matches [`Direction::all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// All four cardinal directions.
    pub fn all() -> [Direction; 4] {
        [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ]
    }

    /// Offset for this direction.
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }

    /// The opposite direction.
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    /// Stable index for per-direction arrays.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Inverse of [`Direction::index`].
    pub fn from_index(i: usize) -> Direction {
        Direction::all()[i]
    }
}

/// A fixed-point position in tile units. Packages travel in world space so
/// that per-tick speeds below one tile remain representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: Fixed64,
    pub y: Fixed64,
}

impl WorldPos {
    pub fn new(x: Fixed64, y: Fixed64) -> Self {
        Self { x, y }
    }

    /// The center of a tile.
    pub fn tile_center(tile: TileCoord) -> Self {
        Self {
            x: Fixed64::from_num(tile.x),
            y: Fixed64::from_num(tile.y),
        }
    }

    /// The tile this position falls in (nearest tile center).
    pub fn containing_tile(&self) -> TileCoord {
        TileCoord::new(
            self.x.round().to_num::<i32>(),
            self.y.round().to_num::<i32>(),
        )
    }

    /// Manhattan distance to another world position.
    pub fn manhattan_distance(&self, other: &WorldPos) -> Fixed64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Advance this position by `distance` in the given direction.
    pub fn advanced(&self, dir: Direction, distance: Fixed64) -> WorldPos {
        let (dx, dy) = dir.offset();
        WorldPos {
            x: self.x + distance * Fixed64::from_num(dx),
            y: self.y + distance * Fixed64::from_num(dy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64;

    #[test]
    fn manhattan_distance() {
        let a = TileCoord::new(0, 0);
        let b = TileCoord::new(3, -4);
        assert_eq!(a.manhattan_distance(&b), 7);
        assert_eq!(b.manhattan_distance(&a), 7);
    }

    #[test]
    fn neighbor_round_trip() {
        let t = TileCoord::new(5, 5);
        for dir in Direction::all() {
            assert_eq!(t.neighbor(dir).neighbor(dir.opposite()), t);
        }
    }

    #[test]
    fn direction_to_adjacent() {
        let t = TileCoord::new(0, 0);
        assert_eq!(
            t.direction_to(&TileCoord::new(1, 0)),
            Some(Direction::East)
        );
        assert_eq!(
            t.direction_to(&TileCoord::new(0, -1)),
            Some(Direction::North)
        );
        assert_eq!(t.direction_to(&TileCoord::new(2, 0)), None);
        assert_eq!(t.direction_to(&t), None);
    }

    #[test]
    fn direction_index_round_trip() {
        for dir in Direction::all() {
            assert_eq!(Direction::from_index(dir.index()), dir);
        }
    }

    #[test]
    fn world_pos_advance_and_distance() {
        let start = WorldPos::tile_center(TileCoord::new(0, 0));
        let quarter = f64_to_fixed64(0.25);
        let moved = start.advanced(Direction::East, quarter);
        assert_eq!(moved.x, quarter);
        assert_eq!(moved.y, Fixed64::ZERO);
        assert_eq!(
            start.manhattan_distance(&moved),
            quarter
        );
    }

    #[test]
    fn containing_tile_rounds_to_nearest() {
        let pos = WorldPos::new(f64_to_fixed64(2.75), f64_to_fixed64(-0.25));
        assert_eq!(pos.containing_tile(), TileCoord::new(3, 0));
    }
}
