//! Grid positions, the eight-way direction type, and bounding boxes.

use serde::{Deserialize, Serialize};

/// A position on the 2D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another position.
    pub fn manhattan_distance(&self, other: &Position) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    /// The position `steps` cells away in the given direction.
    pub fn stepped(&self, dir: Direction, steps: i32) -> Position {
        let (dx, dy) = dir.offset();
        Position::new(self.x + dx * steps, self.y + dy * steps)
    }
}

/// Eight-way direction, encoded in sixteenth turns (north = 0, one step =
/// a sixteenth of a full turn, so east = 4). Intercardinals are exactly
/// the encodings congruent to 2 mod 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    /// All eight directions, clockwise from north.
    pub fn all() -> [Direction; 8] {
        [
            Direction::North,
            Direction::NorthEast,
            Direction::East,
            Direction::SouthEast,
            Direction::South,
            Direction::SouthWest,
            Direction::West,
            Direction::NorthWest,
        ]
    }

    /// Sixteenth-turn encoding of this direction.
    pub fn value(self) -> u8 {
        match self {
            Direction::North => 0,
            Direction::NorthEast => 2,
            Direction::East => 4,
            Direction::SouthEast => 6,
            Direction::South => 8,
            Direction::SouthWest => 10,
            Direction::West => 12,
            Direction::NorthWest => 14,
        }
    }

    /// Decode a sixteenth-turn encoding. Returns `None` for values that do
    /// not name one of the eight directions.
    pub fn from_value(value: u8) -> Option<Direction> {
        match value {
            0 => Some(Direction::North),
            2 => Some(Direction::NorthEast),
            4 => Some(Direction::East),
            6 => Some(Direction::SouthEast),
            8 => Some(Direction::South),
            10 => Some(Direction::SouthWest),
            12 => Some(Direction::West),
            14 => Some(Direction::NorthWest),
            _ => None,
        }
    }

    /// The opposite direction (half turn).
    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::NorthEast => Direction::SouthWest,
            Direction::East => Direction::West,
            Direction::SouthEast => Direction::NorthWest,
            Direction::South => Direction::North,
            Direction::SouthWest => Direction::NorthEast,
            Direction::West => Direction::East,
            Direction::NorthWest => Direction::SouthEast,
        }
    }

    /// Whether this is one of the four intercardinal directions
    /// (encoding ≡ 2 mod 4).
    pub fn is_diagonal(self) -> bool {
        self.value() % 4 == 2
    }

    /// Unit grid offset for this direction. North is negative y.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
        }
    }
}

/// An axis-aligned bounding box over grid positions, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Position,
    pub max: Position,
}

impl BoundingBox {
    /// A degenerate box covering a single position.
    pub fn around(pos: Position) -> Self {
        Self { min: pos, max: pos }
    }

    /// Grow the box to include `pos`.
    pub fn include(&mut self, pos: Position) {
        self.min.x = self.min.x.min(pos.x);
        self.min.y = self.min.y.min(pos.y);
        self.max.x = self.max.x.max(pos.x);
        self.max.y = self.max.y.max(pos.y);
    }

    /// Return the box expanded by `margin` cells on every side.
    pub fn expand(&self, margin: i32) -> BoundingBox {
        BoundingBox {
            min: Position::new(self.min.x - margin, self.min.y - margin),
            max: Position::new(self.max.x + margin, self.max.y + margin),
        }
    }

    /// Whether `pos` lies inside the box.
    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= self.min.x && pos.x <= self.max.x && pos.y >= self.min.y && pos.y <= self.max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan_distance() {
        let a = Position::new(0, 0);
        let b = Position::new(3, 4);
        assert_eq!(a.manhattan_distance(&b), 7);

        let c = Position::new(-2, 5);
        let d = Position::new(3, -1);
        assert_eq!(c.manhattan_distance(&d), 11);

        assert_eq!(a.manhattan_distance(&a), 0);
    }

    #[test]
    fn stepped_walks_along_direction() {
        let origin = Position::new(10, 10);
        assert_eq!(origin.stepped(Direction::East, 3), Position::new(13, 10));
        assert_eq!(origin.stepped(Direction::North, 2), Position::new(10, 8));
        assert_eq!(origin.stepped(Direction::SouthWest, 1), Position::new(9, 11));
    }

    #[test]
    fn value_round_trips() {
        for dir in Direction::all() {
            assert_eq!(Direction::from_value(dir.value()), Some(dir));
        }
        assert_eq!(Direction::from_value(1), None);
        assert_eq!(Direction::from_value(16), None);
    }

    #[test]
    fn opposite_is_involution() {
        for dir in Direction::all() {
            assert_eq!(dir.opposite().opposite(), dir);
            assert_ne!(dir.opposite(), dir);
        }
    }

    #[test]
    fn diagonals_are_the_intercardinals() {
        assert!(Direction::NorthEast.is_diagonal());
        assert!(Direction::SouthEast.is_diagonal());
        assert!(Direction::SouthWest.is_diagonal());
        assert!(Direction::NorthWest.is_diagonal());
        assert!(!Direction::North.is_diagonal());
        assert!(!Direction::East.is_diagonal());
        assert!(!Direction::South.is_diagonal());
        assert!(!Direction::West.is_diagonal());
    }

    #[test]
    fn bounding_box_include_and_expand() {
        let mut bbox = BoundingBox::around(Position::new(2, 3));
        bbox.include(Position::new(-1, 7));
        bbox.include(Position::new(4, 0));

        assert_eq!(bbox.min, Position::new(-1, 0));
        assert_eq!(bbox.max, Position::new(4, 7));

        let grown = bbox.expand(2);
        assert_eq!(grown.min, Position::new(-3, -2));
        assert_eq!(grown.max, Position::new(6, 9));
        assert!(grown.contains(Position::new(0, 0)));
        assert!(!grown.contains(Position::new(10, 0)));
    }
}
