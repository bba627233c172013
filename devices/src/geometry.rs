//! Planar grid coordinates; y grows downward, as on screen

use std::ops::Add;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Coord {
    pub x: i64,
    pub y: i64,
}

impl Coord {
    pub const ORIGIN: Coord = Coord { x: 0, y: 0 };

    pub fn new(x: i64, y: i64) -> Self {
        Coord { x, y }
    }

    pub fn manhattan(self, other: Coord) -> i64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// The four orthogonal neighbours
    pub fn neighbours(self) -> [Coord; 4] {
        Heading::ALL.map(|heading| self + heading.step())
    }
}

impl Add for Coord {
    type Output = Coord;

    fn add(self, other: Coord) -> Coord {
        Coord::new(self.x + other.x, self.y + other.y)
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Heading {
    North,
    East,
    South,
    West,
}

impl Heading {
    pub const ALL: [Heading; 4] = [Heading::North, Heading::East, Heading::South, Heading::West];

    pub fn left(self) -> Heading {
        match self {
            Heading::North => Heading::West,
            Heading::West => Heading::South,
            Heading::South => Heading::East,
            Heading::East => Heading::North,
        }
    }

    pub fn right(self) -> Heading {
        match self {
            Heading::North => Heading::East,
            Heading::East => Heading::South,
            Heading::South => Heading::West,
            Heading::West => Heading::North,
        }
    }

    pub fn step(self) -> Coord {
        match self {
            Heading::North => Coord::new(0, -1),
            Heading::East => Coord::new(1, 0),
            Heading::South => Coord::new(0, 1),
            Heading::West => Coord::new(-1, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turning_is_cyclic() {
        for heading in Heading::ALL {
            assert_eq!(heading.left().right(), heading);
            assert_eq!(heading.right().right().right().right(), heading);
        }
        assert_eq!(Heading::North.left(), Heading::West);
        assert_eq!(Heading::North.right(), Heading::East);
    }

    #[test]
    fn test_coord_math() {
        let a = Coord::new(1, -2);
        assert_eq!(a + Heading::North.step(), Coord::new(1, -3));
        assert_eq!(a.manhattan(Coord::new(-2, 2)), 7);
        assert_eq!(a.to_string(), "[1,-2]");
        assert!(Coord::ORIGIN.neighbours().contains(&Coord::new(-1, 0)));
    }
}
