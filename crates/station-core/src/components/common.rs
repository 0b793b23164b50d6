//! Grid and world coordinate types shared by every module.

use serde::{Deserialize, Serialize};

/// Integer grid coordinate of a station cell.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Vector2Int {
    pub x: i32,
    pub y: i32,
}

impl Vector2Int {
    pub const ZERO: Self = Self { x: 0, y: 0 };

    pub const NORTH: Self = Self { x: 0, y: -1 };
    pub const EAST: Self = Self { x: 1, y: 0 };
    pub const SOUTH: Self = Self { x: 0, y: 1 };
    pub const WEST: Self = Self { x: -1, y: 0 };

    /// Cardinal directions in sprite-mask bit order (north, east, south, west).
    pub const CARDINALS: [Self; 4] = [Self::NORTH, Self::EAST, Self::SOUTH, Self::WEST];

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn cardinal_neighbours(self) -> [Self; 4] {
        Self::CARDINALS.map(|d| self + d)
    }

    pub fn is_diagonal_step(self) -> bool {
        self.x != 0 && self.y != 0
    }

    /// Chebyshev (king-move) distance.
    pub fn chebyshev(self, other: Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn to_vector2(self) -> Vector2 {
        Vector2::new(self.x as f32, self.y as f32)
    }
}

impl std::ops::Add for Vector2Int {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl std::ops::Sub for Vector2Int {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl std::fmt::Display for Vector2Int {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Continuous world coordinate. One unit is one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: &Self) -> f32 {
        self.distance_squared(other).sqrt()
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self {
                x: self.x / len,
                y: self.y / len,
            }
        } else {
            Self::ZERO
        }
    }

    /// Grid cell containing this point.
    pub fn floor(&self) -> Vector2Int {
        Vector2Int::new(self.x.floor() as i32, self.y.floor() as i32)
    }
}

impl From<Vector2Int> for Vector2 {
    fn from(v: Vector2Int) -> Self {
        v.to_vector2()
    }
}

impl std::ops::Add for Vector2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl std::ops::Sub for Vector2 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl std::ops::Mul<f32> for Vector2 {
    type Output = Self;
    fn mul(self, scalar: f32) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}

/// RGB display colour for crew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_negative() {
        assert_eq!(Vector2::new(-0.5, 1.9).floor(), Vector2Int::new(-1, 1));
        assert_eq!(Vector2::new(3.0, 0.0).floor(), Vector2Int::new(3, 0));
    }

    #[test]
    fn test_cardinal_neighbours_order() {
        let n = Vector2Int::new(2, 2).cardinal_neighbours();
        assert_eq!(n[0], Vector2Int::new(2, 1));
        assert_eq!(n[1], Vector2Int::new(3, 2));
        assert_eq!(n[2], Vector2Int::new(2, 3));
        assert_eq!(n[3], Vector2Int::new(1, 2));
    }

    #[test]
    fn test_normalize_zero() {
        assert_eq!(Vector2::ZERO.normalize(), Vector2::ZERO);
        let v = Vector2::new(3.0, 4.0).normalize();
        assert!((v.length() - 1.0).abs() < 1e-6);
    }
}
