//! Mathematical types shared between client and authority.
//!
//! Axis convention: X forward, Y right, Z up. World units are centimeters.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// World-space vector: positions, velocities and acceleration intent.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// Forward axis.
    pub x: f32,
    /// Right axis.
    pub y: f32,
    /// Up axis.
    pub z: f32,
}

impl Vec3 {
    /// Builds a vector from its components.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Origin / no motion.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Straight up, the floor normal of flat ground.
    pub const UP: Self = Self::new(0.0, 0.0, 1.0);

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Squared length, for threshold checks.
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Distance between two points.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Squared distance, compared against squared error tolerances.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        (self - other).length_squared()
    }

    /// Same vector with the vertical component dropped.
    #[must_use]
    pub const fn horizontal(self) -> Self {
        Self::new(self.x, self.y, 0.0)
    }

    /// Replaces the vertical component.
    #[must_use]
    pub const fn with_z(self, z: f32) -> Self {
        Self::new(self.x, self.y, z)
    }

    /// True when every component is within `tolerance` of zero.
    #[must_use]
    pub fn is_nearly_zero(self, tolerance: f32) -> bool {
        self.x.abs() <= tolerance && self.y.abs() <= tolerance && self.z.abs() <= tolerance
    }

    /// True when no component is NaN or infinite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Unit vector in the same direction, or zero for a (near) zero vector.
    #[must_use]
    pub fn normalize_or_zero(self) -> Self {
        let len_sq = self.length_squared();
        if len_sq <= 1.0e-8 {
            Self::ZERO
        } else {
            self * (1.0 / len_sq.sqrt())
        }
    }

    /// Scales the vector down so its length does not exceed `max_length`.
    #[must_use]
    pub fn clamp_length(self, max_length: f32) -> Self {
        let len_sq = self.length_squared();
        if len_sq > max_length * max_length && len_sq > 0.0 {
            self * (max_length / len_sq.sqrt())
        } else {
            self
        }
    }

    /// Linear interpolation towards `other`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// View orientation in degrees.
///
/// Yaw turns around Z (0 = facing +X), pitch looks up (+) or down (-).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct ViewRotation {
    /// Turn around the up axis.
    pub yaw: f32,
    /// Look up (+) or down (-).
    pub pitch: f32,
}

impl ViewRotation {
    /// Builds a rotation from yaw and pitch in degrees.
    #[must_use]
    pub const fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }

    /// Horizontal facing direction (unit length, Z = 0).
    #[must_use]
    pub fn forward(self) -> Vec3 {
        let (sin, cos) = self.yaw.to_radians().sin_cos();
        Vec3::new(cos, sin, 0.0)
    }

    /// Horizontal right-hand direction (unit length, Z = 0).
    #[must_use]
    pub fn right(self) -> Vec3 {
        let (sin, cos) = self.yaw.to_radians().sin_cos();
        Vec3::new(-sin, cos, 0.0)
    }

    /// Largest absolute yaw/pitch difference in degrees, with yaw wrapped to [0, 180].
    #[must_use]
    pub fn max_difference(self, other: Self) -> f32 {
        let yaw = (self.yaw - other.yaw).rem_euclid(360.0);
        let yaw = if yaw > 180.0 { 360.0 - yaw } else { yaw };
        yaw.max((self.pitch - other.pitch).abs())
    }
}
