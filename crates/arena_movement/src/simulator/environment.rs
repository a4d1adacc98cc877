//! # Environment Queries
//!
//! The simulator never owns geometry. It asks an [`Environment`] a handful
//! of synchronous spatial questions; implementations must answer from
//! static or kinematic data only, and identically on client and authority.

use arena_shared::{BaseId, Vec3};

/// Result of moving a point through the environment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveClip {
    /// Where the move ended.
    pub position: Vec3,
    /// Normal of the wall that stopped the move, if any.
    pub wall_normal: Option<Vec3>,
}

/// Spatial queries the simulator relies on.
pub trait Environment: Send + Sync {
    /// Height of the walkable floor under `position`, if there is one.
    fn floor_height(&self, position: Vec3) -> Option<f32>;

    /// Returns true if `position` is inside a liquid volume.
    fn is_in_liquid(&self, position: Vec3) -> bool;

    /// Moves from `from` towards `to`, stopping at blocking walls.
    fn clip_move(&self, from: Vec3, to: Vec3) -> MoveClip;

    /// Normal of a wall within `distance` of `position`, pointing away from it.
    fn wall_contact(&self, position: Vec3, distance: f32) -> Option<Vec3>;

    /// Movement base under `position`, if the floor there is one.
    fn base_at(&self, position: Vec3) -> Option<BaseId>;
}

/// Axis-aligned raised floor a character can stand on.
///
/// Platforms float: they are landed on from above and can be walked off,
/// their sides do not block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Platform {
    /// Base reference reported while standing on it.
    pub id: BaseId,
    /// Minimum X/Y corner (Z ignored).
    pub min: Vec3,
    /// Maximum X/Y corner (Z ignored).
    pub max: Vec3,
    /// Height of the top surface.
    pub height: f32,
}

impl Platform {
    fn covers(&self, position: Vec3) -> bool {
        position.x >= self.min.x
            && position.x <= self.max.x
            && position.y >= self.min.y
            && position.y <= self.max.y
    }
}

/// Axis-aligned liquid volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LiquidVolume {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl LiquidVolume {
    fn contains(&self, position: Vec3) -> bool {
        position.x >= self.min.x
            && position.x <= self.max.x
            && position.y >= self.min.y
            && position.y <= self.max.y
            && position.z >= self.min.z
            && position.z <= self.max.z
    }
}

/// Rectangular walled arena with a flat floor, platforms and liquids.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatArena {
    /// Height of the arena floor.
    pub floor_z: f32,
    /// Minimum X/Y of the walls (Z ignored).
    pub min: Vec3,
    /// Maximum X/Y of the walls (Z ignored).
    pub max: Vec3,
    /// Raised floors.
    pub platforms: Vec<Platform>,
    /// Liquid volumes.
    pub liquids: Vec<LiquidVolume>,
    /// Highest ledge a character steps onto instead of passing under.
    pub step_height: f32,
}

impl FlatArena {
    /// Square arena of `half_extent` around the origin with its floor at zero.
    #[must_use]
    pub fn square(half_extent: f32) -> Self {
        Self {
            floor_z: 0.0,
            min: Vec3::new(-half_extent, -half_extent, 0.0),
            max: Vec3::new(half_extent, half_extent, 0.0),
            platforms: Vec::new(),
            liquids: Vec::new(),
            step_height: 45.0,
        }
    }

    /// Adds a platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platforms.push(platform);
        self
    }

    /// Adds a liquid volume.
    #[must_use]
    pub fn with_liquid(mut self, liquid: LiquidVolume) -> Self {
        self.liquids.push(liquid);
        self
    }

    /// Highest platform under `position` that is not above its step reach.
    fn platform_under(&self, position: Vec3) -> Option<&Platform> {
        self.platforms
            .iter()
            .filter(|p| p.covers(position) && p.height <= position.z + self.step_height)
            .max_by(|a, b| a.height.total_cmp(&b.height))
    }
}

impl Environment for FlatArena {
    fn floor_height(&self, position: Vec3) -> Option<f32> {
        let platform = self.platform_under(position).map(|p| p.height);
        Some(platform.map_or(self.floor_z, |h| h.max(self.floor_z)))
    }

    fn is_in_liquid(&self, position: Vec3) -> bool {
        self.liquids.iter().any(|l| l.contains(position))
    }

    fn clip_move(&self, _from: Vec3, to: Vec3) -> MoveClip {
        let mut position = to;
        let mut normal = Vec3::ZERO;

        if position.x < self.min.x {
            position.x = self.min.x;
            normal.x += 1.0;
        } else if position.x > self.max.x {
            position.x = self.max.x;
            normal.x -= 1.0;
        }
        if position.y < self.min.y {
            position.y = self.min.y;
            normal.y += 1.0;
        } else if position.y > self.max.y {
            position.y = self.max.y;
            normal.y -= 1.0;
        }

        let wall_normal = if normal == Vec3::ZERO { None } else { Some(normal.normalize_or_zero()) };
        MoveClip { position, wall_normal }
    }

    fn wall_contact(&self, position: Vec3, distance: f32) -> Option<Vec3> {
        let candidates = [
            (position.x - self.min.x, Vec3::new(1.0, 0.0, 0.0)),
            (self.max.x - position.x, Vec3::new(-1.0, 0.0, 0.0)),
            (position.y - self.min.y, Vec3::new(0.0, 1.0, 0.0)),
            (self.max.y - position.y, Vec3::new(0.0, -1.0, 0.0)),
        ];
        candidates
            .into_iter()
            .filter(|(gap, _)| *gap <= distance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, normal)| normal)
    }

    fn base_at(&self, position: Vec3) -> Option<BaseId> {
        self.platform_under(position)
            .filter(|p| p.height >= self.floor_z)
            .map(|p| p.id)
    }
}
