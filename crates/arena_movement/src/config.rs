//! # Movement Configuration
//!
//! Tuning for the simulator, the prediction buffer, reconciliation,
//! the authority and remote smoothing.
//!
//! Loaded once at startup from TOML. Every field has a default, so a file
//! only needs to name what it overrides:
//!
//! ```toml
//! [physics]
//! max_walk_speed = 1000.0
//!
//! [prediction.combine]
//! max_combine_time = 0.033
//!
//! [remote]
//! stale_timeout = 0.5
//! ```

use std::path::Path;

use arena_shared::constants::{
    GOOD_MOVE_ACK_INTERVAL, LARGE_CORRECTION_THRESHOLD, MAX_COMBINE_TIME, MAX_MOVE_DELTA_TIME,
    MAX_POSITION_ERROR_SQUARED, MAX_SAVED_MOVES, MIN_TIME_BETWEEN_CLIENT_ADJUSTMENTS,
    NET_SEND_INTERVAL, SNAPSHOT_RATE,
};
use serde::{Deserialize, Serialize};

use crate::error::{MovementError, MovementResult};

/// Physics tuning used by the local simulator.
///
/// Units are centimeters and seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Largest delta time simulated in one step; longer frames are clamped.
    pub max_delta_time: f32,
    /// Gravity along Z (negative is down).
    pub gravity_z: f32,
    /// Distance above a floor still counted as standing on it.
    pub ground_tolerance: f32,

    /// Acceleration applied for a full-length intent.
    pub max_acceleration: f32,
    /// Top walking speed.
    pub max_walk_speed: f32,
    /// Top speed while sprinting.
    pub sprint_speed: f32,
    /// Constant deceleration when walking without intent.
    pub braking_deceleration_walking: f32,
    /// Friction applied while walking.
    pub ground_friction: f32,

    /// Fraction of acceleration available while falling.
    pub air_control: f32,
    /// Fraction of acceleration available while dodging.
    pub dodge_air_control: f32,

    /// Vertical speed of a jump from the ground.
    pub jump_z_velocity: f32,
    /// Additional jumps allowed while airborne.
    pub max_multi_jump_count: u8,
    /// Vertical speed set by an air jump.
    pub multi_jump_impulse: f32,

    /// Horizontal speed of a dodge.
    pub dodge_impulse_horizontal: f32,
    /// Vertical speed of a ground dodge.
    pub dodge_impulse_vertical: f32,
    /// Vertical speed of a wall dodge.
    pub wall_dodge_impulse_vertical: f32,
    /// Longest time the dodging mode lasts before reverting to falling.
    pub dodge_duration: f32,
    /// Time after landing before the next dodge.
    pub dodge_reset_interval: f32,
    /// Horizontal speed kept when landing from a dodge.
    pub dodge_landing_speed_factor: f32,
    /// Wall dodges allowed per airtime.
    pub max_wall_dodges: u8,
    /// How far a wall may be to dodge off it.
    pub wall_dodge_trace_distance: f32,
    /// Minimum alignment between dodge direction and wall normal.
    pub wall_dodge_min_normal: f32,

    /// Speed gained per second along a floor slide.
    pub floor_slide_acceleration: f32,
    /// Top speed of a floor slide.
    pub max_floor_slide_speed: f32,
    /// How long a floor slide lasts.
    pub floor_slide_duration: f32,
    /// Horizontal speed kept when a floor slide ends.
    pub floor_slide_ending_speed_factor: f32,
    /// Horizontal speed needed to start a floor slide.
    pub min_floor_slide_speed: f32,

    /// Fraction of gravity applied while wall sliding.
    pub wall_slide_gravity_scaling: f32,
    /// Fastest fall speed while wall sliding.
    pub max_wall_slide_fall_speed: f32,
    /// How far a wall may be to keep sliding on it.
    pub max_wall_slide_distance: f32,

    /// Top swimming speed.
    pub max_water_speed: f32,
    /// Acceleration applied for a full-length intent while swimming.
    pub swim_acceleration: f32,
    /// Velocity damping per second in liquid.
    pub fluid_friction: f32,
    /// Fraction of gravity cancelled in liquid.
    pub buoyancy: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            max_delta_time: MAX_MOVE_DELTA_TIME,
            gravity_z: -935.0,
            ground_tolerance: 2.0,
            max_acceleration: 6000.0,
            max_walk_speed: 940.0,
            sprint_speed: 1250.0,
            braking_deceleration_walking: 2048.0,
            ground_friction: 8.0,
            air_control: 0.4,
            dodge_air_control: 0.25,
            jump_z_velocity: 730.0,
            max_multi_jump_count: 1,
            multi_jump_impulse: 600.0,
            dodge_impulse_horizontal: 1500.0,
            dodge_impulse_vertical: 525.0,
            wall_dodge_impulse_vertical: 470.0,
            dodge_duration: 1.25,
            dodge_reset_interval: 0.35,
            dodge_landing_speed_factor: 0.19,
            max_wall_dodges: 1,
            wall_dodge_trace_distance: 50.0,
            wall_dodge_min_normal: 0.5,
            floor_slide_acceleration: 400.0,
            max_floor_slide_speed: 1400.0,
            floor_slide_duration: 0.7,
            floor_slide_ending_speed_factor: 0.4,
            min_floor_slide_speed: 300.0,
            wall_slide_gravity_scaling: 0.16,
            max_wall_slide_fall_speed: 150.0,
            max_wall_slide_distance: 40.0,
            max_water_speed: 450.0,
            swim_acceleration: 2000.0,
            fluid_friction: 2.4,
            buoyancy: 0.9,
        }
    }
}

/// Thresholds deciding when two consecutive moves may travel as one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// Longest delta time a combined move may cover.
    pub max_combine_time: f32,
    /// Largest difference in acceleration intent length.
    pub accel_mag_threshold: f32,
    /// Smallest dot product between normalized acceleration intents.
    pub accel_dot_threshold: f32,
    /// Largest view yaw/pitch difference in degrees.
    pub view_threshold_degrees: f32,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            max_combine_time: MAX_COMBINE_TIME,
            accel_mag_threshold: 0.1,
            accel_dot_threshold: 0.8,
            view_threshold_degrees: 2.0,
        }
    }
}

/// Client-side prediction settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Upper bound on unacknowledged moves kept.
    pub max_saved_moves: usize,
    /// Minimum interval between packets carrying only ordinary moves.
    pub net_send_interval: f64,
    /// Moves replayed per frame after a correction (0 = replay all at once).
    pub max_replay_moves_per_frame: usize,
    /// Move combination thresholds.
    pub combine: CombineConfig,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_saved_moves: MAX_SAVED_MOVES,
            net_send_interval: NET_SEND_INTERVAL,
            max_replay_moves_per_frame: 0,
            combine: CombineConfig::default(),
        }
    }
}

/// How the client applies corrections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Position error above which a correction counts as large.
    pub large_correction_threshold: f32,
    /// Visual blend time for small corrections (seconds).
    pub small_blend_time: f32,
    /// Visual blend time for large corrections (seconds).
    pub large_blend_time: f32,
    /// Errors beyond this distance snap without visual blending.
    pub max_smooth_distance: f32,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            large_correction_threshold: LARGE_CORRECTION_THRESHOLD,
            small_blend_time: 0.1,
            large_blend_time: 0.2,
            max_smooth_distance: 256.0,
        }
    }
}

/// Authority-side move processing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Squared position error tolerated before correcting a client.
    pub max_position_error_squared: f32,
    /// Minimum spacing between corrections to one client (seconds).
    pub min_time_between_client_adjustments: f64,
    /// Minimum spacing between good-move acknowledgements (seconds).
    pub good_move_ack_interval: f64,
    /// Out-of-order moves held while waiting for a gap to fill.
    pub reorder_window: usize,
    /// Gap between consecutive moves still treated as contiguous (seconds).
    pub continuity_tolerance: f64,
    /// How far a client's move clock may run ahead of authority time (seconds).
    pub max_client_time_ahead: f64,
    /// Interval between replicated remote snapshots (seconds).
    pub snapshot_interval: f64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            max_position_error_squared: MAX_POSITION_ERROR_SQUARED,
            min_time_between_client_adjustments: MIN_TIME_BETWEEN_CLIENT_ADJUSTMENTS,
            good_move_ack_interval: GOOD_MOVE_ACK_INTERVAL,
            reorder_window: 4,
            continuity_tolerance: 1.0e-3,
            max_client_time_ahead: 0.25,
            snapshot_interval: 1.0 / f64::from(SNAPSHOT_RATE),
        }
    }
}

/// Remote character smoothing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// How far behind the render clock samples are taken (seconds).
    pub interpolation_delay: f64,
    /// Longest time the smoother advances past the start of its newest
    /// interpolation segment before freezing (seconds).
    pub stale_timeout: f64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            interpolation_delay: 0.0,
            stale_timeout: 0.3,
        }
    }
}

/// Complete movement configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Simulator tuning.
    pub physics: PhysicsConfig,
    /// Client prediction.
    pub prediction: PredictionConfig,
    /// Client correction handling.
    pub correction: CorrectionConfig,
    /// Authority move processing.
    pub authority: AuthorityConfig,
    /// Remote smoothing.
    pub remote: RemoteConfig,
}

impl MovementConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigIo` if the document does not parse and
    /// `InvalidConfig` if a value is out of range.
    pub fn from_toml_str(source: &str) -> MovementResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| MovementError::ConfigIo(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigIo` if the file can not be read or parsed and
    /// `InvalidConfig` if a value is out of range.
    pub fn from_file(path: impl AsRef<Path>) -> MovementResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| MovementError::ConfigIo(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks every value for range and consistency.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> MovementResult<()> {
        let physics = &self.physics;
        positive("physics.max_delta_time", physics.max_delta_time)?;
        positive("physics.max_acceleration", physics.max_acceleration)?;
        positive("physics.max_walk_speed", physics.max_walk_speed)?;
        positive("physics.sprint_speed", physics.sprint_speed)?;
        positive("physics.max_water_speed", physics.max_water_speed)?;
        non_negative("physics.ground_tolerance", physics.ground_tolerance)?;
        non_negative("physics.dodge_duration", physics.dodge_duration)?;
        non_negative("physics.floor_slide_duration", physics.floor_slide_duration)?;
        non_negative("physics.fluid_friction", physics.fluid_friction)?;
        if physics.gravity_z > 0.0 {
            return Err(MovementError::InvalidConfig(
                "physics.gravity_z must not point up".into(),
            ));
        }

        let prediction = &self.prediction;
        if prediction.max_saved_moves == 0 {
            return Err(MovementError::InvalidConfig(
                "prediction.max_saved_moves must be at least 1".into(),
            ));
        }
        non_negative("prediction.net_send_interval", prediction.net_send_interval as f32)?;
        let combine = &prediction.combine;
        non_negative("prediction.combine.max_combine_time", combine.max_combine_time)?;
        non_negative("prediction.combine.accel_mag_threshold", combine.accel_mag_threshold)?;
        non_negative("prediction.combine.view_threshold_degrees", combine.view_threshold_degrees)?;
        if !(-1.0..=1.0).contains(&combine.accel_dot_threshold) {
            return Err(MovementError::InvalidConfig(
                "prediction.combine.accel_dot_threshold must be within [-1, 1]".into(),
            ));
        }

        let correction = &self.correction;
        non_negative("correction.large_correction_threshold", correction.large_correction_threshold)?;
        non_negative("correction.small_blend_time", correction.small_blend_time)?;
        non_negative("correction.large_blend_time", correction.large_blend_time)?;
        non_negative("correction.max_smooth_distance", correction.max_smooth_distance)?;

        let authority = &self.authority;
        non_negative("authority.max_position_error_squared", authority.max_position_error_squared)?;
        positive("authority.snapshot_interval", authority.snapshot_interval as f32)?;
        positive("authority.max_client_time_ahead", authority.max_client_time_ahead as f32)?;
        non_negative(
            "authority.min_time_between_client_adjustments",
            authority.min_time_between_client_adjustments as f32,
        )?;
        non_negative("authority.good_move_ack_interval", authority.good_move_ack_interval as f32)?;
        non_negative("authority.continuity_tolerance", authority.continuity_tolerance as f32)?;

        non_negative("remote.interpolation_delay", self.remote.interpolation_delay as f32)?;
        positive("remote.stale_timeout", self.remote.stale_timeout as f32)?;
        Ok(())
    }
}

fn positive(name: &str, value: f32) -> MovementResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MovementError::InvalidConfig(format!("{name} must be positive, got {value}")))
    }
}

fn non_negative(name: &str, value: f32) -> MovementResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(MovementError::InvalidConfig(format!("{name} must not be negative, got {value}")))
    }
}
