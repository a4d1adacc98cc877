//! # Local Simulator
//!
//! Advances one character by one tick. The same code runs on the client
//! (prediction and replay) and on the authority (verification), so it must
//! be a pure function of `(state, input, delta_time, environment)`.
//!
//! ```text
//! clamp dt ─► timers ─► one action ─► integrate velocity ─► clip move ─► resolve mode
//!                       (dodge > jump > slide)                           (exactly once)
//! ```
//!
//! Geometry comes from an injected [`Environment`]; nothing is read from
//! ambient state.

pub mod environment;

use std::sync::Arc;

use arena_shared::{DodgeDirection, MovementMode, SlideSurface, Vec3, ViewRotation};

pub use environment::{Environment, FlatArena, LiquidVolume, MoveClip, Platform};

use crate::config::PhysicsConfig;
use crate::state::{InputFrame, KinematicState, MovementEvent, MovementEvents};

/// Acceleration intents shorter than this count as no intent.
const INTENT_EPSILON: f32 = 1.0e-4;

/// What one simulation step produced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationOutcome {
    /// State after the step.
    pub state: KinematicState,
    /// Events emitted during the step.
    pub events: MovementEvents,
}

/// Deterministic movement step shared by client and authority.
#[derive(Clone)]
pub struct LocalSimulator {
    config: PhysicsConfig,
    environment: Arc<dyn Environment>,
}

impl std::fmt::Debug for LocalSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSimulator").field("config", &self.config).finish_non_exhaustive()
    }
}

impl LocalSimulator {
    /// Creates a simulator over the given environment.
    #[must_use]
    pub fn new(config: PhysicsConfig, environment: Arc<dyn Environment>) -> Self {
        Self { config, environment }
    }

    /// Physics tuning in use.
    #[must_use]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Environment queried by the simulator.
    #[must_use]
    pub fn environment(&self) -> &dyn Environment {
        self.environment.as_ref()
    }

    /// Delta time actually simulated for a requested `delta_time`.
    ///
    /// Non-finite and non-positive values become zero, long frames are
    /// clamped to `max_delta_time`.
    #[must_use]
    pub fn clamp_delta_time(&self, delta_time: f32) -> f32 {
        if delta_time.is_finite() && delta_time > 0.0 {
            delta_time.min(self.config.max_delta_time)
        } else {
            0.0
        }
    }

    /// Advances `state` by `delta_time` under `input`.
    #[must_use]
    pub fn simulate(&self, state: &KinematicState, input: &InputFrame, delta_time: f32) -> SimulationOutcome {
        let dt = self.clamp_delta_time(delta_time);
        if dt == 0.0 {
            return SimulationOutcome { state: *state, events: MovementEvents::NONE };
        }

        let mut next = *state;
        let mut events = MovementEvents::NONE;
        let intent = if input.acceleration.is_finite() {
            input.acceleration.clamp_length(1.0)
        } else {
            Vec3::ZERO
        };

        next.rotation = input.view;
        next.dodge_cooldown = (next.dodge_cooldown - dt).max(0.0);
        next.mode_time_remaining = (next.mode_time_remaining - dt).max(0.0);

        self.apply_action(&mut next, input, &mut events);

        next.is_sprinting = input.sprint
            && next.mode == MovementMode::Walking
            && !intent.is_nearly_zero(INTENT_EPSILON);

        self.integrate_velocity(&mut next, intent, dt);

        let clip = self.environment.clip_move(next.position, next.position + next.velocity * dt);
        next.position = clip.position;
        if let Some(normal) = clip.wall_normal {
            let into_wall = next.velocity.dot(normal);
            if into_wall < 0.0 {
                next.velocity = next.velocity - normal * into_wall;
            }
        }

        self.resolve_mode(&mut next, input, &mut events);

        SimulationOutcome { state: next, events }
    }

    /// Evaluates at most one discrete action for this tick.
    fn apply_action(&self, next: &mut KinematicState, input: &InputFrame, events: &mut MovementEvents) {
        if let Some(direction) = input.dodge {
            if self.try_dodge(next, direction, input.view) {
                events.insert(MovementEvent::Dodged);
                return;
            }
        }
        if input.jump && self.try_jump(next) {
            events.insert(MovementEvent::Jumped);
            return;
        }
        if input.slide && next.mode == MovementMode::Walking {
            let speed = next.velocity.horizontal().length();
            if speed >= self.config.min_floor_slide_speed {
                next.mode = MovementMode::Sliding(SlideSurface::Floor);
                next.mode_time_remaining = self.config.floor_slide_duration;
                events.insert(MovementEvent::StartedSliding);
            }
        }
    }

    fn try_dodge(&self, next: &mut KinematicState, direction: DodgeDirection, view: ViewRotation) -> bool {
        let cfg = &self.config;
        if next.dodge_cooldown > 0.0 {
            return false;
        }
        let heading = direction.world_direction(view);

        let vertical = match next.mode {
            MovementMode::Walking | MovementMode::Sliding(SlideSurface::Floor) => cfg.dodge_impulse_vertical,
            MovementMode::Falling | MovementMode::Dodging | MovementMode::Sliding(SlideSurface::Wall) => {
                if next.wall_dodge_count >= cfg.max_wall_dodges {
                    return false;
                }
                let Some(normal) = self.environment.wall_contact(next.position, cfg.wall_dodge_trace_distance)
                else {
                    return false;
                };
                if heading.dot(normal) < cfg.wall_dodge_min_normal {
                    return false;
                }
                next.wall_dodge_count += 1;
                cfg.wall_dodge_impulse_vertical
            }
            MovementMode::Swimming => return false,
        };

        next.velocity = (heading * cfg.dodge_impulse_horizontal).with_z(vertical);
        next.mode = MovementMode::Dodging;
        next.mode_time_remaining = cfg.dodge_duration;
        true
    }

    fn try_jump(&self, next: &mut KinematicState) -> bool {
        let cfg = &self.config;
        match next.mode {
            MovementMode::Walking | MovementMode::Sliding(SlideSurface::Floor) => {
                next.velocity.z = cfg.jump_z_velocity;
                next.jump_count = 1;
            }
            MovementMode::Falling | MovementMode::Sliding(SlideSurface::Wall) => {
                // Walking off a ledge spends the ground jump
                let used = next.jump_count.max(1);
                if used > cfg.max_multi_jump_count {
                    return false;
                }
                next.velocity.z = cfg.multi_jump_impulse;
                next.jump_count = used + 1;
            }
            MovementMode::Dodging | MovementMode::Swimming => return false,
        }
        next.mode = MovementMode::Falling;
        next.mode_time_remaining = 0.0;
        true
    }

    fn integrate_velocity(&self, next: &mut KinematicState, intent: Vec3, dt: f32) {
        let cfg = &self.config;
        match next.mode {
            MovementMode::Walking => {
                let max_speed = if next.is_sprinting { cfg.sprint_speed } else { cfg.max_walk_speed };
                let accel = intent.horizontal() * cfg.max_acceleration;
                let mut velocity = next.velocity.horizontal();
                let speed = velocity.length();

                if accel.is_nearly_zero(INTENT_EPSILON) {
                    if speed > 0.0 {
                        let drop = (cfg.ground_friction * speed + cfg.braking_deceleration_walking) * dt;
                        velocity = velocity * ((speed - drop).max(0.0) / speed);
                    }
                } else {
                    // Friction turns the velocity towards the intent
                    let steer = (velocity - accel.normalize_or_zero() * speed) * (cfg.ground_friction * dt).min(1.0);
                    velocity = velocity - steer + accel * dt;
                    velocity = velocity.clamp_length(max_speed);
                }
                next.velocity = velocity;
            }
            MovementMode::Falling | MovementMode::Dodging => {
                let control = if next.mode == MovementMode::Dodging { cfg.dodge_air_control } else { cfg.air_control };
                let horizontal = Self::air_steer(next.velocity, intent, cfg.max_acceleration * control * dt, cfg.max_walk_speed);
                next.velocity = horizontal.with_z(next.velocity.z + cfg.gravity_z * dt);
            }
            MovementMode::Sliding(SlideSurface::Wall) => {
                let horizontal =
                    Self::air_steer(next.velocity, intent, cfg.max_acceleration * cfg.air_control * dt, cfg.max_walk_speed);
                let fall = next.velocity.z + cfg.gravity_z * cfg.wall_slide_gravity_scaling * dt;
                next.velocity = horizontal.with_z(fall.max(-cfg.max_wall_slide_fall_speed));
            }
            MovementMode::Sliding(SlideSurface::Floor) => {
                let horizontal = next.velocity.horizontal();
                let mut direction = horizontal.normalize_or_zero();
                if direction == Vec3::ZERO {
                    direction = next.rotation.forward();
                }
                let speed = (horizontal.length() + cfg.floor_slide_acceleration * dt).min(cfg.max_floor_slide_speed);
                next.velocity = direction * speed;
            }
            MovementMode::Swimming => {
                let mut velocity = next.velocity + intent * (cfg.swim_acceleration * dt);
                velocity = velocity - velocity * (cfg.fluid_friction * dt).min(1.0);
                velocity.z += cfg.gravity_z * (1.0 - cfg.buoyancy) * dt;
                next.velocity = velocity.clamp_length(cfg.max_water_speed);
            }
        }
    }

    /// Horizontal air control; never lets steering raise speed above
    /// `max(current, cap)`.
    fn air_steer(velocity: Vec3, intent: Vec3, delta_speed: f32, cap: f32) -> Vec3 {
        let horizontal = velocity.horizontal();
        let limit = horizontal.length().max(cap);
        (horizontal + intent.horizontal() * delta_speed).clamp_length(limit)
    }

    /// Picks the mode for the end of the tick and applies its entry effects.
    fn resolve_mode(&self, next: &mut KinematicState, input: &InputFrame, events: &mut MovementEvents) {
        let cfg = &self.config;
        let env = self.environment.as_ref();
        let previous = next.mode;

        let floor = env.floor_height(next.position);
        let on_floor = next.velocity.z <= 0.0
            && floor.map_or(false, |height| next.position.z <= height + cfg.ground_tolerance);

        let resolved = if env.is_in_liquid(next.position) {
            MovementMode::Swimming
        } else if on_floor {
            match previous {
                MovementMode::Walking | MovementMode::Swimming => MovementMode::Walking,
                MovementMode::Sliding(SlideSurface::Floor) => {
                    if next.mode_time_remaining > 0.0 {
                        previous
                    } else {
                        let horizontal = next.velocity.horizontal() * cfg.floor_slide_ending_speed_factor;
                        next.velocity = horizontal;
                        MovementMode::Walking
                    }
                }
                MovementMode::Falling | MovementMode::Dodging | MovementMode::Sliding(SlideSurface::Wall) => {
                    self.land(next, input, events)
                }
            }
        } else {
            match previous {
                MovementMode::Dodging if next.mode_time_remaining > 0.0 => previous,
                _ => {
                    let near_wall = env.wall_contact(next.position, cfg.max_wall_slide_distance).is_some();
                    if input.slide && next.velocity.z <= 0.0 && near_wall {
                        MovementMode::Sliding(SlideSurface::Wall)
                    } else {
                        MovementMode::Falling
                    }
                }
            }
        };

        if resolved == MovementMode::Sliding(SlideSurface::Wall) && previous != resolved {
            events.insert(MovementEvent::StartedSliding);
        }

        if on_floor && resolved.is_grounded() {
            if let Some(height) = floor {
                next.position.z = height;
            }
            next.velocity.z = 0.0;
            next.base = env.base_at(next.position);
        } else {
            next.base = None;
        }

        if !matches!(resolved, MovementMode::Dodging | MovementMode::Sliding(SlideSurface::Floor)) {
            next.mode_time_remaining = 0.0;
        }
        next.mode = resolved;
    }

    /// Touchdown after being airborne.
    fn land(&self, next: &mut KinematicState, input: &InputFrame, events: &mut MovementEvents) -> MovementMode {
        let cfg = &self.config;
        let was_dodging = next.mode == MovementMode::Dodging;
        events.insert(MovementEvent::Landed);
        next.jump_count = 0;
        next.wall_dodge_count = 0;

        let speed = next.velocity.horizontal().length();
        if input.slide && speed >= cfg.min_floor_slide_speed {
            next.mode_time_remaining = cfg.floor_slide_duration;
            events.insert(MovementEvent::StartedSliding);
            return MovementMode::Sliding(SlideSurface::Floor);
        }

        if was_dodging {
            let horizontal = next.velocity.horizontal() * cfg.dodge_landing_speed_factor;
            next.velocity = horizontal.with_z(next.velocity.z);
            next.dodge_cooldown = cfg.dodge_reset_interval;
        }
        MovementMode::Walking
    }
}
