//! # Correction Smoothing
//!
//! Keeps corrections of the locally controlled character from showing up as
//! teleports.
//!
//! - **Logical position**: where the character is according to the
//!   simulator, used for everything but drawing.
//! - **Visual position**: where the character is drawn. After a correction
//!   it carries an offset that decays to zero over the blend time.
//!
//! ```text
//! offset = visual_before - logical_after
//! visual = logical + offset * (1 - blend(t))
//! ```
//!
//! Small corrections ease out quickly, large ones use a longer S-curve, and
//! errors too large to glide over snap.

use arena_shared::Vec3;

use crate::config::CorrectionConfig;
use crate::prediction::CorrectionKind;

/// Offsets smaller than this are not blended.
const MIN_BLEND_OFFSET: f32 = 0.001;

/// Blend curve for corrections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendMode {
    /// No blending, the visual position jumps.
    HardSnap,
    /// Constant rate.
    Linear,
    /// Fast start, slow end: `1 - (1-t)^2`.
    EaseOut,
    /// S-curve: `3t^2 - 2t^3`.
    SmoothStep,
}

impl BlendMode {
    /// Fraction of the offset removed at `progress` (0..=1).
    #[must_use]
    pub fn apply(self, progress: f32) -> f32 {
        let t = progress.clamp(0.0, 1.0);
        match self {
            Self::HardSnap => 1.0,
            Self::Linear => t,
            Self::EaseOut => {
                let inv = 1.0 - t;
                1.0 - inv * inv
            }
            Self::SmoothStep => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Visual blend from a pre-correction position to the corrected one.
#[derive(Clone, Debug)]
pub struct CorrectionSmoother {
    config: CorrectionConfig,
    /// Offset at the start of the blend.
    offset: Vec3,
    started_at: f64,
    duration: f64,
    mode: BlendMode,
    /// Corrections that started a blend.
    pub total_blends: u32,
    /// Corrections that snapped.
    pub total_snaps: u32,
}

impl CorrectionSmoother {
    /// Creates an idle smoother.
    #[must_use]
    pub fn new(config: CorrectionConfig) -> Self {
        Self {
            config,
            offset: Vec3::ZERO,
            started_at: 0.0,
            duration: 0.0,
            mode: BlendMode::HardSnap,
            total_blends: 0,
            total_snaps: 0,
        }
    }

    /// Starts blending from `visual_before` towards `logical_after`.
    pub fn start(&mut self, visual_before: Vec3, logical_after: Vec3, kind: CorrectionKind, now: f64) {
        let offset = visual_before - logical_after;
        let magnitude = offset.length();
        if magnitude <= MIN_BLEND_OFFSET {
            self.cancel();
            return;
        }

        let (mode, duration) = match kind {
            CorrectionKind::Small => (BlendMode::EaseOut, self.config.small_blend_time),
            CorrectionKind::Large => (BlendMode::SmoothStep, self.config.large_blend_time),
        };
        if magnitude > self.config.max_smooth_distance || duration <= 0.0 {
            self.snap();
            return;
        }

        self.offset = offset;
        self.started_at = now;
        self.duration = f64::from(duration);
        self.mode = mode;
        self.total_blends += 1;
    }

    /// Drops any blend and counts a snap.
    pub fn snap(&mut self) {
        self.cancel();
        self.total_snaps += 1;
    }

    /// Drops any blend in progress.
    pub fn cancel(&mut self) {
        self.offset = Vec3::ZERO;
        self.duration = 0.0;
    }

    /// Blend progress at `now` (1.0 when idle).
    #[must_use]
    pub fn progress(&self, now: f64) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        (((now - self.started_at) / self.duration).clamp(0.0, 1.0)) as f32
    }

    /// Returns true while a blend is in progress.
    #[must_use]
    pub fn is_correcting(&self, now: f64) -> bool {
        self.progress(now) < 1.0
    }

    /// Offset still applied at `now`.
    #[must_use]
    pub fn remaining_offset(&self, now: f64) -> Vec3 {
        let progress = self.progress(now);
        if progress >= 1.0 {
            return Vec3::ZERO;
        }
        self.offset * (1.0 - self.mode.apply(progress))
    }

    /// Where to draw a character whose logical position is `logical`.
    #[must_use]
    pub fn visual_position(&self, logical: Vec3, now: f64) -> Vec3 {
        logical + self.remaining_offset(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smoother() -> CorrectionSmoother {
        CorrectionSmoother::new(CorrectionConfig::default())
    }

    #[test]
    fn test_blend_curves() {
        assert!((BlendMode::Linear.apply(0.5) - 0.5).abs() < f32::EPSILON);
        assert!((BlendMode::EaseOut.apply(0.5) - 0.75).abs() < f32::EPSILON);
        assert!((BlendMode::SmoothStep.apply(0.5) - 0.5).abs() < f32::EPSILON);
        assert!((BlendMode::HardSnap.apply(0.0) - 1.0).abs() < f32::EPSILON);
        assert!((BlendMode::EaseOut.apply(2.0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_small_correction_glides() {
        let mut smooth = smoother();
        let logical = Vec3::new(10.0, 0.0, 0.0);
        smooth.start(Vec3::ZERO, logical, CorrectionKind::Small, 1.0);

        // Starts at the old visual position
        let start = smooth.visual_position(logical, 1.0);
        assert!(start.distance(Vec3::ZERO) < 1.0e-4);

        let halfway = smooth.visual_position(logical, 1.05);
        assert!(halfway.x > 0.0 && halfway.x < 10.0);
        assert!(smooth.is_correcting(1.05));

        let done = smooth.visual_position(logical, 1.2);
        assert_eq!(done, logical);
        assert!(!smooth.is_correcting(1.2));
        assert_eq!(smooth.total_blends, 1);
    }

    #[test]
    fn test_huge_error_snaps() {
        let mut smooth = smoother();
        let logical = Vec3::new(1000.0, 0.0, 0.0);
        smooth.start(Vec3::ZERO, logical, CorrectionKind::Large, 0.0);

        assert_eq!(smooth.visual_position(logical, 0.0), logical);
        assert_eq!(smooth.total_snaps, 1);
        assert_eq!(smooth.total_blends, 0);
    }

    #[test]
    fn test_tiny_offset_ignored() {
        let mut smooth = smoother();
        smooth.start(Vec3::ZERO, Vec3::new(0.0001, 0.0, 0.0), CorrectionKind::Small, 0.0);
        assert!(!smooth.is_correcting(0.0));
        assert_eq!(smooth.total_blends, 0);
    }
}
