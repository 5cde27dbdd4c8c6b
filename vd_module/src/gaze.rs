//! Eye orientation to gaze angles.
//!
//! The streamer's eye rotations cover a narrower range than a real eye, so the
//! extracted angles are pushed outward near the ends of their range before
//! being handed to the host.

use crate::smoothing::{Axis, Eye, Slot, TemporalSmoother};
use glam::{Quat, Vec2};

/// Degrees to radians, as the downstream avatars expect it.
pub const RADIANS_PER_DEGREE: f32 = 0.0174533;

pub const PUPIL_DIAMETER_MM: f32 = 5.0;
pub const MIN_DILATION: f32 = 0.0;
pub const MAX_DILATION: f32 = 10.0;

/// Pitch and yaw in degrees, in the streamer's convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeAngles {
    pub pitch: f64,
    pub yaw: f64,
}

impl EyeAngles {
    pub fn from_orientation(q: Quat) -> Self {
        let (x, y, z, w) = (q.x as f64, q.y as f64, q.z as f64, q.w as f64);
        let magnitude = (x * x + y * y + z * z + w * w).sqrt();
        if magnitude.is_nan() || magnitude < 1e-4 {
            return Self {
                pitch: 0.0,
                yaw: 0.0,
            };
        }
        let (x, y, z, w) = (x / magnitude, y / magnitude, z / magnitude, w / magnitude);

        let yaw = (2.0 * (y * z + w * x)).atan2(w * w - x * x - y * y + z * z);
        let pitch = (-2.0 * (x * z - w * y)).clamp(-1.0, 1.0).asin();

        Self {
            pitch: pitch.to_degrees(),
            yaw: yaw.to_degrees(),
        }
    }

    /// Stretches the tail of each angle range. Both terms are negligible
    /// below roughly 20 degrees.
    pub fn corrected_magnitudes(&self) -> (f64, f64) {
        let pitch = self.pitch.abs();
        let yaw = self.yaw.abs();
        (
            pitch + 4.0 * (pitch / 30.0).powf(30.0),
            yaw + 6.0 * (yaw / 27.0).powf(18.0),
        )
    }

    /// Gaze in radians, unsmoothed.
    ///
    /// Pitch is mirrored. Negative yaw is corrected, positive yaw passes
    /// through unscaled; this asymmetry is the observed streamer-side
    /// behaviour and is kept as is.
    pub fn to_gaze(&self) -> Vec2 {
        let (pitch_mod, yaw_mod) = self.corrected_magnitudes();
        let pitch = if self.pitch < 0.0 { pitch_mod } else { -pitch_mod };
        let yaw = if self.yaw < 0.0 { -yaw_mod } else { self.yaw };
        Vec2::new(pitch as f32 * RADIANS_PER_DEGREE, yaw as f32 * RADIANS_PER_DEGREE)
    }
}

/// Resolves both eyes and runs each gaze component through its own smoother
/// slot. With `valid_frame` false the held gaze is returned unchanged.
pub fn resolve(
    smoother: &mut TemporalSmoother,
    left: Quat,
    right: Quat,
    valid_frame: bool,
) -> (Vec2, Vec2) {
    let left = EyeAngles::from_orientation(left).to_gaze();
    let right = EyeAngles::from_orientation(right).to_gaze();
    (
        smooth(smoother, Eye::Left, left, valid_frame),
        smooth(smoother, Eye::Right, right, valid_frame),
    )
}

fn smooth(smoother: &mut TemporalSmoother, eye: Eye, gaze: Vec2, valid_frame: bool) -> Vec2 {
    Vec2::new(
        smoother.filter(Slot::Gaze(eye, Axis::X), gaze.x, valid_frame),
        smoother.filter(Slot::Gaze(eye, Axis::Y), gaze.y, valid_frame),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn identity_is_straight_ahead() {
        let angles = EyeAngles::from_orientation(Quat::IDENTITY);
        assert_eq!(angles.pitch, 0.0);
        assert_eq!(angles.yaw, 0.0);
        assert_eq!(angles.to_gaze(), Vec2::ZERO);
    }

    #[test]
    fn identity_converges_to_zero_gaze() {
        let mut smoother = TemporalSmoother::default();
        // Start from a deflected state so convergence is actually exercised.
        let tilted = Quat::from_rotation_y(0.3);
        resolve(&mut smoother, tilted, tilted, true);

        let mut gaze = (Vec2::ONE, Vec2::ONE);
        for _ in 0..60 {
            gaze = resolve(&mut smoother, Quat::IDENTITY, Quat::IDENTITY, true);
        }
        assert!(gaze.0.length() < 1e-6);
        assert!(gaze.1.length() < 1e-6);
    }

    #[test]
    fn rotation_about_y_reads_as_pitch() {
        let angles = EyeAngles::from_orientation(Quat::from_rotation_y(10f32.to_radians()));
        assert!(approx(angles.pitch, 10.0), "{:?}", angles);
        assert!(approx(angles.yaw, 0.0), "{:?}", angles);
    }

    #[test]
    fn rotation_about_x_reads_as_yaw() {
        let angles = EyeAngles::from_orientation(Quat::from_rotation_x(-15f32.to_radians()));
        assert!(approx(angles.yaw, -15.0), "{:?}", angles);
        assert!(approx(angles.pitch, 0.0), "{:?}", angles);
    }

    #[test]
    fn correction_curve_matches_constants() {
        let angles = EyeAngles {
            pitch: 30.0,
            yaw: -27.0,
        };
        let (pitch_mod, yaw_mod) = angles.corrected_magnitudes();
        assert!(approx(pitch_mod, 34.0));
        assert!(approx(yaw_mod, 33.0));

        let small = EyeAngles {
            pitch: 5.0,
            yaw: 5.0,
        };
        let (pitch_mod, yaw_mod) = small.corrected_magnitudes();
        assert!(approx(pitch_mod, 5.0));
        assert!(approx(yaw_mod, 5.0));
    }

    #[test]
    fn pitch_sign_is_mirrored() {
        let down = EyeAngles {
            pitch: -30.0,
            yaw: 0.0,
        };
        let up = EyeAngles {
            pitch: 30.0,
            yaw: 0.0,
        };
        assert!((down.to_gaze().x - 34.0 * RADIANS_PER_DEGREE).abs() < 1e-5);
        assert!((up.to_gaze().x + 34.0 * RADIANS_PER_DEGREE).abs() < 1e-5);
    }

    #[test]
    fn positive_yaw_is_left_uncorrected() {
        let negative = EyeAngles {
            pitch: 0.0,
            yaw: -27.0,
        };
        let positive = EyeAngles {
            pitch: 0.0,
            yaw: 27.0,
        };
        assert!((negative.to_gaze().y + 33.0 * RADIANS_PER_DEGREE).abs() < 1e-5);
        assert!((positive.to_gaze().y - 27.0 * RADIANS_PER_DEGREE).abs() < 1e-5);
    }

    #[test]
    fn degenerate_orientation_is_finite() {
        let zero = EyeAngles::from_orientation(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0));
        assert_eq!(zero.to_gaze(), Vec2::ZERO);

        let stretched = EyeAngles::from_orientation(Quat::from_xyzw(3.0, 0.0, 3.0, 0.0));
        assert!(stretched.pitch.is_finite() && stretched.yaw.is_finite());
    }

    #[test]
    fn invalid_frame_holds_gaze() {
        let mut smoother = TemporalSmoother::default();
        let tilted = Quat::from_rotation_y(0.2);
        let held = resolve(&mut smoother, tilted, tilted, true);
        let frozen = resolve(&mut smoother, Quat::IDENTITY, Quat::IDENTITY, false);
        assert_eq!(held, frozen);
    }
}
