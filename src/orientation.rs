//! Madgwick gradient-descent orientation filter

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use crate::math::{DEG_TO_RAD, RAD_TO_DEG, inverse_sqrt};
use crate::types::{Attitude, FusionSettings};

/// Conditions met during the last update
///
/// None of these are errors: the filter degrades gracefully and reports what
/// it did so callers can monitor it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterFlags {
    /// Accelerometer magnitude was zero or non-finite; the step used gyroscope integration only
    pub accelerometer_ignored: bool,
    /// Time step was zero, negative or non-finite; the orientation was left untouched
    pub delta_time_rejected: bool,
    /// Time step exceeded `max_delta_time` and was clamped
    pub delta_time_clamped: bool,
    /// Integration produced a non-finite or zero quaternion and was discarded
    pub update_discarded: bool,
}

/// Orientation filter fusing accelerometer and gyroscope readings
///
/// Holds the orientation as a quaternion, initialised to identity and
/// carried across updates. Each update integrates the gyroscope rate and
/// pulls the estimate towards the gravity direction measured by the
/// accelerometer with one gradient-descent step, weighted by the correction
/// gain (beta).
///
/// Heading is not observable from gravity alone; yaw follows the gyroscope
/// and drifts with its residual bias.
#[derive(Debug, Clone)]
pub struct OrientationFilter {
    /// Filter settings
    settings: FusionSettings,
    /// Current orientation (q0 scalar, q1..q3 vector), unit length within normalization tolerance
    quaternion: Quaternion<f32>,
    /// Device units to radians per second
    gyroscope_scale: f32,
    /// Outcome of the last update
    flags: FilterFlags,
}

impl OrientationFilter {
    /// Create a filter with default settings
    pub fn new() -> Self {
        Self::with_settings(FusionSettings::default())
    }

    /// Create a filter with the given settings
    ///
    /// Settings are expected to have passed [`FusionSettings::validate`].
    pub fn with_settings(settings: FusionSettings) -> Self {
        Self {
            settings,
            quaternion: Quaternion::identity(),
            gyroscope_scale: DEG_TO_RAD / settings.gyroscope_sensitivity,
            flags: FilterFlags::default(),
        }
    }

    /// Return to the identity orientation
    pub fn reset(&mut self) {
        self.quaternion = Quaternion::identity();
        self.flags = FilterFlags::default();
    }

    /// Replace the settings, keeping the current orientation
    pub fn set_settings(&mut self, settings: FusionSettings) {
        self.settings = settings;
        self.gyroscope_scale = DEG_TO_RAD / settings.gyroscope_sensitivity;
    }

    /// Current settings
    pub fn settings(&self) -> FusionSettings {
        self.settings
    }

    /// Advance the orientation by one sample
    ///
    /// # Arguments
    /// * `accelerometer` - Smoothed acceleration, any scale (only the direction is used)
    /// * `gyroscope` - Bias-corrected angular rate in device units (LSB)
    /// * `delta_time` - Measured time since the previous update in seconds
    ///
    /// # Returns
    /// Attitude derived from the updated orientation
    ///
    /// # Degenerate inputs
    /// * `delta_time` zero, negative or non-finite: nothing is integrated
    /// * `delta_time` above `max_delta_time`: clamped
    /// * zero or non-finite accelerometer: the gradient correction is skipped
    pub fn update(
        &mut self,
        accelerometer: Vector3<f32>,
        gyroscope: Vector3<f32>,
        delta_time: f32,
    ) -> Attitude {
        self.flags = FilterFlags::default();

        if !delta_time.is_finite() || delta_time <= 0.0 {
            self.flags.delta_time_rejected = true;
            tracing::warn!(delta_time, "Rejected integration step");
            return self.attitude();
        }
        let delta_time = if delta_time > self.settings.max_delta_time {
            self.flags.delta_time_clamped = true;
            tracing::warn!(
                delta_time,
                max_delta_time = self.settings.max_delta_time,
                "Clamped integration step"
            );
            self.settings.max_delta_time
        } else {
            delta_time
        };

        // Rate of change from the gyroscope: 0.5 * q * (0, w)
        let omega = gyroscope * self.gyroscope_scale;
        let mut rate = self.quaternion * Quaternion::new(0.0, omega.x, omega.y, omega.z) * 0.5;

        let magnitude_squared = accelerometer.norm_squared();
        if magnitude_squared > 0.0 && magnitude_squared.is_finite() {
            let direction =
                accelerometer * inverse_sqrt(magnitude_squared, self.settings.normalization);
            rate -= objective_gradient(&self.quaternion, &direction) * self.settings.correction_gain;
        } else {
            self.flags.accelerometer_ignored = true;
            tracing::warn!("Accelerometer magnitude unusable, skipping correction");
        }

        let integrated = self.quaternion + rate * delta_time;
        let norm_squared = integrated.norm_squared();
        if norm_squared > 0.0 && norm_squared.is_finite() {
            self.quaternion = integrated * inverse_sqrt(norm_squared, self.settings.normalization);
        } else {
            self.flags.update_discarded = true;
            tracing::warn!("Integrated orientation not finite, keeping previous estimate");
        }

        self.attitude()
    }

    /// Current orientation quaternion
    ///
    /// Unit length within the tolerance of the configured normalization.
    pub fn quaternion(&self) -> Quaternion<f32> {
        self.quaternion
    }

    /// Set the orientation directly
    pub fn set_quaternion(&mut self, quaternion: UnitQuaternion<f32>) {
        self.quaternion = quaternion.into_inner();
    }

    /// Roll, pitch and yaw in degrees with trim applied
    pub fn attitude(&self) -> Attitude {
        let q = &self.quaternion;
        let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);

        let roll = libm::atan2f(2.0 * (q0 * q1 + q2 * q3), 1.0 - 2.0 * (q1 * q1 + q2 * q2));
        // Clamp so a slightly non-unit quaternion near +/-90 deg pitch cannot produce NaN
        let pitch = libm::asinf((2.0 * (q0 * q2 - q1 * q3)).clamp(-1.0, 1.0));
        let yaw = libm::atan2f(2.0 * (q0 * q3 + q1 * q2), 1.0 - 2.0 * (q2 * q2 + q3 * q3));

        let trim = self.settings.trim;
        Attitude {
            roll: roll * RAD_TO_DEG + trim.roll,
            pitch: pitch * RAD_TO_DEG + trim.pitch,
            yaw: yaw * RAD_TO_DEG + trim.yaw,
        }
    }

    /// Gravity direction in the sensor frame predicted by the current orientation
    pub fn gravity(&self) -> Vector3<f32> {
        let q = &self.quaternion;
        let (qw, qx, qy, qz) = (q.w, q.i, q.j, q.k);

        Vector3::new(
            qx * qz - qw * qy,
            qy * qz + qw * qx,
            qw * qw - 0.5 + qz * qz,
        ) * 2.0
    }

    /// Outcome of the last update
    pub fn flags(&self) -> FilterFlags {
        self.flags
    }
}

impl Default for OrientationFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Gradient of the gravity alignment objective
///
/// The objective is half the squared distance between the gravity direction
/// predicted by `q` and the normalized accelerometer reading `a`. The closed
/// form below is the Jacobian transpose times the residual, expanded with
/// shared sub-expressions; it is not normalized.
fn objective_gradient(q: &Quaternion<f32>, a: &Vector3<f32>) -> Quaternion<f32> {
    let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);

    let q0_q0 = q0 * q0;
    let q1_q1 = q1 * q1;
    let q2_q2 = q2 * q2;
    let q3_q3 = q3 * q3;

    let _2q0 = 2.0 * q0;
    let _2q1 = 2.0 * q1;
    let _2q2 = 2.0 * q2;
    let _2q3 = 2.0 * q3;

    let _4q0 = 4.0 * q0;
    let _4q1 = 4.0 * q1;
    let _4q2 = 4.0 * q2;
    let _4q3 = 4.0 * q3;

    let _8q1 = 8.0 * q1;
    let _8q2 = 8.0 * q2;

    let s0 = _4q0 * q2_q2 + _4q0 * q1_q1 + _2q2 * a.x - _2q1 * a.y;
    let s1 = _8q1 * q1_q1 + _4q1 * q3_q3 + _4q1 * q0_q0 - _4q1 + _8q1 * q2_q2 - _2q3 * a.x
        - _2q0 * a.y
        + _4q1 * a.z;
    let s2 = _8q2 * q2_q2 - _4q2 + _4q2 * q3_q3 + _4q2 * q0_q0 + _8q2 * q1_q1 + _2q0 * a.x
        - _2q3 * a.y
        + _4q2 * a.z;
    let s3 = _4q3 * q2_q2 + _4q3 * q1_q1 - _2q1 * a.x - _2q2 * a.y;

    Quaternion::new(s0, s1, s2, s3)
}
