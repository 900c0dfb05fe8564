//! Data model and configuration for the attitude estimation pipeline

use nalgebra::Vector3;

use crate::error::ConfigError;
use crate::smoothing::DEFAULT_CAPACITY;

/// One raw frame from the inertial sensor
///
/// Holds the six signed 16-bit readings the fusion core consumes plus the
/// temperature channel that shares the frame. Values are in device units
/// (LSB); scaling depends on the configured full-scale ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    /// Acceleration per axis (LSB)
    pub accelerometer: Vector3<i16>,
    /// Angular rate per axis (LSB)
    pub gyroscope: Vector3<i16>,
    /// Die temperature (LSB), not used by the fusion core
    pub temperature: i16,
}

impl RawSample {
    /// Length of one burst-read frame in bytes (7 big-endian words)
    pub const FRAME_LEN: usize = 14;

    /// Create a sample from accelerometer and gyroscope readings
    pub fn new(accelerometer: [i16; 3], gyroscope: [i16; 3]) -> Self {
        Self {
            accelerometer: Vector3::from(accelerometer),
            gyroscope: Vector3::from(gyroscope),
            temperature: 0,
        }
    }

    /// Decode a frame laid out as `ax ay az temp gx gy gz`, MSB first
    ///
    /// # Example
    /// ```
    /// use madgwick_attitude::RawSample;
    ///
    /// let frame = [0x00, 0x01, 0xff, 0xff, 0x10, 0x00, 0, 0, 0, 2, 0, 0, 0x80, 0x00];
    /// let sample = RawSample::from_frame(&frame);
    /// assert_eq!(sample.accelerometer_array(), [1, -1, 4096]);
    /// assert_eq!(sample.gyroscope.x, 2);
    /// assert_eq!(sample.gyroscope.z, i16::MIN);
    /// ```
    pub fn from_frame(frame: &[u8; Self::FRAME_LEN]) -> Self {
        let word = |i: usize| i16::from_be_bytes([frame[2 * i], frame[2 * i + 1]]);
        Self {
            accelerometer: Vector3::new(word(0), word(1), word(2)),
            temperature: word(3),
            gyroscope: Vector3::new(word(4), word(5), word(6)),
        }
    }

    /// Accelerometer readings as a plain array
    pub fn accelerometer_array(&self) -> [i16; 3] {
        [self.accelerometer.x, self.accelerometer.y, self.accelerometer.z]
    }
}

impl Default for RawSample {
    fn default() -> Self {
        Self::new([0; 3], [0; 3])
    }
}

/// Per-axis gyroscope bias in device units
///
/// Produced once by [`GyroBiasCalibrator`](crate::GyroBiasCalibrator) and read-only thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GyroBias {
    /// Bias per axis (LSB)
    pub offset: Vector3<i32>,
}

impl GyroBias {
    /// Create a bias from per-axis offsets
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self {
            offset: Vector3::new(x, y, z),
        }
    }

    /// Subtract the bias from a raw angular rate reading
    ///
    /// Subtraction happens in `i32` so extreme readings cannot overflow.
    pub fn correct(&self, gyroscope: Vector3<i16>) -> Vector3<f32> {
        Vector3::new(
            (i32::from(gyroscope.x) - self.offset.x) as f32,
            (i32::from(gyroscope.y) - self.offset.y) as f32,
            (i32::from(gyroscope.z) - self.offset.z) as f32,
        )
    }
}

impl Default for GyroBias {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Attitude in degrees, derived from the orientation quaternion every cycle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attitude {
    /// Rotation about the sensor X axis (degrees)
    pub roll: f32,
    /// Rotation about the sensor Y axis (degrees)
    pub pitch: f32,
    /// Rotation about the sensor Z axis (degrees), drifts without a heading reference
    pub yaw: f32,
}

/// Gyroscope full-scale range
///
/// Each range fixes the sensor's LSB sensitivity. The sensitivity handed to
/// the orientation filter must match the range the sensor was configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GyroRange {
    /// +/-250 deg/s
    Dps250,
    /// +/-500 deg/s
    Dps500,
    /// +/-1000 deg/s
    #[default]
    Dps1000,
    /// +/-2000 deg/s
    Dps2000,
}

impl GyroRange {
    /// LSB per deg/s
    pub fn sensitivity(self) -> f32 {
        match self {
            GyroRange::Dps250 => 131.0,
            GyroRange::Dps500 => 65.5,
            GyroRange::Dps1000 => 32.8,
            GyroRange::Dps2000 => 16.4,
        }
    }

    /// GYRO_CONFIG register value (FS_SEL in bits 4:3)
    pub fn register_value(self) -> u8 {
        match self {
            GyroRange::Dps250 => 0x00,
            GyroRange::Dps500 => 0x08,
            GyroRange::Dps1000 => 0x10,
            GyroRange::Dps2000 => 0x18,
        }
    }
}

/// Accelerometer full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccelRange {
    /// +/-2 g
    G2,
    /// +/-4 g
    G4,
    /// +/-8 g
    #[default]
    G8,
    /// +/-16 g
    G16,
}

impl AccelRange {
    /// LSB per g
    pub fn sensitivity(self) -> f32 {
        match self {
            AccelRange::G2 => 16384.0,
            AccelRange::G4 => 8192.0,
            AccelRange::G8 => 4096.0,
            AccelRange::G16 => 2048.0,
        }
    }

    /// ACCEL_CONFIG register value (AFS_SEL in bits 4:3)
    pub fn register_value(self) -> u8 {
        match self {
            AccelRange::G2 => 0x00,
            AccelRange::G4 => 0x08,
            AccelRange::G8 => 0x10,
            AccelRange::G16 => 0x18,
        }
    }
}

/// Fixed angular offsets added to the derived Euler angles
///
/// Used to trim out a mounting misalignment of the sensor board. All zero by
/// default.
///
/// # Example
/// ```
/// use madgwick_attitude::{AttitudeTrim, FusionSettings};
///
/// let settings = FusionSettings {
///     trim: AttitudeTrim { pitch: 2.0, ..AttitudeTrim::ZERO },
///     ..Default::default()
/// };
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttitudeTrim {
    /// Added to roll (degrees)
    pub roll: f32,
    /// Added to pitch (degrees)
    pub pitch: f32,
    /// Added to yaw (degrees)
    pub yaw: f32,
}

impl AttitudeTrim {
    /// No trim
    pub const ZERO: Self = Self {
        roll: 0.0,
        pitch: 0.0,
        yaw: 0.0,
    };
}

/// Inverse square root used to normalize the accelerometer and the quaternion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Normalization {
    /// Bit-level approximation with one Newton-Raphson step (<0.2% error, no division)
    #[default]
    Fast,
    /// `1 / sqrt(x)` through libm
    Exact,
}

/// What the sample loop does when a cycle takes longer than the minimum period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OverrunPolicy {
    /// Skip the idle wait and keep running at a reduced rate
    #[default]
    Tolerate,
    /// Stop the loop with [`Error::Overrun`](crate::Error::Overrun)
    Halt,
}

/// Orientation filter settings
///
/// # Example
/// ```
/// use madgwick_attitude::{FusionSettings, GyroRange};
///
/// let settings = FusionSettings {
///     gyroscope_sensitivity: GyroRange::Dps2000.sensitivity(),
///     correction_gain: 0.1, // trust the gyroscope more
///     ..Default::default()
/// };
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FusionSettings {
    /// Gyroscope LSB per deg/s, must match the sensor's configured range
    pub gyroscope_sensitivity: f32,
    /// Madgwick beta
    ///
    /// Higher values converge faster to the accelerometer's gravity estimate
    /// but let linear acceleration disturb the attitude. Zero disables the
    /// accelerometer correction entirely.
    pub correction_gain: f32,
    /// Fixed offsets added to the output angles
    pub trim: AttitudeTrim,
    /// Inverse square root implementation
    pub normalization: Normalization,
    /// Upper bound on the integration step in seconds
    ///
    /// Longer intervals (a stalled loop, a debugger pause) are clamped to this value.
    pub max_delta_time: f32,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            gyroscope_sensitivity: GyroRange::default().sensitivity(),
            correction_gain: 0.2,
            trim: AttitudeTrim::ZERO,
            normalization: Normalization::Fast,
            max_delta_time: 0.1,
        }
    }
}

impl FusionSettings {
    /// Check every field for a usable value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gyroscope_sensitivity.is_finite() || self.gyroscope_sensitivity <= 0.0 {
            return Err(ConfigError::GyroscopeSensitivity(self.gyroscope_sensitivity));
        }
        if !self.correction_gain.is_finite() || self.correction_gain < 0.0 {
            return Err(ConfigError::CorrectionGain(self.correction_gain));
        }
        let trim = self.trim;
        if !(trim.roll.is_finite() && trim.pitch.is_finite() && trim.yaw.is_finite()) {
            return Err(ConfigError::Trim);
        }
        if !self.max_delta_time.is_finite() || self.max_delta_time <= 0.0 {
            return Err(ConfigError::MaxDeltaTime(self.max_delta_time));
        }
        Ok(())
    }
}

/// Acceleration smoothing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmoothingSettings {
    /// Moving-average window length in samples
    ///
    /// Larger windows suppress more noise at the cost of more delay.
    pub window: usize,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self { window: 15 }
    }
}

impl SmoothingSettings {
    /// Check the window against the default buffer capacity
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_for(DEFAULT_CAPACITY)
    }

    /// Check the window against a specific buffer capacity
    pub fn validate_for(&self, capacity: usize) -> Result<(), ConfigError> {
        if self.window == 0 || self.window > capacity {
            return Err(ConfigError::Window {
                window: self.window,
                capacity,
            });
        }
        Ok(())
    }
}

/// Startup gyroscope calibration settings
///
/// The body must be stationary and level for
/// `sample_count * sample_delay_us` microseconds (about 2.25 s by default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationSettings {
    /// Number of stationary samples averaged into the bias
    pub sample_count: u32,
    /// Pause between calibration samples in microseconds
    pub sample_delay_us: u32,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            sample_count: 750,
            sample_delay_us: 3_000,
        }
    }
}

impl CalibrationSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_count == 0 {
            return Err(ConfigError::CalibrationSamples);
        }
        Ok(())
    }
}

/// Sample loop timing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CycleSettings {
    /// Minimum time between cycle starts in microseconds
    pub min_period_us: u32,
    /// Behaviour when a cycle exceeds `min_period_us`
    pub overrun_policy: OverrunPolicy,
    /// Acquisition attempts per cycle before the failure becomes fatal
    pub max_acquire_attempts: u8,
    /// Minimum interval between attitude diagnostics log events in microseconds (0 disables)
    pub diagnostics_period_us: u32,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            min_period_us: 5_500,
            overrun_policy: OverrunPolicy::Tolerate,
            max_acquire_attempts: 3,
            diagnostics_period_us: 20_000,
        }
    }
}

impl CycleSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_period_us == 0 {
            return Err(ConfigError::CyclePeriod);
        }
        if self.max_acquire_attempts == 0 {
            return Err(ConfigError::AcquireAttempts);
        }
        Ok(())
    }
}

/// Complete startup configuration of the sample loop
///
/// # Example
/// ```
/// use madgwick_attitude::{PipelineSettings, SmoothingSettings};
///
/// let settings = PipelineSettings {
///     smoothing: SmoothingSettings { window: 0 },
///     ..Default::default()
/// };
/// assert!(settings.validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineSettings {
    pub fusion: FusionSettings,
    pub smoothing: SmoothingSettings,
    pub calibration: CalibrationSettings,
    pub cycle: CycleSettings,
}

impl PipelineSettings {
    /// Validate every settings group against the default smoothing capacity,
    /// reporting the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_for(DEFAULT_CAPACITY)
    }

    /// Validate every settings group for a loop with the given smoothing capacity
    pub fn validate_for(&self, capacity: usize) -> Result<(), ConfigError> {
        self.fusion.validate()?;
        self.smoothing.validate_for(capacity)?;
        self.calibration.validate()?;
        self.cycle.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_decoding() {
        let frame = [
            0x10, 0x00, // ax = 4096
            0xf0, 0x00, // ay = -4096
            0x00, 0x10, // az = 16
            0x12, 0x34, // temp
            0x7f, 0xff, // gx = i16::MAX
            0x80, 0x00, // gy = i16::MIN
            0xff, 0xfe, // gz = -2
        ];
        let sample = RawSample::from_frame(&frame);

        assert_eq!(sample.accelerometer, Vector3::new(4096, -4096, 16));
        assert_eq!(sample.temperature, 0x1234);
        assert_eq!(sample.gyroscope, Vector3::new(i16::MAX, i16::MIN, -2));
    }

    #[test]
    fn test_bias_correction_does_not_overflow() {
        let bias = GyroBias::new(-10, 10, 0);
        let corrected = bias.correct(Vector3::new(i16::MAX, i16::MIN, 7));

        assert_eq!(corrected.x, 32_777.0);
        assert_eq!(corrected.y, -32_778.0);
        assert_eq!(corrected.z, 7.0);
    }

    #[test]
    fn test_gyro_range_sensitivity() {
        assert_eq!(GyroRange::default(), GyroRange::Dps1000);
        assert_eq!(GyroRange::Dps1000.sensitivity(), 32.8);
        assert_eq!(GyroRange::Dps1000.register_value(), 0x10);
        assert_eq!(AccelRange::default().sensitivity(), 4096.0);
    }

    #[test]
    fn test_default_settings_are_valid() {
        let settings = PipelineSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.smoothing.window, 15);
        assert_eq!(settings.calibration.sample_count, 750);
        assert_eq!(settings.cycle.min_period_us, 5_500);
        assert_eq!(settings.fusion.correction_gain, 0.2);
        assert_eq!(settings.fusion.trim, AttitudeTrim::ZERO);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let window = SmoothingSettings { window: 0 };
        assert_eq!(
            window.validate(),
            Err(ConfigError::Window {
                window: 0,
                capacity: DEFAULT_CAPACITY
            })
        );

        let too_wide = SmoothingSettings {
            window: DEFAULT_CAPACITY + 1,
        };
        assert!(too_wide.validate().is_err());

        let calibration = CalibrationSettings {
            sample_count: 0,
            ..Default::default()
        };
        assert_eq!(calibration.validate(), Err(ConfigError::CalibrationSamples));

        let fusion = FusionSettings {
            gyroscope_sensitivity: 0.0,
            ..Default::default()
        };
        assert_eq!(fusion.validate(), Err(ConfigError::GyroscopeSensitivity(0.0)));

        let fusion = FusionSettings {
            correction_gain: -0.1,
            ..Default::default()
        };
        assert!(fusion.validate().is_err());

        let fusion = FusionSettings {
            trim: AttitudeTrim {
                roll: f32::NAN,
                ..AttitudeTrim::ZERO
            },
            ..Default::default()
        };
        assert_eq!(fusion.validate(), Err(ConfigError::Trim));

        let cycle = CycleSettings {
            max_acquire_attempts: 0,
            ..Default::default()
        };
        assert_eq!(cycle.validate(), Err(ConfigError::AcquireAttempts));
    }

    #[test]
    fn test_pipeline_window_checked_against_capacity() {
        let wide = PipelineSettings {
            smoothing: SmoothingSettings { window: 100 },
            ..Default::default()
        };
        assert_eq!(
            wide.validate(),
            Err(ConfigError::Window {
                window: 100,
                capacity: DEFAULT_CAPACITY
            })
        );
        assert_eq!(wide.validate_for(128), Ok(()));
        assert!(PipelineSettings::default().validate_for(8).is_err());
    }
}
