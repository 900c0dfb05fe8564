//! Error types for the attitude estimation pipeline

use embedded_hal::i2c::ErrorKind;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = core::result::Result<T, Error>;

/// Invalid startup configuration
///
/// Reported before any sample is taken; the pipeline refuses to start.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    /// Moving-average window outside `1..=capacity`
    #[error("moving-average window {window} must be between 1 and {capacity}")]
    Window { window: usize, capacity: usize },
    /// Calibration needs at least one sample
    #[error("calibration sample count must be greater than zero")]
    CalibrationSamples,
    /// Gyroscope sensitivity not finite and positive
    #[error("gyroscope sensitivity {0} LSB per deg/s must be finite and positive")]
    GyroscopeSensitivity(f32),
    /// Correction gain not finite and non-negative
    #[error("correction gain {0} must be finite and non-negative")]
    CorrectionGain(f32),
    /// Attitude trim contains a non-finite angle
    #[error("attitude trim angles must be finite")]
    Trim,
    /// Integration step bound not finite and positive
    #[error("maximum integration step {0} s must be finite and positive")]
    MaxDeltaTime(f32),
    /// Cycle period of zero
    #[error("minimum cycle period must be greater than zero")]
    CyclePeriod,
    /// No acquisition attempts allowed
    #[error("at least one acquisition attempt per cycle is required")]
    AcquireAttempts,
}

/// Failure to obtain one raw sample from the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The bus transaction failed
    #[error("bus error: {0:?}")]
    Bus(ErrorKind),
    /// No complete frame became available within the poll budget
    #[error("no sample ready after {polls} polls")]
    Timeout { polls: u16 },
    /// The device identified itself as something else
    #[error("unexpected device id {0:#04x}")]
    UnexpectedDevice(u8),
}

/// Pipeline errors
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Error {
    /// Settings rejected at startup
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Every acquisition attempt of a cycle failed; fatal
    #[error("sample acquisition failed after {attempts} attempts")]
    Acquisition {
        attempts: u8,
        #[source]
        source: AcquireError,
    },
    /// A cycle exceeded the minimum period under [`OverrunPolicy::Halt`](crate::OverrunPolicy::Halt)
    #[error("cycle took {elapsed_us} us, longer than the {period_us} us period")]
    Overrun { elapsed_us: u64, period_us: u32 },
    /// The loop was stepped before the gyroscope was calibrated
    #[error("gyroscope bias has not been calibrated")]
    NotCalibrated,
}
