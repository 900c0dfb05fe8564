#![no_std]

//! Madgwick Attitude - real-time orientation estimation from a 6-axis IMU
//!
//! This crate estimates roll, pitch and yaw of a rigid body from a 3-axis
//! accelerometer and a 3-axis gyroscope sampled at a fixed rate. It is written
//! for resource-constrained targets: no heap allocation, no `std`, and a single
//! cooperative thread of control.
//!
//! The pipeline, leaves first:
//!
//! - [`RawSampleSource`] yields one raw 14-byte sensor frame per cycle
//!   ([`Mpu6050`] is the reference adapter over `embedded-hal` I2C)
//! - [`MovingAverage`] smooths the three acceleration channels
//! - [`GyroBiasCalibrator`] estimates per-axis gyroscope bias at startup
//! - [`OrientationFilter`] fuses both sensors with the Madgwick gradient-descent step
//! - [`SampleLoop`] drives the acquire/smooth/fuse cycle at a minimum period
//!
//! Heading is gyroscope-only and will drift; there is no magnetometer fusion.
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use madgwick_attitude::{FusionSettings, OrientationFilter};
//!
//! let mut filter = OrientationFilter::with_settings(FusionSettings::default());
//!
//! // Bias-corrected raw readings in device units
//! let accelerometer = Vector3::new(0.0, 0.0, 4096.0); // 1 g at +/-8 g range
//! let gyroscope = Vector3::new(0.0, 0.0, 0.0);
//!
//! let attitude = filter.update(accelerometer, gyroscope, 0.0055);
//! assert!(attitude.roll.abs() < 0.5);
//! ```

#[cfg(test)]
extern crate std;

pub mod calibration;
mod error;
mod math;
pub mod mpu6050;
mod orientation;
pub mod pipeline;
pub mod smoothing;
pub mod source;
pub mod timing;
mod types;

// Re-export all public types and functions
pub use calibration::{GyroBiasCalibrator, calibrate};
pub use error::{AcquireError, ConfigError, Error, Result};
pub use math::{DEG_TO_RAD, RAD_TO_DEG, exact_inverse_sqrt, fast_inverse_sqrt, inverse_sqrt};
pub use mpu6050::{Mpu6050, Mpu6050Config};
pub use orientation::{FilterFlags, OrientationFilter};
pub use pipeline::{AttitudeSink, CycleReport, SampleLoop};
pub use smoothing::MovingAverage;
pub use source::RawSampleSource;
pub use timing::{Clock, CycleDeadline, ManualClock, SampleTiming, Throttle};
pub use types::*;
