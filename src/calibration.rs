//! Startup gyroscope bias calibration

use embedded_hal::delay::DelayNs;
use nalgebra::Vector3;

use crate::error::{ConfigError, Result};
use crate::smoothing::MovingAverage;
use crate::source::{RawSampleSource, acquire_with_retry};
use crate::types::{CalibrationSettings, GyroBias};

/// Samples between progress log events
const PROGRESS_INTERVAL: u32 = 50;

/// Accumulates stationary gyroscope readings into a per-axis bias
///
/// The bias is the arithmetic mean of `sample_count` readings using integer
/// (truncating) division. The device must be stationary while samples are
/// collected; nothing here can detect motion.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use madgwick_attitude::{CalibrationSettings, GyroBias, GyroBiasCalibrator};
///
/// let settings = CalibrationSettings { sample_count: 3, ..Default::default() };
/// let mut calibrator = GyroBiasCalibrator::new(settings).unwrap();
///
/// calibrator.add_sample(Vector3::new(10, -4, 1));
/// calibrator.add_sample(Vector3::new(12, -4, 1));
/// calibrator.add_sample(Vector3::new(14, -4, 2));
///
/// assert_eq!(calibrator.bias(), Some(GyroBias::new(12, -4, 1)));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct GyroBiasCalibrator {
    /// Running sum per axis
    total: Vector3<i64>,
    /// Samples accumulated so far
    count: u32,
    /// Samples required
    target: u32,
}

impl GyroBiasCalibrator {
    /// Create a calibrator expecting `settings.sample_count` samples
    pub fn new(settings: CalibrationSettings) -> core::result::Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            total: Vector3::zeros(),
            count: 0,
            target: settings.sample_count,
        })
    }

    /// Accumulate one angular rate reading
    ///
    /// Returns `true` once enough samples have been collected. Readings past
    /// the target are ignored.
    pub fn add_sample(&mut self, gyroscope: Vector3<i16>) -> bool {
        if self.count < self.target {
            self.total += gyroscope.map(i64::from);
            self.count += 1;
        }
        self.is_complete()
    }

    /// Whether the target sample count has been reached
    pub fn is_complete(&self) -> bool {
        self.count >= self.target
    }

    /// Samples accumulated so far
    pub fn samples(&self) -> u32 {
        self.count
    }

    /// Averaged bias, available once calibration is complete
    pub fn bias(&self) -> Option<GyroBias> {
        if !self.is_complete() {
            return None;
        }
        let count = i64::from(self.count);
        // Mean of i16 readings always fits in i32
        Some(GyroBias {
            offset: self.total.map(|sum| (sum / count) as i32),
        })
    }
}

/// Run the startup calibration against a live source
///
/// Collects `settings.sample_count` samples with `settings.sample_delay_us`
/// between them. Angular rates are averaged into the returned bias while
/// accelerations are pushed through `smoothing` so its window is full before
/// the main loop starts.
///
/// Each sample gets up to `max_attempts` acquisition attempts; running out is fatal.
pub fn calibrate<S, D, const W: usize>(
    source: &mut S,
    delay: &mut D,
    smoothing: &mut MovingAverage<W>,
    settings: CalibrationSettings,
    max_attempts: u8,
) -> Result<GyroBias>
where
    S: RawSampleSource,
    D: DelayNs,
{
    let mut calibrator = GyroBiasCalibrator::new(settings)?;
    tracing::info!(
        samples = settings.sample_count,
        delay_us = settings.sample_delay_us,
        "Gyroscope calibration started, keep the sensor still"
    );

    while !calibrator.is_complete() {
        let sample = acquire_with_retry(source, max_attempts)?;
        calibrator.add_sample(sample.gyroscope);
        smoothing.update(sample.accelerometer_array());

        if calibrator.samples() % PROGRESS_INTERVAL == 0 {
            tracing::debug!(
                collected = calibrator.samples(),
                total = settings.sample_count,
                "Calibration progress"
            );
        }
        delay.delay_us(settings.sample_delay_us);
    }

    let bias = calibrator.bias().unwrap_or_default();
    tracing::info!(
        bias_x = bias.offset.x,
        bias_y = bias.offset.y,
        bias_z = bias.offset.z,
        "Gyroscope calibration complete"
    );
    Ok(bias)
}
