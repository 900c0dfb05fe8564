//! Moving-average smoothing of the acceleration channels

use nalgebra::Vector3;

use crate::error::ConfigError;
use crate::types::SmoothingSettings;

/// Buffer capacity used when none is given
pub const DEFAULT_CAPACITY: usize = 64;

/// Simple moving average over the last `window` readings of three axes
///
/// Storage is a fixed array sized by `CAPACITY`; the window actually used is
/// chosen at runtime and must fit in it. Per axis the running sum always
/// equals the exact total of the buffered readings, and the output is that
/// sum divided by the window with integer (truncating) division.
///
/// The buffer starts zero-filled, so the first `window - 1` outputs are pulled
/// towards zero. Feeding it during calibration warms it up before the main loop.
///
/// # Example
/// ```
/// use madgwick_attitude::{MovingAverage, SmoothingSettings};
///
/// let mut average: MovingAverage = MovingAverage::new(SmoothingSettings { window: 4 }).unwrap();
/// for _ in 0..4 {
///     average.update([100, -100, 4096]);
/// }
/// assert_eq!(average.average(), [100, -100, 4096]);
/// ```
#[derive(Debug, Clone)]
pub struct MovingAverage<const CAPACITY: usize = DEFAULT_CAPACITY> {
    /// Readings per slot, all three axes
    readings: [[i16; 3]; CAPACITY],
    /// Running sum per axis
    total: [i32; 3],
    /// Next slot to overwrite
    index: usize,
    /// Window length in use
    window: usize,
    /// Latest average per axis
    average: [i16; 3],
}

impl<const CAPACITY: usize> MovingAverage<CAPACITY> {
    /// Create an empty filter, rejecting windows that do not fit the buffer
    pub fn new(settings: SmoothingSettings) -> Result<Self, ConfigError> {
        settings.validate_for(CAPACITY)?;
        Ok(Self {
            readings: [[0; 3]; CAPACITY],
            total: [0; 3],
            index: 0,
            window: settings.window,
            average: [0; 3],
        })
    }

    /// Push one reading per axis and return the updated averages
    pub fn update(&mut self, reading: [i16; 3]) -> [i16; 3] {
        let slot = &mut self.readings[self.index];
        for axis in 0..3 {
            self.total[axis] -= i32::from(slot[axis]);
            slot[axis] = reading[axis];
            self.total[axis] += i32::from(reading[axis]);
        }

        self.index += 1;
        if self.index >= self.window {
            self.index = 0;
        }

        let window = self.window as i32;
        for axis in 0..3 {
            // Mean of i16 values always fits in i16
            self.average[axis] = (self.total[axis] / window) as i16;
        }
        self.average
    }

    /// Push a reading given as a vector
    pub fn update_vector(&mut self, reading: Vector3<i16>) -> Vector3<i16> {
        Vector3::from(self.update([reading.x, reading.y, reading.z]))
    }

    /// Latest averages without pushing a reading
    pub fn average(&self) -> [i16; 3] {
        self.average
    }

    /// Window length in use
    pub fn window(&self) -> usize {
        self.window
    }

    /// Zero the buffer, sums and output
    pub fn reset(&mut self) {
        self.readings = [[0; 3]; CAPACITY];
        self.total = [0; 3];
        self.index = 0;
        self.average = [0; 3];
    }
}
