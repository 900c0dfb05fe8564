//! MPU-6050 adapter over blocking `embedded-hal` I2C
//!
//! Brings the sensor up with the configured full-scale ranges and turns each
//! data-ready event into one [`RawSample`]. Waiting for data is bounded by a
//! poll budget so a dead bus surfaces as an error instead of a hang.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, I2c};

use crate::error::AcquireError;
use crate::source::RawSampleSource;
use crate::types::{AccelRange, GyroRange, RawSample};

/// Bus address with AD0 low
pub const DEFAULT_ADDRESS: u8 = 0x68;
/// Bus address with AD0 high
pub const ALTERNATE_ADDRESS: u8 = 0x69;

const GYRO_CONFIG: u8 = 0x1B;
const ACCEL_CONFIG: u8 = 0x1C;
const INT_ENABLE: u8 = 0x38;
const INT_STATUS: u8 = 0x3A;
/// First register of the 14-byte accel/temp/gyro block
const ACCEL_XOUT_H: u8 = 0x3B;
const PWR_MGMT_1: u8 = 0x6B;
const WHO_AM_I: u8 = 0x75;

const WHO_AM_I_VALUE: u8 = 0x68;
const DATA_RDY: u8 = 0x01;

/// Sensor configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mpu6050Config {
    /// 7-bit bus address
    pub address: u8,
    /// Accelerometer full-scale range
    pub accel_range: AccelRange,
    /// Gyroscope full-scale range
    pub gyro_range: GyroRange,
    /// Data-ready polls before giving up on a sample (0 reads without waiting)
    pub ready_poll_limit: u16,
    /// Pause between data-ready polls in microseconds
    pub poll_interval_us: u32,
}

impl Default for Mpu6050Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            accel_range: AccelRange::G8,
            gyro_range: GyroRange::Dps1000,
            ready_poll_limit: 100,
            poll_interval_us: 100,
        }
    }
}

/// MPU-6050 driver
pub struct Mpu6050<I2C, D> {
    i2c: I2C,
    delay: D,
    config: Mpu6050Config,
}

impl<I2C, D> Mpu6050<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Wrap a bus and a delay provider; the device is not touched until [`init`](Self::init)
    pub fn new(i2c: I2C, delay: D, config: Mpu6050Config) -> Self {
        Self { i2c, delay, config }
    }

    /// Verify the device and configure it for sampling
    ///
    /// Checks WHO_AM_I, wakes the device from sleep, applies both full-scale
    /// ranges and enables the data-ready flag.
    ///
    /// # Errors
    ///
    /// [`AcquireError::UnexpectedDevice`] if WHO_AM_I does not read 0x68,
    /// [`AcquireError::Bus`] on any failed transaction.
    pub fn init(&mut self) -> Result<(), AcquireError> {
        let who_am_i = self.read_register(WHO_AM_I)?;
        if who_am_i != WHO_AM_I_VALUE {
            tracing::error!(who_am_i, "Unexpected device on the bus");
            return Err(AcquireError::UnexpectedDevice(who_am_i));
        }

        self.write_register(PWR_MGMT_1, 0x00)?;
        self.write_register(ACCEL_CONFIG, self.config.accel_range.register_value())?;
        self.write_register(GYRO_CONFIG, self.config.gyro_range.register_value())?;
        self.write_register(INT_ENABLE, DATA_RDY)?;

        tracing::info!(
            address = self.config.address,
            accel_range = ?self.config.accel_range,
            gyro_range = ?self.config.gyro_range,
            "MPU-6050 initialized"
        );
        Ok(())
    }

    /// Gyroscope sensitivity matching the configured range, in LSB per deg/s
    pub fn gyroscope_sensitivity(&self) -> f32 {
        self.config.gyro_range.sensitivity()
    }

    /// Current configuration
    pub fn config(&self) -> Mpu6050Config {
        self.config
    }

    /// Give back the bus and the delay provider
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    /// Wait for fresh data, then burst-read one frame
    pub fn read_sample(&mut self) -> Result<RawSample, AcquireError> {
        self.wait_for_data()?;

        let mut frame = [0u8; RawSample::FRAME_LEN];
        self.i2c
            .write_read(self.config.address, &[ACCEL_XOUT_H], &mut frame)
            .map_err(|e| AcquireError::Bus(e.kind()))?;
        Ok(RawSample::from_frame(&frame))
    }

    fn wait_for_data(&mut self) -> Result<(), AcquireError> {
        let limit = self.config.ready_poll_limit;
        if limit == 0 {
            return Ok(());
        }
        for _ in 0..limit {
            if self.read_register(INT_STATUS)? & DATA_RDY != 0 {
                return Ok(());
            }
            self.delay.delay_us(self.config.poll_interval_us);
        }
        Err(AcquireError::Timeout { polls: limit })
    }

    fn read_register(&mut self, register: u8) -> Result<u8, AcquireError> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(self.config.address, &[register], &mut value)
            .map_err(|e| AcquireError::Bus(e.kind()))?;
        Ok(value[0])
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), AcquireError> {
        self.i2c
            .write(self.config.address, &[register, value])
            .map_err(|e| AcquireError::Bus(e.kind()))
    }
}

impl<I2C, D> RawSampleSource for Mpu6050<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    fn acquire(&mut self) -> Result<RawSample, AcquireError> {
        self.read_sample()
    }
}
