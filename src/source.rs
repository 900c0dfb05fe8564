//! Raw sample source contract
//!
//! The fusion core never talks to a bus directly. Anything that can produce
//! one [`RawSample`] per call can drive it: the [`Mpu6050`](crate::Mpu6050)
//! adapter, a recorded stream, or a simulator.

use crate::error::{AcquireError, Error, Result};
use crate::types::RawSample;

/// Producer of raw inertial samples
///
/// # Contract
///
/// - `acquire` blocks until one complete frame is available
/// - the wait is bounded; a source that cannot produce a frame returns
///   [`AcquireError::Timeout`] instead of waiting forever
/// - bus failures return [`AcquireError::Bus`]
///
/// Failures are treated as transient by the sample loop and retried.
pub trait RawSampleSource {
    /// Acquire one raw sample
    fn acquire(&mut self) -> core::result::Result<RawSample, AcquireError>;
}

impl<S: RawSampleSource + ?Sized> RawSampleSource for &mut S {
    fn acquire(&mut self) -> core::result::Result<RawSample, AcquireError> {
        (**self).acquire()
    }
}

/// Acquire a sample, retrying up to `max_attempts` times in total
///
/// Every failed attempt is logged. When the last attempt fails the error is
/// escalated to [`Error::Acquisition`].
pub fn acquire_with_retry<S>(source: &mut S, max_attempts: u8) -> Result<RawSample>
where
    S: RawSampleSource + ?Sized,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match source.acquire() {
            Ok(sample) => return Ok(sample),
            Err(error) if attempt < max_attempts => {
                tracing::warn!(attempt, max_attempts, %error, "Sample acquisition failed, retrying");
            }
            Err(error) => {
                tracing::error!(attempts = attempt, %error, "Sample acquisition failed");
                return Err(Error::Acquisition {
                    attempts: attempt,
                    source: error,
                });
            }
        }
    }
}
