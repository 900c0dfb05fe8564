//! Fixed-rate acquisition and fusion loop
//!
//! [`SampleLoop`] owns every piece of state the estimator carries: the
//! sample source, the smoothing buffer, the gyroscope bias and the
//! orientation filter. One call to [`SampleLoop::step`] is one cycle:
//!
//! 1. measure the step since the previous cycle start
//! 2. acquire a raw sample (with bounded retries)
//! 3. smooth the acceleration, subtract the bias from the angular rate
//! 4. fuse and derive the attitude
//! 5. publish, then idle until the minimum period has elapsed
//!
//! A cycle that runs past its period is handled per [`OverrunPolicy`].

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;

use crate::calibration::calibrate;
use crate::error::{Error, Result};
use crate::orientation::{FilterFlags, OrientationFilter};
use crate::smoothing::{DEFAULT_CAPACITY, MovingAverage};
use crate::source::{RawSampleSource, acquire_with_retry};
use crate::timing::{Clock, CycleDeadline, SampleTiming, Throttle};
use crate::types::{Attitude, GyroBias, OverrunPolicy, PipelineSettings};

/// Downstream consumer of the per-cycle attitude
pub trait AttitudeSink {
    fn publish(&mut self, attitude: &Attitude);
}

impl<F> AttitudeSink for F
where
    F: FnMut(&Attitude),
{
    fn publish(&mut self, attitude: &Attitude) {
        self(attitude)
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    /// Attitude published this cycle
    pub attitude: Attitude,
    /// Integration step handed to the filter, in seconds
    pub delta_time: f32,
    /// Time from cycle start to the end of publication, in microseconds
    pub busy_us: u64,
    /// Whether the cycle ran past its minimum period
    pub overrun: bool,
    /// Filter conditions met during the update
    pub flags: FilterFlags,
}

/// Drives the acquire, smooth, fuse and publish cycle at a minimum period
///
/// `W` is the smoothing buffer capacity; the configured window must fit in it.
///
/// # Example
///
/// ```
/// use madgwick_attitude::{
///     AcquireError, ManualClock, PipelineSettings, RawSample, RawSampleSource, SampleLoop,
/// };
/// # use embedded_hal::delay::DelayNs;
/// # struct Delay<'a>(&'a ManualClock);
/// # impl DelayNs for Delay<'_> {
/// #     fn delay_ns(&mut self, ns: u32) { self.0.advance(u64::from(ns / 1_000)); }
/// # }
///
/// struct Level;
///
/// impl RawSampleSource for Level {
///     fn acquire(&mut self) -> Result<RawSample, AcquireError> {
///         Ok(RawSample::new([0, 0, 4096], [12, -7, 3]))
///     }
/// }
///
/// let clock = ManualClock::new();
/// let mut sample_loop: SampleLoop<_, _, _> =
///     SampleLoop::new(PipelineSettings::default(), Level, &clock, Delay(&clock)).unwrap();
///
/// sample_loop.calibrate().unwrap();
/// let report = sample_loop.step().unwrap();
/// assert!(report.attitude.roll.abs() < 0.01);
/// assert!(!report.overrun);
/// ```
pub struct SampleLoop<S, C, D, const W: usize = DEFAULT_CAPACITY> {
    settings: PipelineSettings,
    source: S,
    clock: C,
    delay: D,
    smoothing: MovingAverage<W>,
    bias: Option<GyroBias>,
    filter: OrientationFilter,
    timing: SampleTiming,
    overruns: u32,
    diagnostics: Throttle,
}

impl<S, C, D, const W: usize> SampleLoop<S, C, D, W>
where
    S: RawSampleSource,
    C: Clock,
    D: DelayNs,
{
    /// Build the loop, failing fast on invalid settings
    pub fn new(settings: PipelineSettings, source: S, clock: C, delay: D) -> Result<Self> {
        settings.validate_for(W)?;
        let smoothing = MovingAverage::new(settings.smoothing)?;

        Ok(Self {
            settings,
            source,
            clock,
            delay,
            smoothing,
            bias: None,
            filter: OrientationFilter::with_settings(settings.fusion),
            timing: SampleTiming::new(),
            overruns: 0,
            diagnostics: Throttle::new(settings.cycle.diagnostics_period_us),
        })
    }

    /// Estimate the gyroscope bias from stationary samples
    ///
    /// Also warms up the smoothing buffer. The next cycle after calibration
    /// starts a fresh timing sequence.
    pub fn calibrate(&mut self) -> Result<GyroBias> {
        let bias = calibrate(
            &mut self.source,
            &mut self.delay,
            &mut self.smoothing,
            self.settings.calibration,
            self.settings.cycle.max_acquire_attempts,
        )?;
        self.bias = Some(bias);
        self.timing.reset();
        Ok(bias)
    }

    /// Use a known bias instead of calibrating
    pub fn set_bias(&mut self, bias: GyroBias) {
        self.bias = Some(bias);
        self.timing.reset();
    }

    /// Run one cycle without a downstream consumer
    pub fn step(&mut self) -> Result<CycleReport> {
        self.step_with(&mut |_: &Attitude| {})
    }

    /// Run one cycle, publishing the attitude to `sink` before the idle wait
    ///
    /// # Errors
    ///
    /// * [`Error::NotCalibrated`] if no bias is available yet
    /// * [`Error::Acquisition`] once every acquisition attempt has failed
    /// * [`Error::Overrun`] under [`OverrunPolicy::Halt`]
    pub fn step_with<K>(&mut self, sink: &mut K) -> Result<CycleReport>
    where
        K: AttitudeSink + ?Sized,
    {
        let bias = self.bias.ok_or(Error::NotCalibrated)?;
        let cycle = self.settings.cycle;

        let start_us = self.clock.now_us();
        let delta_time = self.timing.begin_cycle(start_us, cycle.min_period_us);
        let deadline = CycleDeadline::new(start_us, cycle.min_period_us);

        let sample = acquire_with_retry(&mut self.source, cycle.max_acquire_attempts)?;
        let accelerometer = self
            .smoothing
            .update_vector(sample.accelerometer)
            .map(f32::from);
        let gyroscope = bias.correct(sample.gyroscope);
        let attitude = self.filter.update(accelerometer, gyroscope, delta_time);

        self.log_diagnostics(start_us, &attitude);
        sink.publish(&attitude);

        let now_us = self.clock.now_us();
        let busy_us = deadline.elapsed(now_us);
        let overrun = deadline.is_overrun(now_us);
        if overrun {
            match cycle.overrun_policy {
                OverrunPolicy::Tolerate => {
                    self.overruns = self.overruns.saturating_add(1);
                    tracing::warn!(
                        busy_us,
                        period_us = cycle.min_period_us,
                        overruns = self.overruns,
                        "Cycle overrun, skipping idle wait"
                    );
                }
                OverrunPolicy::Halt => {
                    tracing::error!(busy_us, period_us = cycle.min_period_us, "Cycle overrun");
                    return Err(Error::Overrun {
                        elapsed_us: busy_us,
                        period_us: cycle.min_period_us,
                    });
                }
            }
        } else {
            let remaining = deadline.remaining(now_us);
            self.delay
                .delay_us(u32::try_from(remaining).unwrap_or(u32::MAX));
        }

        Ok(CycleReport {
            attitude,
            delta_time,
            busy_us,
            overrun,
            flags: self.filter.flags(),
        })
    }

    /// Calibrate if needed, then cycle until a fatal error
    pub fn run<K>(&mut self, mut sink: K) -> Result<Infallible>
    where
        K: AttitudeSink,
    {
        if self.bias.is_none() {
            self.calibrate()?;
        }
        tracing::info!(
            period_us = self.settings.cycle.min_period_us,
            window = self.smoothing.window(),
            correction_gain = self.settings.fusion.correction_gain,
            "Sample loop running"
        );
        loop {
            self.step_with(&mut sink)?;
        }
    }

    fn log_diagnostics(&mut self, now_us: u64, attitude: &Attitude) {
        if self.diagnostics.ready(now_us) {
            tracing::info!(
                roll = attitude.roll,
                pitch = attitude.pitch,
                yaw = attitude.yaw,
                "Attitude"
            );
        }
    }

    /// Gyroscope bias, once calibrated
    pub fn bias(&self) -> Option<GyroBias> {
        self.bias
    }

    /// Cycles that ran past their period so far
    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    pub fn filter(&self) -> &OrientationFilter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut OrientationFilter {
        &mut self.filter
    }

    pub fn smoothing(&self) -> &MovingAverage<W> {
        &self.smoothing
    }

    pub fn timing(&self) -> &SampleTiming {
        &self.timing
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Give back the source, the clock and the delay provider
    pub fn release(self) -> (S, C, D) {
        (self.source, self.clock, self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AcquireError, ConfigError};
    use crate::timing::ManualClock;
    use crate::types::{CalibrationSettings, CycleSettings, RawSample, SmoothingSettings};

    /// Constant sample that takes `busy_us` of clock time to acquire
    struct Steady<'a> {
        clock: &'a ManualClock,
        sample: RawSample,
        busy_us: u64,
        calls: u32,
        fail_after: Option<u32>,
        rewind_to: Option<u64>,
    }

    impl<'a> Steady<'a> {
        fn new(clock: &'a ManualClock) -> Self {
            Self {
                clock,
                sample: RawSample::new([0, 0, 4096], [20, -10, 5]),
                busy_us: 500,
                calls: 0,
                fail_after: None,
                rewind_to: None,
            }
        }
    }

    impl RawSampleSource for Steady<'_> {
        fn acquire(&mut self) -> core::result::Result<RawSample, AcquireError> {
            self.calls += 1;
            match self.rewind_to.take() {
                Some(us) => self.clock.set(us),
                None => self.clock.advance(self.busy_us),
            }
            match self.fail_after {
                Some(limit) if self.calls > limit => Err(AcquireError::Timeout { polls: 10 }),
                _ => Ok(self.sample),
            }
        }
    }

    struct ClockDelay<'a>(&'a ManualClock);

    impl DelayNs for ClockDelay<'_> {
        fn delay_ns(&mut self, ns: u32) {
            self.0.advance(u64::from(ns / 1_000));
        }
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            calibration: CalibrationSettings {
                sample_count: 30,
                sample_delay_us: 3_000,
            },
            ..Default::default()
        }
    }

    type TestLoop<'a> = SampleLoop<Steady<'a>, &'a ManualClock, ClockDelay<'a>>;

    fn build(clock: &ManualClock, settings: PipelineSettings) -> TestLoop<'_> {
        SampleLoop::new(settings, Steady::new(clock), clock, ClockDelay(clock)).unwrap()
    }

    #[test]
    fn test_invalid_settings_fail_fast() {
        let clock = ManualClock::new();
        let mut bad = settings();
        bad.cycle = CycleSettings {
            min_period_us: 0,
            ..Default::default()
        };
        let result: Result<TestLoop<'_>> =
            SampleLoop::new(bad, Steady::new(&clock), &clock, ClockDelay(&clock));
        assert!(matches!(result, Err(Error::Config(ConfigError::CyclePeriod))));
    }

    #[test]
    fn test_window_must_fit_capacity() {
        let clock = ManualClock::new();
        let result = SampleLoop::<_, _, _, 8>::new(
            settings(),
            Steady::new(&clock),
            &clock,
            ClockDelay(&clock),
        );
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::Window {
                window: 15,
                capacity: 8
            }))
        ));
    }

    #[test]
    fn test_step_requires_calibration() {
        let clock = ManualClock::new();
        let mut sample_loop = build(&clock, settings());
        assert!(matches!(sample_loop.step(), Err(Error::NotCalibrated)));
    }

    #[test]
    fn test_calibration_sets_bias() {
        let clock = ManualClock::new();
        let mut sample_loop = build(&clock, settings());

        let bias = sample_loop.calibrate().unwrap();
        assert_eq!(bias, GyroBias::new(20, -10, 5));
        assert_eq!(sample_loop.bias(), Some(bias));
        // 30 samples, each 500 us busy plus 3 ms delay
        assert_eq!(clock.now_us(), 30 * 3_500);
        assert_eq!(sample_loop.smoothing().average(), [0, 0, 4096]);
    }

    #[test]
    fn test_cycles_respect_minimum_period() {
        let clock = ManualClock::new();
        let mut sample_loop = build(&clock, settings());
        sample_loop.calibrate().unwrap();

        let start = clock.now_us();
        let first = sample_loop.step().unwrap();
        assert!((first.delta_time - 0.0055).abs() < 1e-7);
        assert_eq!(first.busy_us, 500);
        assert!(!first.overrun);
        assert_eq!(clock.now_us(), start + 5_500);

        let second = sample_loop.step().unwrap();
        assert!((second.delta_time - 0.0055).abs() < 1e-7);
        assert_eq!(clock.now_us(), start + 11_000);

        // Bias removed, level input: nothing moves
        assert!(second.attitude.roll.abs() < 1e-4);
        assert!(second.attitude.yaw.abs() < 1e-4);
    }

    #[test]
    fn test_tolerated_overrun_skips_wait() {
        let clock = ManualClock::new();
        let mut sample_loop = build(&clock, settings());
        sample_loop.calibrate().unwrap();
        sample_loop.source.busy_us = 7_000;

        let start = clock.now_us();
        let first = sample_loop.step().unwrap();
        assert!(first.overrun);
        assert_eq!(first.busy_us, 7_000);
        assert_eq!(clock.now_us(), start + 7_000);

        let second = sample_loop.step().unwrap();
        assert!((second.delta_time - 0.007).abs() < 1e-7);
        assert_eq!(sample_loop.overruns(), 2);
    }

    #[test]
    fn test_halting_overrun() {
        let clock = ManualClock::new();
        let mut halting = settings();
        halting.cycle.overrun_policy = OverrunPolicy::Halt;
        let mut sample_loop = build(&clock, halting);
        sample_loop.calibrate().unwrap();
        sample_loop.source.busy_us = 6_000;

        assert!(matches!(
            sample_loop.step(),
            Err(Error::Overrun {
                elapsed_us: 6_000,
                period_us: 5_500
            })
        ));
    }

    #[test]
    fn test_idle_wait_bounded_when_clock_wraps() {
        let clock = ManualClock::with_initial(u64::from(u32::MAX) - 1_000);
        let mut sample_loop = build(&clock, settings());
        sample_loop.calibrate().unwrap();
        // 32-bit timer wraps during acquisition
        sample_loop.source.rewind_to = Some(500);

        let report = sample_loop.step().unwrap();
        assert!(!report.overrun);
        assert_eq!(report.busy_us, 0);
        // The delay advances the clock by exactly the wait it was asked for
        assert_eq!(clock.now_us(), 500 + 5_500);

        // Next cycle starts before the previous start: zero step, rejected
        let next = sample_loop.step().unwrap();
        assert_eq!(next.delta_time, 0.0);
        assert!(next.flags.delta_time_rejected);
        assert_eq!(clock.now_us(), 6_000 + 500 + 5_000);
    }

    #[test]
    fn test_run_publishes_until_source_fails() {
        let clock = ManualClock::new();
        let mut sample_loop = build(&clock, settings());
        // 30 calibration samples, then 10 cycles
        sample_loop.source.fail_after = Some(40);

        let mut published = 0;
        let result = sample_loop.run(|_: &Attitude| published += 1);

        assert!(matches!(
            result,
            Err(Error::Acquisition {
                attempts: 3,
                source: AcquireError::Timeout { polls: 10 }
            })
        ));
        assert_eq!(published, 10);
    }

    #[test]
    fn test_smaller_window() {
        let clock = ManualClock::new();
        let small = PipelineSettings {
            smoothing: SmoothingSettings { window: 4 },
            ..settings()
        };
        let mut sample_loop: SampleLoop<_, _, _, 4> =
            SampleLoop::new(small, Steady::new(&clock), &clock, ClockDelay(&clock)).unwrap();
        sample_loop.set_bias(GyroBias::new(20, -10, 5));
        let report = sample_loop.step().unwrap();
        // Zero-filled buffer: one quarter of gravity after the first push
        assert_eq!(sample_loop.smoothing().average(), [0, 0, 1024]);
        assert!(report.attitude.roll.abs() < 1e-4);
    }
}
