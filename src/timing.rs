//! Time abstraction for the sample loop
//!
//! The loop never reads a hardware timer directly. It asks a [`Clock`] for a
//! monotonic microsecond count, derives the integration step from the
//! difference between cycle starts ([`SampleTiming`]) and exposes the end of
//! each cycle as an observable [`CycleDeadline`] instead of spinning on a
//! timer register.

use core::cell::Cell;

/// Monotonic microsecond time source
///
/// # Example
///
/// ```
/// use madgwick_attitude::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let start = clock.now_us();
/// clock.advance(5_500);
/// assert_eq!(clock.elapsed_since(start), 5_500);
/// ```
pub trait Clock {
    /// Microseconds since an arbitrary fixed origin
    fn now_us(&self) -> u64;

    /// Microseconds elapsed since `reference_us`
    ///
    /// Saturates at zero if the clock reads earlier than the reference.
    fn elapsed_since(&self, reference_us: u64) -> u64 {
        self.now_us().saturating_sub(reference_us)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// Clock advanced by hand
///
/// For host testing and for replaying recorded streams where time comes from
/// the recording rather than a timer.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    current_us: Cell<u64>,
}

impl ManualClock {
    /// Start at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at the given time
    pub fn with_initial(us: u64) -> Self {
        Self {
            current_us: Cell::new(us),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, us: u64) {
        self.current_us.set(us);
    }

    /// Move time forward
    pub fn advance(&self, us: u64) {
        self.current_us.set(self.current_us.get().saturating_add(us));
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.current_us.get()
    }
}

/// Interval between consecutive cycle starts
///
/// Produces the integration step handed to the orientation filter. The step
/// is always measured, never assumed, except on the very first cycle where
/// there is no previous start and the nominal period stands in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleTiming {
    /// Start of the previous cycle
    previous_us: Option<u64>,
    /// Last measured interval
    interval_us: u64,
}

impl SampleTiming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a cycle and return the step since the previous one in seconds
    ///
    /// A clock that reads earlier than the previous start yields a zero step,
    /// which the orientation filter rejects.
    pub fn begin_cycle(&mut self, now_us: u64, nominal_period_us: u32) -> f32 {
        self.interval_us = match self.previous_us {
            Some(previous_us) => now_us.saturating_sub(previous_us),
            None => u64::from(nominal_period_us),
        };
        self.previous_us = Some(now_us);
        self.interval_us as f32 * 1e-6
    }

    /// Last measured interval in microseconds
    pub fn interval_us(&self) -> u64 {
        self.interval_us
    }

    /// Start of the most recent cycle, if any
    pub fn previous_start_us(&self) -> Option<u64> {
        self.previous_us
    }

    /// Forget the previous cycle start
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// End of the current cycle's time budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleDeadline {
    /// Cycle start
    pub start_us: u64,
    /// Minimum cycle length
    pub period_us: u32,
}

impl CycleDeadline {
    pub fn new(start_us: u64, period_us: u32) -> Self {
        Self {
            start_us,
            period_us,
        }
    }

    /// Absolute time at which the next cycle may start
    pub fn deadline_us(&self) -> u64 {
        self.start_us.saturating_add(u64::from(self.period_us))
    }

    /// Time spent since the cycle started
    pub fn elapsed(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.start_us)
    }

    /// Time left before the deadline, zero once it has passed
    ///
    /// Never more than the period, even if the clock reads earlier than the
    /// cycle start.
    pub fn remaining(&self, now_us: u64) -> u64 {
        u64::from(self.period_us).saturating_sub(self.elapsed(now_us))
    }

    /// Whether the cycle has used more than its period
    pub fn is_overrun(&self, now_us: u64) -> bool {
        self.elapsed(now_us) > u64::from(self.period_us)
    }
}

/// Rate limit for periodic events such as diagnostics logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    period_us: u32,
    last_us: Option<u64>,
}

impl Throttle {
    /// A period of zero never fires
    pub fn new(period_us: u32) -> Self {
        Self {
            period_us,
            last_us: None,
        }
    }

    /// Whether the event may fire at `now_us`; records the firing if so
    pub fn ready(&mut self, now_us: u64) -> bool {
        if self.period_us == 0 {
            return false;
        }
        let due = match self.last_us {
            Some(last_us) => now_us.saturating_sub(last_us) >= u64::from(self.period_us),
            None => true,
        };
        if due {
            self.last_us = Some(now_us);
        }
        due
    }
}
