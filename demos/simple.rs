//! Attitude estimation against a simulated sensor on the host
//!
//! Stands in a noisy, tilted, stationary IMU for the real MPU-6050, uses the
//! host's monotonic clock and sleeps for the idle wait.
//!
//! Run with: `RUST_LOG=info cargo run --example simple`

use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use madgwick_attitude::{
    AcquireError, Attitude, CalibrationSettings, Clock, PipelineSettings, RawSample,
    RawSampleSource, SampleLoop,
};
use rand::prelude::*;
use rand_pcg::Pcg64;
use tracing_subscriber::EnvFilter;

const CYCLES: usize = 1_000;

/// Board resting at about 14 deg of roll with a gyroscope bias
struct SimulatedImu {
    rng: Pcg64,
}

impl RawSampleSource for SimulatedImu {
    fn acquire(&mut self) -> Result<RawSample, AcquireError> {
        let mut noise = |spread: i16| self.rng.random_range(-spread..=spread);
        Ok(RawSample::new(
            [noise(10), 1024 + noise(10), 3967 + noise(10)],
            [-23 + noise(4), 41 + noise(4), 7 + noise(4)],
        ))
    }
}

struct HostClock(Instant);

impl Clock for HostClock {
    fn now_us(&self) -> u64 {
        self.0.elapsed().as_micros() as u64
    }
}

struct HostDelay;

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

fn main() -> Result<(), madgwick_attitude::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings = PipelineSettings {
        calibration: CalibrationSettings {
            sample_count: 300,
            ..Default::default()
        },
        ..Default::default()
    };
    let imu = SimulatedImu {
        rng: Pcg64::seed_from_u64(1),
    };
    let mut sample_loop: SampleLoop<_, _, _> =
        SampleLoop::new(settings, imu, HostClock(Instant::now()), HostDelay)?;

    let bias = sample_loop.calibrate()?;
    println!("Gyroscope bias: {:?}", bias.offset);

    let mut cycle = 0;
    let mut print_every_tenth = |attitude: &Attitude| {
        if cycle % 10 == 0 {
            println!(
                "Roll: {:.2}, Pitch: {:.2}, Yaw: {:.2}",
                attitude.roll, attitude.pitch, attitude.yaw
            );
        }
        cycle += 1;
    };

    for _ in 0..CYCLES {
        sample_loop.step_with(&mut print_every_tenth)?;
    }
    println!("Overruns: {}", sample_loop.overruns());
    Ok(())
}
