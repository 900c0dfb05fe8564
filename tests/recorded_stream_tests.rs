use std::collections::VecDeque;
use std::error::Error;

use embedded_hal::delay::DelayNs;
use madgwick_attitude::{
    AcquireError, CalibrationSettings, GyroBiasCalibrator, ManualClock, MovingAverage,
    OrientationFilter, PipelineSettings, RawSample, RawSampleSource, SampleLoop,
    SmoothingSettings,
};
use nalgebra::Vector3;
use serde::Deserialize;

/// Stationary board rolled about 14.5 deg, sampled near 182 Hz at +/-8 g and +/-1000 deg/s
const RECORDING: &str = "testdata/stationary_tilted.csv";
const EXPECTED_ROLL: f32 = 14.47;

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "time_us")]
    time: u64,
    accel_x: i16,
    accel_y: i16,
    accel_z: i16,
    gyro_x: i16,
    gyro_y: i16,
    gyro_z: i16,
}

impl Frame {
    fn sample(&self) -> RawSample {
        RawSample::new(
            [self.accel_x, self.accel_y, self.accel_z],
            [self.gyro_x, self.gyro_y, self.gyro_z],
        )
    }
}

fn load() -> Result<Vec<Frame>, Box<dyn Error>> {
    let mut reader = csv::Reader::from_path(RECORDING)?;
    let mut frames = Vec::new();
    for result in reader.deserialize() {
        frames.push(result?);
    }
    Ok(frames)
}

/// Replays the recording with its own timestamps
#[test]
fn test_recorded_stream_settles_at_tilt() -> Result<(), Box<dyn Error>> {
    let frames = load()?;
    assert_eq!(frames.len(), 3_000);

    let calibration = CalibrationSettings::default();
    let (warmup, stream) = frames.split_at(calibration.sample_count as usize);

    let mut calibrator = GyroBiasCalibrator::new(calibration)?;
    let mut smoothing: MovingAverage = MovingAverage::new(SmoothingSettings::default())?;
    for frame in warmup {
        let sample = frame.sample();
        calibrator.add_sample(sample.gyroscope);
        smoothing.update(sample.accelerometer_array());
    }
    let bias = calibrator.bias().ok_or("calibration incomplete")?;

    // Truncated mean of noisy readings
    assert_eq!(bias.offset, Vector3::new(-22, 40, 7));

    let mut filter = OrientationFilter::new();
    let mut previous = warmup[warmup.len() - 1].time;
    for frame in stream {
        let sample = frame.sample();
        let accelerometer = smoothing.update_vector(sample.accelerometer).map(f32::from);
        let gyroscope = bias.correct(sample.gyroscope);
        let delta_time = (frame.time - previous) as f32 * 1e-6;
        previous = frame.time;

        filter.update(accelerometer, gyroscope, delta_time);
        let flags = filter.flags();
        assert!(!flags.accelerometer_ignored && !flags.delta_time_rejected);
    }

    let attitude = filter.attitude();
    assert!(
        (attitude.roll - EXPECTED_ROLL).abs() < 0.25,
        "roll settled at {}",
        attitude.roll
    );
    assert!(attitude.pitch.abs() < 0.2, "pitch settled at {}", attitude.pitch);
    assert!(attitude.yaw.abs() < 0.5, "yaw drifted to {}", attitude.yaw);
    Ok(())
}

struct Playback {
    frames: VecDeque<RawSample>,
}

impl RawSampleSource for Playback {
    fn acquire(&mut self) -> Result<RawSample, AcquireError> {
        self.frames.pop_front().ok_or(AcquireError::Timeout { polls: 0 })
    }
}

struct ClockDelay<'a>(&'a ManualClock);

impl DelayNs for ClockDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.0.advance(u64::from(ns / 1_000));
    }
}

/// Replays the recording through the full loop on a virtual clock
#[test]
fn test_recorded_stream_through_loop() -> Result<(), Box<dyn Error>> {
    let frames = load()?;
    let playback = Playback {
        frames: frames.iter().map(Frame::sample).collect(),
    };
    let clock = ManualClock::new();
    let mut sample_loop: SampleLoop<_, _, _> = SampleLoop::new(
        PipelineSettings::default(),
        playback,
        &clock,
        ClockDelay(&clock),
    )?;

    let mut last = None;
    let error = sample_loop
        .run(|attitude: &madgwick_attitude::Attitude| last = Some(*attitude))
        .err()
        .ok_or("loop ended without an error")?;

    // The loop stops once the recording is exhausted
    assert!(matches!(
        error,
        madgwick_attitude::Error::Acquisition {
            source: AcquireError::Timeout { .. },
            ..
        }
    ));
    assert_eq!(sample_loop.overruns(), 0);

    let attitude = last.ok_or("nothing published")?;
    assert!((attitude.roll - EXPECTED_ROLL).abs() < 0.25, "roll {}", attitude.roll);
    assert!(attitude.pitch.abs() < 0.2);
    assert!(attitude.yaw.abs() < 0.5);
    Ok(())
}
