//! Replays a recorded stream and plots the estimated attitude
//!
//! Runs the recorded stationary, tilted sensor through calibration and fusion
//! twice, once with the fast inverse square root and once with libm, and
//! draws roll, pitch and yaw for both.
//!
//! Run with: `cargo run --example attitude_plot`

use std::error::Error;

use madgwick_attitude::{
    Attitude, CalibrationSettings, FusionSettings, GyroBiasCalibrator, MovingAverage,
    Normalization, OrientationFilter, RawSample, SmoothingSettings,
};
use plotters::prelude::*;
use serde::Deserialize;

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

fn main() -> Result<(), Box<dyn Error>> {
    let mut reader = csv::Reader::from_path("testdata/stationary_tilted.csv")?;
    let mut frames = Vec::new();
    for result in reader.deserialize() {
        let frame: Frame = result?;
        frames.push(frame);
    }
    println!("Loaded {} frames", frames.len());

    let fast = replay(&frames, Normalization::Fast)?;
    let exact = replay(&frames, Normalization::Exact)?;

    if let (Some((_, f)), Some((_, e))) = (fast.last(), exact.last()) {
        println!(
            "Fast:  Roll: {:.3}, Pitch: {:.3}, Yaw: {:.3}",
            f.roll, f.pitch, f.yaw
        );
        println!(
            "Exact: Roll: {:.3}, Pitch: {:.3}, Yaw: {:.3}",
            e.roll, e.pitch, e.yaw
        );
    }

    plot(&fast, &exact)?;
    println!("Plot saved to attitude_plot.png");
    Ok(())
}

/// Calibrate on the first frames, fuse the rest with recorded timestamps
fn replay(
    frames: &[Frame],
    normalization: Normalization,
) -> Result<Vec<(f32, Attitude)>, Box<dyn Error>> {
    let calibration = CalibrationSettings::default();
    let (warmup, stream) = frames.split_at(calibration.sample_count as usize);

    let mut calibrator = GyroBiasCalibrator::new(calibration)?;
    let mut smoothing: MovingAverage = MovingAverage::new(SmoothingSettings::default())?;
    for frame in warmup {
        let sample = frame.sample();
        calibrator.add_sample(sample.gyroscope);
        smoothing.update(sample.accelerometer_array());
    }
    let bias = calibrator.bias().ok_or("not enough frames to calibrate")?;

    let mut filter = OrientationFilter::with_settings(FusionSettings {
        normalization,
        ..Default::default()
    });
    let start = warmup[warmup.len() - 1].time;
    let mut previous = start;
    let mut attitudes = Vec::with_capacity(stream.len());

    for frame in stream {
        let sample = frame.sample();
        let accelerometer = smoothing.update_vector(sample.accelerometer).map(f32::from);
        let delta_time = (frame.time - previous) as f32 * 1e-6;
        previous = frame.time;

        let attitude = filter.update(accelerometer, bias.correct(sample.gyroscope), delta_time);
        attitudes.push(((frame.time - start) as f32 * 1e-6, attitude));
    }
    Ok(attitudes)
}

fn plot(fast: &[(f32, Attitude)], exact: &[(f32, Attitude)]) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new("attitude_plot.png", (1000, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let end = fast.last().map(|(t, _)| *t).unwrap_or(1.0);
    let mut chart = ChartBuilder::on(&root)
        .caption("Attitude from recorded stream", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f32..end, -5f32..20f32)?;

    chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_desc("Degrees")
        .draw()?;

    let series: [(&str, &[(f32, Attitude)], fn(&Attitude) -> f32, RGBColor); 6] = [
        ("Roll (fast)", fast, |a| a.roll, RED),
        ("Pitch (fast)", fast, |a| a.pitch, GREEN),
        ("Yaw (fast)", fast, |a| a.yaw, BLUE),
        ("Roll (exact)", exact, |a| a.roll, MAGENTA),
        ("Pitch (exact)", exact, |a| a.pitch, CYAN),
        ("Yaw (exact)", exact, |a| a.yaw, BLACK),
    ];

    for (label, data, angle, color) in series {
        chart
            .draw_series(LineSeries::new(
                data.iter().map(|(t, attitude)| (*t, angle(attitude))),
                &color,
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
