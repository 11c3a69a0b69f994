//! Record simulated sensor samples.

use anyhow::{Context, Result};
use wearsync_client::{spawn_ingestion, Config, FlushReport, SensorLocks};
use wearsync_types::{SensorEvent, SensorId, Timestamp};

use super::open_store;

/// Run the record command.
///
/// Samples are spaced `interval_ms` apart and end at the current time.
pub async fn run(config: &Config, sensors: &[String], count: usize, interval_ms: i64) -> Result<()> {
    let sensors: Vec<String> = if sensors.is_empty() {
        config.sensors.ids.clone()
    } else {
        sensors.to_vec()
    };
    if sensors.is_empty() {
        anyhow::bail!("No sensors to record. Pass --sensor or set [sensors] ids in the config.");
    }
    if interval_ms <= 0 {
        anyhow::bail!("--interval-ms must be positive");
    }
    if let Some(bad) = sensors
        .iter()
        .find(|s| !SensorId::new(s.as_str()).is_wire_safe())
    {
        anyhow::bail!("Invalid sensor id {:?}: blank or contains a line break", bad);
    }

    let store = open_store(config).await?;
    let (ingest, task) = spawn_ingestion(store, &config.ingest, SensorLocks::new());

    let end = Timestamp::now().as_millis();
    let start = end - interval_ms * count.saturating_sub(1) as i64;
    for i in 0..count {
        let ts = Timestamp::from_millis(start + interval_ms * i as i64);
        for sensor in &sensors {
            ingest
                .submit(simulated_sample(sensor, ts, i))
                .context("Ingestion stopped unexpectedly")?;
        }
    }

    let report = task.shutdown().await?;
    print_report(&sensors, count, &report);

    if report.retained > 0 {
        anyhow::bail!("{} samples could not be stored", report.retained);
    }
    Ok(())
}

/// A plausible reading for a sensor, so exported data looks real.
fn simulated_sample(sensor: &str, ts: Timestamp, i: usize) -> SensorEvent {
    let phase = i as f64 / 10.0;
    let event = SensorEvent::new(sensor, ts);
    match sensor {
        "hr" | "heart_rate" => event.with_field("bpm", 70 + (phase.sin() * 8.0).round() as i64),
        "temp" | "skin_temp" => event.with_field("celsius", format!("{:.2}", 33.5 + phase.cos() * 0.4)),
        "accel" => event
            .with_field("x", format!("{:.3}", phase.sin()))
            .with_field("y", format!("{:.3}", phase.cos()))
            .with_field("z", "9.810"),
        _ => event.with_field("value", format!("{:.3}", phase.sin())),
    }
}

fn print_report(sensors: &[String], count: usize, report: &FlushReport) {
    println!("Recorded {} samples for {} sensor(s)", count, sensors.len());
    println!();
    println!("  Sensors:   {}", sensors.join(", "));
    println!("  Persisted: {}", report.persisted);
    if report.retained > 0 {
        println!("  Lost:      {}", report.retained);
    }
}
