use anyhow::{Context, Result};
use clap::Parser;
use qibla_rs::config::{QiblaConfig, STATUS_UPDATE_INTERVAL_SECS};
use qibla_rs::geodesy::Distance;
use qibla_rs::nmea_source::SerialGps;
use qibla_rs::orientation::OrientationCapability;
use qibla_rs::{AlignmentSnapshot, Guidance, LocationCapability, QiblaTracker, TrackerEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{Level, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    name = "qibla",
    about = "Shows the direction of the Qibla from a GPS fix and compass heading"
)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device of the GPS receiver
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// Keep following the GPS instead of taking a single fix
    #[arg(short, long)]
    watch: bool,

    /// Take a fresh fix every N seconds
    #[arg(short, long)]
    refresh: Option<u64>,

    /// Print snapshots as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[cfg(feature = "rpi")]
fn orientation_feed(config: &QiblaConfig) -> Box<dyn OrientationCapability> {
    Box::new(qibla_rs::compass_sensor::MagnetometerCompass::new(
        config.compass.clone(),
    ))
}

#[cfg(not(feature = "rpi"))]
fn orientation_feed(_config: &QiblaConfig) -> Box<dyn OrientationCapability> {
    Box::new(qibla_rs::orientation::NoOrientation)
}

fn render(snapshot: &AlignmentSnapshot, config: &QiblaConfig) -> String {
    let Some(bearing) = snapshot.target_bearing else {
        return "Calculating Qibla direction...".to_string();
    };

    let mut line = match snapshot.target_direction(config.direction_resolution) {
        Some(direction) => format!("Qibla {:.1}° ({})", bearing, direction),
        None => "Qibla direction undefined at this position".to_string(),
    };

    if let Some(distance) = snapshot.distance {
        line.push_str(&format!(" | {}", Distance(distance)));
    }
    if let Some(location) = snapshot.location {
        line.push_str(&format!(" | at {}", location));
    }
    if let Some(accuracy) = snapshot.accuracy {
        line.push_str(&format!(" ±{:.0}m", accuracy));
    }

    if snapshot.degenerate {
        return line;
    }

    match (
        snapshot.current_heading,
        snapshot.signed_deviation,
        snapshot.guidance(config.alignment_tolerance_deg),
    ) {
        (Some(heading), Some(deviation), Some(guidance)) => {
            line.push_str(&format!(" | heading {:.1}° | ", heading));
            line.push_str(&match guidance {
                Guidance::Aligned => "facing the Qibla ✓".to_string(),
                Guidance::TurnRight => format!("turn right {:.0}°", deviation),
                Guidance::TurnLeft => format!("turn left {:.0}°", -deviation),
            });
        }
        _ => line.push_str(" | heading unavailable"),
    }
    line
}

fn print_event(event: &TrackerEvent, config: &QiblaConfig, json: bool) -> Result<()> {
    match (event, json) {
        (TrackerEvent::Snapshot(snapshot), true) => {
            println!("{}", serde_json::to_string(snapshot)?)
        }
        (TrackerEvent::Snapshot(snapshot), false) => println!("{}", render(snapshot, config)),
        (TrackerEvent::LocationFailed(failure), true) => println!(
            "{}",
            serde_json::json!({ "location_failed": failure })
        ),
        (TrackerEvent::LocationFailed(failure), false) => println!("⚠ {}", failure),
        (TrackerEvent::OrientationUnavailable, _) => {}
    }
    Ok(())
}

/// Time for another fix, and the previous one (if any) has finished. A
/// receiver that has gone quiet never gets more than one fix in flight.
fn refresh_due<T>(locating: Option<&JoinHandle<T>>, last_located: Instant, every: Duration) -> bool {
    last_located.elapsed() >= every && locating.is_none_or(|handle| handle.is_finished())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => QiblaConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => QiblaConfig::default(),
    };
    if let Some(device) = args.device {
        config.gps.device = device;
    }
    if args.watch {
        config.location.continuous = true;
    }

    let tracker = QiblaTracker::from_config(&config)?;
    let events = tracker.events();

    let orientation = orientation_feed(&config);
    let heading_feed = tracker.start_heading(orientation.as_ref()).ok();
    if heading_feed.is_none() {
        warn!("no compass heading; showing the bearing only");
    }

    let gps: Arc<dyn LocationCapability> = Arc::new(SerialGps::from_config(&config.gps));
    let options = config.location.options();
    info!("waiting for GPS fix on {}", config.gps.device.display());

    let mut locating = None;
    let _tracking = if config.location.continuous {
        Some(tracker.track_location(gps.as_ref(), &options)?)
    } else {
        locating = Some(tracker.locate_once(Arc::clone(&gps), options));
        None
    };

    // Nothing will change after the first fix, so stop there.
    let one_shot =
        !config.location.continuous && args.refresh.is_none() && heading_feed.is_none();
    let refresh = args.refresh.map(Duration::from_secs);
    let status_interval = Duration::from_secs(STATUS_UPDATE_INTERVAL_SECS);

    let mut last_located = Instant::now();
    let mut last_printed: Option<Instant> = None;
    let mut last_guidance = None;

    loop {
        match events.recv_timeout(status_interval) {
            Ok(TrackerEvent::Snapshot(snapshot)) => {
                let guidance = snapshot.guidance(config.alignment_tolerance_deg);
                let due = last_printed.is_none_or(|at| at.elapsed() >= status_interval);
                if due || guidance != last_guidance {
                    print_event(&TrackerEvent::Snapshot(snapshot), &config, args.json)?;
                    last_printed = Some(Instant::now());
                    last_guidance = guidance;
                }
                if one_shot && snapshot.target_bearing.is_some() {
                    return Ok(());
                }
            }
            Ok(event @ TrackerEvent::LocationFailed(_)) => {
                print_event(&event, &config, args.json)?;
                if one_shot {
                    anyhow::bail!("no location available");
                }
            }
            Ok(TrackerEvent::OrientationUnavailable) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }

        if let Some(every) = refresh
            && !config.location.continuous
            && refresh_due(locating.as_ref(), last_located, every)
        {
            locating = Some(tracker.locate_once(Arc::clone(&gps), options));
            last_located = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qibla_rs::{AlignmentReconciler, GeoCoordinate, HeadingSample, HeadingSourceKind};

    fn snapshot_at(heading: Option<f64>) -> AlignmentSnapshot {
        let mut reconciler = AlignmentReconciler::default();
        reconciler
            .on_location_update(GeoCoordinate::new(51.5074, -0.1278))
            .unwrap();
        if let Some(heading) = heading {
            reconciler.on_heading_update(HeadingSample::new(
                heading,
                HeadingSourceKind::Absolute,
                chrono::Utc::now(),
            ));
        }
        reconciler.current_snapshot()
    }

    #[test]
    fn test_refresh_waits_for_pending_fix() {
        let every = Duration::ZERO;
        let last = Instant::now();

        assert!(refresh_due::<()>(None, last, every));
        assert!(!refresh_due::<()>(None, Instant::now(), Duration::from_secs(60)));

        let (release, wait) = std::sync::mpsc::channel::<()>();
        let stuck = std::thread::spawn(move || {
            let _ = wait.recv();
        });
        assert!(!refresh_due(Some(&stuck), last, every));

        release.send(()).unwrap();
        while !stuck.is_finished() {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(refresh_due(Some(&stuck), last, every));
    }

    #[test]
    fn test_render_pending() {
        let config = QiblaConfig::default();
        let line = render(&AlignmentReconciler::default().current_snapshot(), &config);
        assert_eq!(line, "Calculating Qibla direction...");
    }

    #[test]
    fn test_render_without_heading() {
        let line = render(&snapshot_at(None), &QiblaConfig::default());
        assert!(line.starts_with("Qibla 119.0° (ESE)"));
        assert!(line.contains("4793.8 km"));
        assert!(line.contains("at (51.507400°, -0.127800°)"));
        assert!(line.ends_with("heading unavailable"));
    }

    #[test]
    fn test_render_guidance() {
        let config = QiblaConfig::default();
        assert!(render(&snapshot_at(Some(100.0)), &config).ends_with("turn right 19°"));
        assert!(render(&snapshot_at(Some(140.0)), &config).ends_with("turn left 21°"));
        assert!(render(&snapshot_at(Some(118.5)), &config).ends_with("facing the Qibla ✓"));
    }
}
