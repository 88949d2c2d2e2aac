//! GPS receiver as a location capability.
//!
//! The receiver writes NMEA 0183 sentences to a serial device (or any file
//! replaying them). Sentences are folded into a running `Nmea` state and a
//! fix is produced whenever a position sentence carries a valid position.

use nmea::{Nmea, SentenceType};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::{GPS_RANGE_ERROR_M, GpsConfig};
use crate::error::{LocationErrorCode, QiblaError, Result};
use crate::location::{LocationCapability, LocationFix, LocationOptions, LocationSink};
use crate::position::GeoCoordinate;
use crate::subscription::Subscription;

/// Turns NMEA lines into location fixes.
pub struct NmeaReceiver {
    nmea: Nmea,
    range_error_m: f64,
}

impl Default for NmeaReceiver {
    fn default() -> Self {
        Self::new(GPS_RANGE_ERROR_M)
    }
}

impl NmeaReceiver {
    /// `range_error_m` scales HDOP into an accuracy radius.
    pub fn new(range_error_m: f64) -> Self {
        Self {
            nmea: Nmea::default(),
            range_error_m,
        }
    }

    /// Feed one line. Returns a fix when the line is a position sentence
    /// (GGA, RMC, GLL) and the receiver currently has a valid position.
    pub fn feed(&mut self, line: &str) -> Option<LocationFix> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let sentence = match self.nmea.parse(trimmed) {
            Ok(sentence) => sentence,
            Err(e) => {
                trace!("skipping NMEA line '{}': {}", trimmed, e);
                return None;
            }
        };

        if !matches!(
            sentence,
            SentenceType::GGA | SentenceType::RMC | SentenceType::GLL
        ) {
            return None;
        }

        if self.nmea.fix_type.is_some_and(|fix_type| !fix_type.is_valid()) {
            debug!("receiver reports no fix");
            return None;
        }

        let (Some(lat), Some(lon)) = (self.nmea.latitude, self.nmea.longitude) else {
            return None;
        };

        let coordinate = GeoCoordinate::new(lat, lon);
        if !coordinate.is_valid() {
            warn!("receiver produced out-of-range position {}", coordinate);
            return None;
        }

        if let Some(num_sats) = self.nmea.num_of_fix_satellites {
            trace!(satellites = num_sats, "position sentence");
        }

        let mut fix = LocationFix::new(coordinate);
        if let Some(hdop) = self.nmea.hdop {
            fix = fix.with_accuracy(f64::from(hdop) * self.range_error_m);
        }
        Some(fix)
    }
}

/// Read lines on a worker thread and hand them over one by one. The worker
/// exits once the receiving side is dropped and the next line arrives.
fn spawn_line_reader<R>(reader: R) -> Receiver<io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in reader.lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                return;
            }
        }
    });
    rx
}

/// Read lines until the first fix, the deadline, or the end of the stream.
///
/// The deadline holds even when the stream stops producing data.
pub fn read_fix<R>(
    reader: R,
    receiver: &mut NmeaReceiver,
    options: &LocationOptions,
) -> Result<LocationFix>
where
    R: BufRead + Send + 'static,
{
    let started = Instant::now();
    let lines = spawn_line_reader(reader);
    let timed_out = || {
        QiblaError::location(
            LocationErrorCode::Timeout,
            format!("no GPS fix within {}ms", options.timeout.as_millis()),
        )
    };

    loop {
        let remaining = options.timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(timed_out());
        }
        match lines.recv_timeout(remaining) {
            Ok(Ok(content)) => {
                if let Some(fix) = receiver.feed(&content) {
                    return Ok(fix);
                }
            }
            Ok(Err(e)) => {
                return Err(QiblaError::location(
                    LocationErrorCode::PositionUnavailable,
                    format!("error reading GPS stream: {}", e),
                ));
            }
            Err(RecvTimeoutError::Timeout) => return Err(timed_out()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(QiblaError::location(
                    LocationErrorCode::PositionUnavailable,
                    "GPS stream ended without a fix",
                ));
            }
        }
    }
}

fn open_error(path: &Path, err: io::Error) -> QiblaError {
    let code = match err.kind() {
        io::ErrorKind::NotFound => LocationErrorCode::Unsupported,
        io::ErrorKind::PermissionDenied => LocationErrorCode::PermissionDenied,
        _ => LocationErrorCode::PositionUnavailable,
    };
    QiblaError::location(code, format!("cannot open {}: {}", path.display(), err))
}

/// A GPS receiver reachable through a serial device path.
pub struct SerialGps {
    device: PathBuf,
    range_error_m: f64,
    last_fix: Mutex<Option<LocationFix>>,
}

impl SerialGps {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            range_error_m: GPS_RANGE_ERROR_M,
            last_fix: Mutex::new(None),
        }
    }

    pub fn from_config(config: &GpsConfig) -> Self {
        Self {
            device: config.device.clone(),
            range_error_m: config.range_error_m,
            last_fix: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    fn open(&self) -> Result<BufReader<File>> {
        let file = File::open(&self.device).map_err(|e| open_error(&self.device, e))?;
        Ok(BufReader::new(file))
    }

    fn cached_fix(&self, options: &LocationOptions) -> Option<LocationFix> {
        if options.maximum_age.is_zero() {
            return None;
        }
        let cached = (*self.last_fix.lock())?;
        (cached.age(chrono::Utc::now()) <= options.maximum_age).then_some(cached)
    }
}

impl LocationCapability for SerialGps {
    fn current_fix(&self, options: &LocationOptions) -> Result<LocationFix> {
        if let Some(fix) = self.cached_fix(options) {
            debug!("reusing cached GPS fix {}", fix);
            return Ok(fix);
        }

        debug!("opening {}", self.device.display());
        let reader = self.open()?;
        let mut receiver = NmeaReceiver::new(self.range_error_m);
        let fix = read_fix(reader, &mut receiver, options)?;

        *self.last_fix.lock() = Some(fix);
        Ok(fix)
    }

    /// Stream fixes from the device on a worker thread.
    ///
    /// The worker checks the subscription between lines, so after `stop()` it
    /// stays blocked in `read` (holding the device open) until the receiver
    /// sends its next line, and then exits without delivering it.
    fn watch(&self, _options: &LocationOptions, mut sink: LocationSink) -> Result<Subscription> {
        let reader = self.open()?;
        let (subscription, token) = Subscription::new("nmea-gps");
        let range_error_m = self.range_error_m;
        let device = self.device.clone();

        info!("reading GPS data from {}", device.display());
        thread::spawn(move || {
            let mut receiver = NmeaReceiver::new(range_error_m);

            for line in reader.lines() {
                if !token.is_active() {
                    return;
                }
                match line {
                    Ok(content) => {
                        if let Some(fix) = receiver.feed(&content) {
                            sink(Ok(fix));
                        }
                    }
                    Err(e) => {
                        sink(Err(QiblaError::location(
                            LocationErrorCode::PositionUnavailable,
                            format!("error reading GPS stream: {}", e),
                        )));
                        return;
                    }
                }
            }

            if token.is_active() {
                sink(Err(QiblaError::location(
                    LocationErrorCode::PositionUnavailable,
                    format!("GPS stream {} closed", device.display()),
                )));
            }
        });

        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::sync::mpsc;
    use std::time::Duration;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
    const GGA_WEST: &str = "$GPGGA,092750.000,5321.6802,N,00630.3372,W,1,8,1.03,61.7,M,55.2,M,,*76";
    const GGA_NO_FIX: &str = "$GPGGA,123520,,,,,0,00,,,M,,M,,*61";

    #[test]
    fn test_gga_produces_fix() {
        let mut receiver = NmeaReceiver::default();
        let fix = receiver.feed(GGA).expect("GGA should yield a fix");

        assert!((fix.coordinate.latitude - 48.1173).abs() < 1e-6);
        assert!((fix.coordinate.longitude - 11.516_666_666).abs() < 1e-6);
        let accuracy = fix.accuracy.expect("HDOP present");
        assert!((accuracy - 4.5).abs() < 1e-4);
    }

    #[test]
    fn test_rmc_and_west_longitude() {
        let mut receiver = NmeaReceiver::default();
        let fix = receiver.feed(RMC).expect("RMC should yield a fix");
        assert!((fix.coordinate.latitude - 48.1173).abs() < 1e-6);

        let fix = receiver.feed(GGA_WEST).expect("GGA should yield a fix");
        assert!((fix.coordinate.latitude - 53.36134).abs() < 1e-5);
        assert!((fix.coordinate.longitude + 6.50562).abs() < 1e-5);
    }

    #[test]
    fn test_garbage_and_invalid_fix_ignored() {
        let mut receiver = NmeaReceiver::default();
        assert!(receiver.feed("").is_none());
        assert!(receiver.feed("not a sentence").is_none());
        // bad checksum
        assert!(receiver.feed("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*00").is_none());
        assert!(receiver.feed(GGA_NO_FIX).is_none());
    }

    #[test]
    fn test_read_fix_from_stream() {
        let stream = format!("garbage\n{}\n{}\n", GGA_NO_FIX, GGA_WEST);
        let mut receiver = NmeaReceiver::default();
        let fix = read_fix(
            Cursor::new(stream),
            &mut receiver,
            &LocationOptions::default(),
        )
        .unwrap();
        assert!((fix.coordinate.latitude - 53.36134).abs() < 1e-5);
    }

    #[test]
    fn test_read_fix_failures() {
        let mut receiver = NmeaReceiver::default();
        let ended = read_fix(
            Cursor::new(format!("{}\n", GGA_NO_FIX)),
            &mut receiver,
            &LocationOptions::default(),
        );
        assert!(matches!(
            ended,
            Err(QiblaError::LocationUnavailable {
                code: LocationErrorCode::PositionUnavailable,
                ..
            })
        ));

        let options = LocationOptions {
            timeout: Duration::ZERO,
            maximum_age: Duration::ZERO,
        };
        let timed_out = read_fix(
            Cursor::new(format!("{}\n", GGA)),
            &mut NmeaReceiver::default(),
            &options,
        );
        assert!(matches!(
            timed_out,
            Err(QiblaError::LocationUnavailable {
                code: LocationErrorCode::Timeout,
                ..
            })
        ));
    }

    /// A receiver that is connected but has gone quiet.
    struct StalledReceiver;

    impl io::Read for StalledReceiver {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_secs(2));
            Ok(0)
        }
    }

    #[test]
    fn test_read_fix_times_out_on_silent_stream() {
        let options = LocationOptions {
            timeout: Duration::from_millis(100),
            maximum_age: Duration::ZERO,
        };
        let started = Instant::now();
        let result = read_fix(
            BufReader::new(StalledReceiver),
            &mut NmeaReceiver::default(),
            &options,
        );

        assert!(matches!(
            result,
            Err(QiblaError::LocationUnavailable {
                code: LocationErrorCode::Timeout,
                ..
            })
        ));
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "returned after {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_missing_device_is_unsupported() {
        let gps = SerialGps::new("/nonexistent/serial0");
        let result = gps.current_fix(&LocationOptions::default());
        assert!(matches!(
            result,
            Err(QiblaError::LocationUnavailable {
                code: LocationErrorCode::Unsupported,
                ..
            })
        ));
    }

    #[test]
    fn test_serial_gps_from_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "{}", GGA)?;

        let gps = SerialGps::new(file.path());
        let fix = gps.current_fix(&LocationOptions::default())?;
        assert!((fix.coordinate.latitude - 48.1173).abs() < 1e-6);

        // the cached fix is reused while fresh enough
        drop(file);
        let options = LocationOptions {
            maximum_age: Duration::from_secs(60),
            ..LocationOptions::default()
        };
        assert_eq!(gps.current_fix(&options)?, fix);
        assert!(gps.current_fix(&LocationOptions::default()).is_err());
        Ok(())
    }

    #[test]
    fn test_watch_streams_fixes() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "{}", GGA)?;
        writeln!(file, "{}", GGA_WEST)?;

        let gps = SerialGps::new(file.path());
        let (tx, rx) = mpsc::channel();
        let _subscription = gps.watch(
            &LocationOptions::default(),
            Box::new(move |update: Result<LocationFix>| {
                let _ = tx.send(update);
            }),
        )?;

        let first = rx.recv_timeout(Duration::from_secs(2))??;
        assert!((first.coordinate.latitude - 48.1173).abs() < 1e-6);
        let second = rx.recv_timeout(Duration::from_secs(2))??;
        assert!((second.coordinate.longitude + 6.50562).abs() < 1e-5);

        // end of stream is reported, not retried
        let closed = rx.recv_timeout(Duration::from_secs(2))?;
        assert!(closed.is_err());
        Ok(())
    }
}
