use rppal::i2c::I2c;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{info, trace, warn};

use crate::calibration::heading_from_field;
use crate::config::CompassConfig;
use crate::error::{QiblaError, Result};
use crate::heading::RawOrientationEvent;
use crate::orientation::{OrientationCapability, OrientationSink};
use crate::subscription::Subscription;

// LIS3MDL Register addresses
const WHO_AM_I: u8 = 0x0F;
const CTRL_REG1: u8 = 0x20;
const CTRL_REG2: u8 = 0x21;
const CTRL_REG3: u8 = 0x22;
const CTRL_REG4: u8 = 0x23;
const CTRL_REG5: u8 = 0x24;
const STATUS_REG: u8 = 0x27;
const OUT_X_L: u8 = 0x28;

const LIS3MDL_ID: u8 = 0x3D;

fn i2c_error(err: rppal::i2c::Error) -> QiblaError {
    QiblaError::OrientationUnavailable(format!("I2C: {}", err))
}

/// LIS3MDL magnetometer on the Raspberry Pi I2C bus.
pub struct CompassSensor {
    i2c: I2c,
    config: CompassConfig,
}

impl CompassSensor {
    pub fn new(config: &CompassConfig) -> Result<Self> {
        let mut i2c = I2c::new().map_err(i2c_error)?;
        i2c.set_slave_address(config.i2c_address)
            .map_err(i2c_error)?;

        let who_am_i = i2c.smbus_read_byte(WHO_AM_I).map_err(i2c_error)?;
        if who_am_i != LIS3MDL_ID {
            return Err(QiblaError::OrientationUnavailable(format!(
                "wrong device ID: 0x{:02X}, expected 0x{:02X}",
                who_am_i, LIS3MDL_ID
            )));
        }

        // CTRL_REG1: Temperature enabled, Ultra-high performance mode (X,Y), ODR = 80 Hz
        // CTRL_REG2: Full scale ±4 gauss
        // CTRL_REG3: Continuous conversion mode
        // CTRL_REG4: Ultra-high performance mode (Z-axis), little endian
        // CTRL_REG5: Block data update enabled
        for (register, value) in [
            (CTRL_REG1, 0xFC),
            (CTRL_REG2, 0x00),
            (CTRL_REG3, 0x00),
            (CTRL_REG4, 0x0C),
            (CTRL_REG5, 0x40),
        ] {
            i2c.smbus_write_byte(register, value).map_err(i2c_error)?;
        }

        thread::sleep(Duration::from_millis(100));

        let status = i2c.smbus_read_byte(STATUS_REG).map_err(i2c_error)?;
        if status == 0 {
            return Err(QiblaError::OrientationUnavailable(
                "magnetometer not responding (no data ready)".into(),
            ));
        }

        info!("compass (LIS3MDL) initialized at 0x{:02X}", config.i2c_address);
        Ok(Self {
            i2c,
            config: config.clone(),
        })
    }

    /// Calibrated heading, degrees clockwise from magnetic north.
    pub fn read_heading(&mut self) -> Result<f64> {
        let (x, y) = self.read_raw_magnetometer()?;
        Ok(heading_from_field(x, y, &self.config))
    }

    /// Raw X and Y magnetometer values (for calibration)
    pub fn read_raw_magnetometer(&mut self) -> Result<(f64, f64)> {
        let status = self.i2c.smbus_read_byte(STATUS_REG).map_err(i2c_error)?;
        if status & 0x08 == 0 {
            return Err(QiblaError::OrientationUnavailable(
                "magnetometer data not ready".into(),
            ));
        }

        let mut data = [0u8; 4];
        for (i, item) in data.iter_mut().enumerate() {
            *item = self
                .i2c
                .smbus_read_byte(OUT_X_L + i as u8)
                .map_err(i2c_error)?;
        }

        let x = i16::from_le_bytes([data[0], data[1]]) as f64;
        let y = i16::from_le_bytes([data[2], data[3]]) as f64;
        Ok((x, y))
    }
}

/// Polls a [`CompassSensor`] on its own thread and feeds the readings as
/// orientation events.
pub struct MagnetometerCompass {
    config: CompassConfig,
}

impl MagnetometerCompass {
    pub fn new(config: CompassConfig) -> Self {
        Self { config }
    }
}

impl OrientationCapability for MagnetometerCompass {
    fn subscribe(&self, mut sink: OrientationSink) -> Result<Subscription> {
        let (subscription, token) = Subscription::new("lis3mdl");
        let (ready_tx, ready_rx) = mpsc::channel();
        let config = self.config.clone();
        let interval = Duration::from_millis(config.poll_interval_ms);

        thread::spawn(move || {
            let mut sensor = match CompassSensor::new(&config) {
                Ok(sensor) => {
                    let _ = ready_tx.send(Ok(()));
                    sensor
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            while token.is_active() {
                match sensor.read_heading() {
                    // the magnetometer is not referenced to true north
                    Ok(heading) => sink(RawOrientationEvent::from_compass(heading, false)),
                    Err(e) => trace!("compass read skipped: {}", e),
                }
                thread::sleep(interval);
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(subscription),
            Ok(Err(e)) => {
                warn!("compass unavailable: {}", e);
                Err(e)
            }
            Err(_) => Err(QiblaError::OrientationUnavailable(
                "compass thread exited during startup".into(),
            )),
        }
    }
}
