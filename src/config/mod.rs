//! Configuration for the greenhouse controller.
//!
//! Settings come from `greenhouse.toml`, searched in:
//! 1. the directory given with `--config DIR`
//! 2. **XDG_CONFIG_HOME**/greenhouse/greenhouse.toml
//!
//! A missing file is not an error: every field is optional and falls back to
//! the matching `DEFAULT_` constant. After validation the file is resolved
//! once into [`ControlParams`], which is what the rest of the program sees.
//!
//! ```toml
//! #[Loop]
//! interval = 3             # Seconds between cycles (1-86400)
//! iterations = 10          # Cycles per run, 0 = until stopped
//!
//! #[Evaluation]
//! light_threshold = 100.0  # Lux; strictly above is DAY
//!
//! #[Lighting]
//! lighting_policy = "supplement"   # "supplement", "window" or "off"
//! window_mode = "manual"           # "manual" or "geo"
//! window_start = "06:00:00"        # Manual window start (HH:MM:SS)
//! window_end = "20:00:00"          # Manual window end (HH:MM:SS)
//! latitude = 52.52                 # Geo window coordinates
//! longitude = 13.405
//! timezone = "Europe/Berlin"       # Optional zone for window evaluation
//!
//! #[Time]
//! time_server = "pool.ntp.org"     # Empty string disables network time
//! time_timeout = 2                 # Seconds (1-30)
//! resync_interval = 3600           # Seconds between resyncs
//!
//! #[Storage]
//! database = "greenhouse.db"       # Relative paths resolve against the working directory
//! database_timeout = 5             # Seconds (1-60)
//!
//! #[Devices]
//! device_timeout_ms = 2000         # Per device call (50-30000)
//! sensor_retries = 3               # Extra attempts per cycle (0-10)
//! dht11_pin = 4
//! relay_pin = 17
//! lcd_address = 0x21
//! segment_address = 0x70
//! light_address = 0x5C
//! segment_brightness = 15          # 0-15
//! matrix_intensity = 8             # 0-15
//!
//! #[Logging]
//! log_timestamps = false
//! ```

pub mod loading;
pub mod validation;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::actuator::LightingPolicy;
use crate::common::constants::*;
use crate::time::{GrowthWindow, TimeWindow, WindowSource};

pub use loading::{get_config_path, get_custom_config_dir, load, load_from_path, set_config_dir};

/// Raw contents of `greenhouse.toml`.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub interval: Option<u64>,   // seconds between cycles
    pub iterations: Option<u64>, // 0 = until stopped
    pub light_threshold: Option<f64>,

    pub lighting_policy: Option<String>, // "supplement", "window" or "off"
    pub window_mode: Option<String>,     // "manual" or "geo"
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,

    pub time_server: Option<String>,
    pub time_timeout: Option<u64>,    // seconds
    pub resync_interval: Option<u64>, // seconds

    pub database: Option<String>,
    pub database_timeout: Option<u64>, // seconds

    pub device_timeout_ms: Option<u64>,
    pub sensor_retries: Option<u32>,
    pub dht11_pin: Option<u8>,
    pub relay_pin: Option<u8>,
    pub lcd_address: Option<u16>,
    pub segment_address: Option<u16>,
    pub light_address: Option<u16>,
    pub segment_brightness: Option<u8>,
    pub matrix_intensity: Option<u8>,

    pub log_timestamps: Option<bool>,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Overrides {
    pub iterations: Option<u64>,
    pub forever: bool,
    pub interval: Option<u64>,
}

/// Fully resolved settings, passed by value into the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlParams {
    pub interval: Duration,
    /// `None` runs until stopped.
    pub iterations: Option<u64>,
    pub light_threshold: f64,
    pub lighting_policy: LightingPolicy,
    pub window: GrowthWindow,
    /// `None` keeps the local clock only.
    pub time_server: Option<String>,
    pub time_timeout: Duration,
    pub resync_interval: Duration,
    pub database: PathBuf,
    pub database_timeout: Duration,
    pub device_timeout: Duration,
    pub sensor_retries: u32,
    pub dht11_pin: u8,
    pub relay_pin: u8,
    pub lcd_address: u16,
    pub segment_address: u16,
    pub light_address: u16,
    pub segment_brightness: u8,
    pub matrix_intensity: u8,
    pub log_timestamps: bool,
}

impl Config {
    /// Load configuration using automatic path detection.
    pub fn load() -> Result<Self> {
        load()
    }

    /// Apply command-line overrides on top of the file values.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(interval) = overrides.interval {
            self.interval = Some(interval);
        }
        if overrides.forever {
            self.iterations = Some(0);
        } else if let Some(iterations) = overrides.iterations {
            self.iterations = Some(iterations);
        }
        self
    }

    /// Validate and turn the optional fields into concrete settings.
    pub fn resolve(&self) -> Result<ControlParams> {
        validation::validate_config(self)?;

        let iterations = match self.iterations.unwrap_or(DEFAULT_ITERATIONS) {
            0 => None,
            n => Some(n),
        };

        let lighting_policy = self
            .lighting_policy
            .as_deref()
            .unwrap_or(DEFAULT_LIGHTING_POLICY)
            .parse::<LightingPolicy>()?;

        let timezone = match self.timezone.as_deref() {
            Some(name) => Some(
                name.parse::<chrono_tz::Tz>()
                    .map_err(|e| anyhow::anyhow!("Invalid timezone '{name}': {e}"))?,
            ),
            None => None,
        };

        let source = match self.window_mode.as_deref().unwrap_or(DEFAULT_WINDOW_MODE) {
            "geo" => WindowSource::Geo {
                latitude: self.latitude.context("Geo window requires latitude")?,
                longitude: self.longitude.context("Geo window requires longitude")?,
            },
            _ => {
                let start = parse_time(
                    self.window_start.as_deref().unwrap_or(DEFAULT_WINDOW_START),
                    "window_start",
                )?;
                let end = parse_time(
                    self.window_end.as_deref().unwrap_or(DEFAULT_WINDOW_END),
                    "window_end",
                )?;
                WindowSource::Manual(TimeWindow::new(start, end))
            }
        };

        let time_server = match self.time_server.as_deref() {
            Some(server) if server.trim().is_empty() => None,
            Some(server) => Some(server.trim().to_owned()),
            None => Some(DEFAULT_TIME_SERVER.to_owned()),
        };

        Ok(ControlParams {
            interval: Duration::from_secs(self.interval.unwrap_or(DEFAULT_INTERVAL_SECS)),
            iterations,
            light_threshold: self.light_threshold.unwrap_or(DEFAULT_LIGHT_THRESHOLD_LUX),
            lighting_policy,
            window: GrowthWindow::new(source, timezone),
            time_server,
            time_timeout: Duration::from_secs(
                self.time_timeout.unwrap_or(DEFAULT_TIME_TIMEOUT_SECS),
            ),
            resync_interval: Duration::from_secs(
                self.resync_interval
                    .unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS),
            ),
            database: PathBuf::from(self.database.as_deref().unwrap_or(DEFAULT_DATABASE)),
            database_timeout: Duration::from_secs(
                self.database_timeout
                    .unwrap_or(DEFAULT_DATABASE_TIMEOUT_SECS),
            ),
            device_timeout: Duration::from_millis(
                self.device_timeout_ms.unwrap_or(DEFAULT_DEVICE_TIMEOUT_MS),
            ),
            sensor_retries: self.sensor_retries.unwrap_or(DEFAULT_SENSOR_RETRIES),
            dht11_pin: self.dht11_pin.unwrap_or(DEFAULT_DHT11_PIN),
            relay_pin: self.relay_pin.unwrap_or(DEFAULT_RELAY_PIN),
            lcd_address: self.lcd_address.unwrap_or(DEFAULT_LCD_ADDRESS),
            segment_address: self.segment_address.unwrap_or(DEFAULT_SEGMENT_ADDRESS),
            light_address: self.light_address.unwrap_or(DEFAULT_LIGHT_ADDRESS),
            segment_brightness: self
                .segment_brightness
                .unwrap_or(DEFAULT_SEGMENT_BRIGHTNESS),
            matrix_intensity: self.matrix_intensity.unwrap_or(DEFAULT_MATRIX_INTENSITY),
            log_timestamps: self.log_timestamps.unwrap_or(false),
        })
    }
}

impl ControlParams {
    pub fn log_config(&self, source: &str) {
        log_block_start!("Loaded {source}");
        log_indented!("Interval: {} seconds", self.interval.as_secs());
        match self.iterations {
            Some(n) => log_indented!("Iterations: {n}"),
            None => log_indented!("Iterations: until stopped"),
        }
        log_indented!("Light threshold: {} lx", self.light_threshold);
        log_indented!("Lighting policy: {}", self.lighting_policy.as_str());

        match self.window.source() {
            WindowSource::Manual(window) => log_indented!("Growth window: {window}"),
            WindowSource::Geo {
                latitude,
                longitude,
            } => {
                let lat_dir = if *latitude >= 0.0 { "N" } else { "S" };
                let lon_dir = if *longitude >= 0.0 { "E" } else { "W" };
                log_indented!(
                    "Growth window: sunrise to sunset at {:.3}°{}, {:.3}°{}",
                    latitude.abs(),
                    lat_dir,
                    longitude.abs(),
                    lon_dir
                );
            }
        }

        match &self.time_server {
            Some(server) => log_indented!("Time server: {server}"),
            None => log_indented!("Time server: none (local clock)"),
        }
        log_indented!("Database: {}", self.database.display());
    }
}

fn parse_time(value: &str, field: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .with_context(|| format!("Invalid {field} '{value}', expected HH:MM:SS"))
}
