//! Configuration validation functionality.
//!
//! Rejects values the controller cannot run with before anything touches a
//! device: out-of-range numbers, malformed times, incomplete geo settings and
//! conflicting pin or bus assignments.

use anyhow::{Context, Result};
use chrono::NaiveTime;

use super::Config;
use crate::actuator::LightingPolicy;
use crate::common::constants::*;

pub fn validate_config(config: &Config) -> Result<()> {
    // Loop pacing
    if let Some(interval) = config.interval
        && !(MINIMUM_INTERVAL_SECS..=MAXIMUM_INTERVAL_SECS).contains(&interval)
    {
        anyhow::bail!(
            "interval ({} seconds) must be between {} and {} seconds",
            interval,
            MINIMUM_INTERVAL_SECS,
            MAXIMUM_INTERVAL_SECS
        );
    }

    // Evaluation
    if let Some(threshold) = config.light_threshold
        && !(threshold.is_finite()
            && (LIGHT_RANGE_LUX.0..=LIGHT_RANGE_LUX.1).contains(&threshold))
    {
        anyhow::bail!(
            "light_threshold ({}) must be between {} and {} lux",
            threshold,
            LIGHT_RANGE_LUX.0,
            LIGHT_RANGE_LUX.1
        );
    }

    // Lighting
    if let Some(policy) = config.lighting_policy.as_deref() {
        policy.parse::<LightingPolicy>()?;
    }

    validate_window(config)?;

    // Time
    if let Some(timeout) = config.time_timeout
        && !(1..=MAXIMUM_TIME_TIMEOUT_SECS).contains(&timeout)
    {
        anyhow::bail!(
            "time_timeout ({} seconds) must be between 1 and {} seconds",
            timeout,
            MAXIMUM_TIME_TIMEOUT_SECS
        );
    }

    if config.resync_interval == Some(0) {
        anyhow::bail!("resync_interval must be at least 1 second");
    }

    // Storage
    if let Some(database) = config.database.as_deref()
        && database.trim().is_empty()
    {
        anyhow::bail!("database must not be empty");
    }

    if let Some(timeout) = config.database_timeout
        && !(1..=MAXIMUM_DATABASE_TIMEOUT_SECS).contains(&timeout)
    {
        anyhow::bail!(
            "database_timeout ({} seconds) must be between 1 and {} seconds",
            timeout,
            MAXIMUM_DATABASE_TIMEOUT_SECS
        );
    }

    validate_devices(config)
}

fn validate_window(config: &Config) -> Result<()> {
    let mode = config.window_mode.as_deref().unwrap_or(DEFAULT_WINDOW_MODE);

    if let Some(lat) = config.latitude
        && !(-90.0..=90.0).contains(&lat)
    {
        anyhow::bail!("latitude must be between -90 and 90 degrees (got {})", lat);
    }

    if let Some(lon) = config.longitude
        && !(-180.0..=180.0).contains(&lon)
    {
        anyhow::bail!(
            "longitude must be between -180 and 180 degrees (got {})",
            lon
        );
    }

    if let Some(zone) = config.timezone.as_deref()
        && zone.parse::<chrono_tz::Tz>().is_err()
    {
        anyhow::bail!("timezone '{}' is not a known IANA time zone", zone);
    }

    match mode {
        "manual" => {
            let start = config
                .window_start
                .as_deref()
                .unwrap_or(DEFAULT_WINDOW_START);
            let end = config.window_end.as_deref().unwrap_or(DEFAULT_WINDOW_END);

            let start = NaiveTime::parse_from_str(start, "%H:%M:%S")
                .context("Invalid window_start format, expected HH:MM:SS")?;
            let end = NaiveTime::parse_from_str(end, "%H:%M:%S")
                .context("Invalid window_end format, expected HH:MM:SS")?;

            if start == end {
                log_warning!(
                    "window_start equals window_end; the growth window is empty and supplemental lighting never switches on"
                );
            }
        }
        "geo" => {
            if config.latitude.is_none() || config.longitude.is_none() {
                anyhow::bail!("window_mode \"geo\" requires latitude and longitude");
            }
        }
        other => {
            anyhow::bail!("window_mode must be \"manual\" or \"geo\" (got \"{}\")", other);
        }
    }

    Ok(())
}

fn validate_devices(config: &Config) -> Result<()> {
    if let Some(timeout) = config.device_timeout_ms
        && !(MINIMUM_DEVICE_TIMEOUT_MS..=MAXIMUM_DEVICE_TIMEOUT_MS).contains(&timeout)
    {
        anyhow::bail!(
            "device_timeout_ms ({}) must be between {} and {} milliseconds",
            timeout,
            MINIMUM_DEVICE_TIMEOUT_MS,
            MAXIMUM_DEVICE_TIMEOUT_MS
        );
    }

    if let Some(retries) = config.sensor_retries
        && retries > MAXIMUM_SENSOR_RETRIES
    {
        anyhow::bail!(
            "sensor_retries ({}) must be at most {}",
            retries,
            MAXIMUM_SENSOR_RETRIES
        );
    }

    let dht11_pin = config.dht11_pin.unwrap_or(DEFAULT_DHT11_PIN);
    let relay_pin = config.relay_pin.unwrap_or(DEFAULT_RELAY_PIN);
    for (field, pin) in [("dht11_pin", dht11_pin), ("relay_pin", relay_pin)] {
        if pin > MAXIMUM_GPIO_PIN {
            anyhow::bail!(
                "{} ({}) must be a BCM GPIO number between 0 and {}",
                field,
                pin,
                MAXIMUM_GPIO_PIN
            );
        }
    }
    if dht11_pin == relay_pin {
        anyhow::bail!("dht11_pin and relay_pin must differ (both {})", dht11_pin);
    }

    let addresses = [
        ("lcd_address", config.lcd_address.unwrap_or(DEFAULT_LCD_ADDRESS)),
        (
            "segment_address",
            config.segment_address.unwrap_or(DEFAULT_SEGMENT_ADDRESS),
        ),
        (
            "light_address",
            config.light_address.unwrap_or(DEFAULT_LIGHT_ADDRESS),
        ),
    ];
    for (field, address) in addresses {
        if !(MINIMUM_I2C_ADDRESS..=MAXIMUM_I2C_ADDRESS).contains(&address) {
            anyhow::bail!(
                "{} (0x{:02X}) must be between 0x{:02X} and 0x{:02X}",
                field,
                address,
                MINIMUM_I2C_ADDRESS,
                MAXIMUM_I2C_ADDRESS
            );
        }
    }
    for (i, (first, a)) in addresses.iter().enumerate() {
        for (second, b) in &addresses[i + 1..] {
            if a == b {
                anyhow::bail!("{} and {} share I2C address 0x{:02X}", first, second, a);
            }
        }
    }

    if let Some(brightness) = config.segment_brightness
        && brightness > MAXIMUM_BRIGHTNESS
    {
        anyhow::bail!(
            "segment_brightness ({}) must be between 0 and {}",
            brightness,
            MAXIMUM_BRIGHTNESS
        );
    }

    if let Some(intensity) = config.matrix_intensity
        && intensity > MAXIMUM_BRIGHTNESS
    {
        anyhow::bail!(
            "matrix_intensity ({}) must be between 0 and {}",
            intensity,
            MAXIMUM_BRIGHTNESS
        );
    }

    Ok(())
}
