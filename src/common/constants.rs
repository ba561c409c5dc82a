//! Application-wide defaults and limits.
//!
//! Every configuration field is optional; when a field is absent the matching
//! `DEFAULT_` constant applies. `MINIMUM_`/`MAXIMUM_` pairs bound validation.

// # Loop pacing
pub const DEFAULT_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_ITERATIONS: u64 = 10;
pub const MINIMUM_INTERVAL_SECS: u64 = 1;
pub const MAXIMUM_INTERVAL_SECS: u64 = 86_400;

/// Upper bound on one uninterrupted wait; the stop flag is checked this often.
pub const STOP_POLL_INTERVAL_MS: u64 = 250;

// # Evaluation
pub const DEFAULT_LIGHT_THRESHOLD_LUX: f64 = 100.0;

/// DHT11 revisions with a sign bit report down to -20 °C.
pub const TEMPERATURE_RANGE_C: (f64, f64) = (-20.0, 60.0);
pub const HUMIDITY_RANGE_PCT: (f64, f64) = (0.0, 100.0);
pub const LIGHT_RANGE_LUX: (f64, f64) = (0.0, 65_535.0);

// # Growth window
pub const DEFAULT_WINDOW_MODE: &str = "manual";
pub const DEFAULT_WINDOW_START: &str = "06:00:00";
pub const DEFAULT_WINDOW_END: &str = "20:00:00";
pub const DEFAULT_LIGHTING_POLICY: &str = "supplement";

// # Time synchronization
pub const DEFAULT_TIME_SERVER: &str = "pool.ntp.org";
pub const DEFAULT_TIME_TIMEOUT_SECS: u64 = 2;
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 3600;
pub const MAXIMUM_TIME_TIMEOUT_SECS: u64 = 30;
pub const NTP_PORT: u16 = 123;

/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01.
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

// # Devices
pub const DEFAULT_DEVICE_TIMEOUT_MS: u64 = 2000;
pub const MINIMUM_DEVICE_TIMEOUT_MS: u64 = 50;
pub const MAXIMUM_DEVICE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SENSOR_RETRIES: u32 = 3;
pub const MAXIMUM_SENSOR_RETRIES: u32 = 10;

pub const DEFAULT_DHT11_PIN: u8 = 4;
pub const DEFAULT_RELAY_PIN: u8 = 17;
pub const DEFAULT_LCD_ADDRESS: u16 = 0x21;
pub const DEFAULT_SEGMENT_ADDRESS: u16 = 0x70;
pub const DEFAULT_LIGHT_ADDRESS: u16 = 0x5C;
pub const DEFAULT_SEGMENT_BRIGHTNESS: u8 = 15;
pub const DEFAULT_MATRIX_INTENSITY: u8 = 8;
pub const MAXIMUM_BRIGHTNESS: u8 = 15;
pub const MAXIMUM_GPIO_PIN: u8 = 27;

/// 7-bit I2C addresses outside the reserved blocks.
pub const MINIMUM_I2C_ADDRESS: u16 = 0x03;
pub const MAXIMUM_I2C_ADDRESS: u16 = 0x77;

/// Matrix SPI clock; MAX7219 tolerates up to 10 MHz.
pub const MATRIX_SPI_CLOCK_HZ: u32 = 1_000_000;

// # Persistence
pub const DEFAULT_DATABASE: &str = "greenhouse.db";
pub const DEFAULT_DATABASE_TIMEOUT_SECS: u64 = 5;
pub const MAXIMUM_DATABASE_TIMEOUT_SECS: u64 = 60;

// # Process
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
