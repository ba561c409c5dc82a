//! Daily growth-light window.
//!
//! A window is the half-open interval `[start, end)` of local time-of-day and
//! may wrap past midnight (`22:00:00` to `04:00:00`). Equal bounds describe an
//! empty window.

use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S")
        )
    }
}

/// Where the window bounds come from.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowSource {
    /// Fixed bounds from the configuration.
    Manual(TimeWindow),
    /// Sunrise to sunset at the given coordinates, recomputed per date.
    Geo { latitude: f64, longitude: f64 },
}

/// Resolves the growth window for an evaluation instant.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthWindow {
    source: WindowSource,
    timezone: Option<Tz>,
}

impl GrowthWindow {
    pub fn new(source: WindowSource, timezone: Option<Tz>) -> Self {
        Self { source, timezone }
    }

    pub fn manual(window: TimeWindow) -> Self {
        Self::new(WindowSource::Manual(window), None)
    }

    pub fn source(&self) -> &WindowSource {
        &self.source
    }

    /// Whether `at` falls inside the window of its own date.
    pub fn contains(&self, at: DateTime<Local>) -> bool {
        let (date, time) = match self.timezone {
            Some(tz) => {
                let zoned = at.with_timezone(&tz);
                (zoned.date_naive(), zoned.time())
            }
            None => (at.date_naive(), at.time()),
        };

        match self.window_for(date) {
            Some(window) => window.contains(time),
            None => false,
        }
    }

    /// Window bounds for `date`, or `None` when the sun does not rise or set.
    pub fn window_for(&self, date: NaiveDate) -> Option<TimeWindow> {
        match &self.source {
            WindowSource::Manual(window) => Some(*window),
            WindowSource::Geo {
                latitude,
                longitude,
            } => self.solar_window(*latitude, *longitude, date),
        }
    }

    fn solar_window(&self, latitude: f64, longitude: f64, date: NaiveDate) -> Option<TimeWindow> {
        use sunrise::{Coordinates, SolarDay, SolarEvent};

        let coord = Coordinates::new(latitude, longitude)?;
        let solar_day = SolarDay::new(coord, date);
        let sunrise_utc = solar_day.event_time(SolarEvent::Sunrise);
        let sunset_utc = solar_day.event_time(SolarEvent::Sunset);

        // Polar day or night yields a degenerate interval
        if sunrise_utc >= sunset_utc {
            return None;
        }

        let (sunrise, sunset) = match self.timezone {
            Some(tz) => (
                sunrise_utc.with_timezone(&tz).time(),
                sunset_utc.with_timezone(&tz).time(),
            ),
            None => (
                sunrise_utc.with_timezone(&Local).time(),
                sunset_utc.with_timezone(&Local).time(),
            ),
        };
        Some(TimeWindow::new(sunrise, sunset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_window_is_half_open() {
        let window = TimeWindow::new(t(6, 0, 0), t(20, 0, 0));
        assert!(window.contains(t(6, 0, 0)));
        assert!(window.contains(t(19, 59, 59)));
        assert!(!window.contains(t(20, 0, 0)));
        assert!(!window.contains(t(5, 59, 59)));
    }

    #[test]
    fn test_window_wraps_midnight() {
        let window = TimeWindow::new(t(22, 0, 0), t(4, 0, 0));
        assert!(window.contains(t(23, 30, 0)));
        assert!(window.contains(t(0, 0, 0)));
        assert!(window.contains(t(3, 59, 59)));
        assert!(!window.contains(t(4, 0, 0)));
        assert!(!window.contains(t(12, 0, 0)));
    }

    #[test]
    fn test_equal_bounds_are_empty() {
        let window = TimeWindow::new(t(8, 0, 0), t(8, 0, 0));
        assert!(!window.contains(t(8, 0, 0)));
        assert!(!window.contains(t(20, 0, 0)));
    }

    #[test]
    fn test_geo_window_spans_midday_in_zone() {
        let window = GrowthWindow::new(
            WindowSource::Geo {
                latitude: 52.52,
                longitude: 13.405,
            },
            Some(chrono_tz::Europe::Berlin),
        );
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let solar = window.window_for(date).unwrap();

        assert!(solar.contains(t(12, 0, 0)));
        assert!(!solar.contains(t(1, 0, 0)));
    }
}
