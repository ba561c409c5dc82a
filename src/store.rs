//! Append-only measurement persistence in SQLite.
//!
//! The control loop is synchronous, so [`SqliteStore`] owns a small
//! current-thread tokio runtime and blocks on each `sqlx` call, bounded by
//! the store timeout.

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::constants::DEFAULT_LIGHT_THRESHOLD_LUX;
use crate::error::PersistenceFailure;
use crate::model::{LightClass, MeasurementRecord, RecordId, StoredRecord};

/// Columns an existing table must have, with the DDL used to add them.
///
/// Added columns need a default so rows written by older versions stay valid.
const COLUMNS: &[(&str, &str)] = &[
    ("timestamp", "timestamp TEXT NOT NULL DEFAULT ''"),
    ("temperature", "temperature REAL"),
    ("humidity", "humidity REAL"),
    ("light_raw", "light_raw REAL NOT NULL DEFAULT 0"),
    ("light_class", "light_class TEXT NOT NULL DEFAULT 'NIGHT'"),
    ("time_synced", "time_synced INTEGER NOT NULL DEFAULT 1"),
];

/// Timestamp format of tables written before the switch to RFC 3339, in local time.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CREATE_TABLE: &str = r"CREATE TABLE IF NOT EXISTS measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    temperature REAL,
    humidity REAL,
    light_raw REAL NOT NULL,
    light_class TEXT NOT NULL,
    time_synced INTEGER NOT NULL DEFAULT 1
)";

/// Durable storage of one record per completed cycle.
#[cfg_attr(test, mockall::automock)]
pub trait MeasurementStore: Send {
    /// Create or upgrade the table. Safe to call any number of times.
    fn create_schema(&mut self) -> Result<(), PersistenceFailure>;

    fn append(&mut self, record: &MeasurementRecord) -> Result<RecordId, PersistenceFailure>;

    /// All stored records in insertion order.
    fn records(&mut self) -> Result<Vec<StoredRecord>, PersistenceFailure>;
}

#[derive(Debug, sqlx::FromRow)]
struct MeasurementRow {
    id: i64,
    timestamp: String,
    temperature: Option<f64>,
    humidity: Option<f64>,
    light_raw: f64,
    light_class: String,
    time_synced: bool,
}

impl TryFrom<MeasurementRow> for StoredRecord {
    type Error = PersistenceFailure;

    fn try_from(row: MeasurementRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| PersistenceFailure::Corrupt { id: row.id, reason };

        let timestamp = parse_timestamp(&row.timestamp)
            .map_err(|e| corrupt(format!("timestamp '{}': {e}", row.timestamp)))?;
        let light_class = row.light_class.parse::<LightClass>().map_err(corrupt)?;

        Ok(StoredRecord {
            id: RecordId(row.id),
            record: MeasurementRecord {
                timestamp,
                temperature: row.temperature,
                humidity: row.humidity,
                light_raw: row.light_raw,
                light_class,
                time_synced: row.time_synced,
            },
        })
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Local>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Ok(timestamp.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(text, LEGACY_TIMESTAMP_FORMAT)
        .map_err(|e| e.to_string())?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| "not a valid local time".to_owned())
}

pub struct SqliteStore {
    runtime: tokio::runtime::Runtime,
    pool: SqlitePool,
    path: PathBuf,
    timeout: Duration,
    light_threshold: f64,
}

impl SqliteStore {
    /// Prepare a store at `path`; the file is created on first use.
    ///
    /// No connection is made here, so an unreachable database surfaces as a
    /// failure of the first operation rather than of construction.
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, PersistenceFailure> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| PersistenceFailure::Unavailable(format!("runtime: {e}")))?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(timeout);

        let pool = {
            // The pool spawns its maintenance task on the ambient runtime
            let _guard = runtime.enter();
            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(timeout)
                .connect_lazy_with(options)
        };

        Ok(Self {
            runtime,
            pool,
            path: path.to_path_buf(),
            timeout,
            light_threshold: DEFAULT_LIGHT_THRESHOLD_LUX,
        })
    }

    /// Threshold used to classify rows carried over from a `brightness` column.
    pub fn with_light_threshold(mut self, threshold_lux: f64) -> Self {
        self.light_threshold = threshold_lux;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run<T, F>(&self, operation: &'static str, future: F) -> Result<T, PersistenceFailure>
    where
        F: Future<Output = Result<T, PersistenceFailure>>,
    {
        self.runtime
            .block_on(async { tokio::time::timeout(self.timeout, future).await })
            .map_err(|_| PersistenceFailure::Timeout {
                operation,
                timeout_ms: self.timeout.as_millis() as u64,
            })?
    }
}

impl MeasurementStore for SqliteStore {
    fn create_schema(&mut self) -> Result<(), PersistenceFailure> {
        let pool = self.pool.clone();
        let threshold = self.light_threshold;
        self.run("create_schema", async move {
            sqlx::query(CREATE_TABLE).execute(&pool).await?;

            let existing: Vec<(String,)> =
                sqlx::query_as("SELECT name FROM pragma_table_info('measurements')")
                    .fetch_all(&pool)
                    .await?;
            let has_brightness = existing.iter().any(|(name,)| name == "brightness");

            for (column, ddl) in COLUMNS {
                if existing.iter().any(|(name,)| name == column) {
                    continue;
                }
                sqlx::query(&format!("ALTER TABLE measurements ADD COLUMN {ddl}"))
                    .execute(&pool)
                    .await?;
                log_decorated!("Upgraded measurements table: added column {column}");

                // Older tables kept the light level in `brightness`
                match *column {
                    "light_raw" if has_brightness => {
                        sqlx::query(
                            "UPDATE measurements SET light_raw = brightness \
                             WHERE brightness IS NOT NULL",
                        )
                        .execute(&pool)
                        .await?;
                    }
                    "light_class" => {
                        sqlx::query(
                            "UPDATE measurements \
                             SET light_class = CASE WHEN light_raw > ? THEN 'DAY' ELSE 'NIGHT' END",
                        )
                        .bind(threshold)
                        .execute(&pool)
                        .await?;
                    }
                    _ => {}
                }
            }
            Ok(())
        })
    }

    fn append(&mut self, record: &MeasurementRecord) -> Result<RecordId, PersistenceFailure> {
        let pool = self.pool.clone();
        let timestamp = record
            .timestamp
            .to_rfc3339_opts(SecondsFormat::AutoSi, false);
        let record = record.clone();

        self.run("append", async move {
            let result = sqlx::query(
                r"INSERT INTO measurements
                    (timestamp, temperature, humidity, light_raw, light_class, time_synced)
                  VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(timestamp)
            .bind(record.temperature)
            .bind(record.humidity)
            .bind(record.light_raw)
            .bind(record.light_class.as_str())
            .bind(record.time_synced)
            .execute(&pool)
            .await?;

            Ok(RecordId(result.last_insert_rowid()))
        })
    }

    fn records(&mut self) -> Result<Vec<StoredRecord>, PersistenceFailure> {
        let pool = self.pool.clone();
        self.run("records", async move {
            let rows = sqlx::query_as::<_, MeasurementRow>(
                r"SELECT id, timestamp, temperature, humidity, light_raw, light_class, time_synced
                  FROM measurements
                  ORDER BY id",
            )
            .fetch_all(&pool)
            .await?;

            rows.into_iter().map(StoredRecord::try_from).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record(second: u32, temperature: Option<f64>) -> MeasurementRecord {
        MeasurementRecord {
            timestamp: Local.with_ymd_and_hms(2024, 5, 2, 9, 0, second).unwrap(),
            temperature,
            humidity: Some(45.2),
            light_raw: 256.0,
            light_class: LightClass::Day,
            time_synced: true,
        }
    }

    fn store_in(dir: &Path) -> SqliteStore {
        SqliteStore::open(&dir.join("greenhouse.db"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.create_schema().unwrap();

        let first = store.append(&record(0, Some(23.5))).unwrap();
        let second = store.append(&record(3, None)).unwrap();
        assert!(second > first);

        let rows = store.records().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, first);
        assert_eq!(rows[0].record, record(0, Some(23.5)));
        assert_eq!(rows[1].record.temperature, None);
    }

    #[test]
    fn test_create_schema_twice_keeps_data() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.create_schema().unwrap();
        store.append(&record(0, Some(21.0))).unwrap();

        store.create_schema().unwrap();
        assert_eq!(store.records().unwrap().len(), 1);
    }

    #[test]
    fn test_create_schema_upgrades_older_table() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        let pool = store.pool.clone();
        store
            .runtime
            .block_on(async {
                sqlx::query(
                    "CREATE TABLE measurements (id INTEGER PRIMARY KEY AUTOINCREMENT, \
                     timestamp TEXT NOT NULL, temperature REAL, humidity REAL, brightness INTEGER)",
                )
                .execute(&pool)
                .await?;
                sqlx::query(
                    "INSERT INTO measurements (timestamp, temperature, humidity, brightness) \
                     VALUES ('2024-05-01 08:00:00', 20.0, 40.0, 500), \
                            ('2024-05-01 22:00:00', 18.0, 55.0, 12)",
                )
                .execute(&pool)
                .await
            })
            .unwrap();

        store.create_schema().unwrap();
        store.append(&record(0, Some(22.0))).unwrap();

        let rows = store.records().unwrap();
        assert_eq!(rows.len(), 3);

        let bright = &rows[0].record;
        assert_eq!(
            bright.timestamp,
            Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
        );
        assert_eq!(bright.temperature, Some(20.0));
        assert_eq!(bright.light_raw, 500.0);
        assert_eq!(bright.light_class, LightClass::Day);
        assert!(bright.time_synced);

        assert_eq!(rows[1].record.light_raw, 12.0);
        assert_eq!(rows[1].record.light_class, LightClass::Night);
        assert_eq!(rows[2].record.light_raw, 256.0);
    }

    #[test]
    fn test_upgrade_classifies_with_configured_threshold() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path()).with_light_threshold(600.0);
        let pool = store.pool.clone();
        store
            .runtime
            .block_on(async {
                sqlx::query(
                    "CREATE TABLE measurements (id INTEGER PRIMARY KEY AUTOINCREMENT, \
                     timestamp TEXT NOT NULL, temperature REAL, humidity REAL, brightness INTEGER)",
                )
                .execute(&pool)
                .await?;
                sqlx::query(
                    "INSERT INTO measurements (timestamp, temperature, humidity, brightness) \
                     VALUES ('2024-05-01 08:00:00', 20.0, 40.0, 500)",
                )
                .execute(&pool)
                .await
            })
            .unwrap();

        store.create_schema().unwrap();

        let rows = store.records().unwrap();
        assert_eq!(rows[0].record.light_raw, 500.0);
        assert_eq!(rows[0].record.light_class, LightClass::Night);
    }

    #[test]
    fn test_legacy_timestamps_read_as_local_time() {
        assert_eq!(
            parse_timestamp("2024-05-01 08:00:00").unwrap(),
            Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
        );
        assert!(parse_timestamp("2024-05-01T08:00:00+00:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_unreachable_database_fails_operations() {
        let dir = tempdir().unwrap();
        let missing_parent = dir.path().join("no-such-dir").join("greenhouse.db");
        let mut store = SqliteStore::open(&missing_parent, Duration::from_secs(2)).unwrap();

        assert!(store.create_schema().is_err());
        assert!(store.append(&record(0, None)).is_err());
    }
}
