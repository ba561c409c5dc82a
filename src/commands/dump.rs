//! Dump command implementation for printing stored measurements.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use std::io::Write;

use crate::config::Config;
use crate::model::StoredRecord;
use crate::store::{MeasurementStore, SqliteStore};

/// Handle the dump command - print every stored measurement as a table.
pub fn handle_dump_command() -> Result<()> {
    let params = Config::load()
        .context("Configuration failed")?
        .resolve()
        .context("Invalid configuration")?;

    if !params.database.exists() {
        log_pipe!();
        log_warning!("No database at {}", params.database.display());
        log_end!();
        return Ok(());
    }

    let mut store = SqliteStore::open(&params.database, params.database_timeout)?
        .with_light_threshold(params.light_threshold);
    // Tables from older versions need their missing columns before they can be read
    store
        .create_schema()
        .with_context(|| format!("Failed to upgrade {}", params.database.display()))?;
    let records = store
        .records()
        .with_context(|| format!("Failed to read {}", params.database.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_table(&mut out, &records)?;
    out.flush()?;
    Ok(())
}

/// Write `records` as aligned columns with a header row.
pub fn write_table(out: &mut impl Write, records: &[StoredRecord]) -> std::io::Result<()> {
    writeln!(
        out,
        "{:>6}  {:<25}  {:>6}  {:>6}  {:>9}  {:<5}  {}",
        "id", "timestamp", "temp", "hum", "light", "class", "synced"
    )?;

    for stored in records {
        let record = &stored.record;
        writeln!(
            out,
            "{:>6}  {:<25}  {:>6}  {:>6}  {:>9.1}  {:<5}  {}",
            stored.id.0,
            record
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            cell(record.temperature),
            cell(record.humidity),
            record.light_raw,
            record.light_class.as_str(),
            if record.time_synced { "yes" } else { "no" }
        )?;
    }

    writeln!(out, "{} records", records.len())
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_owned(), |v| format!("{v:.1}"))
}
