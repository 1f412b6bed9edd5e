//! This module is in charge of writing the cutflow logs to disk and of
//! reporting the run summary

use crate::{numeric::Float, Result};

use eyre::WrapErr;
use serde::Serialize;
use time::{macros::format_description, OffsetDateTime};
use tracing::info;

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Default directory of the cutflow logs
pub const DEFAULT_LOGS_DIR: &str = "data/logs";

/// Write a cutflow table as CSV, one row per (sample, region)
///
/// The header is derived from the row type. An empty table still gets a
/// header-less empty file, so that stale logs of previous runs never linger.
///
pub fn write_cutflow<Row: Serialize>(
    logs_dir: &Path,
    file_name: &str,
    rows: &[Row],
) -> Result<PathBuf> {
    fs::create_dir_all(logs_dir)
        .wrap_err_with(|| format!("Could not create log directory {}", logs_dir.display()))?;
    let path = logs_dir.join(file_name);
    let mut writer = csv::Writer::from_path(&path)
        .wrap_err_with(|| format!("Could not create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(path)
}

/// Name of the cutflow log of a given step and trigger mode tag
pub fn cutflow_file_name(step: u8, tag: &str) -> String {
    format!("cutflow_step{step}_{tag}.csv")
}

/// Report where the log went, when the run ended, and how long it took
pub fn report_run(log_path: &Path, num_rows: usize, elapsed_time: Duration) -> Result<()> {
    // Compute a timestamp of when the run ended
    let timestamp = timestamp(OffsetDateTime::now_utc())?;

    info!("Cutflow log ({num_rows} rows) saved to {}", log_path.display());
    info!("Run ended {timestamp} UTC");
    info!("Elapsed time: {:.3} s", elapsed_time.as_secs_f64());
    Ok(())
}

/// Human-readable rendition of a point in time
fn timestamp(at: OffsetDateTime) -> Result<String> {
    let format = format_description!(
        "[day]-[month repr:short]-[year repr:last_two]   [hour]:[minute]:[second]"
    );
    Ok(at.format(format)?)
}

/// Ratio of two yields, defined as zero when the denominator vanishes
pub fn efficiency(passed: Float, total: Float) -> Float {
    if total == 0. {
        0.
    } else {
        passed / total
    }
}
