//! Log setup for the collector binary: console output, an optional daily
//! rotating file, and background compression of rotated files.

use async_compression::tokio::write::GzipEncoder;
use chrono::{NaiveDate, Utc};
use log::{debug, info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

pub const DEFAULT_LOG_RETENTION: usize = 7;
const DATE_SUFFIX: &str = "%Y-%m-%d";
const MAINTENANCE_PERIOD: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("I/O error on log file '{0}'")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("A logger is already installed")]
    SetLogger(#[from] log::SetLoggerError),
}

/// Level filter from a `RUST_LOG`-style value, `info` when absent or invalid.
pub fn level_from_env(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(LevelFilter::Info)
}

fn dated_prefix(log_file: &Path) -> String {
    format!("{}.", log_file.display())
}

/// Installs the global logger.
///
/// Lines look like `<timestamp>::<LEVEL>::<target>::<message>`. With a
/// `log_file`, output also goes to `<log_file>.<YYYY-MM-DD>`, switching
/// files at UTC midnight.
pub fn init_logging(log_file: Option<&Path>, level: LevelFilter) -> Result<(), LoggingError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}::{}::{}::{}",
                Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(std::io::stdout());

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LoggingError::Io(parent.to_path_buf(), e))?;
        }
        dispatch = dispatch.chain(fern::DateBased::new(dated_prefix(path), DATE_SUFFIX).utc_time());
    }

    dispatch.apply()?;
    Ok(())
}

/// What one maintenance pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSummary {
    pub compressed: usize,
    pub removed: usize,
}

async fn gzip_file(source: &Path) -> Result<PathBuf, LoggingError> {
    let target = PathBuf::from(format!("{}.gz", source.display()));
    let mut input = tokio::fs::File::open(source)
        .await
        .map_err(|e| LoggingError::Io(source.to_path_buf(), e))?;
    let output = tokio::fs::File::create(&target)
        .await
        .map_err(|e| LoggingError::Io(target.clone(), e))?;

    let mut encoder = GzipEncoder::new(output);
    tokio::io::copy(&mut input, &mut encoder)
        .await
        .map_err(|e| LoggingError::Io(target.clone(), e))?;
    encoder
        .shutdown()
        .await
        .map_err(|e| LoggingError::Io(target.clone(), e))?;

    tokio::fs::remove_file(source)
        .await
        .map_err(|e| LoggingError::Io(source.to_path_buf(), e))?;
    Ok(target)
}

/// Gzips every dated log file older than `today` and keeps only the newest
/// `retention` archives.
pub async fn compress_rotated_logs(
    log_file: &Path,
    today: NaiveDate,
    retention: usize,
) -> Result<MaintenanceSummary, LoggingError> {
    let dir = match log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    let prefix = match log_file.file_name() {
        Some(name) => format!("{}.", name.to_string_lossy()),
        None => return Ok(MaintenanceSummary::default()),
    };

    let mut rotated = Vec::new();
    let mut archives = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|e| LoggingError::Io(dir.clone(), e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LoggingError::Io(dir.clone(), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(suffix) = name.strip_prefix(&prefix) else {
            continue;
        };
        let (date, archived) = match suffix.strip_suffix(".gz") {
            Some(date) => (date, true),
            None => (suffix, false),
        };
        let Ok(date) = NaiveDate::parse_from_str(date, DATE_SUFFIX) else {
            continue;
        };
        if archived {
            archives.push((date, entry.path()));
        } else if date < today {
            rotated.push((date, entry.path()));
        }
    }

    let mut summary = MaintenanceSummary::default();
    for (date, path) in rotated {
        let archive = gzip_file(&path).await?;
        debug!("Compressed {} to {}", path.display(), archive.display());
        archives.push((date, archive));
        summary.compressed += 1;
    }

    archives.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, path) in archives.into_iter().skip(retention) {
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| LoggingError::Io(path.clone(), e))?;
        summary.removed += 1;
    }
    Ok(summary)
}

/// Runs [`compress_rotated_logs`] hourly until the task is aborted.
pub fn spawn_log_maintenance(log_file: PathBuf, retention: usize) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_PERIOD);
        loop {
            ticker.tick().await;
            match compress_rotated_logs(&log_file, Utc::now().date_naive(), retention).await {
                Ok(summary) if summary != MaintenanceSummary::default() => info!(
                    "Log maintenance compressed {} and removed {} files",
                    summary.compressed, summary.removed
                ),
                Ok(_) => {}
                Err(e) => warn!("Log maintenance failed: {}", e),
            }
        }
    })
}
