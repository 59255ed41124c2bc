use std::{
    fs::{self, DirEntry},
    io,
    path::PathBuf,
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result, anyhow};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};
use uuid::Uuid;

use crate::config::{LoggingConfig, LoggingRotation};

const LOG_FILE_PREFIX: &str = "entitlements.log";
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Keeps the non-blocking writer alive; drop it last so buffered lines flush.
pub struct LoggingGuard {
    _worker_guard: WorkerGuard,
    run_id: String,
}

impl LoggingGuard {
    /// Stamped on the first record of every run so a report can be traced
    /// back to its log file.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

/// Rolled log files older than `keep_for` are deleted at startup.
#[derive(Debug, Clone)]
pub struct LogRetention {
    dir: PathBuf,
    prefix: String,
    keep_for: Duration,
}

/// Outcome of one retention pass. Warnings are collected rather than logged
/// because the sweep runs before the subscriber exists.
#[derive(Debug, Default)]
pub struct RetentionSweep {
    pub removed: usize,
    pub warnings: Vec<String>,
}

impl LogRetention {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, retention_days: usize) -> Self {
        let days = u64::try_from(retention_days).unwrap_or(u64::MAX);
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            keep_for: Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY)),
        }
    }

    fn cutoff(&self, now: SystemTime) -> SystemTime {
        now.checked_sub(self.keep_for).unwrap_or(SystemTime::UNIX_EPOCH)
    }

    pub fn sweep(&self, now: SystemTime) -> RetentionSweep {
        let cutoff = self.cutoff(now);
        let mut sweep = RetentionSweep::default();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                sweep.warnings.push(format!(
                    "failed to scan logging directory {}: {}",
                    self.dir.display(),
                    err
                ));
                return sweep;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    sweep.warnings.push(format!(
                        "failed to read an entry of {}: {}",
                        self.dir.display(),
                        err
                    ));
                    continue;
                }
            };
            if !entry.file_name().to_string_lossy().starts_with(&self.prefix) {
                continue;
            }

            match is_expired(&entry, cutoff) {
                Ok(false) => {}
                Ok(true) => match fs::remove_file(entry.path()) {
                    Ok(()) => sweep.removed += 1,
                    Err(err) => sweep.warnings.push(format!(
                        "failed to remove expired log file {}: {}",
                        entry.path().display(),
                        err
                    )),
                },
                Err(err) => sweep.warnings.push(format!(
                    "failed to stat {}: {}",
                    entry.path().display(),
                    err
                )),
            }
        }

        sweep
    }
}

fn is_expired(entry: &DirEntry, cutoff: SystemTime) -> io::Result<bool> {
    let metadata = entry.metadata()?;
    if !metadata.is_file() {
        return Ok(false);
    }
    Ok(metadata.modified()? <= cutoff)
}

/// Logging settings checked and resolved against the working directory before
/// anything touches the filesystem.
struct LoggingPlan {
    dir: PathBuf,
    filter: EnvFilter,
    rotation: LoggingRotation,
    stderr_warnings: bool,
}

impl LoggingPlan {
    fn resolve(config: &LoggingConfig) -> Result<Self> {
        if config.dir.as_os_str().is_empty() {
            return Err(anyhow!("logging.dir cannot be empty"));
        }
        let dir = if config.dir.is_absolute() {
            config.dir.clone()
        } else {
            std::env::current_dir()
                .context("failed to read current working directory for logging.dir")?
                .join(&config.dir)
        };

        Ok(Self {
            dir,
            filter: parse_filter(&config.filter)?,
            rotation: config.rotation.clone(),
            stderr_warnings: config.stderr_warn_enabled,
        })
    }
}

fn parse_filter(filter: &str) -> Result<EnvFilter> {
    if filter.trim().is_empty() {
        return Err(anyhow!("logging.filter cannot be empty"));
    }
    EnvFilter::try_new(filter)
        .with_context(|| format!("failed to parse logging.filter '{filter}'"))
}

/// Installs JSON file logs (rolled per `logging.rotation`) plus an optional
/// WARN-and-above stderr copy, after sweeping expired files.
pub fn init_tracing(logging_config: &LoggingConfig) -> Result<LoggingGuard> {
    let plan = LoggingPlan::resolve(logging_config)?;
    fs::create_dir_all(&plan.dir)
        .with_context(|| format!("failed to create logging directory {}", plan.dir.display()))?;

    let sweep = LogRetention::new(&plan.dir, LOG_FILE_PREFIX, logging_config.retention_days)
        .sweep(SystemTime::now());

    let appender = match plan.rotation {
        LoggingRotation::Daily => rolling::daily(&plan.dir, LOG_FILE_PREFIX),
        LoggingRotation::Hourly => rolling::hourly(&plan.dir, LOG_FILE_PREFIX),
    };
    let (writer, worker_guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(
            fmt::layer()
                .json()
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_current_span(true)
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(plan.filter),
        )
        .with(plan.stderr_warnings.then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(LevelFilter::WARN)
        }))
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    let run_id = Uuid::now_v7().to_string();
    tracing::info!(
        target: "logging",
        run_id = %run_id,
        dir = %plan.dir.display(),
        filter = %logging_config.filter,
        rotation = ?logging_config.rotation,
        retention_days = logging_config.retention_days,
        expired_removed = sweep.removed,
        "logging_initialized"
    );
    for warning in &sweep.warnings {
        tracing::warn!(target: "logging", warning = %warning, "log_retention_sweep_failed");
    }

    Ok(LoggingGuard {
        _worker_guard: worker_guard,
        run_id,
    })
}
