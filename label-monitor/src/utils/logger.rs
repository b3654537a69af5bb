//! Logging Infrastructure
//!
//! - Console output filtered by `LOG_LEVEL` (or `RUST_LOG`)
//! - Daily rotating application logs in `<log_dir>/app`, deleted after 14 days
//! - Permanent print ledger in `<log_dir>/prints` (target `print_audit`)

use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, prelude::*};

/// Target of the print ledger events
pub const PRINT_AUDIT_TARGET: &str = "print_audit";

const APP_LOG_PREFIX: &str = "label-monitor";
const RETENTION_DAYS: i64 = 14;

/// Delete application log files older than the retention period
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(RETENTION_DAYS);
    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // label-monitor.YYYY-MM-DD
        if let Some(date_part) = name.strip_prefix(APP_LOG_PREFIX).and_then(|d| d.strip_prefix('.'))
            && let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            && date < cutoff
        {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Initialize logging
///
/// `level` is either a plain level or an `EnvFilter` directive string;
/// `RUST_LOG` wins when set.
///
/// ```ignore
/// // console only
/// init_logger_with_file("debug", false, None)?;
/// // console + files
/// init_logger_with_file("info", false, Some("./logs"))?;
/// ```
pub fn init_logger_with_file(level: &str, json_format: bool, log_dir: Option<&str>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer().with_target(false).with_thread_ids(false).boxed()
    };

    let Some(dir) = log_dir else {
        registry.with(console_layer).init();
        return Ok(());
    };

    let log_dir = Path::new(dir);
    let app_log_dir = log_dir.join("app");
    let print_log_dir = log_dir.join("prints");
    fs::create_dir_all(&app_log_dir)?;
    fs::create_dir_all(&print_log_dir)?;

    let app_log = RollingFileAppender::new(Rotation::DAILY, app_log_dir, APP_LOG_PREFIX);
    let app_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(app_log))
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() != PRINT_AUDIT_TARGET
        }));

    // 打印记录永久保留
    let print_log = RollingFileAppender::new(Rotation::DAILY, print_log_dir, "prints");
    let print_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(print_log))
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() == PRINT_AUDIT_TARGET
        }));

    registry
        .with(console_layer)
        .with(app_layer)
        .with(print_layer)
        .init();

    tokio::spawn(periodic_cleanup(log_dir.to_path_buf()));
    Ok(())
}

/// Console-only logging
pub fn init_logger(level: &str) -> anyhow::Result<()> {
    init_logger_with_file(level, false, None)
}

async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to clean up old logs");
        }
        sleep(Duration::from_secs(3600)).await;
    }
}
