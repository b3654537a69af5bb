use crate::monitor::BaselineComparison;
use crate::monitor::DEFAULT_RECENT_WINDOW;
use crate::printing::{DEFAULT_TEMPLATE_NAME, DispatchSettings};
use crate::source::StoreSchema;
use label_printer::{Codepage, NetworkPrinter};
use shared::OutputFormat;
use std::path::PathBuf;
use thiserror::Error;

pub const MIN_POLL_INTERVAL_MS: u64 = 500;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Clamp a poll interval into the supported range
pub fn clamp_poll_interval_ms(ms: u64) -> u64 {
    ms.clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("STORE_PATH is empty")]
    EmptyStorePath,

    #[error("STORE_TABLE is empty")]
    EmptyTable,

    #[error("Column mapping for {0} is empty")]
    EmptyColumn(&'static str),

    #[error("Invalid network printer '{entry}': {reason}")]
    InvalidNetworkPrinter { entry: String, reason: String },
}

/// A raw TCP printer declared in `NETWORK_PRINTERS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPrinterEntry {
    pub name: String,
    /// `host:port`, or a bare host for port 9100
    pub addr: String,
}

/// 标签监控配置
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | STORE_PATH | ./results.db | 测量数据库文件 |
/// | STORE_TABLE | TestResults | 监控的表 |
/// | POLL_INTERVAL_MS | 1000 | 轮询间隔 (500-60000) |
/// | RECENT_WINDOW | 50 | 变化时读取的最近记录数 |
/// | BASELINE_COMPARISON | full | `full` 或 `key` |
/// | PRINT_COUNT_ENABLED | false | 打印计数 |
/// | AUTO_PRINT | true | 新记录自动打印 |
/// | PRINTER_NAME | - | 指定打印机 |
/// | PRINT_FORMAT | text | text / zpl / code128 / qrcode |
/// | DEFAULT_TEMPLATE | default | 默认模板名 |
/// | TEMPLATES_FILE | - | 模板 JSON 文件 |
/// | NETWORK_PRINTERS | - | `name=host:port,...` |
/// | PRINTER_CODEPAGE | utf-8 | utf-8 / windows-1252 / gbk |
/// | LOG_LEVEL | info | 日志级别或 EnvFilter 表达式 |
/// | LOG_DIR | - | 日志目录 (按天滚动) |
/// | COLUMN_KEY | ID | 主键列 |
/// | COLUMN_SERIAL | SerialNumber | 序列号列 |
/// | COLUMN_TIMESTAMP | TestTime | 时间列 |
/// | COLUMN_MEASUREMENTS | Resistance,Voltage,Current,Leakage | 测量值列 |
/// | COLUMN_PRINT_COUNT | PrintCount | 打印计数列 |
#[derive(Debug, Clone)]
pub struct Config {
    pub store_path: PathBuf,
    pub store_table: String,
    pub poll_interval_ms: u64,
    pub recent_window: usize,
    pub baseline_comparison: BaselineComparison,
    pub print_count_enabled: bool,
    pub auto_print: bool,
    pub printer_name: Option<String>,
    pub print_format: OutputFormat,
    pub default_template: String,
    pub templates_file: Option<PathBuf>,
    pub network_printers: Vec<NetworkPrinterEntry>,
    pub codepage: Codepage,
    pub log_level: String,
    pub log_dir: Option<String>,

    // === 列映射 ===
    pub column_key: String,
    pub column_serial: String,
    pub column_timestamp: String,
    pub column_measurements: Vec<String>,
    pub column_print_count: String,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `name=host:port,...`; an entry without `=` is named after its address
pub fn parse_network_printers(value: &str) -> Vec<NetworkPrinterEntry> {
    split_list(value)
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, addr)) => NetworkPrinterEntry {
                name: name.trim().to_string(),
                addr: addr.trim().to_string(),
            },
            None => NetworkPrinterEntry {
                name: entry.clone(),
                addr: entry,
            },
        })
        .collect()
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 未设置或无法解析的变量使用默认值
    pub fn from_env() -> Self {
        let schema = StoreSchema::default();
        Self {
            store_path: PathBuf::from(env_or("STORE_PATH", "./results.db")),
            store_table: env_or("STORE_TABLE", &schema.table),
            poll_interval_ms: env_parse("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
            recent_window: env_parse("RECENT_WINDOW", DEFAULT_RECENT_WINDOW),
            baseline_comparison: env_parse("BASELINE_COMPARISON", BaselineComparison::default()),
            print_count_enabled: env_parse("PRINT_COUNT_ENABLED", false),
            auto_print: env_parse("AUTO_PRINT", true),
            printer_name: env_opt("PRINTER_NAME"),
            print_format: env_parse("PRINT_FORMAT", OutputFormat::default()),
            default_template: env_or("DEFAULT_TEMPLATE", DEFAULT_TEMPLATE_NAME),
            templates_file: env_opt("TEMPLATES_FILE").map(PathBuf::from),
            network_printers: env_opt("NETWORK_PRINTERS")
                .map(|v| parse_network_printers(&v))
                .unwrap_or_default(),
            codepage: env_parse("PRINTER_CODEPAGE", Codepage::default()),
            log_level: env_or("LOG_LEVEL", "info"),
            log_dir: env_opt("LOG_DIR"),

            column_key: env_or("COLUMN_KEY", &schema.key_column),
            column_serial: env_or("COLUMN_SERIAL", &schema.serial_column),
            column_timestamp: env_or("COLUMN_TIMESTAMP", &schema.timestamp_column),
            column_measurements: env_opt("COLUMN_MEASUREMENTS")
                .map(|v| split_list(&v))
                .unwrap_or(schema.measurement_columns),
            column_print_count: env_or("COLUMN_PRINT_COUNT", &schema.print_count_column),
        }
    }

    /// Check required values and clamp ranges
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.store_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStorePath);
        }
        if self.store_table.trim().is_empty() {
            return Err(ConfigError::EmptyTable);
        }
        for (name, value) in [
            ("COLUMN_KEY", &self.column_key),
            ("COLUMN_SERIAL", &self.column_serial),
            ("COLUMN_TIMESTAMP", &self.column_timestamp),
            ("COLUMN_PRINT_COUNT", &self.column_print_count),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyColumn(name));
            }
        }

        let clamped = clamp_poll_interval_ms(self.poll_interval_ms);
        if clamped != self.poll_interval_ms {
            tracing::warn!(
                requested = self.poll_interval_ms,
                applied = clamped,
                "Poll interval out of range, clamped"
            );
            self.poll_interval_ms = clamped;
        }
        self.recent_window = self.recent_window.max(1);

        for entry in &self.network_printers {
            if entry.name.is_empty() {
                return Err(ConfigError::InvalidNetworkPrinter {
                    entry: entry.addr.clone(),
                    reason: "missing name".into(),
                });
            }
            NetworkPrinter::from_addr(&entry.addr).map_err(|e| {
                ConfigError::InvalidNetworkPrinter {
                    entry: entry.name.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Table and column mapping for the store adapter
    pub fn schema(&self) -> StoreSchema {
        StoreSchema {
            table: self.store_table.clone(),
            key_column: self.column_key.clone(),
            serial_column: self.column_serial.clone(),
            timestamp_column: self.column_timestamp.clone(),
            measurement_columns: self.column_measurements.clone(),
            print_count_column: self.column_print_count.clone(),
            track_print_count: self.print_count_enabled,
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            printer_name: self.printer_name.clone(),
            default_template: self.default_template.clone(),
            print_count_enabled: self.print_count_enabled,
            codepage: self.codepage,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let mut config = Config::from_env();
        config.store_path = PathBuf::from("results.db");
        config.store_table = "TestResults".into();
        config.network_printers.clear();
        config
    }

    #[test]
    fn test_poll_interval_clamped() {
        let mut c = config();
        c.poll_interval_ms = 100;
        c.validate().unwrap();
        assert_eq!(c.poll_interval_ms, 500);

        c.poll_interval_ms = 120_000;
        c.validate().unwrap();
        assert_eq!(c.poll_interval_ms, 60_000);

        c.poll_interval_ms = 2_500;
        c.validate().unwrap();
        assert_eq!(c.poll_interval_ms, 2_500);
    }

    #[test]
    fn test_required_values() {
        let mut c = config();
        c.store_path = PathBuf::new();
        assert!(matches!(c.validate(), Err(ConfigError::EmptyStorePath)));

        let mut c = config();
        c.store_table = "  ".into();
        assert!(matches!(c.validate(), Err(ConfigError::EmptyTable)));

        let mut c = config();
        c.column_key.clear();
        assert!(matches!(c.validate(), Err(ConfigError::EmptyColumn("COLUMN_KEY"))));
    }

    #[test]
    fn test_network_printers() {
        let entries = parse_network_printers("bench=192.168.1.20:9100, 10.0.0.7 ,,");
        assert_eq!(
            entries,
            vec![
                NetworkPrinterEntry {
                    name: "bench".into(),
                    addr: "192.168.1.20:9100".into()
                },
                NetworkPrinterEntry {
                    name: "10.0.0.7".into(),
                    addr: "10.0.0.7".into()
                },
            ]
        );

        let mut c = config();
        c.network_printers = entries;
        assert!(c.validate().is_ok());

        c.network_printers = parse_network_printers("bad=not-an-address");
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidNetworkPrinter { .. })
        ));
    }

    #[test]
    fn test_schema_mapping() {
        let mut c = config();
        c.print_count_enabled = true;
        c.column_measurements = vec!["U".into(), "I".into()];
        let schema = c.schema();
        assert_eq!(schema.table, "TestResults");
        assert!(schema.track_print_count);
        assert_eq!(schema.measurement_columns, vec!["U".to_string(), "I".to_string()]);
        assert!(c.dispatch_settings().print_count_enabled);
    }
}
