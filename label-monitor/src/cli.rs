//! 命令行参数
//!
//! Flags override the matching environment variables after the env file
//! has been loaded.

use clap::{Args, Parser, Subcommand};
use label_monitor::Config;
use shared::OutputFormat;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "label-monitor")]
#[command(version)]
#[command(about = "Watches a measurement store and prints a label for every new record", long_about = None)]
pub struct Cli {
    /// Env file read before configuration (default: ./.env when present)
    #[arg(long, env = "LABEL_MONITOR_ENV_FILE", global = true)]
    pub env_file: Option<PathBuf>,

    /// SQLite store file (STORE_PATH)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Monitored table (STORE_TABLE)
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// Printer name (PRINTER_NAME)
    #[arg(long, global = true)]
    pub printer: Option<String>,

    /// text, zpl, code128 or qrcode (PRINT_FORMAT)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Template name (DEFAULT_TEMPLATE)
    #[arg(long, global = true)]
    pub template: Option<String>,

    /// Log level or filter expression (LOG_LEVEL)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Monitor the store until Ctrl-C (default)
    Run(RunArgs),
    /// Connect to the store and report the strategy that worked
    Check,
    /// List the printers this host can reach
    Printers,
    /// Print one record on demand
    Print(PrintArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Poll interval in milliseconds (POLL_INTERVAL_MS)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Report new records without printing them
    #[arg(long, default_value_t = false)]
    pub no_auto_print: bool,

    /// Capture jobs in memory instead of sending them to a printer
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PrintArgs {
    /// Primary key of the record
    #[arg(long)]
    pub key: i64,

    /// Reprint without asking when the record was printed before
    #[arg(short, long, default_value_t = false)]
    pub yes: bool,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Run(RunArgs::default()))
    }

    /// Apply flag overrides on top of the environment
    pub fn apply(&self, config: &mut Config) {
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
        if let Some(table) = &self.table {
            config.store_table = table.clone();
        }
        if let Some(printer) = &self.printer {
            config.printer_name = Some(printer.clone());
        }
        if let Some(format) = self.format {
            config.print_format = format;
        }
        if let Some(template) = &self.template {
            config.default_template = template.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(Command::Run(run)) = &self.command {
            if let Some(ms) = run.interval_ms {
                config.poll_interval_ms = ms;
            }
            if run.no_auto_print {
                config.auto_print = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::parse_from(["label-monitor"]);
        assert!(matches!(cli.command(), Command::Run(ref r) if !r.dry_run));
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::parse_from([
            "label-monitor",
            "--store",
            "/data/bench.db",
            "--format",
            "zpl",
            "run",
            "--interval-ms",
            "2500",
            "--no-auto-print",
        ]);
        let mut config = Config::from_env();
        cli.apply(&mut config);

        assert_eq!(config.store_path, PathBuf::from("/data/bench.db"));
        assert_eq!(config.print_format, OutputFormat::Zpl);
        assert_eq!(config.poll_interval_ms, 2500);
        assert!(!config.auto_print);
    }

    #[test]
    fn test_print_requires_key() {
        assert!(Cli::try_parse_from(["label-monitor", "print"]).is_err());
        let cli = Cli::try_parse_from(["label-monitor", "print", "--key", "42", "-y"]).unwrap();
        assert!(matches!(cli.command(), Command::Print(PrintArgs { key: 42, yes: true })));
    }
}
