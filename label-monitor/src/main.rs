mod cli;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::Parser;
use cli::{Cli, Command, PrintArgs, RunArgs};
use label_monitor::core::{open_store, system_printer_host};
use label_monitor::printing::{AlwaysConfirm, MemoryPrinterHost, PrinterHost, ReprintConfirmation};
use label_monitor::source::ConnectionError;
use label_monitor::{Config, ManualPrint, RecordSource, RunExit, ServiceState, StartupError, init_logger_with_file};
use serde::Serialize;
use shared::Record;
use std::io::Write;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. 环境变量 (.env 或 --env-file)
    match &cli.env_file {
        Some(path) => {
            dotenv::from_path(path).with_context(|| format!("Cannot load env file {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    // 2. 配置 + 命令行覆盖
    let mut config = Config::from_env();
    cli.apply(&mut config);

    // 3. 日志
    init_logger_with_file(&config.log_level, false, config.log_dir.as_deref())?;
    config.validate().context("Invalid configuration")?;

    match cli.command() {
        Command::Run(args) => run(config, args).await,
        Command::Check => check(config).await,
        Command::Printers => printers(config).await,
        Command::Print(args) => print(config, args).await,
    }
}

async fn run(config: Config, args: RunArgs) -> Result<()> {
    let host: Arc<dyn PrinterHost> = if args.dry_run {
        tracing::info!("Dry run: jobs are captured, nothing is printed");
        Arc::new(MemoryPrinterHost::new(&["dry-run"]))
    } else {
        Arc::new(system_printer_host(&config)?)
    };

    tracing::info!(
        store = %config.store_path.display(),
        table = %config.store_table,
        interval_ms = config.poll_interval_ms,
        format = %config.print_format,
        "Label monitor starting"
    );

    let state = ServiceState::initialize(config, host).await.inspect_err(report_hint)?;
    let exit = state
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    state.dispatcher().flush_count_updates().await;

    match exit {
        RunExit::Interrupted => {
            tracing::info!("Label monitor stopped");
            Ok(())
        }
        RunExit::MonitoringStopped => bail!("Monitoring stopped after repeated store failures"),
    }
}

/// `check` 输出
#[derive(Debug, Serialize)]
struct CheckReport {
    store: String,
    table: String,
    strategy: String,
    read_only: bool,
    last_record: Option<Record>,
}

async fn check(config: Config) -> Result<()> {
    let source = open_store(&config).await.inspect_err(report_hint)?;
    let last_record = source.get_last_record().await?;

    let report = CheckReport {
        store: source.path().display().to_string(),
        table: source.schema().table.clone(),
        strategy: source.strategy().name().to_string(),
        read_only: source.strategy().is_read_only(),
        last_record,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn printers(config: Config) -> Result<()> {
    let host = system_printer_host(&config)?;
    let installed = host.installed_printers().await?;
    let default = host.default_printer().await?;

    if installed.is_empty() {
        println!("No printers installed");
        return Ok(());
    }
    for name in installed {
        let marker = if default.as_deref() == Some(name.as_str()) { " (default)" } else { "" };
        println!("{name}{marker}");
    }
    Ok(())
}

async fn print(config: Config, args: PrintArgs) -> Result<()> {
    let host = Arc::new(system_printer_host(&config)?);
    let format = config.print_format;
    let template = config.default_template.clone();
    let state = ServiceState::initialize(config, host).await.inspect_err(report_hint)?;

    let record = state
        .source()
        .get_record(args.key)
        .await?
        .with_context(|| format!("Record {} not found", args.key))?;

    let confirmation: Arc<dyn ReprintConfirmation> = if args.yes {
        Arc::new(AlwaysConfirm)
    } else {
        Arc::new(TerminalConfirmation)
    };
    let outcome = state
        .reprint_guard(confirmation)
        .print_interactive(&record, format, Some(&template))
        .await;
    state.dispatcher().flush_count_updates().await;

    match outcome {
        ManualPrint::Printed(result) if result.success => {
            println!(
                "Printed record {} on {}",
                record.key,
                result.printer_used.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        ManualPrint::Printed(result) if result.is_no_printer() => {
            bail!("No printer installed. Install a printer or set PRINTER_NAME / NETWORK_PRINTERS")
        }
        ManualPrint::Printed(result) => {
            bail!(
                "Print failed: {}",
                result.error_message.as_deref().unwrap_or("unknown error")
            )
        }
        ManualPrint::Declined => {
            println!("Reprint declined, nothing printed");
            Ok(())
        }
    }
}

/// Operator prompt on stdin
struct TerminalConfirmation;

#[async_trait]
impl ReprintConfirmation for TerminalConfirmation {
    async fn confirm(&self, record: &Record) -> bool {
        let prompt = format!(
            "Record {} ({}) was already printed {} time(s). Print again? [y/N] ",
            record.key,
            record.serial.as_deref().unwrap_or("no serial"),
            record.print_count
        );
        let answer = tokio::task::spawn_blocking(move || {
            print!("{prompt}");
            std::io::stdout().flush().ok();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).ok();
            line
        })
        .await
        .unwrap_or_default();

        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

fn report_hint(err: &StartupError) {
    if let StartupError::Connection(conn) = err {
        print_hint(conn);
    }
}

fn print_hint(err: &ConnectionError) {
    if let Some(hint) = err.hint() {
        eprintln!("hint: {hint}");
    }
}
