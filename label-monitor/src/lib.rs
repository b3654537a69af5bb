//! Label Monitor - 测量数据标签自动打印服务
//!
//! # 架构概述
//!
//! Watches a measurement store for newly appended records and prints a
//! label for each one.
//!
//! ```text
//! RecordMonitor tick ─► RecordSource::get_last_record ─► ChangeDetector
//!        │                                                   │ changed
//!        │                                    get_recent_records(window)
//!        ▼                                                   ▼
//!   RetryBudget                                  EventBus::publish(DataUpdated)
//!                                                            │
//!                                   AutoPrintWorker ─► PrintDispatcher ─► PrinterHost
//!                                                            │
//!                                          update_record_print_count (optional)
//! ```
//!
//! # 模块结构
//!
//! ```text
//! label-monitor/src/
//! ├── core/       # 配置、错误、服务状态、后台任务
//! ├── source/     # 数据源 (SQLite, 内存)
//! ├── monitor/    # 轮询、变化检测、重试预算
//! ├── events.rs   # 事件总线
//! ├── printing/   # 模板渲染、打印分发、重打确认、自动打印
//! └── utils/      # 日志
//! ```

pub mod core;
pub mod events;
pub mod monitor;
pub mod printing;
pub mod source;
pub mod utils;

// Re-export 公共类型
pub use crate::core::{Config, MonitorError, RunExit, ServiceState, StartupError};
pub use events::{EventBus, EventSubscriber, MonitorEvent};
pub use monitor::{BaselineComparison, MonitorSettings, RecordMonitor, TickOutcome};
pub use printing::{ManualPrint, PrintDispatcher, ReprintGuard, TemplateCatalog};
pub use source::{MemoryRecordSource, RecordSource, SqliteRecordSource};

pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};
