//! Service core: configuration, errors, state and subscriber tasks

pub mod config;
pub mod error;
pub mod state;
pub mod tasks;

pub use config::{Config, ConfigError, NetworkPrinterEntry};
pub use error::{MonitorError, MonitorResult};
pub use state::{RunExit, ServiceState, StartupError, load_catalog, open_store, system_printer_host};
pub use tasks::SubscriberTasks;
