//! Change Detector and Retry Controller
//!
//! - [`RecordMonitor`] - session state machine and poll loop
//! - [`ChangeDetector`] - baseline comparison
//! - [`RetryBudget`] - consecutive-failure accounting

pub mod detector;
pub mod retry;
pub mod session;

pub use detector::{BaselineComparison, ChangeDetector, Comparison};
pub use retry::{DEFAULT_FAILURE_THRESHOLD, RetryBudget, RetryVerdict};
pub use session::{DEFAULT_RECENT_WINDOW, MonitorSettings, RecordMonitor, TickOutcome};
