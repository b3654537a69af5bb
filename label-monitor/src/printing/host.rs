//! Printer host
//!
//! The dispatcher sees printers only through [`PrinterHost`]: which
//! printers exist, which one is the default, and the two delivery paths.

use async_trait::async_trait;
use label_printer::{NetworkPrinter, PageDocument, PrintError, PrintResult, Printer};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[async_trait]
pub trait PrinterHost: Send + Sync {
    /// Names of every printer this host can reach
    async fn installed_printers(&self) -> PrintResult<Vec<String>>;

    /// System default printer, if any
    async fn default_printer(&self) -> PrintResult<Option<String>>;

    /// Draw a page through the printer's driver
    async fn draw_page(&self, printer: &str, page: &PageDocument) -> PrintResult<()>;

    /// Copy a raw payload straight to the device
    async fn spool_raw(&self, printer: &str, data: &[u8]) -> PrintResult<()>;
}

/// Configured network printers plus the Windows spooler
pub struct SystemPrinterHost {
    network: BTreeMap<String, NetworkPrinter>,
}

impl SystemPrinterHost {
    pub fn new() -> Self {
        Self {
            network: BTreeMap::new(),
        }
    }

    /// Register a raw TCP printer under a display name
    pub fn with_network_printer(mut self, name: impl Into<String>, printer: NetworkPrinter) -> Self {
        self.network.insert(name.into(), printer);
        self
    }

    #[cfg(windows)]
    async fn spooler_printers() -> PrintResult<Vec<String>> {
        tokio::task::spawn_blocking(label_printer::WindowsPrinter::list)
            .await
            .map_err(|e| PrintError::WindowsPrinter(format!("Task join failed: {}", e)))?
    }

    #[cfg(not(windows))]
    async fn spooler_printers() -> PrintResult<Vec<String>> {
        Ok(Vec::new())
    }
}

impl Default for SystemPrinterHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrinterHost for SystemPrinterHost {
    async fn installed_printers(&self) -> PrintResult<Vec<String>> {
        let mut names: Vec<String> = self.network.keys().cloned().collect();
        match Self::spooler_printers().await {
            Ok(spooled) => names.extend(spooled.into_iter().filter(|n| !self.network.contains_key(n))),
            // 网络打印机仍可用时不因本地枚举失败而中断
            Err(e) if !names.is_empty() => {
                tracing::warn!(error = %e, "Failed to enumerate spooler printers");
            }
            Err(e) => return Err(e),
        }
        Ok(names)
    }

    async fn default_printer(&self) -> PrintResult<Option<String>> {
        #[cfg(windows)]
        {
            tokio::task::spawn_blocking(label_printer::WindowsPrinter::default_printer)
                .await
                .map_err(|e| PrintError::WindowsPrinter(format!("Task join failed: {}", e)))?
        }
        #[cfg(not(windows))]
        {
            Ok(None)
        }
    }

    async fn draw_page(&self, printer: &str, page: &PageDocument) -> PrintResult<()> {
        if let Some(net) = self.network.get(printer) {
            return net.print_page(page).await;
        }
        #[cfg(windows)]
        {
            label_printer::WindowsPrinter::new(printer).print_page(page).await
        }
        #[cfg(not(windows))]
        {
            Err(PrintError::Unsupported(format!(
                "'{}' is not a network printer and no spooler is available",
                printer
            )))
        }
    }

    async fn spool_raw(&self, printer: &str, data: &[u8]) -> PrintResult<()> {
        if let Some(net) = self.network.get(printer) {
            return net.print_raw(data).await;
        }
        #[cfg(windows)]
        {
            label_printer::WindowsPrinter::new(printer).print_raw(data).await
        }
        #[cfg(not(windows))]
        {
            Err(PrintError::Unsupported(format!(
                "'{}' is not a network printer and no spooler is available",
                printer
            )))
        }
    }
}

/// Payload captured by [`MemoryPrinterHost`]
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedJob {
    Page { printer: String, page: PageDocument },
    Raw { printer: String, data: Vec<u8> },
}

impl CapturedJob {
    pub fn printer(&self) -> &str {
        match self {
            CapturedJob::Page { printer, .. } | CapturedJob::Raw { printer, .. } => printer,
        }
    }
}

/// Host that keeps jobs in memory
///
/// Backs `--dry-run` and the tests.
#[derive(Debug, Default)]
pub struct MemoryPrinterHost {
    printers: Vec<String>,
    default: Option<String>,
    jobs: Mutex<Vec<CapturedJob>>,
    fail_with: Mutex<Option<String>>,
    queries: AtomicUsize,
}

impl MemoryPrinterHost {
    pub fn new(printers: &[&str]) -> Self {
        Self {
            printers: printers.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_default(mut self, name: &str) -> Self {
        self.default = Some(name.to_string());
        self
    }

    /// Make every delivery fail with an offline error
    pub fn fail_deliveries(&self, reason: Option<&str>) {
        *self.fail_with.lock() = reason.map(str::to_string);
    }

    pub fn jobs(&self) -> Vec<CapturedJob> {
        self.jobs.lock().clone()
    }

    /// How often the printer list was asked for
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn deliver(&self, job: CapturedJob) -> PrintResult<()> {
        if let Some(reason) = self.fail_with.lock().clone() {
            return Err(PrintError::Offline(reason));
        }
        tracing::info!(printer = job.printer(), "Dry-run job captured");
        self.jobs.lock().push(job);
        Ok(())
    }
}

#[async_trait]
impl PrinterHost for MemoryPrinterHost {
    async fn installed_printers(&self) -> PrintResult<Vec<String>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.printers.clone())
    }

    async fn default_printer(&self) -> PrintResult<Option<String>> {
        Ok(self.default.clone())
    }

    async fn draw_page(&self, printer: &str, page: &PageDocument) -> PrintResult<()> {
        self.deliver(CapturedJob::Page {
            printer: printer.to_string(),
            page: page.clone(),
        })
    }

    async fn spool_raw(&self, printer: &str, data: &[u8]) -> PrintResult<()> {
        self.deliver(CapturedJob::Raw {
            printer: printer.to_string(),
            data: data.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_network_printer_listed_and_used() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let receiver = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let host = SystemPrinterHost::new()
            .with_network_printer("bench-zebra", NetworkPrinter::from_addr(&addr.to_string()).unwrap());
        let printers = host.installed_printers().await.unwrap();
        assert!(printers.contains(&"bench-zebra".to_string()));

        host.spool_raw("bench-zebra", b"^XA^XZ").await.unwrap();
        assert_eq!(receiver.await.unwrap(), b"^XA^XZ");
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_unknown_printer_unsupported_without_spooler() {
        let host = SystemPrinterHost::new();
        assert!(host.installed_printers().await.unwrap().is_empty());
        let page = PageDocument::from_text("t", "x", label_printer::PageLayout::default());
        assert!(matches!(
            host.draw_page("Office", &page).await,
            Err(PrintError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_host_captures_and_fails() {
        let host = MemoryPrinterHost::new(&["A"]).with_default("A");
        host.spool_raw("A", b"abc").await.unwrap();
        host.fail_deliveries(Some("paper out"));
        assert!(host.spool_raw("A", b"def").await.is_err());

        assert_eq!(
            host.jobs(),
            vec![CapturedJob::Raw {
                printer: "A".into(),
                data: b"abc".to_vec()
            }]
        );
        assert_eq!(host.default_printer().await.unwrap().as_deref(), Some("A"));
    }
}
