//! Printer transports
//!
//! - [`NetworkPrinter`]: raw TCP (port 9100) label printers
//! - `WindowsPrinter`: spooler printers, raw spool and GDI page drawing

use crate::error::{PrintError, PrintResult};
use crate::page::PageDocument;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};

/// A device labels can be sent to
#[allow(async_fn_in_trait)]
pub trait Printer {
    /// Send a pre-formatted payload straight to the device
    async fn print_raw(&self, data: &[u8]) -> PrintResult<()>;

    /// Draw a page document through the printer's page path
    async fn print_page(&self, page: &PageDocument) -> PrintResult<()>;

    /// Reachability check, no job is sent
    async fn is_online(&self) -> bool;
}

/// Label printer on the network, raw TCP
///
/// Pages are sent as plain text since there is no driver to draw them.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: SocketAddr,
    timeout: Duration,
}

/// Raw port of ZPL label printers
pub const RAW_PORT: u16 = 9100;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

impl NetworkPrinter {
    pub fn new(host: &str, port: u16) -> PrintResult<Self> {
        Self::parse(&format!("{}:{}", host, port))
    }

    /// Parse `host:port`; a bare host gets [`RAW_PORT`]
    pub fn from_addr(addr: &str) -> PrintResult<Self> {
        if addr.contains(':') {
            Self::parse(addr)
        } else {
            Self::parse(&format!("{}:{}", addr, RAW_PORT))
        }
    }

    fn parse(addr: &str) -> PrintResult<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("'{}' is not a socket address", addr)))?;
        Ok(Self {
            addr,
            timeout: CONNECT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn send(&self, data: &[u8]) -> PrintResult<()> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| PrintError::Timeout(format!("{} did not answer within {:?}", self.addr, self.timeout)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.addr, e)))?;

        stream.write_all(data).await?;
        stream.flush().await?;
        stream.shutdown().await?;

        debug!(bytes = data.len(), "Label payload delivered");
        Ok(())
    }
}

impl Printer for NetworkPrinter {
    #[instrument(skip(data), fields(addr = %self.addr, data_len = data.len()))]
    async fn print_raw(&self, data: &[u8]) -> PrintResult<()> {
        self.send(data).await
    }

    #[instrument(skip(page), fields(addr = %self.addr, title = %page.title))]
    async fn print_page(&self, page: &PageDocument) -> PrintResult<()> {
        self.send(page.to_plain_text().as_bytes()).await
    }

    #[instrument(fields(addr = %self.addr))]
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(Duration::from_millis(500), TcpStream::connect(self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Label printer unreachable");
                false
            }
            Err(_) => {
                warn!("Label printer did not answer the reachability check");
                false
            }
        }
    }
}

/// Windows driver printer
///
/// Uses the Win32 spooler: `WritePrinter` with the RAW datatype for control
/// payloads, GDI (`StartDoc`/`TextOut`) for page documents.
#[cfg(windows)]
pub struct WindowsPrinter {
    name: String,
}

#[cfg(windows)]
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Open spooler handle, closed on drop
#[cfg(windows)]
struct SpoolHandle(windows::Win32::Graphics::Printing::PRINTER_HANDLE);

#[cfg(windows)]
impl SpoolHandle {
    fn open(name: &str) -> PrintResult<Self> {
        use windows::Win32::Graphics::Printing::{OpenPrinterW, PRINTER_HANDLE};
        use windows::core::PCWSTR;

        let name_w = to_wide(name);
        let mut handle = PRINTER_HANDLE::default();
        unsafe { OpenPrinterW(PCWSTR::from_raw(name_w.as_ptr()), &mut handle, None) }
            .map_err(|e| PrintError::WindowsPrinter(format!("Cannot open '{}': {}", name, e)))?;
        Ok(Self(handle))
    }
}

#[cfg(windows)]
impl Drop for SpoolHandle {
    fn drop(&mut self) {
        let _ = unsafe { windows::Win32::Graphics::Printing::ClosePrinter(self.0) };
    }
}

/// Ports of software printers (PDF, XPS, OneNote, fax) that cannot take labels
#[cfg(windows)]
const VIRTUAL_PORTS: &[&str] = &["file:", "portprompt:", "xpsport:", "nul:"];
#[cfg(windows)]
const VIRTUAL_PORT_PREFIXES: &[&str] = &["onenote", "wfsport:"];

#[cfg(windows)]
impl WindowsPrinter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installed printers, software printers excluded
    pub fn list() -> PrintResult<Vec<String>> {
        use windows::Win32::Graphics::Printing::{
            EnumPrintersW, PRINTER_ENUM_CONNECTIONS, PRINTER_ENUM_LOCAL, PRINTER_INFO_5W,
        };

        let flags = PRINTER_ENUM_LOCAL | PRINTER_ENUM_CONNECTIONS;
        let mut needed: u32 = 0;
        let mut count: u32 = 0;

        // 第一次调用只取缓冲区大小
        let _ = unsafe { EnumPrintersW(flags, None, 5, None, &mut needed, &mut count) };
        if needed == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; needed as usize];
        unsafe {
            EnumPrintersW(flags, None, 5, Some(buf.as_mut_slice()), &mut needed, &mut count)
        }
        .map_err(|e| PrintError::WindowsPrinter(format!("Printer enumeration failed: {}", e)))?;

        let infos = unsafe {
            std::slice::from_raw_parts(buf.as_ptr() as *const PRINTER_INFO_5W, count as usize)
        };
        let names = infos
            .iter()
            .filter(|info| !info.pPrinterName.is_null())
            .filter_map(|info| {
                let name = unsafe { info.pPrinterName.to_string() }.ok()?;
                let port = if info.pPortName.is_null() {
                    String::new()
                } else {
                    unsafe { info.pPortName.to_string() }.unwrap_or_default()
                };
                (!Self::is_virtual_port(&port)).then_some(name)
            })
            .collect();
        Ok(names)
    }

    fn is_virtual_port(port: &str) -> bool {
        let port = port.to_lowercase();
        VIRTUAL_PORTS.contains(&port.as_str())
            || VIRTUAL_PORT_PREFIXES.iter().any(|p| port.starts_with(p))
    }

    /// System default printer
    pub fn default_printer() -> PrintResult<Option<String>> {
        use windows::Win32::Graphics::Printing::GetDefaultPrinterW;
        use windows::core::PWSTR;

        let mut len: u32 = 0;
        let _ = unsafe { GetDefaultPrinterW(None, &mut len) };
        if len == 0 {
            return Ok(None);
        }

        let mut buf = vec![0u16; len as usize];
        if !unsafe { GetDefaultPrinterW(Some(PWSTR(buf.as_mut_ptr())), &mut len) }.as_bool() {
            return Ok(None);
        }
        let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
        String::from_utf16(&buf[..end])
            .map(Some)
            .map_err(|e| PrintError::WindowsPrinter(format!("Default printer name: {}", e)))
    }

    /// Whether the spooler reports the printer offline
    pub fn check_online(name: &str) -> PrintResult<bool> {
        use windows::Win32::Graphics::Printing::{GetPrinterW, PRINTER_INFO_6, PRINTER_STATUS_OFFLINE};

        let handle = SpoolHandle::open(name)?;
        let mut needed: u32 = 0;
        let _ = unsafe { GetPrinterW(handle.0, 6, None, &mut needed) };
        if needed == 0 {
            return Ok(true);
        }

        let mut buf = vec![0u8; needed as usize];
        if unsafe { GetPrinterW(handle.0, 6, Some(buf.as_mut_slice()), &mut needed) }.is_err() {
            return Ok(true);
        }
        let status = unsafe { (*(buf.as_ptr() as *const PRINTER_INFO_6)).dwStatus };
        Ok(status & PRINTER_STATUS_OFFLINE == 0)
    }

    fn write_raw(&self, data: &[u8]) -> PrintResult<()> {
        use core::ffi::c_void;
        use windows::Win32::Graphics::Printing::{
            DOC_INFO_1W, EndDocPrinter, EndPagePrinter, StartDocPrinterW, StartPagePrinter, WritePrinter,
        };
        use windows::core::PWSTR;

        // 状态未知时照常发送
        if !Self::check_online(&self.name).unwrap_or(true) {
            return Err(PrintError::Offline(self.name.clone()));
        }
        let handle = SpoolHandle::open(&self.name)?;

        let doc_name = to_wide("Label (raw)");
        let datatype = to_wide("RAW");
        let doc_info = DOC_INFO_1W {
            pDocName: PWSTR(doc_name.as_ptr() as *mut _),
            pOutputFile: PWSTR::null(),
            pDatatype: PWSTR(datatype.as_ptr() as *mut _),
        };

        unsafe {
            if StartDocPrinterW(handle.0, 1, &doc_info) == 0 {
                return Err(PrintError::WindowsPrinter(format!("'{}' refused the raw job", self.name)));
            }
            if !StartPagePrinter(handle.0).as_bool() {
                let _ = EndDocPrinter(handle.0);
                return Err(PrintError::WindowsPrinter("Cannot start raw page".to_string()));
            }

            let mut written: u32 = 0;
            let ok = WritePrinter(
                handle.0,
                data.as_ptr() as *const c_void,
                data.len() as u32,
                &mut written,
            )
            .as_bool();
            let _ = EndPagePrinter(handle.0);
            let _ = EndDocPrinter(handle.0);

            match (ok, written as usize == data.len()) {
                (false, _) => Err(PrintError::WindowsPrinter("Spooler write failed".to_string())),
                (true, false) => Err(PrintError::WindowsPrinter(format!(
                    "Spooler accepted {} of {} bytes",
                    written,
                    data.len()
                ))),
                (true, true) => Ok(()),
            }
        }
    }

    fn draw_page(&self, page: &PageDocument) -> PrintResult<()> {
        use windows::Win32::Graphics::Gdi::{
            CLIP_DEFAULT_PRECIS, CreateDCW, CreateFontW, DEFAULT_CHARSET, DEFAULT_QUALITY,
            DeleteDC, DeleteObject, FW_NORMAL, GetDeviceCaps, HGDIOBJ, LOGPIXELSX, LOGPIXELSY,
            OUT_DEFAULT_PRECIS, SelectObject, TextOutW,
        };
        use windows::Win32::Storage::Xps::{DOCINFOW, EndDoc, EndPage, StartDocW, StartPage};
        use windows::core::PCWSTR;

        unsafe {
            let name_w = to_wide(&self.name);
            let hdc = CreateDCW(PCWSTR::null(), PCWSTR::from_raw(name_w.as_ptr()), PCWSTR::null(), None);
            if hdc.is_invalid() {
                return Err(PrintError::WindowsPrinter("CreateDCW failed".to_string()));
            }

            let dpi_x = GetDeviceCaps(Some(hdc), LOGPIXELSX) as f32;
            let dpi_y = GetDeviceCaps(Some(hdc), LOGPIXELSY) as f32;
            let mm_to_x = |mm: f32| (mm / 25.4 * dpi_x).round() as i32;
            let mm_to_y = |mm: f32| (mm / 25.4 * dpi_y).round() as i32;

            let font_height = -((page.layout.font_size_pt / 72.0 * dpi_y).round() as i32);
            let face_w = to_wide(&page.layout.font_family);
            let font = CreateFontW(
                font_height,
                0,
                0,
                0,
                FW_NORMAL.0 as i32,
                0,
                0,
                0,
                DEFAULT_CHARSET,
                OUT_DEFAULT_PRECIS,
                CLIP_DEFAULT_PRECIS,
                DEFAULT_QUALITY,
                0,
                PCWSTR::from_raw(face_w.as_ptr()),
            );
            let previous = SelectObject(hdc, HGDIOBJ(font.0));

            let title_w = to_wide(&page.title);
            let doc_info = DOCINFOW {
                cbSize: std::mem::size_of::<DOCINFOW>() as i32,
                lpszDocName: PCWSTR::from_raw(title_w.as_ptr()),
                ..Default::default()
            };

            let cleanup = || {
                SelectObject(hdc, previous);
                let _ = DeleteObject(HGDIOBJ(font.0));
                let _ = DeleteDC(hdc);
            };

            if StartDocW(hdc, &doc_info) <= 0 {
                cleanup();
                return Err(PrintError::WindowsPrinter("StartDoc failed".to_string()));
            }
            if StartPage(hdc) <= 0 {
                let _ = EndDoc(hdc);
                cleanup();
                return Err(PrintError::WindowsPrinter("StartPage failed".to_string()));
            }

            for line in &page.lines {
                let text: Vec<u16> = line.text.encode_utf16().collect();
                let _ = TextOutW(hdc, mm_to_x(line.x_mm), mm_to_y(line.y_mm), &text);
            }

            let page_ok = EndPage(hdc) > 0;
            let doc_ok = EndDoc(hdc) > 0;
            cleanup();

            if !page_ok || !doc_ok {
                return Err(PrintError::WindowsPrinter("EndPage/EndDoc failed".to_string()));
            }
            Ok(())
        }
    }
}

/// Spooler calls block; run them off the runtime
#[cfg(windows)]
async fn blocking<T, F>(f: F) -> PrintResult<T>
where
    F: FnOnce() -> PrintResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PrintError::WindowsPrinter(format!("Spooler task aborted: {}", e)))?
}

#[cfg(windows)]
impl Printer for WindowsPrinter {
    async fn print_raw(&self, data: &[u8]) -> PrintResult<()> {
        let printer = WindowsPrinter::new(&self.name);
        let data = data.to_vec();
        blocking(move || printer.write_raw(&data)).await
    }

    async fn print_page(&self, page: &PageDocument) -> PrintResult<()> {
        let printer = WindowsPrinter::new(&self.name);
        let page = page.clone();
        blocking(move || printer.draw_page(&page)).await
    }

    async fn is_online(&self) -> bool {
        Self::check_online(&self.name).unwrap_or(false)
    }
}
