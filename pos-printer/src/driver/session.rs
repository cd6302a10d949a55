//! Connection session bound to one brand descriptor
//!
//! Delivery order when printing:
//! 1. native handle opened at connect (TCP, serial/file device, USB)
//! 2. CUPS queue (chunked for USB printers)
//! 3. fresh raw socket to port 9100 (generic driver, LAN only)
//!
//! A native handle that fails is dropped for the rest of the session.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{BrandDescriptor, DriverDescriptor};
use crate::command::CommandRunner;
use crate::config::TransportOptions;
use crate::error::{PrintError, PrintResult};
use crate::escpos::Frame;
use crate::profile::{Brand, PrinterAddress, PrinterProfile, TransportKind};
use crate::receipt::Receipt;
use crate::transport::{
    CupsSpooler, CutOutcome, CutSupport, NativeTransport, SerialTransport, TcpTransport,
    Transport, UsbTransport, cut_with_fallback,
};

/// Path a job took to the printer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryRoute {
    Native,
    Cups,
    CupsChunked,
    RawSocket,
}

impl fmt::Display for DeliveryRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryRoute::Native => "native",
            DeliveryRoute::Cups => "cups",
            DeliveryRoute::CupsChunked => "cups-chunked",
            DeliveryRoute::RawSocket => "raw-socket",
        };
        f.write_str(s)
    }
}

/// Result of a successful print
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintReport {
    pub route: DeliveryRoute,
    pub bytes: usize,
    pub chunks_total: usize,
    pub chunks_failed: usize,
    pub cut: CutOutcome,
    pub encoding_fallbacks: usize,
}

impl PrintReport {
    /// `PartialChunkFailure` when a chunked job lost some chunks
    pub fn partial_failure(&self) -> Option<PrintError> {
        (self.chunks_failed > 0).then_some(PrintError::PartialChunkFailure {
            failed: self.chunks_failed,
            total: self.chunks_total,
        })
    }

    /// `EncodingFallback` when characters were printed as `?`
    pub fn encoding_warning(&self) -> Option<PrintError> {
        (self.encoding_fallbacks > 0).then_some(PrintError::EncodingFallback {
            count: self.encoding_fallbacks,
        })
    }
}

/// Live printer session
pub struct BrandDriver {
    descriptor: DriverDescriptor,
    profile: PrinterProfile,
    options: TransportOptions,
    spooler: CupsSpooler,
    native: Option<NativeTransport>,
    connected: bool,
}

impl BrandDriver {
    pub fn new(
        descriptor: DriverDescriptor,
        mut profile: PrinterProfile,
        options: TransportOptions,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        profile.brand = descriptor.brand();
        let spooler = CupsSpooler::new(runner)
            .with_timeouts(options.spool_timeout, options.query_timeout);
        Self {
            descriptor,
            profile,
            options,
            spooler,
            native: None,
            connected: false,
        }
    }

    pub fn descriptor(&self) -> DriverDescriptor {
        self.descriptor
    }

    pub fn brand(&self) -> Brand {
        self.descriptor.brand()
    }

    pub fn brand_name(&self) -> &'static str {
        self.descriptor.brand_name()
    }

    pub fn priority(&self) -> u8 {
        self.descriptor.priority()
    }

    pub fn detect(&self, name: &str, address: &str) -> bool {
        self.descriptor.detect(name, address)
    }

    pub fn profile(&self) -> &PrinterProfile {
        &self.profile
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether a native handle is currently open
    pub fn has_native_handle(&self) -> bool {
        self.native.is_some()
    }

    fn cut_support(&self) -> CutSupport {
        CutSupport {
            full: self.options.full_cut,
            partial: self.options.partial_cut,
        }
    }

    /// Reach the printer: native transport first, then the CUPS queue
    #[instrument(skip(self), fields(brand = %self.brand()))]
    pub async fn connect(&mut self) -> PrintResult<()> {
        self.disconnect().await?;
        let mut attempts = Vec::new();

        if let Some(address) = self.profile.address.clone() {
            match self.open_native(&address).await {
                Ok(native) => {
                    info!(transport = %native.describe(), "Connected natively");
                    self.native = Some(native);
                    self.connected = true;
                    return Ok(());
                }
                Err(e) => {
                    warn!(%address, error = %e, "Native connection failed");
                    attempts.push(format!("{}: {}", address, e));
                }
            }
        }

        if let Some(queue) = self.profile.cups_queue.clone() {
            if self.spooler.queue_exists(&queue).await {
                info!(%queue, "Connected through CUPS");
                self.connected = true;
                return Ok(());
            }
            attempts.push(format!("cups queue {}: not found", queue));
        }

        if attempts.is_empty() {
            attempts.push("no address or CUPS queue configured".to_string());
        }
        Err(PrintError::ConnectionUnavailable(attempts.join("; ")))
    }

    async fn open_native(&self, address: &PrinterAddress) -> PrintResult<NativeTransport> {
        let cuts = self.cut_support();
        match address {
            PrinterAddress::Lan { ip, port } => {
                let t = TcpTransport::connect(SocketAddr::from((*ip, *port)), self.options.connect_timeout)
                    .await?
                    .with_write_timeout(self.options.write_timeout)
                    .with_cut_support(cuts);
                Ok(NativeTransport::Tcp(t))
            }
            PrinterAddress::Serial { path } => {
                let t = SerialTransport::open(path, self.options.write_timeout)
                    .await?
                    .with_cut_support(cuts);
                Ok(NativeTransport::Serial(t))
            }
            PrinterAddress::Usb {
                vendor_id,
                product_id,
            } => {
                let t = UsbTransport::open(*vendor_id, *product_id, self.options.write_timeout)
                    .await?
                    .with_cut_support(cuts);
                Ok(NativeTransport::Usb(t))
            }
            PrinterAddress::Bluetooth { .. } => Err(PrintError::ConnectionUnavailable(
                "Bluetooth printers are reached through a CUPS queue or RFCOMM device".to_string(),
            )),
        }
    }

    /// Print plain text
    #[instrument(skip(self, text), fields(brand = %self.brand(), text_len = text.len()))]
    pub async fn print_text(&mut self, text: &str) -> PrintResult<PrintReport> {
        if !self.connected {
            return Err(PrintError::NotConnected);
        }

        let frame = Frame::with_code_page(text, self.descriptor.code_page(), self.profile.paper_width);
        let mut errors: Vec<PrintError> = Vec::new();

        if let Some(native) = self.native.as_mut() {
            match print_native(native, &frame).await {
                Ok(report) => return Ok(report),
                Err(e) => {
                    warn!(transport = %native.describe(), error = %e, "Native print failed, falling back");
                    let _ = native.close().await;
                    self.native = None;
                    errors.push(e);
                }
            }
        }

        if let Some(queue) = self.profile.cups_queue.clone() {
            match self.print_cups(&queue, &frame).await {
                Ok(report) => return Ok(report),
                Err(e) => {
                    warn!(%queue, error = %e, "CUPS print failed");
                    errors.push(e);
                }
            }
        }

        if self.descriptor.raw_socket_fallback()
            && let Some(PrinterAddress::Lan { ip, port }) = &self.profile.address
        {
            let addr = SocketAddr::from((*ip, *port));
            let bytes = frame.to_bytes();
            match TcpTransport::send_once(addr, &bytes, self.options.connect_timeout).await {
                Ok(()) => {
                    return Ok(PrintReport {
                        route: DeliveryRoute::RawSocket,
                        bytes: bytes.len(),
                        chunks_total: 1,
                        chunks_failed: 0,
                        cut: CutOutcome::Spooled,
                        encoding_fallbacks: frame.encoding_fallbacks(),
                    });
                }
                Err(e) => {
                    warn!(%addr, error = %e, "Raw socket print failed");
                    errors.push(e);
                }
            }
        }

        Err(exhausted(errors))
    }

    async fn print_cups(&self, queue: &str, frame: &Frame) -> PrintResult<PrintReport> {
        if self.profile.effective_transport() == TransportKind::Usb {
            let chunks = frame.chunks(self.options.chunk_lines);
            let bytes = chunks.iter().map(Vec::len).sum();
            let report = self
                .spooler
                .submit_chunked(queue, &chunks, self.options.chunk_delay)
                .await?;
            if let Some(partial) = report.partial_failure() {
                warn!(error = %partial, "Chunked print incomplete");
            }
            Ok(PrintReport {
                route: DeliveryRoute::CupsChunked,
                bytes,
                chunks_total: report.total,
                chunks_failed: report.failed,
                cut: CutOutcome::Spooled,
                encoding_fallbacks: frame.encoding_fallbacks(),
            })
        } else {
            let bytes = frame.to_bytes();
            self.spooler.submit(queue, &bytes).await?;
            Ok(PrintReport {
                route: DeliveryRoute::Cups,
                bytes: bytes.len(),
                chunks_total: 1,
                chunks_failed: 0,
                cut: CutOutcome::Spooled,
                encoding_fallbacks: frame.encoding_fallbacks(),
            })
        }
    }

    /// Render a structured receipt and print it
    pub async fn print_receipt(&mut self, receipt: &Receipt) -> PrintResult<PrintReport> {
        let text = receipt.render(self.profile.paper_width);
        self.print_text(&text).await
    }

    /// Release the connection; safe to call repeatedly
    pub async fn disconnect(&mut self) -> PrintResult<()> {
        if let Some(mut native) = self.native.take() {
            if let Err(e) = native.close().await {
                warn!(error = %e, "Error closing printer handle");
            }
            info!(transport = %native.describe(), "Disconnected");
        }
        self.connected = false;
        Ok(())
    }
}

async fn print_native(native: &mut NativeTransport, frame: &Frame) -> PrintResult<PrintReport> {
    let payload = frame.payload();
    native.write(&payload).await?;
    let cut = cut_with_fallback(native).await?;
    info!(transport = %native.describe(), bytes = payload.len(), ?cut, "Printed");
    Ok(PrintReport {
        route: DeliveryRoute::Native,
        bytes: payload.len(),
        chunks_total: 1,
        chunks_failed: 0,
        cut,
        encoding_fallbacks: frame.encoding_fallbacks(),
    })
}

/// Collapse the errors of every attempted route
fn exhausted(mut errors: Vec<PrintError>) -> PrintError {
    match errors.len() {
        0 => PrintError::ConnectionUnavailable("no delivery route available".to_string()),
        1 => errors.remove(0),
        _ => PrintError::ConnectionUnavailable(
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;
    use crate::command::CommandOutput;
    use crate::command::testing::FakeRunner;
    use crate::driver::select_driver;
    use crate::profile::PaperWidth;

    fn profile(address: Option<&str>, queue: Option<&str>, transport: TransportKind) -> PrinterProfile {
        PrinterProfile {
            brand: Brand::Generic,
            paper_width: PaperWidth::Mm80,
            transport,
            address: address.map(|a| PrinterAddress::parse(a).unwrap()),
            device_name: String::new(),
            cups_queue: queue.map(str::to_string),
        }
    }

    fn options() -> TransportOptions {
        TransportOptions {
            connect_timeout: std::time::Duration::from_millis(500),
            chunk_delay: std::time::Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_print_before_connect() {
        let mut driver = BrandDriver::new(
            select_driver("", ""),
            profile(None, None, TransportKind::Auto),
            options(),
            Arc::new(FakeRunner::succeeding()),
        );
        assert!(matches!(driver.print_text("x").await, Err(PrintError::NotConnected)));
    }

    #[tokio::test]
    async fn test_native_lan_print() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            sock.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let mut driver = BrandDriver::new(
            select_driver("EPSON TM-T88", ""),
            profile(Some(&addr.to_string()), None, TransportKind::Lan),
            options(),
            Arc::new(FakeRunner::succeeding()),
        );
        driver.connect().await.unwrap();
        let report = driver.print_text("Hello").await.unwrap();
        driver.disconnect().await.unwrap();

        assert_eq!(report.route, DeliveryRoute::Native);
        assert_eq!(report.cut, CutOutcome::Full);
        let received = server.await.unwrap();
        let expected = Frame::build("Hello", Brand::Epson, PaperWidth::Mm80).to_bytes();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_cups_fallback_when_native_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let runner = Arc::new(FakeRunner::succeeding());
        let mut driver = BrandDriver::new(
            select_driver("Star mC-Print3", ""),
            profile(Some(&addr.to_string()), Some("Star_Q"), TransportKind::Lan),
            options(),
            runner.clone(),
        );
        driver.connect().await.unwrap();
        assert!(!driver.has_native_handle());

        let report = driver.print_text("Hello").await.unwrap();
        assert_eq!(report.route, DeliveryRoute::Cups);
        let calls = runner.calls();
        assert_eq!(calls[0], "lpstat -p Star_Q");
        assert!(calls[1].starts_with("lp -d Star_Q -o raw"));
    }

    #[tokio::test]
    async fn test_generic_falls_back_to_raw_socket() {
        // Nothing listens at connect time, so the session comes up on CUPS
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = closed.local_addr().unwrap();
        drop(closed);

        let runner = Arc::new(FakeRunner::new(|program, _| {
            if program == "lp" {
                Ok(CommandOutput::failed("lp: printer stopped"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }));
        let mut driver = BrandDriver::new(
            select_driver("Unknown Device", ""),
            profile(Some(&addr.to_string()), Some("Raw_Q"), TransportKind::Lan),
            options(),
            runner.clone(),
        );
        driver.connect().await.unwrap();
        assert!(!driver.has_native_handle());

        // The printer comes back on the same port before the job is sent
        let listener = TcpListener::bind(addr).await.unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            sock.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let report = driver.print_text("Hello").await.unwrap();
        assert_eq!(report.route, DeliveryRoute::RawSocket);
        assert!(runner.calls().iter().any(|c| c.starts_with("lp -d Raw_Q")));
        assert_eq!(
            server.await.unwrap(),
            crate::escpos::build_frame("Hello", Brand::Generic, PaperWidth::Mm80)
        );
    }

    #[tokio::test]
    async fn test_brand_driver_skips_raw_socket() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = closed.local_addr().unwrap();
        drop(closed);

        let runner = Arc::new(FakeRunner::new(|program, _| {
            if program == "lp" {
                Ok(CommandOutput::failed("lp: printer stopped"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }));
        let mut driver = BrandDriver::new(
            select_driver("Epson TM-T20", ""),
            profile(Some(&addr.to_string()), Some("Epson_Q"), TransportKind::Lan),
            options(),
            runner,
        );
        driver.connect().await.unwrap();
        assert!(matches!(
            driver.print_text("Hello").await,
            Err(PrintError::SpoolFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_usb_chunks_through_cups() {
        let runner = Arc::new(FakeRunner::succeeding());
        let mut driver = BrandDriver::new(
            select_driver("HPRT TP808", ""),
            profile(None, Some("HPRT_TP808"), TransportKind::Usb),
            options(),
            runner.clone(),
        );
        driver.connect().await.unwrap();

        let text = (1..=13).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let report = driver.print_text(&text).await.unwrap();
        assert_eq!(report.route, DeliveryRoute::CupsChunked);
        assert_eq!(report.chunks_total, 3);
        assert!(report.partial_failure().is_none());
        let lp_calls = runner.calls().iter().filter(|c| c.starts_with("lp ")).count();
        assert_eq!(lp_calls, 3);
    }

    #[tokio::test]
    async fn test_usb_chunk_failure_is_partial() {
        let n = AtomicUsize::new(0);
        let runner = Arc::new(FakeRunner::new(move |program, _| {
            if program == "lp" && n.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(CommandOutput::failed("buffer full"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }));
        let mut driver = BrandDriver::new(
            select_driver("", ""),
            profile(None, Some("Q"), TransportKind::Usb),
            options(),
            runner,
        );
        driver.connect().await.unwrap();

        let report = driver.print_text(&"x\n".repeat(12)).await.unwrap();
        assert_eq!(report.chunks_failed, 1);
        assert!(matches!(
            report.partial_failure(),
            Some(PrintError::PartialChunkFailure { failed: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_unencodable_text_is_reported() {
        let mut driver = BrandDriver::new(
            select_driver("Star TSP100", ""),
            profile(None, Some("Q"), TransportKind::Bluetooth),
            options(),
            Arc::new(FakeRunner::succeeding()),
        );
        driver.connect().await.unwrap();

        let clean = driver.print_text("Caf\u{e9} 2,50\u{20ac}").await.unwrap();
        assert!(clean.encoding_warning().is_none());

        let report = driver.print_text("Total \u{4e2d}").await.unwrap();
        assert_eq!(report.route, DeliveryRoute::Cups);
        assert!(matches!(
            report.encoding_warning(),
            Some(PrintError::EncodingFallback { count: 1 })
        ));
    }

    #[tokio::test]
    async fn test_connect_fails_without_routes() {
        let runner = Arc::new(FakeRunner::new(|_, _| Ok(CommandOutput::failed("no such queue"))));
        let mut driver = BrandDriver::new(
            select_driver("", ""),
            profile(Some("00:11:22:33:44:55"), Some("Missing"), TransportKind::Bluetooth),
            options(),
            runner,
        );
        match driver.connect().await {
            Err(PrintError::ConnectionUnavailable(detail)) => {
                assert!(detail.contains("00:11:22:33:44:55"));
                assert!(detail.contains("Missing"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert!(!driver.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_twice() {
        let mut driver = BrandDriver::new(
            select_driver("", ""),
            profile(None, Some("Q"), TransportKind::Auto),
            options(),
            Arc::new(FakeRunner::succeeding()),
        );
        driver.connect().await.unwrap();
        assert!(driver.disconnect().await.is_ok());
        assert!(driver.disconnect().await.is_ok());
        assert!(!driver.is_connected());
    }
}
