//! Printer manager
//!
//! Owns at most one [`BrandDriver`] session. Connecting detects the brand,
//! registers Bluetooth printers with CUPS when needed and replaces the
//! previous session. Print requests on one manager run one at a time.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::command::{CommandRunner, SystemRunner};
use crate::config::{PrinterSettings, TransportOptions};
use crate::cups::CupsRegistrar;
use crate::driver::{BrandDescriptor, BrandDriver, PrintReport, identify_lan_brand, select_driver};
use crate::error::{PrintError, PrintResult};
use crate::profile::{Brand, PaperWidth, PrinterAddress, PrinterProfile, TransportKind};
use crate::receipt::Receipt;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Connected,
    Disconnected,
}

/// Caller input for [`PrinterManager::connect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub transport: TransportKind,
    /// IP, MAC, vid:pid or device path; may be empty when only a CUPS queue is used
    pub address: String,
    pub paper_width: PaperWidth,
    /// Name used for brand detection
    pub device_name: String,
    pub cups_queue: Option<String>,
    /// Query LAN printers for their maker when no device name is given
    pub identify_brand: bool,
}

impl Default for ConnectRequest {
    fn default() -> Self {
        Self {
            transport: TransportKind::Auto,
            address: String::new(),
            paper_width: PaperWidth::default(),
            device_name: String::new(),
            cups_queue: None,
            identify_brand: true,
        }
    }
}

impl ConnectRequest {
    pub fn new(transport: TransportKind, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn from_settings(settings: &PrinterSettings) -> Self {
        Self {
            transport: settings.transport,
            address: settings.address.clone(),
            paper_width: settings.paper_width,
            device_name: settings.device_name.clone(),
            cups_queue: settings.cups_queue.clone(),
            identify_brand: true,
        }
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn with_paper_width(mut self, width: PaperWidth) -> Self {
        self.paper_width = width;
        self
    }

    pub fn with_cups_queue(mut self, queue: impl Into<String>) -> Self {
        self.cups_queue = Some(queue.into());
        self
    }

    pub fn with_identify_brand(mut self, identify: bool) -> Self {
        self.identify_brand = identify;
        self
    }
}

#[derive(Debug)]
struct Status {
    state: ConnectionState,
    profile: Option<PrinterProfile>,
}

/// Entry point for connecting and printing
pub struct PrinterManager {
    runner: Arc<dyn CommandRunner>,
    options: TransportOptions,
    session: Mutex<Option<BrandDriver>>,
    status: StdMutex<Status>,
}

impl PrinterManager {
    /// Manager running real `lp`/`lpadmin` processes
    pub fn new(options: TransportOptions) -> Self {
        Self::with_runner(Arc::new(SystemRunner), options)
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>, options: TransportOptions) -> Self {
        Self {
            runner,
            options,
            session: Mutex::new(None),
            status: StdMutex::new(Status {
                state: ConnectionState::Unconnected,
                profile: None,
            }),
        }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    fn set_status(&self, state: ConnectionState, profile: Option<PrinterProfile>) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status.state = state;
        status.profile = profile;
    }

    pub fn state(&self) -> ConnectionState {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Brand name of the active session, `"None"` without one
    pub fn current_brand(&self) -> String {
        let status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        match (&status.state, &status.profile) {
            (ConnectionState::Connected, Some(profile)) => profile.brand.name().to_string(),
            _ => "None".to_string(),
        }
    }

    /// Profile of the active session
    pub fn current_config(&self) -> Option<PrinterProfile> {
        let status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        match status.state {
            ConnectionState::Connected => status.profile.clone(),
            _ => None,
        }
    }

    /// Replace the current session with one for `request`
    ///
    /// The previous session is disconnected first. On failure the manager
    /// is left without a session.
    #[instrument(skip(self), fields(transport = %request.transport, address = %request.address))]
    pub async fn connect(&self, request: ConnectRequest) -> PrintResult<Brand> {
        let mut session = self.session.lock().await;
        self.set_status(ConnectionState::Connecting, None);

        if let Some(mut old) = session.take() {
            old.disconnect().await?;
        }

        match self.open_session(request).await {
            Ok(driver) => {
                let brand = driver.brand();
                info!(%brand, "Printer connected");
                self.set_status(ConnectionState::Connected, Some(driver.profile().clone()));
                *session = Some(driver);
                Ok(brand)
            }
            Err(e) => {
                warn!(error = %e, "Printer connection failed");
                self.set_status(ConnectionState::Unconnected, None);
                Err(e)
            }
        }
    }

    async fn open_session(&self, request: ConnectRequest) -> PrintResult<BrandDriver> {
        let address = match request.address.trim() {
            "" => None,
            s => Some(PrinterAddress::parse(s)?),
        };

        let mut device_name = request.device_name.trim().to_string();
        if request.identify_brand
            && device_name.is_empty()
            && let Some(PrinterAddress::Lan { ip, port }) = &address
            && let Some(maker) =
                identify_lan_brand(SocketAddr::from((*ip, *port)), self.options.identify_timeout).await
        {
            device_name = maker;
        }

        let descriptor = select_driver(&device_name, &request.address);
        let mut profile = PrinterProfile {
            brand: descriptor.brand(),
            paper_width: request.paper_width,
            transport: request.transport,
            address,
            device_name,
            cups_queue: request.cups_queue.filter(|q| !q.trim().is_empty()),
        };

        if profile.effective_transport() == TransportKind::Bluetooth {
            self.register_bluetooth(&mut profile).await;
        }

        let mut driver = BrandDriver::new(descriptor, profile, self.options.clone(), self.runner.clone());
        driver.connect().await?;
        Ok(driver)
    }

    /// Make sure a CUPS queue exists for a Bluetooth printer
    ///
    /// Failures are logged; connecting may still succeed through a queue
    /// created earlier by hand.
    async fn register_bluetooth(&self, profile: &mut PrinterProfile) {
        let Some(PrinterAddress::Bluetooth { mac }) = &profile.address else {
            return;
        };
        let queue = profile
            .cups_queue
            .clone()
            .unwrap_or_else(|| profile.device_name.clone());
        if queue.is_empty() {
            warn!("Bluetooth printer has no queue or device name, skipping CUPS registration");
            return;
        }

        let registrar = CupsRegistrar::new(self.runner.clone(), &self.options);
        match registrar
            .register_bluetooth_queue(&queue, &profile.device_name, mac)
            .await
        {
            Ok(registered) => profile.cups_queue = Some(registered),
            Err(e) => warn!(%queue, error = %e, "CUPS registration failed"),
        }
    }

    /// Print plain text on the active session
    pub async fn print_text(&self, text: &str) -> PrintResult<PrintReport> {
        if self.state() != ConnectionState::Connected {
            return Err(PrintError::NotConnected);
        }
        let mut session = self.session.lock().await;
        let driver = session.as_mut().ok_or(PrintError::NotConnected)?;
        driver.print_text(text).await
    }

    pub async fn print_receipt(&self, receipt: &Receipt) -> PrintResult<PrintReport> {
        if self.state() != ConnectionState::Connected {
            return Err(PrintError::NotConnected);
        }
        let mut session = self.session.lock().await;
        let driver = session.as_mut().ok_or(PrintError::NotConnected)?;
        driver.print_receipt(receipt).await
    }

    /// Drop the active session; succeeds when there is none
    pub async fn disconnect(&self) -> PrintResult<()> {
        let mut session = self.session.lock().await;
        if let Some(mut driver) = session.take() {
            driver.disconnect().await?;
            self.set_status(ConnectionState::Disconnected, None);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;
    use crate::command::CommandOutput;
    use crate::command::testing::FakeRunner;

    fn manager(runner: Arc<FakeRunner>) -> PrinterManager {
        PrinterManager::with_runner(
            runner,
            TransportOptions {
                connect_timeout: Duration::from_millis(300),
                identify_timeout: Duration::from_millis(200),
                chunk_delay: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_initial_state() {
        let m = manager(Arc::new(FakeRunner::succeeding()));
        assert_eq!(m.state(), ConnectionState::Unconnected);
        assert_eq!(m.current_brand(), "None");
        assert!(m.current_config().is_none());
        assert!(matches!(m.print_text("x").await, Err(PrintError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_print_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            sock.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let m = manager(Arc::new(FakeRunner::succeeding()));
        let request = ConnectRequest::new(TransportKind::Lan, addr.to_string())
            .with_device_name("Citizen CT-S310II")
            .with_paper_width(PaperWidth::Mm58);
        assert_eq!(m.connect(request).await.unwrap(), Brand::Citizen);
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(m.current_brand(), "Citizen");
        assert_eq!(m.current_config().unwrap().paper_width, PaperWidth::Mm58);

        m.print_text("Thanks!").await.unwrap();
        m.disconnect().await.unwrap();
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.current_brand(), "None");

        let bytes = server.await.unwrap();
        assert!(bytes.windows(7).any(|w| w == b"Thanks!"));
        assert!(bytes.ends_with(&[0x1D, 0x56, 0x00]));
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_no_session() {
        let runner = Arc::new(FakeRunner::new(|_, _| Ok(CommandOutput::failed(""))));
        let m = manager(runner);
        let request = ConnectRequest::new(TransportKind::Usb, "").with_cups_queue("Nope");
        assert!(matches!(
            m.connect(request).await,
            Err(PrintError::ConnectionUnavailable(_))
        ));
        assert_eq!(m.state(), ConnectionState::Unconnected);
        assert!(matches!(m.print_text("x").await, Err(PrintError::NotConnected)));
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let m = manager(Arc::new(FakeRunner::succeeding()));
        let result = m.connect(ConnectRequest::new(TransportKind::Lan, "kitchen")).await;
        assert!(matches!(result, Err(PrintError::InvalidConfig(_))));
        assert_eq!(m.state(), ConnectionState::Unconnected);
    }

    #[tokio::test]
    async fn test_bluetooth_registers_queue() {
        let runner = Arc::new(FakeRunner::new(|program, args| {
            // Queue missing until lpadmin has run
            if program == "lpstat" && args.first().is_some_and(|a| a == "-p") {
                Ok(CommandOutput::failed("lpstat: Invalid destination name"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }));
        let m = manager(runner.clone());
        let request = ConnectRequest::new(TransportKind::Bluetooth, "00:11:62:AA:BB:CC")
            .with_device_name("mC-Print3");
        // The queue never shows up in lpstat, so the connection still fails
        assert!(m.connect(request).await.is_err());
        assert!(
            runner
                .calls()
                .iter()
                .any(|c| c.starts_with("lpadmin -p mC-Print3 -v bluetooth://001162AABBCC -m raw"))
        );
    }

    #[tokio::test]
    async fn test_bluetooth_queue_keeps_device_driver() {
        let runner = Arc::new(FakeRunner::new(|program, args| {
            match (program, args.first().map(String::as_str)) {
                ("lpstat", Some("-p")) => Ok(CommandOutput::failed("lpstat: Invalid destination name")),
                ("lpinfo", Some("-m")) => Ok(CommandOutput::ok(
                    "drv:///sample.drv/generic.ppd Generic PostScript Printer\n",
                )),
                _ => Ok(CommandOutput::ok("")),
            }
        }));
        let m = manager(runner.clone());
        let request = ConnectRequest::new(TransportKind::Bluetooth, "00:11:62:AA:BB:CC")
            .with_device_name("Star mC-Print3")
            .with_cups_queue("Bar");
        assert!(m.connect(request).await.is_err());
        assert!(
            runner
                .calls()
                .iter()
                .any(|c| c.starts_with("lpadmin -p Bar -v bluetooth://001162AABBCC -m raw"))
        );
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session() {
        let m = manager(Arc::new(FakeRunner::succeeding()));
        let first = ConnectRequest::new(TransportKind::Usb, "")
            .with_cups_queue("A")
            .with_device_name("Star TSP100");
        assert_eq!(m.connect(first).await.unwrap(), Brand::Star);

        let second = ConnectRequest::new(TransportKind::Usb, "").with_cups_queue("B");
        assert_eq!(m.connect(second).await.unwrap(), Brand::Generic);
        assert_eq!(m.current_config().unwrap().cups_queue.as_deref(), Some("B"));
    }
}
