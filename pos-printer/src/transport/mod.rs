//! Transports for sending ESC/POS data
//!
//! Supports:
//! - Network printers (TCP port 9100)
//! - Serial and file devices (`/dev/rfcomm0`, `/dev/usb/lp0`, `COM3`)
//! - USB bulk endpoints (feature `usb`)
//! - CUPS queues through `lp`

mod serial;
mod spool;
mod tcp;
mod usb;

pub use serial::SerialTransport;
pub use spool::{ChunkReport, CupsSpooler};
pub use tcp::TcpTransport;
pub use usb::UsbTransport;

use crate::error::{PrintError, PrintResult};
use crate::escpos::CutMode;

/// Cut commands the attached printer accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutSupport {
    pub full: bool,
    pub partial: bool,
}

impl Default for CutSupport {
    fn default() -> Self {
        Self {
            full: true,
            partial: true,
        }
    }
}

impl CutSupport {
    pub fn allows(&self, mode: CutMode) -> bool {
        match mode {
            CutMode::Full => self.full,
            CutMode::Partial => self.partial,
        }
    }
}

/// Trait for live printer connections
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send raw ESC/POS data to the printer
    async fn write(&mut self, data: &[u8]) -> PrintResult<()>;

    /// Cut commands this printer accepts
    fn cut_support(&self) -> CutSupport {
        CutSupport::default()
    }

    /// Send a cut command
    async fn cut(&mut self, mode: CutMode) -> PrintResult<()> {
        if !self.cut_support().allows(mode) {
            return Err(PrintError::UnsupportedCapability(format!(
                "{:?} cut not supported",
                mode
            )));
        }
        self.write(&mode.command()).await
    }

    /// Release the underlying handle
    async fn close(&mut self) -> PrintResult<()> {
        Ok(())
    }

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Native (non-spooler) connection held by a session
pub enum NativeTransport {
    Tcp(TcpTransport),
    Serial(SerialTransport),
    Usb(UsbTransport),
}

impl Transport for NativeTransport {
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        match self {
            NativeTransport::Tcp(t) => t.write(data).await,
            NativeTransport::Serial(t) => t.write(data).await,
            NativeTransport::Usb(t) => t.write(data).await,
        }
    }

    fn cut_support(&self) -> CutSupport {
        match self {
            NativeTransport::Tcp(t) => t.cut_support(),
            NativeTransport::Serial(t) => t.cut_support(),
            NativeTransport::Usb(t) => t.cut_support(),
        }
    }

    async fn close(&mut self) -> PrintResult<()> {
        match self {
            NativeTransport::Tcp(t) => t.close().await,
            NativeTransport::Serial(t) => t.close().await,
            NativeTransport::Usb(t) => t.close().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            NativeTransport::Tcp(t) => t.describe(),
            NativeTransport::Serial(t) => t.describe(),
            NativeTransport::Usb(t) => t.describe(),
        }
    }
}

/// How a cut request was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutOutcome {
    Full,
    Partial,
    /// Neither cut mode is supported; paper left uncut
    Skipped,
    /// The cut is embedded in the spooled job
    Spooled,
}

/// Cut the paper, falling back from full to partial cut
///
/// An unsupported cut is not a print failure; other errors are.
pub async fn cut_with_fallback<T: Transport>(transport: &mut T) -> PrintResult<CutOutcome> {
    match transport.cut(CutMode::Full).await {
        Ok(()) => return Ok(CutOutcome::Full),
        Err(PrintError::UnsupportedCapability(reason)) => {
            tracing::warn!(reason = %reason, "Full cut unavailable, trying partial cut");
        }
        Err(e) => return Err(e),
    }

    match transport.cut(CutMode::Partial).await {
        Ok(()) => Ok(CutOutcome::Partial),
        Err(PrintError::UnsupportedCapability(_)) => {
            tracing::warn!("Paper cut not supported");
            Ok(CutOutcome::Skipped)
        }
        Err(e) => Err(e),
    }
}
