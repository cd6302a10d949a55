//! # pos-printer
//!
//! Brand-agnostic ESC/POS receipt printing.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS frame building (code pages, wrapping, feed and cut)
//! - Brand detection and per-brand drivers (Star, Epson, Citizen, generic)
//! - Transports: raw TCP port 9100, serial/file devices, USB bulk
//!   (feature `usb`) and CUPS spooling with chunked delivery for USB
//! - CUPS queue registration for Bluetooth printers
//! - LAN, USB and Bluetooth discovery
//!
//! WHAT to print (receipt layout beyond [`Receipt`]) stays in application
//! code.
//!
//! ## Example
//!
//! ```ignore
//! use pos_printer::{ConnectRequest, PrinterManager, TransportKind, TransportOptions};
//!
//! let manager = PrinterManager::new(TransportOptions::default());
//! let request = ConnectRequest::new(TransportKind::Lan, "192.168.1.50")
//!     .with_device_name("TM-T20");
//! manager.connect(request).await?;
//! manager.print_text("Order #42\nFries  3.50").await?;
//! manager.disconnect().await?;
//! ```

pub mod codepage;
pub mod command;
pub mod config;
pub mod cups;
pub mod discovery;
pub mod driver;
mod error;
pub mod escpos;
pub mod manager;
pub mod profile;
mod receipt;
pub mod transport;

// Re-exports
pub use codepage::{CodePage, code_page_for};
pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use config::{PrinterSettings, TransportOptions};
pub use cups::CupsRegistrar;
pub use discovery::DiscoveredDevice;
pub use driver::{
    BrandDescriptor, BrandDriver, DeliveryRoute, DriverDescriptor, PrintReport, select_driver,
};
pub use error::{PrintError, PrintResult};
pub use escpos::{CutMode, EscPosBuilder, Frame, build_frame, clean_text, wrap_lines};
pub use manager::{ConnectRequest, ConnectionState, PrinterManager};
pub use profile::{Brand, PaperWidth, PrinterAddress, PrinterProfile, TransportKind};
pub use receipt::{Receipt, ReceiptLine};
pub use transport::{ChunkReport, CutOutcome};
