//! Printer discovery
//!
//! Scanners only report candidates; choosing a driver for one is left to
//! [`select_driver`](crate::driver::select_driver) with the reported name
//! and address.

mod bluetooth;
mod lan;
mod usb;

use std::fmt;

use serde::Serialize;

use crate::profile::TransportKind;

pub use bluetooth::{
    BLUETOOTH_PRINTER_KEYWORDS, filter_printers, parse_bluetoothctl_devices, scan_bluetooth,
};
pub use lan::{
    COMMON_HOSTS, DEFAULT_PROBE_CONCURRENCY, FALLBACK_SUBNET_PREFIX, candidate_hosts,
    local_subnet_prefix, probe_hosts, scan_lan,
};
pub use usb::{KNOWN_USB_PRINTERS, KnownUsbPrinter, lookup_usb, scan_usb};

/// A printer candidate found by a scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub transport: TransportKind,
    /// Address in the form accepted by `PrinterAddress::parse`
    pub address: String,
    /// Advertised or known model name; may be empty
    pub name: String,
}

impl DiscoveredDevice {
    pub fn new(transport: TransportKind, address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{} ({})", self.address, self.transport)
        } else {
            write!(f, "{} - {} ({})", self.address, self.name, self.transport)
        }
    }
}
