//! Printer identity types: addresses, brands, paper widths and the
//! resolved profile a session is bound to.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PrintError, PrintResult};

/// Raw ESC/POS port on LAN thermal printers
pub const RAW_PORT: u16 = 9100;

/// Printer brand family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    Star,
    Epson,
    Citizen,
    Generic,
}

impl Brand {
    /// Human-readable brand name
    pub fn name(&self) -> &'static str {
        match self {
            Brand::Star => "Star Micronics",
            Brand::Epson => "Epson",
            Brand::Citizen => "Citizen",
            Brand::Generic => "Generic ESC/POS",
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Paper roll width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u16", from = "u16")]
pub enum PaperWidth {
    Mm58,
    #[default]
    Mm80,
}

impl PaperWidth {
    /// Characters per line in the default font
    ///
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    pub fn chars(&self) -> usize {
        match self {
            PaperWidth::Mm58 => 32,
            PaperWidth::Mm80 => 48,
        }
    }

    pub fn mm(&self) -> u16 {
        match self {
            PaperWidth::Mm58 => 58,
            PaperWidth::Mm80 => 80,
        }
    }

    /// Anything other than 58 is treated as 80mm paper
    pub fn from_mm(mm: u16) -> Self {
        if mm == 58 {
            PaperWidth::Mm58
        } else {
            PaperWidth::Mm80
        }
    }
}

impl From<u16> for PaperWidth {
    fn from(mm: u16) -> Self {
        Self::from_mm(mm)
    }
}

impl From<PaperWidth> for u16 {
    fn from(width: PaperWidth) -> Self {
        width.mm()
    }
}

/// Transport hint supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Lan,
    Usb,
    Bluetooth,
    #[default]
    Auto,
}

impl FromStr for TransportKind {
    type Err = PrintError;

    fn from_str(s: &str) -> PrintResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "lan" | "network" => Ok(TransportKind::Lan),
            "usb" => Ok(TransportKind::Usb),
            "bluetooth" | "bt" => Ok(TransportKind::Bluetooth),
            "auto" | "" => Ok(TransportKind::Auto),
            other => Err(PrintError::InvalidConfig(format!(
                "Unknown transport type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::Lan => "lan",
            TransportKind::Usb => "usb",
            TransportKind::Bluetooth => "bluetooth",
            TransportKind::Auto => "auto",
        };
        f.write_str(s)
    }
}

/// Resolved printer address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterAddress {
    Lan { ip: Ipv4Addr, port: u16 },
    Usb { vendor_id: u16, product_id: u16 },
    Bluetooth { mac: String },
    Serial { path: String },
}

impl PrinterAddress {
    /// Parse a caller-supplied address string
    ///
    /// - `AA:BB:CC:DD:EE:FF` → Bluetooth
    /// - `0x20d1:0x7009` / `20d1:7009` → USB vendor/product
    /// - `192.168.1.50` / `192.168.1.50:9100` → LAN
    /// - `/dev/usb/lp0`, `COM3` → serial or file device
    pub fn parse(s: &str) -> PrintResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PrintError::InvalidConfig("Empty printer address".into()));
        }

        if is_mac(s) {
            return Ok(PrinterAddress::Bluetooth {
                mac: s.to_uppercase(),
            });
        }

        if s.matches('.').count() == 3 {
            let (host, port) = match s.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port.parse::<u16>().map_err(|_| {
                        PrintError::InvalidConfig(format!("Invalid port in address: {}", s))
                    })?;
                    (host, port)
                }
                None => (s, RAW_PORT),
            };
            let ip = host
                .parse::<Ipv4Addr>()
                .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", s)))?;
            return Ok(PrinterAddress::Lan { ip, port });
        }

        if s.starts_with('/') || is_com_port(s) {
            return Ok(PrinterAddress::Serial { path: s.to_string() });
        }

        if let Some((vid, pid)) = s.split_once(':')
            && let (Some(vendor_id), Some(product_id)) = (parse_hex_u16(vid), parse_hex_u16(pid))
        {
            return Ok(PrinterAddress::Usb {
                vendor_id,
                product_id,
            });
        }

        Err(PrintError::InvalidConfig(format!(
            "Unrecognised printer address: {}",
            s
        )))
    }

    /// Transport family this address implies
    pub fn transport(&self) -> TransportKind {
        match self {
            PrinterAddress::Lan { .. } => TransportKind::Lan,
            PrinterAddress::Usb { .. } | PrinterAddress::Serial { .. } => TransportKind::Usb,
            PrinterAddress::Bluetooth { .. } => TransportKind::Bluetooth,
        }
    }
}

impl FromStr for PrinterAddress {
    type Err = PrintError;

    fn from_str(s: &str) -> PrintResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PrinterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrinterAddress::Lan { ip, port } if *port == RAW_PORT => write!(f, "{}", ip),
            PrinterAddress::Lan { ip, port } => write!(f, "{}:{}", ip, port),
            PrinterAddress::Usb {
                vendor_id,
                product_id,
            } => write!(f, "{:#06x}:{:#06x}", vendor_id, product_id),
            PrinterAddress::Bluetooth { mac } => f.write_str(mac),
            PrinterAddress::Serial { path } => f.write_str(path),
        }
    }
}

fn is_mac(s: &str) -> bool {
    let parts: Vec<&str> = s.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

fn is_com_port(s: &str) -> bool {
    let upper = s.to_uppercase();
    upper
        .strip_prefix("COM")
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

fn parse_hex_u16(s: &str) -> Option<u16> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || digits.len() > 4 {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

/// Resolved printer configuration for one session
///
/// Created at connect time from caller input plus detection results.
/// A profile is never mutated; reconfiguration builds a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterProfile {
    pub brand: Brand,
    pub paper_width: PaperWidth,
    pub transport: TransportKind,
    pub address: Option<PrinterAddress>,
    pub device_name: String,
    pub cups_queue: Option<String>,
}

impl PrinterProfile {
    /// Effective transport: the caller's hint, or the address family for `Auto`
    pub fn effective_transport(&self) -> TransportKind {
        match (self.transport, &self.address) {
            (TransportKind::Auto, Some(addr)) => addr.transport(),
            (hint, _) => hint,
        }
    }
}
