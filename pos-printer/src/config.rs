//! Printer settings and transport tuning
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | PRINTER_TYPE | auto | lan, usb, bluetooth or auto |
//! | PRINTER_ADDRESS | (none) | IP, MAC, vid:pid or device path |
//! | PRINTER_PAPER_WIDTH | 80 | 58 or 80 |
//! | PRINTER_CUPS_NAME | (none) | CUPS queue name |
//! | PRINTER_DEVICE_NAME | (none) | Device name used for brand detection |
//! | PRINTER_CONNECT_TIMEOUT_MS | 5000 | TCP connect timeout |
//! | PRINTER_SPOOL_TIMEOUT_MS | 30000 | `lp` job timeout |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PrintError, PrintResult};
use crate::manager::ConnectRequest;
use crate::profile::{PaperWidth, TransportKind};

/// Caller-facing printer settings
///
/// Field names follow the `printer` section of the host's settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterSettings {
    #[serde(rename = "type", default)]
    pub transport: TransportKind,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub paper_width: PaperWidth,
    #[serde(rename = "cups_name", default)]
    pub cups_queue: Option<String>,
    #[serde(default)]
    pub device_name: String,
}

impl PrinterSettings {
    /// Parse settings from a JSON object
    pub fn from_json(json: &str) -> PrintResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| PrintError::InvalidConfig(format!("Invalid printer settings: {}", e)))
    }

    /// Load settings from environment variables
    pub fn from_env() -> PrintResult<Self> {
        let transport = match std::env::var("PRINTER_TYPE") {
            Ok(v) => v.parse()?,
            Err(_) => TransportKind::Auto,
        };

        Ok(Self {
            transport,
            address: std::env::var("PRINTER_ADDRESS").unwrap_or_default(),
            paper_width: std::env::var("PRINTER_PAPER_WIDTH")
                .ok()
                .and_then(|w| w.parse::<u16>().ok())
                .map(PaperWidth::from_mm)
                .unwrap_or_default(),
            cups_queue: std::env::var("PRINTER_CUPS_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            device_name: std::env::var("PRINTER_DEVICE_NAME").unwrap_or_default(),
        })
    }

    /// Connection request for these settings
    pub fn to_request(&self) -> ConnectRequest {
        ConnectRequest::from_settings(self)
    }
}

/// Timeouts and delivery tuning for transports and helper processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// TCP connect timeout for LAN printers
    pub connect_timeout: Duration,
    /// Timeout for a single write to a native handle
    pub write_timeout: Duration,
    /// Per-host timeout for LAN discovery probes
    pub probe_timeout: Duration,
    /// Timeout for the LAN brand query reply
    pub identify_timeout: Duration,
    /// Timeout for one `lp` submission
    pub spool_timeout: Duration,
    /// Timeout for `lpstat` / `lpinfo` queries
    pub query_timeout: Duration,
    /// Timeout for `lpadmin`
    pub admin_timeout: Duration,
    /// Timeout for the elevated `lpadmin` retry
    pub elevated_admin_timeout: Duration,
    /// Bluetooth discovery duration
    pub bluetooth_scan_timeout: Duration,
    /// Lines per spool job for chunked USB delivery
    pub chunk_lines: usize,
    /// Pause between chunked spool jobs
    pub chunk_delay: Duration,
    /// Printer supports GS V 0
    pub full_cut: bool,
    /// Printer supports GS V 1
    pub partial_cut: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(500),
            identify_timeout: Duration::from_secs(1),
            spool_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(5),
            admin_timeout: Duration::from_secs(30),
            elevated_admin_timeout: Duration::from_secs(60),
            bluetooth_scan_timeout: Duration::from_secs(15),
            chunk_lines: 6,
            chunk_delay: Duration::from_millis(200),
            full_cut: true,
            partial_cut: true,
        }
    }
}

impl TransportOptions {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(ms) = env_millis("PRINTER_CONNECT_TIMEOUT_MS") {
            opts.connect_timeout = ms;
        }
        if let Some(ms) = env_millis("PRINTER_SPOOL_TIMEOUT_MS") {
            opts.spool_timeout = ms;
        }
        opts
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_json() {
        let json = r#"{
            "type": "usb",
            "address": "0x20d1:0x7009",
            "paper_width": 58,
            "cups_name": "HPRT_TP808"
        }"#;
        let s = PrinterSettings::from_json(json).unwrap();
        assert_eq!(s.transport, TransportKind::Usb);
        assert_eq!(s.paper_width, PaperWidth::Mm58);
        assert_eq!(s.cups_queue.as_deref(), Some("HPRT_TP808"));
        assert_eq!(s.device_name, "");

        let request = s.to_request();
        assert_eq!(request.address, "0x20d1:0x7009");
        assert_eq!(request.cups_queue.as_deref(), Some("HPRT_TP808"));
        assert!(request.identify_brand);
    }

    #[test]
    fn test_settings_defaults() {
        let s = PrinterSettings::from_json("{}").unwrap();
        assert_eq!(s.transport, TransportKind::Auto);
        assert_eq!(s.paper_width, PaperWidth::Mm80);
        assert!(s.cups_queue.is_none());
    }

    #[test]
    fn test_settings_invalid() {
        assert!(matches!(
            PrinterSettings::from_json(r#"{"type": "fax"}"#),
            Err(PrintError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_transport_defaults() {
        let opts = TransportOptions::default();
        assert_eq!(opts.chunk_lines, 6);
        assert_eq!(opts.connect_timeout, Duration::from_secs(5));
        assert!(opts.full_cut && opts.partial_cut);
    }
}
