//! CUPS queue registration for Bluetooth printers
//!
//! Bluetooth receipt printers are usually reached through a CUPS queue.
//! [`CupsRegistrar`] creates that queue on demand with `lpadmin`, choosing
//! a driver from `lpinfo -m` and a device URI from `lpinfo -v` or the
//! serial ports the OS created for the pairing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::command::{CommandOutput, CommandRunner, args};
use crate::config::TransportOptions;
use crate::error::{PrintError, PrintResult};

/// Pass-through driver for ESC/POS printers
pub const RAW_DRIVER: &str = "raw";

/// Last-resort driver shipped with CUPS
pub const SAMPLE_GENERIC_DRIVER: &str = "drv:///sample.drv/generic.ppd";

/// Device names that identify a receipt printer; these always get the raw driver
const THERMAL_KEYWORDS: &[&str] = &[
    "star", "tsp", "mcp", "mcprint", "mc-print", "sm-l", "sm-s", "sm-t", "tm-t", "tm-m", "tm-p",
    "citizen", "ct-s", "hprt", "rongta", "xprinter", "thermal", "receipt", "pos",
];

/// Device name keyword → terms to look for in `lpinfo -m` output
const DRIVER_KEYWORDS: &[(&str, &[&str])] = &[
    ("star", &["star", "starmicronics"]),
    ("tsp", &["star", "tsp"]),
    ("mcprint", &["star", "mcprint"]),
    ("mcp", &["star", "mcprint"]),
    ("sm-l", &["star"]),
    ("sm-s", &["star"]),
    ("sm-t", &["star"]),
    ("epson", &["epson", "escpos"]),
    ("tm-t", &["epson", "tm"]),
    ("tm-m", &["epson", "tm"]),
    ("tm-p", &["epson", "tm"]),
    ("et-", &["epson"]),
    ("wf-", &["epson"]),
    ("xp-", &["epson"]),
    ("citizen", &["citizen"]),
    ("ct-s", &["citizen"]),
    ("hprt", &["escpos", "generic"]),
    ("rongta", &["escpos", "generic"]),
    ("xprinter", &["escpos", "generic"]),
];

/// Make a device name usable as a CUPS queue name
///
/// Spaces, `/` and `#` are not allowed and become `_`.
pub fn sanitize_queue_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '#' | '\t' => '_',
            c => c,
        })
        .collect()
}

/// Driver name from an `lpinfo -m` line (`<name> <description>`)
fn first_token(line: &str) -> Option<String> {
    line.split_whitespace().next().map(str::to_string)
}

/// `lpadmin` failed for lack of privileges
fn is_permission_error(out: &CommandOutput) -> bool {
    let stderr = out.stderr.to_lowercase();
    stderr.contains("forbidden") || stderr.contains("permission") || stderr.contains("not authorized")
}

/// Manages CUPS queues through `lpstat`, `lpinfo` and `lpadmin`
#[derive(Clone)]
pub struct CupsRegistrar {
    runner: Arc<dyn CommandRunner>,
    query_timeout: Duration,
    admin_timeout: Duration,
    elevated_admin_timeout: Duration,
    device_root: PathBuf,
}

impl CupsRegistrar {
    pub fn new(runner: Arc<dyn CommandRunner>, options: &TransportOptions) -> Self {
        Self {
            runner,
            query_timeout: options.query_timeout,
            admin_timeout: options.admin_timeout,
            elevated_admin_timeout: options.elevated_admin_timeout,
            device_root: PathBuf::from("/dev"),
        }
    }

    /// Directory searched for Bluetooth serial ports (default `/dev`)
    pub fn with_device_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.device_root = root.into();
        self
    }

    async fn query(&self, program: &str, argv: &[&str]) -> Option<CommandOutput> {
        match self.runner.run(program, &args(argv), self.query_timeout).await {
            Ok(out) => Some(out),
            Err(e) => {
                debug!(program, error = %e, "CUPS query failed");
                None
            }
        }
    }

    /// Whether a CUPS scheduler is running
    pub async fn is_available(&self) -> bool {
        self.query("lpstat", &["-r"]).await.is_some_and(|o| o.success)
    }

    pub async fn is_registered(&self, queue: &str) -> bool {
        self.query("lpstat", &["-p", queue])
            .await
            .is_some_and(|o| o.success)
    }

    /// Lines of `lpinfo -m`; empty when CUPS cannot be queried
    pub async fn available_drivers(&self) -> Vec<String> {
        match self.query("lpinfo", &["-m"]).await {
            Some(out) if out.success => out
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Choose a driver for the named device
    #[instrument(skip(self))]
    pub async fn find_driver_for(&self, device_name: &str) -> String {
        let name = device_name.to_lowercase();
        if THERMAL_KEYWORDS.iter().any(|k| name.contains(k)) {
            return RAW_DRIVER.to_string();
        }

        let drivers = self.available_drivers().await;
        if drivers.is_empty() {
            return SAMPLE_GENERIC_DRIVER.to_string();
        }

        for (keyword, terms) in DRIVER_KEYWORDS {
            if !name.contains(keyword) {
                continue;
            }
            let found = drivers.iter().find(|d| {
                let d = d.to_lowercase();
                terms.iter().any(|t| d.contains(t))
            });
            if let Some(driver) = found.and_then(|d| first_token(d.as_str())) {
                debug!(%driver, "Matched driver by keyword");
                return driver;
            }
        }

        let generic = drivers.iter().find(|d| {
            let d = d.to_lowercase();
            d.contains("generic") || d.contains("escpos") || d.contains("raw")
        });
        generic
            .and_then(|d| first_token(d.as_str()))
            .unwrap_or_else(|| SAMPLE_GENERIC_DRIVER.to_string())
    }

    /// Device URI for a paired Bluetooth printer
    ///
    /// `lpinfo -v` entry mentioning the MAC or name, then an OS serial port
    /// for the pairing, then `bluetooth://<MAC without colons>`.
    #[instrument(skip(self))]
    pub async fn resolve_uri(&self, device_name: &str, mac: &str) -> String {
        if let Some(out) = self.query("lpinfo", &["-v"]).await
            && out.success
        {
            let mac_l = mac.to_lowercase();
            // bluetooth:// URIs spell the MAC without separators
            let mac_bare = mac_l.replace(':', "");
            let name_l = device_name.to_lowercase();
            for line in out.stdout.lines() {
                let lower = line.to_lowercase();
                let mentions = (!mac_bare.is_empty()
                    && (lower.contains(&mac_l) || lower.contains(&mac_bare)))
                    || (!name_l.is_empty() && lower.contains(&name_l));
                if mentions && let Some(uri) = line.split_whitespace().nth(1) {
                    debug!(uri, "Found URI via lpinfo");
                    return uri.to_string();
                }
            }
        }

        if !device_name.is_empty() {
            let candidates = [
                format!("cu.{}", device_name),
                format!("cu.{}-SerialPort", device_name),
                format!("tty.{}", device_name),
                format!("tty.{}-SerialPort", device_name),
            ];
            for candidate in candidates {
                let port = self.device_root.join(candidate);
                if port.exists() {
                    debug!(port = %port.display(), "Found Bluetooth serial port");
                    return format!("serial://{}?baud=115200", port.display());
                }
            }
        }

        format!("bluetooth://{}", mac.replace(':', ""))
    }

    /// Create a raw-capable queue named after the device
    pub async fn register_bluetooth_printer(&self, device_name: &str, mac: &str) -> PrintResult<String> {
        self.register_bluetooth_queue(device_name, device_name, mac).await
    }

    /// Create a raw-capable queue for a Bluetooth printer
    ///
    /// The queue is named from `queue_name`; driver and device URI are
    /// chosen from `device_name` (falling back to the queue name when it
    /// is empty). Returns the sanitised queue name. Already-registered
    /// queues are left untouched. A permission failure is retried once
    /// through non-interactive `sudo`.
    #[instrument(skip(self))]
    pub async fn register_bluetooth_queue(
        &self,
        queue_name: &str,
        device_name: &str,
        mac: &str,
    ) -> PrintResult<String> {
        let queue = sanitize_queue_name(queue_name);
        let device_name = match device_name.trim() {
            "" => queue_name.trim(),
            name => name,
        };
        if queue.is_empty() {
            return Err(PrintError::InvalidConfig("Empty CUPS queue name".into()));
        }
        if self.is_registered(&queue).await {
            info!(%queue, "Printer already registered");
            return Ok(queue);
        }

        let driver = self.find_driver_for(device_name).await;
        let uri = self.resolve_uri(device_name, mac).await;
        info!(%queue, %uri, %driver, "Registering printer");

        let lpadmin = args(&[
            "-p",
            &queue,
            "-v",
            &uri,
            "-m",
            &driver,
            "-E",
            "-o",
            "printer-is-shared=false",
        ]);

        let out = self
            .runner
            .run("lpadmin", &lpadmin, self.admin_timeout)
            .await
            .map_err(|e| PrintError::Registration(e.to_string()))?;
        if out.success {
            info!(%queue, "Printer registered");
            return Ok(queue);
        }
        if !is_permission_error(&out) {
            return Err(PrintError::Registration(out.stderr));
        }

        warn!(%queue, "lpadmin needs elevated privileges, retrying with sudo");
        let mut elevated = vec!["-n".to_string(), "lpadmin".to_string()];
        elevated.extend(lpadmin);
        let out = self
            .runner
            .run("sudo", &elevated, self.elevated_admin_timeout)
            .await
            .map_err(|e| PrintError::Registration(e.to_string()))?;
        if out.success {
            info!(%queue, "Printer registered with sudo");
            Ok(queue)
        } else {
            Err(PrintError::Registration(out.stderr))
        }
    }

    /// Remove a queue
    #[instrument(skip(self))]
    pub async fn unregister(&self, queue: &str) -> PrintResult<()> {
        let out = self
            .runner
            .run("lpadmin", &args(&["-x", queue]), self.query_timeout)
            .await
            .map_err(|e| PrintError::Registration(e.to_string()))?;
        if out.success {
            info!(%queue, "Printer removed");
            Ok(())
        } else {
            Err(PrintError::Registration(out.stderr))
        }
    }
}
