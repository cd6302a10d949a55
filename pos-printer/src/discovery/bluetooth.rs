//! Bluetooth scan through `bluetoothctl`

use std::time::Duration;

use tracing::{info, instrument, warn};

use super::DiscoveredDevice;
use crate::command::{CommandRunner, args};
use crate::error::{PrintError, PrintResult};
use crate::profile::TransportKind;

/// Name fragments that suggest a printer
pub const BLUETOOTH_PRINTER_KEYWORDS: [&str; 9] = [
    "print", "epson", "canon", "hp", "brother", "star", "hprt", "pos", "thermal",
];

/// Parse `bluetoothctl devices` output (`Device <MAC> <name>` lines)
pub fn parse_bluetoothctl_devices(output: &str) -> Vec<DiscoveredDevice> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Device ")?;
            let (mac, name) = rest.split_once(' ').unwrap_or((rest, ""));
            (mac.len() == 17).then(|| {
                DiscoveredDevice::new(TransportKind::Bluetooth, mac.to_uppercase(), name.trim())
            })
        })
        .collect()
}

/// Keep devices whose name looks like a printer; all of them if none does
pub fn filter_printers(devices: Vec<DiscoveredDevice>) -> Vec<DiscoveredDevice> {
    let printers: Vec<_> = devices
        .iter()
        .filter(|d| {
            let name = d.name.to_lowercase();
            BLUETOOTH_PRINTER_KEYWORDS.iter().any(|k| name.contains(k))
        })
        .cloned()
        .collect();

    if printers.is_empty() { devices } else { printers }
}

/// Discover nearby Bluetooth devices for `scan_for`, then list them
#[instrument(skip(runner))]
pub async fn scan_bluetooth(
    runner: &dyn CommandRunner,
    scan_for: Duration,
) -> PrintResult<Vec<DiscoveredDevice>> {
    let secs = scan_for.as_secs().max(1).to_string();
    // Scan exits on its own after --timeout; allow some slack before killing it
    let grace = scan_for + Duration::from_secs(5);

    match runner
        .run("bluetoothctl", &args(&["--timeout", &secs, "scan", "on"]), grace)
        .await
    {
        Ok(out) if !out.success => warn!(stderr = %out.stderr, "Bluetooth scan reported an error"),
        Ok(_) => {}
        Err(PrintError::Timeout(_)) => warn!("Bluetooth scan did not stop in time"),
        Err(e) => return Err(e),
    }

    let out = runner
        .run("bluetoothctl", &args(&["devices"]), Duration::from_secs(5))
        .await?;
    if !out.success {
        return Err(PrintError::ConnectionUnavailable(format!(
            "bluetoothctl devices failed: {}",
            out.stderr
        )));
    }

    let devices = parse_bluetoothctl_devices(&out.stdout);
    let total = devices.len();
    let printers = filter_printers(devices);
    info!(total, reported = printers.len(), "Bluetooth scan finished");
    Ok(printers)
}
