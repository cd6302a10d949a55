//! USB printer scan
//!
//! Lists USB devices from the known-printer table or of the printer class
//! (feature `usb`), plus USB serial adapters that describe themselves as a
//! receipt printer.

use tracing::{debug, info};

use super::DiscoveredDevice;
use crate::error::PrintResult;
use crate::profile::TransportKind;

/// A USB receipt printer model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownUsbPrinter {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: &'static str,
}

const fn known(vendor_id: u16, product_id: u16, name: &'static str) -> KnownUsbPrinter {
    KnownUsbPrinter {
        vendor_id,
        product_id,
        name,
    }
}

pub const KNOWN_USB_PRINTERS: &[KnownUsbPrinter] = &[
    known(0x04b8, 0x0202, "Epson TM-T20"),
    known(0x04b8, 0x0005, "Epson TMT20II"),
    known(0x0416, 0x5011, "Winbond Thermal"),
    known(0x20d1, 0x7007, "Xprinter XP-58"),
    known(0x20d1, 0x7009, "HPRT TP808"),
    known(0x1504, 0x0006, "Sewoo LK-P21"),
    known(0x0dd4, 0x0006, "Thermal Printer"),
    known(0x0519, 0x0001, "Star TSP100"),
    known(0x0519, 0x0002, "Star TSP650"),
    known(0x0519, 0x0003, "Star TSP700"),
    known(0x0519, 0x0004, "Star TSP800"),
    known(0x0519, 0x0020, "Star mC-Print2"),
    known(0x0519, 0x0021, "Star mC-Print3"),
    known(0x0519, 0x0023, "Star mPOP"),
    known(0x0519, 0x0027, "Star SM-L200"),
    known(0x0519, 0x0028, "Star SM-L300"),
    known(0x0519, 0x002b, "Star SM-T300"),
    known(0x0519, 0x002c, "Star SM-T400i"),
];

/// USB device class for printers
#[cfg(feature = "usb")]
const PRINTER_CLASS: u8 = 7;

const SERIAL_PRINTER_HINTS: [&str; 4] = ["print", "thermal", "pos", "receipt"];

pub fn lookup_usb(vendor_id: u16, product_id: u16) -> Option<&'static KnownUsbPrinter> {
    KNOWN_USB_PRINTERS
        .iter()
        .find(|p| p.vendor_id == vendor_id && p.product_id == product_id)
}

#[cfg_attr(not(feature = "usb"), allow(dead_code))]
fn usb_address(vendor_id: u16, product_id: u16) -> String {
    format!("{:#06x}:{:#06x}", vendor_id, product_id)
}

/// List attached USB printers
pub fn scan_usb() -> PrintResult<Vec<DiscoveredDevice>> {
    let mut found = scan_usb_bus()?;
    for device in scan_serial_ports() {
        if !found.iter().any(|d| d.address == device.address) {
            found.push(device);
        }
    }
    info!(found = found.len(), "USB scan finished");
    Ok(found)
}

#[cfg(feature = "usb")]
fn scan_usb_bus() -> PrintResult<Vec<DiscoveredDevice>> {
    let devices = rusb::devices().map_err(|e| crate::error::PrintError::Usb(e.to_string()))?;
    let mut found = Vec::new();

    for device in devices.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };
        let (vid, pid) = (desc.vendor_id(), desc.product_id());

        let name = if let Some(known) = lookup_usb(vid, pid) {
            known.name.to_string()
        } else if is_printer_class(&device, &desc) {
            device
                .open()
                .ok()
                .and_then(|h| h.read_product_string_ascii(&desc).ok())
                .unwrap_or_else(|| "USB Printer".to_string())
        } else {
            continue;
        };

        debug!(vid, pid, %name, "USB printer found");
        found.push(DiscoveredDevice::new(TransportKind::Usb, usb_address(vid, pid), name));
    }
    Ok(found)
}

#[cfg(feature = "usb")]
fn is_printer_class(device: &rusb::Device<rusb::GlobalContext>, desc: &rusb::DeviceDescriptor) -> bool {
    if desc.class_code() == PRINTER_CLASS {
        return true;
    }
    device.active_config_descriptor().is_ok_and(|config| {
        config
            .interfaces()
            .flat_map(|i| i.descriptors())
            .any(|d| d.class_code() == PRINTER_CLASS)
    })
}

#[cfg(not(feature = "usb"))]
fn scan_usb_bus() -> PrintResult<Vec<DiscoveredDevice>> {
    debug!("USB bus scan not compiled in, listing serial ports only");
    Ok(Vec::new())
}

fn scan_serial_ports() -> Vec<DiscoveredDevice> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            debug!(error = %e, "Serial port enumeration failed");
            return Vec::new();
        }
    };

    ports
        .into_iter()
        .filter_map(|p| match p.port_type {
            serialport::SerialPortType::UsbPort(info) => {
                let description = [info.manufacturer, info.product]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                classify_serial_port(&p.port_name, info.vid, info.pid, &description)
            }
            _ => None,
        })
        .collect()
}

/// A USB serial port counts as a printer when its IDs are known or its
/// description mentions printing
fn classify_serial_port(
    port_name: &str,
    vendor_id: u16,
    product_id: u16,
    description: &str,
) -> Option<DiscoveredDevice> {
    let name = match lookup_usb(vendor_id, product_id) {
        Some(known) => known.name.to_string(),
        None => {
            let lower = description.to_lowercase();
            if !SERIAL_PRINTER_HINTS.iter().any(|h| lower.contains(h)) {
                return None;
            }
            description.to_string()
        }
    };
    Some(DiscoveredDevice::new(TransportKind::Usb, port_name, name))
}
