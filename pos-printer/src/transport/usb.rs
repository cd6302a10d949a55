//! USB bulk transport
//!
//! Claims the interface owning the first bulk OUT endpoint of a printer
//! identified by vendor/product ID and writes frames to it. Requires the
//! `usb` feature; without it opening always reports the transport as
//! unavailable so callers fall through to CUPS spooling.

use std::time::Duration;

use super::{CutSupport, Transport};
use crate::error::{PrintError, PrintResult};

#[cfg(feature = "usb")]
use tracing::{info, instrument, warn};

/// USB printer connection
pub struct UsbTransport {
    vendor_id: u16,
    product_id: u16,
    #[cfg(feature = "usb")]
    inner: Option<imp::Claimed>,
    cuts: CutSupport,
    #[cfg_attr(not(feature = "usb"), allow(dead_code))]
    timeout: Duration,
}

impl UsbTransport {
    pub fn ids(&self) -> (u16, u16) {
        (self.vendor_id, self.product_id)
    }

    /// Declare which cut commands the printer accepts
    pub fn with_cut_support(mut self, cuts: CutSupport) -> Self {
        self.cuts = cuts;
        self
    }
}

#[cfg(feature = "usb")]
impl UsbTransport {
    /// Open and claim the printer
    #[instrument(skip_all, fields(device = %format!("{:04x}:{:04x}", vendor_id, product_id)))]
    pub async fn open(vendor_id: u16, product_id: u16, timeout: Duration) -> PrintResult<Self> {
        let claimed = tokio::task::spawn_blocking(move || imp::Claimed::open(vendor_id, product_id))
            .await
            .map_err(|e| PrintError::Usb(format!("Task join failed: {}", e)))??;

        info!(endpoint = claimed.endpoint, "USB printer claimed");
        Ok(Self {
            vendor_id,
            product_id,
            inner: Some(claimed),
            cuts: CutSupport::default(),
            timeout,
        })
    }

    fn release(&mut self) {
        if let Some(claimed) = self.inner.take() {
            claimed.release();
        }
    }
}

#[cfg(not(feature = "usb"))]
impl UsbTransport {
    /// USB support is not compiled in
    pub async fn open(vendor_id: u16, product_id: u16, _timeout: Duration) -> PrintResult<Self> {
        Err(PrintError::ConnectionUnavailable(format!(
            "{:04x}:{:04x}: USB support not compiled in",
            vendor_id, product_id
        )))
    }

    fn release(&mut self) {}
}

impl Transport for UsbTransport {
    #[cfg(feature = "usb")]
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let claimed = self.inner.take().ok_or_else(|| {
            PrintError::ConnectionUnavailable(format!(
                "{:04x}:{:04x}: closed",
                self.vendor_id, self.product_id
            ))
        })?;
        let data = data.to_vec();
        let timeout = self.timeout;

        let (claimed, result) = tokio::task::spawn_blocking(move || {
            let result = claimed.write(&data, timeout);
            (claimed, result)
        })
        .await
        .map_err(|e| PrintError::Usb(format!("Task join failed: {}", e)))?;

        match result {
            Ok(()) => {
                self.inner = Some(claimed);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "USB write failed, releasing device");
                claimed.release();
                Err(e)
            }
        }
    }

    #[cfg(not(feature = "usb"))]
    async fn write(&mut self, _data: &[u8]) -> PrintResult<()> {
        Err(PrintError::ConnectionUnavailable(
            "USB support not compiled in".to_string(),
        ))
    }

    fn cut_support(&self) -> CutSupport {
        self.cuts
    }

    async fn close(&mut self) -> PrintResult<()> {
        self.release();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("usb://{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

#[cfg(feature = "usb")]
mod imp {
    use std::time::Duration;

    use rusb::{Direction, GlobalContext, TransferType};

    use crate::error::{PrintError, PrintResult};

    fn usb_err(e: rusb::Error) -> PrintError {
        PrintError::Usb(e.to_string())
    }

    /// Device handle with a claimed interface
    pub(super) struct Claimed {
        handle: rusb::DeviceHandle<GlobalContext>,
        interface: u8,
        pub(super) endpoint: u8,
    }

    impl Claimed {
        pub(super) fn open(vendor_id: u16, product_id: u16) -> PrintResult<Self> {
            let handle = rusb::open_device_with_vid_pid(vendor_id, product_id).ok_or_else(|| {
                PrintError::ConnectionUnavailable(format!(
                    "{:04x}:{:04x}: USB device not found",
                    vendor_id, product_id
                ))
            })?;

            let config = handle
                .device()
                .active_config_descriptor()
                .map_err(usb_err)?;

            let (interface, endpoint) = config
                .interfaces()
                .flat_map(|i| i.descriptors())
                .find_map(|desc| {
                    desc.endpoint_descriptors()
                        .find(|ep| {
                            ep.direction() == Direction::Out
                                && ep.transfer_type() == TransferType::Bulk
                        })
                        .map(|ep| (desc.interface_number(), ep.address()))
                })
                .ok_or_else(|| PrintError::Usb("No bulk OUT endpoint".to_string()))?;

            // Not supported on every platform; claiming still works there
            let _ = handle.set_auto_detach_kernel_driver(true);
            handle.claim_interface(interface).map_err(usb_err)?;

            Ok(Self {
                handle,
                interface,
                endpoint,
            })
        }

        pub(super) fn write(&self, data: &[u8], timeout: Duration) -> PrintResult<()> {
            let mut offset = 0;
            while offset < data.len() {
                let n = self
                    .handle
                    .write_bulk(self.endpoint, &data[offset..], timeout)
                    .map_err(|e| match e {
                        rusb::Error::Timeout => {
                            PrintError::Timeout("USB bulk write timeout".to_string())
                        }
                        other => usb_err(other),
                    })?;
                if n == 0 {
                    return Err(PrintError::Usb("USB bulk write stalled".to_string()));
                }
                offset += n;
            }
            Ok(())
        }

        pub(super) fn release(self) {
            let _ = self.handle.release_interface(self.interface);
        }
    }
}
