//! Serial port and character-device transport
//!
//! Serial-style paths (`/dev/rfcomm0`, `/dev/ttyUSB0`, `/dev/cu.*`, `COM3`)
//! are opened with `serialport`; anything else (`/dev/usb/lp0`) is written
//! as a plain file. All I/O runs on the blocking pool.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, instrument, warn};

use super::{CutSupport, Transport};
use crate::error::{PrintError, PrintResult};

/// Baud rate for serial and Bluetooth SPP printers
pub const DEFAULT_BAUD: u32 = 115_200;

type Handle = Box<dyn Write + Send>;

/// Serial or file device connection
pub struct SerialTransport {
    path: String,
    // Only touched through `&mut self`; the mutex makes the transport `Sync`
    handle: Option<Mutex<Handle>>,
    cuts: CutSupport,
    timeout: Duration,
}

impl SerialTransport {
    /// Open the device at `path`
    ///
    /// `timeout` bounds the open and every later write.
    #[instrument]
    pub async fn open(path: &str, timeout: Duration) -> PrintResult<Self> {
        let owned = path.to_string();
        let handle = blocking(timeout, path, move || open_device(&owned, timeout)).await??;

        info!("Opened printer device");
        Ok(Self {
            path: path.to_string(),
            handle: Some(Mutex::new(handle)),
            cuts: CutSupport::default(),
            timeout,
        })
    }

    /// Declare which cut commands the printer accepts
    pub fn with_cut_support(mut self, cuts: CutSupport) -> Self {
        self.cuts = cuts;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Transport for SerialTransport {
    #[instrument(skip(self, data), fields(path = %self.path, data_len = data.len()))]
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let mut handle = self
            .handle
            .take()
            .ok_or_else(|| PrintError::ConnectionUnavailable(format!("{}: closed", self.path)))?
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        let data = data.to_vec();

        // On timeout the handle stays with the stuck task and the device
        // must be reopened
        let (handle, result) = blocking(self.timeout, &self.path, move || {
            let result = handle.write_all(&data).and_then(|_| handle.flush());
            (handle, result)
        })
        .await?;

        match result {
            Ok(()) => {
                self.handle = Some(Mutex::new(handle));
                Ok(())
            }
            // Handle is dropped; the device must be reopened
            Err(e) => Err(PrintError::Io(e)),
        }
    }

    fn cut_support(&self) -> CutSupport {
        self.cuts
    }

    async fn close(&mut self) -> PrintResult<()> {
        self.handle = None;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("device://{}", self.path)
    }
}

/// Run device I/O on the blocking pool, giving up after `timeout`
async fn blocking<T, F>(timeout: Duration, path: &str, f: F) -> PrintResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(joined) => joined.map_err(|e| PrintError::Serial(format!("Task join failed: {}", e))),
        Err(_) => {
            warn!(path, ?timeout, "Device did not respond");
            Err(PrintError::Timeout(format!("{}: no response within {:?}", path, timeout)))
        }
    }
}

/// Whether a path names a serial port rather than a printer character device
pub fn is_serial_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    lower.starts_with("com")
        || lower.contains("tty")
        || lower.contains("rfcomm")
        || lower.starts_with("/dev/cu.")
}

fn open_device(path: &str, timeout: Duration) -> PrintResult<Handle> {
    if is_serial_path(path) {
        let port = serialport::new(path, DEFAULT_BAUD)
            .timeout(timeout)
            .open()
            .map_err(|e| PrintError::Serial(format!("{}: {}", path, e)))?;
        Ok(Box::new(port))
    } else {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| PrintError::ConnectionUnavailable(format!("{}: {}", path, e)))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_serial_path() {
        assert!(is_serial_path("/dev/rfcomm0"));
        assert!(is_serial_path("/dev/ttyUSB0"));
        assert!(is_serial_path("/dev/cu.mcprint3-SerialPort"));
        assert!(is_serial_path("COM3"));
        assert!(!is_serial_path("/dev/usb/lp0"));
    }

    #[tokio::test]
    async fn test_file_device_write() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();

        let mut t = SerialTransport::open(&path, Duration::from_secs(1))
            .await
            .unwrap();
        t.write(b"\x1b@receipt").await.unwrap();
        t.close().await.unwrap();

        assert_eq!(std::fs::read(file.path()).unwrap(), b"\x1b@receipt");
        assert!(t.write(b"more").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_device() {
        let result = SerialTransport::open("/nonexistent/lp9", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(PrintError::ConnectionUnavailable(_))));
    }

    #[test]
    fn test_transport_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SerialTransport>();
    }

    // A FIFO whose only reader never reads fills up and blocks the writer
    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_stalled_device_write_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let fifo = dir.path().join("lp0");
        let status = std::process::Command::new("mkfifo")
            .arg(&fifo)
            .status()
            .unwrap();
        assert!(status.success());

        // Read-write open does not block on Linux and keeps a reader attached
        let reader = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&fifo)
            .unwrap();

        let path = fifo.to_string_lossy().to_string();
        let mut t = SerialTransport::open(&path, Duration::from_millis(200))
            .await
            .unwrap();

        let started = std::time::Instant::now();
        let result = t.write(&vec![b'x'; 1 << 20]).await;
        assert!(matches!(result, Err(PrintError::Timeout(_))), "{:?}", result);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(
            t.write(b"more").await,
            Err(PrintError::ConnectionUnavailable(_))
        ));

        // Releases the stuck blocking write (EPIPE) before the runtime shuts down
        drop(reader);
    }
}
