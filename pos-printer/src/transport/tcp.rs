//! Raw TCP transport (port 9100)

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

use super::{CutSupport, Transport};
use crate::error::{PrintError, PrintResult};

/// Network printer connection
///
/// Most thermal printers accept raw ESC/POS on TCP port 9100.
#[derive(Debug)]
pub struct TcpTransport {
    addr: SocketAddr,
    stream: Option<TcpStream>,
    write_timeout: Duration,
    cuts: CutSupport,
}

impl TcpTransport {
    /// Open a connection, failing with `ConnectionUnavailable` after `timeout`
    #[instrument(fields(addr = %addr))]
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> PrintResult<Self> {
        let stream = open(addr, timeout).await?;
        info!("Connected to network printer");

        Ok(Self {
            addr,
            stream: Some(stream),
            write_timeout: Duration::from_secs(5),
            cuts: CutSupport::default(),
        })
    }

    /// Set the per-write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Declare which cut commands the printer accepts
    pub fn with_cut_support(mut self, cuts: CutSupport) -> Self {
        self.cuts = cuts;
        self
    }

    /// Get the printer address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connect, send `data` and close
    #[instrument(skip(data), fields(addr = %addr, data_len = data.len()))]
    pub async fn send_once(addr: SocketAddr, data: &[u8], timeout: Duration) -> PrintResult<()> {
        let mut stream = open(addr, timeout).await?;
        write_all(&mut stream, data, timeout).await?;
        info!("Raw print job sent");
        Ok(())
    }

    /// Check if the printer port accepts connections
    #[instrument]
    pub async fn is_online(addr: SocketAddr, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Printer offline");
                false
            }
            Err(_) => false,
        }
    }

    /// Send `request` and read one reply within `timeout`
    ///
    /// Returns `None` when the printer does not answer in time.
    #[instrument(skip(request), fields(addr = %addr))]
    pub async fn query(addr: SocketAddr, request: &[u8], timeout: Duration) -> Option<Vec<u8>> {
        let mut stream = open(addr, timeout).await.ok()?;
        write_all(&mut stream, request, timeout).await.ok()?;

        let mut buf = vec![0u8; 128];
        match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => {
                buf.truncate(n);
                Some(buf)
            }
            _ => None,
        }
    }
}

impl Transport for TcpTransport {
    #[instrument(skip(self, data), fields(addr = %self.addr, data_len = data.len()))]
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PrintError::ConnectionUnavailable(format!("{}: closed", self.addr)))?;

        if let Err(e) = write_all(stream, data, self.write_timeout).await {
            // A failed stream is not reusable
            self.stream = None;
            return Err(e);
        }
        Ok(())
    }

    fn cut_support(&self) -> CutSupport {
        self.cuts
    }

    async fn close(&mut self) -> PrintResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

async fn open(addr: SocketAddr, timeout: Duration) -> PrintResult<TcpStream> {
    tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            PrintError::ConnectionUnavailable(format!("{}: connection timeout", addr))
        })?
        .map_err(|e| PrintError::ConnectionUnavailable(format!("{}: {}", addr, e)))
}

async fn write_all(stream: &mut TcpStream, data: &[u8], timeout: Duration) -> PrintResult<()> {
    let send = async {
        stream.write_all(data).await?;
        stream.flush().await
    };
    tokio::time::timeout(timeout, send)
        .await
        .map_err(|_| PrintError::Timeout("Write timeout".to_string()))?
        .map_err(|e| {
            PrintError::Io(std::io::Error::new(
                e.kind(),
                format!("Write failed: {}", e),
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_write_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            sock.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let mut t = TcpTransport::connect(addr, Duration::from_secs(1))
            .await
            .unwrap();
        t.write(b"hello").await.unwrap();
        t.close().await.unwrap();

        assert_eq!(server.await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpTransport::connect(addr, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(PrintError::ConnectionUnavailable(_))));
        assert!(!TcpTransport::is_online(addr, Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut t = TcpTransport::connect(addr, Duration::from_secs(1))
            .await
            .unwrap();
        t.close().await.unwrap();
        assert!(t.write(b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_query_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 3];
            sock.read_exact(&mut buf).await.unwrap();
            sock.write_all(b"_EPSON\0").await.unwrap();
        });

        let reply = TcpTransport::query(addr, &[0x1D, 0x49, 0x42], Duration::from_secs(1)).await;
        assert_eq!(reply.as_deref(), Some(&b"_EPSON\0"[..]));
    }
}
