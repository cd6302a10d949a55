//! LAN scan for raw-port listeners

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

use super::DiscoveredDevice;
use crate::profile::{RAW_PORT, TransportKind};

/// Host numbers where printers are commonly configured; probed first
pub const COMMON_HOSTS: [u8; 10] = [1, 10, 20, 50, 100, 101, 102, 150, 200, 254];

pub const DEFAULT_PROBE_CONCURRENCY: usize = 50;

pub const FALLBACK_SUBNET_PREFIX: [u8; 3] = [192, 168, 1];

/// First three octets of the local IPv4 address
///
/// Asks the OS which interface would route to a private address; no
/// packet is sent. Falls back to 192.168.1.
pub async fn local_subnet_prefix() -> [u8; 3] {
    let probe = async {
        let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
        socket.connect("10.254.254.254:1").await.ok()?;
        match socket.local_addr().ok()? {
            SocketAddr::V4(v4) if !v4.ip().is_unspecified() => {
                let [a, b, c, _] = v4.ip().octets();
                Some([a, b, c])
            }
            _ => None,
        }
    };
    probe.await.unwrap_or(FALLBACK_SUBNET_PREFIX)
}

/// Host numbers 1..=254, common hosts first
pub fn candidate_hosts() -> Vec<u8> {
    let mut hosts = COMMON_HOSTS.to_vec();
    hosts.extend((1..=254).filter(|h| !COMMON_HOSTS.contains(h)));
    hosts
}

/// Probe `candidates` with bounded concurrency
///
/// Returns the addresses that accepted a connection, in candidate order.
#[instrument(skip(candidates), fields(candidates = candidates.len()))]
pub async fn probe_hosts(
    candidates: Vec<SocketAddr>,
    timeout: Duration,
    concurrency: usize,
) -> Vec<SocketAddr> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for (index, addr) in candidates.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            let online = tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .ok()
                .and_then(Result::ok)
                .is_some();
            online.then_some((index, addr))
        });
    }

    let mut found = Vec::new();
    while let Some(joined) = set.join_next().await {
        if let Ok(Some(hit)) = joined {
            debug!(addr = %hit.1, "Printer port open");
            found.push(hit);
        }
    }
    found.sort_by_key(|(index, _)| *index);
    found.into_iter().map(|(_, addr)| addr).collect()
}

/// Scan the local /24 for hosts listening on `port`
pub async fn scan_lan(port: u16, timeout: Duration) -> Vec<DiscoveredDevice> {
    let [a, b, c] = local_subnet_prefix().await;
    info!(subnet = %format!("{}.{}.{}.*", a, b, c), "Scanning LAN printers");

    let candidates = candidate_hosts()
        .into_iter()
        .map(|h| SocketAddr::from((Ipv4Addr::new(a, b, c, h), port)))
        .collect();

    let found: Vec<DiscoveredDevice> = probe_hosts(candidates, timeout, DEFAULT_PROBE_CONCURRENCY)
        .await
        .into_iter()
        .map(|addr| {
            let address = if addr.port() == RAW_PORT {
                addr.ip().to_string()
            } else {
                addr.to_string()
            };
            DiscoveredDevice::new(TransportKind::Lan, address, "")
        })
        .collect();

    info!(found = found.len(), "LAN scan finished");
    found
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn test_candidate_order() {
        let hosts = candidate_hosts();
        assert_eq!(hosts.len(), 254);
        assert_eq!(&hosts[..10], &COMMON_HOSTS);
        assert_eq!(hosts[10], 2);
        assert!(!hosts.contains(&0) && !hosts.contains(&255));
    }

    #[tokio::test]
    async fn test_probe_keeps_candidate_order() {
        let open_a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);

        let a = open_a.local_addr().unwrap();
        let b = open_b.local_addr().unwrap();
        let found = probe_hosts(vec![b, closed_addr, a], Duration::from_millis(500), 2).await;
        assert_eq!(found, vec![b, a]);
    }

    #[tokio::test]
    async fn test_subnet_prefix_is_usable() {
        let prefix = local_subnet_prefix().await;
        assert_ne!(prefix, [0, 0, 0]);
    }
}
