//! LAN printer brand identification
//!
//! Sends the ESC/POS "transmit printer ID" request for the maker name and
//! turns the reply into a device name for [`select_driver`](super::select_driver).
//! Printers that stay silent are left to the generic driver.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, info};

use crate::transport::TcpTransport;

/// `GS I 66`: transmit maker name
pub const IDENTIFY_MAKER_QUERY: [u8; 3] = [0x1D, 0x49, 0x42];

/// Ask the printer at `addr` for its maker name
///
/// Returns `None` on timeout, connection error or an unreadable reply.
pub async fn identify_lan_brand(addr: SocketAddr, timeout: Duration) -> Option<String> {
    let Some(reply) = TcpTransport::query(addr, &IDENTIFY_MAKER_QUERY, timeout).await else {
        debug!(%addr, "No identification reply");
        return None;
    };
    let name = parse_identity_reply(&reply)?;
    info!(%addr, maker = %name, "Printer identified");
    Some(name)
}

/// Decode a `_<ASCII>\0` identification block
pub fn parse_identity_reply(reply: &[u8]) -> Option<String> {
    let body = reply.strip_prefix(b"_")?;
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    let name: String = body[..end]
        .iter()
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|&b| b as char)
        .collect();
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}
