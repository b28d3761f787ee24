//! Git packet-line framing for the smart HTTP service advertisement.
//!
//! # Packet-line format
//!
//! Each packet line is prefixed with a 4-character lowercase hex length that
//! includes itself:
//!
//! - `0000` -- flush packet (end of section)
//! - `0004`+ -- data packet (length includes the 4 prefix bytes)
//!
//! Only the `# service=<rpc>` announcement that precedes the ref
//! advertisement is framed here.  Everything `git` writes afterwards is
//! relayed untouched.

use anyhow::{ensure, Result};

/// The flush packet.
pub const FLUSH_PKT: &[u8] = b"0000";

/// Largest payload that still fits a 4-hex-digit length prefix.
pub const MAX_PKT_PAYLOAD: usize = 0xFFFF - 4;

/// Encode a byte slice as a Git packet-line (4-hex-digit length prefix + data).
///
/// The length includes the 4 prefix bytes themselves.  Callers are responsible
/// for including any trailing newline in `data` if the protocol requires it.
pub fn encode_pkt_line(data: &[u8]) -> Result<Vec<u8>> {
    ensure!(
        data.len() <= MAX_PKT_PAYLOAD,
        "packet-line payload too large ({} bytes)",
        data.len()
    );
    let total_len = data.len() + 4;
    let mut buf = Vec::with_capacity(total_len);
    buf.extend_from_slice(format!("{total_len:04x}").as_bytes());
    buf.extend_from_slice(data);
    Ok(buf)
}

/// Build the handshake that opens every `info/refs` response: the
/// `# service=<rpc>\n` packet followed by a flush packet.
pub fn service_advertisement(rpc: &str) -> Result<Vec<u8>> {
    let mut buf = encode_pkt_line(format!("# service={rpc}\n").as_bytes())?;
    buf.extend_from_slice(FLUSH_PKT);
    Ok(buf)
}
