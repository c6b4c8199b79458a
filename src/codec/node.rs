//! Node record sub-format (16 bytes):
//!
//! `address(4) · id(2) · port(2) · status(1, bits 7-5) · reserved(1) · tslc(6)`
//!
//! `tslc` is the time since last contact in milliseconds as seen by the
//! sender, 48-bit big-endian. Values 0 and 1 mean "unknown".

use super::error::DecodeError;
use super::types::{NODE_RECORD_LEN, NodeRecord, NodeStatus};
use std::net::Ipv4Addr;

const MAX_TSLC: u64 = (1 << 48) - 1;
const STATUS_SHIFT: u8 = 5;

/// Encodes `node` relative to the sender's clock `now`.
///
/// A known contact younger than 2 ms is written as 2 ms so it is not
/// mistaken for the "unknown" marker.
pub fn encode_node(node: &NodeRecord, now: u64) -> [u8; NODE_RECORD_LEN] {
    let tslc = match node.last_contact {
        Some(last) => now.saturating_sub(last).clamp(2, MAX_TSLC),
        None => 0,
    };

    let mut out = [0u8; NODE_RECORD_LEN];
    out[0..4].copy_from_slice(&node.address.octets());
    out[4..6].copy_from_slice(&node.id.to_be_bytes());
    out[6..8].copy_from_slice(&node.port.to_be_bytes());
    out[8] = node.status.to_bits() << STATUS_SHIFT;
    out[9] = 0;
    out[10..16].copy_from_slice(&tslc.to_be_bytes()[2..8]);
    out
}

/// Decodes one node record, converting the relative `tslc` into an absolute
/// `last_contact` against the receiver's clock `now`.
pub fn decode_node(bytes: &[u8], now: u64) -> Result<NodeRecord, DecodeError> {
    if bytes.len() != NODE_RECORD_LEN {
        return Err(DecodeError::MalformedPacket(format!(
            "node record is {} bytes, expected {}",
            bytes.len(),
            NODE_RECORD_LEN
        )));
    }

    let address = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
    let id = u16::from_be_bytes([bytes[4], bytes[5]]);
    let port = u16::from_be_bytes([bytes[6], bytes[7]]);
    let status = NodeStatus::from_bits(bytes[8] >> STATUS_SHIFT);

    let mut wide = [0u8; 8];
    wide[2..8].copy_from_slice(&bytes[10..16]);
    let tslc = u64::from_be_bytes(wide);

    let last_contact = if tslc > 1 {
        Some(now.saturating_sub(tslc))
    } else {
        None
    };

    Ok(NodeRecord {
        id,
        address,
        port,
        status,
        last_contact,
    })
}
