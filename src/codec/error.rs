use super::types::{MAX_DATA_LENGTH, MAX_FIELD_COUNT, PacketType};
use thiserror::Error;

/// Raised while building a packet. These are programmer errors: a packet that
/// fails construction must never reach the socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error(
        "data block of {length} bytes exceeds the maximum of {max} bytes",
        max = MAX_DATA_LENGTH
    )]
    MaxDataLengthExceeded { length: usize },

    #[error(
        "field count {count} exceeds the maximum of {max} fields",
        max = MAX_FIELD_COUNT
    )]
    MaxFieldCountExceeded { count: usize },

    #[error("{packet_type} packets cannot carry a {length}-byte data block")]
    PacketTypeDataMismatch {
        packet_type: PacketType,
        length: usize,
    },
}

/// Raised while reading bytes off the wire. The dispatcher logs and drops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("unknown packet type flag {0:#010b}")]
    UnknownPacketType(u8),
}
