//! HAC Packet Codec
//!
//! Converts between the typed protocol structures and the HAC wire format.
//! All byte-level work (shifting, masking, byte order) lives in this module;
//! the rest of the crate only ever sees `Packet` and `NodeRecord`.
//!
//! ## Wire Layout
//! Every datagram is a fixed 12-byte header followed by `data_length` bytes:
//!
//! | offset | field                                   | width |
//! |--------|-----------------------------------------|-------|
//! | 0-3    | source IPv4, most significant octet first | 4     |
//! | 4-5    | source id                               | 2     |
//! | 6-7    | data length                             | 2     |
//! | 8      | type flag (exactly one bit set)         | 1     |
//! | 9      | reserved, always 0                      | 1     |
//! | 10-11  | field count (low 12 bits)               | 2     |
//!
//! STATUS packets carry `field count` node records of 16 bytes each
//! (see [`node`]). PING, ACK, INIT, CRQ and RESEND never carry data.

pub mod error;
pub mod node;
pub mod packet;
pub mod types;

pub use error::{CodecError, DecodeError};
pub use node::{decode_node, encode_node};
pub use packet::{Packet, decode, encode};
pub use types::{NodeRecord, NodeStatus, PacketType, now_ms};

#[cfg(test)]
mod tests;
