use super::error::{CodecError, DecodeError};
use super::node::{decode_node, encode_node};
use super::types::{
    HEADER_LEN, MAX_DATA_LENGTH, MAX_FIELD_COUNT, NODE_RECORD_LEN, NodeRecord, PacketType,
};
use std::net::Ipv4Addr;

const FIELD_COUNT_MASK: u16 = 0x0FFF;

/// A validated HAC packet.
///
/// Fields are private so every `Packet` in the program satisfies the size
/// limits and the type/data rules; the only ways in are the constructors
/// below and [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    source_id: u16,
    source_address: Ipv4Addr,
    packet_type: PacketType,
    num_fields: u16,
    data: Vec<u8>,
}

impl Packet {
    /// Builds a packet with an arbitrary data block.
    ///
    /// # Errors
    /// * `PacketTypeDataMismatch` if `packet_type` is a signal type and `data`
    ///   is not empty, or if a STATUS block is not a whole number of records.
    /// * `MaxDataLengthExceeded` if `data` is longer than 65411 bytes.
    /// * `MaxFieldCountExceeded` if a STATUS block holds more than 4093 records.
    pub fn new(
        source_id: u16,
        source_address: Ipv4Addr,
        packet_type: PacketType,
        data: Vec<u8>,
    ) -> Result<Self, CodecError> {
        if !packet_type.carries_data() && !data.is_empty() {
            return Err(CodecError::PacketTypeDataMismatch {
                packet_type,
                length: data.len(),
            });
        }

        let num_fields = if packet_type == PacketType::Status {
            if data.len() % NODE_RECORD_LEN != 0 {
                return Err(CodecError::PacketTypeDataMismatch {
                    packet_type,
                    length: data.len(),
                });
            }
            let count = data.len() / NODE_RECORD_LEN;
            if count > MAX_FIELD_COUNT {
                return Err(CodecError::MaxFieldCountExceeded { count });
            }
            count as u16
        } else {
            if data.len() > MAX_DATA_LENGTH {
                return Err(CodecError::MaxDataLengthExceeded { length: data.len() });
            }
            0
        };

        Ok(Self {
            source_id,
            source_address,
            packet_type,
            num_fields,
            data,
        })
    }

    /// Builds a packet with an empty data block.
    pub fn signal(source_id: u16, source_address: Ipv4Addr, packet_type: PacketType) -> Self {
        Self {
            source_id,
            source_address,
            packet_type,
            num_fields: 0,
            data: Vec::new(),
        }
    }

    /// Builds a STATUS packet carrying `nodes`, with contact ages computed
    /// against `now`.
    pub fn status(
        source_id: u16,
        source_address: Ipv4Addr,
        nodes: &[NodeRecord],
        now: u64,
    ) -> Result<Self, CodecError> {
        if nodes.len() > MAX_FIELD_COUNT {
            return Err(CodecError::MaxFieldCountExceeded { count: nodes.len() });
        }

        let mut data = Vec::with_capacity(nodes.len() * NODE_RECORD_LEN);
        for node in nodes {
            data.extend_from_slice(&encode_node(node, now));
        }

        Ok(Self {
            source_id,
            source_address,
            packet_type: PacketType::Status,
            num_fields: nodes.len() as u16,
            data,
        })
    }

    pub fn source_id(&self) -> u16 {
        self.source_id
    }

    pub fn source_address(&self) -> Ipv4Addr {
        self.source_address
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn data_length(&self) -> u16 {
        self.data.len() as u16
    }

    /// Number of node records; always 0 for anything but STATUS.
    pub fn num_fields(&self) -> u16 {
        self.num_fields
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decodes the node records of a STATUS packet. Other packet types yield
    /// an empty list.
    pub fn nodes(&self, now: u64) -> Result<Vec<NodeRecord>, DecodeError> {
        if self.packet_type != PacketType::Status {
            return Ok(Vec::new());
        }

        self.data
            .chunks_exact(NODE_RECORD_LEN)
            .take(self.num_fields as usize)
            .map(|chunk| decode_node(chunk, now))
            .collect()
    }
}

/// Serializes a packet into its wire form.
pub fn encode(packet: &Packet) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + packet.data.len());

    out.extend_from_slice(&packet.source_address.octets());
    out.extend_from_slice(&packet.source_id.to_be_bytes());
    out.extend_from_slice(&packet.data_length().to_be_bytes());
    out.push(packet.packet_type.flag());
    out.push(0);
    out.extend_from_slice(&(packet.num_fields & FIELD_COUNT_MASK).to_be_bytes());
    out.extend_from_slice(&packet.data);

    out
}

/// Parses a datagram. Bytes past the declared data length are ignored.
pub fn decode(buf: &[u8]) -> Result<Packet, DecodeError> {
    if buf.len() < HEADER_LEN {
        return Err(DecodeError::MalformedPacket(format!(
            "{} bytes is shorter than the {}-byte header",
            buf.len(),
            HEADER_LEN
        )));
    }

    let source_address = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
    let source_id = u16::from_be_bytes([buf[4], buf[5]]);
    let data_length = u16::from_be_bytes([buf[6], buf[7]]) as usize;
    let flag = buf[8];
    let reserved = buf[9];
    let num_fields = u16::from_be_bytes([buf[10], buf[11]]) & FIELD_COUNT_MASK;

    let remaining = buf.len() - HEADER_LEN;
    if data_length > remaining {
        return Err(DecodeError::MalformedPacket(format!(
            "data length {} exceeds the {} bytes remaining",
            data_length, remaining
        )));
    }

    if reserved != 0 {
        return Err(DecodeError::MalformedPacket(format!(
            "reserved header byte is {:#04x}",
            reserved
        )));
    }

    let packet_type = PacketType::from_flag(flag)
        .ok_or(DecodeError::UnknownPacketType(flag))?;

    if !packet_type.carries_data() && data_length != 0 {
        return Err(DecodeError::MalformedPacket(format!(
            "{} packet declares a {}-byte data block",
            packet_type, data_length
        )));
    }

    match packet_type {
        PacketType::Status => {
            if num_fields as usize > MAX_FIELD_COUNT
                || num_fields as usize * NODE_RECORD_LEN != data_length
            {
                return Err(DecodeError::MalformedPacket(format!(
                    "STATUS packet declares {} fields in {} bytes",
                    num_fields, data_length
                )));
            }
        }
        _ => {
            if num_fields != 0 {
                return Err(DecodeError::MalformedPacket(format!(
                    "{} packet declares {} fields",
                    packet_type, num_fields
                )));
            }
            if data_length > MAX_DATA_LENGTH {
                return Err(DecodeError::MalformedPacket(format!(
                    "data length {} exceeds {}",
                    data_length, MAX_DATA_LENGTH
                )));
            }
        }
    }

    Ok(Packet {
        source_id,
        source_address,
        packet_type,
        num_fields,
        data: buf[HEADER_LEN..HEADER_LEN + data_length].to_vec(),
    })
}
