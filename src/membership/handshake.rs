//! Join handshake payload and the parent/child chain.
//!
//! A node answering an INIT sends back a RAW packet whose data block is
//! `"GOTO" · mode(1) · count(1) · count x node record`. In server mode the
//! single record is the server itself; in peer mode it is the joiner's
//! parent followed by its child, if it has one.

use crate::codec::types::NODE_RECORD_LEN;
use crate::codec::{
    CodecError, DecodeError, NodeRecord, Packet, PacketType, decode_node, encode_node,
};

use std::net::{Ipv4Addr, SocketAddrV4};

const MAGIC: &[u8; 4] = b"GOTO";
const MODE_SERVER: u8 = 0x01;
const MODE_PEER: u8 = 0x02;
const PREFIX_LEN: usize = MAGIC.len() + 2;

/// Where a joining node has been placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Report to the server.
    Server { server: NodeRecord },
    /// Report to `parent`; forward to `child`.
    Peer {
        parent: NodeRecord,
        child: Option<NodeRecord>,
    },
}

impl Assignment {
    pub fn to_packet(
        &self,
        source_id: u16,
        source_address: Ipv4Addr,
        now: u64,
    ) -> Result<Packet, CodecError> {
        Packet::new(source_id, source_address, PacketType::Raw, self.encode(now))
    }

    /// Returns the assignment carried by a RAW packet, if it carries one.
    pub fn from_packet(packet: &Packet, now: u64) -> Option<Self> {
        if packet.packet_type() != PacketType::Raw || !packet.data().starts_with(MAGIC) {
            return None;
        }

        match Self::decode(packet.data(), now) {
            Ok(assignment) => Some(assignment),
            Err(e) => {
                tracing::warn!("Ignoring malformed assignment: {}", e);
                None
            }
        }
    }

    /// Every node named by the assignment.
    pub fn nodes(&self) -> Vec<NodeRecord> {
        match self {
            Assignment::Server { server } => vec![*server],
            Assignment::Peer { parent, child } => std::iter::once(*parent).chain(*child).collect(),
        }
    }

    pub fn parent(&self) -> NodeRecord {
        match self {
            Assignment::Server { server } => *server,
            Assignment::Peer { parent, .. } => *parent,
        }
    }

    fn encode(&self, now: u64) -> Vec<u8> {
        let (mode, nodes) = match self {
            Assignment::Server { .. } => (MODE_SERVER, self.nodes()),
            Assignment::Peer { .. } => (MODE_PEER, self.nodes()),
        };

        let mut out = Vec::with_capacity(PREFIX_LEN + nodes.len() * NODE_RECORD_LEN);
        out.extend_from_slice(MAGIC);
        out.push(mode);
        out.push(nodes.len() as u8);
        for node in &nodes {
            out.extend_from_slice(&encode_node(node, now));
        }
        out
    }

    fn decode(data: &[u8], now: u64) -> Result<Self, DecodeError> {
        if data.len() < PREFIX_LEN || !data.starts_with(MAGIC) {
            return Err(DecodeError::MalformedPacket("missing GOTO prefix".into()));
        }

        let mode = data[MAGIC.len()];
        let count = data[MAGIC.len() + 1] as usize;
        let body = &data[PREFIX_LEN..];
        if body.len() != count * NODE_RECORD_LEN {
            return Err(DecodeError::MalformedPacket(format!(
                "assignment declares {} records in {} bytes",
                count,
                body.len()
            )));
        }

        let nodes = body
            .chunks_exact(NODE_RECORD_LEN)
            .map(|chunk| decode_node(chunk, now))
            .collect::<Result<Vec<_>, _>>()?;

        match (mode, nodes.as_slice()) {
            (MODE_SERVER, [server]) => Ok(Assignment::Server { server: *server }),
            (MODE_PEER, [parent]) => Ok(Assignment::Peer {
                parent: *parent,
                child: None,
            }),
            (MODE_PEER, [parent, child]) => Ok(Assignment::Peer {
                parent: *parent,
                child: Some(*child),
            }),
            _ => Err(DecodeError::MalformedPacket(format!(
                "assignment mode {:#04x} with {} records",
                mode, count
            ))),
        }
    }
}

/// A joiner's slot in the chain, plus the existing node that must learn
/// about its new child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub parent: SocketAddrV4,
    pub child: Option<SocketAddrV4>,
    pub notify: Option<ChildNotice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildNotice {
    pub target: SocketAddrV4,
    pub parent: SocketAddrV4,
    pub child: SocketAddrV4,
}

/// This node's own parent/child links and, for a node accepting joins, the
/// chain of members it has placed (itself first). Each node has at most one
/// parent and one child.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    parent: Option<SocketAddrV4>,
    child: Option<SocketAddrV4>,
    chain: Vec<SocketAddrV4>,
}

impl Topology {
    pub fn parent(&self) -> Option<SocketAddrV4> {
        self.parent
    }

    pub fn child(&self) -> Option<SocketAddrV4> {
        self.child
    }

    pub fn chain(&self) -> &[SocketAddrV4] {
        &self.chain
    }

    /// Records the links handed to this node by the node it joined.
    pub fn apply(&mut self, assignment: &Assignment) {
        match assignment {
            Assignment::Server { server } => {
                self.parent = Some(server.socket_addr());
                self.child = None;
            }
            Assignment::Peer { parent, child } => {
                self.parent = Some(parent.socket_addr());
                self.child = child.map(|node| node.socket_addr());
            }
        }
    }

    /// Appends `joiner` to the tail of the chain rooted at `host`. A node
    /// already in the chain keeps its slot.
    pub fn place(&mut self, host: SocketAddrV4, joiner: SocketAddrV4) -> Placement {
        if self.chain.is_empty() {
            self.chain.push(host);
        }

        if let Some(position) = self.chain.iter().position(|addr| *addr == joiner) {
            return Placement {
                parent: self.chain[position.saturating_sub(1)],
                child: self.chain.get(position + 1).copied(),
                notify: None,
            };
        }

        let tail_index = self.chain.len() - 1;
        let tail = self.chain[tail_index];
        self.chain.push(joiner);

        let notify = if tail == host {
            self.child = Some(joiner);
            None
        } else {
            Some(ChildNotice {
                target: tail,
                parent: self.chain[tail_index - 1],
                child: joiner,
            })
        };

        Placement {
            parent: tail,
            child: None,
            notify,
        }
    }
}
