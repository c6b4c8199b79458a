use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Size of the fixed packet header in bytes.
pub const HEADER_LEN: usize = 12;
/// Size of one encoded node record in bytes.
pub const NODE_RECORD_LEN: usize = 16;
/// Largest data block a non-STATUS packet may carry.
pub const MAX_DATA_LENGTH: usize = 65_411;
/// Largest number of node records a STATUS packet may carry.
pub const MAX_FIELD_COUNT: usize = 4_093;

/// The kind of a packet. On the wire each kind is a single set bit in the
/// type byte; anything else (including zero) is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Raw,
    Ping,
    Ack,
    Init,
    Crq,
    Csum,
    Status,
    Resend,
}

impl PacketType {
    pub const ALL: [PacketType; 8] = [
        PacketType::Raw,
        PacketType::Ping,
        PacketType::Ack,
        PacketType::Init,
        PacketType::Crq,
        PacketType::Csum,
        PacketType::Status,
        PacketType::Resend,
    ];

    /// The one-hot flag written into byte 8 of the header.
    pub fn flag(self) -> u8 {
        match self {
            PacketType::Raw => 0b1000_0000,
            PacketType::Ping => 0b0100_0000,
            PacketType::Ack => 0b0010_0000,
            PacketType::Init => 0b0001_0000,
            PacketType::Crq => 0b0000_1000,
            PacketType::Csum => 0b0000_0100,
            PacketType::Status => 0b0000_0010,
            PacketType::Resend => 0b0000_0001,
        }
    }

    /// Returns `None` for zero or for a byte with more than one bit set.
    pub fn from_flag(flag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.flag() == flag)
    }

    /// PING, ACK, INIT, CRQ and RESEND are pure signals with an empty data block.
    pub fn carries_data(self) -> bool {
        matches!(
            self,
            PacketType::Raw | PacketType::Csum | PacketType::Status
        )
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Raw => "RAW",
            PacketType::Ping => "PING",
            PacketType::Ack => "ACK",
            PacketType::Init => "INIT",
            PacketType::Crq => "CRQ",
            PacketType::Csum => "CSUM",
            PacketType::Status => "STATUS",
            PacketType::Resend => "RESEND",
        };
        f.write_str(name)
    }
}

/// Liveness state of a known node.
///
/// Allowed transitions: `Unknown -> Active`, `Active <-> Online`,
/// `* -> Offline` and `Offline -> Active`. Once a node has been heard from it
/// never goes back to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    /// Reachable and operating normally.
    Active,
    /// Reachable but its application is unresponsive.
    Online,
    /// Not heard from within the node timeout.
    Offline,
    /// Never heard from.
    Unknown,
}

impl NodeStatus {
    pub(crate) fn to_bits(self) -> u8 {
        match self {
            NodeStatus::Active => 0b001,
            NodeStatus::Online => 0b010,
            NodeStatus::Offline => 0b011,
            NodeStatus::Unknown => 0b100,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b001 => NodeStatus::Active,
            0b010 => NodeStatus::Online,
            0b011 => NodeStatus::Offline,
            _ => NodeStatus::Unknown,
        }
    }

    pub fn is_online(self) -> bool {
        matches!(self, NodeStatus::Active | NodeStatus::Online)
    }

    pub fn can_transition_to(self, next: NodeStatus) -> bool {
        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (_, NodeStatus::Offline)
                | (NodeStatus::Unknown, NodeStatus::Active)
                | (NodeStatus::Active, NodeStatus::Online)
                | (NodeStatus::Online, NodeStatus::Active)
                | (NodeStatus::Offline, NodeStatus::Active)
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Active => "Active",
            NodeStatus::Online => "Online",
            NodeStatus::Offline => "Offline",
            NodeStatus::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One known peer.
///
/// Identity is `(address, port)`. The `id` is a local ordinal, unique within a
/// registry. `last_contact` is milliseconds since the Unix epoch, `None` while
/// no contact has happened (or the sender did not know).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: u16,
    pub address: Ipv4Addr,
    pub port: u16,
    pub status: NodeStatus,
    pub last_contact: Option<u64>,
}

impl NodeRecord {
    /// A node that has never been contacted.
    pub fn new(id: u16, addr: SocketAddrV4) -> Self {
        Self {
            id,
            address: *addr.ip(),
            port: addr.port(),
            status: NodeStatus::Unknown,
            last_contact: None,
        }
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }

    /// Milliseconds elapsed since the last contact, if any.
    pub fn since_last_contact(&self, now: u64) -> Option<u64> {
        self.last_contact.map(|last| now.saturating_sub(last))
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
