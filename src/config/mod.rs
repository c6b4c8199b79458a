//! Node Configuration
//!
//! Protocol constants, the runtime `NodeConfig` and the seed-file loader.
//! The binary fills `NodeConfig` from command-line flags; everything not
//! given falls back to the constants below.

pub mod seeds;

pub use seeds::{SeedError, load_seed_file, parse_seeds};

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9876;
/// Silence longer than this marks a node Offline.
pub const NODE_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Heartbeats go out after a uniformly random delay in `[0, MAX_HEARTBEAT_JITTER]`.
pub const MAX_HEARTBEAT_JITTER: Duration = Duration::from_millis(30_000);
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(1_000);
pub const STATS_INTERVAL: Duration = Duration::from_secs(5);
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(2_000);
pub const JOIN_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const RECV_BUFFER_SIZE: usize = 65_536;

/// Which side of the join handshake this node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    /// Accepts joins and tells every client to report to it.
    Server,
    /// Accepts joins and links joiners into a parent/child chain.
    P2p,
    /// Joins a server or peer on start-up.
    Client,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub role: Role,
    pub bind: SocketAddrV4,
    /// Address written into outgoing packet headers. Discovered when unset.
    pub advertise: Option<Ipv4Addr>,
    pub local_id: u16,
    pub seed_file: Option<PathBuf>,
    /// Where a client sends its INIT.
    pub server: Option<SocketAddrV4>,
    pub node_timeout: Duration,
    pub heartbeat_jitter: Duration,
    pub sweep_interval: Duration,
    pub stats_interval: Duration,
    pub shutdown_grace: Duration,
    pub join_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: Role::P2p,
            bind: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT),
            advertise: None,
            local_id: 0,
            seed_file: None,
            server: None,
            node_timeout: NODE_TIMEOUT,
            heartbeat_jitter: MAX_HEARTBEAT_JITTER,
            sweep_interval: SWEEP_INTERVAL,
            stats_interval: STATS_INTERVAL,
            shutdown_grace: SHUTDOWN_GRACE,
            join_timeout: JOIN_TIMEOUT,
        }
    }
}

impl NodeConfig {
    /// The address peers should know this node by.
    ///
    /// Uses the explicit `advertise` address, then a concrete bind address,
    /// then the address of the interface holding the default route (found by
    /// connecting an unbound UDP socket; nothing is sent).
    pub fn advertise_address(&self) -> Ipv4Addr {
        if let Some(address) = self.advertise {
            return address;
        }
        if !self.bind.ip().is_unspecified() {
            return *self.bind.ip();
        }

        let discovered = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .and_then(|socket| {
                socket.connect((Ipv4Addr::new(8, 8, 8, 8), 10_002))?;
                socket.local_addr()
            })
            .ok()
            .and_then(|addr| match addr.ip() {
                std::net::IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
                _ => None,
            });

        discovered.unwrap_or_else(|| {
            tracing::warn!("Could not discover this node's address, using loopback");
            Ipv4Addr::LOCALHOST
        })
    }
}
