//! HAC Node Library
//!
//! Peer discovery and liveness tracking over UDP. Every node keeps a table of
//! the nodes it knows about, periodically sends that table to all of them and
//! marks a node Offline once it has been silent for too long.
//!
//! ## Architecture Modules
//!
//! - **`codec`**: The binary wire format. 12-byte packet headers, eight one-hot
//!   packet types and 16-byte node records carrying time-since-last-contact.
//! - **`registry`**: The shared node table. Sender refresh, STATUS merging,
//!   expiry sweeps and id assignment all go through one lock.
//! - **`membership`**: The running protocol. Receive/dispatch engine, the
//!   JOIN/INIT handshake, the jittered heartbeat and the liveness monitor,
//!   wired together by `NodeService`.
//! - **`transport`**: The datagram seam the protocol sends and receives through.
//! - **`config`**: Protocol constants, node configuration and the seed file.

pub mod codec;
pub mod config;
pub mod membership;
pub mod registry;
pub mod transport;
