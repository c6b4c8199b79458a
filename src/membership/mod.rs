//! Membership & Liveness Module
//!
//! Keeps every node's view of the cluster current over best-effort UDP.
//!
//! ## Core Mechanisms
//! - **Join Handshake**: a new node sends INIT and is told who to report to
//!   (the server, or its parent and child in a peer chain).
//! - **State Transfer**: every node periodically pushes its whole registry as
//!   a STATUS packet to every node it knows; receivers merge it.
//! - **Failure Detection**: a node not heard from within the node timeout is
//!   marked Offline. It stays in the registry and keeps receiving heartbeats.
//!
//! The receive loop, heartbeat and liveness sweep run as independent tasks.
//! They share only the registry and a cancellation token.

pub mod engine;
pub mod handshake;
pub mod heartbeat;
pub mod liveness;
pub mod service;

pub use engine::{Dispatch, LocalNode, ProtocolEngine};
pub use handshake::{Assignment, Topology};
pub use heartbeat::{HeartbeatReport, HeartbeatScheduler};
pub use liveness::LivenessMonitor;
pub use service::NodeService;
