//! Node Registry
//!
//! The authoritative table of known peers and their liveness state.
//!
//! Every operation takes the registry's single lock for its own duration
//! only, so the receive loop, the heartbeat and the sweeper never observe a
//! half-updated record and never hold the lock across network I/O.

pub mod registry;

pub use registry::{MergeSummary, NodeRegistry};
