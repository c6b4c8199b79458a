//! Heartbeat Scheduler
//!
//! After a uniformly random delay (so nodes across the fleet do not fire in
//! lockstep) the whole registry is snapshotted into one STATUS packet and sent
//! to every known node. A failed send is logged and skipped: it says nothing
//! about the peer's liveness, which is judged only by what we receive.

use super::engine::LocalNode;
use crate::codec::{CodecError, Packet, encode, now_ms};
use crate::registry::NodeRegistry;
use crate::transport::Transport;

use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of one heartbeat round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct HeartbeatScheduler<T> {
    registry: Arc<NodeRegistry>,
    transport: Arc<T>,
    local: LocalNode,
    max_jitter: Duration,
}

impl<T: Transport> HeartbeatScheduler<T> {
    pub fn new(
        registry: Arc<NodeRegistry>,
        transport: Arc<T>,
        local: LocalNode,
        max_jitter: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            local,
            max_jitter,
        }
    }

    /// Beats once immediately, then again after every random delay, until
    /// `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        tracing::info!("Heartbeat scheduler started");

        loop {
            if let Err(e) = self.beat().await {
                tracing::error!("Heartbeat skipped: {}", e);
            }

            let delay = self.next_delay();
            tracing::trace!("Next heartbeat in {:?}", delay);

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Heartbeat scheduler stopped");
    }

    /// Uniformly random in `[0, max_jitter]`.
    pub fn next_delay(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }

    /// Sends the current registry to every node in it.
    ///
    /// # Errors
    /// `MaxFieldCountExceeded` when the registry no longer fits in one STATUS
    /// packet. Nothing is sent in that case.
    pub async fn beat(&self) -> Result<HeartbeatReport, CodecError> {
        let now = now_ms();
        let snapshot = self.registry.list();

        let packet = Packet::status(self.local.id, *self.local.addr.ip(), &snapshot, now)?;
        let bytes = encode(&packet);
        let mut report = HeartbeatReport::default();

        for node in snapshot
            .iter()
            .filter(|node| node.socket_addr() != self.local.addr)
        {
            match self.transport.send_to(&bytes, SocketAddr::V4(node.socket_addr())).await {
                Ok(_) => report.sent += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to send heartbeat to node {} at {}: {}",
                        node.id,
                        node.socket_addr(),
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            "Heartbeat with {} fields: {} sent, {} failed",
            snapshot.len(),
            report.sent,
            report.failed
        );

        Ok(report)
    }
}
