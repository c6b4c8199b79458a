//! Liveness Monitor
//!
//! Sweeps the registry on a fixed tick. This is the only place a node is
//! marked Offline; records are never removed.

use crate::codec::{NodeRecord, now_ms};
use crate::registry::NodeRegistry;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct LivenessMonitor {
    registry: Arc<NodeRegistry>,
    timeout: Duration,
    interval: Duration,
}

impl LivenessMonitor {
    pub fn new(registry: Arc<NodeRegistry>, timeout: Duration, interval: Duration) -> Self {
        Self {
            registry,
            timeout,
            interval,
        }
    }

    pub async fn run(self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    self.sweep(now_ms());
                }
            }
        }

        tracing::info!("Liveness monitor stopped");
    }

    /// Marks nodes silent for longer than the timeout as Offline.
    pub fn sweep(&self, now: u64) -> Vec<NodeRecord> {
        let expired = self.registry.sweep_expired(now, self.timeout.as_millis() as u64);

        for node in &expired {
            tracing::warn!(
                "Node {} at {} is offline (no contact for {} ms)",
                node.id,
                node.socket_addr(),
                node.since_last_contact(now).unwrap_or_default()
            );
        }

        expired
    }
}
