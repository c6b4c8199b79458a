use super::engine::{LocalNode, ProtocolEngine};
use super::heartbeat::HeartbeatScheduler;
use super::liveness::LivenessMonitor;
use crate::codec::{NodeRecord, now_ms};
use crate::config::{NodeConfig, Role, load_seed_file};
use crate::registry::NodeRegistry;

use anyhow::{Context, Result};
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A running HAC node: one socket, one registry and the activities sharing them.
pub struct NodeService {
    config: NodeConfig,
    local: LocalNode,
    registry: Arc<NodeRegistry>,
    socket: Arc<UdpSocket>,
    engine: Arc<ProtocolEngine<UdpSocket>>,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl NodeService {
    /// Binds the socket and seeds the registry. Failing to bind is the one
    /// fatal start-up error.
    pub async fn bind(config: NodeConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind)
            .await
            .with_context(|| format!("failed to bind {}", config.bind))?;

        let port = socket.local_addr()?.port();
        let local = LocalNode {
            id: config.local_id,
            addr: SocketAddrV4::new(config.advertise_address(), port),
        };

        let registry = NodeRegistry::new();
        if let Some(path) = &config.seed_file {
            match load_seed_file(path) {
                Ok(seeds) => {
                    let seeds = seeds
                        .into_iter()
                        .filter(|node| node.socket_addr() != local.addr);
                    registry.seed(seeds);
                }
                Err(e) => tracing::warn!("Starting without seed nodes: {}", e),
            }
        }

        if let Some(server) = config.server {
            let next_id = registry
                .list()
                .iter()
                .map(|node| node.id.saturating_add(1))
                .max()
                .unwrap_or(0);
            registry.seed([NodeRecord::new(next_id, server)]);
        }

        let socket = Arc::new(socket);
        let engine = ProtocolEngine::new(registry.clone(), socket.clone(), local, config.role);

        Ok(Self {
            config,
            local,
            registry,
            socket,
            engine,
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn local(&self) -> LocalNode {
        self.local
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn registry(&self) -> Arc<NodeRegistry> {
        self.registry.clone()
    }

    pub fn engine(&self) -> Arc<ProtocolEngine<UdpSocket>> {
        self.engine.clone()
    }

    /// Runs the client handshake when configured, then spawns the receive
    /// loop, the heartbeat, the liveness sweep and the stats reporter.
    pub async fn start(&self) {
        tracing::info!(
            "Starting {:?} node {} on {}",
            self.config.role,
            self.local.id,
            self.local.addr
        );

        if self.config.role == Role::Client {
            match self.config.server {
                Some(server) => match self.engine.join(server, self.config.join_timeout).await {
                    Ok(assignment) => tracing::info!("Joined cluster: {:?}", assignment),
                    Err(e) => tracing::warn!("Join failed, continuing with heartbeats: {:#}", e),
                },
                None => tracing::warn!("Client role without a server address, skipping join"),
            }
        }

        self.tracker.spawn(self.engine.clone().run(self.token.clone()));

        let heartbeat = HeartbeatScheduler::new(
            self.registry.clone(),
            self.socket.clone(),
            self.local,
            self.config.heartbeat_jitter,
        );
        self.tracker.spawn(heartbeat.run(self.token.clone()));

        let liveness = LivenessMonitor::new(
            self.registry.clone(),
            self.config.node_timeout,
            self.config.sweep_interval,
        );
        self.tracker.spawn(liveness.run(self.token.clone()));

        self.tracker.spawn(stats_loop(
            self.registry.clone(),
            self.config.stats_interval,
            self.token.clone(),
        ));

        tracing::info!("All background tasks started");
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels every activity and waits up to the grace period for them to
    /// exit. The socket is released when the last activity holding it is gone.
    /// Returns whether every activity exited within the grace period.
    pub async fn shutdown(self) -> bool {
        tracing::info!("Shutting down");

        self.token.cancel();
        self.tracker.close();

        let finished = tokio::time::timeout(self.config.shutdown_grace, self.tracker.wait())
            .await
            .is_ok();

        drop(self.engine);
        drop(self.socket);

        if finished {
            tracing::info!("Socket closed");
        } else {
            tracing::warn!(
                "Background tasks still running after {:?}, socket is released when they exit",
                self.config.shutdown_grace
            );
        }

        finished
    }
}

async fn stats_loop(
    registry: Arc<NodeRegistry>,
    period: std::time::Duration,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        registry.renumber();
        let now = now_ms();
        let nodes = registry.list();
        let online = nodes.iter().filter(|node| node.status.is_online()).count();

        tracing::info!("Cluster stats: {} known, {} online", nodes.len(), online);
        for node in nodes {
            match node.since_last_contact(now) {
                Some(elapsed) => tracing::info!(
                    "  - {} {} {} (last contact {} ms ago)",
                    node.id,
                    node.socket_addr(),
                    node.status,
                    elapsed
                ),
                None => tracing::info!(
                    "  - {} {} {} (never contacted)",
                    node.id,
                    node.socket_addr(),
                    node.status
                ),
            }
        }
    }
}
