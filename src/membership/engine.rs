//! Protocol Engine
//!
//! Turns received datagrams into registry updates. Each datagram is decoded,
//! dispatched on its packet type and applied:
//!
//! - **INIT**: the sender is registered and told where it sits (the only
//!   request/response exchange in the protocol).
//! - **STATUS**: the carried node records are merged, then the sender is refreshed.
//! - **RAW**: applied to this node's topology when it carries an assignment.
//! - **Everything else**: a liveness signal for the sender.
//!
//! Undecodable datagrams are logged and dropped without touching any state.

use super::handshake::{Assignment, Placement, Topology};
use crate::codec::{NodeRecord, NodeStatus, Packet, PacketType, decode, encode, now_ms};
use crate::config::{RECV_BUFFER_SIZE, Role};
use crate::registry::{MergeSummary, NodeRegistry};
use crate::transport::Transport;

use anyhow::Result;
use parking_lot::Mutex;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Identity this node puts in its packet headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalNode {
    pub id: u16,
    pub addr: SocketAddrV4,
}

impl LocalNode {
    pub fn record(&self, now: u64) -> NodeRecord {
        NodeRecord {
            status: NodeStatus::Active,
            last_contact: Some(now),
            ..NodeRecord::new(self.id, self.addr)
        }
    }
}

/// What handling one datagram did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Dropped,
    Refreshed(NodeRecord),
    Merged {
        sender: NodeRecord,
        summary: MergeSummary,
    },
    Joined {
        joiner: NodeRecord,
        assignment: Assignment,
    },
    Assigned(Assignment),
}

pub struct ProtocolEngine<T> {
    registry: Arc<NodeRegistry>,
    transport: Arc<T>,
    local: LocalNode,
    role: Role,
    topology: Mutex<Topology>,
}

impl<T: Transport> ProtocolEngine<T> {
    pub fn new(
        registry: Arc<NodeRegistry>,
        transport: Arc<T>,
        local: LocalNode,
        role: Role,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            transport,
            local,
            role,
            topology: Mutex::new(Topology::default()),
        })
    }

    pub fn local(&self) -> LocalNode {
        self.local
    }

    pub fn topology(&self) -> Topology {
        self.topology.lock().clone()
    }

    /// Receives and dispatches datagrams until `token` is cancelled.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        match self.transport.local_addr() {
            Ok(addr) => tracing::info!("Receive loop started on {}", addr),
            Err(e) => tracing::warn!("Receive loop started, local address unavailable: {}", e),
        }
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    break;
                }
                received = self.transport.recv_from(&mut buf) => match received {
                    Ok((len, src)) => {
                        self.handle_datagram(&buf[..len], src).await;
                    }
                    Err(e) => {
                        tracing::error!("Failed to receive UDP packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        tracing::info!("Receive loop stopped");
    }

    pub async fn handle_datagram(&self, bytes: &[u8], src: SocketAddr) -> Dispatch {
        let SocketAddr::V4(sender) = src else {
            tracing::warn!("Dropping datagram from non-IPv4 sender {}", src);
            return Dispatch::Dropped;
        };

        if sender == self.local.addr {
            tracing::trace!("Ignoring datagram from self");
            return Dispatch::Dropped;
        }

        let packet = match decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!("Dropping datagram from {}: {}", sender, e);
                return Dispatch::Dropped;
            }
        };

        tracing::debug!(
            "Received {} from {} (id={}, {} bytes)",
            packet.packet_type(),
            sender,
            packet.source_id(),
            packet.data_length()
        );

        let now = now_ms();

        match packet.packet_type() {
            PacketType::Init => self.handle_join(sender, now).await,
            PacketType::Status => self.handle_status(&packet, sender, now),
            PacketType::Raw => match Assignment::from_packet(&packet, now) {
                Some(assignment) => self.handle_assignment(assignment, sender, now),
                None => Dispatch::Refreshed(self.registry.upsert_by_sender(sender, now)),
            },
            PacketType::Ping
            | PacketType::Ack
            | PacketType::Crq
            | PacketType::Csum
            | PacketType::Resend => {
                Dispatch::Refreshed(self.registry.upsert_by_sender(sender, now))
            }
        }
    }

    /// Client side of the handshake: sends INIT to `target` and waits for the
    /// assignment. Other traffic arriving meanwhile is dispatched as usual.
    pub async fn join(&self, target: SocketAddrV4, timeout: Duration) -> Result<Assignment> {
        let init = Packet::signal(self.local.id, *self.local.addr.ip(), PacketType::Init);
        self.transport.send_to(&encode(&init), SocketAddr::V4(target)).await?;

        tracing::info!("Sent join request to {}", target);

        tokio::time::timeout(timeout, self.await_assignment(target))
            .await
            .map_err(|_| anyhow::anyhow!("No assignment from {} within {:?}", target, timeout))?
    }

    async fn await_assignment(&self, target: SocketAddrV4) -> Result<Assignment> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let (len, src) = self.transport.recv_from(&mut buf).await?;
            let dispatch = self.handle_datagram(&buf[..len], src).await;

            if let Dispatch::Assigned(assignment) = dispatch
                && src == SocketAddr::V4(target)
            {
                return Ok(assignment);
            }
        }
    }

    async fn handle_join(&self, sender: SocketAddrV4, now: u64) -> Dispatch {
        let joiner = self.registry.upsert_by_sender(sender, now);

        let (assignment, notice) = match self.role {
            Role::Server => (
                Assignment::Server {
                    server: self.local.record(now),
                },
                None,
            ),
            Role::P2p | Role::Client => {
                let placement = self.topology.lock().place(self.local.addr, sender);
                self.peer_assignment(placement, now)
            }
        };

        tracing::info!(
            "Node {} at {} joined, assigned parent {}",
            joiner.id,
            sender,
            assignment.parent().socket_addr()
        );

        self.send_assignment(&assignment, sender, now).await;

        if let Some((target, notice)) = notice {
            self.send_assignment(&notice, target, now).await;
        }

        Dispatch::Joined { joiner, assignment }
    }

    fn handle_status(&self, packet: &Packet, sender: SocketAddrV4, now: u64) -> Dispatch {
        let records = match packet.nodes(now) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Dropping STATUS from {}: {}", sender, e);
                return Dispatch::Dropped;
            }
        };

        let others: Vec<NodeRecord> = records
            .into_iter()
            .filter(|record| record.socket_addr() != self.local.addr)
            .collect();

        let summary = self.registry.merge_status_fields(&others);
        let sender = self.registry.upsert_by_sender(sender, now);

        tracing::debug!(
            "Merged STATUS from {}: {} added, {} updated",
            sender.socket_addr(),
            summary.added,
            summary.updated
        );

        Dispatch::Merged { sender, summary }
    }

    fn handle_assignment(
        &self,
        assignment: Assignment,
        sender: SocketAddrV4,
        now: u64,
    ) -> Dispatch {
        self.topology.lock().apply(&assignment);

        let others: Vec<NodeRecord> = assignment
            .nodes()
            .into_iter()
            .filter(|record| record.socket_addr() != self.local.addr)
            .collect();
        self.registry.merge_status_fields(&others);
        self.registry.upsert_by_sender(sender, now);

        tracing::info!(
            "Assigned by {}: parent {}",
            sender,
            assignment.parent().socket_addr()
        );

        Dispatch::Assigned(assignment)
    }

    fn peer_assignment(
        &self,
        placement: Placement,
        now: u64,
    ) -> (Assignment, Option<(SocketAddrV4, Assignment)>) {
        let assignment = Assignment::Peer {
            parent: self.record_for(placement.parent, now),
            child: placement.child.map(|child| self.record_for(child, now)),
        };

        let notice = placement.notify.map(|notice| {
            (
                notice.target,
                Assignment::Peer {
                    parent: self.record_for(notice.parent, now),
                    child: Some(self.record_for(notice.child, now)),
                },
            )
        });

        (assignment, notice)
    }

    fn record_for(&self, addr: SocketAddrV4, now: u64) -> NodeRecord {
        if addr == self.local.addr {
            return self.local.record(now);
        }
        self.registry
            .get(addr)
            .unwrap_or_else(|| NodeRecord::new(self.registry.next_free_id(), addr))
    }

    async fn send_assignment(&self, assignment: &Assignment, target: SocketAddrV4, now: u64) {
        let packet = match assignment.to_packet(self.local.id, *self.local.addr.ip(), now) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::error!("Failed to build assignment for {}: {}", target, e);
                return;
            }
        };

        if let Err(e) = self.transport.send_to(&encode(&packet), SocketAddr::V4(target)).await {
            tracing::warn!("Failed to send assignment to {}: {}", target, e);
        }
    }
}
