use crate::codec::{NodeRecord, NodeStatus};

use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::SocketAddrV4;
use std::sync::Arc;

/// Outcome of applying one STATUS packet's records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
}

/// Table of known nodes keyed by `(address, port)`.
pub struct NodeRegistry {
    nodes: Mutex<Vec<NodeRecord>>,
}

impl NodeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Loads the initial peer list. Records whose address or id is already
    /// present are skipped. Returns how many were added.
    pub fn seed(&self, records: impl IntoIterator<Item = NodeRecord>) -> usize {
        let mut nodes = self.nodes.lock();
        let mut added = 0;

        for record in records {
            let taken = nodes.iter().any(|node| {
                node.id == record.id || node.socket_addr() == record.socket_addr()
            });
            if taken {
                tracing::warn!(
                    "Skipping seed node {} at {}: id or address already known",
                    record.id,
                    record.socket_addr()
                );
                continue;
            }
            nodes.push(record);
            added += 1;
        }

        added
    }

    /// Records contact from `addr`: refreshes an existing record or creates
    /// one with the smallest free id. Either way the node ends up `Active`.
    pub fn upsert_by_sender(&self, addr: SocketAddrV4, now: u64) -> NodeRecord {
        let mut nodes = self.nodes.lock();

        if let Some(node) = nodes.iter_mut().find(|node| node.socket_addr() == addr) {
            if node.status == NodeStatus::Offline {
                tracing::info!("Node {} at {} is back online", node.id, addr);
            }
            node.status = NodeStatus::Active;
            node.last_contact = node.last_contact.max(Some(now));
            return *node;
        }

        let record = NodeRecord {
            status: NodeStatus::Active,
            last_contact: Some(now),
            ..NodeRecord::new(smallest_free_id(&nodes), addr)
        };
        nodes.push(record);

        tracing::info!("Discovered new node {} at {}", record.id, addr);

        record
    }

    /// Applies the records carried by a peer's STATUS packet.
    ///
    /// A known node takes the peer's id (unless another local node already
    /// holds it) and the peer's status when the peer heard from it at least
    /// as recently as we did and the transition is allowed. `last_contact`
    /// only ever moves forward. Unknown nodes are inserted,
    /// keeping the peer's id when it is free.
    pub fn merge_status_fields(&self, peer_records: &[NodeRecord]) -> MergeSummary {
        let mut nodes = self.nodes.lock();
        let mut summary = MergeSummary::default();

        for incoming in peer_records {
            let addr = incoming.socket_addr();

            let Some(index) = nodes.iter().position(|node| node.socket_addr() == addr) else {
                let id = if id_in_use(&nodes, incoming.id, None) {
                    smallest_free_id(&nodes)
                } else {
                    incoming.id
                };
                let record = NodeRecord { id, ..*incoming };
                nodes.push(record);
                summary.added += 1;

                tracing::info!("Learned about node {} at {} from peer", id, addr);
                continue;
            };

            let before = nodes[index];
            let id_taken = id_in_use(&nodes, incoming.id, Some(index));
            let local = &mut nodes[index];

            if incoming.id != local.id {
                if id_taken {
                    tracing::debug!(
                        "Keeping id {} for {}: peer id {} is held by another node",
                        local.id,
                        addr,
                        incoming.id
                    );
                } else {
                    local.id = incoming.id;
                }
            }

            let peer_is_current = incoming.last_contact >= local.last_contact;
            if peer_is_current && local.status.can_transition_to(incoming.status) {
                local.status = incoming.status;
            } else if incoming.status != local.status {
                tracing::trace!(
                    "Ignoring {} -> {} for {}: local contact is newer or transition not allowed",
                    local.status,
                    incoming.status,
                    addr
                );
            }

            local.last_contact = local.last_contact.max(incoming.last_contact);

            if *local != before {
                summary.updated += 1;
            }
        }

        summary
    }

    /// Marks every node silent for longer than `timeout_ms` as `Offline` and
    /// returns the nodes that changed. Nodes never contacted are left alone.
    pub fn sweep_expired(&self, now: u64, timeout_ms: u64) -> Vec<NodeRecord> {
        let mut nodes = self.nodes.lock();
        let mut expired = Vec::new();

        for node in nodes.iter_mut() {
            if node.status == NodeStatus::Offline {
                continue;
            }
            if let Some(elapsed) = node.since_last_contact(now)
                && elapsed > timeout_ms
            {
                node.status = NodeStatus::Offline;
                expired.push(*node);
            }
        }

        expired
    }

    /// Sorts by id (stable) and reassigns dense ids `0..n`.
    pub fn renumber(&self) {
        let mut nodes = self.nodes.lock();

        nodes.sort_by_key(|node| node.id);
        for (index, node) in nodes.iter_mut().enumerate() {
            node.id = index as u16;
        }
    }

    /// Consistent snapshot of every record.
    pub fn list(&self) -> Vec<NodeRecord> {
        self.nodes.lock().clone()
    }

    pub fn get(&self, addr: SocketAddrV4) -> Option<NodeRecord> {
        self.nodes
            .lock()
            .iter()
            .find(|node| node.socket_addr() == addr)
            .copied()
    }

    /// Administrative removal. The protocol itself never deletes nodes.
    pub fn remove(&self, addr: SocketAddrV4) -> Option<NodeRecord> {
        let mut nodes = self.nodes.lock();
        let index = nodes.iter().position(|node| node.socket_addr() == addr)?;
        Some(nodes.remove(index))
    }

    /// The id a node created now would get.
    pub fn next_free_id(&self) -> u16 {
        smallest_free_id(&self.nodes.lock())
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
        }
    }
}

fn id_in_use(nodes: &[NodeRecord], id: u16, except: Option<usize>) -> bool {
    nodes
        .iter()
        .enumerate()
        .any(|(index, node)| node.id == id && Some(index) != except)
}

fn smallest_free_id(nodes: &[NodeRecord]) -> u16 {
    let used: HashSet<u16> = nodes.iter().map(|node| node.id).collect();
    (0..=u16::MAX)
        .find(|id| !used.contains(id))
        .unwrap_or(u16::MAX)
}
