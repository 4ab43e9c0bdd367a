//! Push-based gossip
//!
//! After a write, the coordinator snapshots the whole local log and pushes it
//! to every peer found in the registry. Peers merge it idempotently, so a
//! failed or repeated push is harmless; the next write retries implicitly.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use ledger_core::{LedgerError, LedgerResult, Operation, ReplicaId};
use ledger_state::StabilizeReport;
use ledger_transport::TcpTransport;
use ledger_wire::{Request, Response};

use crate::{NodeConfig, Registry, Replica, ServiceEntry};

/// Delivery of a log snapshot to one peer
pub trait PeerTransport: Clone + Send + Sync + 'static {
    fn push_snapshot(
        &self,
        address: &str,
        sender: &ReplicaId,
        ops: Vec<Operation>,
    ) -> impl Future<Output = LedgerResult<()>> + Send;
}

/// Outcome of one gossip round
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GossipReport {
    pub attempted: u32,
    pub delivered: u32,
    pub failed: u32,
}

/// Pushes snapshots to peers over the TCP transport
#[derive(Clone, Debug, Default)]
pub struct TcpPeerTransport {
    transport: TcpTransport,
}

impl TcpPeerTransport {
    pub fn new(request_timeout: Duration) -> Self {
        TcpPeerTransport {
            transport: TcpTransport::new(request_timeout),
        }
    }
}

impl PeerTransport for TcpPeerTransport {
    async fn push_snapshot(
        &self,
        address: &str,
        sender: &ReplicaId,
        ops: Vec<Operation>,
    ) -> LedgerResult<()> {
        let frame = Request::PushLedgerSnapshot {
            sender: sender.clone(),
            operations: ops,
        }
        .to_frame()?;

        let reply = self.transport.request(address, &frame).await?;
        match Response::from_frame(&reply)?.into_result()? {
            Response::Ack => Ok(()),
            other => Err(LedgerError::UnexpectedResponse(format!("{:?}", other.kind()))),
        }
    }
}

#[derive(Clone, Debug)]
struct LoopbackPeer {
    replica: Replica,
    reachable: bool,
    delay: Option<Duration>,
}

/// In-process transport delivering straight into registered replicas
#[derive(Clone, Debug, Default)]
pub struct LoopbackTransport {
    peers: Arc<RwLock<HashMap<String, LoopbackPeer>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        LoopbackTransport::default()
    }

    /// Attach a replica at an address
    pub fn attach(&self, address: impl Into<String>, replica: Replica) {
        self.peers.write().insert(
            address.into(),
            LoopbackPeer {
                replica,
                reachable: true,
                delay: None,
            },
        );
    }

    /// Cut or restore delivery to an address
    pub fn set_reachable(&self, address: &str, reachable: bool) {
        if let Some(peer) = self.peers.write().get_mut(address) {
            peer.reachable = reachable;
        }
    }

    /// Hold every delivery to an address for `delay`
    pub fn set_delay(&self, address: &str, delay: Option<Duration>) {
        if let Some(peer) = self.peers.write().get_mut(address) {
            peer.delay = delay;
        }
    }
}

impl PeerTransport for LoopbackTransport {
    async fn push_snapshot(
        &self,
        address: &str,
        sender: &ReplicaId,
        ops: Vec<Operation>,
    ) -> LedgerResult<()> {
        let peer = self.peers.read().get(address).cloned();
        let peer = match peer {
            Some(peer) if peer.reachable => peer,
            _ => return Err(LedgerError::ConnectionFailed(address.to_owned())),
        };

        if let Some(delay) = peer.delay {
            tokio::time::sleep(delay).await;
        }

        let report = peer.replica.merge_remote(ops);
        debug!(%sender, to = %peer.replica.id(), inserted = report.inserted, "loopback snapshot delivered");
        Ok(())
    }
}

/// Replicates the local log to peer replicas
pub struct ReplicationCoordinator<T> {
    replica: Replica,
    registry: Arc<dyn Registry>,
    transport: T,
    service_name: String,
    qualifier: String,
    timeout: Duration,
}

impl<T: PeerTransport> ReplicationCoordinator<T> {
    pub fn new(
        replica: Replica,
        registry: Arc<dyn Registry>,
        transport: T,
        config: &NodeConfig,
    ) -> Self {
        ReplicationCoordinator {
            replica,
            registry,
            transport,
            service_name: config.service_name.clone(),
            qualifier: config.qualifier.clone(),
            timeout: config.gossip_timeout,
        }
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Peers known to the registry, excluding this replica
    pub fn peers(&self) -> LedgerResult<Vec<ServiceEntry>> {
        let mut peers = self.registry.lookup(&self.service_name, None)?;
        peers.retain(|p| p.qualifier != self.qualifier);
        Ok(peers)
    }

    /// Push the full local log to every peer
    ///
    /// Never fails: unreachable peers and registry errors are logged and counted.
    pub async fn gossip(&self) -> GossipReport {
        let mut report = GossipReport::default();

        let peers = match self.peers() {
            Ok(peers) => peers,
            Err(e) => {
                warn!(replica = %self.replica.id(), error = %e, "peer lookup failed");
                return report;
            }
        };
        if peers.is_empty() {
            return report;
        }

        // Snapshot under the lock, push without it
        let snapshot = self.replica.snapshot();
        let mut pushes = JoinSet::new();

        for peer in peers {
            report.attempted += 1;
            let transport = self.transport.clone();
            let sender = self.replica.id().clone();
            let ops = snapshot.clone();
            let timeout = self.timeout;

            pushes.spawn(async move {
                let pushed = tokio::time::timeout(
                    timeout,
                    transport.push_snapshot(&peer.address, &sender, ops),
                )
                .await;
                let result = match pushed {
                    Ok(result) => result,
                    Err(_) => Err(LedgerError::Timeout),
                };
                (peer, result)
            });
        }

        while let Some(joined) = pushes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.delivered += 1,
                Ok((peer, Err(e))) => {
                    report.failed += 1;
                    warn!(
                        replica = %self.replica.id(),
                        peer = %peer.qualifier,
                        address = %peer.address,
                        error = %e,
                        "snapshot push failed"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(replica = %self.replica.id(), error = %e, "snapshot push task failed");
                }
            }
        }

        debug!(
            replica = %self.replica.id(),
            ops = snapshot.len(),
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "gossip round finished"
        );
        report
    }

    /// Merge a snapshot pushed by a peer
    pub fn receive(&self, sender: &ReplicaId, ops: Vec<Operation>) -> StabilizeReport {
        let count = ops.len();
        let report = self.replica.merge_remote(ops);
        debug!(replica = %self.replica.id(), %sender, ops = count, promoted = report.promoted, "snapshot received");
        report
    }
}
