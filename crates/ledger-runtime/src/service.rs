//! Request dispatcher
//!
//! Maps decoded requests onto the replica and its coordinator and turns
//! every `LedgerError` into an error response carrying its numeric code.
//! Writes reply as soon as they are committed locally; the gossip round they
//! start runs in the background.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ledger_core::{LedgerResult, LogicalClock};
use ledger_wire::{Frame, Request, Response};

use crate::{GossipReport, NodeConfig, PeerTransport, Registry, Replica, ReplicationCoordinator};

/// Handles user, admin and replica requests for one replica
pub struct LedgerService<T> {
    coordinator: Arc<ReplicationCoordinator<T>>,
    gossip_on_write: bool,
    /// Gossip rounds started by writes and not yet awaited
    background: Mutex<Vec<JoinHandle<GossipReport>>>,
}

impl<T: PeerTransport> LedgerService<T> {
    pub fn new(coordinator: ReplicationCoordinator<T>, gossip_on_write: bool) -> Self {
        LedgerService {
            coordinator: Arc::new(coordinator),
            gossip_on_write,
            background: Mutex::new(Vec::new()),
        }
    }

    /// Build a fresh replica and its coordinator from a node configuration
    pub fn from_config(config: &NodeConfig, registry: Arc<dyn Registry>, transport: T) -> Self {
        let replica = Replica::new(config.replica_id.clone(), config.replica_config());
        let coordinator = ReplicationCoordinator::new(replica, registry, transport, config);
        LedgerService::new(coordinator, config.gossip_on_write)
    }

    pub fn replica(&self) -> &Replica {
        self.coordinator.replica()
    }

    pub fn coordinator(&self) -> &ReplicationCoordinator<T> {
        &self.coordinator
    }

    /// Handle one request; errors become `Response::Error`
    pub async fn handle(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(replica = %self.replica().id(), code = e.code(), error = %e, "request failed");
                Response::from_error(&e)
            }
        }
    }

    /// Decode, handle and encode one frame
    pub async fn handle_frame(&self, frame: &Frame) -> LedgerResult<Frame> {
        let response = match Request::from_frame(frame) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::from_error(&e),
        };
        response.to_frame()
    }

    async fn dispatch(&self, request: Request) -> LedgerResult<Response> {
        let replica = self.replica();
        match request {
            Request::CreateAccount { account, context } => {
                let clock = replica.create_account(account, &context)?;
                self.after_write(clock)
            }
            Request::DeleteAccount { account, context } => {
                let clock = replica.delete_account(account, &context)?;
                self.after_write(clock)
            }
            Request::TransferTo {
                from,
                to,
                amount,
                context,
            } => {
                let clock = replica.transfer(from, to, amount, &context)?;
                self.after_write(clock)
            }
            Request::Balance { account, context } => {
                let (balance, clock) = replica.read(account.as_str(), &context)?;
                Ok(Response::Balance { balance, clock })
            }
            Request::Activate => {
                replica.activate();
                Ok(Response::Ack)
            }
            Request::Deactivate => {
                replica.deactivate();
                Ok(Response::Ack)
            }
            Request::DumpLedgerState => Ok(Response::LedgerState(replica.dump())),
            Request::TriggerGossip => {
                info!(replica = %replica.id(), "gossip triggered");
                let report = self.coordinator.gossip().await;
                Ok(Response::Gossip {
                    attempted: report.attempted,
                    delivered: report.delivered,
                    failed: report.failed,
                })
            }
            Request::PushLedgerSnapshot { sender, operations } => {
                self.coordinator.receive(&sender, operations);
                Ok(Response::Ack)
            }
        }
    }

    /// The write is committed; propagation is best-effort and not awaited
    fn after_write(&self, clock: LogicalClock) -> LedgerResult<Response> {
        if self.gossip_on_write {
            let coordinator = self.coordinator.clone();
            let round = tokio::spawn(async move { coordinator.gossip().await });

            let mut background = self.background.lock();
            background.retain(|h| !h.is_finished());
            background.push(round);
        }
        Ok(Response::Clock { clock })
    }

    /// Await the write-triggered gossip rounds still tracked
    ///
    /// Rounds that finished before a later write are pruned without a report.
    pub async fn wait_for_gossip(&self) -> Vec<GossipReport> {
        let rounds = std::mem::take(&mut *self.background.lock());
        let mut reports = Vec::with_capacity(rounds.len());
        for round in rounds {
            match round.await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(replica = %self.replica().id(), error = %e, "gossip round task failed"),
            }
        }
        reports
    }
}
