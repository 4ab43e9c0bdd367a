//! Ledger client
//!
//! Talks to one replica over TCP and carries its own causal context: every
//! clock a replica returns is merged into it, and it is attached to every
//! user request.

use std::time::Duration;

use ledger_core::{AccountId, Amount, Balance, LedgerDump, LedgerError, LedgerResult, LogicalClock};
use ledger_transport::TcpTransport;
use ledger_wire::{Request, Response};

use crate::GossipReport;

/// Client bound to one replica address
#[derive(Clone, Debug)]
pub struct LedgerClient {
    transport: TcpTransport,
    address: String,
    context: LogicalClock,
}

impl LedgerClient {
    pub fn new(address: impl Into<String>, request_timeout: Duration) -> Self {
        LedgerClient {
            transport: TcpTransport::new(request_timeout),
            address: address.into(),
            context: LogicalClock::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Point the client at another replica, keeping its causal context
    pub fn switch_to(&mut self, address: impl Into<String>) {
        self.address = address.into();
    }

    /// Everything this client has observed so far
    pub fn context(&self) -> &LogicalClock {
        &self.context
    }

    async fn call(&self, request: Request) -> LedgerResult<Response> {
        let reply = self
            .transport
            .request(&self.address, &request.to_frame()?)
            .await?;
        Response::from_frame(&reply)?.into_result()
    }

    async fn write(&mut self, request: Request) -> LedgerResult<()> {
        match self.call(request).await? {
            Response::Clock { clock } => {
                self.context.merge(&clock);
                Ok(())
            }
            other => Err(unexpected(&other)),
        }
    }

    pub async fn create_account(&mut self, account: impl Into<AccountId>) -> LedgerResult<()> {
        let request = Request::CreateAccount {
            account: account.into(),
            context: self.context.clone(),
        };
        self.write(request).await
    }

    pub async fn delete_account(&mut self, account: impl Into<AccountId>) -> LedgerResult<()> {
        let request = Request::DeleteAccount {
            account: account.into(),
            context: self.context.clone(),
        };
        self.write(request).await
    }

    pub async fn transfer_to(
        &mut self,
        from: impl Into<AccountId>,
        to: impl Into<AccountId>,
        amount: Amount,
    ) -> LedgerResult<()> {
        let request = Request::TransferTo {
            from: from.into(),
            to: to.into(),
            amount,
            context: self.context.clone(),
        };
        self.write(request).await
    }

    pub async fn balance(&mut self, account: impl Into<AccountId>) -> LedgerResult<Balance> {
        let request = Request::Balance {
            account: account.into(),
            context: self.context.clone(),
        };
        match self.call(request).await? {
            Response::Balance { balance, clock } => {
                self.context.merge(&clock);
                Ok(balance)
            }
            other => Err(unexpected(&other)),
        }
    }

    pub async fn activate(&self) -> LedgerResult<()> {
        self.admin(Request::Activate).await
    }

    pub async fn deactivate(&self) -> LedgerResult<()> {
        self.admin(Request::Deactivate).await
    }

    async fn admin(&self, request: Request) -> LedgerResult<()> {
        match self.call(request).await? {
            Response::Ack => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn dump_ledger_state(&self) -> LedgerResult<LedgerDump> {
        match self.call(Request::DumpLedgerState).await? {
            Response::LedgerState(dump) => Ok(dump),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn trigger_gossip(&self) -> LedgerResult<GossipReport> {
        match self.call(Request::TriggerGossip).await? {
            Response::Gossip {
                attempted,
                delivered,
                failed,
            } => Ok(GossipReport {
                attempted,
                delivered,
                failed,
            }),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &Response) -> LedgerError {
    LedgerError::UnexpectedResponse(format!("{:?}", response.kind()))
}
