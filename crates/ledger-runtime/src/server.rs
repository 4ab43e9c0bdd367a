//! TCP server for one replica

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ledger_core::LedgerResult;
use ledger_transport::{start_accept_loop, FrameStream, TcpServerTransport};

use crate::{LedgerService, NodeConfig, PeerTransport, Registry};

/// Pending connections buffered between the accept loop and the server
const ACCEPT_BUFFER: usize = 64;

/// A running replica server
///
/// Registers itself in the registry on start and unregisters on shutdown.
pub struct ReplicaServer<T> {
    local_addr: SocketAddr,
    service: Arc<LedgerService<T>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl<T: PeerTransport> ReplicaServer<T> {
    /// Bind, register and start serving
    pub async fn start(
        config: &NodeConfig,
        service: LedgerService<T>,
        registry: Arc<dyn Registry>,
    ) -> LedgerResult<Self> {
        let transport = TcpServerTransport::bind(&config.bind_addr).await?;
        let local_addr = transport.local_addr();
        let address = local_addr.to_string();

        registry.register(&config.service_name, &address, &config.qualifier)?;
        info!(
            replica = %config.replica_id,
            %address,
            qualifier = %config.qualifier,
            "replica server started"
        );

        let service = Arc::new(service);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let mut incoming = start_accept_loop(transport, ACCEPT_BUFFER);

        let task = {
            let service = service.clone();
            let service_name = config.service_name.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => break,
                        conn = incoming.recv() => match conn {
                            Some(conn) => {
                                tokio::spawn(serve_connection(service.clone(), conn));
                            }
                            None => break,
                        },
                    }
                }

                if let Err(e) = registry.unregister(&service_name, &address) {
                    warn!(%address, error = %e, "failed to unregister replica");
                }
                info!(%address, "replica server stopped");
            })
        };

        Ok(ReplicaServer {
            local_addr,
            service,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn service(&self) -> &LedgerService<T> {
        &self.service
    }

    /// Stop accepting connections and unregister
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "server task failed");
        }
    }
}

async fn serve_connection<T: PeerTransport>(service: Arc<LedgerService<T>>, mut conn: FrameStream) {
    let peer = conn.peer_addr();
    debug!(%peer, "connection accepted");

    loop {
        let frame = match conn.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!(%peer, error = %e, "dropping connection on bad frame");
                break;
            }
        };

        let reply = match service.handle_frame(&frame).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%peer, error = %e, "failed to encode reply");
                break;
            }
        };

        if let Err(e) = conn.send(&reply).await {
            debug!(%peer, error = %e, "failed to send reply");
            break;
        }
    }

    debug!(%peer, "connection closed");
}
