//! WebSocket Game Server
//!
//! Async WebSocket front end for the session service. Each accepted socket
//! gets a UUID connection id and an outbound queue registered with the local
//! push channel; a writer task drains that queue onto the socket.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::ServerConfig;
use crate::game::state::ConnectionId;
use crate::network::push::LocalPushChannel;
use crate::network::session::SessionService;
use crate::store::MemoryStore;

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Remote address.
    addr: SocketAddr,
    /// Connection time.
    connected_at: Instant,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Request handler.
    service: SessionService,
    /// Outbound queues.
    push: Arc<LocalPushChannel>,
    /// Backing store, swept for expired connections.
    store: Arc<MemoryStore>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>,
    /// One permit per connection, taken before the handshake.
    slots: Arc<Semaphore>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(
        config: ServerConfig,
        service: SessionService,
        push: Arc<LocalPushChannel>,
        store: Arc<MemoryStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            slots: Arc::new(Semaphore::new(config.max_connections)),
            config,
            service,
            push,
            store,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server v{} listening on {}", self.config.version, listener.local_addr()?);

        let sweep_store = self.store.clone();
        let sweep_every = self.config.sweep_interval;
        let sweep_handle = tokio::spawn(async move {
            Self::run_sweep_loop(sweep_store, sweep_every).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let permit = match self.slots.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!("Connection limit reached, rejecting {}", addr);
                                    continue;
                                }
                            };

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr, permit);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        sweep_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    ///
    /// The slot permit is held until the connection is fully cleaned up.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, permit: OwnedSemaphorePermit) {
        let clients = self.clients.clone();
        let service = self.service.clone();
        let push = self.push.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _permit = permit;
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let connection_id = uuid::Uuid::new_v4().to_string();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let mut outbound = push.register(&connection_id).await;

            clients.write().await.insert(
                connection_id.clone(),
                ConnectedClient { addr, connected_at: Instant::now() },
            );

            if let Err(e) = service.handle_open(&connection_id).await {
                error!("Failed to record connection {}: {}", connection_id, e);
            }
            info!("Connection {} opened from {}", connection_id, addr);

            // Drain the outbound queue onto the socket, then close it
            let sender_task = tokio::spawn(async move {
                while let Some(frame) = outbound.recv().await {
                    let text = match frame.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize frame: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                let _ = ws_sender.send(Message::Close(None)).await;
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                service.handle_text(&connection_id, &text).await;
                            }
                            Some(Ok(Message::Binary(_))) => {
                                service.handle_binary(&connection_id).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Connection {} closed by peer", connection_id);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", connection_id, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Closing {} for shutdown", connection_id);
                        break;
                    }
                }
            }

            // Dropping the queue lets the writer flush and exit
            push.deregister(&connection_id).await;
            if let Err(e) = service.handle_close(&connection_id).await {
                warn!("Failed to remove connection {}: {}", connection_id, e);
            }
            let _ = sender_task.await;

            if let Some(client) = clients.write().await.remove(&connection_id) {
                info!(
                    "Connection {} from {} cleaned up after {:?}",
                    connection_id,
                    client.addr,
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Periodically drop connection records past their TTL.
    async fn run_sweep_loop(store: Arc<MemoryStore>, every: std::time::Duration) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;

            let purged = store.purge_expired().await;
            if purged > 0 {
                info!("Purged {} expired connection records", purged);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
