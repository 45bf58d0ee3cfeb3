//! Match Session Service
//!
//! Entry point for every inbound push-channel message. Decodes the frame,
//! dispatches joins to the connection registry and actions to the state
//! machine, commits the new match with a compare-and-swap on `version`, and
//! fans the resulting frames out to the match's subscribers.
//!
//! Invocations share nothing in-process; all state lives in the stores.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn, instrument};

use crate::core::now_millis;
use crate::game::machine::{apply_action, EngineError, Transition};
use crate::game::registry::ModuleRegistry;
use crate::game::state::{MatchRecord, NewMatch, Role, DEFAULT_MAX_STRIKES};
use crate::network::broadcast::Broadcaster;
use crate::network::connections::{ConnectionError, ConnectionRegistry};
use crate::network::protocol::{ActionRequest, ClientFrame, ErrorCode, FrameError, JoinRequest, ServerFrame};
use crate::network::push::{PushChannel, PushError};
use crate::store::{ConnectionStore, MatchStore, StoreError};

/// Configuration for the session service.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Extra attempts after a lost compare-and-swap before giving up.
    pub commit_retries: u32,
    /// Largest accepted inbound text frame (bytes).
    pub max_frame_bytes: usize,
    /// Connection record lifetime (seconds).
    pub connection_ttl_secs: i64,
    /// Strike ceiling for matches created here.
    pub max_strikes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            commit_retries: 3,
            max_frame_bytes: 16 * 1024,
            connection_ttl_secs: 24 * 60 * 60, // 1 day
            max_strikes: DEFAULT_MAX_STRIKES,
        }
    }
}

/// Stateless request handler. Cheap to clone.
#[derive(Clone)]
pub struct SessionService {
    config: SessionConfig,
    registry: Arc<ModuleRegistry>,
    matches: Arc<dyn MatchStore>,
    connections: Arc<dyn ConnectionStore>,
    broadcaster: Broadcaster,
    connection_registry: ConnectionRegistry,
}

impl SessionService {
    /// Wire up a service over the given stores and push provider.
    pub fn new(
        config: SessionConfig,
        registry: Arc<ModuleRegistry>,
        matches: Arc<dyn MatchStore>,
        connections: Arc<dyn ConnectionStore>,
        push: Arc<dyn PushChannel>,
    ) -> Self {
        let broadcaster = Broadcaster::new(connections.clone(), push);
        let connection_registry = ConnectionRegistry::new(
            matches.clone(),
            connections.clone(),
            broadcaster.clone(),
            config.connection_ttl_secs,
        );

        Self {
            config,
            registry,
            matches,
            connections,
            broadcaster,
            connection_registry,
        }
    }

    /// Service configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connection registry used by this service.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connection_registry
    }

    // =========================================================================
    // MATCH CREATION
    // =========================================================================

    /// Spec for a new match with random id and seed.
    pub fn fresh_match(&self, modules: Vec<String>, players: Vec<String>) -> NewMatch {
        NewMatch {
            id: uuid::Uuid::new_v4().to_string(),
            seed: uuid::Uuid::new_v4().simple().to_string(),
            modules,
            players,
            spectators: Vec::new(),
            max_strikes: self.config.max_strikes,
        }
    }

    /// Generate and persist a new match at version 0.
    #[instrument(skip(self, request), fields(match_id = %request.id))]
    pub async fn create_match(&self, request: NewMatch) -> Result<MatchRecord, EngineError> {
        let record = MatchRecord::create(request, &self.registry, now_millis())?;

        self.matches.insert_match(record.clone()).await.map_err(|e| match e {
            StoreError::AlreadyExists(id) => EngineError::Validation(format!("match {id} already exists")),
            other => EngineError::Internal(other.to_string()),
        })?;

        info!(
            "Created match {} with modules {:?} (seed {})",
            record.id,
            record.modules,
            hex::encode(&crate::core::rng::seed_digest(&record.seed)[..4])
        );
        Ok(record)
    }

    // =========================================================================
    // CONNECTION LIFECYCLE
    // =========================================================================

    /// Channel opened.
    pub async fn handle_open(&self, connection_id: &str) -> Result<(), StoreError> {
        self.connection_registry.open(connection_id).await.map(|_| ())
    }

    /// Channel closed.
    pub async fn handle_close(&self, connection_id: &str) -> Result<(), StoreError> {
        self.connection_registry.unbind(connection_id).await
    }

    // =========================================================================
    // INBOUND FRAMES
    // =========================================================================

    /// Handle one inbound text frame from `connection_id`.
    ///
    /// Every failure is answered to the sender only. A panic inside the
    /// handler still produces a generic internal-error reply.
    pub async fn handle_text(&self, connection_id: &str, text: &str) {
        let frame = match ClientFrame::decode(text, self.config.max_frame_bytes) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Invalid frame from {}: {}", connection_id, e);
                self.reply(connection_id, ServerFrame::from(&e)).await;
                return;
            }
        };

        let service = self.clone();
        let conn = connection_id.to_string();
        let handle = tokio::spawn(async move { service.dispatch(&conn, frame).await });

        if let Err(e) = handle.await {
            error!("Handler for {} aborted: {}", connection_id, e);
            self.reply(
                connection_id,
                ServerFrame::error(ErrorCode::InternalError, "Internal error"),
            )
            .await;
        }
    }

    /// Reject a frame the transport could not decode as text.
    pub async fn handle_binary(&self, connection_id: &str) {
        self.reply(connection_id, ServerFrame::from(&FrameError::Binary)).await;
    }

    async fn dispatch(&self, connection_id: &str, frame: ClientFrame) {
        debug!("{} frame from {}", frame.kind(), connection_id);

        match frame {
            ClientFrame::Ping => {
                self.reply(connection_id, ServerFrame::Pong).await;
            }
            ClientFrame::Join(JoinRequest { match_id, role }) => {
                if let Err(e) = self.connection_registry.join(connection_id, &match_id, role).await {
                    self.report_join_error(connection_id, e).await;
                }
            }
            ClientFrame::Action(ActionRequest { match_id, module_id, a }) => {
                if let Err(e) = self.handle_action(connection_id, &match_id, &module_id, &a).await {
                    match &e {
                        EngineError::Internal(detail) => {
                            error!("Action on {} failed: {}", match_id, detail)
                        }
                        other => debug!("Action on {} rejected: {}", match_id, other),
                    }
                    self.reply(connection_id, ServerFrame::from(&e)).await;
                }
            }
        }
    }

    async fn report_join_error(&self, connection_id: &str, err: ConnectionError) {
        let frame = match &err {
            ConnectionError::Engine(e) => ServerFrame::from(e),
            ConnectionError::Push(PushError::Gone(_)) => {
                // Sender disconnected mid-join; nobody to tell
                debug!("Connection {} gone during join", connection_id);
                return;
            }
            ConnectionError::Push(e) => {
                warn!("Snapshot to {} failed: {}", connection_id, e);
                ServerFrame::error(ErrorCode::InternalError, "Internal error")
            }
            ConnectionError::Store(e) => {
                error!("Join for {} failed: {}", connection_id, e);
                ServerFrame::error(ErrorCode::InternalError, "Internal error")
            }
        };
        self.reply(connection_id, frame).await;
    }

    async fn handle_action(
        &self,
        connection_id: &str,
        match_id: &str,
        module_id: &str,
        action: &Value,
    ) -> Result<(), EngineError> {
        let bound = self
            .connections
            .get_connection(connection_id)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        if let Some(conn) = bound {
            if conn.match_id.as_deref() == Some(match_id) && conn.role == Some(Role::Spectator) {
                return Err(EngineError::Validation("spectators cannot submit actions".to_string()));
            }
        }

        let transition = self.submit_action(match_id, module_id, action).await?;
        self.publish(match_id, &transition).await;
        Ok(())
    }

    // =========================================================================
    // STATE MACHINE
    // =========================================================================

    /// Apply an action and commit it.
    ///
    /// Reads the match, runs the state machine and writes back only if the
    /// stored version is still the one read. A lost race re-reads and retries
    /// up to `commit_retries` times, then reports `VersionConflict`.
    #[instrument(skip(self, action))]
    pub async fn submit_action(
        &self,
        match_id: &str,
        module_id: &str,
        action: &Value,
    ) -> Result<Transition, EngineError> {
        let mut attempt = 0;
        loop {
            let current = self
                .matches
                .get_match(match_id)
                .await
                .map_err(|e| EngineError::Internal(e.to_string()))?
                .ok_or_else(|| EngineError::MatchNotFound(match_id.to_string()))?;

            let transition = apply_action(&current, module_id, action, &self.registry, now_millis())?;

            match self
                .matches
                .put_match_if_version(transition.next.clone(), transition.expected_version)
                .await
            {
                Ok(()) => {
                    if transition.ended() {
                        info!("Match {} ended: {}", match_id, transition.next.status);
                    }
                    return Ok(transition);
                }
                Err(StoreError::VersionConflict { expected, actual }) => {
                    if attempt >= self.config.commit_retries {
                        warn!("Match {} conflict persisted after {} retries", match_id, attempt);
                        return Err(EngineError::VersionConflict {
                            match_id: match_id.to_string(),
                            expected,
                        });
                    }
                    debug!("Match {} moved from v{} to v{}, retrying", match_id, expected, actual);
                    attempt += 1;
                }
                Err(e) => return Err(EngineError::Internal(e.to_string())),
            }
        }
    }

    /// Broadcast a committed transition's frames in emission order.
    async fn publish(&self, match_id: &str, transition: &Transition) {
        for event in &transition.events {
            let frame = ServerFrame::from_event(match_id, event);
            match self.broadcaster.broadcast(match_id, &frame).await {
                Ok(report) => debug!(
                    "Broadcast to {}: {} delivered, {} pruned, {} failed",
                    match_id, report.delivered, report.pruned, report.failed
                ),
                Err(e) => error!("Could not resolve subscribers of {}: {}", match_id, e),
            }
        }
    }

    async fn reply(&self, connection_id: &str, frame: ServerFrame) {
        match self.broadcaster.send_to_one(connection_id, &frame).await {
            Ok(()) => {}
            Err(PushError::Gone(_)) => debug!("Stale connection: {}", connection_id),
            Err(PushError::Failure(e)) => warn!("Failed to reply to {}: {}", connection_id, e),
        }
    }
}
