//! Push Channel
//!
//! Delivery seam between the engine and whatever holds the client sockets.
//! A provider must distinguish "the connection is gone" from any other
//! delivery failure: the former is routine and leads to pruning.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

use crate::network::protocol::ServerFrame;

/// Delivery errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// Recipient channel no longer exists.
    #[error("connection gone: {0}")]
    Gone(String),

    /// Any other transport failure.
    #[error("delivery failed: {0}")]
    Failure(String),
}

/// Send-to-connection primitive.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Deliver one frame to one connection.
    async fn post(&self, connection_id: &str, frame: &ServerFrame) -> Result<(), PushError>;
}

/// Push provider backed by per-connection outbound queues.
///
/// Each WebSocket connection registers a bounded queue that its writer task
/// drains. Posting never blocks: a full queue is reported as a failure.
pub struct LocalPushChannel {
    queues: RwLock<BTreeMap<String, mpsc::Sender<ServerFrame>>>,
    capacity: usize,
}

impl LocalPushChannel {
    /// Create a channel whose queues hold `capacity` frames each.
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: RwLock::new(BTreeMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a connection and return the receiving end of its queue.
    pub async fn register(&self, connection_id: &str) -> mpsc::Receiver<ServerFrame> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.queues.write().await.insert(connection_id.to_string(), tx);
        rx
    }

    /// Forget a connection. Later posts to it report `Gone`.
    pub async fn deregister(&self, connection_id: &str) {
        self.queues.write().await.remove(connection_id);
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.queues.read().await.len()
    }

    /// Whether no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.queues.read().await.is_empty()
    }
}

#[async_trait]
impl PushChannel for LocalPushChannel {
    async fn post(&self, connection_id: &str, frame: &ServerFrame) -> Result<(), PushError> {
        let sender = self
            .queues
            .read()
            .await
            .get(connection_id)
            .cloned()
            .ok_or_else(|| PushError::Gone(connection_id.to_string()))?;

        sender.try_send(frame.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => PushError::Gone(connection_id.to_string()),
            mpsc::error::TrySendError::Full(_) => {
                PushError::Failure(format!("outbound queue full for {connection_id}"))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_delivers() {
        let push = LocalPushChannel::new(4);
        let mut rx = push.register("c1").await;

        push.post("c1", &ServerFrame::Pong).await.unwrap();
        assert_eq!(rx.recv().await, Some(ServerFrame::Pong));
    }

    #[tokio::test]
    async fn test_unknown_connection_is_gone() {
        let push = LocalPushChannel::new(4);
        assert_eq!(
            push.post("nobody", &ServerFrame::Pong).await,
            Err(PushError::Gone("nobody".to_string()))
        );
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_gone() {
        let push = LocalPushChannel::new(4);
        drop(push.register("c1").await);

        assert!(matches!(push.post("c1", &ServerFrame::Pong).await, Err(PushError::Gone(_))));
    }

    #[tokio::test]
    async fn test_full_queue_is_failure() {
        let push = LocalPushChannel::new(1);
        let _rx = push.register("c1").await;

        push.post("c1", &ServerFrame::Pong).await.unwrap();
        assert!(matches!(push.post("c1", &ServerFrame::Pong).await, Err(PushError::Failure(_))));
    }

    #[tokio::test]
    async fn test_deregister() {
        let push = LocalPushChannel::new(1);
        let _rx = push.register("c1").await;
        assert_eq!(push.len().await, 1);

        push.deregister("c1").await;
        assert!(push.is_empty().await);
        assert!(matches!(push.post("c1", &ServerFrame::Pong).await, Err(PushError::Gone(_))));
    }
}
