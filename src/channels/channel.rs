//! Channel trait and the message types that flow through it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::ChannelError;

/// Stream of incoming messages from a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A message received from a user.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    pub channel: String,
    pub user_id: String,
    pub content: String,
    pub thread_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            user_id: user_id.into(),
            content: content.into(),
            thread_id: None,
            received_at: Utc::now(),
        }
    }
}

/// A response going back to a user.
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub content: String,
    pub thread_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            thread_id: None,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Handle back to the caller that submitted a job.
///
/// Carried inside the job descriptor so the scheduler and executors can push
/// late notices (timeouts, results) to whoever asked.
#[derive(Debug, Clone)]
pub struct ReplyHandle {
    tx: Option<mpsc::Sender<OutgoingResponse>>,
    thread_id: Option<String>,
}

impl ReplyHandle {
    pub fn new(tx: mpsc::Sender<OutgoingResponse>) -> Self {
        Self {
            tx: Some(tx),
            thread_id: None,
        }
    }

    /// A handle that silently drops everything sent to it.
    pub fn detached() -> Self {
        Self {
            tx: None,
            thread_id: None,
        }
    }

    pub fn with_thread(mut self, thread_id: Option<String>) -> Self {
        self.thread_id = thread_id;
        self
    }

    /// Send a text notice to the caller.
    pub async fn send(&self, content: impl Into<String>) -> Result<(), ChannelError> {
        self.send_with_metadata(content, serde_json::Value::Null)
            .await
    }

    pub async fn send_with_metadata(
        &self,
        content: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<(), ChannelError> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        let response = OutgoingResponse {
            content: content.into(),
            thread_id: self.thread_id.clone(),
            metadata,
        };
        tx.send(response).await.map_err(|_| ChannelError::Closed {
            name: "reply".to_string(),
        })
    }
}

/// A bidirectional chat surface.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver a response for a previously received message.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Push a message nobody is waiting on, such as a late job result.
    async fn notify(&self, _response: OutgoingResponse) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_handle_forwards_with_thread() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = ReplyHandle::new(tx).with_thread(Some("t-1".into()));
        handle.send("done").await.unwrap();

        let response = rx.recv().await.unwrap();
        assert_eq!(response.content, "done");
        assert_eq!(response.thread_id.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn detached_handle_drops_silently() {
        assert!(ReplyHandle::detached().send("ignored").await.is_ok());
    }

    #[tokio::test]
    async fn closed_receiver_is_an_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = ReplyHandle::new(tx).send("x").await.unwrap_err();
        assert!(matches!(err, ChannelError::Closed { .. }));
    }
}
