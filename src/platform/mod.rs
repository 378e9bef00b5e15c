pub mod mattermost;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

/// Event kind carried by a newly created post.
pub const EVENT_POSTED: &str = "posted";

/// An event as delivered by the realtime transport, before any filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Event kind, e.g. "posted", "typing", "hello"
    pub kind: String,
    /// Embedded post payload (JSON-encoded), present for post events
    pub post: Option<String>,
}

impl RawEvent {
    pub fn posted(post_json: impl Into<String>) -> Self {
        Self {
            kind: EVENT_POSTED.to_string(),
            post: Some(post_json.into()),
        }
    }

    pub fn is_posted(&self) -> bool {
        self.kind == EVENT_POSTED
    }

    /// Decode the embedded post payload.
    pub fn decode_post(&self) -> Result<IncomingMessage> {
        let json = self.post.as_deref().context("Event carries no post payload")?;
        let post: PostPayload = serde_json::from_str(json).context("Malformed post payload")?;
        Ok(IncomingMessage {
            posted: self.is_posted(),
            sender_id: post.user_id,
            channel_id: post.channel_id,
            message_id: post.id,
            text: post.message,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PostPayload {
    id: String,
    user_id: String,
    channel_id: String,
    #[serde(default)]
    message: String,
}

/// A posted message received from the chat server
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub struct IncomingMessage {
    /// Whether this came from a "posted" event (as opposed to an edit, reaction, ...)
    pub posted: bool,
    /// Platform-specific user ID of the author
    pub sender_id: String,
    /// Platform-specific channel ID
    pub channel_id: String,
    /// ID of the post itself, used as the thread root for replies
    pub message_id: String,
    /// The message text
    pub text: String,
}

/// Outbound side of the chat server. Implementations must tolerate concurrent calls
/// from relay tasks and the dispatch path.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Append a message to a channel, optionally threaded under `root_id`.
    async fn post(&self, channel_id: &str, text: &str, root_id: Option<&str>) -> Result<()>;

    /// Human-readable name of a user, e.g. their username.
    async fn display_name(&self, user_id: &str) -> Result<String>;
}

/// Post a message, logging instead of failing. Notifications are never retried.
pub async fn post_best_effort(
    backend: &dyn ChatBackend,
    channel_id: &str,
    text: &str,
    root_id: Option<&str>,
) {
    if let Err(e) = backend.post(channel_id, text, root_id).await {
        warn!("Failed to send message to channel {}: {:#}", channel_id, e);
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// A message captured by [`RecordingBackend`]
    #[derive(Debug, Clone, PartialEq)]
    pub struct Posted {
        pub channel_id: String,
        pub text: String,
        pub root_id: Option<String>,
    }

    /// In-memory backend that records every post in order.
    #[derive(Default)]
    pub struct RecordingBackend {
        posts: Mutex<Vec<Posted>>,
        fail_posts: bool,
    }

    impl RecordingBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// A backend whose every post fails.
        pub fn failing() -> Self {
            Self {
                fail_posts: true,
                ..Default::default()
            }
        }

        pub async fn posts(&self) -> Vec<Posted> {
            self.posts.lock().await.clone()
        }

        pub async fn texts(&self) -> Vec<String> {
            self.posts
                .lock()
                .await
                .iter()
                .map(|p| p.text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ChatBackend for RecordingBackend {
        async fn post(&self, channel_id: &str, text: &str, root_id: Option<&str>) -> Result<()> {
            if self.fail_posts {
                anyhow::bail!("backend unavailable");
            }
            self.posts.lock().await.push(Posted {
                channel_id: channel_id.to_string(),
                text: text.to_string(),
                root_id: root_id.map(str::to_string),
            });
            Ok(())
        }

        async fn display_name(&self, user_id: &str) -> Result<String> {
            match user_id {
                "u-alice" => Ok("alice".to_string()),
                _ => anyhow::bail!("unknown user {}", user_id),
            }
        }
    }

    #[tokio::test]
    async fn test_post_best_effort_swallows_errors() {
        let backend = RecordingBackend::failing();
        post_best_effort(&backend, "c1", "hello", None).await;
        assert!(backend.posts().await.is_empty());
    }
}
