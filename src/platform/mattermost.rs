use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use crate::config::MattermostConfig;
use crate::platform::{ChatBackend, RawEvent};

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
struct CreatePost<'a> {
    channel_id: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    root_id: Option<&'a str>,
}

/// Frame pushed by the server over the websocket
#[derive(Debug, Deserialize)]
struct WsEvent {
    #[serde(default)]
    event: String,
    #[serde(default)]
    data: WsEventData,
}

#[derive(Debug, Default, Deserialize)]
struct WsEventData {
    post: Option<String>,
}

/// REST client for the Mattermost v4 API, authenticated with a bot access token
pub struct MattermostClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl MattermostClient {
    pub fn new(config: &MattermostConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v4{}", self.base_url, path)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Mattermost API error ({}): {}", status, error_body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// Check that the server is reachable.
    pub async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self
            .get("/system/ping")
            .await
            .context("There was a problem pinging the Mattermost server")?;
        Ok(())
    }

    /// The user the access token belongs to.
    pub async fn me(&self) -> Result<User> {
        self.get("/users/me").await
    }

    pub async fn team_by_name(&self, name: &str) -> Result<Team> {
        self.get(&format!("/teams/name/{}", name))
            .await
            .with_context(|| format!("Not a member of team '{}'", name))
    }

    pub async fn channel_by_name(&self, team_id: &str, name: &str) -> Result<Channel> {
        self.get(&format!("/teams/{}/channels/name/{}", team_id, name))
            .await
            .with_context(|| format!("Failed to find channel '{}'", name))
    }

    pub async fn user(&self, user_id: &str) -> Result<User> {
        self.get(&format!("/users/{}", user_id)).await
    }
}

#[async_trait]
impl ChatBackend for MattermostClient {
    async fn post(&self, channel_id: &str, text: &str, root_id: Option<&str>) -> Result<()> {
        let url = self.url("/posts");
        let body = CreatePost {
            channel_id,
            message: text,
            root_id,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("Failed to send post to Mattermost")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Mattermost API error ({}): {}", status, error_body);
        }
        Ok(())
    }

    async fn display_name(&self, user_id: &str) -> Result<String> {
        Ok(self.user(user_id).await?.username)
    }
}

/// Decode one websocket text frame into an event. Frames that aren't events
/// (e.g. replies to our own requests) yield `None`.
fn parse_frame(text: &str) -> Option<RawEvent> {
    let frame: WsEvent = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("Skipping undecodable websocket frame: {}", e);
            return None;
        }
    };
    if frame.event.is_empty() {
        return None;
    }
    Some(RawEvent {
        kind: frame.event,
        post: frame.data.post,
    })
}

/// Listen on the server's websocket and forward every event to `events`.
/// Returns when the socket closes or the receiving side is dropped.
pub async fn listen(ws_url: &str, token: &str, events: mpsc::Sender<RawEvent>) -> Result<()> {
    let (stream, _response) = connect_async(ws_url)
        .await
        .with_context(|| format!("Failed to connect to websocket {}", ws_url))?;
    let (mut sink, mut source) = stream.split();

    let challenge = json!({
        "seq": 1,
        "action": "authentication_challenge",
        "data": { "token": token },
    });
    sink.send(WsMessage::Text(challenge.to_string().into()))
        .await
        .context("Failed to authenticate websocket")?;
    info!("Listening for events on {}", ws_url);

    while let Some(message) = source.next().await {
        let message = message.context("Failed reading websocket message")?;
        match message {
            WsMessage::Text(text) => {
                if let Some(event) = parse_frame(&text) {
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
            }
            WsMessage::Ping(payload) => {
                sink.send(WsMessage::Pong(payload)).await.ok();
            }
            WsMessage::Close(frame) => {
                warn!("Websocket closed by server: {:?}", frame);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_posted_frame() {
        let text = r#"{"event":"posted","data":{"channel_name":"ops","post":"{\"id\":\"p1\"}"},"broadcast":{"channel_id":"c1"},"seq":3}"#;
        let event = parse_frame(text).unwrap();
        assert!(event.is_posted());
        assert_eq!(event.post.as_deref(), Some(r#"{"id":"p1"}"#));
    }

    #[test]
    fn test_parse_other_event_without_post() {
        let event = parse_frame(r#"{"event":"typing","data":{"parent_id":""}}"#).unwrap();
        assert_eq!(event.kind, "typing");
        assert!(event.post.is_none());
    }

    #[test]
    fn test_parse_skips_replies_and_garbage() {
        assert!(parse_frame(r#"{"status":"OK","seq_reply":1}"#).is_none());
        assert!(parse_frame("not json").is_none());
    }

    #[test]
    fn test_create_post_body() {
        let body = CreatePost {
            channel_id: "c1",
            message: "---",
            root_id: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"channel_id": "c1", "message": "---"})
        );

        let threaded = CreatePost {
            channel_id: "c1",
            message: "done",
            root_id: Some("p1"),
        };
        assert_eq!(serde_json::to_value(&threaded).unwrap()["root_id"], "p1");
    }

    #[tokio::test]
    async fn test_tls_handshake_failure_is_an_error() {
        let server = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(async move {
            // Accept and hang up without speaking TLS
            if let Ok((socket, _)) = server.accept().await {
                drop(socket);
            }
        });

        let (tx, _rx) = mpsc::channel(1);
        let url = format!("wss://127.0.0.1:{}/api/v4/websocket", port);
        let result = tokio::spawn(async move { listen(&url, "tok", tx).await }).await;

        let result = result.expect("listener must not panic");
        assert!(result.is_err());
    }

    #[test]
    fn test_api_url() {
        let client = MattermostClient::new(&MattermostConfig {
            url: "https://chat.example.com/".to_string(),
            token: "tok".to_string(),
            team: "ops".to_string(),
            channel: "deploys".to_string(),
        });
        assert_eq!(client.url("/users/me"), "https://chat.example.com/api/v4/users/me");
    }
}
