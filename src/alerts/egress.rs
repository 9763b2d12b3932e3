//! Outbound posting to the chat platform.
//!
//! The router only sees [`ChatEgress`]; the Discord implementation
//! formats payloads as embeds and retries transient failures with
//! exponential backoff. Permanent failures (bad channel, missing
//! permissions, bad auth) surface immediately so the router can mark
//! the channel broken for the rest of the tick.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::tenants::validation::validate_external_token;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Structured alert content; the egress decides how it renders.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub title: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
    pub thumbnail_url: Option<String>,
    pub color: u32,
    /// Pre-rendered mention strings, e.g. `<@&role>` / `<@user>`.
    pub mentions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Ack {
    pub message_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EgressError {
    #[error("transient chat egress failure: {0}")]
    Transient(String),
    #[error("permanent chat egress failure: {0}")]
    Permanent(String),
}

#[async_trait]
pub trait ChatEgress: Send + Sync {
    /// Post to a channel by platform identifier.
    async fn post(&self, channel_id: &str, payload: &AlertPayload) -> Result<Ack, EgressError>;

    /// Post through a webhook URL instead of a channel.
    async fn post_webhook(&self, url: &str, payload: &AlertPayload) -> Result<Ack, EgressError>;
}

/// Bot-token REST client for Discord.
pub struct DiscordEgress {
    client: Client,
    api_base: String,
    token: String,
}

impl DiscordEgress {
    pub fn new(api_base: &str, token: &str) -> Result<Self> {
        validate_external_token(token).context("chat bot token failed validation")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build chat egress HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn message_body(payload: &AlertPayload) -> serde_json::Value {
        let embed = json!({
            "title": payload.title,
            "description": payload.description,
            "color": payload.color,
            "fields": payload.fields,
            "thumbnail": payload.thumbnail_url.as_ref().map(|url| json!({ "url": url })),
        });
        json!({
            "content": payload.mentions.join(" "),
            "embeds": [embed],
            "allowed_mentions": { "parse": ["roles", "users"] },
        })
    }

    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
        target: &str,
    ) -> Result<Ack, EgressError> {
        let mut delay = RETRY_BASE;
        let mut last_err = EgressError::Transient("no attempts made".to_string());

        for attempt in 1..=MAX_ATTEMPTS {
            match build().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let message_id = resp
                            .json::<serde_json::Value>()
                            .await
                            .ok()
                            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(String::from));
                        return Ok(Ack { message_id });
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_err = EgressError::Transient(format!("{target} returned {status}"));
                    } else {
                        // invalid channel, forbidden, bad auth
                        return Err(EgressError::Permanent(format!(
                            "{target} returned {status}"
                        )));
                    }
                }
                Err(e) => {
                    last_err = EgressError::Transient(format!("{target}: {e}"));
                }
            }

            if attempt < MAX_ATTEMPTS {
                debug!(target, attempt, "retrying chat post");
                sleep(delay).await;
                delay *= 2;
            }
        }

        warn!(target, "chat post exhausted retries");
        Err(last_err)
    }
}

#[async_trait]
impl ChatEgress for DiscordEgress {
    async fn post(&self, channel_id: &str, payload: &AlertPayload) -> Result<Ack, EgressError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let body = Self::message_body(payload);
        self.send_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("Authorization", format!("Bot {}", self.token))
                    .json(&body)
            },
            "channel post",
        )
        .await
    }

    async fn post_webhook(&self, url: &str, payload: &AlertPayload) -> Result<Ack, EgressError> {
        let body = Self::message_body(payload);
        self.send_with_retry(|| self.client.post(url).json(&body), "webhook post")
            .await
    }
}

/// Egress used when no bot token is configured: alerts are logged and
/// acknowledged so the pipeline stays exercised.
pub struct LogEgress;

#[async_trait]
impl ChatEgress for LogEgress {
    async fn post(&self, channel_id: &str, payload: &AlertPayload) -> Result<Ack, EgressError> {
        debug!(channel = channel_id, title = %payload.title, "alert (egress disabled)");
        Ok(Ack::default())
    }

    async fn post_webhook(&self, url: &str, payload: &AlertPayload) -> Result<Ack, EgressError> {
        debug!(webhook = url, title = %payload.title, "alert (egress disabled)");
        Ok(Ack::default())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// Test egress recording every post; channels in `fail_permanent`
    /// reject with a permanent error, `fail_transient` with a
    /// transient one.
    #[derive(Default)]
    pub struct MockEgress {
        pub posts: Mutex<Vec<(String, AlertPayload)>>,
        pub webhook_posts: Mutex<Vec<(String, AlertPayload)>>,
        pub fail_permanent: Mutex<HashSet<String>>,
        pub fail_transient: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl ChatEgress for MockEgress {
        async fn post(
            &self,
            channel_id: &str,
            payload: &AlertPayload,
        ) -> Result<Ack, EgressError> {
            if self.fail_permanent.lock().contains(channel_id) {
                return Err(EgressError::Permanent("mock permanent".to_string()));
            }
            if self.fail_transient.lock().contains(channel_id) {
                return Err(EgressError::Transient("mock transient".to_string()));
            }
            self.posts
                .lock()
                .push((channel_id.to_string(), payload.clone()));
            Ok(Ack::default())
        }

        async fn post_webhook(
            &self,
            url: &str,
            payload: &AlertPayload,
        ) -> Result<Ack, EgressError> {
            self.webhook_posts
                .lock()
                .push((url.to_string(), payload.clone()));
            Ok(Ack::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_body_carries_mentions_and_embed() {
        let payload = AlertPayload {
            title: "Dump: Abyssal whip".to_string(),
            description: "30% drop".to_string(),
            fields: vec![EmbedField {
                name: "Score".to_string(),
                value: "73".to_string(),
                inline: true,
            }],
            thumbnail_url: None,
            color: 0xE74C3C,
            mentions: vec!["<@&1>".to_string(), "<@2>".to_string()],
        };
        let body = DiscordEgress::message_body(&payload);
        assert_eq!(body["content"], "<@&1> <@2>");
        assert_eq!(body["embeds"][0]["title"], "Dump: Abyssal whip");
        assert_eq!(body["embeds"][0]["fields"][0]["name"], "Score");
    }

    #[test]
    fn egress_requires_plausible_token() {
        assert!(DiscordEgress::new("https://discord.com/api/v10", "short").is_err());
        let token = "A".repeat(59);
        assert!(DiscordEgress::new("https://discord.com/api/v10", &token).is_ok());
    }
}
