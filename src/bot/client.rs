//! Telegram Bot API client.
//!
//! The service depends on the platform through the [`Platform`] trait so
//! the redemption protocol and the command router can be driven by test
//! doubles; [`BotApi`] is the production implementation over HTTPS.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::BotConfig;
use crate::error::PlatformError;

/// Minted invites admit one member and expire after five minutes.
const INVITE_TTL_SECS: i64 = 300;

/// Messaging-platform operations the service depends on.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Mint a single-use invite link for `entity_id`, valid for five
    /// minutes and exactly one join.
    async fn create_single_use_invite(&self, entity_id: i64) -> Result<String, PlatformError>;

    /// Whether `user_id` holds an administrator role in `entity_id`.
    async fn is_entity_admin(&self, entity_id: i64, user_id: i64) -> Result<bool, PlatformError>;

    /// Send a plain-text message to a chat.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), PlatformError>;
}

/// Bot API response envelope: `ok` plus either `result` or `description`.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InviteLink {
    invite_link: String,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

/// Production Bot API client.
pub struct BotApi {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl BotApi {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        payload: serde_json::Value,
    ) -> Result<T, PlatformError> {
        let url = format!(
            "{}/bot{}/{}",
            self.base_url,
            self.token.expose_secret(),
            method
        );
        let response = self.client.post(url).json(&payload).send().await?;
        let envelope: ApiEnvelope<T> = response.json().await?;
        if !envelope.ok {
            return Err(PlatformError::Rejected {
                method,
                description: envelope
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            });
        }
        envelope.result.ok_or(PlatformError::InvalidResponse {
            method,
            reason: "ok response without a result".to_string(),
        })
    }
}

#[async_trait]
impl Platform for BotApi {
    async fn create_single_use_invite(&self, entity_id: i64) -> Result<String, PlatformError> {
        let expire_date = Utc::now().timestamp() + INVITE_TTL_SECS;
        let invite: InviteLink = self
            .call(
                "createChatInviteLink",
                json!({
                    "chat_id": entity_id,
                    "member_limit": 1,
                    "expire_date": expire_date,
                }),
            )
            .await?;
        Ok(invite.invite_link)
    }

    async fn is_entity_admin(&self, entity_id: i64, user_id: i64) -> Result<bool, PlatformError> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                json!({ "chat_id": entity_id, "user_id": user_id }),
            )
            .await?;
        Ok(matches!(member.status.as_str(), "administrator" | "creator"))
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), PlatformError> {
        let _: serde_json::Value = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_decodes_success_and_failure() {
        let ok: ApiEnvelope<InviteLink> = serde_json::from_str(
            r#"{"ok":true,"result":{"invite_link":"https://t.me/+abc","creates_join_request":false}}"#,
        )
        .unwrap();
        assert!(ok.ok);
        assert_eq!(ok.result.unwrap().invite_link, "https://t.me/+abc");

        let err: ApiEnvelope<InviteLink> = serde_json::from_str(
            r#"{"ok":false,"error_code":403,"description":"not enough rights"}"#,
        )
        .unwrap();
        assert!(!err.ok);
        assert_eq!(err.description.as_deref(), Some("not enough rights"));
    }

    #[test]
    fn chat_member_status_maps_to_admin() {
        for (status, expected) in [
            ("administrator", true),
            ("creator", true),
            ("member", false),
            ("left", false),
        ] {
            let member: ChatMember =
                serde_json::from_value(json!({ "status": status, "user": {"id": 1} })).unwrap();
            assert_eq!(
                matches!(member.status.as_str(), "administrator" | "creator"),
                expected
            );
        }
    }
}
