//! Shared helpers for the integration suites: a payload signer that
//! mirrors the platform's scheme, a scripted platform double, and service
//! builders over the in-memory store.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use sha2::Sha256;

use linkgate::bot::Platform;
use linkgate::error::PlatformError;
use linkgate::gate::GateService;
use linkgate::store::{LibSqlStore, Store};

pub const BOT_TOKEN: &str = "12345:integration-token";

type HmacSha256 = Hmac<Sha256>;

/// Sign a payload from decoded field pairs, exactly the way the platform
/// does: sorted `key=value` lines joined by newlines, HMAC-keyed with a
/// secret derived from the bot token under the `WebAppData` label.
pub fn signed_init_data(fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<_> = fields.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let check_string = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut label_mac = HmacSha256::new_from_slice(b"WebAppData").unwrap();
    label_mac.update(BOT_TOKEN.as_bytes());
    let secret = label_mac.finalize().into_bytes();
    let mut mac = HmacSha256::new_from_slice(&secret).unwrap();
    mac.update(check_string.as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in fields {
        serializer.append_pair(k, v);
    }
    serializer.append_pair("hash", &hash);
    serializer.finish()
}

/// A typical mini-app session payload for `user_id` presenting `token`.
pub fn init_data_for(user_id: i64, token: &str, chat_type: &str) -> String {
    let user = format!(r#"{{"id":{user_id},"first_name":"T","language_code":"en"}}"#);
    signed_init_data(&[
        ("user", &user),
        ("start_param", token),
        ("chat_type", chat_type),
        ("auth_date", "1700000000"),
    ])
}

/// Scripted platform double: counts minted invites, optionally refuses.
pub struct ScriptedPlatform {
    invites_minted: AtomicUsize,
    fail_invites: bool,
}

impl ScriptedPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            invites_minted: AtomicUsize::new(0),
            fail_invites: false,
        })
    }

    /// A platform whose invite minting always fails (bot lacks rights).
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            invites_minted: AtomicUsize::new(0),
            fail_invites: true,
        })
    }

    pub fn invites_minted(&self) -> usize {
        self.invites_minted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Platform for ScriptedPlatform {
    async fn create_single_use_invite(&self, entity_id: i64) -> Result<String, PlatformError> {
        if self.fail_invites {
            return Err(PlatformError::Rejected {
                method: "createChatInviteLink",
                description: "not enough rights".to_string(),
            });
        }
        let n = self.invites_minted.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://t.me/+invite-{entity_id}-{n}"))
    }

    async fn is_entity_admin(&self, _entity_id: i64, _user_id: i64) -> Result<bool, PlatformError> {
        Ok(true)
    }

    async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<(), PlatformError> {
        Ok(())
    }
}

/// Gate service over a fresh in-memory store and the given platform double.
pub async fn gate_with(platform: Arc<ScriptedPlatform>) -> (GateService, Arc<LibSqlStore>) {
    let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
    store.migrate().await.unwrap();
    let gate = GateService::new(
        store.clone() as Arc<dyn Store>,
        platform as Arc<dyn Platform>,
        SecretString::from(BOT_TOKEN),
    );
    (gate, store)
}
