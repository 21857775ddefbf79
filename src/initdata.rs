//! Mini-app session payload ("init data") parsing and authentication.
//!
//! The hosting platform hands every mini-app session a query-string payload
//! whose `hash` field is an HMAC-SHA-256 over the remaining fields. The
//! check must reproduce the platform's construction bit-for-bit: decoded
//! `key=value` lines, sorted by key, joined by newlines, keyed with a
//! secret derived from the bot token under the fixed `WebAppData` label.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Fixed label the platform uses to derive the signing secret from the bot
/// token.
const SECRET_LABEL: &[u8] = b"WebAppData";

/// The signed session fields the redemption protocol reads.
#[derive(Debug, Clone)]
pub struct InitData {
    pub user: SessionUser,
    pub start_param: Option<String>,
    pub chat_type: Option<String>,
}

/// The `user` object embedded in the payload as JSON.
///
/// The platform sends more fields (name, language, ...); only the id is
/// load-bearing here.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionUser {
    pub id: i64,
}

impl InitData {
    /// Extract the typed fields from a payload.
    ///
    /// Returns `None` when the `user` object is missing or malformed; the
    /// other fields stay optional. Callers must [`verify`] the payload
    /// before trusting anything extracted here.
    pub fn parse(raw: &str) -> Option<InitData> {
        let mut user = None;
        let mut start_param = None;
        let mut chat_type = None;
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "user" => user = serde_json::from_str::<SessionUser>(&value).ok(),
                "start_param" => start_param = Some(value.into_owned()),
                "chat_type" => chat_type = Some(value.into_owned()),
                _ => {}
            }
        }
        Some(InitData {
            user: user?,
            start_param,
            chat_type,
        })
    }
}

/// Check that `raw` was signed by the platform for `bot_token`.
///
/// Returns `false` on any parse failure or mismatch; never errors. The
/// comparison is exact-match on the lowercase hex digest.
pub fn verify(raw: &str, bot_token: &str) -> bool {
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let Some(pos) = pairs.iter().position(|(k, _)| k == "hash") else {
        return false;
    };
    let submitted = pairs.remove(pos).1;
    pairs.retain(|(k, _)| k != "hash");

    // Stable sort: the platform sorts by key and preserves the original
    // order of any duplicate keys.
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let check_string = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");

    let Some(expected) = signature(&check_string, bot_token) else {
        return false;
    };
    expected == submitted
}

/// Lowercase hex HMAC for a check-string under the derived secret.
fn signature(check_string: &str, bot_token: &str) -> Option<String> {
    let mut label_mac = HmacSha256::new_from_slice(SECRET_LABEL).ok()?;
    label_mac.update(bot_token.as_bytes());
    let secret = label_mac.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&secret).ok()?;
    mac.update(check_string.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}
