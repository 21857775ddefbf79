//! The redemption protocol: a two-phase, origin-bound token handshake.
//!
//! A gated link is only released after the client has passed through its
//! intermediate short link. The first phase records an origin-bound pending
//! redemption and hands back the short link; the final phase requires that
//! pending redemption to match on token, origin, and user before resolving
//! the destination, consuming it in the same step. Direct links (no first
//! token) skip the handshake entirely.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::bot::Platform;
use crate::error::DatabaseError;
use crate::initdata::{self, InitData};
use crate::store::{Destination, LinkAccess, LinkRecord, PendingRedemption, Store};
use crate::token::Token;

/// The one deliberately vague message shared by every anti-abuse rejection
/// (blocked user, shared session, missing or mismatched pending
/// redemption), so a probing client cannot tell which check tripped.
const WARNING_MESSAGE: &str = "This is a warning. Continued violations will get you blocked.";

/// Why a phase was refused. Every variant maps to a structured wire body;
/// nothing escapes a handler unstructured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Malformed or forged session payload.
    InvalidSignature,
    /// Missing fields or a token of the wrong class.
    InvalidRequest,
    /// First-phase token with no matching record.
    InactiveLink,
    /// Final-phase token with no matching record.
    UnknownLink,
    /// Anti-abuse: blocked, shared session, or unearned redemption.
    Warning,
    /// The platform refused to mint an invite.
    PermissionError,
    /// Unexpected internal failure, already logged.
    Internal,
}

impl Rejection {
    /// User-facing error string for the wire.
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidSignature => "Invalid init data",
            Self::InvalidRequest => "Invalid request",
            Self::InactiveLink => "Invalid or inactive link",
            Self::UnknownLink => "Invalid Link",
            Self::Warning => WARNING_MESSAGE,
            Self::PermissionError => "Bot permission error",
            Self::Internal => "Internal error",
        }
    }
}

/// Both coordinators of the redemption protocol, stateless per request:
/// every piece of coordination state lives in the store.
pub struct GateService {
    store: Arc<dyn Store>,
    platform: Arc<dyn Platform>,
    bot_token: SecretString,
}

impl GateService {
    pub fn new(store: Arc<dyn Store>, platform: Arc<dyn Platform>, bot_token: SecretString) -> Self {
        Self {
            store,
            platform,
            bot_token,
        }
    }

    /// First phase: record an origin-bound attempt and hand back the short
    /// link for the presented first token.
    ///
    /// The pending write happens before the link lookup, so exactly one
    /// durable write occurs per verified call even when the token turns out
    /// to be unknown.
    pub async fn begin_redemption(
        &self,
        init_data: &str,
        origin: &str,
    ) -> Result<String, Rejection> {
        if !initdata::verify(init_data, self.bot_token.expose_secret()) {
            return Err(Rejection::InvalidSignature);
        }
        let Some(session) = InitData::parse(init_data) else {
            return Err(Rejection::InvalidRequest);
        };
        let Some(raw_token) = session.start_param.as_deref() else {
            return Err(Rejection::InvalidRequest);
        };
        let Some(Token::First(first_token)) = Token::parse(raw_token) else {
            return Err(Rejection::InvalidRequest);
        };

        let origin_hash = hash_origin(origin);
        self.store
            .replace_pending(&PendingRedemption {
                origin_hash,
                user_id: session.user.id,
                first_token: first_token.clone(),
                verified: false,
            })
            .await
            .map_err(store_failure)?;
        tracing::info!(user_id = session.user.id, "first-phase attempt recorded");

        let Some(record) = self
            .store
            .link_by_first(&first_token)
            .await
            .map_err(store_failure)?
        else {
            return Err(Rejection::InactiveLink);
        };
        let LinkAccess::Gated { short_link, .. } = record.access else {
            return Err(Rejection::InactiveLink);
        };
        Ok(short_link)
    }

    /// Final phase: enforce the state machine and resolve the destination.
    pub async fn resolve(&self, init_data: &str, origin: &str) -> Result<String, Rejection> {
        if !initdata::verify(init_data, self.bot_token.expose_secret()) {
            return Err(Rejection::InvalidSignature);
        }
        let Some(session) = InitData::parse(init_data) else {
            return Err(Rejection::InvalidRequest);
        };
        let Some(raw_token) = session.start_param.as_deref() else {
            return Err(Rejection::InvalidRequest);
        };
        let Some(Token::Final(final_token)) = Token::parse(raw_token) else {
            return Err(Rejection::InvalidRequest);
        };

        if self
            .store
            .is_blocked(session.user.id)
            .await
            .map_err(store_failure)?
        {
            tracing::info!(user_id = session.user.id, "blocked user refused");
            return Err(Rejection::Warning);
        }

        let Some(record) = self
            .store
            .link_by_final(&final_token)
            .await
            .map_err(store_failure)?
        else {
            return Err(Rejection::UnknownLink);
        };

        // A forced record only resolves inside a direct 1:1 session.
        if record.force && session.chat_type.as_deref() != Some("sender") {
            tracing::info!(user_id = session.user.id, "shared-session resolution refused");
            return Err(Rejection::Warning);
        }

        if let LinkAccess::Gated { first_token, .. } = &record.access {
            let origin_hash = hash_origin(origin);
            let consumed = self
                .store
                .consume_pending(&origin_hash, first_token, session.user.id)
                .await
                .map_err(store_failure)?;
            if !consumed {
                tracing::info!(user_id = session.user.id, "unearned redemption refused");
                return Err(Rejection::Warning);
            }
        }

        self.resolve_destination(&record).await
    }

    async fn resolve_destination(&self, record: &LinkRecord) -> Result<String, Rejection> {
        match &record.destination {
            Destination::Url(url) => Ok(url.clone()),
            Destination::Entity(entity_id) => self
                .platform
                .create_single_use_invite(*entity_id)
                .await
                .map_err(|e| {
                    // Collapsed to a generic permission error: the caller
                    // never learns the platform-side cause.
                    tracing::warn!(error = %e, entity_id, "invite minting failed");
                    Rejection::PermissionError
                }),
        }
    }
}

/// One-way hash of the requester's network origin. The raw address is never
/// stored or logged; only this digest keys pending redemptions.
pub fn hash_origin(origin: &str) -> String {
    hex::encode(Sha256::digest(origin.as_bytes()))
}

fn store_failure(e: DatabaseError) -> Rejection {
    tracing::error!(error = %e, "store operation failed");
    Rejection::Internal
}
