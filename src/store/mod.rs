//! Durable store: domain records and the trait seam backends implement.
//!
//! All coordination state lives here; the service holds no in-process
//! mutable state across requests. Single-row lookups return `Option` so
//! "not found" stays distinct from query failure.

pub mod libsql;

use async_trait::async_trait;

use crate::error::DatabaseError;

pub use self::libsql::LibSqlStore;

/// How a link record resolves once its final token is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// External URL, handed back verbatim.
    Url(String),
    /// Chat/channel entity that receives a freshly minted single-use invite.
    Entity(i64),
}

/// Whether a record resolves immediately or requires the two-phase
/// handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAccess {
    Direct,
    Gated {
        first_token: String,
        /// Intermediate destination shown during the first phase.
        short_link: String,
    },
}

/// A gating configuration, addressed by its final token.
///
/// Token values are globally unique across records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub final_token: String,
    pub access: LinkAccess,
    pub destination: Destination,
    pub owner_id: i64,
    /// When set, resolution is restricted to direct 1:1 sessions.
    pub force: bool,
}

/// A single in-flight gating attempt, keyed by the requester's origin hash.
///
/// At most one row exists per origin; a new attempt replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRedemption {
    pub origin_hash: String,
    pub user_id: i64,
    pub first_token: String,
    /// Written on insert, never read back by the protocol.
    pub verified: bool,
}

/// Link record CRUD.
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn insert_link(&self, record: &LinkRecord) -> Result<(), DatabaseError>;

    async fn link_by_final(&self, token: &str) -> Result<Option<LinkRecord>, DatabaseError>;

    async fn link_by_first(&self, token: &str) -> Result<Option<LinkRecord>, DatabaseError>;

    async fn link_by_entity(&self, entity_id: i64) -> Result<Option<LinkRecord>, DatabaseError>;

    async fn link_by_direct_url(&self, url: &str) -> Result<Option<LinkRecord>, DatabaseError>;

    /// Attach the gating step to an existing record.
    ///
    /// Returns `false` when the record does not exist or already carries a
    /// first token (the gate is set at most once).
    async fn set_gate(
        &self,
        final_token: &str,
        first_token: &str,
        short_link: &str,
    ) -> Result<bool, DatabaseError>;

    /// Delete every record matching `value` against any of: entity id,
    /// final token, first token, direct URL. Returns the number of rows
    /// removed.
    async fn delete_link_matching(&self, value: &str) -> Result<u64, DatabaseError>;
}

/// Pending-redemption lifecycle.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Replace any outstanding attempt from this origin with a new one, as
    /// a single atomic write.
    async fn replace_pending(&self, pending: &PendingRedemption) -> Result<(), DatabaseError>;

    async fn pending_by_origin(
        &self,
        origin_hash: &str,
    ) -> Result<Option<PendingRedemption>, DatabaseError>;

    /// Consume the attempt matching (origin, token, user) in one
    /// conditional delete. Returns whether a row was consumed; two racing
    /// calls can never both observe `true` for the same row.
    async fn consume_pending(
        &self,
        origin_hash: &str,
        first_token: &str,
        user_id: i64,
    ) -> Result<bool, DatabaseError>;
}

/// Block list and moderator set.
#[async_trait]
pub trait ModerationStore: Send + Sync {
    async fn is_blocked(&self, user_id: i64) -> Result<bool, DatabaseError>;

    /// Add a user to the block list. Moderators can never be blocked; the
    /// call is a no-op for them.
    async fn block(&self, user_id: i64) -> Result<(), DatabaseError>;

    async fn unblock(&self, user_id: i64) -> Result<(), DatabaseError>;

    async fn blocklist(&self) -> Result<Vec<i64>, DatabaseError>;

    async fn is_moderator(&self, user_id: i64) -> Result<bool, DatabaseError>;

    async fn add_moderator(&self, user_id: i64) -> Result<(), DatabaseError>;
}

/// Unified store surface the service is constructed over.
#[async_trait]
pub trait Store: LinkStore + PendingStore + ModerationStore {
    /// Create the schema if it does not exist yet.
    async fn migrate(&self) -> Result<(), DatabaseError>;
}
