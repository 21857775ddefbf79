//! libSQL backend for the store traits.
//!
//! Embedded SQLite-compatible database; file-based in production, in-memory
//! for tests. Every uniqueness and consume-on-match guarantee is enforced
//! by the database itself (primary keys, conditional statements with
//! affected-row counts), never by read-then-write sequences in Rust.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase};

use crate::error::DatabaseError;
use crate::store::{
    Destination, LinkAccess, LinkRecord, LinkStore, ModerationStore, PendingRedemption,
    PendingStore, Store,
};

/// Explicit column list for the links table (matches positional access in
/// `row_to_link`).
const LINK_COLUMNS: &str =
    "final_token, first_token, short_link, direct_url, entity_id, owner_id, force_direct";

/// libSQL store backend.
pub struct LibSqlStore {
    db: Arc<LibSqlDatabase>,
}

impl LibSqlStore {
    /// Open (or create) a local embedded database.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {}", e))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to open libSQL database: {}", e))
            })?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Create an in-memory database (for testing).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        // A bare `:memory:` database is scoped to a single connection, but this
        // store opens a fresh connection per operation. Use a process-unique
        // shared-cache named memory URI so every connection from this `Database`
        // sees the same tables while staying isolated from other stores.
        static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let uri = format!("file:linkgate_mem_{id}?mode=memory&cache=shared");
        let db = libsql::Builder::new_local(uri)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {}", e))
            })?;

        // A shared-cache in-memory database is destroyed as soon as its last
        // connection closes. This store opens a fresh connection per operation,
        // so hold one connection open for the process lifetime to keep the
        // schema and data alive between calls.
        let keepalive = db.connect().map_err(|e| {
            DatabaseError::Connection(format!("Failed to open in-memory keepalive: {}", e))
        })?;
        std::mem::forget(keepalive);

        Ok(Self { db: Arc::new(db) })
    }

    /// Create a new connection.
    ///
    /// Sets `PRAGMA busy_timeout = 5000` so concurrent writers wait instead
    /// of failing instantly with "database is locked".
    async fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {}", e)))?;
        conn.query("PRAGMA busy_timeout = 5000", ())
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to set busy_timeout: {}", e)))?;
        Ok(conn)
    }

    async fn link_by_column(
        &self,
        sql: &str,
        param: libsql::Value,
    ) -> Result<Option<LinkRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn.query(sql, libsql::params![param]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_link(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Store for LibSqlStore {
    async fn migrate(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                final_token TEXT PRIMARY KEY,
                first_token TEXT UNIQUE,
                short_link TEXT,
                direct_url TEXT,
                entity_id INTEGER,
                owner_id INTEGER NOT NULL,
                force_direct INTEGER NOT NULL DEFAULT 0
            )
            "#,
            (),
        )
        .await?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS pending_redemptions (
                origin_hash TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                first_token TEXT NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0
            )
            "#,
            (),
        )
        .await?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocklist (user_id INTEGER PRIMARY KEY)",
            (),
        )
        .await?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS moderators (user_id INTEGER PRIMARY KEY)",
            (),
        )
        .await?;
        Ok(())
    }
}

// ==================== LinkStore ====================

#[async_trait]
impl LinkStore for LibSqlStore {
    async fn insert_link(&self, record: &LinkRecord) -> Result<(), DatabaseError> {
        let (first_token, short_link) = match &record.access {
            LinkAccess::Direct => (libsql::Value::Null, libsql::Value::Null),
            LinkAccess::Gated {
                first_token,
                short_link,
            } => (
                libsql::Value::Text(first_token.clone()),
                libsql::Value::Text(short_link.clone()),
            ),
        };
        let (direct_url, entity_id) = match &record.destination {
            Destination::Url(url) => (libsql::Value::Text(url.clone()), libsql::Value::Null),
            Destination::Entity(id) => (libsql::Value::Null, libsql::Value::Integer(*id)),
        };

        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO links (final_token, first_token, short_link, direct_url, entity_id, owner_id, force_direct) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            libsql::params![
                record.final_token.as_str(),
                first_token,
                short_link,
                direct_url,
                entity_id,
                record.owner_id,
                record.force as i64,
            ],
        )
        .await?;
        Ok(())
    }

    async fn link_by_final(&self, token: &str) -> Result<Option<LinkRecord>, DatabaseError> {
        self.link_by_column(
            &format!("SELECT {LINK_COLUMNS} FROM links WHERE final_token = ?1"),
            libsql::Value::Text(token.to_string()),
        )
        .await
    }

    async fn link_by_first(&self, token: &str) -> Result<Option<LinkRecord>, DatabaseError> {
        self.link_by_column(
            &format!("SELECT {LINK_COLUMNS} FROM links WHERE first_token = ?1"),
            libsql::Value::Text(token.to_string()),
        )
        .await
    }

    async fn link_by_entity(&self, entity_id: i64) -> Result<Option<LinkRecord>, DatabaseError> {
        self.link_by_column(
            &format!("SELECT {LINK_COLUMNS} FROM links WHERE entity_id = ?1"),
            libsql::Value::Integer(entity_id),
        )
        .await
    }

    async fn link_by_direct_url(&self, url: &str) -> Result<Option<LinkRecord>, DatabaseError> {
        self.link_by_column(
            &format!("SELECT {LINK_COLUMNS} FROM links WHERE direct_url = ?1"),
            libsql::Value::Text(url.to_string()),
        )
        .await
    }

    async fn set_gate(
        &self,
        final_token: &str,
        first_token: &str,
        short_link: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let affected = conn
            .execute(
                "UPDATE links SET first_token = ?2, short_link = ?3 \
                 WHERE final_token = ?1 AND first_token IS NULL",
                libsql::params![final_token, first_token, short_link],
            )
            .await?;
        Ok(affected == 1)
    }

    async fn delete_link_matching(&self, value: &str) -> Result<u64, DatabaseError> {
        // Entity ids arrive as text; a non-numeric value simply never
        // matches the entity_id column.
        let as_entity = match value.parse::<i64>() {
            Ok(id) => libsql::Value::Integer(id),
            Err(_) => libsql::Value::Null,
        };
        let conn = self.connect().await?;
        let affected = conn
            .execute(
                "DELETE FROM links WHERE final_token = ?1 OR first_token = ?1 \
                 OR direct_url = ?1 OR entity_id = ?2",
                libsql::params![value, as_entity],
            )
            .await?;
        Ok(affected)
    }
}

// ==================== PendingStore ====================

#[async_trait]
impl PendingStore for LibSqlStore {
    async fn replace_pending(&self, pending: &PendingRedemption) -> Result<(), DatabaseError> {
        // Single statement: the origin-hash primary key evicts any prior
        // attempt from the same origin atomically.
        let conn = self.connect().await?;
        conn.execute(
            "INSERT OR REPLACE INTO pending_redemptions (origin_hash, user_id, first_token, verified) \
             VALUES (?1, ?2, ?3, ?4)",
            libsql::params![
                pending.origin_hash.as_str(),
                pending.user_id,
                pending.first_token.as_str(),
                pending.verified as i64,
            ],
        )
        .await?;
        Ok(())
    }

    async fn pending_by_origin(
        &self,
        origin_hash: &str,
    ) -> Result<Option<PendingRedemption>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT origin_hash, user_id, first_token, verified \
                 FROM pending_redemptions WHERE origin_hash = ?1",
                libsql::params![origin_hash],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(PendingRedemption {
                origin_hash: row.get::<String>(0)?,
                user_id: row.get::<i64>(1)?,
                first_token: row.get::<String>(2)?,
                verified: row.get::<i64>(3)? != 0,
            })),
            None => Ok(None),
        }
    }

    async fn consume_pending(
        &self,
        origin_hash: &str,
        first_token: &str,
        user_id: i64,
    ) -> Result<bool, DatabaseError> {
        // Match and delete in one conditional statement so two concurrent
        // finals from the same origin cannot both succeed.
        let conn = self.connect().await?;
        let affected = conn
            .execute(
                "DELETE FROM pending_redemptions \
                 WHERE origin_hash = ?1 AND first_token = ?2 AND user_id = ?3",
                libsql::params![origin_hash, first_token, user_id],
            )
            .await?;
        Ok(affected == 1)
    }
}

// ==================== ModerationStore ====================

#[async_trait]
impl ModerationStore for LibSqlStore {
    async fn is_blocked(&self, user_id: i64) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT user_id FROM blocklist WHERE user_id = ?1",
                libsql::params![user_id],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn block(&self, user_id: i64) -> Result<(), DatabaseError> {
        // Moderators can never be blocked; the guard lives in the statement
        // so the check and the insert cannot be interleaved.
        let conn = self.connect().await?;
        conn.execute(
            "INSERT OR IGNORE INTO blocklist (user_id) \
             SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM moderators WHERE user_id = ?1)",
            libsql::params![user_id],
        )
        .await?;
        Ok(())
    }

    async fn unblock(&self, user_id: i64) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "DELETE FROM blocklist WHERE user_id = ?1",
            libsql::params![user_id],
        )
        .await?;
        Ok(())
    }

    async fn blocklist(&self) -> Result<Vec<i64>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query("SELECT user_id FROM blocklist ORDER BY user_id", ())
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<i64>(0)?);
        }
        Ok(ids)
    }

    async fn is_moderator(&self, user_id: i64) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT user_id FROM moderators WHERE user_id = ?1",
                libsql::params![user_id],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn add_moderator(&self, user_id: i64) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT OR IGNORE INTO moderators (user_id) VALUES (?1)",
            libsql::params![user_id],
        )
        .await?;
        Ok(())
    }
}

// ==================== Row decoding ====================

fn row_to_link(row: &libsql::Row) -> Result<LinkRecord, DatabaseError> {
    let final_token = row.get::<String>(0)?;
    let first_token = get_opt_text(row, 1);
    let short_link = get_opt_text(row, 2);
    let direct_url = get_opt_text(row, 3);
    let entity_id = row.get::<i64>(4).ok();
    let owner_id = row.get::<i64>(5)?;
    let force = row.get::<i64>(6)? != 0;

    let access = match (first_token, short_link) {
        (Some(first_token), Some(short_link)) => LinkAccess::Gated {
            first_token,
            short_link,
        },
        (None, _) => LinkAccess::Direct,
        (Some(_), None) => {
            return Err(DatabaseError::Decode(format!(
                "link {} has a first token but no short link",
                final_token
            )));
        }
    };

    let destination = match (direct_url, entity_id) {
        (Some(url), None) => Destination::Url(url),
        (None, Some(id)) => Destination::Entity(id),
        _ => {
            return Err(DatabaseError::Decode(format!(
                "link {} must have exactly one of direct_url / entity_id",
                final_token
            )));
        }
    };

    Ok(LinkRecord {
        final_token,
        access,
        destination,
        owner_id,
        force,
    })
}

/// Extract an optional text column (None for SQL NULL).
fn get_opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}
