// ============================
// vplan-backend-lib/src/storage.rs
// ============================
//! Storage abstraction with a SQLite implementation.
//!
//! Timestamps are stored as unix seconds, so every expiry handed to the
//! store has one-second resolution.
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use vplan_common::{VPlan, VPlanEntry};

use crate::error::AppError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS apitoken (
        id     INTEGER PRIMARY KEY AUTOINCREMENT,
        ident  TEXT NOT NULL UNIQUE,
        token  TEXT NOT NULL UNIQUE,
        expire INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS apisessions (
        sid    TEXT PRIMARY KEY,
        ident  TEXT NOT NULL,
        expire INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_apisessions_expire ON apisessions(expire);

    CREATE TABLE IF NOT EXISTS vplan (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        date_edit INTEGER NOT NULL,
        date_for  INTEGER NOT NULL,
        block     TEXT NOT NULL DEFAULT '',
        header    TEXT NOT NULL DEFAULT '',
        footer    TEXT NOT NULL DEFAULT '',
        deleted   INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_vplan_date_for ON vplan(date_for);

    CREATE TABLE IF NOT EXISTS vplan_details (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        vplan_id    INTEGER NOT NULL REFERENCES vplan(id),
        class       TEXT NOT NULL,
        time        TEXT NOT NULL DEFAULT '',
        measures    TEXT NOT NULL DEFAULT '',
        responsible TEXT NOT NULL DEFAULT '',
        deleted     INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_vplan_details_vplan ON vplan_details(vplan_id);
";

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Identity and expiry owning `token`, if any
    async fn get_api_token(
        &self,
        token: &str,
    ) -> Result<Option<(String, DateTime<Utc>)>, AppError>;

    /// Token and expiry currently held by `ident`, if any
    async fn get_user_api_token(
        &self,
        ident: &str,
    ) -> Result<Option<(String, DateTime<Utc>)>, AppError>;

    /// Atomically insert or replace the token record of `ident`
    async fn set_user_api_token(
        &self,
        ident: &str,
        token: &str,
        expire: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Overwrite an existing token record. Returns whether a row changed.
    async fn update_user_api_token(
        &self,
        ident: &str,
        token: &str,
        expire: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Remove the token record of `ident`
    async fn delete_user_api_token(&self, ident: &str) -> Result<(), AppError>;

    /// Persist a cookie session
    async fn create_session(
        &self,
        sid: &str,
        ident: &str,
        expire: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Identity and expiry of a cookie session, if any
    async fn get_session(&self, sid: &str) -> Result<Option<(String, DateTime<Utc>)>, AppError>;

    /// Remove a cookie session
    async fn delete_session(&self, sid: &str) -> Result<(), AppError>;

    /// Drop sessions and tokens that expired before `now`. Returns the
    /// number of removed rows.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AppError>;

    /// Plans for `since` or later, entries filtered by `class` when it
    /// is not empty
    async fn get_vplans(&self, class: &str, since: DateTime<Utc>) -> Result<Vec<VPlan>, AppError>;
}

/// Whether `err` is a uniqueness (or other constraint) violation
pub fn is_constraint_violation(err: &AppError) -> bool {
    matches!(
        err,
        AppError::Storage(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
    )
}

/// Input for [`SqliteStorage::insert_vplan`]
#[derive(Debug, Clone)]
pub struct NewVPlan {
    pub date_edit: DateTime<Utc>,
    pub date_for: DateTime<Utc>,
    pub block: String,
    pub header: String,
    pub footer: String,
}

/// Input for [`SqliteStorage::insert_vplan_entry`]
#[derive(Debug, Clone)]
pub struct NewVPlanEntry {
    pub vplan_id: i64,
    pub class: String,
    pub time: String,
    pub measures: String,
    pub responsible: String,
}

/// SQLite implementation of the Storage trait
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the database file and create missing tables
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Self::from_connection(conn)
    }

    /// Throwaway database, used by tests and `database.path = ":memory:"`
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.setup()?;
        Ok(storage)
    }

    /// Create tables if they do not exist yet
    pub fn setup(&self) -> anyhow::Result<()> {
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AppError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await?
    }

    /// Add a plan, returns its id
    pub async fn insert_vplan(&self, plan: NewVPlan) -> Result<i64, AppError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO vplan (date_edit, date_for, block, header, footer)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    plan.date_edit.timestamp(),
                    plan.date_for.timestamp(),
                    plan.block,
                    plan.header,
                    plan.footer
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Add an entry to an existing plan, returns its id
    pub async fn insert_vplan_entry(&self, entry: NewVPlanEntry) -> Result<i64, AppError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO vplan_details (vplan_id, class, time, measures, responsible)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.vplan_id,
                    entry.class,
                    entry.time,
                    entry.measures,
                    entry.responsible
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Soft-delete a plan; it disappears from [`Storage::get_vplans`]
    pub async fn delete_vplan(&self, id: i64) -> Result<(), AppError> {
        self.with_conn(move |conn| {
            conn.execute("UPDATE vplan SET deleted = 1 WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    /// Soft-delete a single entry
    pub async fn delete_vplan_entry(&self, id: i64) -> Result<(), AppError> {
        self.with_conn(move |conn| {
            conn.execute("UPDATE vplan_details SET deleted = 1 WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }
}

fn from_unix(secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            format!("timestamp {secs} out of range").into(),
        )
    })
}

fn select_entries(conn: &Connection, vplan_id: i64, class: &str) -> rusqlite::Result<Vec<VPlanEntry>> {
    let map_entry = |row: &rusqlite::Row<'_>| -> rusqlite::Result<VPlanEntry> {
        Ok(VPlanEntry {
            id: row.get(0)?,
            vplan_id: row.get(1)?,
            class: row.get(2)?,
            time: row.get(3)?,
            measures: row.get(4)?,
            responsible: row.get(5)?,
        })
    };

    let rows: Vec<rusqlite::Result<VPlanEntry>> = if class.is_empty() {
        let mut stmt = conn.prepare_cached(
            "SELECT id, vplan_id, class, time, measures, responsible FROM vplan_details
             WHERE vplan_id = ?1 AND deleted = 0 ORDER BY id",
        )?;
        let collected: Vec<_> = stmt.query_map(params![vplan_id], map_entry)?.collect();
        collected
    } else {
        let mut stmt = conn.prepare_cached(
            "SELECT id, vplan_id, class, time, measures, responsible FROM vplan_details
             WHERE vplan_id = ?1 AND class = ?2 AND deleted = 0 ORDER BY id",
        )?;
        let collected: Vec<_> = stmt.query_map(params![vplan_id, class], map_entry)?.collect();
        collected
    };

    Ok(rows
        .into_iter()
        .filter_map(|row| match row {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(vplan_id, error = %e, "skipping unreadable vplan entry");
                None
            },
        })
        .collect())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_api_token(
        &self,
        token: &str,
    ) -> Result<Option<(String, DateTime<Utc>)>, AppError> {
        let token = token.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT ident, expire FROM apitoken WHERE token = ?1",
                    params![token],
                    |row| Ok((row.get::<_, String>(0)?, from_unix(row.get(1)?)?)),
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn get_user_api_token(
        &self,
        ident: &str,
    ) -> Result<Option<(String, DateTime<Utc>)>, AppError> {
        let ident = ident.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT token, expire FROM apitoken WHERE ident = ?1",
                    params![ident],
                    |row| Ok((row.get::<_, String>(0)?, from_unix(row.get(1)?)?)),
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn set_user_api_token(
        &self,
        ident: &str,
        token: &str,
        expire: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let (ident, token) = (ident.to_string(), token.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO apitoken (ident, token, expire) VALUES (?1, ?2, ?3)
                 ON CONFLICT(ident) DO UPDATE SET token = excluded.token, expire = excluded.expire",
                params![ident, token, expire.timestamp()],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_user_api_token(
        &self,
        ident: &str,
        token: &str,
        expire: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let (ident, token) = (ident.to_string(), token.to_string());
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE apitoken SET token = ?1, expire = ?2 WHERE ident = ?3",
                params![token, expire.timestamp(), ident],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_user_api_token(&self, ident: &str) -> Result<(), AppError> {
        let ident = ident.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM apitoken WHERE ident = ?1", params![ident])?;
            Ok(())
        })
        .await
    }

    async fn create_session(
        &self,
        sid: &str,
        ident: &str,
        expire: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let (sid, ident) = (sid.to_string(), ident.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO apisessions (sid, ident, expire) VALUES (?1, ?2, ?3)",
                params![sid, ident, expire.timestamp()],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_session(&self, sid: &str) -> Result<Option<(String, DateTime<Utc>)>, AppError> {
        let sid = sid.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT ident, expire FROM apisessions WHERE sid = ?1",
                    params![sid],
                    |row| Ok((row.get::<_, String>(0)?, from_unix(row.get(1)?)?)),
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn delete_session(&self, sid: &str) -> Result<(), AppError> {
        let sid = sid.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM apisessions WHERE sid = ?1", params![sid])?;
            Ok(())
        })
        .await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        self.with_conn(move |conn| {
            let now = now.timestamp();
            let sessions = conn.execute("DELETE FROM apisessions WHERE expire <= ?1", params![now])?;
            let tokens = conn.execute("DELETE FROM apitoken WHERE expire <= ?1", params![now])?;
            Ok(sessions + tokens)
        })
        .await
    }

    async fn get_vplans(&self, class: &str, since: DateTime<Utc>) -> Result<Vec<VPlan>, AppError> {
        let class = class.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, date_edit, date_for, block, header, footer FROM vplan
                 WHERE date_for >= ?1 AND deleted = 0 ORDER BY date_for, id",
            )?;
            let rows = stmt.query_map(params![since.timestamp()], |row| {
                Ok(VPlan {
                    id: row.get(0)?,
                    date_edit: from_unix(row.get(1)?)?,
                    date_for: from_unix(row.get(2)?)?,
                    block: row.get(3)?,
                    header: row.get(4)?,
                    footer: row.get(5)?,
                    entries: Vec::new(),
                })
            })?;

            let mut vplans = Vec::new();
            for row in rows {
                match row {
                    Ok(plan) => vplans.push(plan),
                    Err(e) => tracing::warn!(error = %e, "skipping unreadable vplan row"),
                }
            }

            for plan in &mut vplans {
                match select_entries(conn, plan.id, &class) {
                    Ok(entries) => plan.entries = entries,
                    Err(e) => {
                        tracing::warn!(vplan_id = plan.id, error = %e, "could not load vplan entries");
                    },
                }
            }

            Ok(vplans)
        })
        .await
    }
}

/// Store whose every call fails, for exercising 500 paths
#[cfg(test)]
pub(crate) struct FailingStorage;

#[cfg(test)]
impl FailingStorage {
    pub(crate) const MESSAGE: &'static str = "disk I/O error";

    fn fail<T>() -> Result<T, AppError> {
        Err(AppError::Internal(Self::MESSAGE.to_string()))
    }
}

#[cfg(test)]
#[async_trait]
impl Storage for FailingStorage {
    async fn get_api_token(&self, _: &str) -> Result<Option<(String, DateTime<Utc>)>, AppError> {
        Self::fail()
    }
    async fn get_user_api_token(&self, _: &str) -> Result<Option<(String, DateTime<Utc>)>, AppError> {
        Self::fail()
    }
    async fn set_user_api_token(&self, _: &str, _: &str, _: DateTime<Utc>) -> Result<(), AppError> {
        Self::fail()
    }
    async fn update_user_api_token(&self, _: &str, _: &str, _: DateTime<Utc>) -> Result<bool, AppError> {
        Self::fail()
    }
    async fn delete_user_api_token(&self, _: &str) -> Result<(), AppError> {
        Self::fail()
    }
    async fn create_session(&self, _: &str, _: &str, _: DateTime<Utc>) -> Result<(), AppError> {
        Self::fail()
    }
    async fn get_session(&self, _: &str) -> Result<Option<(String, DateTime<Utc>)>, AppError> {
        Self::fail()
    }
    async fn delete_session(&self, _: &str) -> Result<(), AppError> {
        Self::fail()
    }
    async fn purge_expired(&self, _: DateTime<Utc>) -> Result<usize, AppError> {
        Self::fail()
    }
    async fn get_vplans(&self, _: &str, _: DateTime<Utc>) -> Result<Vec<VPlan>, AppError> {
        Self::fail()
    }
}
