//! SQLite save store for top-level items.
//!
//! Each top-level item — with its whole container tree embedded — is
//! serialized to a JSON record and stored in one row keyed by instance id:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS stowed_items (
//!     instance_id TEXT PRIMARY KEY,
//!     record      BLOB NOT NULL,
//!     saved_at    TEXT NOT NULL,
//!     checksum    TEXT NOT NULL
//! );
//! ```
//!
//! JSON inside a BLOB column keeps the schema stable as record fields
//! evolve. A CRC-32 of the record bytes is stored alongside; a mismatch on
//! load is a [`StowageError::DataIntegrity`] for that one item, not an
//! aborted overall load.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info};

use crate::error::{Result, StowageError};
use crate::item::{Item, ItemTypeRegistry};
use crate::save::{self, MigrationMap};
use crate::types::ItemInstanceId;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS stowed_items (
    instance_id TEXT PRIMARY KEY,
    record      BLOB NOT NULL,
    saved_at    TEXT NOT NULL,
    checksum    TEXT NOT NULL
);";

/// CRC-32 (ISO 3309) of the record bytes, as lowercase hex.
fn checksum_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    format!("{:08x}", !crc)
}

/// Handle to an open SQLite database of saved items.
pub struct SaveStore {
    conn: Connection,
    db_path: PathBuf,
}

impl std::fmt::Debug for SaveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SaveStore {
    /// Open (or create) a save database at `path`, creating the schema and
    /// enabling WAL mode.
    ///
    /// # Errors
    /// Returns [`StowageError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), "save store opened");
        Ok(Self { conn, db_path })
    }

    /// Open an in-memory database, useful for tests.
    ///
    /// # Errors
    /// Returns [`StowageError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Save (upsert) a top-level item and everything inside it.
    ///
    /// # Errors
    /// Returns [`StowageError::Serialization`] if encoding fails, or
    /// [`StowageError::Database`] on SQLite failures.
    pub fn save_item(&self, item: &Item) -> Result<()> {
        let record = save::serialize_item(item)?;
        let checksum = checksum_hex(&record);
        let now = Utc::now().to_rfc3339();
        let id_str = item.id().to_string();

        self.conn.execute(
            "INSERT INTO stowed_items (instance_id, record, saved_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(instance_id) DO UPDATE SET
                record = excluded.record,
                saved_at = excluded.saved_at,
                checksum = excluded.checksum",
            params![id_str, record, now, checksum],
        )?;

        debug!(item = %item.id(), bytes = record.len(), "saved item");
        Ok(())
    }

    /// Load a top-level item by instance id, rebuilding it against the
    /// registry with the migration map as fallback for retired types.
    ///
    /// Returns `Ok(None)` when no row exists.
    ///
    /// # Errors
    ///
    /// A stored checksum that no longer matches the record bytes is a
    /// [`StowageError::DataIntegrity`]; structural mismatches surface the
    /// [`save::item_from_record`] errors.
    pub fn load_item(
        &self,
        id: ItemInstanceId,
        registry: &ItemTypeRegistry,
        migrations: &MigrationMap,
    ) -> Result<Option<Item>> {
        let id_str = id.to_string();
        let mut stmt = self
            .conn
            .prepare_cached("SELECT record, checksum FROM stowed_items WHERE instance_id = ?1")?;
        let row: Option<(Vec<u8>, String)> = stmt
            .query_row(params![id_str], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((record, stored)) = row else {
            return Ok(None);
        };

        let actual = checksum_hex(&record);
        if stored != actual {
            return Err(StowageError::integrity(format!(
                "checksum mismatch for {id}: stored {stored}, computed {actual}"
            )));
        }

        let item = save::deserialize_item(&record, registry, migrations)?;
        debug!(item = %id, "loaded item");
        Ok(Some(item))
    }

    /// Delete a saved item. Returns `true` if a row was removed.
    ///
    /// # Errors
    /// Returns [`StowageError::Database`] on SQLite failures.
    pub fn delete_item(&self, id: ItemInstanceId) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM stowed_items WHERE instance_id = ?1",
            params![id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    /// List the instance ids of every saved item.
    ///
    /// # Errors
    /// Returns [`StowageError::Database`] on SQLite failures.
    pub fn list_items(&self) -> Result<Vec<ItemInstanceId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT instance_id FROM stowed_items")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            let id_str = row?;
            match uuid::Uuid::parse_str(&id_str) {
                Ok(uuid) => ids.push(ItemInstanceId(uuid)),
                Err(_) => {
                    return Err(StowageError::integrity(format!(
                        "row key {id_str:?} is not a valid instance id"
                    )));
                }
            }
        }
        Ok(ids)
    }

    /// Number of saved items.
    ///
    /// # Errors
    /// Returns [`StowageError::Database`] on SQLite failures.
    pub fn item_count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM stowed_items", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Copy the database to `dest_path` with SQLite's online-backup API;
    /// safe while the store is in use.
    ///
    /// # Errors
    /// Returns [`StowageError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;
        info!(dest = %dest_path.as_ref().display(), "save store backup completed");
        Ok(())
    }

    /// Run SQLite's integrity check; `Ok(false)` means corruption.
    ///
    /// # Errors
    /// Returns [`StowageError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// The database file path (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
