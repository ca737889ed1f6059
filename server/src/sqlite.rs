use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kernel::{DeleteResult, StoredObject};
use rusqlite::blob::ZeroBlob;
use rusqlite::{
    params, Connection, DatabaseName, OpenFlags, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use thiserror::Error;

use crate::domain::ObjectStore;

const CACHE_SIZE: &str = "4096";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_OBJECT: &str = "SELECT key, blake3_hash, content_type, size, uploaded FROM object";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload of {0} bytes does not fit into a blob")]
    TooLarge(usize),
}

pub enum Mode {
    ReadWrite,
    ReadOnly,
}

pub struct Sqlite {
    conn: Connection,
}

impl ObjectStore for Sqlite {
    type Err = StoreError;

    fn new_database(&self) -> Result<(), Self::Err> {
        self.pragma_update("encoding", "UTF-8")?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS blob (
                  blake3_hash    TEXT PRIMARY KEY,
                  data           BLOB NOT NULL
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS object (
                  key           TEXT PRIMARY KEY,
                  blake3_hash   TEXT NOT NULL REFERENCES blob(blake3_hash) ON DELETE RESTRICT ON UPDATE RESTRICT,
                  content_type  TEXT NOT NULL,
                  size          INTEGER NOT NULL,
                  uploaded      INTEGER NOT NULL
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS object_uploaded_ix ON object(uploaded)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS object_hash_ix ON object(blake3_hash)",
            [],
        )?;

        Ok(())
    }

    fn put(
        &mut self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, Self::Err> {
        self.assign_cache_size()?;
        self.enable_foreign_keys()?;
        self.pragma_update("synchronous", "FULL")?;

        let hash = blake3::hash(&data).to_string();
        let size = data.len();
        let uploaded = now_millis();

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous: Option<String> = tx
            .query_row(
                "SELECT blake3_hash FROM object WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let exists = tx
            .prepare_cached("SELECT blake3_hash FROM blob WHERE blake3_hash = ?1")?
            .exists(params![&hash])?;

        if !exists {
            let len = i32::try_from(size).map_err(|_| StoreError::TooLarge(size))?;
            tx.execute(
                "INSERT INTO blob (blake3_hash, data) VALUES (?1, ?2)",
                params![&hash, &ZeroBlob(len)],
            )?;

            let rowid = tx.last_insert_rowid();

            let mut blob = tx.blob_open(DatabaseName::Main, "blob", "data", rowid, false)?;
            blob.write_all(&data)?;
            blob.flush()?;
            blob.close()?;
        }

        tx.prepare_cached(
            "INSERT INTO object (key, blake3_hash, content_type, size, uploaded)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                    blake3_hash = excluded.blake3_hash,
                    content_type = excluded.content_type,
                    size = excluded.size,
                    uploaded = excluded.uploaded",
        )?
        .execute(params![key, &hash, content_type, size as i64, uploaded])?;

        if let Some(previous) = previous {
            if previous != hash {
                remove_orphan_blob(&tx, &previous)?;
            }
        }

        tx.commit()?;

        Ok(StoredObject {
            key: key.to_owned(),
            size,
            content_type: content_type.to_owned(),
            uploaded: from_millis(uploaded),
            etag: hash,
        })
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Err> {
        let rowid: Option<i64> = self
            .conn
            .query_row(
                "SELECT b.rowid FROM object o INNER JOIN blob b ON b.blake3_hash = o.blake3_hash WHERE o.key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(rowid) = rowid else {
            return Ok(None);
        };

        let mut blob = self
            .conn
            .blob_open(DatabaseName::Main, "blob", "data", rowid, true)?;
        let mut content = Vec::with_capacity(usize::try_from(blob.len()).unwrap_or_default());
        blob.read_to_end(&mut content)?;
        Ok(Some(content))
    }

    fn head(&self, key: &str) -> Result<Option<StoredObject>, Self::Err> {
        let sql = format!("{SELECT_OBJECT} WHERE key = ?1");
        let object = self
            .conn
            .query_row(&sql, params![key], stored_object_from_row)
            .optional()?;
        Ok(object)
    }

    fn delete(&mut self, key: &str) -> Result<DeleteResult, Self::Err> {
        self.enable_foreign_keys()?;
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let hash: Option<String> = tx
            .query_row(
                "SELECT blake3_hash FROM object WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(hash) = hash else {
            return Ok(DeleteResult::default());
        };

        let objects = tx.execute("DELETE FROM object WHERE key = ?1", params![key])?;
        let blobs = remove_orphan_blob(&tx, &hash)?;
        tx.commit()?;

        Ok(DeleteResult { objects, blobs })
    }

    fn list(&self, prefix: &str, limit: usize) -> Result<Vec<StoredObject>, Self::Err> {
        // substr instead of LIKE so that '%' and '_' in prefixes match literally
        let sql = format!(
            "{SELECT_OBJECT} WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key LIMIT ?2"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![prefix, limit], stored_object_from_row)?;
        let objects = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(objects)
    }

    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<DeleteResult, Self::Err> {
        self.enable_foreign_keys()?;
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let objects = tx.execute(
            "DELETE FROM object WHERE uploaded < ?1",
            params![cutoff.timestamp_millis()],
        )?;
        let blobs = tx.execute(
            "DELETE FROM blob WHERE NOT EXISTS (SELECT 1 FROM object WHERE object.blake3_hash = blob.blake3_hash)",
            [],
        )?;
        tx.commit()?;

        Ok(DeleteResult { objects, blobs })
    }
}

impl Sqlite {
    /// Opens a database file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened in the requested mode.
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self, StoreError> {
        let conn = match mode {
            Mode::ReadWrite => Connection::open(path),
            Mode::ReadOnly => Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY),
        }?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    fn enable_foreign_keys(&self) -> Result<(), rusqlite::Error> {
        self.pragma_update("foreign_keys", "ON")
    }

    fn assign_cache_size(&self) -> Result<(), rusqlite::Error> {
        self.pragma_update("cache_size", CACHE_SIZE)
    }

    fn pragma_update(&self, name: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.pragma_update(None, name, value)
    }
}

fn remove_orphan_blob(tx: &Transaction, hash: &str) -> Result<usize, rusqlite::Error> {
    tx.execute(
        "DELETE FROM blob WHERE blake3_hash = ?1 AND NOT EXISTS (SELECT 1 FROM object WHERE blake3_hash = ?1)",
        params![hash],
    )
}

fn stored_object_from_row(row: &Row) -> Result<StoredObject, rusqlite::Error> {
    let size: i64 = row.get(3)?;
    Ok(StoredObject {
        key: row.get(0)?,
        etag: row.get(1)?,
        content_type: row.get(2)?,
        size: usize::try_from(size).unwrap_or_default(),
        uploaded: from_millis(row.get(4)?),
    })
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Store {
        _dir: TempDir,
        sqlite: Sqlite,
    }

    #[fixture]
    fn store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = Sqlite::open(dir.path().join("test.db"), Mode::ReadWrite).unwrap();
        sqlite.new_database().unwrap();
        Store { _dir: dir, sqlite }
    }

    fn blob_count(sqlite: &Sqlite) -> i64 {
        sqlite
            .conn
            .query_row("SELECT COUNT(*) FROM blob", [], |r| r.get(0))
            .unwrap()
    }

    #[rstest]
    fn put_then_get_and_head(store: Store) {
        // Arrange
        let mut sqlite = store.sqlite;

        // Act
        let stored = sqlite
            .put("uploads/1-a.png", b"payload".to_vec(), "image/png")
            .unwrap();
        let data = sqlite.get("uploads/1-a.png").unwrap();
        let info = sqlite.head("uploads/1-a.png").unwrap();

        // Assert
        assert_eq!(data.as_deref(), Some(&b"payload"[..]));
        assert_eq!(info.as_ref(), Some(&stored));
        assert_eq!(stored.size, 7);
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(stored.etag, blake3::hash(b"payload").to_string());
    }

    #[rstest]
    fn absent_key(store: Store) {
        // Arrange
        let mut sqlite = store.sqlite;

        // Act & Assert
        assert!(sqlite.get("nope").unwrap().is_none());
        assert!(sqlite.head("nope").unwrap().is_none());
        assert_eq!(sqlite.delete("nope").unwrap(), DeleteResult::default());
    }

    #[rstest]
    fn put_replaces_existing_key(store: Store) {
        // Arrange
        let mut sqlite = store.sqlite;
        sqlite.put("k", b"first".to_vec(), "image/png").unwrap();

        // Act
        sqlite.put("k", b"second".to_vec(), "image/webp").unwrap();

        // Assert
        assert_eq!(sqlite.get("k").unwrap().as_deref(), Some(&b"second"[..]));
        assert_eq!(sqlite.head("k").unwrap().unwrap().content_type, "image/webp");
        assert_eq!(blob_count(&sqlite), 1);
    }

    #[rstest]
    fn same_payload_shares_blob(store: Store) {
        // Arrange
        let mut sqlite = store.sqlite;
        sqlite.put("a", b"same".to_vec(), "image/png").unwrap();
        sqlite.put("b", b"same".to_vec(), "image/jpeg").unwrap();

        // Act
        let first = sqlite.delete("a").unwrap();
        let second = sqlite.delete("b").unwrap();

        // Assert
        assert_eq!(first, DeleteResult { objects: 1, blobs: 0 });
        assert_eq!(second, DeleteResult { objects: 1, blobs: 1 });
        assert_eq!(blob_count(&sqlite), 0);
    }

    #[rstest]
    #[case("uploads/", 10, vec!["uploads/1-a.png", "uploads/2-b.png", "uploads/3-c.png"])]
    #[case("uploads/", 2, vec!["uploads/1-a.png", "uploads/2-b.png"])]
    #[case("converted/", 10, vec!["converted/1-a.jpg"])]
    #[case("", 10, vec!["converted/1-a.jpg", "up%loads", "uploads/1-a.png", "uploads/2-b.png", "uploads/3-c.png"])]
    #[case("up%", 10, vec!["up%loads"])]
    #[case("missing/", 10, vec![])]
    #[trace]
    fn list_by_prefix(
        #[notrace] store: Store,
        #[case] prefix: &str,
        #[case] limit: usize,
        #[case] expected: Vec<&str>,
    ) {
        // Arrange
        let mut sqlite = store.sqlite;
        for key in [
            "uploads/3-c.png",
            "uploads/1-a.png",
            "converted/1-a.jpg",
            "uploads/2-b.png",
            "up%loads",
        ] {
            sqlite.put(key, key.as_bytes().to_vec(), "image/png").unwrap();
        }

        // Act
        let listed = sqlite.list(prefix, limit).unwrap();

        // Assert
        let keys: Vec<&str> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, expected);
    }

    #[rstest]
    fn delete_older_than_cutoff(store: Store) {
        // Arrange
        let mut sqlite = store.sqlite;
        sqlite.put("old", b"old".to_vec(), "image/png").unwrap();
        sqlite
            .conn
            .execute("UPDATE object SET uploaded = 0 WHERE key = 'old'", [])
            .unwrap();
        sqlite.put("fresh", b"fresh".to_vec(), "image/png").unwrap();
        let cutoff = Utc::now() - TimeDelta::hours(8);

        // Act
        let deleted = sqlite.delete_older_than(cutoff).unwrap();

        // Assert
        assert_eq!(deleted, DeleteResult { objects: 1, blobs: 1 });
        assert!(sqlite.head("old").unwrap().is_none());
        assert!(sqlite.head("fresh").unwrap().is_some());
    }

    #[rstest]
    fn read_only_mode_reads(store: Store) {
        // Arrange
        let mut sqlite = store.sqlite;
        sqlite.put("k", b"v".to_vec(), "image/gif").unwrap();
        let path = store._dir.path().join("test.db");

        // Act
        let reader = Sqlite::open(path, Mode::ReadOnly).unwrap();

        // Assert
        assert_eq!(reader.get("k").unwrap().as_deref(), Some(&b"v"[..]));
    }

    #[rstest]
    fn concurrent_writers_wait_for_each_other(store: Store) {
        // Arrange
        let path = store._dir.path().join("test.db");
        let threads = 8;
        let puts = 50;

        // Act
        let failures: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let path = path.clone();
                    scope.spawn(move || {
                        let mut writer = Sqlite::open(&path, Mode::ReadWrite).unwrap();
                        let mut failures = Vec::new();
                        for i in 0..puts {
                            let key = format!("uploads/{t}-{i}.png");
                            if let Err(e) = writer.put(&key, key.as_bytes().to_vec(), "image/png") {
                                failures.push(e.to_string());
                            }
                            if let Err(e) = writer.delete(&format!("uploads/{t}-{}.png", i / 2)) {
                                failures.push(e.to_string());
                            }
                        }
                        failures
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        // Assert
        assert!(failures.is_empty(), "{} failed, first: {:?}", failures.len(), failures.first());
        // each thread deletes the first half of its own keys
        let remaining = store.sqlite.list("uploads/", 1000).unwrap();
        assert_eq!(remaining.len(), threads * puts / 2);
    }
}
