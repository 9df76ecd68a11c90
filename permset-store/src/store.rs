use async_trait::async_trait;
use permset_core::{next_revision, PermissionRecord, RecordFilter, RecordStore, StoreError};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Params, TransactionBehavior};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// SQLite-based permission record storage
///
/// Each record is stored as one JSON document, with its source id and type
/// copied into indexed columns and its codes into a separate code table.
///
/// # Example
/// ```no_run
/// use permset_core::{GrantManager, PermissionSet};
/// use permset_store::SqliteRecordStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SqliteRecordStore::new(".permset/permissions.db")?;
/// let manager = GrantManager::new(store);
///
/// let set: PermissionSet = "io.cozy.files:ALL".parse()?;
/// manager.create_application_grant("drive", set).await?;
/// # Ok(())
/// # }
/// ```
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) the store at path
    ///
    /// Creates the parent directory and the tables if they don't exist.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path).map_err(backend("failed to open database"))?;
        log::debug!("opened permission store at {}", path.display());
        Self::with_connection(conn)
    }

    /// Store backed by a private in-memory database
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend("failed to open database"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(include_str!("schema.sql"))
            .map_err(backend("failed to initialize schema"))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection mutex poisoned".to_string()))
    }
}

fn backend(context: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |e| StoreError::Backend(format!("{}: {}", context, e))
}

fn query_docs(
    conn: &Connection,
    sql: &str,
    params: impl Params,
) -> Result<Vec<PermissionRecord>, StoreError> {
    let mut stmt = conn.prepare(sql).map_err(backend("failed to prepare query"))?;
    let docs = stmt
        .query_map(params, |row| row.get::<_, String>(0))
        .map_err(backend("failed to query records"))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(backend("failed to read records"))?;

    docs.iter()
        .map(|doc| serde_json::from_str(doc).map_err(StoreError::from))
        .collect()
}

fn insert_record(conn: &Connection, record: &PermissionRecord) -> Result<(), StoreError> {
    let doc = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO permissions (id, rev, type, source_id, doc) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.id,
            record.rev,
            record.record_type.as_str(),
            record.source_id,
            doc
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict(format!("id {} is already taken", record.id))
        }
        other => backend("failed to insert record")(other),
    })?;
    insert_codes(conn, record)
}

fn insert_codes(conn: &Connection, record: &PermissionRecord) -> Result<(), StoreError> {
    for (name, code) in &record.codes {
        conn.execute(
            "INSERT INTO permission_codes (permission_id, name, code) VALUES (?1, ?2, ?3)",
            params![record.id, name, code],
        )
        .map_err(backend("failed to insert code"))?;
    }
    Ok(())
}

fn prepare_new(mut record: PermissionRecord) -> PermissionRecord {
    if record.id.is_empty() {
        record.id = Uuid::new_v4().simple().to_string();
    }
    record.rev = next_revision("");
    record
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, id: &str) -> Result<Option<PermissionRecord>, StoreError> {
        let conn = self.lock()?;
        let doc = conn
            .query_row(
                "SELECT doc FROM permissions WHERE id = ?1",
                params![id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(backend("failed to get record"))?;

        doc.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
            .transpose()
    }

    async fn find(&self, filter: &RecordFilter) -> Result<Vec<PermissionRecord>, StoreError> {
        let conn = self.lock()?;
        match filter.record_type {
            Some(record_type) => query_docs(
                &conn,
                "SELECT doc FROM permissions WHERE source_id = ?1 AND type = ?2 ORDER BY id",
                params![filter.source_id, record_type.as_str()],
            ),
            None => query_docs(
                &conn,
                "SELECT doc FROM permissions WHERE source_id = ?1 ORDER BY id",
                params![filter.source_id],
            ),
        }
    }

    async fn find_by_code(&self, code: &str) -> Result<Vec<PermissionRecord>, StoreError> {
        let conn = self.lock()?;
        query_docs(
            &conn,
            "SELECT doc FROM permissions
             WHERE id IN (SELECT permission_id FROM permission_codes WHERE code = ?1)
             ORDER BY id",
            params![code],
        )
    }

    async fn create(&self, record: PermissionRecord) -> Result<PermissionRecord, StoreError> {
        let record = prepare_new(record);
        let mut conn = self.lock()?;

        let tx = conn
            .transaction()
            .map_err(backend("failed to begin transaction"))?;
        insert_record(&tx, &record)?;
        tx.commit().map_err(backend("failed to commit transaction"))?;

        Ok(record)
    }

    async fn create_exclusive(
        &self,
        record: PermissionRecord,
    ) -> Result<PermissionRecord, StoreError> {
        let record = prepare_new(record);
        let mut conn = self.lock()?;

        // Immediate: take the write lock before the existence check so no
        // other connection can insert in between
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend("failed to begin transaction"))?;

        let exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM permissions WHERE source_id = ?1 AND type = ?2)",
                params![record.source_id, record.record_type.as_str()],
                |row| row.get(0),
            )
            .map_err(backend("failed to check existing records"))?;
        if exists {
            return Err(StoreError::Exists(format!(
                "{} ({})",
                record.source_id, record.record_type
            )));
        }

        insert_record(&tx, &record)?;
        tx.commit().map_err(backend("failed to commit transaction"))?;

        Ok(record)
    }

    async fn update(&self, mut record: PermissionRecord) -> Result<PermissionRecord, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend("failed to begin transaction"))?;

        let stored_rev: Option<String> = tx
            .query_row(
                "SELECT rev FROM permissions WHERE id = ?1",
                params![record.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend("failed to read revision"))?;

        match stored_rev {
            None => return Err(StoreError::NotFound(record.id.clone())),
            Some(rev) if rev != record.rev => {
                return Err(StoreError::Conflict(format!(
                    "record {} is at revision {}, got {}",
                    record.id, rev, record.rev
                )))
            }
            Some(_) => {}
        }

        record.rev = next_revision(&record.rev);
        let doc = serde_json::to_string(&record)?;
        tx.execute(
            "UPDATE permissions SET rev = ?2, type = ?3, source_id = ?4, doc = ?5 WHERE id = ?1",
            params![
                record.id,
                record.rev,
                record.record_type.as_str(),
                record.source_id,
                doc
            ],
        )
        .map_err(backend("failed to update record"))?;
        tx.execute(
            "DELETE FROM permission_codes WHERE permission_id = ?1",
            params![record.id],
        )
        .map_err(backend("failed to clear codes"))?;
        insert_codes(&tx, &record)?;

        tx.commit().map_err(backend("failed to commit transaction"))?;
        Ok(record)
    }

    async fn delete(&self, record: &PermissionRecord) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(backend("failed to begin transaction"))?;

        tx.execute(
            "DELETE FROM permission_codes WHERE permission_id = ?1",
            params![record.id],
        )
        .map_err(backend("failed to delete codes"))?;
        let rows = tx
            .execute("DELETE FROM permissions WHERE id = ?1", params![record.id])
            .map_err(backend("failed to delete record"))?;

        tx.commit().map_err(backend("failed to commit transaction"))?;
        Ok(rows > 0)
    }
}
