//! Storage collaborator: pending-record batches, user lookup and the
//! municipality table.

use crate::fields::{Field, FieldKind};
use crate::normalize::normalize_header;
use crate::record::PendingRecord;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

pub const PENDING_TABLE: &str = "analisis_quimicos_pendientes";

/// Rows per multi-row INSERT; keeps each statement well under the
/// Postgres bind-parameter limit.
pub const DEFAULT_INSERT_CHUNK: usize = 500;

/// Account that owns uploaded records.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub nombre: String,
}

/// Municipality names held in memory for repeated lookups during a bulk
/// load. Names are compared in normalized form.
#[derive(Debug, Clone, Default)]
pub struct MunicipalityIndex {
    by_name: HashMap<String, Uuid>,
}

impl MunicipalityIndex {
    pub fn from_rows(rows: impl IntoIterator<Item = (Uuid, String)>) -> Self {
        let mut by_name = HashMap::new();
        for (id, name) in rows {
            let key = normalize_header(&name);
            if !key.is_empty() {
                by_name.entry(key).or_insert(id);
            }
        }
        Self { by_name }
    }

    pub fn lookup(&self, name: &str) -> Option<Uuid> {
        self.by_name.get(&normalize_header(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Stores all records in one transaction; nothing is kept on error.
    async fn insert_pending(&self, records: &[PendingRecord]) -> Result<u64>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn load_municipalities(&self) -> Result<MunicipalityIndex>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    insert_chunk: usize,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            insert_chunk: DEFAULT_INSERT_CHUNK,
        }
    }

    pub fn with_insert_chunk(mut self, rows: usize) -> Self {
        self.insert_chunk = rows.max(1);
        self
    }
}

/// `INSERT INTO ... (columns) ` prefix shared by every chunk.
fn insert_prefix() -> String {
    let mut columns = vec![
        "id",
        "usuario_id",
        "municipio_id",
        "nombre_archivo",
        "estatus",
        "comentario_invalido",
        "fecha_creacion",
    ];
    columns.extend(Field::ALL.iter().map(|f| f.column()));
    format!("INSERT INTO {} ({}) ", PENDING_TABLE, columns.join(", "))
}

#[async_trait]
impl AnalysisStore for PgStore {
    async fn insert_pending(&self, records: &[PendingRecord]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let prefix = insert_prefix();
        let mut affected: u64 = 0;
        for chunk in records.chunks(self.insert_chunk) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(prefix.as_str());
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.id)
                    .push_bind(record.owner_id)
                    .push_bind(record.municipio_id)
                    .push_bind(record.filename.as_str())
                    .push_bind(record.status.as_str())
                    .push_bind(record.invalid_comment.as_deref())
                    .push_bind(record.created_at);
                for field in Field::ALL {
                    match field.kind() {
                        FieldKind::Text => row.push_bind(record.values.text(field)),
                        FieldKind::Number => row.push_bind(record.values.number(field)),
                    };
                }
            });

            match builder.build().execute(&mut *tx).await {
                Ok(result) => affected += result.rows_affected(),
                Err(e) => {
                    warn!(error = %e, "insert failed, rolling back batch");
                    tx.rollback().await.context("Failed to roll back transaction")?;
                    return Err(anyhow!(e).context("Failed to insert pending records"));
                }
            }
        }

        tx.commit().await.context("Failed to commit transaction")?;
        debug!(rows = affected, "pending records committed");
        Ok(affected)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, nombre FROM usuarios WHERE lower(email) = lower($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up user")?;
        Ok(user)
    }

    async fn load_municipalities(&self) -> Result<MunicipalityIndex> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as("SELECT id, nombre FROM municipios")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load municipalities")?;
        Ok(MunicipalityIndex::from_rows(rows))
    }
}

/// In-process store for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PendingRecord>>,
    users: Vec<User>,
    municipalities: Vec<(Uuid, String)>,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.push(user);
        self
    }

    pub fn with_municipality(mut self, id: Uuid, name: &str) -> Self {
        self.municipalities.push((id, name.to_string()));
        self
    }

    /// Records committed so far.
    pub fn records(&self) -> Vec<PendingRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of successful batch commits.
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn insert_pending(&self, records: &[PendingRecord]) -> Result<u64> {
        let mut stored = self
            .records
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        stored.extend_from_slice(records);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(records.len() as u64)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim();
        Ok(self
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn load_municipalities(&self) -> Result<MunicipalityIndex> {
        Ok(MunicipalityIndex::from_rows(self.municipalities.iter().cloned()))
    }
}
