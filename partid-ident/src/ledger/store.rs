//! Durable record storage
//!
//! `LedgerStore` is the persistence/subscription substrate the ledger is
//! written against: insert-only keyed storage partitioned by owner, plus a
//! change feed. `SqliteLedgerStore` is the production implementation.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use partid_common::events::{EventBus, PartidEvent};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::models::{AnalysisLevel, ComponentRecord, Confidence, Identity, ImagePayload, RecordId};

/// Ledger storage failure
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("failed to encode record: {0}")]
    Serialization(String),

    /// Stored row cannot be decoded back into a record
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Persistence/subscription substrate
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Durably insert; emits a change event once committed
    async fn insert(&self, record: &ComponentRecord) -> Result<(), LedgerError>;

    /// All records of `owner`, newest first
    async fn load_owner(&self, owner: &Identity) -> Result<Vec<ComponentRecord>, LedgerError>;

    /// One record of `owner`, if present
    async fn load_record(
        &self,
        owner: &Identity,
        id: RecordId,
    ) -> Result<Option<ComponentRecord>, LedgerError>;

    /// Change feed of committed inserts across all owners
    fn changes(&self) -> broadcast::Receiver<PartidEvent>;
}

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS component_records (
        id TEXT PRIMARY KEY NOT NULL,
        owner_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        analysis_level TEXT NOT NULL,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        manufacturer TEXT NOT NULL DEFAULT '',
        package_type TEXT NOT NULL DEFAULT '',
        application_category TEXT NOT NULL DEFAULT '',
        key_features TEXT NOT NULL DEFAULT '[]',
        substitutes TEXT NOT NULL DEFAULT '[]',
        functional_blocks TEXT NOT NULL DEFAULT '[]',
        pinout TEXT NOT NULL DEFAULT '[]',
        specifications TEXT NOT NULL DEFAULT '[]',
        common_usage TEXT NOT NULL,
        confidence TEXT NOT NULL,
        datasheet_url TEXT NOT NULL DEFAULT '',
        image_format TEXT NOT NULL,
        image_data BLOB NOT NULL
    )
"#;

const CREATE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_component_records_owner_created
    ON component_records (owner_id, created_at DESC)
"#;

const SELECT_COLUMNS: &str = r#"
    SELECT id, owner_id, created_at, analysis_level, name, category, description,
           manufacturer, package_type, application_category, key_features,
           substitutes, functional_blocks, pinout, specifications, common_usage,
           confidence, datasheet_url, image_format, image_data
    FROM component_records
"#;

/// SQLite-backed ledger store
///
/// `created_at` is stored as fixed-width RFC 3339 with microseconds, so
/// text ordering equals time ordering.
#[derive(Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
    event_bus: EventBus,
}

impl SqliteLedgerStore {
    /// Open the store, creating its table if needed
    pub async fn new(pool: SqlitePool, event_bus: EventBus) -> Result<Self, LedgerError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_INDEX).execute(&pool).await?;
        debug!("component_records table ready");
        Ok(Self { pool, event_bus })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn insert(&self, record: &ComponentRecord) -> Result<(), LedgerError> {
        // Encode everything before touching the pool
        let id = record.id.to_string();
        let created_at = encode_time(record.created_at);
        let key_features = to_json(&record.key_features)?;
        let substitutes = to_json(&record.substitutes)?;
        let functional_blocks = to_json(&record.functional_blocks)?;
        let pinout = to_json(&record.pinout)?;
        let specifications = to_json(&record.specifications)?;

        sqlx::query(
            r#"
            INSERT INTO component_records (
                id, owner_id, created_at, analysis_level, name, category, description,
                manufacturer, package_type, application_category, key_features,
                substitutes, functional_blocks, pinout, specifications, common_usage,
                confidence, datasheet_url, image_format, image_data
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(record.owner_id.as_str())
        .bind(&created_at)
        .bind(record.analysis_level.as_str())
        .bind(&record.name)
        .bind(&record.category)
        .bind(&record.description)
        .bind(&record.manufacturer)
        .bind(&record.package_type)
        .bind(&record.application_category)
        .bind(&key_features)
        .bind(&substitutes)
        .bind(&functional_blocks)
        .bind(&pinout)
        .bind(&specifications)
        .bind(&record.common_usage)
        .bind(record.confidence.as_str())
        .bind(&record.datasheet_url)
        .bind(record.image.format().mime())
        .bind(record.image.bytes())
        .execute(&self.pool)
        .await?;

        info!(
            owner = %record.owner_id,
            record_id = %record.id,
            name = %record.name,
            "Record appended"
        );

        self.event_bus.emit_lossy(PartidEvent::RecordAppended {
            owner_id: record.owner_id.as_str().to_string(),
            record_id: record.id.as_uuid(),
            created_at: record.created_at,
        });

        Ok(())
    }

    async fn load_owner(&self, owner: &Identity) -> Result<Vec<ComponentRecord>, LedgerError> {
        let query = format!(
            "{} WHERE owner_id = ? ORDER BY created_at DESC, id DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(owner.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_row).collect()
    }

    async fn load_record(
        &self,
        owner: &Identity,
        id: RecordId,
    ) -> Result<Option<ComponentRecord>, LedgerError> {
        let query = format!("{} WHERE owner_id = ? AND id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(owner.as_str())
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_row).transpose()
    }

    fn changes(&self) -> broadcast::Receiver<PartidEvent> {
        self.event_bus.subscribe()
    }
}

fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, LedgerError> {
    serde_json::to_string(value).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn decode_row(row: &SqliteRow) -> Result<ComponentRecord, LedgerError> {
    let id_text: String = row.try_get("id")?;
    let corrupt = |reason: String| LedgerError::Corrupt {
        id: id_text.clone(),
        reason,
    };

    let id: RecordId = id_text
        .parse()
        .map_err(|e: uuid::Error| corrupt(format!("id: {}", e)))?;

    let owner_text: String = row.try_get("owner_id")?;
    let owner_id = Identity::new(owner_text).ok_or_else(|| corrupt("blank owner".to_string()))?;

    let created_at: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| corrupt(format!("created_at: {}", e)))?
        .with_timezone(&Utc);

    let analysis_level: String = row.try_get("analysis_level")?;
    let analysis_level: AnalysisLevel = analysis_level.parse().map_err(corrupt)?;

    let confidence: String = row.try_get("confidence")?;
    let confidence: Confidence = confidence.parse().map_err(corrupt)?;

    let image_format: String = row.try_get("image_format")?;
    let image_data: Vec<u8> = row.try_get("image_data")?;
    let image = ImagePayload::from_mime(&image_format, image_data)
        .map_err(|e| corrupt(format!("image: {}", e)))?;

    Ok(ComponentRecord {
        id,
        owner_id,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        manufacturer: row.try_get("manufacturer")?,
        package_type: row.try_get("package_type")?,
        application_category: row.try_get("application_category")?,
        key_features: from_json(row, "key_features", &corrupt)?,
        substitutes: from_json(row, "substitutes", &corrupt)?,
        functional_blocks: from_json(row, "functional_blocks", &corrupt)?,
        pinout: from_json(row, "pinout", &corrupt)?,
        specifications: from_json(row, "specifications", &corrupt)?,
        common_usage: row.try_get("common_usage")?,
        confidence,
        datasheet_url: row.try_get("datasheet_url")?,
        analysis_level,
        image,
        created_at,
    })
}

fn from_json<T: DeserializeOwned>(
    row: &SqliteRow,
    column: &str,
    corrupt: &dyn Fn(String) -> LedgerError,
) -> Result<T, LedgerError> {
    let text: String = row.try_get(column)?;
    serde_json::from_str(&text).map_err(|e| corrupt(format!("{}: {}", column, e)))
}
