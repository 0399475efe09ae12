use async_trait::async_trait;
use deepscan_core::{ScanRecord, ScanStore};
use sqlx::{Pool, Sqlite};

/// ScanStore 的 SQLite 实现，引擎结果整体存成 JSON 文本列
pub struct SqliteScanStore {
    db: Pool<Sqlite>,
}

impl SqliteScanStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ScanStore for SqliteScanStore {
    async fn save(&self, record: &ScanRecord) -> anyhow::Result<()> {
        let engine_results = serde_json::to_string(&record.engine_results)?;

        sqlx::query(
            "INSERT INTO scans (uuid, filename, artifact_kind, sha1, engine_results, risk_level, scanned_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.filename)
        .bind(record.artifact_kind.to_string())
        .bind(&record.sha1)
        .bind(engine_results)
        .bind(record.risk_level.to_string())
        .bind(record.scanned_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
