// Database engine - SQLite 结构检查
// 以只读 + immutable 模式打开提交的数据库，清点 sqlite_master 里的表、
// 行数，并标记表名命中敏感词表的表

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, Row, SqliteConnection};

use super::{DatabaseReport, EngineAdapter, EngineError, EngineFindings, EngineId, TableInfo};
use crate::artifact::ArtifactKind;
use crate::config::DatabaseConfig;

// 取证上值得关注的表名关键词
const FLAGGED_NAME_PARTS: &[&str] = &[
    "password", "credential", "secret", "token", "cookie", "account", "keychain", "wallet",
];

pub struct DatabaseEngine {
    timeout: Duration,
}

impl DatabaseEngine {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl EngineAdapter for DatabaseEngine {
    fn id(&self) -> EngineId {
        EngineId::SqliteInspect
    }

    fn applies_to(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::Database
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, path: &Path) -> Result<EngineFindings, EngineError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .immutable(true);
        let mut conn = SqliteConnection::connect_with(&options).await?;

        let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&mut conn)
            .await?;

        let mut tables = Vec::new();
        let mut flagged_tables = Vec::new();
        for row in rows {
            let name: String = row.get(0);

            // 表名不能绑定参数，转义引号后按标识符引用
            let quoted = name.replace('"', "\"\"");
            let row_count = sqlx::query_scalar::<_, i64>(&format!(
                "SELECT COUNT(*) FROM \"{}\"",
                quoted
            ))
            .fetch_one(&mut conn)
            .await
            .unwrap_or(-1);

            let lowered = name.to_lowercase();
            if FLAGGED_NAME_PARTS.iter().any(|part| lowered.contains(part)) {
                flagged_tables.push(name.clone());
            }
            tables.push(TableInfo { name, row_count });
        }

        conn.close().await.ok();

        Ok(EngineFindings::Database(DatabaseReport {
            table_count: tables.len(),
            tables,
            flagged_tables,
        }))
    }
}
