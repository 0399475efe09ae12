use deepscan_core::{ScanConfig, ScanOrchestrator};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::sync::Arc;

use crate::store::SqliteScanStore;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ScanOrchestrator>,
    pub db: Pool<Sqlite>,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        // 扫描配置：默认值，可用 DEEPSCAN_CONFIG 指向的 YAML 覆盖
        let config = match std::env::var("DEEPSCAN_CONFIG") {
            Ok(path) => ScanConfig::from_yaml_file(&path)?,
            Err(_) => ScanConfig::default(),
        };

        let db = init_db().await?;
        Self::with_parts(config, db).await
    }

    /// 测试里注入现成的配置和连接池
    pub async fn with_parts(config: ScanConfig, db: Pool<Sqlite>) -> anyhow::Result<Self> {
        create_tables(&db).await?;

        let store = Arc::new(SqliteScanStore::new(db.clone()));
        let orchestrator = Arc::new(ScanOrchestrator::new(&config).with_store(store));

        Ok(Self { orchestrator, db })
    }
}

async fn init_db() -> anyhow::Result<Pool<Sqlite>> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            let current_dir = std::env::current_dir()?;
            format!("sqlite://{}", current_dir.join("deepscan_web.db").display())
        }
    };

    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    Ok(pool)
}

async fn create_tables(pool: &Pool<Sqlite>) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT UNIQUE NOT NULL,
            filename TEXT NOT NULL,
            artifact_kind TEXT NOT NULL,
            sha1 TEXT NOT NULL,
            engine_results TEXT NOT NULL,
            risk_level TEXT NOT NULL,
            scanned_at TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create tables: {}", e))?;

    Ok(())
}
