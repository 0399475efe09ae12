// Record module - 扫描记录组装与持久化协作者
// 组装器不含业务逻辑，只负责无损、保序地打包聚合结果

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::{Artifact, ArtifactKind};
use crate::classify::{classify, RiskLevel};
use crate::engine::EngineResult;

/// 一次扫描的最终产物。engine_results 按调度顺序排列，
/// risk_level 是 engine_results 的纯函数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: String,
    pub filename: String,
    pub artifact_kind: ArtifactKind,
    pub sha1: String,
    pub engine_results: Vec<EngineResult>,
    pub risk_level: RiskLevel,
    pub scanned_at: DateTime<Utc>,
}

pub fn assemble(
    artifact: &Artifact,
    sha1: String,
    engine_results: Vec<EngineResult>,
) -> ScanRecord {
    let risk_level = classify(&engine_results);
    ScanRecord {
        id: Uuid::new_v4().to_string(),
        filename: artifact.original_name.clone(),
        artifact_kind: artifact.kind,
        sha1,
        engine_results,
        risk_level,
        scanned_at: Utc::now(),
    }
}

/// 持久化协作者接口，由调用方注入（比如 web 层的 SQLite 实现）
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn save(&self, record: &ScanRecord) -> anyhow::Result<()>;
}
