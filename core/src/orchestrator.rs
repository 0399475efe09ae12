// Orchestrator module - 扫描编排器
// 每次扫描：归档先过安全校验，然后并发分发所有适用引擎，等全部到达
// 终态后按调度顺序聚合，分级，组装记录。单个引擎的失败只记录不中止

use std::path::Path;
use std::sync::Arc;

use sha1::{Digest, Sha1};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::artifact::{Artifact, ArtifactKind};
use crate::config::ScanConfig;
use crate::engine::{
    self, AnomalyEngine, DatabaseEngine, EngineAdapter, EngineResult, ForensicEngine,
    PatternEngine, SignatureEngine,
};
use crate::error::{Result, ScanError};
use crate::record::{self, ScanRecord, ScanStore};
use crate::safety::{self, ArchiveLimits};

pub struct ScanOrchestrator {
    /// 固定的调度顺序，记录里的结果按此排序，与完成顺序无关
    engines: Vec<Arc<dyn EngineAdapter>>,
    limits: ArchiveLimits,
    scan_permits: Arc<Semaphore>,
    store: Option<Arc<dyn ScanStore>>,
}

impl ScanOrchestrator {
    pub fn new(config: &ScanConfig) -> Self {
        let engines: Vec<Arc<dyn EngineAdapter>> = vec![
            Arc::new(SignatureEngine::new(&config.signature)),
            Arc::new(PatternEngine::new(&config.pattern)),
            Arc::new(AnomalyEngine::new(&config.anomaly)),
            Arc::new(DatabaseEngine::new(&config.database)),
            Arc::new(ForensicEngine::new(&config.forensic)),
        ];
        Self::with_engines(engines, config.archive.clone(), config.max_concurrent_scans)
    }

    /// 用显式的引擎列表构建，测试里替换假引擎用
    pub fn with_engines(
        engines: Vec<Arc<dyn EngineAdapter>>,
        limits: ArchiveLimits,
        max_concurrent_scans: usize,
    ) -> Self {
        Self {
            engines,
            limits,
            scan_permits: Arc::new(Semaphore::new(max_concurrent_scans.max(1))),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ScanStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 扫描一个工件。Artifact 被消费，调用结束时其 scratch 目录
    /// 随之销毁，无论成功失败
    pub async fn scan(&self, artifact: Artifact) -> Result<ScanRecord> {
        let _permit = self
            .scan_permits
            .acquire()
            .await
            .map_err(|_| ScanError::Fault("scan queue closed".to_string()))?;

        tracing::info!(
            filename = %artifact.original_name,
            kind = %artifact.kind,
            "scan started"
        );

        if !artifact.path.exists() {
            return Err(ScanError::Fault(format!(
                "artifact missing: {}",
                artifact.path.display()
            )));
        }
        let sha1 = digest_artifact(&artifact.path)
            .await
            .map_err(|e| ScanError::Fault(format!("artifact unreadable: {}", e)))?;

        // 归档必须先过安全校验，失败则任何引擎都不会启动
        if artifact.kind == ArtifactKind::Archive {
            let manifest = safety::validate_archive(&artifact.path, &self.limits)?;
            tracing::debug!(
                entries = manifest.entry_count,
                declared_bytes = manifest.total_declared_size,
                "archive manifest within limits"
            );
        }

        let applicable: Vec<Arc<dyn EngineAdapter>> = self
            .engines
            .iter()
            .filter(|e| e.applies_to(artifact.kind))
            .cloned()
            .collect();

        // 并发分发。引擎之间没有共享可变状态，互相也不会取消：
        // 一个引擎超时或失败，其余继续跑完
        let mut set = JoinSet::new();
        for (slot, adapter) in applicable.iter().enumerate() {
            let adapter = Arc::clone(adapter);
            let path = artifact.path.clone();
            set.spawn(async move { (slot, engine::invoke(adapter.as_ref(), &path).await) });
        }

        let mut slots: Vec<Option<EngineResult>> = (0..applicable.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((slot, result)) => slots[slot] = Some(result),
                Err(e) => tracing::error!(error = %e, "engine task aborted"),
            }
        }
        let engine_results: Vec<EngineResult> = slots
            .into_iter()
            .enumerate()
            .map(|(slot, result)| {
                result.unwrap_or_else(|| EngineResult::aborted(applicable[slot].id()))
            })
            .collect();

        let record = record::assemble(&artifact, sha1, engine_results);

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&record).await {
                // 持久化失败不影响返回扫描结果
                tracing::error!(error = %e, "failed to persist scan record");
            }
        }

        tracing::info!(id = %record.id, risk = %record.risk_level, "scan complete");
        Ok(record)
    }
}

async fn digest_artifact(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}
