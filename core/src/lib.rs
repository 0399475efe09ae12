// DeepScan Core Library
// 核心功能库，包含归档安全校验、检测引擎适配器、扫描编排与风险分级

pub mod artifact;
pub mod classify;
pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod record;
pub mod safety;

// 重新导出常用类型
pub use artifact::{Artifact, ArtifactKind};
pub use classify::{classify, RiskLevel, ANOMALY_THRESHOLD};
pub use config::ScanConfig;
pub use engine::{EngineAdapter, EngineFindings, EngineId, EngineResult, EngineStatus};
pub use orchestrator::ScanOrchestrator;
pub use record::{ScanRecord, ScanStore};
pub use safety::{validate_archive, ArchiveLimits, ArchiveManifest, SafetyViolation};

pub mod error {
    use thiserror::Error;

    use crate::safety::SafetyViolation;

    /// 扫描级错误：只有归档校验失败或内部故障会中止整个扫描，
    /// 单个引擎的失败记录在 EngineResult 里，不会出现在这里
    #[derive(Error, Debug)]
    pub enum ScanError {
        #[error("unsafe archive: {0}")]
        UnsafeArchive(#[from] SafetyViolation),

        #[error("scan fault: {0}")]
        Fault(String),
    }

    pub type Result<T> = std::result::Result<T, ScanError>;
}
