// Engine module - 检测引擎适配器
// 所有检测能力的统一包装：给定文件路径，在各自的超时内返回结构化结果。
// 适配器内部的任何失败都被捕获为 EngineResult，绝不向编排器抛出

pub mod anomaly;
pub mod forensic;
pub mod pattern;
pub mod signature;
pub mod sqlite;

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ArtifactKind;

pub use anomaly::AnomalyEngine;
pub use forensic::ForensicEngine;
pub use pattern::PatternEngine;
pub use signature::SignatureEngine;
pub use sqlite::DatabaseEngine;

/// 引擎标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineId {
    Signature,
    Pattern,
    Anomaly,
    SqliteInspect,
    Forensic,
}

impl EngineId {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineId::Signature => "signature",
            EngineId::Pattern => "pattern",
            EngineId::Anomaly => "anomaly",
            EngineId::SqliteInspect => "sqlite_inspect",
            EngineId::Forensic => "forensic",
        }
    }
}

/// 一次引擎调用的终态。
/// skipped 表示引擎无法尝试（缺少规则文件、未配置外部工具），
/// 与 failed（尝试过但出错）区分开
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Ok,
    Failed,
    TimedOut,
    Skipped,
}

/// 引擎特定的结构化发现。空的发现集合（比如零条签名命中）
/// 仍是合法的 ok 结果，不能与 failed 混淆
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineFindings {
    Signatures {
        matches: Vec<String>,
    },
    Patterns {
        emails: Vec<String>,
        ips: Vec<String>,
        urls: Vec<String>,
    },
    Anomaly {
        score: f64,
    },
    Database(DatabaseReport),
    Forensic(ForensicReport),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseReport {
    pub table_count: usize,
    pub tables: Vec<TableInfo>,
    /// 表名命中敏感词表的表
    pub flagged_tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub row_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicReport {
    pub count: usize,
    pub reports: Vec<serde_json::Value>,
}

/// 一次适配器调用的结果，产生后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResult {
    pub engine: EngineId,
    pub status: EngineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<EngineFindings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl EngineResult {
    /// 引擎任务异常中止时的占位结果
    pub fn aborted(engine: EngineId) -> Self {
        Self {
            engine,
            status: EngineStatus::Failed,
            findings: None,
            error: Some("engine task aborted".to_string()),
            elapsed_ms: 0,
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine exited with status {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("malformed engine output: {0}")]
    MalformedOutput(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

/// 检测引擎适配器 trait - 所有引擎都需要实现此接口。
/// 对同一份工件内容，run 必须返回相同的发现（可用假引擎替换做测试）
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// 引擎标识
    fn id(&self) -> EngineId;

    /// 该引擎是否适用于此类工件
    fn applies_to(&self, kind: ArtifactKind) -> bool;

    /// 引擎自己的超时上限
    fn timeout(&self) -> Duration;

    /// 扫描单个文件，只读访问
    async fn run(&self, path: &Path) -> Result<EngineFindings, EngineError>;
}

/// 带超时地调用一个适配器，把所有出错路径收敛成 EngineResult。
/// 超时丢弃 run 的 future；外部进程用 kill_on_drop 生成，
/// future 被丢弃时子进程随之终止，不会留下孤儿进程
pub async fn invoke(adapter: &dyn EngineAdapter, path: &Path) -> EngineResult {
    let engine = adapter.id();
    let limit = adapter.timeout();
    let started = Instant::now();

    let outcome = tokio::time::timeout(limit, adapter.run(path)).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(findings)) => EngineResult {
            engine,
            status: EngineStatus::Ok,
            findings: Some(findings),
            error: None,
            elapsed_ms,
        },
        Ok(Err(EngineError::Unavailable(reason))) => {
            tracing::debug!(engine = engine.as_str(), %reason, "engine skipped");
            EngineResult {
                engine,
                status: EngineStatus::Skipped,
                findings: None,
                error: Some(reason),
                elapsed_ms,
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(engine = engine.as_str(), error = %e, "engine failed");
            EngineResult {
                engine,
                status: EngineStatus::Failed,
                findings: None,
                error: Some(e.to_string()),
                elapsed_ms,
            }
        }
        Err(_) => {
            tracing::warn!(engine = engine.as_str(), timeout = ?limit, "engine timed out");
            EngineResult {
                engine,
                status: EngineStatus::TimedOut,
                findings: None,
                error: Some(format!("timed out after {:?}", limit)),
                elapsed_ms,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct StubAdapter {
        outcome: fn() -> Result<EngineFindings, EngineError>,
        timeout: Duration,
    }

    #[async_trait]
    impl EngineAdapter for StubAdapter {
        fn id(&self) -> EngineId {
            EngineId::Signature
        }

        fn applies_to(&self, _kind: ArtifactKind) -> bool {
            true
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        async fn run(&self, _path: &Path) -> Result<EngineFindings, EngineError> {
            (self.outcome)()
        }
    }

    struct SlowAdapter;

    #[async_trait]
    impl EngineAdapter for SlowAdapter {
        fn id(&self) -> EngineId {
            EngineId::Anomaly
        }

        fn applies_to(&self, _kind: ArtifactKind) -> bool {
            true
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn run(&self, _path: &Path) -> Result<EngineFindings, EngineError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(EngineFindings::Anomaly { score: 0.0 })
        }
    }

    #[tokio::test]
    async fn empty_findings_are_still_ok() {
        let adapter = StubAdapter {
            outcome: || Ok(EngineFindings::Signatures { matches: vec![] }),
            timeout: Duration::from_secs(5),
        };
        let result = invoke(&adapter, &PathBuf::from("/dev/null")).await;
        assert_eq!(result.status, EngineStatus::Ok);
        assert_eq!(
            result.findings,
            Some(EngineFindings::Signatures { matches: vec![] })
        );
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn run_error_becomes_failed_result() {
        let adapter = StubAdapter {
            outcome: || {
                Err(EngineError::NonZeroExit {
                    code: 2,
                    stderr: "boom".to_string(),
                })
            },
            timeout: Duration::from_secs(5),
        };
        let result = invoke(&adapter, &PathBuf::from("/dev/null")).await;
        assert_eq!(result.status, EngineStatus::Failed);
        assert!(result.findings.is_none());
        assert!(result.error.as_deref().unwrap_or("").contains("boom"));
    }

    #[tokio::test]
    async fn unavailable_becomes_skipped() {
        let adapter = StubAdapter {
            outcome: || Err(EngineError::Unavailable("no rules file".to_string())),
            timeout: Duration::from_secs(5),
        };
        let result = invoke(&adapter, &PathBuf::from("/dev/null")).await;
        assert_eq!(result.status, EngineStatus::Skipped);
        assert_eq!(result.error.as_deref(), Some("no rules file"));
    }

    #[tokio::test]
    async fn slow_adapter_times_out_within_bound() {
        let started = Instant::now();
        let result = invoke(&SlowAdapter, &PathBuf::from("/dev/null")).await;
        let elapsed = started.elapsed();

        assert_eq!(result.status, EngineStatus::TimedOut);
        assert!(result.findings.is_none());
        // 1 秒超时 + 有限的调度余量
        assert!(elapsed >= Duration::from_millis(950));
        assert!(elapsed <= Duration::from_millis(1300), "took {:?}", elapsed);
    }
}
