// Anomaly engine - 异常评分
// 调用外部打分命令（通常是 ML 模型脚本），工件路径作为最后一个参数，
// stdout 解析为 [0,1] 区间内的分数

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{EngineAdapter, EngineError, EngineFindings, EngineId};
use crate::artifact::ArtifactKind;
use crate::config::AnomalyConfig;

pub struct AnomalyEngine {
    command: Vec<String>,
    timeout: Duration,
}

impl AnomalyEngine {
    pub fn new(config: &AnomalyConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl EngineAdapter for AnomalyEngine {
    fn id(&self) -> EngineId {
        EngineId::Anomaly
    }

    fn applies_to(&self, _kind: ArtifactKind) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, path: &Path) -> Result<EngineFindings, EngineError> {
        let (program, args) = match self.command.split_first() {
            Some(split) => split,
            None => {
                return Err(EngineError::Unavailable(
                    "no scorer command configured".to_string(),
                ))
            }
        };

        let output = Command::new(program)
            .args(args)
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(EngineError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let score: f64 = text.parse().map_err(|_| {
            EngineError::MalformedOutput(format!("expected numeric score, got {:?}", text))
        })?;
        if !(0.0..=1.0).contains(&score) {
            return Err(EngineError::MalformedOutput(format!(
                "score {} outside [0,1]",
                score
            )));
        }

        Ok(EngineFindings::Anomaly { score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{invoke, EngineStatus};

    #[tokio::test]
    async fn unconfigured_scorer_is_skipped() {
        let engine = AnomalyEngine::new(&AnomalyConfig::default());
        let result = invoke(&engine, Path::new("/dev/null")).await;
        assert_eq!(result.status, EngineStatus::Skipped);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::tempdir;

        fn write_script(dir: &Path, name: &str, body: &str) -> String {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path.to_string_lossy().to_string()
        }

        #[tokio::test]
        async fn parses_score_from_stdout() {
            let dir = tempdir().unwrap();
            let script = write_script(dir.path(), "score.sh", "echo 0.42");
            let engine = AnomalyEngine::new(&AnomalyConfig {
                command: vec![script],
                timeout_secs: 5,
            });
            let result = invoke(&engine, Path::new("/dev/null")).await;
            assert_eq!(result.status, EngineStatus::Ok);
            assert_eq!(
                result.findings,
                Some(EngineFindings::Anomaly { score: 0.42 })
            );
        }

        #[tokio::test]
        async fn garbage_output_is_a_failure() {
            let dir = tempdir().unwrap();
            let script = write_script(dir.path(), "bad.sh", "echo banana");
            let engine = AnomalyEngine::new(&AnomalyConfig {
                command: vec![script],
                timeout_secs: 5,
            });
            let result = invoke(&engine, Path::new("/dev/null")).await;
            assert_eq!(result.status, EngineStatus::Failed);
        }

        #[tokio::test]
        async fn out_of_range_score_is_a_failure() {
            let dir = tempdir().unwrap();
            let script = write_script(dir.path(), "big.sh", "echo 7.5");
            let engine = AnomalyEngine::new(&AnomalyConfig {
                command: vec![script],
                timeout_secs: 5,
            });
            let result = invoke(&engine, Path::new("/dev/null")).await;
            assert_eq!(result.status, EngineStatus::Failed);
        }
    }
}
