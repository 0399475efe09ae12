// Signature engine - YARA 签名匹配
// 以参数向量方式调用 yara 二进制（不经过 shell），stdout 每行首个字段是命中的规则名。
// 零命中退出码仍为 0，输出为空，这是合法的 ok 结果

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{EngineAdapter, EngineError, EngineFindings, EngineId};
use crate::artifact::ArtifactKind;
use crate::config::SignatureConfig;

pub struct SignatureEngine {
    binary: PathBuf,
    rules_path: PathBuf,
    timeout: Duration,
}

impl SignatureEngine {
    pub fn new(config: &SignatureConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            rules_path: config.rules_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl EngineAdapter for SignatureEngine {
    fn id(&self) -> EngineId {
        EngineId::Signature
    }

    fn applies_to(&self, _kind: ArtifactKind) -> bool {
        // 所有工件都按字节流匹配，归档也不例外
        true
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, path: &Path) -> Result<EngineFindings, EngineError> {
        if !self.rules_path.exists() {
            return Err(EngineError::Unavailable(format!(
                "rules file not found: {}",
                self.rules_path.display()
            )));
        }

        let output = Command::new(&self.binary)
            .arg(&self.rules_path)
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

        // 每行形如 "RuleName /path/to/file"
        let matches = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(|rule| rule.to_string())
            .collect();

        Ok(EngineFindings::Signatures { matches })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{invoke, EngineStatus};
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_rules_file_skips_the_engine() {
        let engine = SignatureEngine::new(&SignatureConfig {
            binary: PathBuf::from("yara"),
            rules_path: PathBuf::from("/no/such/rules.yar"),
            timeout_secs: 5,
        });
        let result = invoke(&engine, Path::new("/dev/null")).await;
        assert_eq!(result.status, EngineStatus::Skipped);
    }

    #[tokio::test]
    async fn missing_binary_fails_the_engine() {
        let dir = tempdir().unwrap();
        let rules = dir.path().join("rules.yar");
        std::fs::write(&rules, "rule dummy { condition: false }").unwrap();

        let engine = SignatureEngine::new(&SignatureConfig {
            binary: PathBuf::from("definitely-not-a-yara-binary"),
            rules_path: rules,
            timeout_secs: 5,
        });
        let result = invoke(&engine, Path::new("/dev/null")).await;
        assert_eq!(result.status, EngineStatus::Failed);
        assert!(result.error.is_some());
    }
}
