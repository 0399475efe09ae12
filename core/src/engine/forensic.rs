// Forensic engine - ALEAPP 取证提取
// 调用 ALEAPP 脚本解析安卓备份归档，收集其 Json/ 目录下的结构化报告。
// 解压输出目录由本适配器独占，以 TempDir 持有，任何退出路径（包括
// 失败和超时丢弃 future）都会随 drop 清理

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use walkdir::WalkDir;

use super::{EngineAdapter, EngineError, EngineFindings, EngineId, ForensicReport};
use crate::artifact::ArtifactKind;
use crate::config::ForensicConfig;

pub struct ForensicEngine {
    python: String,
    script: PathBuf,
    scratch_root: Option<PathBuf>,
    timeout: Duration,
}

impl ForensicEngine {
    pub fn new(config: &ForensicConfig) -> Self {
        Self {
            python: config.python.clone(),
            script: config.script.clone(),
            scratch_root: config.scratch_dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    // ALEAPP 的 -t 输入类型参数
    fn input_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("zip") => "zip",
            Some("tar") => "tar",
            Some("gz") | Some("tgz") => "gz",
            _ => "fs",
        }
    }
}

#[async_trait]
impl EngineAdapter for ForensicEngine {
    fn id(&self) -> EngineId {
        EngineId::Forensic
    }

    fn applies_to(&self, kind: ArtifactKind) -> bool {
        // 只处理归档，且编排器保证安全校验已先通过
        kind == ArtifactKind::Archive
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, path: &Path) -> Result<EngineFindings, EngineError> {
        if !self.script.exists() {
            return Err(EngineError::Unavailable(format!(
                "script not found: {}",
                self.script.display()
            )));
        }

        let out_dir = match &self.scratch_root {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                tempfile::Builder::new().prefix("aleapp-").tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix("aleapp-").tempdir()?,
        };

        let output = Command::new(&self.python)
            .arg(&self.script)
            .arg("-i")
            .arg(path)
            .arg("-o")
            .arg(out_dir.path())
            .arg("-t")
            .arg(Self::input_type(path))
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(EngineError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // 没有 Json 目录时按零报告处理
        let json_dir = out_dir.path().join("Json");
        let mut reports = Vec::new();
        if json_dir.is_dir() {
            for entry in WalkDir::new(&json_dir)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let entry_path = entry.path();
                if entry.file_type().is_file()
                    && entry_path.extension().and_then(|e| e.to_str()) == Some("json")
                {
                    let text = tokio::fs::read_to_string(entry_path).await?;
                    match serde_json::from_str(&text) {
                        Ok(value) => reports.push(value),
                        Err(e) => {
                            tracing::warn!(path = %entry_path.display(), error = %e, "unparseable forensic report");
                        }
                    }
                }
            }
        }

        let count = reports.len();
        Ok(EngineFindings::Forensic(ForensicReport { count, reports }))
    }
}
