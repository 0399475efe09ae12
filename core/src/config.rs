// Config module - 扫描配置
// 编排器的所有上限、超时和外部工具路径都从这里注入，
// 不依赖任何进程级单例。全部字段有默认值，可用 YAML 文件覆盖

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::safety::ArchiveLimits;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 同时进行的扫描数量上限
    pub max_concurrent_scans: usize,
    pub archive: ArchiveLimits,
    pub signature: SignatureConfig,
    pub pattern: PatternConfig,
    pub anomaly: AnomalyConfig,
    pub database: DatabaseConfig,
    pub forensic: ForensicConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scans: 4,
            archive: ArchiveLimits::default(),
            signature: SignatureConfig::default(),
            pattern: PatternConfig::default(),
            anomaly: AnomalyConfig::default(),
            database: DatabaseConfig::default(),
            forensic: ForensicConfig::default(),
        }
    }
}

impl ScanConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: ScanConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }
}

/// YARA 签名引擎
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    pub binary: PathBuf,
    pub rules_path: PathBuf,
    pub timeout_secs: u64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yara"),
            rules_path: PathBuf::from("yara/malware_rules.yar"),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub timeout_secs: u64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// 异常评分引擎：外部打分命令，工件路径作为最后一个参数追加。
/// 默认不配置，引擎按 skipped 处理
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// ALEAPP 取证引擎，重型外部工具，超时上限宽
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForensicConfig {
    pub python: String,
    pub script: PathBuf,
    /// 解压输出目录的根，缺省用系统临时目录
    pub scratch_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ForensicConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            script: PathBuf::from("ALEAPP/aleapp.py"),
            scratch_dir: None,
            timeout_secs: 10 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deepscan.yaml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(
            b"max_concurrent_scans: 2\narchive:\n  max_entries: 50\nsignature:\n  rules_path: /opt/rules/all.yar\n",
        )
        .unwrap();

        let config = ScanConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.max_concurrent_scans, 2);
        assert_eq!(config.archive.max_entries, 50);
        // 未覆盖的字段保持默认
        assert_eq!(config.archive.max_total_size, 500 * 1024 * 1024);
        assert_eq!(config.signature.rules_path, PathBuf::from("/opt/rules/all.yar"));
        assert_eq!(config.forensic.timeout_secs, 600);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ScanConfig::from_yaml_file("/definitely/not/here.yaml").is_err());
    }
}
