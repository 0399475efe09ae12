// Pattern engine - 指标提取
// 进程内正则扫描：邮箱、IPv4 地址和 URL

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::{EngineAdapter, EngineError, EngineFindings, EngineId};
use crate::artifact::ArtifactKind;
use crate::config::PatternConfig;

pub struct PatternEngine {
    email: Regex,
    ipv4: Regex,
    url: Regex,
    timeout: Duration,
}

impl PatternEngine {
    pub fn new(config: &PatternConfig) -> Self {
        Self {
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
            ipv4: Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").unwrap(),
            url: Regex::new(r#"https?://[^\s"'<>]+"#).unwrap(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

// 去重但保持首次出现的顺序
fn collect_unique(regex: &Regex, content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in regex.find_iter(content) {
        if seen.insert(m.as_str().to_string()) {
            out.push(m.as_str().to_string());
        }
    }
    out
}

#[async_trait]
impl EngineAdapter for PatternEngine {
    fn id(&self) -> EngineId {
        EngineId::Pattern
    }

    fn applies_to(&self, _kind: ArtifactKind) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, path: &Path) -> Result<EngineFindings, EngineError> {
        let bytes = tokio::fs::read(path).await?;
        let content = String::from_utf8_lossy(&bytes);

        Ok(EngineFindings::Patterns {
            emails: collect_unique(&self.email, &content),
            ips: collect_unique(&self.ipv4, &content),
            urls: collect_unique(&self.url, &content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{invoke, EngineStatus};
    use tempfile::tempdir;

    #[tokio::test]
    async fn extracts_emails_ips_and_urls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.txt");
        std::fs::write(
            &path,
            "contact c2@evil.example or c2@evil.example\nbeacon 10.1.2.3 via http://payload.example/x\n",
        )
        .unwrap();

        let engine = PatternEngine::new(&PatternConfig::default());
        let result = invoke(&engine, &path).await;
        assert_eq!(result.status, EngineStatus::Ok);
        match result.findings {
            Some(EngineFindings::Patterns { emails, ips, urls }) => {
                assert_eq!(emails, vec!["c2@evil.example"]);
                assert_eq!(ips, vec!["10.1.2.3"]);
                assert_eq!(urls, vec!["http://payload.example/x"]);
            }
            other => panic!("unexpected findings: {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_file_yields_empty_ok() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let engine = PatternEngine::new(&PatternConfig::default());
        let result = invoke(&engine, &path).await;
        assert_eq!(result.status, EngineStatus::Ok);
        match result.findings {
            Some(EngineFindings::Patterns { emails, ips, urls }) => {
                assert!(emails.is_empty());
                assert!(ips.is_empty());
                assert!(urls.is_empty());
            }
            other => panic!("unexpected findings: {:?}", other),
        }
    }
}
