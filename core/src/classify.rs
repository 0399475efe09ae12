// Classify module - 风险分级
// 聚合结果到风险等级的纯函数：同样的输入永远得到同样的等级

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::{EngineFindings, EngineResult, EngineStatus};

/// 异常评分高于该阈值判 HIGH
pub const ANOMALY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// HIGH 当且仅当：签名引擎有至少一条命中，或异常评分超过阈值。
/// 非 ok 状态的引擎不构成任何证据，失败的引擎永远不会抬高风险
pub fn classify(results: &[EngineResult]) -> RiskLevel {
    for result in results {
        if result.status != EngineStatus::Ok {
            continue;
        }
        match &result.findings {
            Some(EngineFindings::Signatures { matches }) if !matches.is_empty() => {
                return RiskLevel::High;
            }
            Some(EngineFindings::Anomaly { score }) if *score > ANOMALY_THRESHOLD => {
                return RiskLevel::High;
            }
            _ => {}
        }
    }
    RiskLevel::Low
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineId;

    fn result(
        engine: EngineId,
        status: EngineStatus,
        findings: Option<EngineFindings>,
    ) -> EngineResult {
        EngineResult {
            engine,
            status,
            findings,
            error: None,
            elapsed_ms: 1,
        }
    }

    #[test]
    fn clean_results_are_low() {
        let results = vec![
            result(
                EngineId::Signature,
                EngineStatus::Ok,
                Some(EngineFindings::Signatures { matches: vec![] }),
            ),
            result(
                EngineId::Anomaly,
                EngineStatus::Ok,
                Some(EngineFindings::Anomaly { score: 0.3 }),
            ),
        ];
        assert_eq!(classify(&results), RiskLevel::Low);
    }

    #[test]
    fn signature_match_is_high_even_with_low_score() {
        let results = vec![
            result(
                EngineId::Signature,
                EngineStatus::Ok,
                Some(EngineFindings::Signatures {
                    matches: vec!["Win32.Trojan.X".to_string()],
                }),
            ),
            result(
                EngineId::Anomaly,
                EngineStatus::Ok,
                Some(EngineFindings::Anomaly { score: 0.1 }),
            ),
        ];
        assert_eq!(classify(&results), RiskLevel::High);
    }

    #[test]
    fn high_anomaly_score_is_high() {
        let results = vec![result(
            EngineId::Anomaly,
            EngineStatus::Ok,
            Some(EngineFindings::Anomaly { score: 0.71 }),
        )];
        assert_eq!(classify(&results), RiskLevel::High);
    }

    #[test]
    fn threshold_is_exclusive() {
        let results = vec![result(
            EngineId::Anomaly,
            EngineStatus::Ok,
            Some(EngineFindings::Anomaly { score: 0.7 }),
        )];
        assert_eq!(classify(&results), RiskLevel::Low);
    }

    #[test]
    fn failed_engine_never_elevates_risk() {
        // 失败引擎即使带着发现也不算证据
        let results = vec![
            result(
                EngineId::Anomaly,
                EngineStatus::Failed,
                Some(EngineFindings::Anomaly { score: 0.99 }),
            ),
            result(
                EngineId::Signature,
                EngineStatus::TimedOut,
                Some(EngineFindings::Signatures {
                    matches: vec!["Win32.Trojan.X".to_string()],
                }),
            ),
        ];
        assert_eq!(classify(&results), RiskLevel::Low);
    }

    #[test]
    fn empty_result_set_is_low() {
        assert_eq!(classify(&[]), RiskLevel::Low);
    }

    #[test]
    fn classify_is_idempotent() {
        let results = vec![result(
            EngineId::Anomaly,
            EngineStatus::Ok,
            Some(EngineFindings::Anomaly { score: 0.9 }),
        )];
        let first = classify(&results);
        let second = classify(&results);
        assert_eq!(first, second);
    }
}
