//! The JSONL wire record shared between worker and driver.

use serde::{Deserialize, Serialize};

use crate::item::NodeId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub nodeid: NodeId,
    pub outcome: Outcome,
    pub duration_ms: f64,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub error: Option<ResultError>,
    pub error_type: Option<String>,
}

impl TestOutcome {
    pub fn skipped(nodeid: NodeId, reason: Option<String>) -> Self {
        Self {
            nodeid,
            outcome: Outcome::Skipped,
            duration_ms: 0.0,
            stdout: String::new(),
            stderr: String::new(),
            error: reason.map(|r| ResultError {
                kind: "Skipped".to_string(),
                message: r.clone(),
                traceback: None,
                reason: Some(r),
            }),
            error_type: Some("Skipped".to_string()),
        }
    }

    pub fn crashed(nodeid: NodeId) -> Self {
        Self {
            nodeid,
            outcome: Outcome::Error,
            duration_ms: 0.0,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(ResultError {
                kind: "WorkerCrash".to_string(),
                message: "worker crashed before running test".to_string(),
                traceback: None,
                reason: None,
            }),
            error_type: Some("WorkerCrash".to_string()),
        }
    }
}
