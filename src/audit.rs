//! Append-only JSONL audit trail, one line per webhook request.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use anyhow::Context;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::event::CanonicalEvent;
use crate::runner::RunOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidJson,
    InvalidToken,
}

#[derive(Clone, Debug, Serialize)]
pub struct RejectionRecord {
    pub ts: String,
    pub valid: bool,
    pub reason: RejectReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub remote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WakeRecord {
    pub ts: String,
    pub valid: bool,
    pub remote: Option<String>,
    pub body: JsonValue,
    pub event: CanonicalEvent,
    pub cmd: Vec<String>,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum AuditRecord {
    Rejected(RejectionRecord),
    Wake(WakeRecord),
}

impl AuditRecord {
    pub fn invalid_json(ts: String, remote: Option<String>, error: impl Into<String>) -> Self {
        Self::Rejected(RejectionRecord {
            ts,
            valid: false,
            reason: RejectReason::InvalidJson,
            error: Some(error.into()),
            remote,
            body: None,
        })
    }

    pub fn invalid_token(ts: String, remote: Option<String>, body: JsonValue) -> Self {
        Self::Rejected(RejectionRecord {
            ts,
            valid: false,
            reason: RejectReason::InvalidToken,
            error: None,
            remote,
            body: Some(body),
        })
    }

    pub fn wake(
        ts: String,
        remote: Option<String>,
        body: JsonValue,
        event: CanonicalEvent,
        cmd: Vec<String>,
        outcome: &RunOutcome,
    ) -> Self {
        Self::Wake(WakeRecord {
            ts,
            valid: true,
            remote,
            body,
            event,
            cmd,
            ok: outcome.is_success(),
            error: outcome.diagnostic().map(str::to_string),
        })
    }
}

/// Serializes writers of one audit file.
///
/// The file is reopened in append mode for every record, so external
/// rotation can move it away between writes.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("unable to create audit log directory {}", parent.display())
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("unable to open audit log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("unable to write audit log {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::normalize;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn read_lines(path: &Path) -> anyhow::Result<Vec<JsonValue>> {
        fs::read_to_string(path)?
            .lines()
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }

    #[test]
    fn creates_parent_directories_and_appends() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let log = AuditLog::new(dir.path().join("nested").join("bridge.jsonl"));
        log.append(&AuditRecord::invalid_json(
            "2024-01-01T00:00:00Z".to_string(),
            None,
            "expected value at line 1 column 1",
        ))?;
        log.append(&AuditRecord::invalid_token(
            "2024-01-01T00:00:01Z".to_string(),
            Some("10.0.0.2".to_string()),
            json!({"event_type": "motion"}),
        ))?;

        let lines = read_lines(log.path())?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["reason"], "invalid_json");
        assert_eq!(lines[0]["valid"], false);
        assert!(lines[0].get("body").is_none());
        assert_eq!(lines[1]["reason"], "invalid_token");
        assert_eq!(lines[1]["remote"], "10.0.0.2");
        assert_eq!(lines[1]["body"]["event_type"], "motion");
        assert!(lines[1].get("error").is_none());
        Ok(())
    }

    #[test]
    fn wake_record_carries_full_outcome() -> anyhow::Result<()> {
        let body = json!({"event_type": "motion", "camera_entity": "front_door"});
        let event = normalize(body.as_object().unwrap());
        let record = AuditRecord::wake(
            "2024-01-01T00:00:00Z".to_string(),
            None,
            body,
            event,
            vec!["clawdbot".to_string()],
            &RunOutcome::failure("gateway unreachable"),
        );
        let value = serde_json::to_value(&record)?;
        assert_eq!(value["valid"], true);
        assert_eq!(value["event"]["camera_entity"], "front_door");
        assert_eq!(value["cmd"], json!(["clawdbot"]));
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], "gateway unreachable");
        assert!(value["remote"].is_null());
        Ok(())
    }

    #[test]
    fn successful_wake_records_null_error() -> anyhow::Result<()> {
        let record = AuditRecord::wake(
            "ts".to_string(),
            None,
            json!({}),
            normalize(&serde_json::Map::new()),
            Vec::new(),
            &RunOutcome::Success,
        );
        let line = serde_json::to_string(&record)?;
        assert!(line.contains(r#""ok":true,"error":null"#));
        assert!(!line.contains('\n'));
        Ok(())
    }

    #[test]
    fn concurrent_appends_do_not_interleave() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let log = AuditLog::new(dir.path().join("bridge.jsonl"));
        let padding = "x".repeat(16 * 1024);
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let log = &log;
                let padding = &padding;
                scope.spawn(move || {
                    for seq in 0..25 {
                        let body = json!({"worker": worker, "seq": seq, "padding": padding});
                        log.append(&AuditRecord::invalid_token("ts".to_string(), None, body))
                            .expect("append");
                    }
                });
            }
        });
        let lines = read_lines(log.path())?;
        assert_eq!(lines.len(), 200);
        Ok(())
    }
}
