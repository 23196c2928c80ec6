use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionSummary;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid labels file: {0}")]
    Labels(String),
}

/// One persisted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub source: String,
    /// Known label of the source, for evaluation runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// Unix seconds.
    pub recorded_at: u64,
    #[serde(flatten)]
    pub summary: SessionSummary,
}

/// Downstream consumer of finished sessions.
pub trait SummarySink {
    fn record(
        &self,
        source: &str,
        actual: Option<&str>,
        summary: &SessionSummary,
    ) -> Result<(), StorageError>;
}

/// Append-only JSON-lines file of session records.
#[derive(Debug, Clone)]
pub struct SummaryLog {
    path: PathBuf,
}

impl SummaryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &SessionRecord) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }

    /// All readable records, oldest first. A missing file is an empty log;
    /// lines that fail to parse are skipped.
    pub fn load(&self) -> Result<Vec<SessionRecord>, StorageError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = n + 1,
                        error = %e,
                        "skipping malformed session record"
                    );
                }
            }
        }
        Ok(records)
    }
}

impl SummarySink for SummaryLog {
    fn record(
        &self,
        source: &str,
        actual: Option<&str>,
        summary: &SessionSummary,
    ) -> Result<(), StorageError> {
        let recorded_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.append(&SessionRecord {
            source: source.to_string(),
            actual: actual.map(str::to_string),
            recorded_at,
            summary: summary.clone(),
        })?;

        tracing::debug!(path = %self.path.display(), source, "session recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StopReason;
    use std::collections::BTreeMap;

    fn summary(dominant: Option<&str>) -> SessionSummary {
        let mut averages = BTreeMap::new();
        if dominant.is_some() {
            averages.insert("Woman".to_string(), 70.0);
            averages.insert("Man".to_string(), 30.0);
        }
        SessionSummary {
            averages,
            final_dominant: dominant.map(str::to_string),
            frames_seen: 5,
            scored_frame_count: if dominant.is_some() { 3 } else { 0 },
            no_subject_count: 1,
            error_count: if dominant.is_some() { 1 } else { 4 },
            stop_reason: StopReason::SourceExhausted,
            elapsed_secs: 1.5,
        }
    }

    #[test]
    fn appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = SummaryLog::new(dir.path().join("nested").join("sessions.jsonl"));

        log.record("video/a.mp4", None, &summary(Some("Woman"))).unwrap();
        log.record("device 0", None, &summary(None)).unwrap();

        let records = log.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "video/a.mp4");
        assert_eq!(records[0].summary, summary(Some("Woman")));
        assert_eq!(records[1].summary.final_dominant, None);
        assert!(records[1].recorded_at > 0);
    }

    #[test]
    fn missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = SummaryLog::new(dir.path().join("none.jsonl"));
        assert!(log.load().unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.jsonl");
        let log = SummaryLog::new(&path);
        log.record("a", None, &summary(Some("Man"))).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file).unwrap();
        log.record("b", None, &summary(None)).unwrap();

        let records = log.load().unwrap();
        let sources: Vec<_> = records.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["a", "b"]);
    }

    #[test]
    fn records_are_flat_json_objects() {
        let record = SessionRecord {
            source: "photo.jpg".to_string(),
            actual: None,
            recorded_at: 42,
            summary: summary(Some("Woman")),
        };
        let value: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["final_dominant"], "Woman");
        assert_eq!(value["stop_reason"], "source_exhausted");
        assert_eq!(value["recorded_at"], 42);
        assert!(value.get("actual").is_none());
    }

    #[test]
    fn actual_label_round_trips_and_defaults_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.jsonl");
        let log = SummaryLog::new(&path);
        log.record("images/a.jpg", Some("Woman"), &summary(Some("Man")))
            .unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        let older = r#"{"source":"old","recorded_at":1,"averages":{},"final_dominant":null,"frames_seen":0,"scored_frame_count":0,"no_subject_count":0,"error_count":0,"stop_reason":"cancelled"}"#;
        writeln!(file, "{older}").unwrap();

        let records = log.load().unwrap();
        assert_eq!(records[0].actual.as_deref(), Some("Woman"));
        assert_eq!(records[1].source, "old");
        assert_eq!(records[1].actual, None);
    }
}
