//! One JSON line per finished attempt, appended to a file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkerError;
use crate::state::TaskState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultLine {
    pub timestamp: DateTime<Utc>,
    pub base: String,
    pub status: TaskState,
    pub engine: String,
    pub model: String,
    pub exit_code: Option<i32>,
    pub reason: Option<String>,
    /// Tries made so far, this one included.
    pub attempt: u32,
    pub duration_ms: u64,
    /// Terminal entry the attempt produced.
    pub path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ResultsSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl ResultsSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| WorkerError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| WorkerError::io(&path, e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one line. A failed write is logged, never fatal for the run.
    pub fn record(&self, line: &ResultLine) {
        let mut bytes = match serde_json::to_vec(line) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "cannot serialise result line");
                return;
            }
        };
        bytes.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = file.write_all(&bytes).and_then(|_| file.flush()) {
            tracing::warn!(path = %self.path.display(), error = %e, "cannot append result line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/results.jsonl");
        let sink = ResultsSink::open(&path).unwrap();
        for (base, status) in [("a.md", TaskState::Done), ("b.md", TaskState::Failed)] {
            sink.record(&ResultLine {
                timestamp: Utc::now(),
                base: base.into(),
                status,
                engine: "codex".into(),
                model: "o4-mini".into(),
                exit_code: Some(if status == TaskState::Done { 0 } else { 1 }),
                reason: None,
                attempt: 1,
                duration_ms: 5,
                path: None,
            });
        }
        drop(sink);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<ResultLine> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].base, "b.md");
        assert_eq!(lines[1].status, TaskState::Failed);
        assert!(text.contains("\"status\":\"failed\""));
    }
}
