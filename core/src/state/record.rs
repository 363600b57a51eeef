//! On-disk record formats: the claim record kept in `.lock-<base>` and the
//! terminal record that becomes the content of a Done/Failed entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RecordError;

use super::types::TaskState;

/// Identity of one running pool. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerToken {
    pub session: Uuid,
    pub pid: u32,
    pub host: String,
    /// Process start time in seconds since the epoch, used to tell a live
    /// owner from an unrelated process that reused its pid.
    #[serde(default)]
    pub process_started: Option<u64>,
}

impl OwnerToken {
    /// Token for the calling process.
    pub fn current() -> Self {
        let pid = std::process::id();
        let mut sys = sysinfo::System::new();
        let spid = sysinfo::Pid::from_u32(pid);
        let process_started = if sys.refresh_process(spid) {
            sys.process(spid).map(|p| p.start_time())
        } else {
            None
        };
        Self {
            session: Uuid::new_v4(),
            pid,
            host: sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string()),
            process_started,
        }
    }

    pub fn short(&self) -> String {
        let s = self.session.simple().to_string();
        format!("{}@{}:{}", &s[..8], self.host, self.pid)
    }
}

/// What the pool knows about a claim besides who holds it.
#[derive(Debug, Clone, Default)]
pub struct ClaimMeta {
    pub worker_id: usize,
    pub engine: String,
    pub model: String,
}

/// Content of `.lock-<base>` while a task is Claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Unique per claim; commit and revoke compare on it.
    pub claim_id: Uuid,
    pub owner: OwnerToken,
    pub worker_id: usize,
    pub engine: String,
    pub model: String,
    /// Prior failed attempts when this claim was made.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
}

impl ClaimRecord {
    pub fn new(owner: &OwnerToken, meta: &ClaimMeta, attempt: u32) -> Self {
        Self {
            claim_id: Uuid::new_v4(),
            owner: owner.clone(),
            worker_id: meta.worker_id,
            engine: meta.engine.clone(),
            model: meta.model.clone(),
            attempt,
            started_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, RecordError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, RecordError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

const MAGIC: &str = "# codex-worker exec log";
const OUTPUT_MARK: &str = "# ---- output ----\n";
const TASK_MARK: &str = "\n# ---- task ----\n";

/// Header of a Done/Failed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalHeader {
    pub status: TaskState,
    /// Number of tries made so far, this one included.
    pub attempt: u32,
    pub reason: Option<String>,
    /// False for failures that repeating cannot fix, such as a missing binary.
    pub retryable: bool,
    pub finished_at: DateTime<Utc>,
    pub task_bytes: usize,
}

/// Full content of a Done/Failed entry.
///
/// The original task text rides along at the end so that a retry or a reset
/// can put the Pending entry back exactly as it was authored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalRecord {
    pub header: TerminalHeader,
    pub output: Vec<u8>,
    pub task: Vec<u8>,
}

impl TerminalRecord {
    pub fn new(
        status: TaskState,
        attempt: u32,
        reason: Option<String>,
        retryable: bool,
        output: Vec<u8>,
        task: Vec<u8>,
    ) -> Self {
        Self {
            header: TerminalHeader {
                status,
                attempt,
                reason: reason.map(|r| r.replace(['\r', '\n'], " ")),
                retryable,
                finished_at: Utc::now(),
                task_bytes: task.len(),
            },
            output,
            task,
        }
    }

    pub fn render(&self) -> Vec<u8> {
        let h = &self.header;
        let mut out = Vec::with_capacity(256 + self.output.len() + self.task.len());
        let head = format!(
            "{MAGIC}\n# status: {}\n# attempt: {}\n# reason: {}\n# retryable: {}\n# finished_at: {}\n# task_bytes: {}\n",
            h.status.as_str(),
            h.attempt,
            h.reason.as_deref().unwrap_or("none"),
            h.retryable,
            h.finished_at.to_rfc3339(),
            h.task_bytes,
        );
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(OUTPUT_MARK.as_bytes());
        out.extend_from_slice(&self.output);
        out.extend_from_slice(TASK_MARK.as_bytes());
        out.extend_from_slice(&self.task);
        out
    }

    /// `Some` when `bytes` is a complete record rather than task text.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if !bytes.starts_with(MAGIC.as_bytes()) {
            return None;
        }
        Self::parse(bytes).ok()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, RecordError> {
        let head_end = find(bytes, OUTPUT_MARK.as_bytes()).ok_or(RecordError::MissingOutput)?;
        let head = String::from_utf8_lossy(&bytes[..head_end]);
        let header = parse_header(&head)?;

        let body = &bytes[head_end + OUTPUT_MARK.len()..];
        let n = header.task_bytes;
        let truncated = RecordError::TruncatedTask { expected: n };
        if body.len() < n + TASK_MARK.len() {
            return Err(truncated);
        }
        let (rest, task) = body.split_at(body.len() - n);
        let output = rest.strip_suffix(TASK_MARK.as_bytes()).ok_or(truncated)?;

        Ok(Self {
            header,
            output: output.to_vec(),
            task: task.to_vec(),
        })
    }
}

/// Reads only the header, for listings that do not need the body.
pub fn parse_header(head: &str) -> Result<TerminalHeader, RecordError> {
    let mut lines = head.lines();
    if lines.next() != Some(MAGIC) {
        return Err(RecordError::MissingField("magic"));
    }

    let mut status = None;
    let mut attempt = None;
    let mut reason = None;
    let mut retryable = true;
    let mut finished_at = None;
    let mut task_bytes = None;

    for line in lines {
        let Some((key, value)) = line.strip_prefix("# ").and_then(|l| l.split_once(": ")) else {
            continue;
        };
        match key {
            "status" => {
                status = Some(match value {
                    "done" => TaskState::Done,
                    "failed" => TaskState::Failed,
                    _ => return Err(invalid("status", value)),
                })
            }
            "attempt" => attempt = Some(value.parse().map_err(|_| invalid("attempt", value))?),
            "reason" => reason = (value != "none").then(|| value.to_string()),
            "retryable" => retryable = value.parse().map_err(|_| invalid("retryable", value))?,
            "finished_at" => {
                finished_at = Some(
                    DateTime::parse_from_rfc3339(value)
                        .map_err(|_| invalid("finished_at", value))?
                        .with_timezone(&Utc),
                )
            }
            "task_bytes" => {
                task_bytes = Some(value.parse().map_err(|_| invalid("task_bytes", value))?)
            }
            _ => {}
        }
    }

    Ok(TerminalHeader {
        status: status.ok_or(RecordError::MissingField("status"))?,
        attempt: attempt.ok_or(RecordError::MissingField("attempt"))?,
        reason,
        retryable,
        finished_at: finished_at.ok_or(RecordError::MissingField("finished_at"))?,
        task_bytes: task_bytes.ok_or(RecordError::MissingField("task_bytes"))?,
    })
}

fn invalid(field: &'static str, value: &str) -> RecordError {
    RecordError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn terminal_record_keeps_task_bytes_exactly() {
        // Output that mimics the markers must not confuse the parser.
        let output = b"line one\n# ---- task ----\nfake\n".to_vec();
        let task = b"Refactor the parser.\n\n# ---- task ----\nstill task\n".to_vec();
        let rec = TerminalRecord::new(
            TaskState::Failed,
            3,
            Some("exit code 1\nsecond line".into()),
            true,
            output.clone(),
            task.clone(),
        );

        let parsed = TerminalRecord::parse(&rec.render()).unwrap();
        assert_eq!(parsed.task, task);
        assert_eq!(parsed.output, output);
        assert_eq!(parsed.header.attempt, 3);
        assert_eq!(parsed.header.status, TaskState::Failed);
        assert_eq!(parsed.header.reason.as_deref(), Some("exit code 1 second line"));
    }

    #[test]
    fn detect_tells_records_from_task_text() {
        let rec = TerminalRecord::new(TaskState::Done, 1, None, true, vec![], b"x".to_vec());
        assert_eq!(TerminalRecord::detect(&rec.render()).unwrap().task, b"x");
        assert!(TerminalRecord::detect(b"Write a parser.\n").is_none());
        assert!(TerminalRecord::detect(b"# codex-worker exec log\nhalf a header").is_none());
    }

    #[test]
    fn done_record_without_reason() {
        let rec = TerminalRecord::new(TaskState::Done, 1, None, true, vec![], b"x".to_vec());
        let text = String::from_utf8(rec.render()).unwrap();
        assert!(text.starts_with("# codex-worker exec log\n# status: done\n"));
        assert!(text.contains("# reason: none\n"));

        let parsed = TerminalRecord::parse(text.as_bytes()).unwrap();
        assert_eq!(parsed.header.reason, None);
        assert!(parsed.output.is_empty());
    }

    #[test]
    fn rejects_foreign_and_truncated_logs() {
        assert!(matches!(
            TerminalRecord::parse(b"plain log from an older tool\n"),
            Err(RecordError::MissingOutput)
        ));

        let rec = TerminalRecord::new(TaskState::Done, 1, None, true, b"o".to_vec(), b"task".to_vec());
        let mut bytes = rec.render();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(
            TerminalRecord::parse(&bytes),
            Err(RecordError::TruncatedTask { expected: 4 })
        ));
    }

    #[test]
    fn claim_record_json_round_trip() {
        let owner = OwnerToken {
            session: Uuid::new_v4(),
            pid: 42,
            host: "box".into(),
            process_started: Some(1_700_000_000),
        };
        let meta = ClaimMeta {
            worker_id: 2,
            engine: "codex".into(),
            model: "o4-mini".into(),
        };
        let rec = ClaimRecord::new(&owner, &meta, 1);
        let back = ClaimRecord::from_json(&rec.to_json().unwrap()).unwrap();
        assert_eq!(back, rec);
        assert!(ClaimRecord::from_json(b"{not json").is_err());
    }
}
