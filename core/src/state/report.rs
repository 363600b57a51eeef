//! Per-state counts and per-task rows for status displays.

use std::time::SystemTime;

use serde::Serialize;

use super::discovery::Inventory;
use super::types::TaskState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub failed: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.done + self.failed
    }

    fn bump(&mut self, state: TaskState) {
        match state {
            TaskState::Pending => self.pending += 1,
            TaskState::Claimed => self.in_progress += 1,
            TaskState::Done => self.done += 1,
            TaskState::Failed => self.failed += 1,
        }
    }
}

/// One line of a detailed status listing.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRow {
    pub base: String,
    pub state: TaskState,
    pub attempt: u32,
    /// Seconds since the entry last changed (since the claim for Claimed).
    pub age_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub counts: StateCounts,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<TaskRow>,
}

/// Read-only aggregation over a discovery snapshot.
pub struct ReportCollector;

impl ReportCollector {
    pub fn counts(inventory: &Inventory) -> StateCounts {
        let mut counts = StateCounts::default();
        for task in &inventory.tasks {
            counts.bump(task.state);
        }
        counts
    }

    pub fn collect(inventory: &Inventory, detailed: bool) -> StatusReport {
        let now = SystemTime::now();
        let rows = if detailed {
            inventory
                .tasks
                .iter()
                .map(|task| {
                    let since = task
                        .claim
                        .as_ref()
                        .map(|c| c.claimed_at)
                        .unwrap_or(task.modified);
                    let owner = task.claim.as_ref().and_then(|c| c.owner.as_ref());
                    TaskRow {
                        base: task.base.clone(),
                        state: task.state,
                        attempt: task.attempt,
                        age_secs: now.duration_since(since).map(|d| d.as_secs()).unwrap_or(0),
                        owner: owner.map(|o| o.owner.short()),
                        worker_id: owner.map(|o| o.worker_id),
                        engine: owner.map(|o| o.engine.clone()),
                        model: owner.map(|o| o.model.clone()),
                        reason: task.terminal.as_ref().and_then(|h| h.reason.clone()),
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        StatusReport {
            counts: Self::counts(inventory),
            rows,
        }
    }
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = &self.counts;
        writeln!(f, "{:<12} {:>6}", "pending", c.pending)?;
        writeln!(f, "{:<12} {:>6}", "in_progress", c.in_progress)?;
        writeln!(f, "{:<12} {:>6}", "done", c.done)?;
        writeln!(f, "{:<12} {:>6}", "failed", c.failed)?;
        write!(f, "{:<12} {:>6}", "total", c.total())?;

        if !self.rows.is_empty() {
            writeln!(f)?;
            writeln!(f)?;
            write!(
                f,
                "{:<40} {:<12} {:>7} {:>8}  detail",
                "task", "state", "attempt", "age"
            )?;
            for row in &self.rows {
                let detail = match (&row.owner, &row.reason) {
                    (Some(owner), _) => format!(
                        "{owner} worker={} {}/{}",
                        row.worker_id.unwrap_or(0),
                        row.engine.as_deref().unwrap_or("?"),
                        row.model.as_deref().unwrap_or("?"),
                    ),
                    (None, Some(reason)) => reason.clone(),
                    (None, None) => String::new(),
                };
                write!(
                    f,
                    "\n{:<40} {:<12} {:>7} {:>7}s  {}",
                    row.base,
                    row.state.as_str(),
                    row.attempt,
                    row.age_secs,
                    detail
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{StateStore, TaskDiscovery};
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn counts_every_state() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "a.md",
            "b.md",
            "in-progress-c.md",
            "done_exec_log-d.md.txt",
            "failed_exec_log-e.md.txt",
            ".lock-c.md",
        ] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let store = StateStore::open(dir.path()).unwrap();
        let inv = TaskDiscovery::scan(&store, None).unwrap();
        let report = ReportCollector::collect(&inv, true);

        assert_eq!(
            report.counts,
            StateCounts {
                pending: 2,
                in_progress: 1,
                done: 1,
                failed: 1
            }
        );
        assert_eq!(report.counts.total(), 5);
        assert_eq!(report.rows.len(), 5);

        let text = report.to_string();
        let first = text.lines().next().unwrap();
        assert!(first.starts_with("pending") && first.ends_with(" 2"));
        assert!(text.contains("e.md"));
    }

    #[test]
    fn summary_only_has_no_rows() {
        let inv = Inventory::default();
        let report = ReportCollector::collect(&inv, false);
        assert!(report.rows.is_empty());
        assert_eq!(report.counts.total(), 0);
        assert!(!report.to_string().contains("attempt"));
    }
}
