//! Task state types shared by discovery, the store, and the supervisor.

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::record::{ClaimRecord, TerminalHeader};

/// Lifecycle state of one task, derived solely from which entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Claimed,
    Done,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Claimed => "in_progress",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        }
    }

    /// Higher wins when crash residue leaves several entries for one base name.
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            TaskState::Done => 3,
            TaskState::Failed => 2,
            TaskState::Claimed => 1,
            TaskState::Pending => 0,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who holds a Claimed task and since when.
#[derive(Debug, Clone)]
pub struct ClaimInfo {
    /// Parsed `.lock-<base>` content. `None` when the claim has no lock file
    /// (left by an older tool or authored by hand) or the lock is unreadable.
    pub owner: Option<ClaimRecord>,
    /// Lock file mtime, falling back to the claimed entry's mtime.
    pub claimed_at: SystemTime,
}

/// One task as seen by a single discovery snapshot.
#[derive(Debug, Clone)]
pub struct Task {
    pub base: String,
    pub state: TaskState,
    /// Path of the entry that carries the state.
    pub path: PathBuf,
    pub modified: SystemTime,
    /// Prior failed attempts for Pending/Claimed; tries so far for Done/Failed.
    pub attempt: u32,
    pub claim: Option<ClaimInfo>,
    /// Header of a Done/Failed record, when it parses.
    pub terminal: Option<TerminalHeader>,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        self.state == TaskState::Pending
    }

    pub fn is_claimed(&self) -> bool {
        self.state == TaskState::Claimed
    }
}

/// A `.lock-<base>` whose base has no Claimed entry: a claim or re-queue
/// caught mid-flight, or the leftover of a process that died inside one.
#[derive(Debug, Clone)]
pub struct OrphanLock {
    pub base: String,
    pub path: PathBuf,
    pub owner: Option<ClaimRecord>,
    pub modified: SystemTime,
}

/// Hidden artifacts that only need age-based garbage collection.
#[derive(Debug, Clone)]
pub struct Leftover {
    pub path: PathBuf,
    pub modified: SystemTime,
}
