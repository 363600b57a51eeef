//! Directory listing into a task inventory.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::WorkerError;

use super::codec::{EntryKind, NameCodec};
use super::record::{parse_header, ClaimRecord, TerminalHeader};
use super::store::StateStore;
use super::types::{ClaimInfo, Leftover, OrphanLock, Task, TaskState};

/// Glob over base names, so one pattern selects a task in every state.
#[derive(Debug, Clone)]
pub struct TaskPattern {
    raw: String,
    pattern: glob::Pattern,
}

impl TaskPattern {
    pub fn new(raw: &str) -> Result<Self, WorkerError> {
        Ok(Self {
            raw: raw.to_string(),
            pattern: glob::Pattern::new(raw)?,
        })
    }

    /// Selects the one base name `base`, glob metacharacters included.
    pub fn exact(base: &str) -> Result<Self, WorkerError> {
        Self::new(&glob::Pattern::escape(base))
    }

    pub fn matches(&self, base: &str) -> bool {
        self.pattern.matches(base)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// One snapshot of the task directory.
#[derive(Debug, Default)]
pub struct Inventory {
    /// One entry per base name, sorted by base name.
    pub tasks: Vec<Task>,
    /// Lower-precedence entries of a base name that has several.
    pub shadowed: Vec<Task>,
    pub orphan_locks: Vec<OrphanLock>,
    pub leftovers: Vec<Leftover>,
}

impl Inventory {
    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.is_pending())
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.tasks.iter().filter(|t| t.state == state).count()
    }
}

pub struct TaskDiscovery;

impl TaskDiscovery {
    /// Lists the store's directory. An unreadable directory is an error;
    /// entries that vanish or change mid-scan are not.
    pub fn scan(store: &StateStore, pattern: Option<&TaskPattern>) -> Result<Inventory, WorkerError> {
        let root = store.root();
        let entries = fs::read_dir(root).map_err(|e| WorkerError::io(root, e))?;

        let mut tasks: BTreeMap<String, Task> = BTreeMap::new();
        let mut shadowed = Vec::new();
        let mut locks: BTreeMap<String, (PathBuf, SystemTime)> = BTreeMap::new();
        let mut leftovers = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| WorkerError::io(root, e))?;
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                tracing::debug!(name = ?file_name, "skipping non utf-8 name");
                continue;
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let path = entry.path();

            let kind = NameCodec::decode(name);
            let base = match &kind {
                EntryKind::Task { base, .. }
                | EntryKind::Lock { base }
                | EntryKind::Attempts { base }
                | EntryKind::Temp { base } => base.as_str(),
            };
            if pattern.is_some_and(|p| !p.matches(base)) {
                continue;
            }

            match kind {
                EntryKind::Task { base, state, .. } => {
                    let task = Task {
                        base: base.clone(),
                        state,
                        path,
                        modified,
                        attempt: 0,
                        claim: None,
                        terminal: None,
                    };
                    let held = tasks.get(&base).map(|t| t.state.precedence());
                    match held {
                        Some(p) if p >= state.precedence() => shadowed.push(task),
                        _ => {
                            if let Some(prev) = tasks.insert(base, task) {
                                shadowed.push(prev);
                            }
                        }
                    }
                }
                EntryKind::Lock { base } => {
                    locks.insert(base, (path, modified));
                }
                EntryKind::Temp { .. } => leftovers.push(Leftover { path, modified }),
                EntryKind::Attempts { .. } => {}
            }
        }

        for task in tasks.values_mut() {
            match task.state {
                TaskState::Pending => task.attempt = store.read_attempts(&task.base),
                TaskState::Claimed => {
                    let lock = locks.remove(&task.base);
                    let owner = lock.as_ref().and_then(|(p, _)| read_claim(p));
                    task.attempt = owner.as_ref().map(|o| o.attempt).unwrap_or(0);
                    task.claim = Some(ClaimInfo {
                        owner,
                        claimed_at: lock.map(|(_, m)| m).unwrap_or(task.modified),
                    });
                }
                TaskState::Done | TaskState::Failed => {
                    task.terminal = read_header(&task.path);
                    task.attempt = task.terminal.as_ref().map(|h| h.attempt).unwrap_or(1);
                }
            }
        }

        let orphan_locks = locks
            .into_iter()
            .map(|(base, (path, modified))| OrphanLock {
                owner: read_claim(&path),
                base,
                path,
                modified,
            })
            .collect();

        Ok(Inventory {
            tasks: tasks.into_values().collect(),
            shadowed,
            orphan_locks,
            leftovers,
        })
    }
}

fn read_claim(path: &Path) -> Option<ClaimRecord> {
    let bytes = fs::read(path).ok()?;
    ClaimRecord::from_json(&bytes).ok()
}

/// Parses the header from the first few KiB of a terminal entry.
fn read_header(path: &Path) -> Option<TerminalHeader> {
    let mut head = Vec::with_capacity(2048);
    fs::File::open(path)
        .ok()?
        .take(4096)
        .read_to_end(&mut head)
        .ok()?;
    let text = String::from_utf8_lossy(&head);
    let end = text.find("# ---- output ----")?;
    parse_header(&text[..end]).ok()
}
