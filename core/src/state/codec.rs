//! Mapping between a task's base name plus state and its directory entry name.
//!
//! Everything here is pure string work. The marker strings are fixed for
//! compatibility with directories written by earlier tooling, and are checked
//! once at startup through [`NameCodec::validate`].

use super::types::TaskState;

pub const CLAIMED_PREFIX: &str = "in-progress-";
pub const DONE_PREFIX: &str = "done_exec_log-";
pub const FAILED_PREFIX: &str = "failed_exec_log-";
pub const LEGACY_DONE_PREFIX: &str = "completed_";
pub const LOG_SUFFIX: &str = ".txt";
pub const LOCK_PREFIX: &str = ".lock-";
pub const ATTEMPTS_PREFIX: &str = ".attempts-";
pub const TEMP_PREFIX: &str = ".tmp_exec_log-";

/// What kind of directory entry a name is, once markers are stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A task entry carrying its state.
    Task {
        base: String,
        state: TaskState,
        legacy: bool,
    },
    /// `.lock-<base>`: the claim record of an in-flight claim.
    Lock { base: String },
    /// `.attempts-<base>`: prior failure count of a re-queued task.
    Attempts { base: String },
    /// `.tmp_exec_log-<tag>-<base>.txt`: a terminal record being written.
    Temp { base: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NameCodec;

impl NameCodec {
    /// Directory entry name of `base` in `state`.
    pub fn encode(base: &str, state: TaskState) -> String {
        match state {
            TaskState::Pending => base.to_string(),
            TaskState::Claimed => format!("{CLAIMED_PREFIX}{base}"),
            TaskState::Done => format!("{DONE_PREFIX}{base}{LOG_SUFFIX}"),
            TaskState::Failed => format!("{FAILED_PREFIX}{base}{LOG_SUFFIX}"),
        }
    }

    pub fn legacy_done(base: &str) -> String {
        format!("{LEGACY_DONE_PREFIX}{base}{LOG_SUFFIX}")
    }

    pub fn lock(base: &str) -> String {
        format!("{LOCK_PREFIX}{base}")
    }

    pub fn attempts(base: &str) -> String {
        format!("{ATTEMPTS_PREFIX}{base}")
    }

    /// `tag` keeps concurrent writers of the same base apart.
    pub fn temp(base: &str, tag: &str) -> String {
        format!("{TEMP_PREFIX}{tag}-{base}{LOG_SUFFIX}")
    }

    /// Classifies a directory entry name. Never fails: a name without a
    /// recognised marker is a Pending task whose base is the whole name.
    pub fn decode(name: &str) -> EntryKind {
        if let Some(base) = name.strip_prefix(LOCK_PREFIX).filter(|b| !b.is_empty()) {
            return EntryKind::Lock {
                base: base.to_string(),
            };
        }
        if let Some(base) = name.strip_prefix(ATTEMPTS_PREFIX).filter(|b| !b.is_empty()) {
            return EntryKind::Attempts {
                base: base.to_string(),
            };
        }
        if let Some(rest) = strip_marked(name, TEMP_PREFIX) {
            // tag is a uuid fragment without '-'
            if let Some((_, base)) = rest.split_once('-').filter(|(_, b)| !b.is_empty()) {
                return EntryKind::Temp {
                    base: base.to_string(),
                };
            }
        }
        if let Some(base) = strip_marked(name, DONE_PREFIX) {
            return task(base, TaskState::Done, false);
        }
        if let Some(base) = strip_marked(name, FAILED_PREFIX) {
            return task(base, TaskState::Failed, false);
        }
        if let Some(base) = strip_marked(name, LEGACY_DONE_PREFIX) {
            return task(base, TaskState::Done, true);
        }
        if let Some(base) = name.strip_prefix(CLAIMED_PREFIX).filter(|b| !b.is_empty()) {
            return task(base, TaskState::Claimed, false);
        }
        task(name, TaskState::Pending, false)
    }

    /// Whether `name` is one of the tool's own hidden artifacts rather than a task.
    pub fn is_artifact(name: &str) -> bool {
        !matches!(Self::decode(name), EntryKind::Task { .. })
    }

    /// Checks the marker table for prefixes that would shadow one another.
    pub fn validate() -> Result<(), String> {
        let markers = [
            CLAIMED_PREFIX,
            DONE_PREFIX,
            FAILED_PREFIX,
            LEGACY_DONE_PREFIX,
            LOCK_PREFIX,
            ATTEMPTS_PREFIX,
            TEMP_PREFIX,
        ];
        for (i, a) in markers.iter().enumerate() {
            if a.is_empty() {
                return Err("empty state marker".to_string());
            }
            for b in markers.iter().skip(i + 1) {
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(format!("state markers '{a}' and '{b}' overlap"));
                }
            }
        }
        if LOG_SUFFIX.is_empty() {
            return Err("empty log suffix".to_string());
        }
        Ok(())
    }
}

fn strip_marked<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(LOG_SUFFIX))
        .filter(|base| !base.is_empty())
}

fn task(base: &str, state: TaskState, legacy: bool) -> EntryKind {
    EntryKind::Task {
        base: base.to_string(),
        state,
        legacy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STATES: [TaskState; 4] = [
        TaskState::Pending,
        TaskState::Claimed,
        TaskState::Done,
        TaskState::Failed,
    ];

    #[test]
    fn encodes_bit_exact_names() {
        assert_eq!(NameCodec::encode("a.md", TaskState::Pending), "a.md");
        assert_eq!(
            NameCodec::encode("a.md", TaskState::Claimed),
            "in-progress-a.md"
        );
        assert_eq!(
            NameCodec::encode("a.md", TaskState::Done),
            "done_exec_log-a.md.txt"
        );
        assert_eq!(
            NameCodec::encode("a.md", TaskState::Failed),
            "failed_exec_log-a.md.txt"
        );
        assert_eq!(NameCodec::lock("a.md"), ".lock-a.md");
    }

    #[test]
    fn round_trips_awkward_base_names() {
        let bases = [
            "a.md",
            "notes.txt",
            "done_exec_log-x",
            "x-in-progress-y.md",
            "with spaces and -dashes-.md",
            "ünïcode.md",
            "plain",
        ];
        for base in bases {
            for state in STATES {
                let name = NameCodec::encode(base, state);
                let decoded = NameCodec::decode(&name);
                // A base that itself carries a marker is ambiguous when Pending.
                if state == TaskState::Pending && NameCodec::is_artifact(base) {
                    continue;
                }
                if state == TaskState::Pending && base.starts_with(DONE_PREFIX) {
                    continue;
                }
                assert_eq!(
                    decoded,
                    EntryKind::Task {
                        base: base.to_string(),
                        state,
                        legacy: false
                    },
                    "{name}"
                );
            }
        }
    }

    #[test]
    fn unmarked_names_are_pending() {
        assert_eq!(
            NameCodec::decode("todo.md"),
            EntryKind::Task {
                base: "todo.md".into(),
                state: TaskState::Pending,
                legacy: false
            }
        );
        // Marker without a base or without the suffix is not a marker.
        assert_eq!(
            NameCodec::decode("in-progress-"),
            EntryKind::Task {
                base: "in-progress-".into(),
                state: TaskState::Pending,
                legacy: false
            }
        );
        assert_eq!(
            NameCodec::decode("done_exec_log-a.md"),
            EntryKind::Task {
                base: "done_exec_log-a.md".into(),
                state: TaskState::Pending,
                legacy: false
            }
        );
    }

    #[test]
    fn authored_in_progress_name_decodes_as_claimed() {
        assert_eq!(
            NameCodec::decode("in-progress-x.md"),
            EntryKind::Task {
                base: "x.md".into(),
                state: TaskState::Claimed,
                legacy: false
            }
        );
    }

    #[test]
    fn decodes_legacy_and_artifacts() {
        assert_eq!(
            NameCodec::decode("completed_a.md.txt"),
            EntryKind::Task {
                base: "a.md".into(),
                state: TaskState::Done,
                legacy: true
            }
        );
        assert_eq!(
            NameCodec::decode(".lock-a.md"),
            EntryKind::Lock {
                base: "a.md".into()
            }
        );
        assert_eq!(
            NameCodec::decode(".attempts-a.md"),
            EntryKind::Attempts {
                base: "a.md".into()
            }
        );
        assert_eq!(
            NameCodec::decode(&NameCodec::temp("a-b.md", "3f2a9c")),
            EntryKind::Temp {
                base: "a-b.md".into()
            }
        );
    }

    #[test]
    fn marker_table_is_consistent() {
        assert!(NameCodec::validate().is_ok());
    }
}
