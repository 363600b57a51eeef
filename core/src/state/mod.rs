//! # Task state
//!
//! A task's state is the name of its directory entry. This module maps
//! names to states, performs the atomic transitions between them, lists a
//! directory into an inventory, and revokes claims left by dead workers.
//!
//! Entry names:
//!
//! | state   | entry                         |
//! |---------|-------------------------------|
//! | Pending | `<base>`                      |
//! | Claimed | `in-progress-<base>`          |
//! | Done    | `done_exec_log-<base>.txt`    |
//! | Failed  | `failed_exec_log-<base>.txt`  |
//!
//! plus the hidden `.lock-<base>`, `.attempts-<base>` and
//! `.tmp_exec_log-<tag>-<base>.txt` artifacts.

pub mod codec;
pub mod discovery;
pub mod record;
pub mod report;
pub mod store;
pub mod supervisor;
pub mod transitions;
pub mod types;

pub use codec::{EntryKind, NameCodec};
pub use discovery::{Inventory, TaskDiscovery, TaskPattern};
pub use record::{ClaimMeta, ClaimRecord, OwnerToken, TerminalHeader, TerminalRecord};
pub use report::{ReportCollector, StateCounts, StatusReport, TaskRow};
pub use store::{
    ClaimOutcome, ClaimedTask, CommitFailure, CommitOutcome, RequeueOutcome, ResetReport,
    RevokeOutcome, StateStore,
};
pub use supervisor::{AgeOnlyProbe, Liveness, LivenessProbe, LockSupervisor, SweepReport};
pub use transitions::{StateTransition, TransitionCause, TransitionError};
pub use types::{ClaimInfo, Leftover, OrphanLock, Task, TaskState};
