//! Atomic state transitions on the task directory.
//!
//! Every transition of one base name is serialised by its `.lock-<base>`
//! entry. The lock is taken with an exclusive create, or, when a party has
//! to act on a lock somebody else created (a commit or a revocation), by
//! renaming it to a private name. Both are single syscalls, so at most one
//! party ever holds a base name's lock. A taken lock goes back with a hard
//! link, which never replaces a lock created meanwhile. All renames stay
//! inside the task directory, which keeps them on one filesystem.
//!
//! A transition that changes both name and content first rewrites the
//! content in place and then renames, so one entry exists per base name at
//! every step. An entry left holding a finished record by a crash between
//! the two steps is completed by the next claim or revocation.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::error::WorkerError;

use super::codec::NameCodec;
use super::record::{ClaimMeta, ClaimRecord, OwnerToken, TerminalRecord};
use super::supervisor::{Liveness, LivenessProbe};
use super::transitions::{StateTransition, TransitionCause};
use super::types::{Task, TaskState};

/// A claim this process won.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub base: String,
    /// The `in-progress-<base>` entry.
    pub path: PathBuf,
    pub record: ClaimRecord,
}

impl ClaimedTask {
    /// Prior failed attempts.
    pub fn attempt(&self) -> u32 {
        self.record.attempt
    }
}

#[derive(Debug)]
pub enum ClaimOutcome {
    Won(ClaimedTask),
    Lost,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Path of the terminal entry.
    Ok(PathBuf),
    NotOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    NotStale,
    NotFound,
    /// A Pending entry for the same base already exists.
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueOutcome {
    /// Back to Pending with this many prior failed attempts.
    Requeued(u32),
    Lost,
    NotEligible,
}

/// What a commit writes besides the captured output.
#[derive(Debug, Clone)]
pub struct CommitFailure {
    pub reason: String,
    pub retryable: bool,
}

#[derive(Debug, Default)]
pub struct ResetReport {
    pub reset: usize,
    /// Base names left alone, with why.
    pub skipped: Vec<(String, String)>,
}

/// Giving a lock back waits this long in total for a transient holder.
const RESTORE_ATTEMPTS: u32 = 200;
const RESTORE_BACKOFF: Duration = Duration::from_millis(10);

/// Device and inode, where the platform exposes them.
type FileId = Option<(u64, u64)>;

/// Exclusive hold on a base name's lock slot.
enum Guard {
    /// We created `.lock-<base>` ourselves. `own` is the claim written into
    /// it, if any.
    Created {
        base: String,
        id: FileId,
        own: Option<Uuid>,
    },
    /// We moved someone's `.lock-<base>` to a private name.
    Moved { lock: PathBuf, held: PathBuf },
}

#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, WorkerError> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|e| WorkerError::io(&root, e))?;
        if !meta.is_dir() {
            return Err(WorkerError::Config(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        NameCodec::validate().map_err(WorkerError::Config)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn entry(&self, base: &str, state: TaskState) -> PathBuf {
        self.path(&NameCodec::encode(base, state))
    }

    fn lock_path(&self, base: &str) -> PathBuf {
        self.path(&NameCodec::lock(base))
    }

    fn temp_path(&self, base: &str) -> PathBuf {
        let tag = Uuid::new_v4().simple().to_string();
        self.path(&NameCodec::temp(base, &tag[..12]))
    }

    /// Checks that the directory accepts exclusive creates and renames.
    /// A run refuses to start otherwise.
    pub fn verify_atomic_rename(&self) -> Result<(), WorkerError> {
        let a = self.temp_path("probe");
        let b = self.temp_path("probe");
        let result = create_exclusive(&a)
            .and_then(|_| fs::rename(&a, &b))
            .and_then(|_| match create_exclusive(&b) {
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
                Ok(_) => Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "exclusive create did not detect an existing entry",
                )),
                Err(e) => Err(e),
            });
        let _ = fs::remove_file(&a);
        let _ = fs::remove_file(&b);
        result.map_err(|e| {
            WorkerError::Config(format!(
                "{} does not support atomic rename and exclusive create: {e}",
                self.root.display()
            ))
        })
    }

    /// Moves `base` from Pending to Claimed if nobody else holds it.
    pub fn claim(
        &self,
        base: &str,
        owner: &OwnerToken,
        meta: &ClaimMeta,
    ) -> Result<ClaimOutcome, WorkerError> {
        StateTransition::validate(TaskState::Pending, TaskState::Claimed, TransitionCause::Claim)?;
        let lock = self.lock_path(base);
        let mut file = match create_exclusive(&lock) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(base, "claim lost: lock held");
                return Ok(ClaimOutcome::Lost);
            }
            Err(e) => return Err(WorkerError::io(&lock, e)),
        };
        let id = file.metadata().ok().and_then(|m| file_id(&m));
        let created = |own: Option<Uuid>| Guard::Created {
            base: base.to_string(),
            id,
            own,
        };

        match self.blocking_state(base) {
            Ok(None) => {}
            Ok(Some(state)) => {
                tracing::debug!(base, %state, "claim lost: entry exists");
                self.release(created(None));
                return Ok(ClaimOutcome::Lost);
            }
            Err(e) => {
                self.release(created(None));
                return Err(e);
            }
        }

        let attempt = self.read_attempts(base);
        let record = ClaimRecord::new(owner, meta, attempt);
        let written = record
            .to_json()
            .map_err(WorkerError::from)
            .and_then(|bytes| {
                file.write_all(&bytes)
                    .and_then(|_| file.sync_all())
                    .map_err(|e| WorkerError::io(&lock, e))
            });
        if let Err(e) = written {
            self.release(created(None));
            return Err(e);
        }
        drop(file);

        let pending = self.entry(base, TaskState::Pending);
        let claimed = self.entry(base, TaskState::Claimed);
        match fs::rename(&pending, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(base, "claim lost: pending entry gone");
                self.release(created(Some(record.claim_id)));
                return Ok(ClaimOutcome::Lost);
            }
            Err(e) => {
                self.release(created(Some(record.claim_id)));
                return Err(WorkerError::io(&pending, e));
            }
        }
        // The entry keeps the author's mtime across the rename; age counts from the claim.
        touch(&claimed);
        self.unseal(base, &claimed);

        Ok(ClaimOutcome::Won(ClaimedTask {
            base: base.to_string(),
            path: claimed,
            record,
        }))
    }

    /// Reads the task text of a Claimed entry.
    pub fn read_claimed(&self, claim: &ClaimedTask) -> Result<Vec<u8>, WorkerError> {
        let bytes = fs::read(&claim.path).map_err(|e| WorkerError::io(&claim.path, e))?;
        Ok(match TerminalRecord::detect(&bytes) {
            Some(record) => record.task,
            None => bytes,
        })
    }

    /// A Pending entry still holding the record of an interrupted requeue or
    /// reset gets its task text back.
    fn unseal(&self, base: &str, path: &Path) {
        let Some(record) = fs::read(path).ok().and_then(|b| TerminalRecord::detect(&b)) else {
            return;
        };
        match self.write_via_temp(base, &record.task, path) {
            Ok(()) => tracing::info!(base, "restored task text after an interrupted transition"),
            Err(e) => tracing::warn!(base, error = %e, "could not restore task text"),
        }
    }

    pub fn commit_done(
        &self,
        claim: &ClaimedTask,
        log: Vec<u8>,
    ) -> Result<CommitOutcome, WorkerError> {
        self.commit(claim, TaskState::Done, claim.attempt() + 1, None, log)
    }

    /// `tries` counts this attempt too.
    pub fn commit_failed(
        &self,
        claim: &ClaimedTask,
        tries: u32,
        failure: CommitFailure,
        log: Vec<u8>,
    ) -> Result<CommitOutcome, WorkerError> {
        self.commit(claim, TaskState::Failed, tries, Some(failure), log)
    }

    fn commit(
        &self,
        claim: &ClaimedTask,
        state: TaskState,
        tries: u32,
        failure: Option<CommitFailure>,
        log: Vec<u8>,
    ) -> Result<CommitOutcome, WorkerError> {
        StateTransition::validate(TaskState::Claimed, state, TransitionCause::Commit)?;
        let base = claim.base.as_str();

        let Some(guard) = self.take_lock(base)? else {
            tracing::warn!(base, "commit refused: lock is gone");
            return Ok(CommitOutcome::NotOwner);
        };
        if !self.guard_matches(&guard, Some(&claim.record)) {
            tracing::warn!(base, "commit refused: claim belongs to someone else");
            self.restore(guard);
            return Ok(CommitOutcome::NotOwner);
        }

        let task = match self.read_claimed(claim) {
            Ok(t) => t,
            Err(WorkerError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(base, "commit refused: claimed entry is gone");
                self.release(guard);
                return Ok(CommitOutcome::NotOwner);
            }
            Err(e) => {
                self.restore(guard);
                return Err(e);
            }
        };

        let (reason, retryable) = match failure {
            Some(f) => (Some(f.reason), f.retryable),
            None => (None, true),
        };
        let record = TerminalRecord::new(state, tries, reason, retryable, log, task);
        let target = self.entry(base, state);
        // Seal the claim with its record, then move it.
        if let Err(e) = self.write_via_temp(base, &record.render(), &claim.path) {
            self.restore(guard);
            return Err(e);
        }
        if let Err(e) = fs::rename(&claim.path, &target) {
            self.restore(guard);
            return Err(WorkerError::io(&claim.path, e));
        }

        self.remove_quiet(&self.path(&NameCodec::attempts(base)));
        self.release(guard);
        Ok(CommitOutcome::Ok(target))
    }

    /// Hands a Claimed entry back to Pending. `observed` is the claim record
    /// the caller judged stale, or `None` when the claim carried no readable
    /// lock. The revocation only proceeds if that is still the current claim.
    pub fn revoke_stale(
        &self,
        base: &str,
        observed: Option<&ClaimRecord>,
    ) -> Result<RevokeOutcome, WorkerError> {
        StateTransition::validate(TaskState::Claimed, TaskState::Pending, TransitionCause::Revoke)?;
        let guard = match self.take_lock(base)? {
            Some(g) => {
                if !self.guard_matches(&g, observed) {
                    self.restore(g);
                    return Ok(RevokeOutcome::NotStale);
                }
                g
            }
            None if observed.is_some() => return Ok(RevokeOutcome::NotStale),
            None => match self.create_lock(base)? {
                Some(g) => g,
                None => return Ok(RevokeOutcome::NotStale),
            },
        };

        let claimed = self.entry(base, TaskState::Claimed);
        if !exists(&claimed).map_err(|e| WorkerError::io(&claimed, e))? {
            self.release(guard);
            return Ok(RevokeOutcome::NotFound);
        }

        // A commit that crashed after writing its record leaves the claim behind.
        if self.terminal_exists(base)? {
            self.remove_quiet(&claimed);
            self.release(guard);
            return Ok(RevokeOutcome::Revoked);
        }

        // A commit that crashed between sealing and moving: finish it.
        if let Some(record) = fs::read(&claimed).ok().and_then(|b| TerminalRecord::detect(&b)) {
            let target = self.entry(base, record.header.status);
            if let Err(e) = fs::rename(&claimed, &target) {
                self.restore(guard);
                return Err(WorkerError::io(&claimed, e));
            }
            self.release(guard);
            tracing::warn!(base, state = %record.header.status, "finished interrupted commit");
            return Ok(RevokeOutcome::Revoked);
        }

        let pending = self.entry(base, TaskState::Pending);
        if exists(&pending).map_err(|e| WorkerError::io(&pending, e))? {
            self.restore(guard);
            return Ok(RevokeOutcome::Blocked);
        }

        let outcome = match fs::rename(&claimed, &pending) {
            Ok(()) => RevokeOutcome::Revoked,
            Err(e) if e.kind() == io::ErrorKind::NotFound => RevokeOutcome::NotFound,
            Err(e) => {
                self.restore(guard);
                return Err(WorkerError::io(&claimed, e));
            }
        };
        self.release(guard);
        if outcome == RevokeOutcome::Revoked {
            tracing::warn!(base, "revoked stale claim");
        }
        Ok(outcome)
    }

    /// Removes a lock that has no Claimed entry, if it still holds `observed`.
    pub fn clear_orphan_lock(
        &self,
        base: &str,
        observed: Option<&ClaimRecord>,
    ) -> Result<bool, WorkerError> {
        let Some(guard) = self.take_lock(base)? else {
            return Ok(false);
        };
        let claimed = self.entry(base, TaskState::Claimed);
        let has_claim = exists(&claimed).map_err(|e| WorkerError::io(&claimed, e))?;
        if has_claim || !self.guard_matches(&guard, observed) {
            self.restore(guard);
            return Ok(false);
        }
        self.release(guard);
        tracing::warn!(base, "removed orphaned lock");
        Ok(true)
    }

    /// Puts a Failed task back to Pending for another try when its record
    /// allows one. `max_retries` bounds the total at `max_retries + 1` tries.
    pub fn requeue(&self, base: &str, max_retries: u32) -> Result<RequeueOutcome, WorkerError> {
        StateTransition::validate(TaskState::Failed, TaskState::Pending, TransitionCause::Retry)?;
        let Some(guard) = self.create_lock(base)? else {
            return Ok(RequeueOutcome::Lost);
        };

        let failed = self.entry(base, TaskState::Failed);
        let bytes = match fs::read(&failed) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.release(guard);
                return Ok(RequeueOutcome::Lost);
            }
            Err(e) => {
                self.release(guard);
                return Err(WorkerError::io(&failed, e));
            }
        };
        let record = match TerminalRecord::parse(&bytes) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(base, error = %e, "failed entry has no restorable task");
                self.release(guard);
                return Ok(RequeueOutcome::NotEligible);
            }
        };
        let tries = record.header.attempt;
        if !record.header.retryable || tries > max_retries {
            self.release(guard);
            return Ok(RequeueOutcome::NotEligible);
        }

        let sidecar = self.path(&NameCodec::attempts(base));
        let result = self
            .write_via_temp(base, tries.to_string().as_bytes(), &sidecar)
            .and_then(|_| self.reopen(base, &failed, &record.task));
        if let Err(e) = result {
            self.release(guard);
            return Err(e);
        }
        self.release(guard);
        tracing::info!(base, attempt = tries, "requeued for retry");
        Ok(RequeueOutcome::Requeued(tries))
    }

    /// Returns every Done, Failed, and stale Claimed task of `tasks` to
    /// Pending, clearing retry history. Entries that cannot be restored
    /// safely are reported, not treated as errors.
    pub fn reset_all(
        &self,
        tasks: &[Task],
        probe: &dyn LivenessProbe,
    ) -> Result<ResetReport, WorkerError> {
        let mut report = ResetReport::default();
        for task in tasks {
            let base = task.base.as_str();
            match task.state {
                TaskState::Pending => {}
                TaskState::Claimed => {
                    let owner = task.claim.as_ref().and_then(|c| c.owner.as_ref());
                    if let Some(o) = owner {
                        if probe.check(&o.owner) == Liveness::Alive {
                            report.skipped.push((base.into(), "owner is still running".into()));
                            continue;
                        }
                    }
                    StateTransition::validate(task.state, TaskState::Pending, TransitionCause::Reset)?;
                    match self.revoke_stale(base, owner)? {
                        RevokeOutcome::Revoked => report.reset += 1,
                        other => report.skipped.push((base.into(), format!("{other:?}"))),
                    }
                }
                TaskState::Done | TaskState::Failed => {
                    StateTransition::validate(task.state, TaskState::Pending, TransitionCause::Reset)?;
                    match self.reset_terminal(task)? {
                        None => report.reset += 1,
                        Some(why) => report.skipped.push((base.into(), why)),
                    }
                }
            }
            self.remove_quiet(&self.path(&NameCodec::attempts(base)));
        }
        Ok(report)
    }

    /// `None` on success, otherwise why the entry was left alone.
    fn reset_terminal(&self, task: &Task) -> Result<Option<String>, WorkerError> {
        let base = task.base.as_str();
        let Some(guard) = self.create_lock(base)? else {
            return Ok(Some("locked by another worker".into()));
        };
        let pending_exists = {
            let p = self.entry(base, TaskState::Pending);
            exists(&p).map_err(|e| WorkerError::io(&p, e))?
        };

        let bytes = match fs::read(&task.path) {
            Ok(b) => b,
            Err(e) => {
                self.release(guard);
                return Ok(Some(format!("unreadable: {e}")));
            }
        };
        let outcome = match TerminalRecord::parse(&bytes) {
            Ok(record) => self.reopen(base, &task.path, &record.task).map(|_| None),
            // Older logs do not carry the task text; they can only go if the
            // task itself is still around.
            Err(_) if pending_exists => {
                self.remove_quiet(&task.path);
                Ok(None)
            }
            Err(_) => Ok(Some("log does not contain the task text".into())),
        };
        self.release(guard);
        outcome
    }

    /// Turns the terminal entry `from` back into a Pending entry holding
    /// `task`: rename first, then rewrite in place. A Pending entry that
    /// already exists wins and `from` is dropped. Caller holds the lock.
    fn reopen(&self, base: &str, from: &Path, task: &[u8]) -> Result<(), WorkerError> {
        let pending = self.entry(base, TaskState::Pending);
        if exists(&pending).map_err(|e| WorkerError::io(&pending, e))? {
            self.remove_quiet(from);
            return Ok(());
        }
        fs::rename(from, &pending).map_err(|e| WorkerError::io(from, e))?;
        self.write_via_temp(base, task, &pending)
    }

    /// Prior failed attempts recorded for a Pending task.
    pub fn read_attempts(&self, base: &str) -> u32 {
        fs::read_to_string(self.path(&NameCodec::attempts(base)))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn read_lock(&self, base: &str) -> Option<ClaimRecord> {
        fs::read(self.lock_path(base))
            .ok()
            .and_then(|b| ClaimRecord::from_json(&b).ok())
    }

    /// Which entry, if any, stops a Pending `base` from being claimed.
    fn blocking_state(&self, base: &str) -> Result<Option<TaskState>, WorkerError> {
        for state in [TaskState::Claimed, TaskState::Done, TaskState::Failed] {
            let p = self.entry(base, state);
            if exists(&p).map_err(|e| WorkerError::io(&p, e))? {
                return Ok(Some(state));
            }
        }
        let legacy = self.path(&NameCodec::legacy_done(base));
        if exists(&legacy).map_err(|e| WorkerError::io(&legacy, e))? {
            return Ok(Some(TaskState::Done));
        }
        Ok(None)
    }

    fn terminal_exists(&self, base: &str) -> Result<bool, WorkerError> {
        Ok(matches!(
            self.blocking_state(base)?,
            Some(TaskState::Done | TaskState::Failed)
        ))
    }

    fn write_via_temp(&self, base: &str, bytes: &[u8], target: &Path) -> Result<(), WorkerError> {
        let tmp = self.temp_path(base);
        let written = create_exclusive(&tmp)
            .and_then(|mut f| f.write_all(bytes).and_then(|_| f.sync_all()))
            .and_then(|_| fs::rename(&tmp, target));
        written.map_err(|e| {
            self.remove_quiet(&tmp);
            WorkerError::io(target, e)
        })
    }

    fn create_lock(&self, base: &str) -> Result<Option<Guard>, WorkerError> {
        let lock = self.lock_path(base);
        match create_exclusive(&lock) {
            Ok(f) => Ok(Some(Guard::Created {
                base: base.to_string(),
                id: f.metadata().ok().and_then(|m| file_id(&m)),
                own: None,
            })),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(WorkerError::io(&lock, e)),
        }
    }

    /// Moves an existing lock out of its slot. `None` if there was none.
    fn take_lock(&self, base: &str) -> Result<Option<Guard>, WorkerError> {
        let lock = self.lock_path(base);
        let held = self.temp_path(base);
        match fs::rename(&lock, &held) {
            Ok(()) => Ok(Some(Guard::Moved { lock, held })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WorkerError::io(&lock, e)),
        }
    }

    /// Whether a taken lock holds the claim the caller expects.
    fn guard_matches(&self, guard: &Guard, expected: Option<&ClaimRecord>) -> bool {
        let Guard::Moved { held, .. } = guard else {
            return expected.is_none();
        };
        let current = fs::read(held)
            .ok()
            .and_then(|b| ClaimRecord::from_json(&b).ok());
        match (current, expected) {
            (Some(c), Some(e)) => c.claim_id == e.claim_id,
            // Unreadable lock, and the caller saw it unreadable too.
            (None, None) => true,
            _ => false,
        }
    }

    fn release(&self, guard: Guard) {
        match guard {
            Guard::Created { base, id, own } => self.release_created(&base, id, own),
            Guard::Moved { held, .. } => self.remove_quiet(&held),
        }
    }

    /// Removes a lock we created. The slot is taken first, and whatever is
    /// in it goes back unless it is still our file.
    fn release_created(&self, base: &str, id: FileId, own: Option<Uuid>) {
        let guard = match self.take_lock(base) {
            Ok(Some(g)) => g,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(base, error = %e, "failed to release lock");
                return;
            }
        };
        let ours = match &guard {
            Guard::Moved { held, .. } => is_own_lock(held, id, own),
            Guard::Created { .. } => true,
        };
        if ours {
            self.release(guard);
        } else {
            tracing::warn!(base, "lock changed hands; left in place");
            self.restore(guard);
        }
    }

    /// Gives a taken lock back unchanged.
    fn restore(&self, guard: Guard) {
        match guard {
            Guard::Created { base, id, own } => self.release_created(&base, id, own),
            Guard::Moved { lock, held } => self.put_back(&held, &lock),
        }
    }

    /// Links `held` back into the lock slot. A lock somebody created while
    /// the slot was empty is never replaced; such holders only check the
    /// entries and leave, so this waits for them.
    fn put_back(&self, held: &Path, lock: &Path) {
        for _ in 0..RESTORE_ATTEMPTS {
            match fs::hard_link(held, lock) {
                Ok(()) => {
                    self.remove_quiet(held);
                    return;
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    std::thread::sleep(RESTORE_BACKOFF)
                }
                Err(e) => {
                    // No hard links on this filesystem.
                    tracing::debug!(lock = %lock.display(), error = %e, "restoring lock by rename");
                    if let Err(e) = fs::rename(held, lock) {
                        tracing::warn!(lock = %lock.display(), error = %e, "failed to restore lock");
                    }
                    return;
                }
            }
        }
        tracing::error!(
            lock = %lock.display(),
            held = %held.display(),
            "lock slot stayed occupied; claim record left at the held path"
        );
    }

    fn remove_quiet(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove"),
        }
    }

    /// Deletes a leftover artifact. Used by the sweeper.
    pub(crate) fn remove_artifact(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove artifact");
                false
            }
        }
    }
}

fn create_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(unix)]
fn file_id(meta: &fs::Metadata) -> FileId {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_id(_meta: &fs::Metadata) -> FileId {
    None
}

/// Whether the lock moved to `held` is the one we created. Without file
/// identity the content decides: empty before our claim was written, our
/// claim id after.
fn is_own_lock(held: &Path, id: FileId, own: Option<Uuid>) -> bool {
    if let (Some(want), Ok(meta)) = (id, fs::metadata(held)) {
        return file_id(&meta) == Some(want);
    }
    let bytes = fs::read(held).unwrap_or_default();
    match own {
        None => bytes.is_empty(),
        Some(claim_id) => ClaimRecord::from_json(&bytes)
            .map(|r| r.claim_id == claim_id)
            .unwrap_or(false),
    }
}

fn exists(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn touch(path: &Path) {
    let res = OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(SystemTime::now()));
    if let Err(e) = res {
        tracing::debug!(path = %path.display(), error = %e, "could not refresh mtime");
    }
}
