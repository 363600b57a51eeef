//! Repeated discover, claim, execute, commit passes over one task directory
//! with a bounded number of concurrent slots.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::WorkerError;
use crate::runner::{ExecOutcome, ExecTask, Executor, FailureReason};
use crate::state::{
    AgeOnlyProbe, ClaimMeta, ClaimOutcome, ClaimedTask, CommitFailure, CommitOutcome, Inventory,
    LivenessProbe, LockSupervisor, NameCodec, OwnerToken, RequeueOutcome, StateStore,
    TaskDiscovery, TaskPattern, TaskState,
};

use super::progress::ProgressMonitor;
use super::results::{ResultLine, ResultsSink};
use super::retry::{ImmediateRetry, RetryStrategyPlugin};
use super::stop::StopFlag;

#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Only base names matching this are touched. All when `None`.
    pub pattern: Option<TaskPattern>,
    pub concurrency: usize,
    /// Minimum pause between two launches.
    pub launch_delay: Duration,
    pub progress: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            pattern: None,
            concurrency: 1,
            launch_delay: Duration::ZERO,
            progress: false,
        }
    }
}

/// Counts for one run of the pool.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub launched: usize,
    pub done: usize,
    /// Ended Failed with no try left.
    pub failed: usize,
    pub retried: usize,
    /// Commits refused because the claim was revoked meanwhile.
    pub not_owner: usize,
    /// Attempts whose outcome could not be recorded; the task stays Claimed.
    pub errors: usize,
    pub revoked: usize,
    /// Failed tasks still waiting out a retry delay when the run stopped.
    pub deferred: usize,
    pub interrupted: bool,
}

impl PoolSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// A pending task and the command a run would spawn for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    pub base: String,
    pub attempt: u32,
    pub command: String,
}

struct Shared {
    store: StateStore,
    executor: Executor,
    retry: Arc<dyn RetryStrategyPlugin>,
    results: Option<ResultsSink>,
}

struct SlotReport {
    slot: usize,
    base: String,
    result: SlotResult,
}

enum SlotResult {
    Done,
    Failed { retry_after: Option<Duration> },
    NotOwner,
    Error(String),
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    supervisor: LockSupervisor,
    owner: OwnerToken,
    opts: PoolOptions,
    stop: StopFlag,
}

pub struct WorkerPoolBuilder {
    store: StateStore,
    executor: Executor,
    retry: Option<Arc<dyn RetryStrategyPlugin>>,
    probe: Option<Arc<dyn LivenessProbe>>,
    stale_after: Duration,
    owner: Option<OwnerToken>,
    results: Option<ResultsSink>,
    stop: Option<StopFlag>,
    opts: PoolOptions,
}

impl WorkerPoolBuilder {
    pub fn retry(mut self, retry: Arc<dyn RetryStrategyPlugin>) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn stale_after(mut self, max_age: Duration) -> Self {
        self.stale_after = max_age;
        self
    }

    pub fn owner(mut self, owner: OwnerToken) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn results(mut self, sink: ResultsSink) -> Self {
        self.results = Some(sink);
        self
    }

    pub fn stop(mut self, stop: StopFlag) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn options(mut self, opts: PoolOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn build(self) -> WorkerPool {
        let owner = self.owner.unwrap_or_else(OwnerToken::current);
        let probe = self.probe.unwrap_or_else(|| Arc::new(AgeOnlyProbe));
        let supervisor =
            LockSupervisor::new(probe, self.stale_after).with_own_session(owner.session);
        WorkerPool {
            shared: Arc::new(Shared {
                store: self.store,
                executor: self.executor,
                retry: self
                    .retry
                    .unwrap_or_else(|| Arc::new(ImmediateRetry::default())),
                results: self.results,
            }),
            supervisor,
            owner,
            opts: self.opts,
            stop: self.stop.unwrap_or_default(),
        }
    }
}

/// Per-run bookkeeping of the scheduling loop.
#[derive(Default)]
struct RunState {
    summary: PoolSummary,
    in_flight: HashSet<String>,
    /// Failed tasks and when they may be requeued.
    waiting: HashMap<String, Instant>,
    /// Failed tasks a requeue was refused for; not retried again this run.
    given_up: HashSet<String>,
}

impl WorkerPool {
    pub fn builder(store: StateStore, executor: Executor) -> WorkerPoolBuilder {
        WorkerPoolBuilder {
            store,
            executor,
            retry: None,
            probe: None,
            stale_after: Duration::from_secs(3600),
            owner: None,
            results: None,
            stop: None,
            opts: PoolOptions::default(),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.shared.store
    }

    pub fn owner(&self) -> &OwnerToken {
        &self.owner
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Pending tasks in claim order with the command each would spawn.
    /// Claims nothing.
    pub fn plan_pending(&self) -> Result<Vec<PlannedTask>, WorkerError> {
        let store = &self.shared.store;
        let inventory = TaskDiscovery::scan(store, self.opts.pattern.as_ref())?;
        Ok(inventory
            .pending()
            .map(|t| {
                let task = ExecTask {
                    base: t.base.clone(),
                    path: store.path(&NameCodec::encode(&t.base, TaskState::Claimed)),
                    content: Vec::new(),
                    attempt: t.attempt,
                };
                let command = match self.shared.executor.plan(&task) {
                    Ok(args) => args.display(),
                    Err(e) => format!("<cannot plan: {e}>"),
                };
                PlannedTask {
                    base: t.base.clone(),
                    attempt: t.attempt,
                    command,
                }
            })
            .collect())
    }

    /// Runs passes until nothing is pending, no slot is busy, and no retry
    /// is due, or until the stop flag is set and running tasks finished.
    ///
    /// Per-task failures are recorded as task state. Only an unreadable
    /// directory or a filesystem without atomic rename ends the run early.
    pub async fn run(&self) -> Result<PoolSummary, WorkerError> {
        let store = &self.shared.store;
        store.verify_atomic_rename()?;

        let concurrency = self.opts.concurrency.max(1);
        let executor = &self.shared.executor;
        tracing::info!(
            session = %self.owner.short(),
            dir = %store.root().display(),
            concurrency,
            engine = executor.engine(),
            model = executor.model(),
            mode = executor.mode().as_str(),
            retry = self.shared.retry.name(),
            "pool started"
        );

        let mut st = RunState::default();
        let mut set: JoinSet<SlotReport> = JoinSet::new();
        let mut free: Vec<usize> = (0..concurrency).rev().collect();
        let mut last_launch: Option<Instant> = None;
        let mut progress: Option<Arc<Mutex<ProgressMonitor>>> = None;

        loop {
            let mut launched = 0usize;
            if !self.stop.is_stopped() && !free.is_empty() {
                let (inventory, requeued) = self.prepare_pass(&mut st)?;
                let monitor = progress
                    .get_or_insert_with(|| {
                        Arc::new(Mutex::new(ProgressMonitor::new(
                            inventory.pending().count(),
                            self.opts.progress,
                        )))
                    })
                    .clone();
                if requeued > 0 {
                    lock(&monitor).add_work(requeued as u64);
                }

                for task in inventory.pending() {
                    if free.is_empty() || self.stop.is_stopped() {
                        break;
                    }
                    if st.in_flight.contains(&task.base) {
                        continue;
                    }
                    if let Some(at) = last_launch {
                        if !self.opts.launch_delay.is_zero() {
                            self.pause_until(at + self.opts.launch_delay).await;
                            if self.stop.is_stopped() {
                                break;
                            }
                        }
                    }

                    let Some(&slot) = free.last() else {
                        break;
                    };
                    let meta = ClaimMeta {
                        worker_id: slot,
                        engine: executor.engine().to_string(),
                        model: executor.model().to_string(),
                    };
                    let claim = match store.claim(&task.base, &self.owner, &meta) {
                        Ok(ClaimOutcome::Won(claim)) => claim,
                        Ok(ClaimOutcome::Lost) => continue,
                        Err(e) => {
                            tracing::warn!(base = %task.base, error = %e, "claim failed");
                            continue;
                        }
                    };

                    free.pop();
                    st.in_flight.insert(task.base.clone());
                    st.summary.launched += 1;
                    launched += 1;
                    last_launch = Some(Instant::now());
                    tracing::info!(
                        base = %claim.base,
                        worker = slot,
                        attempt = claim.attempt() + 1,
                        "task claimed"
                    );
                    set.spawn(slot_task(self.shared.clone(), slot, claim, monitor.clone()));
                }
            }

            let stopped = self.stop.is_stopped();
            if set.is_empty() && launched == 0 && (st.waiting.is_empty() || stopped) {
                break;
            }

            let next_due = st.waiting.values().min().copied();
            tokio::select! {
                joined = set.join_next(), if !set.is_empty() => {
                    if let Some(joined) = joined {
                        match joined {
                            Ok(report) => {
                                free.push(report.slot);
                                self.finish_slot(&mut st, report);
                            }
                            // The slot task catches panics of the work itself.
                            Err(e) => tracing::error!(error = %e, "worker slot aborted"),
                        }
                    }
                }
                _ = sleep_until(next_due), if next_due.is_some() && !stopped => {}
                _ = self.stop.stopped(), if !stopped => {
                    tracing::warn!(running = set.len(), "stop requested; finishing running tasks");
                }
            }
        }

        st.summary.interrupted = self.stop.is_stopped();
        st.summary.deferred = st.waiting.len();
        if let Some(monitor) = progress {
            lock(&monitor).finish(!st.summary.has_failures());
        }
        tracing::info!(summary = ?st.summary, "pool finished");
        Ok(st.summary)
    }

    /// Scan, sweep, requeue due retries, and rescan if anything moved.
    fn prepare_pass(&self, st: &mut RunState) -> Result<(Inventory, usize), WorkerError> {
        let store = &self.shared.store;
        let pattern = self.opts.pattern.as_ref();
        let inventory = TaskDiscovery::scan(store, pattern)?;
        let mut changed = false;

        match self.supervisor.sweep(store, &inventory) {
            Ok(report) => {
                st.summary.revoked += report.revoked;
                changed = report.revoked > 0;
            }
            Err(e) => tracing::warn!(error = %e, "sweep failed"),
        }

        self.adopt_failed(st, &inventory);

        let now = Instant::now();
        let due: Vec<String> = st
            .waiting
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(base, _)| base.clone())
            .collect();
        let mut requeued = 0;
        for base in due {
            st.waiting.remove(&base);
            match store.requeue(&base, self.shared.retry.max_retries()) {
                Ok(RequeueOutcome::Requeued(_)) => {
                    st.summary.retried += 1;
                    requeued += 1;
                    changed = true;
                }
                Ok(other) => {
                    tracing::debug!(base = %base, ?other, "retry not requeued");
                    st.given_up.insert(base);
                }
                Err(e) => {
                    tracing::warn!(base = %base, error = %e, "requeue failed");
                    st.given_up.insert(base);
                }
            }
        }

        let inventory = if changed {
            TaskDiscovery::scan(store, pattern)?
        } else {
            inventory
        };
        Ok((inventory, requeued))
    }

    /// Picks up Failed tasks with tries left that nobody is waiting on, for
    /// example after an earlier run stopped during a retry delay.
    fn adopt_failed(&self, st: &mut RunState, inventory: &Inventory) {
        let retry = &self.shared.retry;
        let now = Instant::now();
        for task in inventory.tasks.iter().filter(|t| t.state == TaskState::Failed) {
            if st.waiting.contains_key(&task.base)
                || st.given_up.contains(&task.base)
                || st.in_flight.contains(&task.base)
            {
                continue;
            }
            let Some(header) = &task.terminal else {
                continue;
            };
            let reason = header.reason.as_deref().unwrap_or_default();
            if !header.retryable || !retry.should_retry(header.attempt, reason) {
                continue;
            }
            let delay = retry.next_delay(header.attempt, reason).unwrap_or_default();
            let elapsed = (Utc::now() - header.finished_at)
                .to_std()
                .unwrap_or_default();
            st.waiting
                .insert(task.base.clone(), now + delay.saturating_sub(elapsed));
        }
    }

    fn finish_slot(&self, st: &mut RunState, report: SlotReport) {
        st.in_flight.remove(&report.base);
        match report.result {
            SlotResult::Done => st.summary.done += 1,
            SlotResult::Failed { retry_after: None } => st.summary.failed += 1,
            SlotResult::Failed {
                retry_after: Some(delay),
            } => {
                tracing::info!(base = %report.base, delay_ms = delay.as_millis() as u64, "retry scheduled");
                st.waiting.insert(report.base, Instant::now() + delay);
            }
            SlotResult::NotOwner => st.summary.not_owner += 1,
            SlotResult::Error(e) => {
                tracing::error!(base = %report.base, error = %e, "attempt not recorded");
                st.summary.errors += 1;
            }
        }
    }

    async fn pause_until(&self, at: Instant) {
        tokio::select! {
            _ = tokio::time::sleep_until(at) => {}
            _ = self.stop.stopped() => {}
        }
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn lock(monitor: &Mutex<ProgressMonitor>) -> MutexGuard<'_, ProgressMonitor> {
    monitor.lock().unwrap_or_else(|p| p.into_inner())
}

/// Runs the work of one slot on its own task so a panic still frees the slot.
async fn slot_task(
    shared: Arc<Shared>,
    slot: usize,
    claim: ClaimedTask,
    progress: Arc<Mutex<ProgressMonitor>>,
) -> SlotReport {
    let base = claim.base.clone();
    let result = match tokio::spawn(work(shared, slot, claim, progress)).await {
        Ok(result) => result,
        Err(e) => SlotResult::Error(format!("worker panicked: {e}")),
    };
    SlotReport { slot, base, result }
}

/// Execute, then commit. The claim is always either committed or left for
/// the supervisor.
async fn work(
    shared: Arc<Shared>,
    slot: usize,
    claim: ClaimedTask,
    progress: Arc<Mutex<ProgressMonitor>>,
) -> SlotResult {
    let store = &shared.store;
    let executor = &shared.executor;
    let base = claim.base.as_str();
    let tries = claim.attempt() + 1;
    lock(&progress).add_task(base, claim.attempt());

    let (outcome, duration, exit_code) = match store.read_claimed(&claim) {
        Ok(content) => {
            let task = ExecTask {
                base: base.to_string(),
                path: claim.path.clone(),
                content,
                attempt: claim.attempt(),
            };
            let res = executor.run(&task).await;
            let exit_code = res.exit_code();
            (res.outcome, res.duration, exit_code)
        }
        Err(e) => (
            ExecOutcome::Failure {
                log: format!("[codex-worker] cannot read task: {e}\n").into_bytes(),
                reason: FailureReason::Io(e.to_string()),
            },
            Duration::ZERO,
            None,
        ),
    };
    let duration_ms = duration.as_millis() as u64;

    let (status, reason, retry_after, commit) = match outcome {
        ExecOutcome::Success { log } => (TaskState::Done, None, None, store.commit_done(&claim, log)),
        ExecOutcome::Failure { log, reason } => {
            let text = reason.to_string();
            let retryable = reason.is_retryable() && !shared.retry.is_fatal_error(&text);
            let retry_after = (retryable && shared.retry.should_retry(tries, &text))
                .then(|| shared.retry.next_delay(tries, &text).unwrap_or_default());
            tracing::warn!(base, worker = slot, attempt = tries, reason = %text, "task failed");
            let failure = CommitFailure {
                reason: text.clone(),
                retryable,
            };
            let commit = store.commit_failed(&claim, tries, failure, log);
            (TaskState::Failed, Some(text), retry_after, commit)
        }
    };
    lock(&progress).complete_task(base, status == TaskState::Done, duration_ms);

    match commit {
        Ok(CommitOutcome::Ok(path)) => {
            tracing::info!(
                base,
                worker = slot,
                status = status.as_str(),
                attempt = tries,
                duration_ms,
                "task finished"
            );
            if let Some(sink) = &shared.results {
                sink.record(&ResultLine {
                    timestamp: Utc::now(),
                    base: base.to_string(),
                    status,
                    engine: executor.engine().to_string(),
                    model: executor.model().to_string(),
                    exit_code,
                    reason,
                    attempt: tries,
                    duration_ms,
                    path: Some(path),
                });
            }
            match status {
                TaskState::Done => SlotResult::Done,
                _ => SlotResult::Failed { retry_after },
            }
        }
        Ok(CommitOutcome::NotOwner) => {
            tracing::warn!(base, worker = slot, "result discarded: claim was revoked");
            SlotResult::NotOwner
        }
        Err(e) => SlotResult::Error(e.to_string()),
    }
}
