//! Runs one claimed task through the agent and classifies the result.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use crate::util::RingBytes;

use super::io_pump::{pump_stderr, pump_stdout};
use super::mode::{ApprovalPolicy, ModeGate, SandboxMode};
use super::planner::{AgentPlanner, AgentRequest};
use super::traits::{RunnerPlugin, RunnerSession};
use super::types::{FailureReason, RunnerStartArgs, Signal};

/// Output still arriving after exit (from grandchildren holding the pipes)
/// is abandoned after this long.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub model: String,
    pub approval: ApprovalPolicy,
    pub timeout: Option<Duration>,
    /// Wait between the cooperative terminate and the forced kill.
    pub kill_grace: Duration,
    pub capture_bytes: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            approval: ApprovalPolicy::Never,
            timeout: None,
            kill_grace: Duration::from_secs(5),
            capture_bytes: 1024 * 1024,
        }
    }
}

/// A claimed task handed to the executor.
#[derive(Debug, Clone)]
pub struct ExecTask {
    pub base: String,
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Success { log: Vec<u8> },
    Failure { log: Vec<u8>, reason: FailureReason },
}

impl ExecOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecOutcome::Success { .. })
    }

    pub fn into_log(self) -> Vec<u8> {
        match self {
            ExecOutcome::Success { log } | ExecOutcome::Failure { log, .. } => log,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub outcome: ExecOutcome,
    pub duration: Duration,
}

impl ExecResult {
    pub fn exit_code(&self) -> Option<i32> {
        match &self.outcome {
            ExecOutcome::Success { .. } => Some(0),
            ExecOutcome::Failure { reason, .. } => reason.exit_code(),
        }
    }
}

pub struct Executor {
    runner: Arc<dyn RunnerPlugin>,
    planner: Arc<dyn AgentPlanner>,
    gate: ModeGate,
    opts: ExecOptions,
}

impl Executor {
    pub fn new(
        runner: Arc<dyn RunnerPlugin>,
        planner: Arc<dyn AgentPlanner>,
        gate: ModeGate,
        opts: ExecOptions,
    ) -> Self {
        Self {
            runner,
            planner,
            gate,
            opts,
        }
    }

    pub fn engine(&self) -> &str {
        self.planner.name()
    }

    pub fn model(&self) -> &str {
        &self.opts.model
    }

    pub fn mode(&self) -> SandboxMode {
        self.gate.mode()
    }

    fn request(&self, task: &ExecTask) -> AgentRequest {
        AgentRequest {
            base: task.base.clone(),
            task_path: task.path.clone(),
            model: self.opts.model.clone(),
            mode: self.gate.mode(),
            approval: self.opts.approval,
            attempt: task.attempt,
        }
    }

    /// The command a run of `task` would spawn.
    pub fn plan(&self, task: &ExecTask) -> Result<RunnerStartArgs, crate::error::RunnerError> {
        self.planner.plan(&self.request(task))
    }

    /// Never fails: every problem becomes a [`FailureReason`].
    pub async fn run(&self, task: &ExecTask) -> ExecResult {
        let started = Instant::now();
        let outcome = self.run_inner(task).await;
        ExecResult {
            outcome,
            duration: started.elapsed(),
        }
    }

    async fn run_inner(&self, task: &ExecTask) -> ExecOutcome {
        let args = match self.plan(task) {
            Ok(a) => a,
            Err(e) => return spawn_failure(e.to_string()),
        };
        tracing::debug!(base = %task.base, command = %args.display(), "spawning agent");

        let mut session = match self.runner.start_session(&args).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(base = %task.base, runner = self.runner.name(), error = %e, "agent failed to start");
                return spawn_failure(format!("{e:#}"));
            }
        };

        let ring = RingBytes::new(self.opts.capture_bytes);
        let feeder = if args.pipe_stdin {
            session.stdin().map(|mut w| {
                let content = task.content.clone();
                tokio::spawn(async move {
                    // The agent may exit without reading; a broken pipe is fine.
                    let _ = w.write_all(&content).await;
                    let _ = w.shutdown().await;
                })
            })
        } else {
            None
        };
        let out = session.stdout().map(|r| pump_stdout(r, ring.clone()));
        let err = session.stderr().map(|r| pump_stderr(r, ring.clone()));

        let waited = match self.opts.timeout {
            Some(limit) => match tokio::time::timeout(limit, session.wait()).await {
                Ok(r) => Some(r),
                Err(_) => {
                    tracing::warn!(base = %task.base, timeout_secs = limit.as_secs(), "agent timed out");
                    self.terminate(&mut session).await;
                    None
                }
            },
            None => Some(session.wait().await),
        };

        for handle in [out, err].into_iter().flatten() {
            drain(handle).await;
        }
        if let Some(f) = feeder {
            f.abort();
        }

        let mut log = ring.to_log();
        match waited {
            None => {
                let limit = self.opts.timeout.unwrap_or_default();
                log.extend_from_slice(
                    format!("\n[codex-worker] killed after {}s timeout\n", limit.as_secs())
                        .as_bytes(),
                );
                ExecOutcome::Failure {
                    log,
                    reason: FailureReason::Timeout(limit),
                }
            }
            Some(Err(e)) => ExecOutcome::Failure {
                log,
                reason: FailureReason::Io(format!("{e:#}")),
            },
            Some(Ok(o)) if o.exit_code == 0 => ExecOutcome::Success { log },
            Some(Ok(o)) => ExecOutcome::Failure {
                log,
                reason: FailureReason::NonZeroExit(o.exit_code),
            },
        }
    }

    /// Terminate, give the agent a grace period, then kill.
    async fn terminate(&self, session: &mut Box<dyn RunnerSession>) {
        if let Err(e) = session.signal(Signal::Term).await {
            tracing::debug!(error = %e, "terminate signal failed");
        }
        if tokio::time::timeout(self.opts.kill_grace, session.wait())
            .await
            .is_ok()
        {
            return;
        }
        if let Err(e) = session.signal(Signal::Kill).await {
            tracing::warn!(error = %e, "kill signal failed");
        }
        let _ = session.wait().await;
    }
}

async fn drain(mut handle: JoinHandle<Result<u64, crate::error::RunnerError>>) {
    match tokio::time::timeout(DRAIN_GRACE, &mut handle).await {
        Ok(Ok(Ok(_))) => {}
        Ok(Ok(Err(e))) => tracing::warn!(error = %e, "output capture failed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "output pump panicked"),
        Err(_) => {
            tracing::debug!("output still open after exit; abandoning");
            handle.abort();
        }
    }
}

fn spawn_failure(msg: String) -> ExecOutcome {
    ExecOutcome::Failure {
        log: format!("[codex-worker] {msg}\n").into_bytes(),
        reason: FailureReason::SpawnFailure(msg),
    }
}
