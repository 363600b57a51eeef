use std::path::PathBuf;

use crate::error::RunnerError;

use super::mode::{ApprovalPolicy, SandboxMode};
use super::types::RunnerStartArgs;

/// Everything an engine needs to build the command for one attempt.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub base: String,
    /// The claimed `in-progress-<base>` entry.
    pub task_path: PathBuf,
    pub model: String,
    pub mode: SandboxMode,
    pub approval: ApprovalPolicy,
    /// Prior failed attempts.
    pub attempt: u32,
}

impl AgentRequest {
    /// Environment every engine receives.
    pub fn base_envs(&self) -> [(String, String); 3] {
        [
            (
                "CODEX_WORKER_TASK".to_string(),
                self.task_path.display().to_string(),
            ),
            (
                "CODEX_WORKER_SANDBOX".to_string(),
                self.mode.as_str().to_string(),
            ),
            ("CODEX_WORKER_ATTEMPT".to_string(), self.attempt.to_string()),
        ]
    }
}

/// Turns a request into the concrete command line of one agent engine.
pub trait AgentPlanner: Send + Sync {
    fn name(&self) -> &str;
    fn plan(&self, req: &AgentRequest) -> Result<RunnerStartArgs, RunnerError>;
}
