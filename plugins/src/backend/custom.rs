use codex_worker_core::error::RunnerError;
use codex_worker_core::runner::{AgentPlanner, AgentRequest, RunnerStartArgs};

use super::resolve::resolve_executable_path;

const TASK_PLACEHOLDER: &str = "{task}";

/// Any agent binary. Arguments are passed as configured, with `{task}`
/// replaced by the claimed entry's path. Without a `{task}` argument the
/// task text is piped on stdin.
pub struct CustomPlanner {
    cmd: String,
    args: Vec<String>,
}

impl CustomPlanner {
    pub fn new(cmd: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args,
        }
    }
}

impl AgentPlanner for CustomPlanner {
    fn name(&self) -> &str {
        "custom"
    }

    fn plan(&self, req: &AgentRequest) -> Result<RunnerStartArgs, RunnerError> {
        if self.cmd.trim().is_empty() {
            return Err(RunnerError::Plan("no agent command configured".into()));
        }
        let task = req.task_path.display().to_string();
        let by_path = self.args.iter().any(|a| a.contains(TASK_PLACEHOLDER));
        let args = self
            .args
            .iter()
            .map(|a| a.replace(TASK_PLACEHOLDER, &task))
            .collect();

        let mut envs: std::collections::HashMap<String, String> =
            req.base_envs().into_iter().collect();
        envs.insert("CODEX_WORKER_MODEL".to_string(), req.model.clone());
        envs.insert(
            "CODEX_WORKER_APPROVAL".to_string(),
            req.approval.as_str().to_string(),
        );

        Ok(RunnerStartArgs {
            cmd: resolve_executable_path(&self.cmd),
            args,
            envs,
            cwd: None,
            pipe_stdin: !by_path,
        })
    }
}
