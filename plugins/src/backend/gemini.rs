use codex_worker_core::error::RunnerError;
use codex_worker_core::runner::{AgentPlanner, AgentRequest, RunnerStartArgs};

use super::resolve::resolve_executable_path;

/// `gemini -m <model>`, task text on stdin. The sandbox and approval
/// settings reach the agent only through the environment.
pub struct GeminiPlanner {
    cmd: String,
}

impl GeminiPlanner {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

impl AgentPlanner for GeminiPlanner {
    fn name(&self) -> &str {
        "gemini"
    }

    fn plan(&self, req: &AgentRequest) -> Result<RunnerStartArgs, RunnerError> {
        if self.cmd.trim().is_empty() {
            return Err(RunnerError::Plan("gemini command is empty".into()));
        }
        Ok(RunnerStartArgs {
            cmd: resolve_executable_path(&self.cmd),
            args: vec!["-m".to_string(), req.model.clone()],
            envs: req.base_envs().into_iter().collect(),
            cwd: None,
            pipe_stdin: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codex_worker_core::runner::{ApprovalPolicy, SandboxMode};
    use std::path::PathBuf;

    #[test]
    fn builds_one_shot_command() {
        let req = AgentRequest {
            base: "a.md".into(),
            task_path: PathBuf::from("in-progress-a.md"),
            model: "gemini-2.5-pro".into(),
            mode: SandboxMode::ReadOnly,
            approval: ApprovalPolicy::OnRequest,
            attempt: 0,
        };
        let plan = GeminiPlanner::new("/usr/local/bin/gemini").plan(&req).unwrap();
        assert_eq!(plan.display(), "/usr/local/bin/gemini -m gemini-2.5-pro");
        assert_eq!(plan.envs["CODEX_WORKER_SANDBOX"], "read-only");
    }
}
