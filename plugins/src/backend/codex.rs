use codex_worker_core::error::RunnerError;
use codex_worker_core::runner::{AgentPlanner, AgentRequest, RunnerStartArgs};

use super::resolve::resolve_executable_path;

/// `codex --ask-for-approval <a> --sandbox <m> --model <model> exec
/// [--skip-git-repo-check]`, task text on stdin.
pub struct CodexPlanner {
    cmd: String,
    skip_git_repo_check: bool,
}

impl CodexPlanner {
    pub fn new(cmd: impl Into<String>, skip_git_repo_check: bool) -> Self {
        Self {
            cmd: cmd.into(),
            skip_git_repo_check,
        }
    }
}

impl AgentPlanner for CodexPlanner {
    fn name(&self) -> &str {
        "codex"
    }

    fn plan(&self, req: &AgentRequest) -> Result<RunnerStartArgs, RunnerError> {
        if self.cmd.trim().is_empty() {
            return Err(RunnerError::Plan("codex command is empty".into()));
        }
        let mut args = vec![
            "--ask-for-approval".to_string(),
            req.approval.as_str().to_string(),
            "--sandbox".to_string(),
            req.mode.as_str().to_string(),
            "--model".to_string(),
            req.model.clone(),
            "exec".to_string(),
        ];
        if self.skip_git_repo_check {
            args.push("--skip-git-repo-check".to_string());
        }

        Ok(RunnerStartArgs {
            cmd: resolve_executable_path(&self.cmd),
            args,
            envs: req.base_envs().into_iter().collect(),
            cwd: None,
            pipe_stdin: true,
        })
    }
}
