use std::path::{Path, PathBuf};

use clap::{Args as ClapArgs, Parser, Subcommand};
use codex_worker_core::config::WorkerSettings;
use codex_worker_core::error::WorkerError;
use codex_worker_core::runner::{ApprovalPolicy, Engine, SandboxMode};
use codex_worker_core::state::{EntryKind, NameCodec, TaskPattern};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineArg {
    Codex,
    Gemini,
    Custom,
}

impl From<EngineArg> for Engine {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Codex => Engine::Codex,
            EngineArg::Gemini => Engine::Gemini,
            EngineArg::Custom => Engine::Custom,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

impl From<ModeArg> for SandboxMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::ReadOnly => SandboxMode::ReadOnly,
            ModeArg::WorkspaceWrite => SandboxMode::WorkspaceWrite,
            ModeArg::DangerFullAccess => SandboxMode::DangerFullAccess,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalArg {
    Untrusted,
    OnFailure,
    OnRequest,
    Never,
}

impl From<ApprovalArg> for ApprovalPolicy {
    fn from(v: ApprovalArg) -> Self {
        match v {
            ApprovalArg::Untrusted => ApprovalPolicy::Untrusted,
            ApprovalArg::OnFailure => ApprovalPolicy::OnFailure,
            ApprovalArg::OnRequest => ApprovalPolicy::OnRequest,
            ApprovalArg::Never => ApprovalPolicy::Never,
        }
    }
}

/// Runs a directory of task files through an AI agent, one claim at a time,
/// safely shared between any number of worker processes.
#[derive(Parser, Debug)]
#[command(name = "codex-worker", version, args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // `run` arguments when no subcommand is given.
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Claim and execute pending tasks (the default).
    Run(RunArgs),
    /// Show how many tasks are in each state.
    Status(StatusArgs),
    /// Revoke stale claims and remove dead lock artifacts.
    Clean(CleanArgs),
    /// Return every finished task to pending.
    Reset(ResetArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CommonArgs {
    /// Task directories, or single task files.
    #[arg(value_name = "PATH", default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Glob matched against task base names.
    #[arg(long, short = 'p')]
    pub pattern: Option<String>,

    /// Settings file; replaces the default lookup.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// A task directory and the pattern selecting tasks in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub dir: PathBuf,
    pub pattern: String,
}

impl CommonArgs {
    /// A directory path uses `--pattern`, or `default_pattern` without one.
    /// A file path selects the task that file belongs to, in whatever state.
    pub fn targets(&self, default_pattern: &str) -> Result<Vec<Target>, WorkerError> {
        let pattern = TaskPattern::new(self.pattern.as_deref().unwrap_or(default_pattern))?;
        self.paths
            .iter()
            .map(|path| {
                if !path.is_file() {
                    return Ok(Target {
                        dir: path.clone(),
                        pattern: pattern.as_str().to_string(),
                    });
                }
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let EntryKind::Task { base, .. } = NameCodec::decode(&name) else {
                    return Err(WorkerError::Config(format!(
                        "{} is not a task file",
                        path.display()
                    )));
                };
                let dir = path
                    .parent()
                    .filter(|d| !d.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                Ok(Target {
                    dir,
                    pattern: TaskPattern::exact(&base)?.as_str().to_string(),
                })
            })
            .collect()
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, value_enum)]
    pub engine: Option<EngineArg>,

    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Safety mode passed to the agent.
    #[arg(long, visible_alias = "sandbox", value_enum)]
    pub mode: Option<ModeArg>,

    #[arg(long, short = 'a', value_enum)]
    pub approval: Option<ApprovalArg>,

    /// Parallel agent processes in this worker (1-32).
    #[arg(long, short = 'c')]
    pub concurrency: Option<usize>,

    /// Per-task limit in seconds.
    #[arg(long, short = 't', value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Extra attempts after a retryable failure (0-10).
    #[arg(long, short = 'r')]
    pub retries: Option<u32>,

    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Claims older than this many seconds count as stale.
    #[arg(long)]
    pub stale_after: Option<u64>,

    #[arg(long)]
    pub launch_delay_ms: Option<u64>,

    /// Agent binary. Required for `--engine custom`.
    #[arg(long)]
    pub agent_cmd: Option<String>,

    /// Argument for the custom engine; repeatable. `{task}` becomes the task path.
    #[arg(long = "agent-arg", allow_hyphen_values = true)]
    pub agent_args: Vec<String>,

    /// Do not pass `--skip-git-repo-check` to codex.
    #[arg(long)]
    pub no_skip_git_check: bool,

    /// Append one JSON line per finished attempt to this file.
    #[arg(long, short = 'o')]
    pub results_json: Option<PathBuf>,

    /// List pending tasks and their commands without claiming anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Return Done tasks to pending before running. Otherwise they are skipped.
    #[arg(long)]
    pub rerun_completed: bool,

    #[arg(long)]
    pub progress: bool,

    /// Acknowledge `danger-full-access` without a prompt.
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl RunArgs {
    /// Flags win over the settings file and the environment.
    pub fn apply(&self, cfg: &mut WorkerSettings) {
        if let Some(p) = &self.common.pattern {
            cfg.pool.pattern = p.clone();
        }
        if let Some(e) = self.engine {
            cfg.agent.engine = e.into();
        }
        if let Some(m) = &self.model {
            cfg.agent.model = Some(m.clone());
        }
        if let Some(m) = self.mode {
            cfg.agent.sandbox = m.into();
        }
        if let Some(a) = self.approval {
            cfg.agent.approval = a.into();
        }
        if let Some(c) = self.concurrency {
            cfg.pool.concurrency = c;
        }
        if let Some(t) = self.timeout {
            cfg.agent.timeout_secs = Some(t);
        }
        if let Some(r) = self.retries {
            cfg.retry.max_retries = r;
        }
        if let Some(d) = self.retry_delay_ms {
            cfg.retry.base_delay_ms = d;
        }
        if let Some(s) = self.stale_after {
            cfg.pool.stale_after_secs = s;
        }
        if let Some(d) = self.launch_delay_ms {
            cfg.pool.launch_delay_ms = d;
        }
        if let Some(cmd) = &self.agent_cmd {
            match cfg.agent.engine {
                Engine::Codex => cfg.agent.codex_cmd = cmd.clone(),
                Engine::Gemini => cfg.agent.gemini_cmd = cmd.clone(),
                Engine::Custom => cfg.agent.custom_cmd = Some(cmd.clone()),
            }
        }
        if !self.agent_args.is_empty() {
            cfg.agent.custom_args = self.agent_args.clone();
        }
        if self.no_skip_git_check {
            cfg.agent.skip_git_repo_check = false;
        }
        if let Some(p) = &self.results_json {
            cfg.pool.results_json = Some(p.to_string_lossy().to_string());
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// One row per task with owner and failure detail.
    #[arg(long, short = 'd')]
    pub detailed: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CleanArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Seconds after which a claim is stale regardless of its owner.
    #[arg(long, default_value_t = 3600)]
    pub max_age: u64,

    /// Only list the claims that would be revoked.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ResetArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'f', visible_alias = "yes")]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn bare_invocation_is_a_run() {
        let args = Args::try_parse_from(["codex-worker", "tasks", "-c", "4", "--mode", "workspace-write"])
            .unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.run.common.paths, vec![PathBuf::from("tasks")]);
        assert_eq!(args.run.concurrency, Some(4));
        assert_eq!(args.run.mode, Some(ModeArg::WorkspaceWrite));
    }

    #[test]
    fn subcommands_parse() {
        let args = Args::try_parse_from(["codex-worker", "clean", "jobs", "--max-age", "60"]).unwrap();
        match args.command {
            Some(Commands::Clean(c)) => {
                assert_eq!(c.common.paths, vec![PathBuf::from("jobs")]);
                assert_eq!(c.max_age, 60);
                assert!(!c.dry_run);
            }
            other => panic!("unexpected {other:?}"),
        }

        let args = Args::try_parse_from(["codex-worker", "reset", "-f"]).unwrap();
        assert!(matches!(args.command, Some(Commands::Reset(r)) if r.force));

        let args = Args::try_parse_from(["codex-worker", "status", "-d"]).unwrap();
        assert!(matches!(args.command, Some(Commands::Status(s)) if s.detailed && !s.json));
    }

    #[test]
    fn several_paths_become_targets() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = dir.path().join("jobs");
        std::fs::create_dir(&jobs).unwrap();
        let task = dir.path().join("fix [1].md");
        std::fs::write(&task, "fix it").unwrap();
        let failed = dir.path().join("failed_exec_log-b.md.txt");
        std::fs::write(&failed, "log").unwrap();

        let paths = [&jobs, &task, &failed].map(|p| p.to_string_lossy().into_owned());
        let args = Args::try_parse_from(
            ["codex-worker", "run", "-p", "*.txt"]
                .into_iter()
                .chain(paths.iter().map(String::as_str)),
        )
        .unwrap();
        let Some(Commands::Run(run)) = args.command else {
            panic!("expected run");
        };
        let targets = run.common.targets("*").unwrap();

        assert_eq!(
            targets,
            vec![
                Target {
                    dir: jobs.clone(),
                    pattern: "*.txt".into()
                },
                Target {
                    dir: dir.path().to_path_buf(),
                    pattern: "fix [[]1[]].md".into()
                },
                Target {
                    dir: dir.path().to_path_buf(),
                    pattern: "b.md".into()
                },
            ]
        );
    }

    #[test]
    fn paths_default_to_the_current_directory() {
        let args = Args::try_parse_from(["codex-worker", "status"]).unwrap();
        let Some(Commands::Status(s)) = args.command else {
            panic!("expected status");
        };
        assert_eq!(
            s.common.targets("*.md").unwrap(),
            vec![Target {
                dir: PathBuf::from("."),
                pattern: "*.md".into()
            }]
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(Args::try_parse_from(["codex-worker", "run", "-t", "0"]).is_err());
    }

    #[test]
    fn flags_override_settings() {
        let args = Args::try_parse_from([
            "codex-worker",
            "run",
            "--engine",
            "custom",
            "--agent-cmd",
            "./agent.sh",
            "--agent-arg",
            "--file",
            "--agent-arg",
            "{task}",
            "-r",
            "3",
            "-p",
            "*.txt",
            "-a",
            "never",
        ])
        .unwrap();
        let Some(Commands::Run(run)) = args.command else {
            panic!("expected run");
        };
        let mut cfg = WorkerSettings::default();
        run.apply(&mut cfg);

        assert_eq!(cfg.agent.engine, Engine::Custom);
        assert_eq!(cfg.agent.custom_cmd.as_deref(), Some("./agent.sh"));
        assert_eq!(cfg.agent.custom_args, vec!["--file", "{task}"]);
        assert_eq!(cfg.agent.codex_cmd, "codex");
        assert_eq!(cfg.agent.approval, ApprovalPolicy::Never);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.pool.pattern, "*.txt");
        assert_eq!(cfg.pool.concurrency, 1);
        cfg.validate(false).unwrap();
    }
}
