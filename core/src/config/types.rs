use serde::{Deserialize, Serialize};

use crate::runner::{ApprovalPolicy, Engine, SandboxMode};

pub const MAX_CONCURRENCY: usize = 32;
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to `codex-worker.<pid>.log` under `directory`.
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "codex_worker_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Directory for log files. Defaults to `~/.codex-worker/logs`.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub engine: Engine,

    /// Engine default when unset.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub sandbox: SandboxMode,

    #[serde(default)]
    pub approval: ApprovalPolicy,

    /// Overridden by `CODEX_CMD`.
    #[serde(default = "default_codex_cmd")]
    pub codex_cmd: String,

    /// Overridden by `GEMINI_CMD`.
    #[serde(default = "default_gemini_cmd")]
    pub gemini_cmd: String,

    /// Binary for the `custom` engine.
    #[serde(default)]
    pub custom_cmd: Option<String>,

    /// Arguments for the `custom` engine; `{task}` becomes the task path.
    #[serde(default)]
    pub custom_args: Vec<String>,

    /// Pass `--skip-git-repo-check` to codex.
    #[serde(default = "default_skip_git_repo_check")]
    pub skip_git_repo_check: bool,

    /// Per-task limit in seconds. No limit when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Seconds between terminate and kill after a timeout.
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
}

fn default_codex_cmd() -> String {
    "codex".to_string()
}

fn default_gemini_cmd() -> String {
    "gemini".to_string()
}

fn default_skip_git_repo_check() -> bool {
    true
}

fn default_kill_grace_secs() -> u64 {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            engine: Engine::default(),
            model: None,
            sandbox: SandboxMode::default(),
            approval: ApprovalPolicy::default(),
            codex_cmd: default_codex_cmd(),
            gemini_cmd: default_gemini_cmd(),
            custom_cmd: None,
            custom_args: Vec::new(),
            skip_git_repo_check: default_skip_git_repo_check(),
            timeout_secs: None,
            kill_grace_secs: default_kill_grace_secs(),
        }
    }
}

impl AgentConfig {
    pub fn model(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.engine.default_model().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_pattern")]
    pub pattern: String,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause between two consecutive agent launches.
    #[serde(default)]
    pub launch_delay_ms: u64,

    /// Claims older than this are stale even if the owner looks alive.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Tail of agent output kept per attempt.
    #[serde(default = "default_capture_bytes")]
    pub capture_bytes: usize,

    /// Append one JSON line per finished attempt here.
    #[serde(default)]
    pub results_json: Option<String>,
}

fn default_pattern() -> String {
    "*.md".to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_stale_after_secs() -> u64 {
    3600
}

fn default_capture_bytes() -> usize {
    1024 * 1024
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            concurrency: default_concurrency(),
            launch_delay_ms: 0,
            stale_after_secs: default_stale_after_secs(),
            capture_bytes: default_capture_bytes(),
            results_json: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra tries after the first failure.
    #[serde(default)]
    pub max_retries: u32,

    /// "exponential-backoff" or "linear".
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_retry_strategy() -> String {
    "exponential-backoff".to_string()
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            strategy: default_retry_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}
