use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use codex_worker_core::config::{AgentConfig, RetryConfig, WorkerSettings};
use codex_worker_core::error::WorkerError;
use codex_worker_core::pool::{PoolOptions, ResultsSink, RetryStrategyPlugin, WorkerPool};
use codex_worker_core::runner::{
    AgentPlanner, Engine, ExecOptions, Executor, ModeGate, RunnerPlugin,
};
use codex_worker_core::state::{LivenessProbe, LockSupervisor, StateStore, TaskPattern};

use crate::backend::{CodexPlanner, CustomPlanner, GeminiPlanner};
use crate::liveness::SysinfoLivenessProbe;
use crate::runner::CodeCliRunnerPlugin;
use crate::strategies::{ExponentialBackoffPlugin, LinearRetryPlugin};

pub fn build_runner(_cfg: &AgentConfig) -> Arc<dyn RunnerPlugin> {
    Arc::new(CodeCliRunnerPlugin::new())
}

pub fn build_planner(cfg: &AgentConfig) -> Arc<dyn AgentPlanner> {
    match cfg.engine {
        Engine::Codex => Arc::new(CodexPlanner::new(
            cfg.codex_cmd.clone(),
            cfg.skip_git_repo_check,
        )),
        Engine::Gemini => Arc::new(GeminiPlanner::new(cfg.gemini_cmd.clone())),
        Engine::Custom => Arc::new(CustomPlanner::new(
            cfg.custom_cmd.clone().unwrap_or_default(),
            cfg.custom_args.clone(),
        )),
    }
}

pub fn build_retry(cfg: &RetryConfig) -> Arc<dyn RetryStrategyPlugin> {
    match cfg.strategy.as_str() {
        "linear" => Arc::new(LinearRetryPlugin::new(cfg.clone())),
        // Validation rejects anything else before we get here.
        _ => Arc::new(ExponentialBackoffPlugin::new(cfg.clone())),
    }
}

pub fn build_probe() -> Arc<dyn LivenessProbe> {
    Arc::new(SysinfoLivenessProbe::new())
}

pub fn build_supervisor(max_age: Duration) -> LockSupervisor {
    LockSupervisor::new(build_probe(), max_age)
}

pub fn build_executor(cfg: &WorkerSettings, acknowledged: bool) -> Result<Executor, WorkerError> {
    let agent = &cfg.agent;
    let gate = ModeGate::new(agent.sandbox, acknowledged)?;
    let opts = ExecOptions {
        model: agent.model(),
        approval: agent.approval,
        timeout: agent.timeout_secs.map(Duration::from_secs),
        kill_grace: Duration::from_secs(agent.kill_grace_secs),
        capture_bytes: cfg.pool.capture_bytes,
    };
    Ok(Executor::new(
        build_runner(agent),
        build_planner(agent),
        gate,
        opts,
    ))
}

/// Validates `cfg` and assembles a pool over `dir`.
pub fn build_pool(
    cfg: &WorkerSettings,
    dir: &Path,
    acknowledged: bool,
    progress: bool,
) -> Result<WorkerPool, WorkerError> {
    cfg.validate(acknowledged)?;
    let store = StateStore::open(dir)?;
    let executor = build_executor(cfg, acknowledged)?;

    let mut builder = WorkerPool::builder(store, executor)
        .retry(build_retry(&cfg.retry))
        .probe(build_probe())
        .stale_after(Duration::from_secs(cfg.pool.stale_after_secs))
        .options(PoolOptions {
            pattern: Some(TaskPattern::new(&cfg.pool.pattern)?),
            concurrency: cfg.pool.concurrency,
            launch_delay: Duration::from_millis(cfg.pool.launch_delay_ms),
            progress,
        });
    if let Some(path) = cfg.pool.results_json.as_deref().filter(|p| !p.trim().is_empty()) {
        builder = builder.results(ResultsSink::open(path)?);
    }
    Ok(builder.build())
}
