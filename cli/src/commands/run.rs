use codex_worker_core::config::WorkerSettings;
use codex_worker_core::error::CliError;
use codex_worker_core::pool::{PoolSummary, StopFlag, WorkerPool};
use codex_worker_core::state::{
    AgeOnlyProbe, ReportCollector, Task, TaskDiscovery, TaskPattern, TaskState,
};
use codex_worker_plugins::factory::build_pool;

use super::cli::{RunArgs, Target};

/// Runs every target in turn. The exit code is 1 if any of them ended
/// with a Failed task.
pub async fn run(args: RunArgs, mut cfg: WorkerSettings) -> Result<i32, CliError> {
    args.apply(&mut cfg);
    let targets = args.common.targets(&cfg.pool.pattern)?;
    let acknowledged = acknowledge(&args, &cfg, &targets)?;

    let interrupt = StopFlag::new();
    if !args.dry_run {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted: no new claims, waiting for running tasks");
                interrupt.stop();
            }
        });
    }

    let mut code = 0;
    for target in &targets {
        if interrupt.is_stopped() {
            tracing::warn!(dir = %target.dir.display(), "skipped after interrupt");
            continue;
        }
        if targets.len() > 1 {
            println!("== {} ==", target.dir.display());
        }
        let mut cfg = cfg.clone();
        cfg.pool.pattern = target.pattern.clone();
        let pool = build_pool(
            &cfg,
            &target.dir,
            acknowledged,
            args.progress && !args.dry_run,
        )?;

        if args.dry_run {
            let planned = pool.plan_pending()?;
            if planned.is_empty() {
                println!("no pending tasks match '{}'", cfg.pool.pattern);
            }
            for task in &planned {
                println!("{} (attempt {})\n  {}", task.base, task.attempt + 1, task.command);
            }
            continue;
        }

        if args.rerun_completed {
            let n = rerun_completed(&pool, &cfg.pool.pattern)?;
            if n > 0 {
                println!("returned {n} completed tasks to pending");
            }
        }

        let summary = run_until_interrupted(&pool, &interrupt).await?;
        let pattern = TaskPattern::new(&cfg.pool.pattern)?;
        let inventory = TaskDiscovery::scan(pool.store(), Some(&pattern))?;
        println!("{}", render_summary(&summary));
        println!("{}", ReportCollector::collect(&inventory, false));
        if summary.has_failures() {
            code = 1;
        }
    }
    Ok(code)
}

async fn run_until_interrupted(
    pool: &WorkerPool,
    interrupt: &StopFlag,
) -> Result<PoolSummary, CliError> {
    let forward = {
        let interrupt = interrupt.clone();
        let stop = pool.stop_flag();
        tokio::spawn(async move {
            interrupt.stopped().await;
            stop.stop();
        })
    };
    let summary = pool.run().await;
    forward.abort();
    Ok(summary?)
}

/// Done tasks matching `pattern` go back to Pending. Returns how many did.
fn rerun_completed(pool: &WorkerPool, pattern: &str) -> Result<usize, CliError> {
    let pattern = TaskPattern::new(pattern)?;
    let inventory = TaskDiscovery::scan(pool.store(), Some(&pattern))?;
    let done: Vec<Task> = inventory
        .tasks
        .into_iter()
        .filter(|t| t.state == TaskState::Done)
        .collect();
    if done.is_empty() {
        return Ok(0);
    }
    // Only terminal entries here, so no owner is ever consulted.
    let report = pool.store().reset_all(&done, &AgeOnlyProbe)?;
    for (base, why) in &report.skipped {
        tracing::warn!(base = %base, reason = %why, "completed task not returned to pending");
    }
    Ok(report.reset)
}

/// Unrestricted mode needs `--yes` or an interactive yes. A dry run spawns
/// nothing and needs neither.
fn acknowledge(args: &RunArgs, cfg: &WorkerSettings, targets: &[Target]) -> Result<bool, CliError> {
    if args.yes || args.dry_run {
        return Ok(true);
    }
    if !cfg.agent.sandbox.is_unrestricted() {
        return Ok(false);
    }
    let dirs: Vec<String> = targets.iter().map(|t| t.dir.display().to_string()).collect();
    super::confirm(&format!(
        "Agents will run with {} in {}. Continue?",
        cfg.agent.sandbox.as_str(),
        dirs.join(", ")
    ))
}

fn render_summary(s: &PoolSummary) -> String {
    let mut out = format!(
        "launched {} | done {} | failed {} | retried {}",
        s.launched, s.done, s.failed, s.retried
    );
    if s.revoked > 0 {
        out.push_str(&format!(" | revoked {}", s.revoked));
    }
    if s.not_owner > 0 {
        out.push_str(&format!(" | lost ownership {}", s.not_owner));
    }
    if s.errors > 0 {
        out.push_str(&format!(" | errors {}", s.errors));
    }
    if s.interrupted {
        out.push_str(&format!(" | interrupted, {} retries deferred", s.deferred));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cli::{Args, Commands};
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["codex-worker", "run"];
        full.extend_from_slice(argv);
        match Args::try_parse_from(full).unwrap().command {
            Some(Commands::Run(r)) => r,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn restricted_modes_need_no_acknowledgment() {
        let args = run_args(&["--mode", "workspace-write"]);
        let mut cfg = WorkerSettings::default();
        args.apply(&mut cfg);
        assert!(!acknowledge(&args, &cfg, &[]).unwrap());
        cfg.validate(false).unwrap();
    }

    #[test]
    fn yes_acknowledges_unrestricted_mode() {
        let args = run_args(&["--mode", "danger-full-access", "-y"]);
        let mut cfg = WorkerSettings::default();
        args.apply(&mut cfg);
        let ack = acknowledge(&args, &cfg, &[]).unwrap();
        assert!(ack);
        cfg.validate(ack).unwrap();
    }

    #[test]
    fn summary_mentions_only_what_happened() {
        let s = PoolSummary {
            launched: 3,
            done: 2,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(render_summary(&s), "launched 3 | done 2 | failed 1 | retried 0");

        let s = PoolSummary {
            interrupted: true,
            deferred: 2,
            ..Default::default()
        };
        assert!(render_summary(&s).ends_with("interrupted, 2 retries deferred"));
    }

    #[tokio::test]
    async fn dry_run_claims_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "task a").unwrap();
        let dir_arg = dir.path().to_string_lossy().to_string();
        let args = run_args(&[dir_arg.as_str(), "--dry-run"]);

        let code = run(args, WorkerSettings::default()).await.unwrap();
        assert_eq!(code, 0);
        assert!(dir.path().join("a.md").exists());
        assert!(!dir.path().join("in-progress-a.md").exists());
    }

    #[tokio::test]
    async fn dry_run_covers_every_directory() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("a.md"), "task a").unwrap();
        std::fs::write(second.path().join("b.md"), "task b").unwrap();
        let a = first.path().to_string_lossy().to_string();
        let b = second.path().to_string_lossy().to_string();

        let code = run(run_args(&[a.as_str(), b.as_str(), "--dry-run"]), WorkerSettings::default())
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert!(first.path().join("a.md").exists());
        assert!(second.path().join("b.md").exists());
    }

    #[tokio::test]
    async fn rerun_completed_returns_done_tasks_only() {
        use codex_worker_core::state::{ClaimMeta, ClaimOutcome, CommitFailure, OwnerToken, StateStore};

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "task a").unwrap();
        std::fs::write(dir.path().join("b.md"), "task b").unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let me = OwnerToken::current();
        let claim = |base: &str| match store.claim(base, &me, &ClaimMeta::default()).unwrap() {
            ClaimOutcome::Won(c) => c,
            ClaimOutcome::Lost => panic!("expected to win {base}"),
        };
        store.commit_done(&claim("a.md"), b"ok".to_vec()).unwrap();
        let failure = CommitFailure {
            reason: "exit code 1".into(),
            retryable: false,
        };
        store.commit_failed(&claim("b.md"), 1, failure, vec![]).unwrap();

        let pool = build_pool(&WorkerSettings::default(), dir.path(), true, false).unwrap();
        assert_eq!(rerun_completed(&pool, "*").unwrap(), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.md")).unwrap(), "task a");
        assert!(dir.path().join("failed_exec_log-b.md.txt").exists());
    }
}
