use std::time::Duration;

use codex_worker_core::config::WorkerSettings;
use codex_worker_core::error::CliError;
use codex_worker_core::state::{StateStore, TaskDiscovery, TaskPattern};
use codex_worker_plugins::factory::build_supervisor;

use super::cli::CleanArgs;

pub fn clean(args: CleanArgs, cfg: &WorkerSettings) -> Result<i32, CliError> {
    let targets = args.common.targets(&cfg.pool.pattern)?;
    let supervisor = build_supervisor(Duration::from_secs(args.max_age));

    for target in &targets {
        if targets.len() > 1 {
            println!("== {} ==", target.dir.display());
        }
        let pattern = TaskPattern::new(&target.pattern)?;
        let store = StateStore::open(&target.dir)?;
        let inventory = TaskDiscovery::scan(&store, Some(&pattern))?;

        if args.dry_run {
            let stale = supervisor.stale_claims(&inventory);
            if stale.is_empty() {
                println!("no stale claims");
            }
            for task in stale {
                let owner = task
                    .claim
                    .as_ref()
                    .and_then(|c| c.owner.as_ref())
                    .map(|o| o.owner.short())
                    .unwrap_or_else(|| "unknown owner".to_string());
                println!("would revoke {} ({owner})", task.base);
            }
            continue;
        }

        let report = supervisor.sweep(&store, &inventory)?;
        println!(
            "revoked {} stale claims, removed {} orphan locks and {} leftover logs",
            report.revoked, report.orphan_locks, report.leftovers
        );
    }
    Ok(0)
}
