use codex_worker_core::config::WorkerSettings;
use codex_worker_core::error::CliError;
use codex_worker_core::state::{StateStore, TaskDiscovery, TaskPattern, TaskState};
use codex_worker_plugins::factory::build_probe;

use super::cli::ResetArgs;

pub fn reset(args: ResetArgs, cfg: &WorkerSettings) -> Result<i32, CliError> {
    let targets = args.common.targets(&cfg.pool.pattern)?;
    let probe = build_probe();

    for target in &targets {
        let pattern = TaskPattern::new(&target.pattern)?;
        let store = StateStore::open(&target.dir)?;
        let inventory = TaskDiscovery::scan(&store, Some(&pattern))?;

        let affected = inventory.tasks.len() - inventory.count(TaskState::Pending);
        if affected == 0 {
            println!("nothing to reset in {}", target.dir.display());
            continue;
        }
        if !args.force {
            let question = format!(
                "Return {affected} tasks in {} to pending?",
                target.dir.display()
            );
            if !super::confirm(&question)? {
                println!("reset cancelled (use --force to skip the prompt)");
                continue;
            }
        }

        let report = store.reset_all(&inventory.tasks, probe.as_ref())?;
        println!("reset {} tasks in {}", report.reset, target.dir.display());
        for (base, why) in &report.skipped {
            println!("  skipped {base}: {why}");
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cli::{Args, Commands};
    use clap::Parser;

    #[test]
    fn forced_reset_returns_abandoned_claim() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.md"), "do a").unwrap();
        std::fs::write(dir.path().join("in-progress-b.md"), "do b").unwrap();
        let inventory = TaskDiscovery::scan(&store, None).unwrap();
        assert_eq!(inventory.count(TaskState::Claimed), 1);

        let dir_arg = dir.path().to_string_lossy().to_string();
        let args = match Args::try_parse_from(["codex-worker", "reset", &dir_arg, "-f"])
            .unwrap()
            .command
        {
            Some(Commands::Reset(r)) => r,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(reset(args, &WorkerSettings::default()).unwrap(), 0);

        assert_eq!(std::fs::read_to_string(dir.path().join("b.md")).unwrap(), "do b");
        assert!(!dir.path().join("in-progress-b.md").exists());
        assert!(dir.path().join("a.md").exists());
    }
}
