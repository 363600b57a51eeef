use codex_worker_core::config::WorkerSettings;
use codex_worker_core::error::CliError;
use codex_worker_core::state::{ReportCollector, StateStore, TaskDiscovery, TaskPattern};

use super::cli::StatusArgs;

pub fn status(args: StatusArgs, cfg: &WorkerSettings) -> Result<i32, CliError> {
    let targets = args.common.targets(&cfg.pool.pattern)?;
    let mut reports = Vec::with_capacity(targets.len());
    for target in &targets {
        let pattern = TaskPattern::new(&target.pattern)?;
        let store = StateStore::open(&target.dir)?;
        let inventory = TaskDiscovery::scan(&store, Some(&pattern))?;
        reports.push((target, ReportCollector::collect(&inventory, args.detailed)));
    }

    if args.json {
        let value = match reports.as_slice() {
            [(_, report)] => serde_json::to_value(report),
            _ => serde_json::to_value(
                reports
                    .iter()
                    .map(|(t, r)| serde_json::json!({ "dir": t.dir.display().to_string(), "report": r }))
                    .collect::<Vec<_>>(),
            ),
        };
        let text = value
            .and_then(|v| serde_json::to_string_pretty(&v))
            .map_err(|e| CliError::Command(format!("cannot encode status: {e}")))?;
        println!("{text}");
        return Ok(0);
    }
    for (target, report) in &reports {
        if reports.len() > 1 {
            println!("== {} ==", target.dir.display());
        }
        println!("{report}");
    }
    Ok(0)
}
