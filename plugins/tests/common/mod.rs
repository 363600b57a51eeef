use std::fs;
use std::path::Path;

use codex_worker_core::config::WorkerSettings;
use codex_worker_core::runner::Engine;
use codex_worker_core::state::{StateStore, TaskDiscovery, TaskState};

/// Settings that run `sh -c <script>` as the agent.
pub fn sh_settings(script: &str, concurrency: usize, retries: u32) -> WorkerSettings {
    let mut cfg = WorkerSettings::default();
    cfg.agent.engine = Engine::Custom;
    cfg.agent.custom_cmd = Some("sh".into());
    cfg.agent.custom_args = vec!["-c".into(), script.into()];
    cfg.pool.concurrency = concurrency;
    cfg.retry.max_retries = retries;
    cfg.retry.base_delay_ms = 10;
    cfg.retry.max_delay_ms = 50;
    cfg
}

pub fn write_tasks(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), format!("instructions for {name}\n")).unwrap();
    }
}

pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

pub fn states(dir: &Path) -> Vec<(String, TaskState, u32)> {
    let store = StateStore::open(dir).unwrap();
    TaskDiscovery::scan(&store, None)
        .unwrap()
        .tasks
        .into_iter()
        .map(|t| (t.base, t.state, t.attempt))
        .collect()
}
