#![cfg(unix)]

mod common;

use std::fs;
use std::time::{Duration, SystemTime};

use codex_worker_core::pool::ResultLine;
use codex_worker_core::state::{ReportCollector, StateStore, TaskDiscovery, TaskState};
use codex_worker_plugins::factory::{build_pool, build_supervisor};
use pretty_assertions::assert_eq;

use common::{entries, sh_settings, states, write_tasks};

const FAIL_BAD: &str = r#"cat >/dev/null; case "$CODEX_WORKER_TASK" in *bad.md) echo boom >&2; exit 1;; esac; echo ok"#;

#[tokio::test]
async fn three_tasks_two_slots_all_done() {
    let dir = tempfile::tempdir().unwrap();
    write_tasks(dir.path(), &["a.md", "b.md", "c.md"]);

    let cfg = sh_settings("cat >/dev/null; echo finished", 2, 0);
    let pool = build_pool(&cfg, dir.path(), false, false).unwrap();
    let summary = pool.run().await.unwrap();

    assert_eq!(summary.done, 3);
    assert!(!summary.has_failures());
    assert_eq!(
        entries(dir.path()),
        vec![
            "done_exec_log-a.md.txt",
            "done_exec_log-b.md.txt",
            "done_exec_log-c.md.txt",
        ]
    );
    let log = fs::read_to_string(dir.path().join("done_exec_log-b.md.txt")).unwrap();
    assert!(log.contains("finished"));
    assert!(log.ends_with("instructions for b.md\n"));
}

#[tokio::test]
async fn always_failing_task_stops_after_retry_bound() {
    let dir = tempfile::tempdir().unwrap();
    write_tasks(dir.path(), &["a.md", "bad.md", "c.md"]);

    let cfg = sh_settings(FAIL_BAD, 2, 2);
    let summary = build_pool(&cfg, dir.path(), false, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.done, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retried, 2);
    assert_eq!(
        states(dir.path()),
        vec![
            ("a.md".to_string(), TaskState::Done, 1),
            ("bad.md".to_string(), TaskState::Failed, 3),
            ("c.md".to_string(), TaskState::Done, 1),
        ]
    );
    let log = fs::read_to_string(dir.path().join("failed_exec_log-bad.md.txt")).unwrap();
    assert!(log.contains("# attempt: 3"));
    assert!(log.contains("boom"));
}

#[tokio::test]
async fn clean_returns_stale_claim_to_pending() {
    let dir = tempfile::tempdir().unwrap();
    write_tasks(dir.path(), &["in-progress-x.md"]);
    let old = SystemTime::now() - Duration::from_secs(120);
    fs::File::options()
        .write(true)
        .open(dir.path().join("in-progress-x.md"))
        .unwrap()
        .set_modified(old)
        .unwrap();

    let store = StateStore::open(dir.path()).unwrap();
    let inventory = TaskDiscovery::scan(&store, None).unwrap();
    let report = build_supervisor(Duration::from_secs(1))
        .sweep(&store, &inventory)
        .unwrap();

    assert_eq!(report.revoked, 1);
    assert_eq!(entries(dir.path()), vec!["x.md"]);
    assert_eq!(
        fs::read_to_string(dir.path().join("x.md")).unwrap(),
        "instructions for in-progress-x.md\n"
    );
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_tasks(dir.path(), &["a.md", "bad.md"]);
    let cfg = sh_settings(FAIL_BAD, 1, 1);

    build_pool(&cfg, dir.path(), false, false)
        .unwrap()
        .run()
        .await
        .unwrap();
    let store = StateStore::open(dir.path()).unwrap();
    let first = ReportCollector::counts(&TaskDiscovery::scan(&store, None).unwrap());
    let first_entries = entries(dir.path());

    let summary = build_pool(&cfg, dir.path(), false, false)
        .unwrap()
        .run()
        .await
        .unwrap();
    let second = ReportCollector::counts(&TaskDiscovery::scan(&store, None).unwrap());

    assert_eq!(summary.launched, 0);
    assert_eq!(first, second);
    assert_eq!(first_entries, entries(dir.path()));
}

#[tokio::test]
async fn concurrent_pools_run_each_task_once() {
    let dir = tempfile::tempdir().unwrap();
    let journal_dir = tempfile::tempdir().unwrap();
    let journal = journal_dir.path().join("runs.log");
    let names: Vec<String> = (0..12).map(|i| format!("t{i:02}.md")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    write_tasks(dir.path(), &refs);

    let script = format!(
        r#"cat >/dev/null; basename "$CODEX_WORKER_TASK" >> '{}'"#,
        journal.display()
    );
    let cfg = sh_settings(&script, 3, 0);
    let first = build_pool(&cfg, dir.path(), false, false).unwrap();
    let second = build_pool(&cfg, dir.path(), false, false).unwrap();
    let (a, b) = tokio::join!(first.run(), second.run());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.done + b.done, 12);
    let mut runs: Vec<String> = fs::read_to_string(&journal)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    runs.sort();
    let expected: Vec<String> = names.iter().map(|n| format!("in-progress-{n}")).collect();
    assert_eq!(runs, expected);
}

#[tokio::test]
async fn timeout_kills_agent_and_records_failure() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let results = out.path().join("results.jsonl");
    write_tasks(dir.path(), &["slow.md"]);

    let mut cfg = sh_settings("sleep 30", 1, 0);
    cfg.agent.timeout_secs = Some(1);
    cfg.agent.kill_grace_secs = 1;
    cfg.pool.results_json = Some(results.display().to_string());

    let summary = build_pool(&cfg, dir.path(), false, false)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);

    let text = fs::read_to_string(&results).unwrap();
    let line: ResultLine = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(line.base, "slow.md");
    assert_eq!(line.status, TaskState::Failed);
    assert_eq!(line.exit_code, Some(124));
    assert_eq!(line.engine, "custom");
    assert!(line.reason.unwrap().starts_with("timeout"));
}

#[tokio::test]
async fn missing_agent_binary_fails_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    write_tasks(dir.path(), &["a.md"]);
    let mut cfg = sh_settings("", 1, 3);
    cfg.agent.custom_cmd = Some("/nonexistent/agent".into());

    let summary = build_pool(&cfg, dir.path(), false, false)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retried, 0);
    assert_eq!(
        states(dir.path()),
        vec![("a.md".to_string(), TaskState::Failed, 1)]
    );
}
