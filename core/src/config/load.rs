use std::path::{Path, PathBuf};

use crate::error::WorkerError;
use crate::runner::{Engine, SandboxMode};
use crate::state::{NameCodec, TaskPattern};

use super::types::{WorkerSettings, MAX_CONCURRENCY, MAX_RETRIES};

/// `~/.codex-worker`
pub fn get_data_dir() -> Result<PathBuf, WorkerError> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| WorkerError::Config("cannot determine home directory".to_string()))?;
    Ok(PathBuf::from(home).join(".codex-worker"))
}

/// Loads `explicit` if given, else `~/.codex-worker/config.toml`, else
/// `./codex-worker.toml`, else defaults, then applies environment overrides.
pub fn load_with(explicit: Option<&Path>) -> Result<WorkerSettings, WorkerError> {
    let data_dir = get_data_dir()?;
    let user_config = data_dir.join("config.toml");
    let local_config = Path::new("codex-worker.toml");

    let mut cfg = if let Some(path) = explicit {
        load_file(path)?
    } else if user_config.exists() {
        load_file(&user_config)?
    } else if local_config.exists() {
        load_file(local_config)?
    } else {
        WorkerSettings::default()
    };

    if cfg
        .logging
        .directory
        .as_ref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg, |k| std::env::var(k).ok());
    Ok(cfg)
}

pub fn load_file(path: &Path) -> Result<WorkerSettings, WorkerError> {
    let s = std::fs::read_to_string(path).map_err(|e| WorkerError::io(path, e))?;
    toml::from_str::<WorkerSettings>(&s)
        .map_err(|e| WorkerError::Settings(format!("{}: {e}", path.display())))
}

/// `CODEX_CMD` and `GEMINI_CMD` point at the agent binaries.
pub fn apply_env_overrides(cfg: &mut WorkerSettings, get: impl Fn(&str) -> Option<String>) {
    if let Some(v) = get("CODEX_CMD").filter(|v| !v.trim().is_empty()) {
        cfg.agent.codex_cmd = v;
    }
    if let Some(v) = get("GEMINI_CMD").filter(|v| !v.trim().is_empty()) {
        cfg.agent.gemini_cmd = v;
    }
}

impl WorkerSettings {
    /// Checks everything that must hold before any task is touched.
    /// `acknowledged` is the caller's confirmation for unrestricted mode.
    pub fn validate(&self, acknowledged: bool) -> Result<(), WorkerError> {
        NameCodec::validate().map_err(WorkerError::Config)?;

        let pool = &self.pool;
        if !(1..=MAX_CONCURRENCY).contains(&pool.concurrency) {
            return Err(WorkerError::Config(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                pool.concurrency
            )));
        }
        if self.retry.max_retries > MAX_RETRIES {
            return Err(WorkerError::Config(format!(
                "retries must be between 0 and {MAX_RETRIES}, got {}",
                self.retry.max_retries
            )));
        }
        if pool.capture_bytes == 0 {
            return Err(WorkerError::Config("capture_bytes must be positive".into()));
        }
        if let Some(t) = self.agent.timeout_secs {
            if t == 0 {
                return Err(WorkerError::Config("timeout must be at least 1 second".into()));
            }
            if pool.stale_after_secs <= t + self.agent.kill_grace_secs {
                return Err(WorkerError::Config(format!(
                    "stale-after ({}s) must exceed the task timeout plus kill grace ({}s)",
                    pool.stale_after_secs,
                    t + self.agent.kill_grace_secs
                )));
            }
        }
        if !["exponential-backoff", "linear"].contains(&self.retry.strategy.as_str()) {
            return Err(WorkerError::Config(format!(
                "unknown retry strategy '{}'",
                self.retry.strategy
            )));
        }
        if self.agent.engine == Engine::Custom
            && self
                .agent
                .custom_cmd
                .as_deref()
                .map(|c| c.trim().is_empty())
                .unwrap_or(true)
        {
            return Err(WorkerError::Config(
                "the custom engine needs agent.custom_cmd (or --agent-cmd)".into(),
            ));
        }
        TaskPattern::new(&pool.pattern)?;
        if self.agent.sandbox == SandboxMode::DangerFullAccess {
            crate::runner::ModeGate::new(self.agent.sandbox, acknowledged)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_validate() {
        let cfg = WorkerSettings::default();
        cfg.validate(false).unwrap();
        assert_eq!(cfg.agent.model(), "o4-mini");
        assert_eq!(cfg.pool.pattern, "*.md");
        assert_eq!(cfg.agent.sandbox, SandboxMode::ReadOnly);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = WorkerSettings::default();
        cfg.pool.concurrency = 0;
        assert!(cfg.validate(false).is_err());
        cfg.pool.concurrency = 33;
        assert!(cfg.validate(false).is_err());
        cfg.pool.concurrency = 32;
        cfg.retry.max_retries = 11;
        assert!(cfg.validate(false).is_err());
        cfg.retry.max_retries = 10;
        cfg.validate(false).unwrap();

        cfg.agent.timeout_secs = Some(3600);
        assert!(cfg.validate(false).is_err(), "stale-after must exceed timeout");
        cfg.pool.stale_after_secs = 7200;
        cfg.validate(false).unwrap();

        cfg.pool.pattern = "[".into();
        assert!(matches!(cfg.validate(false), Err(WorkerError::Pattern(_))));
    }

    #[test]
    fn unrestricted_mode_requires_ack() {
        let mut cfg = WorkerSettings::default();
        cfg.agent.sandbox = SandboxMode::DangerFullAccess;
        assert!(matches!(cfg.validate(false), Err(WorkerError::Config(_))));
        cfg.validate(true).unwrap();
    }

    #[test]
    fn parses_partial_toml_and_env() {
        let mut cfg: WorkerSettings = toml::from_str(
            r#"
            [agent]
            engine = "gemini"
            sandbox = "workspace-write"
            timeout_secs = 300

            [pool]
            concurrency = 4

            [retry]
            max_retries = 2
            strategy = "linear"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.engine, Engine::Gemini);
        assert_eq!(cfg.agent.model(), "gemini-2.5-pro");
        assert_eq!(cfg.pool.stale_after_secs, 3600);
        assert_eq!(cfg.retry.base_delay_ms, 5_000);
        cfg.validate(false).unwrap();

        let env: HashMap<&str, &str> = [("GEMINI_CMD", "/opt/bin/gemini"), ("CODEX_CMD", " ")]
            .into_iter()
            .collect();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.agent.gemini_cmd, "/opt/bin/gemini");
        assert_eq!(cfg.agent.codex_cmd, "codex");
    }

    #[test]
    fn custom_engine_needs_a_command() {
        let mut cfg = WorkerSettings::default();
        cfg.agent.engine = Engine::Custom;
        assert!(cfg.validate(false).is_err());
        cfg.agent.custom_cmd = Some("./agent.sh".into());
        cfg.validate(false).unwrap();
    }

    #[test]
    fn bad_file_is_a_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codex-worker.toml");
        std::fs::write(&path, "[pool]\nconcurrency = \"many\"\n").unwrap();
        assert!(matches!(load_file(&path), Err(WorkerError::Settings(_))));
    }
}
