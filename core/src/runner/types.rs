use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunOutcome {
    /// -1 when the process was ended by a signal.
    pub exit_code: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Signal {
    Kill,
    Term,
}

/// What the runner spawns.
#[derive(Debug, Clone, Default)]
pub struct RunnerStartArgs {
    pub cmd: String,
    pub args: Vec<String>,
    pub envs: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Whether the task text is piped on stdin. Otherwise stdin is closed.
    pub pipe_stdin: bool,
}

impl RunnerStartArgs {
    /// Shell-like rendering for dry runs and logs.
    pub fn display(&self) -> String {
        std::iter::once(self.cmd.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@+,{}".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Why an attempt failed. Recorded in the Failed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Timeout(Duration),
    NonZeroExit(i32),
    /// Binary missing or not executable, or no command could be built.
    SpawnFailure(String),
    Io(String),
}

impl FailureReason {
    /// Failures that another try cannot fix are not retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureReason::SpawnFailure(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::Timeout(_) => "timeout",
            FailureReason::NonZeroExit(_) => "non_zero_exit",
            FailureReason::SpawnFailure(_) => "spawn_failure",
            FailureReason::Io(_) => "io",
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            FailureReason::NonZeroExit(code) => Some(*code),
            FailureReason::Timeout(_) => Some(124),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Timeout(d) => write!(f, "timeout after {}s", d.as_secs()),
            FailureReason::NonZeroExit(code) => write!(f, "exit code {code}"),
            FailureReason::SpawnFailure(msg) => write!(f, "spawn failure: {msg}"),
            FailureReason::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_only_when_needed() {
        let args = RunnerStartArgs {
            cmd: "codex".into(),
            args: vec!["--model".into(), "o4-mini".into(), "fix it's bug".into()],
            ..Default::default()
        };
        assert_eq!(args.display(), "codex --model o4-mini 'fix it'\\''s bug'");
    }

    #[test]
    fn spawn_failures_are_final() {
        assert!(!FailureReason::SpawnFailure("nope".into()).is_retryable());
        assert!(FailureReason::NonZeroExit(1).is_retryable());
        assert_eq!(FailureReason::Timeout(Duration::from_secs(3)).exit_code(), Some(124));
    }
}
