use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use codex_worker_core::runner::{RunOutcome, RunnerPlugin, RunnerSession, RunnerStartArgs, Signal};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

/// Spawns agent CLIs as child processes with piped stdio.
pub struct CodeCliRunnerPlugin {}

impl CodeCliRunnerPlugin {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for CodeCliRunnerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunnerPlugin for CodeCliRunnerPlugin {
    fn name(&self) -> &str {
        "codecli"
    }

    async fn start_session(&self, args: &RunnerStartArgs) -> Result<Box<dyn RunnerSession>> {
        let mut cmd = Command::new(&args.cmd);
        cmd.args(&args.args)
            .envs(&args.envs)
            .stdin(if args.pipe_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &args.cwd {
            cmd.current_dir(dir);
        }
        let child = cmd
            .spawn()
            .with_context(|| format!("cannot start '{}'", args.cmd))?;
        tracing::debug!(pid = child.id(), cmd = %args.cmd, "agent started");

        Ok(Box::new(CodeCliRunnerSession { child }))
    }
}

struct CodeCliRunnerSession {
    child: Child,
}

impl CodeCliRunnerSession {
    /// Sends SIGTERM (or the platform's closest equivalent). False if the
    /// process could not be signalled that way.
    fn terminate(&self) -> bool {
        let Some(pid) = self.child.id() else {
            return true;
        };
        let pid = sysinfo::Pid::from_u32(pid);
        let mut sys = sysinfo::System::new();
        if !sys.refresh_process(pid) {
            return true;
        }
        sys.process(pid)
            .and_then(|p| p.kill_with(sysinfo::Signal::Term))
            .unwrap_or(false)
    }
}

#[async_trait]
impl RunnerSession for CodeCliRunnerSession {
    fn stdin(&mut self) -> Option<Box<dyn AsyncWrite + Unpin + Send>> {
        self.child
            .stdin
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncWrite + Unpin + Send>)
    }

    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    async fn signal(&mut self, signal: Signal) -> Result<()> {
        match signal {
            Signal::Term if self.terminate() => Ok(()),
            // No cooperative signal on this platform; fall through to kill.
            Signal::Term | Signal::Kill => {
                self.child.start_kill().context("cannot kill agent")?;
                Ok(())
            }
        }
    }

    async fn wait(&mut self) -> Result<RunOutcome> {
        let status = self.child.wait().await?;
        Ok(RunOutcome {
            exit_code: status.code().unwrap_or(-1),
        })
    }
}
