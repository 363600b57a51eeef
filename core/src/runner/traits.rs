use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::types::{RunOutcome, RunnerStartArgs, Signal};

/// One spawned agent process. Each stream can be taken once; `None` after
/// that, or when the stream was not piped.
#[async_trait]
pub trait RunnerSession: Send {
    fn stdin(&mut self) -> Option<Box<dyn AsyncWrite + Unpin + Send>>;
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    /// `Term` asks the agent to stop, `Kill` does not ask.
    async fn signal(&mut self, signal: Signal) -> anyhow::Result<()>;
    async fn wait(&mut self) -> anyhow::Result<RunOutcome>;
}

/// Starts agent processes for the executor.
#[async_trait]
pub trait RunnerPlugin: Send + Sync {
    fn name(&self) -> &str;
    /// An error here means the agent never ran: the task fails with a
    /// spawn failure and is not retried.
    async fn start_session(&self, args: &RunnerStartArgs)
        -> anyhow::Result<Box<dyn RunnerSession>>;
}
