//! The worker pool and what it plugs in: retry strategies, the stop flag,
//! progress display, and the results log.

mod pool;
pub mod progress;
pub mod results;
pub mod retry;
pub mod stop;

pub use pool::{PlannedTask, PoolOptions, PoolSummary, WorkerPool, WorkerPoolBuilder};
pub use progress::ProgressMonitor;
pub use results::{ResultLine, ResultsSink};
pub use retry::{ImmediateRetry, RetryStrategyPlugin};
pub use stop::StopFlag;
