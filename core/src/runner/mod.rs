//! Agent process execution: the runner seam, per-engine planning, and the
//! executor that turns one claimed task into a classified outcome.

pub mod executor;
mod io_pump;
pub mod mode;
pub mod planner;
mod traits;
pub mod types;

pub use executor::{ExecOptions, ExecOutcome, ExecResult, ExecTask, Executor};
pub use mode::{ApprovalPolicy, Engine, ModeGate, SandboxMode};
pub use planner::{AgentPlanner, AgentRequest};
pub use traits::{RunnerPlugin, RunnerSession};
pub use types::{FailureReason, RunOutcome, RunnerStartArgs, Signal};
