//! Per-engine command planners.

mod codex;
mod custom;
mod gemini;
mod resolve;

pub use codex::CodexPlanner;
pub use custom::CustomPlanner;
pub use gemini::GeminiPlanner;
pub use resolve::resolve_executable_path;
