//! codex-worker library: the command surface, exposed for tests.

pub mod commands;
