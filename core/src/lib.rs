pub mod config;
pub mod error;
pub mod pool;
pub mod runner;
pub mod state;
pub mod util;
