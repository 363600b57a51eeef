pub mod backend;
pub mod factory;
pub mod liveness;
pub mod runner;
pub mod strategies;
