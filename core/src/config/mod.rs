mod load;
mod types;

pub use load::{apply_env_overrides, get_data_dir, load_file, load_with};
pub use types::{
    AgentConfig, LoggingConfig, PoolConfig, RetryConfig, WorkerSettings, MAX_CONCURRENCY,
    MAX_RETRIES,
};
