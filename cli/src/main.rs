use clap::Parser;
use codex_worker::commands::{clean, cli, reset, run, status};
use codex_worker_core::config::{self, LoggingConfig, WorkerSettings};
use codex_worker_core::error::{CliError, WorkerError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let mut args = cli::Args::parse();
    let cmd = args.command.take().unwrap_or(cli::Commands::Run(args.run));

    let settings_file = match &cmd {
        cli::Commands::Run(a) => a.common.config.clone(),
        cli::Commands::Status(a) => a.common.config.clone(),
        cli::Commands::Clean(a) => a.common.config.clone(),
        cli::Commands::Reset(a) => a.common.config.clone(),
    };
    let cfg = config::load_with(settings_file.as_deref())?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    dispatch(cmd, cfg).await
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 1: a task ended Failed (returned as a normal exit code, not as an error)
    // 11: config error
    // 20: IO error
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Worker(we) => match we {
            WorkerError::Config(_) => 11,
            WorkerError::Settings(_) => 11,
            WorkerError::Pattern(_) => 11,
            WorkerError::Io { .. } => 20,
            WorkerError::Record(_) => 50,
            WorkerError::Transition(_) => 50,
        },
        CliError::Io(_) => 20,
        CliError::Command(_) => 50,
        CliError::Anyhow(_) => 50,
    }
}

async fn dispatch(cmd: cli::Commands, cfg: WorkerSettings) -> Result<i32, CliError> {
    match cmd {
        cli::Commands::Run(run_args) => run::run(run_args, cfg).await,
        cli::Commands::Status(status_args) => status::status(status_args, &cfg),
        cli::Commands::Clean(clean_args) => clean::clean(clean_args, &cfg),
        cli::Commands::Reset(reset_args) => reset::reset(reset_args, &cfg),
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("codex-worker"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("codex-worker.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
