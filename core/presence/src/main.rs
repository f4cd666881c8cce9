//! `flrp-presence`: mirrors the host's shared state document into Discord
//! Rich Presence until interrupted.

use clap::Parser;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use flrp_presence::config::{self, ConfigOverrides, DEFAULT_ENV_FILE};
use flrp_presence::{ConfigError, Consumer, DiscordIpc, PresenceSink, ProcessLiveness};

mod logging;

#[derive(Parser)]
#[command(name = "flrp-presence")]
#[command(about = "Shows FL Studio activity as Discord Rich Presence")]
#[command(version)]
struct Cli {
    /// Shared state document written by the in-host producer
    #[arg(long, value_name = "PATH")]
    state_file: Option<PathBuf>,

    /// Discord application id
    #[arg(long, value_name = "ID")]
    app_id: Option<String>,

    /// Dotenv file to load instead of searching for `.env`
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Poll interval while the host is running
    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,

    /// Case-insensitive substring of the host's process name
    #[arg(long, value_name = "NAME")]
    host_process: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            application_id: self.app_id.clone(),
            state_file: self.state_file.clone(),
            poll_interval_ms: self.poll_interval_ms,
            host_process_name: self.host_process.clone(),
            debug: self.debug,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let env_file = match &cli.env_file {
        Some(path) => Some(path.clone()),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| config::find_env_file(&cwd, DEFAULT_ENV_FILE)),
    };
    let resolved = load_env_file(env_file.as_deref()).and_then(|vars| {
        config::resolve(&cli.overrides(), |key| std::env::var(key).ok(), &vars)
    });

    let debug = resolved.as_ref().map(|c| c.debug).unwrap_or(cli.debug);
    let guard = logging::init(debug, cli.log_file.as_deref());

    let config = match resolved {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Invalid configuration");
            exit_with_failure(guard);
        }
    };

    if let Some(path) = &env_file {
        info!(path = %path.display(), "Loaded env file");
    }
    if config.uses_placeholder_app_id() {
        warn!(
            application_id = %config.application_id,
            "Using the placeholder Discord application id; set DISCORD_APPLICATION_ID"
        );
    }
    info!(
        application_id = %config.application_id,
        state_file = %config.state_file.display(),
        host_process = %config.host_process_name,
        poll_interval_ms = config.tracking_interval.as_millis() as u64,
        "FLRP presence consumer starting"
    );

    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = Arc::clone(&cancelled);
        if let Err(err) = ctrlc::set_handler(move || {
            cancelled.store(true, Ordering::SeqCst);
        }) {
            warn!(error = %err, "Failed to install Ctrl+C handler");
        }
    }

    let mut sink = DiscordIpc::new(&config.application_id);
    if let Err(err) = sink.connect() {
        error!(error = %err, "Failed to connect to Discord; is it running?");
        exit_with_failure(guard);
    }

    let liveness = ProcessLiveness::new(&config.host_process_name, &config.state_file);
    let mut consumer = Consumer::new(sink, liveness, &config);
    consumer.run(&cancelled);

    drop(guard);
}

fn load_env_file(path: Option<&Path>) -> Result<BTreeMap<String, String>, ConfigError> {
    match path {
        Some(path) => config::read_env_file(path),
        None => Ok(BTreeMap::new()),
    }
}

fn exit_with_failure(guard: Option<WorkerGuard>) -> ! {
    drop(guard);
    std::process::exit(1);
}
