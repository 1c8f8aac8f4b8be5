use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use heartwatch::HeartwatchError;
use heartwatch::activity::{ActivityTracker, SignalBus};
use heartwatch::autosave::{Autosaver, ShellDocumentStore};
use heartwatch::config::Config;
use heartwatch::heartbeat::{HeartbeatClient, HttpHeartbeatClient};
use heartwatch::keepalive::{KeepAlive, LoopState};
use heartwatch::readiness::ReadyLatch;
use heartwatch::retry::RetryPolicy;
use heartwatch::token::{TokenProvider, provider_from_config};

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("heartwatch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("heartwatch.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, mut config: Config) -> Result<ExitCode> {
    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match cli.command.clone().unwrap_or_default() {
        Commands::Run {
            token,
            idle_threshold_ms,
        } => {
            if token.is_some() {
                config.token.value = token;
            }
            if let Some(ms) = idle_threshold_ms {
                config.keepalive.idle_threshold_ms = ms;
            }
            handle_run_command(&config, cli.is_verbose()).await
        }
        Commands::Config { json } => handle_config_command(&config, json),
        Commands::Beat { token } => {
            if token.is_some() {
                config.token.value = token;
            }
            handle_beat_command(&config).await
        }
    }
}

async fn handle_run_command(config: &Config, verbose: bool) -> Result<ExitCode> {
    config.validate().context("Invalid configuration")?;

    let bus = SignalBus::new();
    let tracker = ActivityTracker::from_config(
        Arc::new(bus.clone()),
        &config.activity,
        config.keepalive.idle_threshold(),
    )
    .context("Failed to create activity tracker")?;
    let tokens: Arc<dyn TokenProvider> =
        Arc::from(provider_from_config(&config.token).context("Failed to create token provider")?);
    let heartbeat = Arc::new(HttpHeartbeatClient::new(&config.heartbeat).context("Failed to create heartbeat client")?);

    let ready = ReadyLatch::new();
    let keepalive = Arc::new(
        KeepAlive::new(&config.keepalive, Arc::new(tracker), tokens, heartbeat)
            .context("Failed to create keep-alive")?
            .with_readiness(Arc::new(ready.clone())),
    );

    let autosaver = ShellDocumentStore::from_config(&config.document).map(|store| {
        info!("Autosave enabled every {:?}", config.keepalive.save_period());
        Autosaver::spawn(Arc::new(store), config.keepalive.save_period(), Arc::new(ready.clone()))
    });

    let handle = keepalive.start();
    feed_signals(bus)?;
    let reporter = verbose.then(|| tokio::spawn(report_states(keepalive.subscribe())));
    let interrupt = {
        let keepalive = Arc::clone(&keepalive);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping");
                keepalive.stop();
            }
        })
    };

    // Stdin is wired up, nothing left to wait on
    ready.fire();

    let terminal = handle.await.context("Keep-alive task failed")?;

    interrupt.abort();
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    if let Some(autosaver) = autosaver {
        autosaver.stop();
    }

    info!(
        "Keep-alive finished: {} after {} ticks and {} heartbeats",
        terminal,
        keepalive.ticks(),
        keepalive.heartbeats_sent()
    );
    match &terminal {
        LoopState::StoppedFailed { reason } => {
            eprintln!("{} {}", "Keep-alive failed:".red(), reason);
            Ok(ExitCode::FAILURE)
        }
        _ => {
            println!(
                "{} {} heartbeats sent",
                "Keep-alive stopped.".green(),
                keepalive.heartbeats_sent()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Emit one activity signal per non-empty stdin line.
///
/// Reads on a detached thread; a pending read must not hold up runtime shutdown.
fn feed_signals(bus: SignalBus) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin-signals".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        let signal = line.trim();
                        if signal.is_empty() {
                            continue;
                        }
                        let delivered = bus.emit(signal);
                        debug!("Signal '{}' delivered to {} listeners", signal, delivered);
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        return;
                    }
                }
            }
            info!("Stdin closed, no further activity");
        })
        .context("Failed to spawn stdin reader")?;
    Ok(())
}

async fn report_states(mut states: tokio::sync::watch::Receiver<LoopState>) {
    while states.changed().await.is_ok() {
        let state = states.borrow_and_update().clone();
        let line = match &state {
            LoopState::Running => state.to_string().green(),
            LoopState::StoppedFailed { .. } => state.to_string().red(),
            _ => state.to_string().cyan(),
        };
        println!("{} {}", "State:".bold(), line);
    }
}

fn handle_config_command(config: &Config, json: bool) -> Result<ExitCode> {
    let rendered = if json {
        serde_json::to_string_pretty(config).context("Failed to render config as JSON")?
    } else {
        serde_yaml::to_string(config).context("Failed to render config as YAML")?
    };
    println!("{}", rendered.trim_end());
    Ok(ExitCode::SUCCESS)
}

async fn handle_beat_command(config: &Config) -> Result<ExitCode> {
    config.validate().context("Invalid configuration")?;

    let tokens = provider_from_config(&config.token).context("Failed to create token provider")?;
    let token = tokens.acquire_token().await.context("Failed to acquire token")?;
    let client = HttpHeartbeatClient::new(&config.heartbeat).context("Failed to create heartbeat client")?;
    let retry = RetryPolicy::new(config.keepalive.retry_attempts, config.keepalive.retry_delay())
        .context("Invalid retry policy")?;

    match retry.run(|| client.beat(&token)).await {
        Ok(()) => {
            println!("{} {}", "Heartbeat accepted:".green(), client.url());
            Ok(ExitCode::SUCCESS)
        }
        Err(exhausted) => {
            let err = HeartwatchError::from(exhausted);
            eprintln!("{} {}", "Heartbeat failed:".red(), err);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, config).await.context("Application failed")
}
