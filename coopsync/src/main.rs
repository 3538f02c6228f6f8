//! coopsync - CLI entry point
//!
//! Drives the timer and coordinator primitives from the command line.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info};

use coopsync::cli::{Cli, Command, OutputFormat, get_log_path};
use coopsync::config::Config;
use coopsync::coordinator::{CoordinatorManager, Identifier};
use coopsync::timeout::Timeout;
use coopsync::timer::{Tick, Timer};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let timer = Timer::new(CoordinatorManager::global(), config.timer.clone());

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::After {
            delay_ms,
            resume_after_ms,
            identifier,
            format,
        } => cmd_after(&timer, delay_ms, resume_after_ms, identifier, format).await,
        Command::Tick {
            interval_ms,
            rounds,
            identifier,
            format,
        } => cmd_tick(&timer, interval_ms, rounds, identifier, format).await,
        Command::Config => cmd_config(&config),
    }
}

fn resolve_identifier(timer: &Timer, identifier: Option<String>) -> Identifier {
    identifier
        .map(Identifier::from)
        .unwrap_or_else(|| timer.default_identifier().clone())
}

async fn cmd_after(
    timer: &Timer,
    delay_ms: u64,
    resume_after_ms: Option<u64>,
    identifier: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    debug!(delay_ms, ?resume_after_ms, ?identifier, "cmd_after: called");
    let identifier = resolve_identifier(timer, identifier);
    let started = Instant::now();
    let (fired_tx, fired_rx) = oneshot::channel();

    let task = timer.after_on(identifier.clone(), Timeout::from_millis(delay_ms), move |closing| async move {
        let _ = fired_tx.send((closing, started.elapsed()));
        Ok(())
    });
    let task_id = task.id();

    if let Some(ms) = resume_after_ms {
        debug!(ms, "cmd_after: scheduling early resume");
        let manager = timer.manager().clone();
        let id = identifier.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            manager.resume(&id);
        });
    }

    task.join().await.context("Timer task panicked")??;
    let (closing, elapsed) = fired_rx.await.context("Timer task ended without firing")?;

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "task_id": task_id,
                "identifier": identifier,
                "closing": closing,
                "elapsed_ms": elapsed.as_millis() as u64,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            let how = if closing {
                format!("resumed via {}", identifier).yellow()
            } else {
                "timed out".green()
            };
            println!("task {} fired after {}ms ({})", task_id, elapsed.as_millis(), how);
        }
    }
    Ok(())
}

async fn cmd_tick(
    timer: &Timer,
    interval_ms: u64,
    rounds: u64,
    identifier: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    debug!(interval_ms, rounds, ?identifier, "cmd_tick: called");
    let identifier = resolve_identifier(timer, identifier);
    let rounds = rounds.max(1);
    let calls = Arc::new(AtomicU64::new(0));

    let task = {
        let calls = calls.clone();
        let observer = timer.clone();
        timer.tick_on(identifier.clone(), Duration::from_millis(interval_ms), move |closing| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let stats = observer.stats();
            match format {
                OutputFormat::Json => {
                    let line = serde_json::json!({"call": n, "closing": closing, "stats": stats});
                    println!("{}", line);
                }
                OutputFormat::Text => {
                    println!("call {:>3}  closing={:<5}  num={} round={}", n, closing, stats.num, stats.round);
                }
            }
            async move { Ok(if n >= rounds { Tick::Stop } else { Tick::Continue }) }
        })
    };

    // Ctrl-C resumes the identifier, which ends the loop on its next wake
    let ctrl_c = {
        let manager = timer.manager().clone();
        let id = identifier.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(identifier = %id, "Interrupted, resuming identifier");
                manager.resume(&id);
            }
        })
    };

    let completed = task.join().await.context("Tick task panicked")?;
    ctrl_c.abort();

    let summary = format!(
        "{} calls, {} completed rounds, final stats {:?}",
        calls.load(Ordering::SeqCst),
        completed,
        timer.stats()
    );
    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "calls": calls.load(Ordering::SeqCst),
                "completed_rounds": completed,
                "stats": timer.stats(),
            });
            println!("{}", out);
        }
        OutputFormat::Text => println!("{}", summary.bold()),
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
