//! `ksr` command line: record, replay and inspect key sequences.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use key_sequence_recorder::config::parse_duration;
use key_sequence_recorder::event::{summarize, trim_dangling_presses};
use key_sequence_recorder::{
    keymap, storage, Config, Controller, ControllerOptions, InputBackend, KeyEvent, KsrError,
    NativeBackend, Notification, SimulatedBackend, StopHotkey,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ksr", version)]
#[command(about = "Record keyboard sequences with timing and replay them into the focused window")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record key presses until the stop hotkey or Ctrl+C
    Record {
        /// Sequence file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Stop automatically after this long (e.g. "30s")
        #[arg(short, long, value_parser = duration_arg)]
        duration: Option<Duration>,
    },

    /// Replay a recorded sequence into the focused window
    Play {
        /// Sequence file
        file: PathBuf,

        /// Number of repetitions (overrides the config)
        #[arg(short, long)]
        repeat: Option<u32>,

        /// Walk through the sequence without sending any keys
        #[arg(long)]
        dry_run: bool,
    },

    /// Print a recorded sequence
    Show {
        /// Sequence file
        file: PathBuf,
    },

    /// List the key names understood on this platform
    Keys {
        /// List the names of every platform
        #[arg(long)]
        all: bool,
    },

    /// Check keyboard capture and injection permissions
    Check,
}

fn duration_arg(value: &str) -> std::result::Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if cli.verbose {
        config.verbose = true;
    }
    init_logging(config.verbose);
    config.validate()?;

    match cli.command {
        Commands::Record { output, duration } => record(&config, &output, duration).await,
        Commands::Play {
            file,
            repeat,
            dry_run,
        } => play(&config, &file, repeat, dry_run).await,
        Commands::Show { file } => show(&file),
        Commands::Keys { all } => {
            keys(all);
            Ok(())
        }
        Commands::Check => check(),
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Register the stop hotkey, carrying on without it when the desktop refuses.
fn register_hotkey(config: &Config) -> Option<StopHotkey> {
    match StopHotkey::register(&config.stop_hotkey) {
        Ok(hotkey) => Some(hotkey),
        Err(e) => {
            warn!("{}", e);
            eprintln!(
                "{} stop hotkey unavailable, use Ctrl+C instead",
                "warning:".yellow().bold()
            );
            None
        }
    }
}

async fn next_press(presses: &mut Option<UnboundedReceiver<()>>) {
    match presses {
        Some(rx) => {
            if rx.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

fn stop_hint(hotkey: Option<&StopHotkey>) -> String {
    match hotkey {
        Some(hotkey) => format!("{} or Ctrl+C", hotkey.label()),
        None => "Ctrl+C".to_string(),
    }
}

fn report_permission(err: &KsrError) {
    if !err.is_permission_denied() {
        return;
    }
    eprintln!("{} {}", "✗".red().bold(), err);
    eprintln!("  {}", permission_help());
}

#[cfg(target_os = "macos")]
fn permission_help() -> &'static str {
    "Grant Accessibility and Input Monitoring to your terminal in System Settings > Privacy & Security, then restart it."
}

#[cfg(target_os = "linux")]
fn permission_help() -> &'static str {
    "Add your user to the 'input' group and make /dev/uinput writable (e.g. via a udev rule), then log in again."
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn permission_help() -> &'static str {
    "Run ksr at the same privilege level as the target application."
}

async fn record(config: &Config, output: &Path, duration: Option<Duration>) -> Result<()> {
    let (mut controller, mut notifications) =
        Controller::new(NativeBackend::new(), ControllerOptions::from(config))?;

    let hotkey = register_hotkey(config);
    let mut presses = hotkey.as_ref().map(StopHotkey::presses);

    if let Err(e) = controller.start_recording() {
        report_permission(&e);
        return Err(e.into());
    }
    println!(
        "{} Recording, press {} to stop",
        "●".red().bold(),
        stop_hint(hotkey.as_ref())
    );

    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = next_press(&mut presses) => break,
            _ = &mut deadline => break,
            Some(notification) = notifications.recv() => {
                if let Notification::SequenceChanged { len } = notification {
                    print!("\r  {} events", len);
                    io::stdout().flush()?;
                }
            }
        }
    }

    controller.stop_recording();
    println!();

    let mut events = controller.snapshot();
    let trimmed = trim_dangling_presses(&mut events);
    if trimmed > 0 {
        debug!("Trimmed {} unreleased presses from the stop chord", trimmed);
    }

    if events.is_empty() {
        println!("{} No keys recorded", "!".yellow().bold());
        return Ok(());
    }

    storage::save_sequence(output, &events)
        .with_context(|| format!("Failed to save {}", output.display()))?;
    print!("{}", summarize(&events));
    println!("{} Saved to {}", "✓".green().bold(), output.display());
    Ok(())
}

async fn play(config: &Config, file: &Path, repeat: Option<u32>, dry_run: bool) -> Result<()> {
    let mut config = config.clone();
    if let Some(repeat) = repeat {
        config.set_repeat_count(repeat)?;
    }
    let config = &config;
    let repeat = config.repeat_count;

    let events = storage::load_sequence(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;

    if dry_run {
        let backend = run_playback(SimulatedBackend::new(), config, events, repeat).await?;
        for (key, state) in backend.posted_names() {
            println!("  {} {}", key, state);
        }
    } else {
        run_playback(NativeBackend::new(), config, events, repeat).await?;
    }
    Ok(())
}

async fn run_playback<B: InputBackend>(
    backend: B,
    config: &Config,
    events: Vec<KeyEvent>,
    repeat: u32,
) -> Result<Arc<B>> {
    let (mut controller, mut notifications) =
        Controller::new(backend, ControllerOptions::from(config))?;
    controller.load_snapshot(events)?;

    let hotkey = register_hotkey(config);
    let mut presses = hotkey.as_ref().map(StopHotkey::presses);

    tokio::select! {
        _ = countdown(config.focus_countdown) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\n{} Cancelled", "■".yellow().bold());
            return Ok(Arc::clone(controller.backend()));
        }
    }

    if let Err(e) = controller.start_playback(repeat) {
        report_permission(&e);
        return Err(e.into());
    }
    println!(
        "{} Playing {} time(s), press {} to stop",
        "▶".green().bold(),
        repeat,
        stop_hint(hotkey.as_ref())
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                controller.stop_playback();
            }
            _ = next_press(&mut presses) => {
                controller.stop_playback();
            }
            notification = notifications.recv() => match notification {
                Some(Notification::PlaybackFinished { emitted, failed }) => {
                    println!("{} Finished: {} keys sent", "✓".green().bold(), emitted);
                    if failed > 0 {
                        println!("{} {} keys could not be sent", "!".yellow().bold(), failed);
                    }
                    break;
                }
                Some(Notification::PlaybackCancelled { emitted }) => {
                    println!("{} Stopped after {} keys", "■".yellow().bold(), emitted);
                    break;
                }
                Some(other) => debug!("{:?}", other),
                None => break,
            },
        }
    }

    Ok(Arc::clone(controller.backend()))
}

/// Give the user time to focus the target window.
async fn countdown(total: Duration) {
    let mut remaining = total;
    while remaining >= Duration::from_secs(1) {
        print!("\rStarting in {}s... ", remaining.as_secs());
        let _ = io::stdout().flush();
        tokio::time::sleep(Duration::from_secs(1)).await;
        remaining -= Duration::from_secs(1);
    }
    tokio::time::sleep(remaining).await;
    if !total.is_zero() {
        println!();
    }
}

fn show(file: &Path) -> Result<()> {
    let events = storage::load_sequence(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    print!("{}", summarize(&events));
    Ok(())
}

fn keys(all: bool) {
    let tables = if all {
        keymap::all_tables().to_vec()
    } else {
        vec![keymap::native_table()]
    };

    for table in tables {
        println!("{}", table.platform().bold());
        for name in table.names() {
            println!("  {}", name);
        }
    }
}

fn check() -> Result<()> {
    let backend = NativeBackend::new();
    let mut ok = true;

    match backend.check_permissions() {
        Ok(()) => println!("{} keyboard capture", "✓".green().bold()),
        Err(e) => {
            ok = false;
            println!("{} keyboard capture: {}", "✗".red().bold(), e);
        }
    }

    match backend.prepare_output() {
        Ok(()) => println!("{} key injection", "✓".green().bold()),
        Err(e) => {
            ok = false;
            println!("{} key injection: {}", "✗".red().bold(), e);
        }
    }

    if !ok {
        println!("  {}", permission_help());
        anyhow::bail!("missing permissions");
    }
    Ok(())
}
