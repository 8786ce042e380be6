//! Ballpark CLI - The `ballpark` command.
//!
//! Replays recorded games through the music engine and exposes the
//! building blocks (interpretation, rhythm patterns, configuration) for
//! inspection.

mod logger;

use anyhow::{Context, Result};
use ballpark_core::feed::FeedError;
use ballpark_core::{
    generate, EngineController, GameStateInterpreter, Interpretation, LogEngine, MusicConfig,
    ReplayFeed, Runtime, SnapshotFeed,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ballpark - live baseball games as generative music
#[derive(Parser, Debug)]
#[command(name = "ballpark")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turns the state of a baseball game into music", long_about = None)]
struct Args {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded game through the engine
    Play {
        /// JSON file with an array of snapshots or live feed documents
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Music configuration (defaults to the user config file)
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Time between two snapshots
        #[arg(short, long, default_value = "2s")]
        interval: humantime::Duration,

        /// Replay speed multiplier
        #[arg(short, long, default_value_t = 1.0)]
        speed: f64,

        /// Game to request from the feed (0 accepts any)
        #[arg(long, default_value_t = 0)]
        game_id: u64,
    },

    /// Print musical parameters and events for every snapshot as JSON
    Interpret {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print a Euclidean rhythm pattern
    Pattern {
        steps: u32,
        pulses: u32,

        /// Left rotation in steps (may be negative)
        #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
        rotation: i32,
    },

    /// Manage the music configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the built-in configuration to disk
    Init {
        /// Target file (defaults to the user config file)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show {
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init_logger(args.verbose);

    match args.command {
        Commands::Play {
            file,
            config,
            interval,
            speed,
            game_id,
        } => play(&file, config.as_deref(), interval.into(), speed, game_id),
        Commands::Interpret { file, config } => interpret(&file, config.as_deref()),
        Commands::Pattern {
            steps,
            pulses,
            rotation,
        } => {
            let pattern = generate(steps, pulses, rotation);
            println!("{}", pattern);
            log::debug!("Onset gaps: {:?}", pattern.onset_gaps());
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => config_init(path, force),
            ConfigAction::Show { path } => config_show(path.as_deref()),
        },
        Commands::Version => {
            println!("ballpark {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Voices: balls, strikes, outs, runners, inning");
            match MusicConfig::config_path() {
                Ok(path) => println!("Config: {}", path.display()),
                Err(e) => println!("Config: unavailable ({})", e),
            }
            Ok(())
        }
    }
}

/// Load the configuration at `path`, or the user configuration if none is
/// given. Only an explicit path that fails to load is an error.
fn load_config(path: Option<&Path>) -> Result<MusicConfig> {
    match path {
        Some(path) => MusicConfig::load_from(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(MusicConfig::load_or_default()),
    }
}

fn play(
    file: &Path,
    config: Option<&Path>,
    interval: Duration,
    speed: f64,
    game_id: u64,
) -> Result<()> {
    if !(speed.is_finite() && speed > 0.0) {
        anyhow::bail!("Speed must be a positive number, got {}", speed);
    }

    let config = load_config(config)?;
    let mut feed = ReplayFeed::from_path(file)
        .with_context(|| format!("Failed to read recording: {}", file.display()))?;
    let pause = interval.div_f64(speed);

    println!("⚾ ballpark - {} frames from {}", feed.len(), file.display());
    println!("   one snapshot every {}", humantime::format_duration(pause));

    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, interrupted.clone())
        .context("Failed to install Ctrl-C handler")?;

    let controller = EngineController::new(config, LogEngine::new());
    let runtime = Runtime::start(controller).context("Failed to start runtime")?;
    let handle = runtime.handle().clone();

    // Playing from the command line counts as the user's go-ahead.
    handle.activate()?;
    handle.start()?;

    loop {
        if interrupted.load(Ordering::Relaxed) {
            log::info!("Interrupted by user (Ctrl+C)");
            break;
        }
        match feed.fetch_snapshot(game_id) {
            Err(FeedError::Exhausted) => {
                log::info!("Recording finished");
                sleep_unless(pause, &interrupted);
                break;
            }
            fetched => handle.fetched(fetched)?,
        }
        sleep_unless(pause, &interrupted);
    }

    handle.stop()?;
    let status = handle.status();
    if let Some(error) = &status.last_error {
        log::error!("Engine reported: {}", error);
    }
    println!(
        "Applied {} snapshots, played {} notes, final tempo {:.0} bpm",
        status.snapshots_applied, status.notes_triggered, status.bpm
    );

    runtime.shutdown();
    Ok(())
}

/// Sleep for `duration`, waking early once `flag` is set.
fn sleep_unless(duration: Duration, flag: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !flag.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}

#[derive(Serialize)]
struct FrameReport {
    frame: usize,
    #[serde(flatten)]
    interpretation: Interpretation,
}

fn interpret(file: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let mut feed = ReplayFeed::from_path(file)
        .with_context(|| format!("Failed to read recording: {}", file.display()))?;
    let reports = interpret_feed(&mut feed, config);
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

/// Run every frame through a fresh interpreter. Frames that fail to parse
/// are reported and skipped.
fn interpret_feed(feed: &mut ReplayFeed, config: MusicConfig) -> Vec<FrameReport> {
    let mut interpreter = GameStateInterpreter::new(config);
    let mut reports = Vec::new();
    for frame in 1.. {
        match feed.fetch_snapshot(0) {
            Ok(snapshot) => {
                if let Some(interpretation) = interpreter.interpret(Some(&snapshot)) {
                    reports.push(FrameReport {
                        frame,
                        interpretation,
                    });
                }
            }
            Err(FeedError::Exhausted) => break,
            Err(e) => log::warn!("Skipping frame {}: {}", frame, e),
        }
    }
    reports
}

fn config_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => MusicConfig::config_path()?,
    };
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    MusicConfig::write_default(&path)
        .with_context(|| format!("Failed to write config: {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn config_show(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
