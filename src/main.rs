//! spout-bridge - Spout texture sender
//!
//! Entry point for the command-line tool.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spout_bridge::{
    config::{self, types::LoggingConfig, Config},
    spout::{ModuleResidency, SpoutSender},
    telemetry::log_startup_diagnostics,
};
use tracing::{debug, info, warn, Subscriber};
use tracing_subscriber::{
    fmt::MakeWriter, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, Layer,
};

/// Command-line arguments for spout-bridge
#[derive(Parser, Debug)]
#[command(name = "spout-bridge")]
#[command(version, about = "Share GPU textures with Spout receivers", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// SpoutLibrary file to load
    #[arg(long, env = "SPOUT_LIBRARY_PATH")]
    pub library: Option<PathBuf>,

    /// Sender name announced to receivers
    #[arg(short, long)]
    pub name: Option<String>,

    /// Frame width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Frame height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do once the library is configured
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the library, create a sender, query it and release it
    Probe,

    /// Send a moving RGBA test pattern at a fixed rate
    ///
    /// Frames go through the library's CPU image path, so receivers can be
    /// checked without a host application providing GL textures.
    Send {
        /// Number of frames to send (0 = until Ctrl-C)
        #[arg(long, default_value = "0")]
        frames: u64,

        /// Frames per second (at most 1000)
        #[arg(long, default_value = "60")]
        fps: f64,
    },
}

// Single-threaded: the sender is bound to the thread that owns the GL context.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (needed for logging settings)
    let config = Config::load_or_default(args.config.as_deref())?;

    init_logging(&args, &config.logging)?;

    info!("════════════════════════════════════════════════════════");
    info!("  spout-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "  Built: {} {}",
        option_env!("BUILD_DATE").unwrap_or("unknown"),
        option_env!("BUILD_TIME").unwrap_or("")
    );
    info!(
        "  Commit: {}",
        option_env!("GIT_HASH").unwrap_or("vendored")
    );
    info!(
        "  Profile: {}",
        if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        }
    );
    info!("════════════════════════════════════════════════════════");

    log_startup_diagnostics();

    // Apply CLI overrides to config (config already loaded above for logging)
    let config = config
        .with_overrides(args.name.clone(), args.width, args.height)
        .with_library_path(args.library.clone());
    config.validate()?;

    info!("Configuration loaded successfully");
    debug!("Config: {:?}", config);

    match args.command {
        Command::Probe => probe(&config),
        Command::Send { frames, fps } => send(&config, frames, fps).await,
    }
}

fn load_library(config: &Config) -> Result<ModuleResidency> {
    let mut residency = ModuleResidency::from_config(&config.library);
    residency
        .try_ensure_loaded()
        .with_context(|| format!("{} is not available", residency.library()))?;
    Ok(residency)
}

fn probe(config: &Config) -> Result<()> {
    let residency = load_library(config)?;
    let sender_config = config.sender_config()?;

    let mut sender = SpoutSender::with_diagnostic_interval(config.frames.diagnostic_interval);
    sender
        .try_initialize(&residency, sender_config)
        .context("Failed to create Spout sender")?;

    let foreign_ready = sender.query_foreign_ready();
    let origin = sender
        .module()
        .map(|m| m.origin().to_string())
        .unwrap_or_default();
    sender.dispose();

    println!("Library:        {origin}");
    if let Some(sender_config) = sender.config() {
        println!("Sender:         {sender_config}");
    }
    println!("Sender state:   {}", sender.state());
    // The library reports initialized only after the first frame went out.
    println!("Library ready:  {foreign_ready}");
    Ok(())
}

/// Highest accepted `--fps`; keeps the tick period at or above 1 ms.
const MAX_FPS: f64 = 1000.0;

fn frame_period(fps: f64) -> Result<Duration> {
    if !(fps.is_finite() && fps > 0.0 && fps <= MAX_FPS) {
        anyhow::bail!("Invalid frame rate: {fps} (expected 0 < fps <= {MAX_FPS})");
    }
    Ok(Duration::from_secs_f64(1.0 / fps))
}

/// Diagonal gradient that scrolls one pixel per frame.
fn fill_test_pattern(pixels: &mut [u8], width: u32, frame: u64) {
    let width = width.max(1) as usize;
    let shift = (frame % 256) as usize;
    for (i, pixel) in pixels.chunks_exact_mut(4).enumerate() {
        let (x, y) = (i % width, i / width);
        pixel.copy_from_slice(&[
            ((x + shift) % 256) as u8,
            ((y + shift) % 256) as u8,
            ((x + y) % 256) as u8,
            u8::MAX,
        ]);
    }
}

async fn send(config: &Config, frames: u64, fps: f64) -> Result<()> {
    let period = frame_period(fps)?;
    let sender_config = config.sender_config()?;
    let width = sender_config.width();
    let mut pixels = vec![0u8; width as usize * sender_config.height() as usize * 4];

    let residency = load_library(config)?;
    let mut sender = SpoutSender::with_diagnostic_interval(config.frames.diagnostic_interval);
    sender
        .try_initialize(&residency, sender_config)
        .context("Failed to create Spout sender")?;

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut sent = 0u64;
    while frames == 0 || sent < frames {
        tokio::select! {
            _ = ticker.tick() => {
                fill_test_pattern(&mut pixels, width, sent);
                sender.send_image(&pixels);
                sent += 1;
            }
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {e}");
                }
                info!("Interrupted");
                break;
            }
        }
    }

    let stats = sender.stats();
    sender.dispose();
    info!(
        "Frames: {} sent, {} failed ({} diagnostics logged)",
        stats.frames_sent, stats.frames_failed, stats.diagnostics_emitted
    );
    Ok(())
}

fn init_logging(args: &Args, logging_config: &LoggingConfig) -> Result<()> {
    use std::fs::{self, File};

    // CLI -v flag overrides config
    let log_level = if args.verbose > 0 {
        match args.verbose {
            1 => "debug",
            _ => "trace",
        }
    } else {
        match logging_config.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => logging_config.level.as_str(),
            _ => "info",
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "spout_bridge={log_level},libloading={log_level},warn"
        ))
    });

    // CLI --log-file overrides config.log_dir
    let log_file_path: Option<PathBuf> = if let Some(cli_path) = &args.log_file {
        Some(cli_path.clone())
    } else if logging_config.log_dir.is_some() {
        let log_dir = config::resolve_log_dir(&logging_config.log_dir);
        if let Err(e) = fs::create_dir_all(&log_dir) {
            eprintln!(
                "Warning: Cannot create log directory {}: {e}",
                log_dir.display()
            );
            None
        } else {
            let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            Some(log_dir.join(format!("spout-bridge-{timestamp}.log")))
        }
    } else {
        None
    };

    // Fall back to stdout-only if the file cannot be created
    let log_file = log_file_path
        .as_ref()
        .and_then(|path| match File::create(path) {
            Ok(f) => Some((f, path.clone())),
            Err(e) => {
                eprintln!(
                    "Warning: Cannot create log file {}: {e}, logging to console only",
                    path.display()
                );
                None
            }
        });

    let (file_layer, file_path) = match log_file {
        Some((file, path)) => (Some(fmt_layer(&args.log_format, file, false)), Some(path)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer(&args.log_format, std::io::stdout, true))
        .with(file_layer)
        .init();

    if let Some(path) = file_path {
        info!("Logging to file: {}", path.display());
    }

    Ok(())
}

/// `fmt` layer in the requested format (json|compact, anything else pretty).
fn fmt_layer<S, W>(format: &str, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    match format {
        "json" => layer.json().boxed(),
        "compact" => layer.compact().boxed(),
        _ => layer.pretty().boxed(),
    }
}
