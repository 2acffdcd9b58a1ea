//! leap_buzz: command-line entry point.

use std::collections::HashSet;
use std::path::PathBuf;

use buzz_session::SessionConfig;
use clap::{Parser, Subcommand};
use hand_frame::HandType;
use leap_buzz::app::{run, AppConfig, FrameSourceConfig, LiveConfig, Mode, TrainConfig};
use leap_buzz::gesture::{GestureTable, TrainerTiming};
use leap_buzz::source::DEFAULT_TRACKING_URL;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "leap_buzz", version, about = "Ultraleap hand tracking → Neosensory Buzz haptics")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Advertised-name prefix identifying a Buzz
    #[arg(long, default_value = "Buzz", global = true)]
    name_prefix: String,

    /// Buzz address to skip (repeatable)
    #[arg(long = "exclude", value_name = "ADDR", global = true)]
    exclude: Vec<String>,

    /// BLE scan duration in seconds
    #[arg(long, default_value_t = 5, global = true)]
    scan_secs: u64,

    /// Use the simulated Buzz even when built with BLE support
    #[arg(long, global = true)]
    simulate: bool,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream one tracked hand onto the Buzz
    Live {
        /// Hand to track: left or right
        #[arg(long, default_value = "left")]
        hand: HandType,

        /// Pre-fitted projection model (JSON)
        #[arg(long, default_value = "./pca_encoder.json")]
        model: PathBuf,

        /// Tracking service WebSocket endpoint
        #[arg(long, default_value = DEFAULT_TRACKING_URL)]
        url: String,

        /// Replay recorded frames (one JSON message per line) instead of connecting
        #[arg(long, value_name = "FILE", conflicts_with = "url")]
        replay: Option<PathBuf>,

        /// Pacing between replayed frames
        #[arg(long, default_value_t = 10)]
        replay_interval_ms: u64,

        /// Minimum gap between processed frames
        #[arg(long, default_value_t = 100)]
        min_interval_ms: u64,

        /// Read frames from LeapC directly (requires the `leap` feature)
        #[arg(long, conflicts_with_all = ["url", "replay"])]
        leapc: bool,
    },

    /// Guess which gesture the Buzz is playing
    Train {
        /// Gestures to draw from (default: all); repeat a name to weight it
        gestures: Vec<String>,

        /// Seconds per guess, answer included (minimum 3)
        #[arg(long, default_value_t = 8)]
        guess_secs: u64,

        /// Rest seconds between rounds
        #[arg(long, default_value_t = 5)]
        between_secs: u64,

        /// Stop after this many rounds
        #[arg(long)]
        rounds: Option<usize>,
    },

    /// List the built-in gestures and their motor patterns
    Gestures,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║        Leap Buzz — Hand Tracking to Wristband Haptics        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    #[cfg(feature = "ble")]
    println!("  Buzz: {}", if cli.simulate { "simulated" } else { "Bluetooth LE" });
    #[cfg(not(feature = "ble"))]
    println!("  Buzz: simulated  (use --features ble for hardware)");
    println!();

    let Some(cfg) = to_config(cli) else { return };

    if let Err(e) = run(cfg).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// `None` for commands that finish without a session.
fn to_config(cli: Cli) -> Option<AppConfig> {
    let session = SessionConfig {
        name_prefix: cli.name_prefix,
        exclude:     cli.exclude.into_iter().collect::<HashSet<_>>(),
        ..SessionConfig::default()
    };

    let mode = match cli.command {
        Command::Gestures => {
            for (name, vector) in GestureTable::builtin().iter() {
                println!("  {name:<12} {vector}");
            }
            return None;
        }
        Command::Live {
            hand, model, url, replay, replay_interval_ms, min_interval_ms, leapc,
        } => {
            let source = match replay {
                Some(path) => FrameSourceConfig::Replay {
                    path,
                    interval: Duration::from_millis(replay_interval_ms),
                },
                None => FrameSourceConfig::WebSocket { url },
            };
            #[cfg(feature = "leap")]
            let source = if leapc { FrameSourceConfig::LeapC } else { source };
            #[cfg(not(feature = "leap"))]
            if leapc {
                tracing::warn!("built without LeapC support, ignoring --leapc");
            }

            println!("  Tracking {hand} hand\n");
            Mode::Live(LiveConfig {
                hand,
                model_path:   model,
                source,
                min_interval: Duration::from_millis(min_interval_ms),
            })
        }
        Command::Train { gestures, guess_secs, between_secs, rounds } => Mode::Train(TrainConfig {
            gestures,
            timing: TrainerTiming::new(
                Duration::from_secs(guess_secs),
                Duration::from_secs(between_secs),
            ),
            rounds,
        }),
    };

    let label = label_for(&mode);
    Some(AppConfig {
        mode,
        session: SessionConfig { label, ..session },
        scan_time: Duration::from_secs(cli.scan_secs),
        simulate:  cli.simulate,
    })
}

fn label_for(mode: &Mode) -> String {
    match mode {
        Mode::Live(live) => format!("{} hand", live.hand),
        Mode::Train(_)   => "trainer".to_string(),
    }
}
