//! Top-level wiring: configuration, transport choice, session bring-up and
//! the two run modes.
//!
//! Startup order is fixed: load everything that can fail without touching
//! hardware, bring the Buzz to `Streaming`, then open the frame source.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use buzz_session::{
    shutdown_channel, BuzzSession, BuzzTransport, SessionConfig, Shutdown, SimulatedBuzz,
};
use hand_frame::HandType;
use haptic_encode::{Encoder, ProjectionModel};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::gesture::{GestureTable, GestureTrainer, TrainerTiming};
use crate::pipeline::{run_live, LivePipeline};
use crate::scheduler::{FrameScheduler, DEFAULT_MIN_INTERVAL};
use crate::source::{self, FrameStream, DEFAULT_TRACKING_URL};

// ════════════════════════════════════════════════════════════════════════════
// Configuration
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub enum FrameSourceConfig {
    WebSocket { url: String },
    Replay { path: PathBuf, interval: Duration },
    #[cfg(feature = "leap")]
    LeapC,
}

#[derive(Clone, Debug)]
pub struct LiveConfig {
    pub hand:         HandType,
    pub model_path:   PathBuf,
    pub source:       FrameSourceConfig,
    pub min_interval: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            hand:         HandType::Left,
            model_path:   PathBuf::from("pca_encoder.json"),
            source:       FrameSourceConfig::WebSocket { url: DEFAULT_TRACKING_URL.to_string() },
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TrainConfig {
    /// Empty means every built-in gesture.
    pub gestures: Vec<String>,
    pub timing:   TrainerTiming,
    /// Stop after this many rounds; run until interrupted if `None`.
    pub rounds:   Option<usize>,
}

#[derive(Clone, Debug)]
pub enum Mode {
    Live(LiveConfig),
    Train(TrainConfig),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub mode:      Mode,
    pub session:   SessionConfig,
    /// How long a BLE scan listens for advertisements.
    pub scan_time: Duration,
    /// Use the in-process simulator even when BLE support is compiled in.
    pub simulate:  bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            mode:      Mode::Live(LiveConfig::default()),
            session:   SessionConfig::default(),
            scan_time: Duration::from_secs(5),
            simulate:  false,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Entry point
// ════════════════════════════════════════════════════════════════════════════

/// Run until the mode finishes or Ctrl-C.
pub async fn run(cfg: AppConfig) -> Result<()> {
    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping");
                trigger.trigger();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });

    let transport = open_transport(&cfg).await?;
    match cfg.mode {
        Mode::Live(live)   => run_live_mode(live, cfg.session, transport, shutdown).await,
        Mode::Train(train) => run_train_mode(train, cfg.session, transport, shutdown).await,
    }
}

async fn open_transport(cfg: &AppConfig) -> Result<Box<dyn BuzzTransport>> {
    #[cfg(feature = "ble")]
    if !cfg.simulate {
        let ble = buzz_session::BleBuzz::new(cfg.scan_time)
            .await
            .context("Bluetooth adapter unavailable")?;
        return Ok(Box::new(ble));
    }

    #[cfg(not(feature = "ble"))]
    if !cfg.simulate {
        info!(scan_secs = cfg.scan_time.as_secs(), "built without BLE support, using simulated Buzz");
    }
    Ok(Box::new(SimulatedBuzz::new()))
}

/// Establish the session unless Ctrl-C arrives first; `None` if it did.
async fn bring_up(
    transport: Box<dyn BuzzTransport>,
    config:    SessionConfig,
    shutdown:  &mut Shutdown,
) -> Result<Option<BuzzSession<Box<dyn BuzzTransport>>>> {
    let session = BuzzSession::establish_or_shutdown(transport, config, shutdown)
        .await
        .context("Buzz initialization failed")?;
    if session.is_none() {
        info!("interrupted before the Buzz was ready");
    }
    Ok(session)
}

async fn run_live_mode(
    live:         LiveConfig,
    session:      SessionConfig,
    transport:    Box<dyn BuzzTransport>,
    mut shutdown: Shutdown,
) -> Result<()> {
    let model = ProjectionModel::load(&live.model_path).with_context(|| {
        format!("Unable to load pre-fitted encoder file '{}'", live.model_path.display())
    })?;
    let encoder = Encoder::new(Arc::new(model));

    let Some(mut session) = bring_up(transport, session, &mut shutdown).await? else {
        return Ok(());
    };

    let frames = match open_source(&live.source).await {
        Ok(frames) => frames,
        Err(e) => {
            if let Err(resume) = session.resume_and_close().await {
                warn!(error = %resume, "could not hand control back to the Buzz");
            }
            return Err(e);
        }
    };

    let mut pipeline = LivePipeline::new(live.hand, encoder, FrameScheduler::new(live.min_interval));
    let stats = run_live(&mut pipeline, &mut session, frames, shutdown)
        .await
        .context("Live streaming stopped")?;
    info!(?stats, "live session finished");
    Ok(())
}

async fn open_source(cfg: &FrameSourceConfig) -> Result<FrameStream> {
    let frames = match cfg {
        FrameSourceConfig::WebSocket { url } => source::connect_websocket(url).await?,
        FrameSourceConfig::Replay { path, interval } => source::replay_file(path, *interval).await?,
        #[cfg(feature = "leap")]
        FrameSourceConfig::LeapC => source::spawn_leapc_source(),
    };
    Ok(frames)
}

async fn run_train_mode(
    train:        TrainConfig,
    session:      SessionConfig,
    transport:    Box<dyn BuzzTransport>,
    mut shutdown: Shutdown,
) -> Result<()> {
    let mut trainer = GestureTrainer::new(
        GestureTable::builtin(),
        &train.gestures,
        train.timing,
        StdRng::from_entropy(),
    )?;
    println!("Using gestures: {}", trainer.selection().join(", "));

    let Some(mut session) = bring_up(transport, session, &mut shutdown).await? else {
        return Ok(());
    };
    let report = trainer.run(&mut session, shutdown, train.rounds).await?;
    info!(rounds = report.played.len(), exit = ?report.exit, "training finished");
    Ok(())
}
