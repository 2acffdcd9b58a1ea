//! Live mode: tracking frames in, actuation vectors out.
//!
//! ```text
//! message ─▶ FrameScheduler ─▶ pre-check ─▶ extract ─▶ encode ─▶ BuzzSession
//!               │ too soon          │ any failure here sends the rest vector
//!               ▼                   ▼
//!            dropped            [0, 0, 0, 0]
//! ```
//!
//! One pipeline serves one hand and one Buzz.  Per-frame failures never end
//! the stream; only shutdown, source end or a source error do, and each of
//! those hands motor control back to the device first.

use futures::{Stream, StreamExt};
use hand_frame::{extract_message, has_hand_and_finger_data, FrameError, HandType};
use haptic_encode::{EncodeError, Encoder};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use buzz_session::{
    ActuationVector, BuzzSession, BuzzTransport, SendOutcome, SessionError, Shutdown,
};

use crate::scheduler::FrameScheduler;
use crate::source::SourceError;

// ════════════════════════════════════════════════════════════════════════════
// Per-frame outcome
// ════════════════════════════════════════════════════════════════════════════

/// Why an admitted frame produced the rest vector instead of an encoding.
#[derive(Debug, Error)]
pub enum FrameFailure {
    #[error("Skipping empty or partially empty frame")]
    NotReady,

    #[error("No {0} hand in frame")]
    NoMatchingHand(HandType),

    #[error("Feature extraction failed: {0}")]
    Extraction(#[from] FrameError),

    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodeError),
}

#[derive(Debug)]
pub enum FrameOutcome {
    /// Encoded from the tracked hand.
    Admitted(ActuationVector),
    /// Arrived inside the scheduler interval; nothing is sent.
    Dropped,
    /// Admitted but unusable; the rest vector is sent.
    Failed(FrameFailure),
}

impl FrameOutcome {
    /// What to send to the Buzz, if anything.
    pub fn to_send(&self) -> Option<ActuationVector> {
        match self {
            FrameOutcome::Admitted(v) => Some(*v),
            FrameOutcome::Dropped     => None,
            FrameOutcome::Failed(_)   => Some(ActuationVector::ZERO),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// LivePipeline
// ════════════════════════════════════════════════════════════════════════════

pub struct LivePipeline {
    hand:      HandType,
    encoder:   Encoder,
    scheduler: FrameScheduler,
}

impl LivePipeline {
    pub fn new(hand: HandType, encoder: Encoder, scheduler: FrameScheduler) -> Self {
        LivePipeline { hand, encoder, scheduler }
    }

    pub fn hand(&self) -> HandType {
        self.hand
    }

    /// Gate `message` on the scheduler, then encode it if admitted.
    pub fn process(&mut self, message: &str, now: Instant) -> FrameOutcome {
        if !self.scheduler.admit(now) {
            return FrameOutcome::Dropped;
        }
        match self.encode_message(message) {
            Ok(v)  => FrameOutcome::Admitted(v),
            Err(f) => FrameOutcome::Failed(f),
        }
    }

    fn encode_message(&self, message: &str) -> Result<ActuationVector, FrameFailure> {
        if !has_hand_and_finger_data(message) {
            return Err(FrameFailure::NotReady);
        }
        let tensor = extract_message(message, self.hand)?
            .ok_or(FrameFailure::NoMatchingHand(self.hand))?;
        Ok(self.encoder.encode(&tensor)?)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Live loop
// ════════════════════════════════════════════════════════════════════════════

/// How a live run ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LiveExit {
    #[default]
    StreamEnded,
    Shutdown,
}

/// Counters for one live run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiveStats {
    pub received:    u64,
    pub dropped:     u64,
    pub encoded:     u64,
    /// Admitted frames that were replaced by the rest vector.
    pub substituted: u64,
    pub send_errors: u64,
    pub exit:        LiveExit,
}

#[derive(Debug, Error)]
pub enum LiveError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Drive `session` from `frames` until the source ends or `shutdown` fires.
///
/// The session must already be streaming.  Send failures are logged and the
/// stream continues.  On every exit path the device algorithm is resumed
/// once and the session closed.
pub async fn run_live<S, T>(
    pipeline:     &mut LivePipeline,
    session:      &mut BuzzSession<T>,
    mut frames:   S,
    mut shutdown: Shutdown,
) -> Result<LiveStats, LiveError>
where
    S: Stream<Item = Result<String, SourceError>> + Unpin,
    T: BuzzTransport,
{
    let mut stats = LiveStats::default();
    info!(hand = %pipeline.hand, "live streaming started");

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                info!("shutdown requested while waiting for a frame");
                session.resume_and_close().await?;
                stats.exit = LiveExit::Shutdown;
                return Ok(stats);
            }
            next = frames.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!(error = %e, "frame source failed");
                session.resume_and_close().await?;
                return Err(e.into());
            }
            None => {
                info!("frame source ended");
                break;
            }
        };
        stats.received += 1;

        let outcome = pipeline.process(&message, Instant::now());
        let frame = match &outcome {
            FrameOutcome::Dropped => {
                stats.dropped += 1;
                continue;
            }
            FrameOutcome::Admitted(v) => {
                stats.encoded += 1;
                *v
            }
            FrameOutcome::Failed(reason) => {
                stats.substituted += 1;
                match reason {
                    FrameFailure::NotReady | FrameFailure::NoMatchingHand(_) => {
                        info!(%reason, "sending rest vector")
                    }
                    _ => warn!(%reason, "sending rest vector"),
                }
                ActuationVector::ZERO
            }
        };

        debug!(%frame, "sending frame");
        match session.send_or_shutdown(&frame, &mut shutdown).await {
            Ok(SendOutcome::Sent) => {}
            Ok(SendOutcome::Cancelled) => {
                stats.exit = LiveExit::Shutdown;
                return Ok(stats);
            }
            Err(SessionError::Send(e)) => {
                stats.send_errors += 1;
                warn!(error = %e, "send failed, continuing");
            }
            Err(e) => return Err(e.into()),
        }
    }

    session.resume_and_close().await?;
    Ok(stats)
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
