//! Frame sources: where raw tracking messages come from.
//!
//! Every source is a [`FrameStream`] of JSON text messages in the tracking
//! service's wire format.  Parsing happens later, and only for frames the
//! scheduler admits.
//!
//! | Source | Constructor | Notes |
//! |---|---|---|
//! | Tracking service WebSocket | [`connect_websocket`] | text messages only |
//! | Recorded JSON lines | [`replay_file`] | one message per line, fixed pacing |
//! | LeapC (feature `leap`) | `spawn_leapc_source` | polled on its own thread |

use std::path::{Path, PathBuf};
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use thiserror::Error;
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info};

/// Default tracking-service endpoint.
pub const DEFAULT_TRACKING_URL: &str = "ws://localhost:6437/v6.json";

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, SourceError>> + Send>>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Cannot reach tracking service at {url}: {source}")]
    Connect {
        url:    String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("Tracking stream failed: {0}")]
    Stream(#[source] tungstenite::Error),

    #[error("Cannot read recorded frames from {path}: {source}")]
    Replay {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "leap")]
    #[error("LeapC: {0}")]
    Leap(String),
}

// ════════════════════════════════════════════════════════════════════════════
// WebSocket
// ════════════════════════════════════════════════════════════════════════════

/// Connect to the tracking service and stream its text messages.
///
/// Binary, ping and pong messages are skipped; the stream ends when the
/// service closes the socket.
pub async fn connect_websocket(url: &str) -> Result<FrameStream, SourceError> {
    let (socket, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|source| SourceError::Connect { url: url.to_string(), source })?;
    info!(url, "connected to tracking service");

    let frames = socket.filter_map(|message| async move {
        match message {
            Ok(Message::Text(text)) => Some(Ok(text)),
            Ok(Message::Close(reason)) => {
                info!(?reason, "tracking service closed the stream");
                None
            }
            Ok(_) => None,
            Err(e) => Some(Err(SourceError::Stream(e))),
        }
    });
    Ok(Box::pin(frames))
}

// ════════════════════════════════════════════════════════════════════════════
// Replay
// ════════════════════════════════════════════════════════════════════════════

/// Stream a recorded session: one JSON message per non-blank line, each
/// delivered `interval` after the previous one.
pub async fn replay_file(path: &Path, interval: Duration) -> Result<FrameStream, SourceError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SourceError::Replay { path: path.to_path_buf(), source })?;
    let lines: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    info!(path = %path.display(), frames = lines.len(), "replaying recorded frames");
    Ok(Box::pin(replay_lines(lines, interval)))
}

pub fn replay_lines(
    lines:    Vec<String>,
    interval: Duration,
) -> impl Stream<Item = Result<String, SourceError>> + Send {
    stream::iter(lines).then(move |line| async move {
        tokio::time::sleep(interval).await;
        debug!(bytes = line.len(), "replayed frame");
        Ok(line)
    })
}

// ════════════════════════════════════════════════════════════════════════════
// LeapC (feature = "leap")
// ════════════════════════════════════════════════════════════════════════════

/// Poll a locally attached controller through LeapC on a dedicated thread,
/// re-serialising each tracking event into the WebSocket wire format.
#[cfg(feature = "leap")]
pub fn spawn_leapc_source() -> FrameStream {
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    std::thread::spawn(move || leapc_poll_loop(tx));
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}

#[cfg(feature = "leap")]
fn leapc_poll_loop(tx: tokio::sync::mpsc::Sender<Result<String, SourceError>>) {
    use hand_frame::{Hand, Pointable, TrackingFrame};
    use leaprs::*;

    let mut connection = match Connection::create(ConnectionConfig::default()) {
        Ok(c) => c,
        Err(e) => {
            let _ = tx.blocking_send(Err(SourceError::Leap(format!("create connection: {e:?}"))));
            return;
        }
    };
    if let Err(e) = connection.open() {
        let _ = tx.blocking_send(Err(SourceError::Leap(format!("open device: {e:?}"))));
        return;
    }
    info!("LeapC connection open");

    loop {
        let msg = match connection.poll(100) {
            Ok(m)  => m,
            Err(_) => continue,
        };
        let Event::Tracking(event) = msg.event() else { continue };

        let mut frame = TrackingFrame::default();
        for hand in event.hands() {
            let id = i64::from(hand.id());
            let normal = hand.palm().normal();
            let position = hand.palm().position();
            let wrist = hand.arm().next_joint();
            frame.hands.push(Hand {
                id,
                label: if hand.hand_type() == HandType::Left { "left" } else { "right" }.into(),
                palm_normal:   vec![normal.x as f64, normal.y as f64, normal.z as f64],
                palm_position: vec![position.x as f64, position.y as f64, position.z as f64],
                wrist:         vec![wrist.x as f64, wrist.y as f64, wrist.z as f64],
            });
            for digit in hand.digits() {
                let tip = digit.distal().next_joint();
                frame.pointables.push(Pointable {
                    hand_id:      Some(id),
                    tip_position: vec![tip.x as f64, tip.y as f64, tip.z as f64],
                });
            }
        }

        let json = match frame.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "could not serialise LeapC frame");
                continue;
            }
        };
        if tx.blocking_send(Ok(json)).is_err() {
            debug!("frame consumer gone, stopping LeapC poll");
            return;
        }
    }
}
