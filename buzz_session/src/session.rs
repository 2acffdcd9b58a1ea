//! Device session state machine.
//!
//! `BuzzSession` owns its transport exclusively.  [`BuzzSession::establish`]
//! walks the handshake to `Streaming`; [`BuzzSession::advance`] performs one
//! transition at a time so each step can be driven and observed on its own.
//! Every failure before `Streaming` is fatal: the partial link is released
//! and the session ends in `Failed`.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::shutdown::Shutdown;
use crate::transport::{AuthStep, BuzzTransport, PeripheralInfo, TransportError};
use crate::vector::ActuationVector;

// ════════════════════════════════════════════════════════════════════════════
// SessionConfig
// ════════════════════════════════════════════════════════════════════════════

/// How to find and bring up one Buzz.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Advertised-name prefix identifying a Buzz.
    pub name_prefix: String,
    /// Addresses already claimed by another session.
    pub exclude:     HashSet<String>,
    /// Human label for log lines, e.g. "Left hand".
    pub label:       String,
    /// Pause between opening the link and the first handshake step.
    pub settle:      Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            name_prefix: "Buzz".to_string(),
            exclude:     HashSet::new(),
            label:       String::new(),
            settle:      Duration::from_secs(1),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SessionState
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Discovering,
    Connecting  { address: String },
    /// `step` is the next step to perform.
    Authorizing { address: String, step: AuthStep },
    Streaming   { address: String },
    Closed,
    Failed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Discovering        => "discovering",
            SessionState::Connecting  { .. } => "connecting",
            SessionState::Authorizing { .. } => "authorizing",
            SessionState::Streaming   { .. } => "streaming",
            SessionState::Closed             => "closed",
            SessionState::Failed             => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SessionError
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No Buzz found (name prefix `{prefix}`, {excluded} address(es) excluded)")]
    NoDeviceFound {
        prefix:   String,
        excluded: usize,
    },

    #[error("Discovery failed: {0}")]
    Discovery(#[source] TransportError),

    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source:  TransportError,
    },

    #[error("Authorization step `{step}` failed: {source}")]
    Authorization {
        step:   AuthStep,
        #[source]
        source: TransportError,
    },

    #[error("Send failed: {0}")]
    Send(#[source] TransportError),

    #[error("Resuming the device algorithm failed: {0}")]
    Resume(#[source] TransportError),

    #[error("Session is {state}, not streaming")]
    NotStreaming {
        state: &'static str,
    },
}

/// Result of a send raced against shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Shutdown fired first; the device algorithm was resumed and the
    /// session closed.
    Cancelled,
}

// ════════════════════════════════════════════════════════════════════════════
// Device selection
// ════════════════════════════════════════════════════════════════════════════

/// First peripheral whose name starts with `prefix` and whose address is not
/// excluded.
pub fn select_device<'a>(
    found:   &'a [PeripheralInfo],
    prefix:  &str,
    exclude: &HashSet<String>,
) -> Option<&'a PeripheralInfo> {
    for p in found.iter().filter(|p| p.name.starts_with(prefix)) {
        if exclude.contains(&p.address) {
            info!(address = %p.address, "ignoring already registered Buzz");
            continue;
        }
        info!(name = %p.name, address = %p.address, "found a Buzz");
        return Some(p);
    }
    None
}

// ════════════════════════════════════════════════════════════════════════════
// BuzzSession
// ════════════════════════════════════════════════════════════════════════════

pub struct BuzzSession<T: BuzzTransport> {
    transport: T,
    config:    SessionConfig,
    state:     SessionState,
}

impl<T: BuzzTransport> BuzzSession<T> {
    /// A session in `Discovering`; nothing touches the transport yet.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        BuzzSession { transport, config, state: SessionState::Discovering }
    }

    /// Run discovery, connection and the full handshake.
    pub async fn establish(transport: T, config: SessionConfig) -> Result<Self, SessionError> {
        let mut session = Self::new(transport, config);
        info!(label = %session.config.label, "initializing Buzz");
        while !matches!(session.state, SessionState::Streaming { .. }) {
            session.advance().await?;
        }
        Ok(session)
    }

    /// Like [`establish`](Self::establish), but gives up as soon as
    /// `shutdown` fires.
    ///
    /// `Ok(None)` means the bring-up was interrupted: the link has been
    /// released and, if the device algorithm may already be paused, resumed
    /// first.
    pub async fn establish_or_shutdown(
        transport: T,
        config:    SessionConfig,
        shutdown:  &mut Shutdown,
    ) -> Result<Option<Self>, SessionError> {
        let mut session = Self::new(transport, config);
        info!(label = %session.config.label, "initializing Buzz");
        while !session.is_streaming() {
            let step = tokio::select! {
                biased;
                _ = shutdown.triggered() => None,
                res = session.advance() => Some(res.map(|_| ())),
            };
            match step {
                Some(res) => res?,
                None => {
                    session.abandon().await?;
                    return Ok(None);
                }
            }
        }
        Ok(Some(session))
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Address of the selected device, once discovery has picked one.
    pub fn address(&self) -> Option<&str> {
        match &self.state {
            SessionState::Connecting  { address }
            | SessionState::Authorizing { address, .. }
            | SessionState::Streaming   { address } => Some(address),
            _ => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, SessionState::Streaming { .. })
    }

    /// Perform one transition.  No-op in `Streaming` and terminal states.
    pub async fn advance(&mut self) -> Result<&SessionState, SessionError> {
        match self.state.clone() {
            SessionState::Discovering => {
                let found = match self.transport.discover().await {
                    Ok(found) => found,
                    Err(e) => return Err(self.fail(SessionError::Discovery(e))),
                };
                let picked = select_device(&found, &self.config.name_prefix, &self.config.exclude)
                    .map(|p| p.address.clone());
                match picked {
                    Some(address) => self.state = SessionState::Connecting { address },
                    None => {
                        return Err(self.fail(SessionError::NoDeviceFound {
                            prefix:   self.config.name_prefix.clone(),
                            excluded: self.config.exclude.len(),
                        }));
                    }
                }
            }

            SessionState::Connecting { address } => {
                if let Err(source) = self.transport.connect(&address).await {
                    self.release().await;
                    return Err(self.fail(SessionError::Connect { address, source }));
                }
                info!(%address, "connected");
                if !self.config.settle.is_zero() {
                    tokio::time::sleep(self.config.settle).await;
                }
                self.state = SessionState::Authorizing { address, step: AuthStep::first() };
            }

            SessionState::Authorizing { address, step } => {
                if let Err(source) = self.transport.authorize(step).await {
                    self.release().await;
                    return Err(self.fail(SessionError::Authorization { step, source }));
                }
                info!(%step, "handshake step complete");
                self.state = match step.next() {
                    Some(step) => SessionState::Authorizing { address, step },
                    None       => SessionState::Streaming { address },
                };
            }

            SessionState::Streaming { .. } | SessionState::Closed | SessionState::Failed => {}
        }
        Ok(&self.state)
    }

    /// Send one frame.  Errors are returned, never retried.
    pub async fn send(&mut self, frame: &ActuationVector) -> Result<(), SessionError> {
        self.require_streaming()?;
        self.transport.vibrate(frame).await.map_err(SessionError::Send)
    }

    /// Send one frame, unless `shutdown` fires first.
    ///
    /// On shutdown the outstanding send is abandoned, the device algorithm is
    /// resumed and the session is closed.
    pub async fn send_or_shutdown(
        &mut self,
        frame:    &ActuationVector,
        shutdown: &mut Shutdown,
    ) -> Result<SendOutcome, SessionError> {
        self.require_streaming()?;
        let sent = tokio::select! {
            biased;
            _ = shutdown.triggered() => None,
            res = self.transport.vibrate(frame) => Some(res),
        };
        match sent {
            Some(Ok(()))  => Ok(SendOutcome::Sent),
            Some(Err(e))  => Err(SessionError::Send(e)),
            None => {
                info!("shutdown requested during send");
                self.resume_and_close().await?;
                Ok(SendOutcome::Cancelled)
            }
        }
    }

    /// Hand motor control back to the device and drop the link.
    ///
    /// Idempotent once `Closed`.
    pub async fn resume_and_close(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Closed => return Ok(()),
            SessionState::Streaming { .. } => {}
            _ => return Err(SessionError::NotStreaming { state: self.state.name() }),
        }
        let resumed = self.transport.resume_algorithm().await;
        self.release().await;
        match resumed {
            Ok(()) => {
                info!("device algorithm resumed, session closed");
                self.state = SessionState::Closed;
                Ok(())
            }
            Err(e) => Err(self.fail(SessionError::Resume(e))),
        }
    }

    // ── helpers ──────────────────────────────────────────────────────────

    fn require_streaming(&self) -> Result<(), SessionError> {
        if self.is_streaming() {
            Ok(())
        } else {
            Err(SessionError::NotStreaming { state: self.state.name() })
        }
    }

    /// Drop an unfinished bring-up.  The pause step may have reached the
    /// device even if its reply never arrived, so resume from there on.
    async fn abandon(&mut self) -> Result<(), SessionError> {
        info!(state = %self.state.name(), "shutdown requested during bring-up");
        let paused = matches!(
            self.state,
            SessionState::Authorizing { step, .. } if step >= AuthStep::PauseDeviceAlgorithm
        );
        let resumed = if paused { self.transport.resume_algorithm().await } else { Ok(()) };
        self.release().await;
        match resumed {
            Ok(()) => {
                self.state = SessionState::Closed;
                Ok(())
            }
            Err(e) => Err(self.fail(SessionError::Resume(e))),
        }
    }

    async fn release(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        error!(label = %self.config.label, error = %err, "Buzz session failed");
        self.state = SessionState::Failed;
        err
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::shutdown_channel;
    use crate::sim::{FailurePoint, SimulatedBuzz, TransportCall};

    fn quick_config() -> SessionConfig {
        SessionConfig { settle: Duration::ZERO, ..SessionConfig::default() }
    }

    fn handshake_calls() -> Vec<TransportCall> {
        AuthStep::SEQUENCE.iter().map(|&s| TransportCall::Authorize(s)).collect()
    }

    // ── discovery ────────────────────────────────────────────────────────
    #[test]
    fn select_skips_non_buzz_and_excluded() {
        let found = vec![
            PeripheralInfo::new("Headphones", "AA:AA:AA:AA:AA:AA"),
            PeripheralInfo::new("Buzz 1", "BB:BB:BB:BB:BB:BB"),
            PeripheralInfo::new("Buzz 2", "CC:CC:CC:CC:CC:CC"),
        ];
        let none = HashSet::new();
        assert_eq!(select_device(&found, "Buzz", &none).unwrap().address, "BB:BB:BB:BB:BB:BB");

        let exclude: HashSet<String> = ["BB:BB:BB:BB:BB:BB".to_string()].into_iter().collect();
        assert_eq!(select_device(&found, "Buzz", &exclude).unwrap().address, "CC:CC:CC:CC:CC:CC");
    }

    #[tokio::test]
    async fn no_matching_device_is_fatal() {
        let sim = SimulatedBuzz::with_peripherals(vec![PeripheralInfo::new("Mouse", "11:11:11:11:11:11")]);
        let log = sim.log();
        let err = BuzzSession::establish(sim, quick_config()).await.err().unwrap();
        assert!(matches!(err, SessionError::NoDeviceFound { .. }));
        assert_eq!(log.calls(), vec![TransportCall::Discover]);
    }

    #[tokio::test]
    async fn all_devices_excluded_is_fatal() {
        let sim = SimulatedBuzz::new();
        let mut cfg = quick_config();
        cfg.exclude.insert("00:00:00:00:00:01".to_string());
        let err = BuzzSession::establish(sim, cfg).await.err().unwrap();
        assert!(matches!(err, SessionError::NoDeviceFound { excluded: 1, .. }));
    }

    // ── state machine ────────────────────────────────────────────────────
    #[tokio::test]
    async fn advance_walks_every_state() {
        let mut session = BuzzSession::new(SimulatedBuzz::new(), quick_config());
        assert_eq!(session.state(), &SessionState::Discovering);

        let mut seen = vec![session.state().name()];
        while !session.is_streaming() {
            seen.push(session.advance().await.unwrap().name());
        }
        assert_eq!(
            seen,
            vec!["discovering", "connecting", "authorizing", "authorizing",
                 "authorizing", "authorizing", "streaming"]
        );
        assert_eq!(session.address(), Some("00:00:00:00:00:01"));
    }

    #[tokio::test]
    async fn handshake_runs_in_fixed_order() {
        let sim = SimulatedBuzz::new();
        let log = sim.log();
        let session = BuzzSession::establish(sim, quick_config()).await.unwrap();
        assert!(session.is_streaming());

        let mut expected = vec![
            TransportCall::Discover,
            TransportCall::Connect("00:00:00:00:00:01".to_string()),
        ];
        expected.extend(handshake_calls());
        assert_eq!(log.calls(), expected);
    }

    #[tokio::test]
    async fn failing_step_short_circuits_the_rest() {
        let sim = SimulatedBuzz::new().failing_at(FailurePoint::Authorize(AuthStep::AcceptApiTerms));
        let log = sim.log();
        let err = BuzzSession::establish(sim, quick_config()).await.err().unwrap();
        assert!(matches!(
            err,
            SessionError::Authorization { step: AuthStep::AcceptApiTerms, .. }
        ));

        let calls = log.calls();
        assert!(calls.contains(&TransportCall::Authorize(AuthStep::RequestDeveloperAuthorization)));
        assert!(calls.contains(&TransportCall::Authorize(AuthStep::AcceptApiTerms)));
        assert!(!calls.contains(&TransportCall::Authorize(AuthStep::PauseDeviceAlgorithm)));
        assert!(!calls.contains(&TransportCall::Authorize(AuthStep::ClearMotorQueue)));
        assert_eq!(calls.last(), Some(&TransportCall::Disconnect));
    }

    #[tokio::test]
    async fn connect_failure_releases_and_fails() {
        let sim = SimulatedBuzz::new().failing_at(FailurePoint::Connect);
        let log = sim.log();
        let mut session = BuzzSession::new(sim, quick_config());
        session.advance().await.unwrap();
        let err = session.advance().await.err().unwrap();
        assert!(matches!(err, SessionError::Connect { .. }));
        assert_eq!(session.state(), &SessionState::Failed);
        assert_eq!(log.calls().last(), Some(&TransportCall::Disconnect));

        // Terminal: further advances do nothing.
        assert_eq!(session.advance().await.unwrap(), &SessionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_delay_precedes_handshake() {
        let cfg = SessionConfig { settle: Duration::from_secs(1), ..SessionConfig::default() };
        let start = tokio::time::Instant::now();
        BuzzSession::establish(SimulatedBuzz::new(), cfg).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    // ── streaming ────────────────────────────────────────────────────────
    #[tokio::test]
    async fn send_before_streaming_is_rejected() {
        let mut session = BuzzSession::new(SimulatedBuzz::new(), quick_config());
        let err = session.send(&ActuationVector::ZERO).await.err().unwrap();
        assert!(matches!(err, SessionError::NotStreaming { state: "discovering" }));
    }

    #[tokio::test]
    async fn sends_arrive_in_order() {
        let sim = SimulatedBuzz::new();
        let log = sim.log();
        let mut session = BuzzSession::establish(sim, quick_config()).await.unwrap();
        let a = ActuationVector::new([1, 2, 3, 4]);
        let b = ActuationVector::new([5, 6, 7, 8]);
        session.send(&a).await.unwrap();
        session.send(&b).await.unwrap();
        assert_eq!(log.sent(), vec![a, b]);
    }

    #[tokio::test]
    async fn send_error_is_returned_not_retried() {
        let sim = SimulatedBuzz::new().failing_at(FailurePoint::Vibrate);
        let log = sim.log();
        let mut session = BuzzSession::establish(sim, quick_config()).await.unwrap();
        let err = session.send(&ActuationVector::ZERO).await.err().unwrap();
        assert!(matches!(err, SessionError::Send(_)));
        assert_eq!(log.sent().len(), 1);
        assert!(session.is_streaming());
    }

    // ── shutdown ─────────────────────────────────────────────────────────
    #[tokio::test]
    async fn shutdown_mid_send_resumes_once() {
        let sim = SimulatedBuzz::new().with_send_latency(Duration::from_secs(60));
        let log = sim.log();
        let mut session = BuzzSession::establish(sim, quick_config()).await.unwrap();
        let (trigger, mut shutdown) = shutdown_channel();

        let fire = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
            trigger
        });

        let outcome = session
            .send_or_shutdown(&ActuationVector::new([9, 9, 9, 9]), &mut shutdown)
            .await
            .unwrap();
        let _trigger = fire.await.unwrap();

        assert_eq!(outcome, SendOutcome::Cancelled);
        assert_eq!(session.state(), &SessionState::Closed);
        assert_eq!(log.resume_count(), 1);
        assert_eq!(log.sent().len(), 1);

        // A closed session accepts no further sends and does not resume again.
        assert!(session.send(&ActuationVector::ZERO).await.is_err());
        session.resume_and_close().await.unwrap();
        assert_eq!(log.resume_count(), 1);
        assert_eq!(log.sent().len(), 1);
    }

    #[tokio::test]
    async fn send_completes_when_shutdown_idle() {
        let mut session = BuzzSession::establish(SimulatedBuzz::new(), quick_config()).await.unwrap();
        let (_trigger, mut shutdown) = shutdown_channel();
        let outcome = session
            .send_or_shutdown(&ActuationVector::new([1, 1, 1, 1]), &mut shutdown)
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Sent);
        assert!(session.is_streaming());
    }

    // ── interrupted bring-up ─────────────────────────────────────────────
    async fn establish_interrupted(sim: SimulatedBuzz) -> Option<BuzzSession<SimulatedBuzz>> {
        let (trigger, mut shutdown) = shutdown_channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.trigger();
        });
        BuzzSession::establish_or_shutdown(sim, quick_config(), &mut shutdown).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_hung_connect() {
        let sim = SimulatedBuzz::new().stalling_at(FailurePoint::Connect);
        let log = sim.log();
        assert!(establish_interrupted(sim).await.is_none());
        assert_eq!(
            log.calls(),
            vec![
                TransportCall::Discover,
                TransportCall::Connect("00:00:00:00:00:01".into()),
                TransportCall::Disconnect,
            ]
        );
        assert_eq!(log.resume_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_after_pause_step_resumes_algorithm() {
        let sim = SimulatedBuzz::new().stalling_at(FailurePoint::Authorize(AuthStep::ClearMotorQueue));
        let log = sim.log();
        assert!(establish_interrupted(sim).await.is_none());
        assert_eq!(log.resume_count(), 1);
        assert_eq!(log.calls().last(), Some(&TransportCall::Disconnect));
        assert!(log.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_pause_step_does_not_resume() {
        let sim = SimulatedBuzz::new().stalling_at(FailurePoint::Authorize(AuthStep::AcceptApiTerms));
        let log = sim.log();
        assert!(establish_interrupted(sim).await.is_none());
        assert_eq!(log.resume_count(), 0);
        assert_eq!(log.calls().last(), Some(&TransportCall::Disconnect));
    }

    #[tokio::test]
    async fn untriggered_shutdown_reaches_streaming() {
        let (_trigger, mut shutdown) = shutdown_channel();
        let session = BuzzSession::establish_or_shutdown(SimulatedBuzz::new(), quick_config(), &mut shutdown)
            .await
            .unwrap()
            .unwrap();
        assert!(session.is_streaming());
    }

    #[tokio::test]
    async fn resume_failure_ends_failed() {
        let sim = SimulatedBuzz::new().failing_at(FailurePoint::Resume);
        let mut session = BuzzSession::establish(sim, quick_config()).await.unwrap();
        let err = session.resume_and_close().await.err().unwrap();
        assert!(matches!(err, SessionError::Resume(_)));
        assert_eq!(session.state(), &SessionState::Failed);
    }
}
