//! Simulated Buzz: no radio, every call recorded.
//!
//! Used when no hardware is attached (the default build) and by every
//! session, pipeline and trainer test.  Failures can be injected at any
//! transport operation and sends can be given an artificial latency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::transport::{AuthStep, BuzzTransport, PeripheralInfo, TransportError};
use crate::vector::ActuationVector;

// ════════════════════════════════════════════════════════════════════════════
// Call log
// ════════════════════════════════════════════════════════════════════════════

/// One transport operation, as observed by the simulator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCall {
    Discover,
    Connect(String),
    Authorize(AuthStep),
    Vibrate(ActuationVector),
    ResumeAlgorithm,
    Disconnect,
}

/// Shared, append-only record of transport calls.  Clones see the same log.
#[derive(Clone, Debug, Default)]
pub struct CallLog(Arc<Mutex<Vec<TransportCall>>>);

impl CallLog {
    fn push(&self, call: TransportCall) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.0.lock().clone()
    }

    /// Every frame passed to `vibrate`, in order.
    pub fn sent(&self) -> Vec<ActuationVector> {
        self.0
            .lock()
            .iter()
            .filter_map(|c| match c {
                TransportCall::Vibrate(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    pub fn resume_count(&self) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|c| **c == TransportCall::ResumeAlgorithm)
            .count()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SimulatedBuzz
// ════════════════════════════════════════════════════════════════════════════

/// Where an injected failure fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePoint {
    Discover,
    Connect,
    Authorize(AuthStep),
    Vibrate,
    Resume,
}

pub struct SimulatedBuzz {
    peripherals:  Vec<PeripheralInfo>,
    fail_at:      Option<FailurePoint>,
    stall_at:     Option<FailurePoint>,
    send_latency: Duration,
    connected:    Option<String>,
    log:          CallLog,
}

impl Default for SimulatedBuzz {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBuzz {
    /// A single simulated Buzz advertising as `Buzz SIM`.
    pub fn new() -> Self {
        Self::with_peripherals(vec![PeripheralInfo::new("Buzz SIM", "00:00:00:00:00:01")])
    }

    pub fn with_peripherals(peripherals: Vec<PeripheralInfo>) -> Self {
        SimulatedBuzz {
            peripherals,
            fail_at:      None,
            stall_at:     None,
            send_latency: Duration::ZERO,
            connected:    None,
            log:          CallLog::default(),
        }
    }

    /// Make the operation at `point` fail.
    pub fn failing_at(mut self, point: FailurePoint) -> Self {
        self.fail_at = Some(point);
        self
    }

    /// Make the operation at `point` never complete, like a radio write
    /// that gets no reply.
    pub fn stalling_at(mut self, point: FailurePoint) -> Self {
        self.stall_at = Some(point);
        self
    }

    /// Delay every `vibrate` by `latency`.
    pub fn with_send_latency(mut self, latency: Duration) -> Self {
        self.send_latency = latency;
        self
    }

    /// Handle to the call log; stays valid after the simulator is moved.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn check(&self, point: FailurePoint, command: &str) -> Result<(), TransportError> {
        if self.fail_at == Some(point) {
            return Err(TransportError::Rejected {
                command: command.to_string(),
                reason:  "injected failure".to_string(),
            });
        }
        Ok(())
    }

    async fn stall(&self, point: FailurePoint) {
        if self.stall_at == Some(point) {
            debug!(?point, "[sim] stalling");
            std::future::pending::<()>().await;
        }
    }

    fn require_link(&self) -> Result<(), TransportError> {
        match self.connected {
            Some(_) => Ok(()),
            None    => Err(TransportError::NotConnected),
        }
    }
}

#[async_trait]
impl BuzzTransport for SimulatedBuzz {
    async fn discover(&mut self) -> Result<Vec<PeripheralInfo>, TransportError> {
        self.log.push(TransportCall::Discover);
        self.stall(FailurePoint::Discover).await;
        self.check(FailurePoint::Discover, "scan")?;
        Ok(self.peripherals.clone())
    }

    async fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        self.log.push(TransportCall::Connect(address.to_string()));
        self.stall(FailurePoint::Connect).await;
        self.check(FailurePoint::Connect, "connect")?;
        if !self.peripherals.iter().any(|p| p.address == address) {
            return Err(TransportError::UnknownPeripheral(address.to_string()));
        }
        info!(address, "[sim] connected");
        self.connected = Some(address.to_string());
        Ok(())
    }

    async fn authorize(&mut self, step: AuthStep) -> Result<(), TransportError> {
        self.log.push(TransportCall::Authorize(step));
        self.require_link()?;
        self.stall(FailurePoint::Authorize(step)).await;
        self.check(FailurePoint::Authorize(step), step.command())
    }

    async fn vibrate(&mut self, frame: &ActuationVector) -> Result<(), TransportError> {
        self.log.push(TransportCall::Vibrate(*frame));
        self.require_link()?;
        self.stall(FailurePoint::Vibrate).await;
        self.check(FailurePoint::Vibrate, "motors vibrate")?;
        if !self.send_latency.is_zero() {
            tokio::time::sleep(self.send_latency).await;
        }
        debug!(%frame, "[sim] vibrate");
        Ok(())
    }

    async fn resume_algorithm(&mut self) -> Result<(), TransportError> {
        self.log.push(TransportCall::ResumeAlgorithm);
        self.require_link()?;
        self.stall(FailurePoint::Resume).await;
        self.check(FailurePoint::Resume, "audio start")
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.log.push(TransportCall::Disconnect);
        if let Some(address) = self.connected.take() {
            info!(address = %address, "[sim] disconnected");
        }
        Ok(())
    }
}
