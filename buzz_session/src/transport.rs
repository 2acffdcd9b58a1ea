//! The capability set a device binding must provide to drive a session.
//!
//! The session never touches Bluetooth directly; it talks to a
//! [`BuzzTransport`].  Bindings exist for a simulated device (always) and for
//! real hardware (`ble` feature).

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::vector::ActuationVector;

// ════════════════════════════════════════════════════════════════════════════
// PeripheralInfo
// ════════════════════════════════════════════════════════════════════════════

/// One advertising peripheral seen during discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeripheralInfo {
    pub name:    String,
    /// Hardware address, e.g. `EB:CA:85:38:19:1D`.
    pub address: String,
}

impl PeripheralInfo {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        PeripheralInfo { name: name.into(), address: address.into() }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// AuthStep: the developer handshake, in order
// ════════════════════════════════════════════════════════════════════════════

/// One step of the developer-control handshake.  Ordered as performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthStep {
    RequestDeveloperAuthorization,
    AcceptApiTerms,
    /// Stop the firmware's own sound-to-touch output so external frames are
    /// not mixed with it.
    PauseDeviceAlgorithm,
    ClearMotorQueue,
}

impl AuthStep {
    /// Every step, in the order the device requires.
    pub const SEQUENCE: [AuthStep; 4] = [
        AuthStep::RequestDeveloperAuthorization,
        AuthStep::AcceptApiTerms,
        AuthStep::PauseDeviceAlgorithm,
        AuthStep::ClearMotorQueue,
    ];

    pub fn first() -> AuthStep {
        Self::SEQUENCE[0]
    }

    /// The step after this one, or `None` after the last.
    pub fn next(self) -> Option<AuthStep> {
        let i = Self::SEQUENCE.iter().position(|&s| s == self)?;
        Self::SEQUENCE.get(i + 1).copied()
    }

    /// Buzz command-line text for this step.
    pub fn command(self) -> &'static str {
        match self {
            AuthStep::RequestDeveloperAuthorization => "auth as developer",
            AuthStep::AcceptApiTerms                => "accept",
            AuthStep::PauseDeviceAlgorithm          => "audio stop",
            AuthStep::ClearMotorQueue               => "motors clear_queue",
        }
    }
}

impl fmt::Display for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthStep::RequestDeveloperAuthorization => "request developer authorization",
            AuthStep::AcceptApiTerms                => "accept API terms",
            AuthStep::PauseDeviceAlgorithm          => "pause device algorithm",
            AuthStep::ClearMotorQueue               => "clear motor queue",
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TransportError
// ════════════════════════════════════════════════════════════════════════════

/// Failures reported by a device binding.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No usable radio adapter.
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// An operation that needs a link was called without one.
    #[error("Not connected to a device")]
    NotConnected,

    /// The address was not among the discovered peripherals.
    #[error("Unknown peripheral {0}")]
    UnknownPeripheral(String),

    /// The device lacks the command characteristic.
    #[error("Device at {0} exposes no command characteristic")]
    MissingCharacteristic(String),

    /// The device refused or failed a command.
    #[error("Device rejected `{command}`: {reason}")]
    Rejected {
        command: String,
        reason:  String,
    },

    #[cfg(feature = "ble")]
    #[error("Bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),
}

// ════════════════════════════════════════════════════════════════════════════
// BuzzTransport
// ════════════════════════════════════════════════════════════════════════════

/// Device binding used by [`crate::BuzzSession`].
///
/// Calls are awaited one at a time; implementations need not support
/// concurrent operations.
#[async_trait]
pub trait BuzzTransport: Send {
    /// Scan for advertising peripherals.
    async fn discover(&mut self) -> Result<Vec<PeripheralInfo>, TransportError>;

    /// Open the link to `address`.
    async fn connect(&mut self, address: &str) -> Result<(), TransportError>;

    /// Perform one handshake step.
    async fn authorize(&mut self, step: AuthStep) -> Result<(), TransportError>;

    /// Drive all motors with `frame`.
    async fn vibrate(&mut self, frame: &ActuationVector) -> Result<(), TransportError>;

    /// Give motor control back to the firmware's own algorithm.
    async fn resume_algorithm(&mut self) -> Result<(), TransportError>;

    /// Drop the link.  Safe to call on a partial or absent connection.
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
impl BuzzTransport for Box<dyn BuzzTransport> {
    async fn discover(&mut self) -> Result<Vec<PeripheralInfo>, TransportError> {
        (**self).discover().await
    }
    async fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        (**self).connect(address).await
    }
    async fn authorize(&mut self, step: AuthStep) -> Result<(), TransportError> {
        (**self).authorize(step).await
    }
    async fn vibrate(&mut self, frame: &ActuationVector) -> Result<(), TransportError> {
        (**self).vibrate(frame).await
    }
    async fn resume_algorithm(&mut self) -> Result<(), TransportError> {
        (**self).resume_algorithm().await
    }
    async fn disconnect(&mut self) -> Result<(), TransportError> {
        (**self).disconnect().await
    }
}
