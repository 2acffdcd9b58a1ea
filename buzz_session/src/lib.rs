//! # buzz_session
//!
//! One exclusive session with a Neosensory Buzz wristband: find it, connect,
//! take developer control, stream motor frames, and hand control back to the
//! device on shutdown.
//!
//! ## Lifecycle
//!
//! ```text
//! Discovering → Connecting → Authorizing(×4) → Streaming → Closed
//!      └──────────────┴──────────────┴─────────────→ Failed
//! ```
//!
//! | Authorization step | Buzz command |
//! |---|---|
//! | request developer authorization | `auth as developer` |
//! | accept API terms | `accept` |
//! | pause device algorithm | `audio stop` |
//! | clear motor queue | `motors clear_queue` |
//!
//! ## Feature flags
//!
//! * (default): [`SimulatedBuzz`] only: logs frames, records every call.
//! * `ble`: `BleBuzz`: a real Buzz over Bluetooth LE via `btleplug`.

#[cfg(feature = "ble")]
pub mod ble;
pub mod session;
pub mod shutdown;
pub mod sim;
pub mod transport;
pub mod vector;

#[cfg(feature = "ble")]
pub use ble::BleBuzz;
pub use session::{BuzzSession, SendOutcome, SessionConfig, SessionError, SessionState};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use sim::{CallLog, FailurePoint, SimulatedBuzz, TransportCall};
pub use transport::{AuthStep, BuzzTransport, PeripheralInfo, TransportError};
pub use vector::{ActuationVector, BUZZ_MAX_VIBRATION_QUANTIZATION, BUZZ_MOTOR_COUNT};
