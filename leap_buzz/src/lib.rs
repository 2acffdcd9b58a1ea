//! # leap_buzz
//!
//! Hand tracking to haptics: stream one tracked hand from an Ultraleap
//! controller onto the four motors of a Neosensory Buzz wristband, or drill
//! the operator on a fixed set of gesture patterns.
//!
//! ## Modes
//!
//! | Mode | Input | Buzz output |
//! |---|---|---|
//! | `live` | tracking frames (WebSocket, replay file, LeapC) | encoded hand pose, ≤ 10 frames/s |
//! | `train` | none | built-in gesture vectors, one per round |
//!
//! ## Live data flow
//!
//! 1. [`source`] yields raw JSON messages.
//! 2. [`scheduler::FrameScheduler`] admits at most one per 100 ms.
//! 3. [`pipeline::LivePipeline`] pre-checks, extracts the `8 × 3` feature
//!    tensor and encodes it; any failure becomes the rest vector.
//! 4. The vector is sent through a streaming `BuzzSession`.
//!
//! Ctrl-C at any point hands motor control back to the device before exit.
//!
//! ## Feature flags
//!
//! * (default): simulated Buzz, WebSocket or replayed frames.
//! * `ble`: real Buzz over Bluetooth LE.
//! * `leap`: read frames straight from LeapC instead of the WebSocket.

pub mod app;
pub mod gesture;
pub mod pipeline;
pub mod scheduler;
pub mod source;
