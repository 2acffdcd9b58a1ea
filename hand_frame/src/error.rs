//! Error types for frame parsing and feature extraction.

use thiserror::Error;

/// Errors raised while turning a raw tracking message into features.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The message is not valid JSON, or a field has the wrong JSON type.
    #[error("Malformed tracking frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A vector property does not have exactly three components.
    #[error("Property `{property}` has {got} components (expected {expected})")]
    ComponentCount {
        property: &'static str,
        expected: usize,
        got: usize,
    },

    /// A handedness label other than `left` / `right`.
    #[error("Unknown hand label `{0}` (expected `left` or `right`)")]
    UnknownHand(String),

    /// Reshaping a feature batch failed.
    #[error("Feature reshape failed: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
