//! Error types for model storage and encoding.

use std::path::PathBuf;

use thiserror::Error;

/// Problems loading, validating or saving a projection model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Cannot access model file {path}: {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model file is not a valid projection model: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Model {what} has dimension {got} (expected {expected})")]
    Dimension {
        what:     &'static str,
        expected: usize,
        got:      usize,
    },

    #[error("Model {what} contains non-finite or non-positive values")]
    InvalidValues {
        what: &'static str,
    },
}

/// Per-frame encoding failures.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Feature vector has {got} values (expected {expected})")]
    InputDim {
        expected: usize,
        got:      usize,
    },

    #[error("Projection produced non-finite values")]
    NonFinite,
}
