//! # haptic_encode
//!
//! Turns an `8 × 3` hand feature tensor into a Buzz [`ActuationVector`]:
//!
//! 1. flatten to 24 values (row-major),
//! 2. project with a pre-fitted PCA-style [`ProjectionModel`] to one value
//!    per motor,
//! 3. rescale from the output's own `[min, max]` to `[0, 255]`,
//! 4. truncate to integers.
//!
//! Step 3 is per call: a batch is rescaled over the whole batch, so the same
//! frame can encode differently alone and inside a batch.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use haptic_encode::{Encoder, ProjectionModel};
//!
//! let model = ProjectionModel::load("pca_encoder.json").unwrap();
//! let encoder = Encoder::new(Arc::new(model));
//! # let tensor = ndarray::Array2::<f64>::zeros((8, 3));
//! let frame = encoder.encode(&tensor).unwrap();
//! ```

mod encoder;
mod error;
mod model;

pub use buzz_session::ActuationVector;
pub use encoder::{scale_to_actuator_range, Encoder};
pub use error::{EncodeError, ModelError};
pub use model::ProjectionModel;
