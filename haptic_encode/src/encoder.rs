//! Projection encoder: feature tensor → motor intensities.

use std::sync::Arc;

use buzz_session::{ActuationVector, BUZZ_MAX_VIBRATION_QUANTIZATION, BUZZ_MOTOR_COUNT};
use hand_frame::{flatten, flatten_batch, FeatureBatch, FeatureTensor};
use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::error::EncodeError;
use crate::model::ProjectionModel;

/// Applies one shared, read-only [`ProjectionModel`].
#[derive(Clone, Debug)]
pub struct Encoder {
    model: Arc<ProjectionModel>,
}

impl Encoder {
    pub fn new(model: Arc<ProjectionModel>) -> Self {
        Encoder { model }
    }

    pub fn model(&self) -> &ProjectionModel {
        &self.model
    }

    /// Encode one `8 × 3` tensor.
    pub fn encode(&self, tensor: &FeatureTensor) -> Result<ActuationVector, EncodeError> {
        self.encode_flat(&flatten(tensor))
    }

    /// Encode one already-flattened feature vector.
    pub fn encode_flat(&self, features: &Array1<f64>) -> Result<ActuationVector, EncodeError> {
        let row = features.view().insert_axis(Axis(0)).to_owned();
        let scaled = scale_to_actuator_range(&self.model.transform(&row)?)?;
        // one input row always projects to one output row
        Ok(quantize(scaled.row(0)))
    }

    /// `None` in, `None` out; the caller substitutes the rest vector.
    pub fn encode_optional(
        &self,
        tensor: Option<&FeatureTensor>,
    ) -> Result<Option<ActuationVector>, EncodeError> {
        tensor.map(|t| self.encode(t)).transpose()
    }

    /// Encode a batch, rescaling over the min/max of the whole batch.
    pub fn encode_batch(&self, batch: &FeatureBatch) -> Result<Vec<ActuationVector>, EncodeError> {
        let flat = flatten_batch(batch).map_err(|_| EncodeError::InputDim {
            expected: self.model.input_dim(),
            got:      batch.len(),
        })?;
        self.encode_rows(&flat)
    }

    fn encode_rows(&self, rows: &Array2<f64>) -> Result<Vec<ActuationVector>, EncodeError> {
        let projected = self.model.transform(rows)?;
        let scaled = scale_to_actuator_range(&projected)?;
        Ok(scaled.rows().into_iter().map(quantize).collect())
    }
}

/// Linearly map `values` from their own `[min, max]` onto
/// `[0, BUZZ_MAX_VIBRATION_QUANTIZATION]`.
///
/// A constant input (min == max) maps to all zeros.  Works on halved values
/// so that `max - min` stays finite for any finite input.
pub fn scale_to_actuator_range(values: &Array2<f64>) -> Result<Array2<f64>, EncodeError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(EncodeError::NonFinite);
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min) / 2.0;
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max) / 2.0;
    let half_span = max - min;
    if half_span <= 0.0 {
        return Ok(Array2::zeros(values.raw_dim()));
    }
    let top = f64::from(BUZZ_MAX_VIBRATION_QUANTIZATION);
    Ok(values.mapv(|v| ((v / 2.0 - min) / half_span * top).clamp(0.0, top)))
}

/// Truncate one scaled row to motor intensities.
fn quantize(row: ArrayView1<'_, f64>) -> ActuationVector {
    let mut motors = [0u8; BUZZ_MOTOR_COUNT];
    for (m, v) in motors.iter_mut().zip(row.iter()) {
        *m = *v as u8;
    }
    ActuationVector::new(motors)
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
