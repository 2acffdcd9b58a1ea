//! Projection model: a fitted PCA transform stored as JSON.
//!
//! ```json
//! {
//!   "mean":       [24 floats],
//!   "components": [[24 floats], [24 floats], [24 floats], [24 floats]],
//!   "explained_variance": [4 floats],   // optional
//!   "whiten": false                     // optional
//! }
//! ```
//!
//! `transform(x) = (x − mean) · componentsᵀ`, divided per output by
//! `sqrt(explained_variance)` when `whiten` is set.  Fitting happens
//! elsewhere; this crate only loads, validates and applies the result.

use std::fs;
use std::path::Path;

use buzz_session::BUZZ_MOTOR_COUNT;
use hand_frame::FEATURE_LEN;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EncodeError, ModelError};

#[derive(Serialize, Deserialize)]
struct ModelFile {
    mean:       Vec<f64>,
    components: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    explained_variance: Option<Vec<f64>>,
    #[serde(default)]
    whiten:     bool,
}

/// Immutable fitted projection `FEATURE_LEN → BUZZ_MOTOR_COUNT`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionModel {
    mean:       Array1<f64>,
    /// Shape `(BUZZ_MOTOR_COUNT, FEATURE_LEN)`, one component per row.
    components: Array2<f64>,
    explained_variance: Option<Array1<f64>>,
    whiten:     bool,
}

impl ProjectionModel {
    /// Build and validate a non-whitening model.
    pub fn new(mean: Array1<f64>, components: Array2<f64>) -> Result<Self, ModelError> {
        let model = ProjectionModel { mean, components, explained_variance: None, whiten: false };
        model.validate()?;
        Ok(model)
    }

    /// Divide each output by `sqrt(explained_variance)`.
    pub fn with_whitening(mut self, explained_variance: Array1<f64>) -> Result<Self, ModelError> {
        self.explained_variance = Some(explained_variance);
        self.whiten = true;
        self.validate()?;
        Ok(self)
    }

    /// Load a model file.  Any failure here is fatal to the caller.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_json(&text)?;
        info!(path = %path.display(), whiten = model.whiten, "projection model loaded");
        Ok(model)
    }

    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let file: ModelFile = serde_json::from_str(text)?;

        let rows = file.components.len();
        let mut flat = Vec::with_capacity(rows * FEATURE_LEN);
        for row in &file.components {
            if row.len() != FEATURE_LEN {
                return Err(ModelError::Dimension {
                    what:     "component length",
                    expected: FEATURE_LEN,
                    got:      row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        let components = Array2::from_shape_vec((rows, FEATURE_LEN), flat).map_err(|_| {
            ModelError::Dimension { what: "components", expected: BUZZ_MOTOR_COUNT, got: rows }
        })?;

        let model = ProjectionModel {
            mean: Array1::from(file.mean),
            components,
            explained_variance: file.explained_variance.map(Array1::from),
            whiten: file.whiten,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        let file = ModelFile {
            mean:       self.mean.to_vec(),
            components: self.components.rows().into_iter().map(|r| r.to_vec()).collect(),
            explained_variance: self.explained_variance.as_ref().map(|v| v.to_vec()),
            whiten:     self.whiten,
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.components.ncols()
    }

    pub fn output_dim(&self) -> usize {
        self.components.nrows()
    }

    /// Project `(n, FEATURE_LEN)` rows to `(n, BUZZ_MOTOR_COUNT)`.
    pub fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>, EncodeError> {
        if features.ncols() != self.input_dim() {
            return Err(EncodeError::InputDim { expected: self.input_dim(), got: features.ncols() });
        }
        let centered = features - &self.mean;
        let mut projected = centered.dot(&self.components.t());
        if self.whiten {
            if let Some(var) = &self.explained_variance {
                projected /= &var.mapv(f64::sqrt);
            }
        }
        Ok(projected)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.mean.len() != FEATURE_LEN {
            return Err(ModelError::Dimension {
                what: "mean", expected: FEATURE_LEN, got: self.mean.len(),
            });
        }
        if self.components.ncols() != FEATURE_LEN {
            return Err(ModelError::Dimension {
                what: "component length", expected: FEATURE_LEN, got: self.components.ncols(),
            });
        }
        if self.components.nrows() != BUZZ_MOTOR_COUNT {
            return Err(ModelError::Dimension {
                what: "components", expected: BUZZ_MOTOR_COUNT, got: self.components.nrows(),
            });
        }
        if !self.mean.iter().chain(self.components.iter()).all(|v| v.is_finite()) {
            return Err(ModelError::InvalidValues { what: "mean/components" });
        }
        if self.whiten {
            let var = self.explained_variance.as_ref().ok_or(ModelError::Dimension {
                what: "explained_variance", expected: BUZZ_MOTOR_COUNT, got: 0,
            })?;
            if var.len() != BUZZ_MOTOR_COUNT {
                return Err(ModelError::Dimension {
                    what: "explained_variance", expected: BUZZ_MOTOR_COUNT, got: var.len(),
                });
            }
            if !var.iter().all(|v| v.is_finite() && *v > 0.0) {
                return Err(ModelError::InvalidValues { what: "explained_variance" });
            }
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Picks features 0..4 unchanged: palm normal x/y/z, palm position x.
    pub(crate) fn selector_model() -> ProjectionModel {
        let mut components = Array2::zeros((BUZZ_MOTOR_COUNT, FEATURE_LEN));
        for k in 0..BUZZ_MOTOR_COUNT {
            components[[k, k]] = 1.0;
        }
        ProjectionModel::new(Array1::zeros(FEATURE_LEN), components).unwrap()
    }

    #[test]
    fn transform_centers_then_projects() {
        let mut mean = Array1::zeros(FEATURE_LEN);
        mean[0] = 1.0;
        let model = ProjectionModel::new(mean, selector_model().components.clone()).unwrap();

        let mut x = Array2::zeros((1, FEATURE_LEN));
        x[[0, 0]] = 3.0;
        x[[0, 2]] = -4.0;
        let y = model.transform(&x).unwrap();
        assert_eq!(y.row(0).to_vec(), vec![2.0, 0.0, -4.0, 0.0]);
    }

    #[test]
    fn whitening_divides_by_std() {
        let model = selector_model()
            .with_whitening(Array1::from(vec![4.0, 1.0, 1.0, 1.0]))
            .unwrap();
        let mut x = Array2::zeros((1, FEATURE_LEN));
        x[[0, 0]] = 6.0;
        assert_eq!(model.transform(&x).unwrap()[[0, 0]], 3.0);
    }

    #[test]
    fn wrong_input_width_is_rejected() {
        let x = Array2::zeros((1, FEATURE_LEN - 1));
        assert!(matches!(
            selector_model().transform(&x),
            Err(EncodeError::InputDim { got, .. }) if got == FEATURE_LEN - 1
        ));
    }

    // ── storage ──────────────────────────────────────────────────────────
    #[test]
    fn save_then_load_gives_same_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pca_encoder.json");
        let model = selector_model()
            .with_whitening(Array1::from(vec![2.0, 3.0, 4.0, 5.0]))
            .unwrap();
        model.save(&path).unwrap();
        assert_eq!(ProjectionModel::load(&path).unwrap(), model);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectionModel::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }));
    }

    #[test]
    fn corrupt_file_is_format_error() {
        let err = ProjectionModel::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ModelError::Format(_)));
    }

    #[test]
    fn wrong_output_dimension_is_rejected() {
        let text = serde_json::json!({
            "mean": vec![0.0; FEATURE_LEN],
            "components": vec![vec![0.0; FEATURE_LEN]; 3],
        })
        .to_string();
        assert!(matches!(
            ProjectionModel::from_json(&text),
            Err(ModelError::Dimension { what: "components", got: 3, .. })
        ));
    }

    #[test]
    fn whiten_without_variance_is_rejected() {
        let text = serde_json::json!({
            "mean": vec![0.0; FEATURE_LEN],
            "components": vec![vec![0.0; FEATURE_LEN]; BUZZ_MOTOR_COUNT],
            "whiten": true,
        })
        .to_string();
        assert!(ProjectionModel::from_json(&text).is_err());
    }
}
