//! Feature extraction: one tracking frame → one `8 × 3` landmark tensor.

use ndarray::{Array1, Array2, Array3, ArrayView1, Axis};
use tracing::debug;

use crate::frame::{HandType, TrackingFrame};
use crate::FrameError;

// ════════════════════════════════════════════════════════════════════════════
// Tensor shape
// ════════════════════════════════════════════════════════════════════════════

/// Hand-level rows: palm normal, palm position, wrist.
pub const HAND_ROWS: usize = 3;
/// Finger rows: one tip position per finger.
pub const FINGER_ROWS: usize = 5;
pub const TENSOR_ROWS: usize = HAND_ROWS + FINGER_ROWS;
/// x, y, z
pub const COMPONENTS: usize = 3;
/// Length of a flattened tensor.
pub const FEATURE_LEN: usize = TENSOR_ROWS * COMPONENTS;

/// One frame's landmarks, shape `(TENSOR_ROWS, COMPONENTS)`.
pub type FeatureTensor = Array2<f64>;
/// Several frames' landmarks, shape `(n, TENSOR_ROWS, COMPONENTS)`.
pub type FeatureBatch = Array3<f64>;

// ════════════════════════════════════════════════════════════════════════════
// Extraction
// ════════════════════════════════════════════════════════════════════════════

/// Extract the feature tensor of the `target` hand.
///
/// Returns `Ok(None)` when neither of the first two hands matches `target`.
/// Any hand or finger property with other than three components aborts the
/// frame with [`FrameError::ComponentCount`].
pub fn extract_features(
    frame:  &TrackingFrame,
    target: HandType,
) -> Result<Option<FeatureTensor>, FrameError> {
    let hand = match frame.select_hand(target) {
        Some(h) => h,
        None    => return Ok(None),
    };

    let mut tensor = FeatureTensor::zeros((TENSOR_ROWS, COMPONENTS));
    write_row(&mut tensor, 0, "palmNormal",   &hand.palm_normal)?;
    write_row(&mut tensor, 1, "palmPosition", &hand.palm_position)?;
    write_row(&mut tensor, 2, "wrist",        &hand.wrist)?;

    for (index, finger) in frame.fingers_of(hand.id) {
        check_components("tipPosition", &finger.tip_position)?;
        let row = HAND_ROWS + index;
        if row >= TENSOR_ROWS {
            debug!(index, hand_id = hand.id, "pointable past finger capacity, skipped");
            continue;
        }
        write_row(&mut tensor, row, "tipPosition", &finger.tip_position)?;
    }

    Ok(Some(tensor))
}

/// Parse `message` and extract the `target` hand.
pub fn extract_message(
    message: &str,
    target:  HandType,
) -> Result<Option<FeatureTensor>, FrameError> {
    let frame = TrackingFrame::parse(message)?;
    extract_features(&frame, target)
}

/// Extract a batch of frames, in order.
///
/// The batch is all-or-nothing: if any frame lacks the `target` hand the
/// whole batch is `Ok(None)`.
pub fn extract_batch(
    messages: &[&str],
    target:   HandType,
) -> Result<Option<FeatureBatch>, FrameError> {
    let mut batch = FeatureBatch::zeros((messages.len(), TENSOR_ROWS, COMPONENTS));
    for (i, message) in messages.iter().enumerate() {
        match extract_message(message, target)? {
            Some(tensor) => batch.index_axis_mut(Axis(0), i).assign(&tensor),
            None         => return Ok(None),
        }
    }
    Ok(Some(batch))
}

// ════════════════════════════════════════════════════════════════════════════
// Flattening
// ════════════════════════════════════════════════════════════════════════════

/// Row-major flatten of one tensor.
pub fn flatten(tensor: &FeatureTensor) -> Array1<f64> {
    tensor.iter().copied().collect()
}

/// Row-major flatten of every tensor in a batch: `(n, 8, 3)` → `(n, 24)`.
pub fn flatten_batch(batch: &FeatureBatch) -> Result<Array2<f64>, FrameError> {
    let n = batch.len_of(Axis(0));
    let per_frame = if n == 0 { FEATURE_LEN } else { batch.len() / n };
    let flat = Array2::from_shape_vec((n, per_frame), batch.iter().copied().collect())?;
    Ok(flat)
}

// ── helpers ─────────────────────────────────────────────────────────────────

fn check_components(property: &'static str, values: &[f64]) -> Result<(), FrameError> {
    if values.len() != COMPONENTS {
        return Err(FrameError::ComponentCount {
            property,
            expected: COMPONENTS,
            got: values.len(),
        });
    }
    Ok(())
}

fn write_row(
    tensor:   &mut FeatureTensor,
    row:      usize,
    property: &'static str,
    values:   &[f64],
) -> Result<(), FrameError> {
    check_components(property, values)?;
    tensor.row_mut(row).assign(&ArrayView1::from(values));
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PALM_NORMAL:   [f64; 3] = [0.237143, -0.946325, -0.21962];
    const PALM_POSITION: [f64; 3] = [-82.490501, 202.77829, 26.042208];
    const WRIST:         [f64; 3] = [-82.362137, 189.479279, 95.077568];
    const TIPS: [[f64; 3]; 5] = [
        [-15.075111, 178.282196, -9.779669],
        [-55.99604, 211.92009, -68.624962],
        [-88.151657, 201.456131, -77.498871],
        [-111.65979, 186.951691, -65.425003],
        [-129.974991, 175.578094, -39.394772],
    ];

    fn hand(id: i64, label: &str) -> serde_json::Value {
        json!({
            "id": id, "type": label,
            "palmNormal": PALM_NORMAL, "palmPosition": PALM_POSITION, "wrist": WRIST,
        })
    }

    fn fingers(hand_id: i64) -> Vec<serde_json::Value> {
        TIPS.iter()
            .map(|t| json!({ "handId": hand_id, "tipPosition": t }))
            .collect()
    }

    fn left_hand_frame() -> String {
        json!({ "hands": [hand(7, "left")], "pointables": fingers(7) }).to_string()
    }

    // ── single hand ──────────────────────────────────────────────────────
    #[test]
    fn five_finger_hand_fills_every_row() {
        let t = extract_message(&left_hand_frame(), HandType::Left).unwrap().unwrap();
        assert_eq!(t.dim(), (TENSOR_ROWS, COMPONENTS));
        assert_eq!(t.row(0).to_vec(), PALM_NORMAL.to_vec());
        assert_eq!(t.row(1).to_vec(), PALM_POSITION.to_vec());
        assert_eq!(t.row(2).to_vec(), WRIST.to_vec());
        for (i, tip) in TIPS.iter().enumerate() {
            assert_eq!(t.row(HAND_ROWS + i).to_vec(), tip.to_vec());
        }
    }

    #[test]
    fn wrong_hand_yields_none() {
        let out = extract_message(&left_hand_frame(), HandType::Right).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn no_hands_yields_none() {
        let out = extract_message(r#"{"hands":[],"pointables":[]}"#, HandType::Left).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn missing_fingers_stay_zero() {
        let msg = json!({
            "hands": [hand(7, "left")],
            "pointables": [{ "handId": 7, "tipPosition": TIPS[0] }],
        })
        .to_string();
        let t = extract_message(&msg, HandType::Left).unwrap().unwrap();
        assert_eq!(t.row(3).to_vec(), TIPS[0].to_vec());
        for row in 4..TENSOR_ROWS {
            assert!(t.row(row).iter().all(|&v| v == 0.0));
        }
    }

    // ── two hands ────────────────────────────────────────────────────────
    #[test]
    fn second_hand_selected_when_first_mismatches() {
        let mut pointables = fingers(1);
        pointables.extend(fingers(2));
        let msg = json!({
            "hands": [hand(1, "right"), hand(2, "left")],
            "pointables": pointables,
        })
        .to_string();

        let t = extract_message(&msg, HandType::Left).unwrap().unwrap();
        assert_eq!(t.row(0).to_vec(), PALM_NORMAL.to_vec());
        // Left-hand fingers sit at pointable indices 5..10, past the five
        // finger rows, so no finger row is written.
        for row in HAND_ROWS..TENSOR_ROWS {
            assert!(t.row(row).iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn other_hands_fingers_are_ignored() {
        let mut pointables = fingers(2);
        pointables.truncate(2);
        pointables.extend(fingers(1).into_iter().take(3));
        let msg = json!({
            "hands": [hand(1, "left"), hand(2, "right")],
            "pointables": pointables,
        })
        .to_string();

        let t = extract_message(&msg, HandType::Left).unwrap().unwrap();
        assert!(t.row(3).iter().all(|&v| v == 0.0));
        assert!(t.row(4).iter().all(|&v| v == 0.0));
        assert_eq!(t.row(5).to_vec(), TIPS[0].to_vec());
        assert_eq!(t.row(7).to_vec(), TIPS[2].to_vec());
    }

    // ── schema violations ────────────────────────────────────────────────
    #[test]
    fn short_palm_vector_fails_fast() {
        let msg = json!({
            "hands": [{ "id": 7, "type": "left", "palmNormal": [0.1, 0.2],
                        "palmPosition": PALM_POSITION, "wrist": WRIST }],
            "pointables": fingers(7),
        })
        .to_string();
        let err = extract_message(&msg, HandType::Left).unwrap_err();
        assert!(matches!(
            err,
            FrameError::ComponentCount { property: "palmNormal", got: 2, .. }
        ));
    }

    #[test]
    fn long_tip_vector_fails_fast() {
        let msg = json!({
            "hands": [hand(7, "left")],
            "pointables": [{ "handId": 7, "tipPosition": [1.0, 2.0, 3.0, 4.0] }],
        })
        .to_string();
        assert!(matches!(
            extract_message(&msg, HandType::Left),
            Err(FrameError::ComponentCount { property: "tipPosition", got: 4, .. })
        ));
    }

    #[test]
    fn non_numeric_component_is_malformed() {
        let msg = r#"{"hands":[{"id":7,"type":"left","palmNormal":["a",0,0]}],"pointables":[]}"#;
        assert!(matches!(
            extract_message(msg, HandType::Left),
            Err(FrameError::Malformed(_))
        ));
    }

    // ── purity / flattening ──────────────────────────────────────────────
    #[test]
    fn extraction_is_idempotent() {
        let frame = TrackingFrame::parse(&left_hand_frame()).unwrap();
        let a = extract_features(&frame, HandType::Left).unwrap();
        let b = extract_features(&frame, HandType::Left).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn flatten_is_row_major() {
        let t = extract_message(&left_hand_frame(), HandType::Left).unwrap().unwrap();
        let flat = flatten(&t);
        assert_eq!(flat.len(), FEATURE_LEN);
        assert_eq!(flat[0], PALM_NORMAL[0]);
        assert_eq!(flat[2], PALM_NORMAL[2]);
        assert_eq!(flat[3], PALM_POSITION[0]);
        assert_eq!(flat[FEATURE_LEN - 1], TIPS[4][2]);
    }

    // ── batches ──────────────────────────────────────────────────────────
    #[test]
    fn batch_keeps_frame_order() {
        let first = left_hand_frame();
        let second = json!({ "hands": [hand(3, "left")], "pointables": [] }).to_string();
        let batch = extract_batch(&[&first, &second], HandType::Left).unwrap().unwrap();
        assert_eq!(batch.dim(), (2, TENSOR_ROWS, COMPONENTS));
        assert_eq!(batch[[0, 3, 0]], TIPS[0][0]);
        assert_eq!(batch[[1, 3, 0]], 0.0);

        let flat = flatten_batch(&batch).unwrap();
        assert_eq!(flat.dim(), (2, FEATURE_LEN));
        assert_eq!(flat.row(0).to_vec(), flatten(&batch.index_axis(Axis(0), 0).to_owned()).to_vec());
    }

    #[test]
    fn batch_with_missing_hand_is_none() {
        let first = left_hand_frame();
        let out = extract_batch(&[&first, r#"{"hands":[]}"#], HandType::Left).unwrap();
        assert!(out.is_none());
    }
}
