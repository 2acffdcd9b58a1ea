//! # hand_frame
//!
//! Ultraleap tracking-frame schema and the fixed-shape feature extraction
//! that feeds the haptic encoder.
//!
//! A frame arrives as one JSON text message from the tracking service.  The
//! extractor picks one hand by handedness and lays its landmarks out in an
//! `8 × 3` tensor:
//!
//! | Row | Contents |
//! |---|---|
//! | 0 | palm normal |
//! | 1 | palm position |
//! | 2 | wrist position |
//! | 3–7 | finger tip positions, by index in the frame's pointable list |
//!
//! Rows of absent fingers stay zero.  Frames with no matching hand yield
//! `Ok(None)`; a property that is not exactly three numbers is an error.
//!
//! ## Quick start
//!
//! ```rust
//! use hand_frame::{extract_message, flatten, HandType, FEATURE_LEN};
//!
//! let msg = r#"{"hands":[{"id":7,"type":"left",
//!     "palmNormal":[0.2,-0.9,-0.2],"palmPosition":[-82.5,202.8,26.0],
//!     "wrist":[-82.4,189.5,95.1]}],
//!     "pointables":[{"handId":7,"tipPosition":[-15.1,178.3,-9.8]}]}"#;
//!
//! let tensor = extract_message(msg, HandType::Left).unwrap().unwrap();
//! assert_eq!(tensor.dim(), (8, 3));
//! assert_eq!(flatten(&tensor).len(), FEATURE_LEN);
//! ```

mod error;
mod extract;
mod frame;

pub use error::FrameError;
pub use extract::{
    extract_batch, extract_features, extract_message, flatten, flatten_batch,
    FeatureBatch, FeatureTensor, COMPONENTS, FEATURE_LEN, FINGER_ROWS, HAND_ROWS,
    TENSOR_ROWS,
};
pub use frame::{has_hand_and_finger_data, Hand, HandType, Pointable, TrackingFrame};
