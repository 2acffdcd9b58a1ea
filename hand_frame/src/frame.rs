//! Wire schema of one tracking frame (Ultraleap WebSocket service, `/v6.json`).
//!
//! Only the fields the extractor reads are modelled; everything else in the
//! message is ignored by serde.  Vector properties are kept as raw component
//! lists so a short or long vector surfaces as a [`FrameError::ComponentCount`]
//! at extraction time instead of a generic parse failure.

use std::fmt;
use std::str::FromStr;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::FrameError;

// ════════════════════════════════════════════════════════════════════════════
// HandType
// ════════════════════════════════════════════════════════════════════════════

/// Handedness of a tracked hand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandType {
    #[default]
    Left,
    Right,
}

impl HandType {
    /// The label the tracking service uses in a hand's `type` field.
    pub fn label(self) -> &'static str {
        match self {
            HandType::Left  => "left",
            HandType::Right => "right",
        }
    }

    /// True if `label` (as found in a frame) names this hand.
    pub fn matches(self, label: &str) -> bool {
        label == self.label()
    }
}

impl fmt::Display for HandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for HandType {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left"  => Ok(HandType::Left),
            "right" => Ok(HandType::Right),
            other   => Err(FrameError::UnknownHand(other.to_string())),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Frame schema
// ════════════════════════════════════════════════════════════════════════════

/// One tracked hand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hand {
    pub id: i64,
    /// `"left"` or `"right"`; kept verbatim so unknown labels simply never match.
    #[serde(rename = "type", default)]
    pub label: String,
    #[serde(default)]
    pub palm_normal: Vec<f64>,
    #[serde(default)]
    pub palm_position: Vec<f64>,
    #[serde(default)]
    pub wrist: Vec<f64>,
}

/// A tracked finger (or tool), linked to its hand by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pointable {
    #[serde(default)]
    pub hand_id: Option<i64>,
    #[serde(default)]
    pub tip_position: Vec<f64>,
}

/// One snapshot of tracked hands and pointables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingFrame {
    #[serde(default)]
    pub hands: Vec<Hand>,
    #[serde(default)]
    pub pointables: Vec<Pointable>,
}

impl TrackingFrame {
    /// Parse one JSON message.  Service status messages (no `hands` key)
    /// parse to an empty frame.
    pub fn parse(message: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(message)?)
    }

    /// Serialize back to the wire format.
    pub fn to_json(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The hand to extract: the first hand if it matches `target`, else the
    /// second hand if it matches.  Hands past the second are never considered.
    pub fn select_hand(&self, target: HandType) -> Option<&Hand> {
        self.hands
            .iter()
            .take(2)
            .find(|h| target.matches(&h.label))
    }

    /// Pointables belonging to `hand_id`, with their index in the full
    /// pointable list.
    pub fn fingers_of(&self, hand_id: i64) -> impl Iterator<Item = (usize, &Pointable)> {
        self.pointables
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.hand_id == Some(hand_id))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Readiness pre-check
// ════════════════════════════════════════════════════════════════════════════

/// Marker the service emits for a frame with no hands in view.
const EMPTY_HANDS: &str = "\"hands\":[]";

#[derive(Deserialize)]
struct FrameShape {
    hands:      Option<Vec<IgnoredAny>>,
    pointables: Option<Vec<IgnoredAny>>,
}

/// Cheap structural check: does `message` carry at least one hand and at
/// least one pointable?
///
/// The service sends status messages while it starts up and empty frames
/// whenever no hand is in view; this rejects both without building a full
/// [`TrackingFrame`].
pub fn has_hand_and_finger_data(message: &str) -> bool {
    if message.trim().is_empty() || message.contains(EMPTY_HANDS) {
        return false;
    }
    match serde_json::from_str::<FrameShape>(message) {
        Ok(shape) => {
            shape.hands.map_or(false, |h| !h.is_empty())
                && shape.pointables.map_or(false, |p| !p.is_empty())
        }
        Err(_) => false,
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    // ── HandType ─────────────────────────────────────────────────────────
    #[test]
    fn hand_type_parses_case_insensitively() {
        assert_eq!("Left".parse::<HandType>().unwrap(), HandType::Left);
        assert_eq!(" right ".parse::<HandType>().unwrap(), HandType::Right);
        assert!(matches!(
            "both".parse::<HandType>(),
            Err(FrameError::UnknownHand(_))
        ));
    }

    #[test]
    fn hand_type_defaults_to_left() {
        assert_eq!(HandType::default(), HandType::Left);
        assert_eq!(HandType::default().to_string(), "left");
    }

    // ── parse ────────────────────────────────────────────────────────────
    #[test]
    fn status_message_parses_to_empty_frame() {
        let frame = TrackingFrame::parse(r#"{"serviceVersion":"4.1.0","version":6}"#).unwrap();
        assert!(frame.hands.is_empty());
        assert!(frame.pointables.is_empty());
    }

    #[test]
    fn select_hand_ignores_third_hand() {
        let frame = TrackingFrame::parse(
            r#"{"hands":[{"id":1,"type":"right"},{"id":2,"type":"right"},
                         {"id":3,"type":"left"}]}"#,
        )
        .unwrap();
        assert!(frame.select_hand(HandType::Left).is_none());
        assert_eq!(frame.select_hand(HandType::Right).map(|h| h.id), Some(1));
    }

    #[test]
    fn fingers_of_keeps_pointable_index() {
        let frame = TrackingFrame::parse(
            r#"{"pointables":[{"handId":4,"tipPosition":[0,0,0]},
                              {"handId":9,"tipPosition":[1,1,1]},
                              {"handId":9,"tipPosition":[2,2,2]}]}"#,
        )
        .unwrap();
        let idx: Vec<usize> = frame.fingers_of(9).map(|(i, _)| i).collect();
        assert_eq!(idx, vec![1, 2]);
    }

    // ── has_hand_and_finger_data ─────────────────────────────────────────
    #[test]
    fn precheck_rejects_empty_and_status_messages() {
        assert!(!has_hand_and_finger_data(""));
        assert!(!has_hand_and_finger_data("   "));
        assert!(!has_hand_and_finger_data(r#"{"serviceVersion":"4.1.0"}"#));
        assert!(!has_hand_and_finger_data(r#"{"hands":[],"pointables":[]}"#));
        assert!(!has_hand_and_finger_data("not json"));
    }

    #[test]
    fn precheck_requires_pointables() {
        assert!(!has_hand_and_finger_data(r#"{"hands":[{"id":1}],"pointables":[]}"#));
        assert!(!has_hand_and_finger_data(r#"{"hands":[{"id":1}]}"#));
        assert!(has_hand_and_finger_data(
            r#"{"hands":[{"id":1}],"pointables":[{"handId":1}]}"#
        ));
    }
}
