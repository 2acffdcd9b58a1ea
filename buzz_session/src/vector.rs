//! The motor command sent to the Buzz: one intensity per motor.

use std::fmt;

/// Motors on one Buzz wristband.
pub const BUZZ_MOTOR_COUNT: usize = 4;

/// Highest motor intensity; the Buzz renders 256 distinct levels.
pub const BUZZ_MAX_VIBRATION_QUANTIZATION: u8 = 255;

/// Simultaneous intensities for every motor, in `0..=255`.
///
/// [`ActuationVector::ZERO`] is the rest state: motors off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ActuationVector([u8; BUZZ_MOTOR_COUNT]);

impl ActuationVector {
    pub const ZERO: ActuationVector = ActuationVector([0; BUZZ_MOTOR_COUNT]);

    pub const fn new(intensities: [u8; BUZZ_MOTOR_COUNT]) -> Self {
        ActuationVector(intensities)
    }

    pub fn intensities(&self) -> [u8; BUZZ_MOTOR_COUNT] {
        self.0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// True for the all-zero vector.
    pub fn is_rest(&self) -> bool {
        self.0.iter().all(|&m| m == 0)
    }
}

impl From<[u8; BUZZ_MOTOR_COUNT]> for ActuationVector {
    fn from(intensities: [u8; BUZZ_MOTOR_COUNT]) -> Self {
        ActuationVector(intensities)
    }
}

impl fmt::Display for ActuationVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, m) in self.0.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "{}", m)?;
        }
        write!(f, "]")
    }
}
