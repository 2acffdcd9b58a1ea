//! Frame admission: at most one processed frame per `min_interval`.
//!
//! The tracking service emits frames far faster than the Buzz can render
//! distinct intensities; everything between admissions is dropped unparsed.

use tokio::time::{Duration, Instant};

/// Default gap between admitted frames.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Owns the time of the last admitted frame for one live session.
#[derive(Clone, Debug)]
pub struct FrameScheduler {
    min_interval:  Duration,
    last_admitted: Option<Instant>,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        FrameScheduler::new(DEFAULT_MIN_INTERVAL)
    }
}

impl FrameScheduler {
    /// The first frame offered is always admitted.
    pub fn new(min_interval: Duration) -> Self {
        FrameScheduler { min_interval, last_admitted: None }
    }

    /// Admit iff `min_interval` has passed since the last admission; on
    /// admission `now` becomes the reference.
    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_admitted {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_admitted = Some(now);
        true
    }

    pub fn last_admitted(&self) -> Option<Instant> {
        self.last_admitted
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_frame_is_admitted() {
        let mut s = FrameScheduler::default();
        let t = Instant::now();
        assert!(s.admit(t));
        assert_eq!(s.last_admitted(), Some(t));
    }

    #[test]
    fn drops_inside_interval_admits_after() {
        let mut s = FrameScheduler::default();
        let t = Instant::now();
        assert!(s.admit(t));
        assert!(!s.admit(t + ms(99)));
        assert_eq!(s.last_admitted(), Some(t));
        assert!(s.admit(t + ms(101)));
        assert_eq!(s.last_admitted(), Some(t + ms(101)));
    }

    #[test]
    fn dropped_frames_do_not_move_reference() {
        let mut s = FrameScheduler::default();
        let t = Instant::now();
        s.admit(t);
        for step in 1..10 {
            assert!(!s.admit(t + ms(step * 10 - 1)));
        }
        assert!(s.admit(t + ms(100)));
    }

    #[test]
    fn custom_interval() {
        let mut s = FrameScheduler::new(ms(20));
        let t = Instant::now();
        assert!(s.admit(t));
        assert!(!s.admit(t + ms(19)));
        assert!(s.admit(t + ms(20)));
        assert_eq!(s.min_interval(), ms(20));
    }
}
