//! Static gesture trainer.
//!
//! Each round plays one fixed actuation vector on the Buzz while the operator
//! tries to name the gesture it stands for, then reveals the answer and rests
//! the motors.
//!
//! | Phase | Duration | Buzz |
//! |---|---|---|
//! | guess | `guess − reveal` | gesture vector |
//! | reveal | `reveal` | gesture vector |
//! | between | `between` | rest vector |
//!
//! No tracking data is involved.

use buzz_session::{ActuationVector, BuzzSession, BuzzTransport, SendOutcome, SessionError, Shutdown};
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// Built-in gestures and the motor pattern each one plays.
pub const BUILTIN_GESTURES: [(&str, [u8; 4]); 10] = [
    ("thumbsup",   [113,   0, 255,  92]),
    ("peace",      [169,   0, 255,  77]),
    ("okay",       [193,   0, 255,  93]),
    ("surfsup",    [132,   0, 255,  39]),
    ("fingergun",  [150,   0, 255, 100]),
    ("fist",       [135,   0, 255,  73]),
    ("farpaper",   [110, 198, 255,   0]),
    ("closepaper", [166,   0, 137, 255]),
    ("thehorns",   [181,   0, 255,  59]),
    ("chop",       [210,   0, 255,  38]),
];

/// The guess window never drops below this.
pub const MIN_GUESS: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum GestureError {
    #[error("Unknown gesture `{name}` (known: {known})")]
    Unknown { name: String, known: String },
}

// ════════════════════════════════════════════════════════════════════════════
// GestureTable
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct GestureTable {
    entries: Vec<(String, ActuationVector)>,
}

impl Default for GestureTable {
    fn default() -> Self {
        GestureTable::builtin()
    }
}

impl GestureTable {
    pub fn builtin() -> Self {
        GestureTable {
            entries: BUILTIN_GESTURES
                .iter()
                .map(|(name, motors)| (name.to_string(), ActuationVector::new(*motors)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<ActuationVector> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ActuationVector)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Validate an operator selection.  Empty means every gesture; repeated
    /// names are kept, which weights the random choice toward them.
    pub fn select(&self, names: &[String]) -> Result<Vec<String>, GestureError> {
        if names.is_empty() {
            return Ok(self.names().map(String::from).collect());
        }
        for name in names {
            if self.get(name).is_none() {
                return Err(GestureError::Unknown {
                    name:  name.clone(),
                    known: self.names().collect::<Vec<_>>().join(", "),
                });
            }
        }
        Ok(names.to_vec())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Trainer
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrainerTiming {
    pub guess:   Duration,
    pub reveal:  Duration,
    pub between: Duration,
}

impl Default for TrainerTiming {
    fn default() -> Self {
        TrainerTiming::new(Duration::from_secs(8), Duration::from_secs(5))
    }
}

impl TrainerTiming {
    /// `guess` is floored at [`MIN_GUESS`]; the reveal is always 2 s of it.
    pub fn new(guess: Duration, between: Duration) -> Self {
        TrainerTiming {
            guess: guess.max(MIN_GUESS),
            reveal: Duration::from_secs(2),
            between,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainerExit {
    Completed,
    Shutdown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainerReport {
    /// Gesture played in each started round, in order.
    pub played:      Vec<String>,
    /// Vectors the Buzz did not accept; the round carried on regardless.
    pub send_errors: u64,
    pub exit:        TrainerExit,
}

pub struct GestureTrainer<R: Rng> {
    table:     GestureTable,
    selection: Vec<String>,
    timing:    TrainerTiming,
    rng:       R,
}

impl<R: Rng> GestureTrainer<R> {
    pub fn new(
        table:     GestureTable,
        selection: &[String],
        timing:    TrainerTiming,
        rng:       R,
    ) -> Result<Self, GestureError> {
        let selection = table.select(selection)?;
        Ok(GestureTrainer { table, selection, timing, rng })
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    /// Pick the next gesture uniformly from the selection.
    pub fn choose(&mut self) -> (String, ActuationVector) {
        let name = self
            .selection
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default();
        let vector = self.table.get(&name).unwrap_or(ActuationVector::ZERO);
        (name, vector)
    }

    /// Play rounds until `rounds` is reached (forever if `None`) or shutdown.
    ///
    /// Either way the device algorithm is resumed and the session closed.
    pub async fn run<T: BuzzTransport>(
        &mut self,
        session:      &mut BuzzSession<T>,
        mut shutdown: Shutdown,
        rounds:       Option<usize>,
    ) -> Result<TrainerReport, SessionError> {
        let mut played = Vec::new();
        let mut send_errors = 0;
        let guess_only = self.timing.guess.saturating_sub(self.timing.reveal);

        println!("Get ready!\n");
        if pause(self.timing.between, &mut shutdown).await {
            return stop(session, played, send_errors).await;
        }

        while rounds.map_or(true, |n| played.len() < n) {
            let (name, vector) = self.choose();
            played.push(name.clone());
            info!(gesture = %name, %vector, "round started");

            println!("Start guessing, you have {} seconds...", self.timing.guess.as_secs());
            println!("It's one of: {}", self.selection.join(", "));
            if play(session, &vector, &mut shutdown, &mut send_errors).await? {
                return Ok(TrainerReport { played, send_errors, exit: TrainerExit::Shutdown });
            }
            if pause(guess_only, &mut shutdown).await {
                return stop(session, played, send_errors).await;
            }

            println!("The answer is...\n");
            if pause(self.timing.reveal, &mut shutdown).await {
                return stop(session, played, send_errors).await;
            }
            println!("{name}\n");

            if play(session, &ActuationVector::ZERO, &mut shutdown, &mut send_errors).await? {
                return Ok(TrainerReport { played, send_errors, exit: TrainerExit::Shutdown });
            }
            if pause(self.timing.between, &mut shutdown).await {
                return stop(session, played, send_errors).await;
            }
        }

        session.resume_and_close().await?;
        Ok(TrainerReport { played, send_errors, exit: TrainerExit::Completed })
    }
}

/// Send one vector; `true` if shutdown cancelled it.  A failed send is
/// logged and counted, never retried, and the round goes on.
async fn play<T: BuzzTransport>(
    session:     &mut BuzzSession<T>,
    vector:      &ActuationVector,
    shutdown:    &mut Shutdown,
    send_errors: &mut u64,
) -> Result<bool, SessionError> {
    match session.send_or_shutdown(vector, shutdown).await {
        Ok(SendOutcome::Sent)      => Ok(false),
        Ok(SendOutcome::Cancelled) => Ok(true),
        Err(SessionError::Send(e)) => {
            *send_errors += 1;
            warn!(error = %e, "send failed, continuing");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Sleep for `d`; `true` if shutdown fired first.
async fn pause(d: Duration, shutdown: &mut Shutdown) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.triggered() => true,
        _ = sleep(d) => false,
    }
}

async fn stop<T: BuzzTransport>(
    session:     &mut BuzzSession<T>,
    played:      Vec<String>,
    send_errors: u64,
) -> Result<TrainerReport, SessionError> {
    info!("shutdown requested during training");
    session.resume_and_close().await?;
    Ok(TrainerReport { played, send_errors, exit: TrainerExit::Shutdown })
}
