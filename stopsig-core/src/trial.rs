use serde::Serialize;

use crate::key::Key;

/// Trial state machine states. `Terminated` is the single terminal state;
/// every other state can reach it directly via response or deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialPhase {
    Init,
    Fixation,
    Primary,
    Secondary,
    Terminated,
}

/// The one recorded keypress of a trial. `at_ns` is measured from trial
/// start (t = 0), not from any stimulus onset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEvent {
    pub key: Key,
    pub at_ns: u64,
}
