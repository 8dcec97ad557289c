use serde::Serialize;

use crate::key::KeySet;
use crate::stimulus::Stimulus;

/// Immutable description of a single trial, supplied by the sequencer and
/// read-only inside the trial engine.
///
/// All durations are milliseconds; `None` means the corresponding phase or
/// deadline simply does not exist. The engine does no cross-field validation:
/// it runs exactly what the specification says.
#[derive(Debug, Clone, Serialize)]
pub struct TrialSpec<S> {
    /// Shown during the fixation phase, when one exists.
    pub fixation: S,
    /// First stimulus, shown once fixation (if any) elapses.
    pub primary: S,
    /// Second stimulus. Equal to `primary` on go trials; any difference makes
    /// this a stop trial with a real display swap.
    pub secondary: S,
    /// Fixation phase length, or `None` for no fixation phase.
    pub fixation_ms: Option<u64>,
    /// Delay between primary onset and the secondary swap (the stop-signal
    /// delay). Only ever scheduled on stop trials.
    pub isi_ms: Option<u64>,
    /// Hard deadline measured from primary onset, or `None` for no deadline.
    pub trial_duration_ms: Option<u64>,
    pub allowed_keys: KeySet,
    /// Whether a qualifying response terminates the trial immediately.
    pub ends_on_response: bool,
    /// Supplementary text shown with the primary stimulus. Presentation only.
    pub prompt: Option<String>,
}

impl<S: Stimulus> TrialSpec<S> {
    /// A spec with the defaults of the engine's external interface: all keys
    /// qualify, a response ends the trial, no prompt, no timed phases.
    pub fn new(fixation: S, primary: S, secondary: S) -> Self {
        TrialSpec {
            fixation,
            primary,
            secondary,
            fixation_ms: None,
            isi_ms: None,
            trial_duration_ms: None,
            allowed_keys: KeySet::All,
            ends_on_response: true,
            prompt: None,
        }
    }

    /// Stop trials are encoded by a secondary stimulus that differs from the
    /// primary; equal stimuli mean the display never changes.
    pub fn is_stop_trial(&self) -> bool {
        self.primary != self.secondary
    }
}
