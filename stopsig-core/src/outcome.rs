use serde::Serialize;

use crate::key::Key;

/// Recorded result of one trial, assembled exactly once by the finalizer and
/// immutable from hand-off onward.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialOutcome<S> {
    /// Time from trial start to the response, if one occurred.
    pub raw_rt_ns: Option<u64>,
    /// `raw_rt - fixation_duration`. Negative when the subject responded
    /// during the fixation phase; the sign is preserved for the downstream
    /// classifier, never clamped.
    pub corrected_rt_ns: Option<i64>,
    /// Echo of the trial's stimuli for downstream scoring.
    pub primary: S,
    pub secondary: S,
    /// Onset of the primary stimulus: the fixation duration, or 0.
    pub onset_primary_ns: u64,
    /// `fixation + isi`. Defined on go trials too, even though no visual
    /// swap ever happens there.
    pub onset_secondary_ns: u64,
    pub key_pressed: Option<Key>,
}

impl<S> TrialOutcome<S> {
    pub fn responded(&self) -> bool {
        self.raw_rt_ns.is_some()
    }
}
