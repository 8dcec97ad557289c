use stopsig_core::{ResponseEvent, Stimulus, TrialOutcome, TrialSpec};

/// Assemble the outcome record from the specification and the recorded
/// response, if any. Pure; the controller invokes it exactly once, on its
/// single termination path.
///
/// The corrected reaction time subtracts the fixation duration from the raw
/// one unconditionally, treating a missing fixation phase as 0. A response
/// during fixation therefore yields a negative value, which is preserved for
/// the downstream too-fast/miss classification.
pub fn finalize<S: Stimulus>(
    spec: &TrialSpec<S>,
    response: Option<&ResponseEvent>,
) -> TrialOutcome<S> {
    let fixation_ns = spec.fixation_ms.unwrap_or(0) * 1_000_000;
    let raw_rt_ns = response.map(|r| r.at_ns);
    TrialOutcome {
        raw_rt_ns,
        corrected_rt_ns: raw_rt_ns.map(|rt| rt as i64 - fixation_ns as i64),
        primary: spec.primary.clone(),
        secondary: spec.secondary.clone(),
        onset_primary_ns: fixation_ns,
        onset_secondary_ns: fixation_ns + spec.isi_ms.unwrap_or(0) * 1_000_000,
        key_pressed: response.map(|r| r.key.clone()),
    }
}
