use serde::Serialize;
use stopsig_core::{Key, StimulusType, TrialOutcome};

use crate::design::TrialKind;
use crate::text;

/// What the trial meant, given its kind and the configured correct key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    GoCorrect,
    GoIncorrect,
    GoOmission,
    StopInhibit,
    StopRespond,
}

impl Classification {
    /// The immediate feedback line shown during practice.
    pub fn feedback(self) -> &'static str {
        match self {
            Classification::GoCorrect => text::CORRECT_MSG,
            Classification::GoIncorrect => text::INCORRECT_MSG,
            Classification::GoOmission => text::TOO_SLOW_MSG,
            Classification::StopInhibit => text::CORRECT_STOP_MSG,
            Classification::StopRespond => text::INCORRECT_STOP_MSG,
        }
    }
}

pub fn classify(
    kind: TrialKind,
    correct_key: &Key,
    outcome: &TrialOutcome<StimulusType>,
) -> Classification {
    match kind {
        TrialKind::Go => match &outcome.key_pressed {
            None => Classification::GoOmission,
            Some(key) if key == correct_key => Classification::GoCorrect,
            Some(_) => Classification::GoIncorrect,
        },
        TrialKind::Stop => {
            if outcome.responded() {
                Classification::StopRespond
            } else {
                Classification::StopInhibit
            }
        }
    }
}

/// One line of the results file.
#[derive(Debug, Clone, Serialize)]
pub struct TrialRecord {
    pub block: usize,
    pub trial: usize,
    pub kind: TrialKind,
    pub stimulus: &'static str,
    /// Stop-signal delay actually used; `None` on go trials.
    pub ssd_ms: Option<u64>,
    pub raw_rt_ns: Option<u64>,
    pub corrected_rt_ns: Option<i64>,
    pub key_pressed: Option<Key>,
    pub classification: Classification,
}

/// The block-break summary: the numbers a subject sees between blocks.
#[derive(Debug, Clone, Serialize)]
pub struct BlockStats {
    pub n_go: usize,
    pub n_stop: usize,
    /// Mean corrected RT over answered go trials, in milliseconds.
    pub mean_go_rt_ms: Option<f64>,
    pub prop_go_missed: f64,
    pub prop_correct_stops: Option<f64>,
}

pub fn block_stats(records: &[TrialRecord]) -> BlockStats {
    let go: Vec<_> = records.iter().filter(|r| r.kind == TrialKind::Go).collect();
    let stop: Vec<_> = records
        .iter()
        .filter(|r| r.kind == TrialKind::Stop)
        .collect();

    let go_rts: Vec<f64> = go
        .iter()
        .filter_map(|r| r.corrected_rt_ns)
        .map(|rt| rt as f64 / 1_000_000.0)
        .collect();
    let mean_go_rt_ms = if go_rts.is_empty() {
        None
    } else {
        Some(go_rts.iter().sum::<f64>() / go_rts.len() as f64)
    };

    let missed = go
        .iter()
        .filter(|r| r.classification == Classification::GoOmission)
        .count();
    let prop_go_missed = if go.is_empty() {
        0.0
    } else {
        missed as f64 / go.len() as f64
    };

    let prop_correct_stops = if stop.is_empty() {
        None
    } else {
        let inhibited = stop
            .iter()
            .filter(|r| r.classification == Classification::StopInhibit)
            .count();
        Some(inhibited as f64 / stop.len() as f64)
    };

    BlockStats {
        n_go: go.len(),
        n_stop: stop.len(),
        mean_go_rt_ms,
        prop_go_missed,
        prop_correct_stops,
    }
}
