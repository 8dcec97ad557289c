use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

/// Go or stop, decided at design time by the block generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrialKind {
    Go,
    Stop,
}

/// One slot of a block: which go stimulus to present and whether a stop
/// signal follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTrial {
    /// Index into the configured go stimuli.
    pub stimulus: usize,
    pub kind: TrialKind,
}

/// The basic design: every stimulus appears `round(1 / stop_proportion)`
/// times, exactly one of those as a stop trial. With a proportion of 1/4 and
/// two stimuli this is the classic 8-trial cell.
fn basic_design(n_stimuli: usize, stop_proportion: f64) -> Vec<PlannedTrial> {
    let per_stimulus = if stop_proportion > 0.0 {
        ((1.0 / stop_proportion).round() as usize).max(1)
    } else {
        1
    };
    let mut trials = Vec::with_capacity(n_stimuli * per_stimulus);
    for stimulus in 0..n_stimuli {
        if stop_proportion > 0.0 {
            trials.push(PlannedTrial {
                stimulus,
                kind: TrialKind::Stop,
            });
        }
        let go_count = if stop_proportion > 0.0 {
            per_stimulus - 1
        } else {
            per_stimulus
        };
        for _ in 0..go_count {
            trials.push(PlannedTrial {
                stimulus,
                kind: TrialKind::Go,
            });
        }
    }
    trials
}

/// A shuffled block: `reps` repetitions of the basic design.
pub fn block_design<R: Rng + ?Sized>(
    n_stimuli: usize,
    stop_proportion: f64,
    reps: usize,
    rng: &mut R,
) -> Vec<PlannedTrial> {
    let cell = basic_design(n_stimuli, stop_proportion);
    let mut trials = Vec::with_capacity(cell.len() * reps);
    for _ in 0..reps {
        trials.extend_from_slice(&cell);
    }
    trials.shuffle(rng);
    trials
}
