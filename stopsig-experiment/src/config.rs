use std::marker::PhantomData;

use stopsig_core::{ArrowDirection, Key, KeySet, Phase, StimulusType};

/// One go stimulus, its stop-signal variant, and the key that counts as the
/// correct response to it.
#[derive(Debug, Clone)]
pub struct GoStimulus {
    pub label: &'static str,
    pub stimulus: StimulusType,
    pub stop_variant: StimulusType,
    pub correct_key: Key,
}

/// Everything the experiment is allowed to vary, constructed once before the
/// first trial and read-only from then on. All cross-trial memory that is NOT
/// configuration (the SSD tracker) lives in the state machine, never here.
#[derive(Debug, Clone)]
pub struct ExperimentConfig<P: Phase> {
    pub fixation: StimulusType,
    pub go_stimuli: Vec<GoStimulus>,

    /// Proportion of stop-signal trials in the basic design (1/4 recommended;
    /// 1/6 to 1/3 are sensible).
    pub stop_proportion: f64,
    /// Repetitions of the basic design per practice / experimental block.
    pub design_reps_practice: usize,
    pub design_reps_experiment: usize,
    /// Number of experimental blocks, excluding the practice block.
    pub experiment_blocks: usize,

    /// Blank intertrial interval.
    pub iti_ms: u64,
    /// Fixation presentation before the go stimulus.
    pub fixation_ms: u64,
    /// Maximum reaction time; every trial lasts exactly this long after the
    /// go stimulus appears.
    pub max_rt_ms: u64,
    /// Start value of the SSD tracking procedure.
    pub ssd_start_ms: u64,
    /// Step of the SSD tracking procedure; also the lowest possible SSD.
    pub ssd_step_ms: u64,
    /// Immediate feedback interval during the practice block.
    pub feedback_ms: u64,
    /// Break between blocks.
    pub block_break_ms: u64,

    pub(crate) _phantom: PhantomData<P>,
}

impl<P: Phase> ExperimentConfig<P> {
    /// The keys a subject may answer with: the correct key of every go
    /// stimulus.
    pub fn response_keys(&self) -> KeySet {
        KeySet::Of(self.go_stimuli.iter().map(|s| s.correct_key.clone()).collect())
    }

    pub fn design_reps(&self, practice: bool) -> usize {
        if practice {
            self.design_reps_practice
        } else {
            self.design_reps_experiment
        }
    }
}

impl<P: Phase> Default for ExperimentConfig<P> {
    fn default() -> Self {
        let white = [255, 255, 255, 255];
        let signal_red = [204, 0, 0, 255];
        Self {
            fixation: StimulusType::FixationCross {
                size: 40.0,
                color: white,
            },
            go_stimuli: vec![
                GoStimulus {
                    label: "left",
                    stimulus: StimulusType::Arrow {
                        direction: ArrowDirection::Left,
                        size: 60.0,
                        color: white,
                    },
                    stop_variant: StimulusType::SignaledArrow {
                        direction: ArrowDirection::Left,
                        size: 60.0,
                        color: signal_red,
                        ring: signal_red,
                    },
                    correct_key: Key::new("leftarrow"),
                },
                GoStimulus {
                    label: "right",
                    stimulus: StimulusType::Arrow {
                        direction: ArrowDirection::Right,
                        size: 60.0,
                        color: white,
                    },
                    stop_variant: StimulusType::SignaledArrow {
                        direction: ArrowDirection::Right,
                        size: 60.0,
                        color: signal_red,
                        ring: signal_red,
                    },
                    correct_key: Key::new("rightarrow"),
                },
            ],
            stop_proportion: 0.25,
            design_reps_practice: 4,
            design_reps_experiment: 8,
            experiment_blocks: 4,
            iti_ms: 500,
            fixation_ms: 250,
            max_rt_ms: 1250,
            ssd_start_ms: 200,
            ssd_step_ms: 50,
            feedback_ms: 750,
            block_break_ms: 15_000,
            _phantom: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stopsig_core::StandardPhase;

    #[test]
    fn default_config_matches_the_reference_protocol() {
        let config = ExperimentConfig::<StandardPhase>::default();
        assert_eq!(config.fixation_ms, 250);
        assert_eq!(config.max_rt_ms, 1250);
        assert_eq!(config.ssd_start_ms, 200);
        assert_eq!(config.ssd_step_ms, 50);
        assert_eq!(config.go_stimuli.len(), 2);
        assert!(
            config
                .response_keys()
                .admits(&Key::new("leftarrow"))
        );
        assert!(!config.response_keys().admits(&Key::new("space")));
    }
}
