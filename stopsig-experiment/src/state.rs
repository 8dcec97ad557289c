use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;
use stopsig_core::{Key, Phase, StimulusType, TrialOutcome, TrialSpec};
use stopsig_timing::Timer;
use stopsig_trial::{StimulusFrame, TrialController};

use crate::config::ExperimentConfig;
use crate::design::{PlannedTrial, TrialKind, block_design};
use crate::score::{BlockStats, Classification, TrialRecord, block_stats, classify};
use crate::staircase::SsdStaircase;

#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentEvent {
    SpacePressed,
    ResponseKey(Key),
    TrialComplete,
    BlockComplete,
    PhaseComplete,
}

/// Timed waits between trials and blocks. Deadlines on the shared clock, so
/// the host loop never blocks.
#[derive(Debug, Clone, Copy)]
enum Gate {
    /// Practice feedback on screen.
    Feedback { until_ns: u64 },
    /// Blank intertrial interval.
    Iti { until_ns: u64 },
    /// Between-block break, block summary on screen.
    Break { until_ns: u64 },
}

struct ActiveTrial<T: Timer<Timestamp = u64>> {
    planned: PlannedTrial,
    ssd_ms: Option<u64>,
    controller: TrialController<StimulusType, T>,
}

/// Owns everything that spans trials: the design queue, the SSD staircase,
/// the records, and the phase sequencing. Each trial itself runs inside a
/// fresh `TrialController`, which keeps its own timers and listener, so a
/// finished trial can never fire into the next one.
pub struct ExperimentStateMachine<P, T, R>
where
    P: Phase,
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    pub phase: P,
    pub timer: T,
    pub rng: R,
    pub config: ExperimentConfig<P>,
    current: Option<ActiveTrial<T>>,
    pending: VecDeque<PlannedTrial>,
    staircase: SsdStaircase,
    records: Vec<TrialRecord>,
    block: usize,
    blocks_begun: usize,
    blocks_run_in_phase: usize,
    trial_in_block: usize,
    block_len: usize,
    block_start_record: usize,
    gate: Option<Gate>,
    feedback: Option<&'static str>,
    last_block_stats: Option<BlockStats>,
    pending_outcome: Option<TrialOutcome<StimulusType>>,
    awaiting_input: bool,
}

impl<P, T, R> ExperimentStateMachine<P, T, R>
where
    P: Phase,
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    pub fn new(config: ExperimentConfig<P>, timer: T, rng: R) -> Self {
        let staircase = SsdStaircase::new(config.ssd_start_ms, config.ssd_step_ms, config.max_rt_ms);
        Self {
            phase: P::default(),
            timer,
            rng,
            config,
            current: None,
            pending: VecDeque::new(),
            staircase,
            records: Vec::new(),
            block: 0,
            blocks_begun: 0,
            blocks_run_in_phase: 0,
            trial_in_block: 0,
            block_len: 0,
            block_start_record: 0,
            gate: None,
            feedback: None,
            last_block_stats: None,
            pending_outcome: None,
            awaiting_input: true,
        }
    }

    pub fn advance_phase(&mut self) -> bool {
        if let Some(next) = self.phase.next() {
            self.phase = next;
            self.blocks_run_in_phase = 0;
            true
        } else {
            false
        }
    }

    /// Advance timed waits and the running trial. Returned events must be fed
    /// back through [`ExperimentStateMachine::handle_event`].
    pub fn update(&mut self) -> Vec<ExperimentEvent> {
        let mut events = Vec::new();
        if !(self.phase.is_practice() || self.phase.is_experiment()) {
            return events;
        }
        let now = self.timer.now();

        if let Some(gate) = self.gate {
            match gate {
                Gate::Feedback { until_ns } => {
                    if now >= until_ns {
                        self.feedback = None;
                        self.gate = Some(Gate::Iti {
                            until_ns: now + self.config.iti_ms * 1_000_000,
                        });
                    }
                }
                Gate::Iti { until_ns } => {
                    if now >= until_ns {
                        self.gate = None;
                        if self.pending.is_empty() {
                            events.push(ExperimentEvent::BlockComplete);
                        } else {
                            self.start_trial();
                        }
                    }
                }
                Gate::Break { until_ns } => {
                    if now >= until_ns {
                        self.gate = None;
                        self.begin_block();
                        self.start_trial();
                    }
                }
            }
            return events;
        }

        if let Some(active) = &mut self.current {
            if let Some(outcome) = active.controller.poll() {
                self.pending_outcome = Some(outcome);
                events.push(ExperimentEvent::TrialComplete);
            }
        }

        events
    }

    pub fn handle_event(&mut self, event: ExperimentEvent) -> bool {
        match (&self.phase, &event) {
            // Welcome phase - space advances to practice and starts trials
            (phase, ExperimentEvent::SpacePressed) if phase.is_welcome() => {
                if self.advance_phase() {
                    self.awaiting_input = false;
                    self.begin_block();
                    self.start_trial();
                    true
                } else {
                    false
                }
            }

            // Space skips the rest of a block break
            (phase, ExperimentEvent::SpacePressed)
                if phase.is_practice() || phase.is_experiment() =>
            {
                if matches!(self.gate, Some(Gate::Break { .. })) {
                    self.gate = None;
                    self.begin_block();
                    self.start_trial();
                    true
                } else {
                    false
                }
            }

            // A keypress reaches the running trial's listener
            (phase, ExperimentEvent::ResponseKey(key)) if phase.allows_response() => {
                if let Some(active) = &mut self.current {
                    if let Some(outcome) = active.controller.key_press(key.clone()) {
                        self.pending_outcome = Some(outcome);
                        self.finish_trial();
                    }
                    true
                } else {
                    false
                }
            }

            (phase, ExperimentEvent::TrialComplete)
                if phase.is_practice() || phase.is_experiment() =>
            {
                self.finish_trial();
                true
            }

            (_, ExperimentEvent::BlockComplete) => {
                let stats = block_stats(&self.records[self.block_start_record..]);
                self.last_block_stats = Some(stats);
                let phase_blocks = if self.phase.is_practice() {
                    1
                } else {
                    self.config.experiment_blocks
                };
                if self.blocks_run_in_phase >= phase_blocks {
                    self.handle_event(ExperimentEvent::PhaseComplete)
                } else {
                    self.gate = Some(Gate::Break {
                        until_ns: self.timer.now() + self.config.block_break_ms * 1_000_000,
                    });
                    true
                }
            }

            (_, ExperimentEvent::PhaseComplete) => {
                if self.advance_phase() {
                    if self.phase.is_practice() || self.phase.is_experiment() {
                        // break before the first block of the new phase, with
                        // the previous block's summary on screen
                        self.gate = Some(Gate::Break {
                            until_ns: self.timer.now() + self.config.block_break_ms * 1_000_000,
                        });
                    } else {
                        self.current = None;
                        self.gate = None;
                        self.awaiting_input = true;
                    }
                    true
                } else {
                    false
                }
            }

            _ => false, // Event not handled
        }
    }

    fn begin_block(&mut self) {
        self.block = self.blocks_begun;
        self.blocks_begun += 1;
        self.blocks_run_in_phase += 1;
        self.trial_in_block = 0;
        self.block_start_record = self.records.len();
        let reps = self.config.design_reps(self.phase.is_practice());
        self.pending = block_design(
            self.config.go_stimuli.len(),
            self.config.stop_proportion,
            reps,
            &mut self.rng,
        )
        .into();
        self.block_len = self.pending.len();
        println!(
            "Block {} started: {} trials ({:?})",
            self.block, self.block_len, self.phase
        );
    }

    fn start_trial(&mut self) {
        let Some(planned) = self.pending.pop_front() else {
            return;
        };
        let stim = &self.config.go_stimuli[planned.stimulus];
        let ssd_ms = self.staircase.current_ms();
        let secondary = match planned.kind {
            TrialKind::Go => stim.stimulus.clone(),
            TrialKind::Stop => stim.stop_variant.clone(),
        };

        let mut spec = TrialSpec::new(self.config.fixation.clone(), stim.stimulus.clone(), secondary);
        spec.fixation_ms = Some(self.config.fixation_ms);
        // the onset bookkeeping wants the ISI on go trials too; the engine
        // never schedules a swap there
        spec.isi_ms = Some(ssd_ms);
        spec.trial_duration_ms = Some(self.config.max_rt_ms);
        spec.allowed_keys = self.config.response_keys();
        // fixed-length trials: an early response must not cut a stop trial
        // short, so block pacing stays constant
        spec.ends_on_response = false;

        self.current = Some(ActiveTrial {
            planned,
            ssd_ms: (planned.kind == TrialKind::Stop).then_some(ssd_ms),
            controller: TrialController::start(spec, self.timer.clone()),
        });
    }

    /// Consume the stashed outcome: classify, track, record, and open the
    /// after-trial gate.
    fn finish_trial(&mut self) {
        let Some(outcome) = self.pending_outcome.take() else {
            return;
        };
        let Some(active) = self.current.take() else {
            return;
        };
        let stim = &self.config.go_stimuli[active.planned.stimulus];
        let classification = classify(active.planned.kind, &stim.correct_key, &outcome);

        if active.planned.kind == TrialKind::Stop {
            self.staircase
                .record(classification == Classification::StopInhibit);
        }

        self.records.push(TrialRecord {
            block: self.block,
            trial: self.trial_in_block,
            kind: active.planned.kind,
            stimulus: stim.label,
            ssd_ms: active.ssd_ms,
            raw_rt_ns: outcome.raw_rt_ns,
            corrected_rt_ns: outcome.corrected_rt_ns,
            key_pressed: outcome.key_pressed.clone(),
            classification,
        });
        self.trial_in_block += 1;

        let now = self.timer.now();
        if self.phase.is_practice() {
            self.feedback = Some(classification.feedback());
            self.gate = Some(Gate::Feedback {
                until_ns: now + self.config.feedback_ms * 1_000_000,
            });
        } else {
            self.gate = Some(Gate::Iti {
                until_ns: now + self.config.iti_ms * 1_000_000,
            });
        }
    }

    /// What the current trial is showing, if one is running.
    pub fn display_frame(&self) -> Option<&StimulusFrame<StimulusType>> {
        self.current
            .as_ref()
            .and_then(|active| active.controller.display().current())
    }

    pub fn feedback_text(&self) -> Option<&'static str> {
        self.feedback
    }

    pub fn in_block_break(&self) -> bool {
        matches!(self.gate, Some(Gate::Break { .. }))
    }

    pub fn break_remaining_ms(&self) -> Option<u64> {
        match self.gate {
            Some(Gate::Break { until_ns }) => {
                Some(until_ns.saturating_sub(self.timer.now()) / 1_000_000)
            }
            _ => None,
        }
    }

    /// Summary of the last finished block, for the break screen.
    pub fn block_summary(&self) -> Option<&BlockStats> {
        self.last_block_stats.as_ref()
    }

    pub fn overall_stats(&self) -> BlockStats {
        block_stats(&self.records)
    }

    pub fn trial_progress(&self) -> Option<(usize, usize)> {
        if self.phase.is_practice() || self.phase.is_experiment() {
            Some((self.trial_in_block.min(self.block_len), self.block_len))
        } else {
            None
        }
    }

    pub fn current_phase(&self) -> &P {
        &self.phase
    }

    pub fn is_awaiting_input(&self) -> bool {
        self.awaiting_input || self.phase.is_welcome()
    }

    pub fn current_ssd_ms(&self) -> u64 {
        self.staircase.current_ms()
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn save_results(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("cannot create result file {}", path.display()))?;
        serde_json::to_writer_pretty(file, &self.records).context("failed to write results")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use stopsig_core::StandardPhase;
    use stopsig_timing::ManualTimer;
    use stopsig_trial::StimulusRole;

    type Machine = ExperimentStateMachine<StandardPhase, ManualTimer, StdRng>;

    fn small_config() -> ExperimentConfig<StandardPhase> {
        ExperimentConfig {
            stop_proportion: 0.5,
            design_reps_practice: 1,
            design_reps_experiment: 1,
            experiment_blocks: 1,
            block_break_ms: 2_000,
            ..ExperimentConfig::default()
        }
    }

    fn machine(config: ExperimentConfig<StandardPhase>) -> (Machine, ManualTimer) {
        let timer = ManualTimer::new();
        let rng = StdRng::seed_from_u64(42);
        (ExperimentStateMachine::new(config, timer.clone(), rng), timer)
    }

    fn drive(machine: &mut Machine, timer: &ManualTimer, ms: u64, step_ms: u64) {
        let mut remaining = ms;
        while remaining > 0 {
            let step = step_ms.min(remaining);
            timer.advance_ms(step);
            remaining -= step;
            for event in machine.update() {
                machine.handle_event(event);
            }
        }
    }

    #[test]
    fn space_leaves_welcome_and_starts_the_first_trial() {
        let (mut machine, _timer) = machine(small_config());
        assert!(machine.is_awaiting_input());
        assert!(machine.update().is_empty());

        assert!(machine.handle_event(ExperimentEvent::SpacePressed));
        assert!(machine.phase.is_practice());
        let frame = machine.display_frame().expect("fixation on screen");
        assert_eq!(frame.role, StimulusRole::Fixation);
        assert_eq!(machine.trial_progress(), Some((0, 4)));
    }

    #[test]
    fn a_correct_response_is_recorded_and_fed_back_in_practice() {
        let (mut machine, timer) = machine(small_config());
        machine.handle_event(ExperimentEvent::SpacePressed);

        // past fixation, into the go stimulus
        drive(&mut machine, &timer, 300, 10);
        let key = {
            let record_key = machine.records().first().map(|r| r.key_pressed.clone());
            assert!(record_key.is_none());
            let frame = machine.display_frame().unwrap();
            match &frame.stimulus {
                StimulusType::Arrow { direction, .. } => match direction {
                    stopsig_core::ArrowDirection::Left => Key::new("leftarrow"),
                    stopsig_core::ArrowDirection::Right => Key::new("rightarrow"),
                },
                other => panic!("expected a go arrow, got {other:?}"),
            }
        };
        machine.handle_event(ExperimentEvent::ResponseKey(key.clone()));

        // fixed-length trials: the response is kept, the trial runs on
        assert!(machine.records().is_empty());
        drive(&mut machine, &timer, 1_500, 10);

        let record = machine.records().first().expect("trial recorded");
        assert_eq!(record.key_pressed, Some(key));
        assert!(matches!(
            record.classification,
            Classification::GoCorrect | Classification::StopRespond
        ));
        if record.kind == TrialKind::Go {
            assert!(machine.feedback_text().is_some() || machine.records().len() > 1);
        }
    }

    #[test]
    fn a_silent_subject_walks_through_to_debrief() {
        let (mut machine, timer) = machine(small_config());
        machine.handle_event(ExperimentEvent::SpacePressed);

        // practice: 4 trials, break, experiment: 4 trials, debrief.
        // every trial is at most 1500 ms plus feedback/iti, so a minute of
        // virtual time is plenty.
        drive(&mut machine, &timer, 60_000, 10);

        assert!(machine.phase.is_debrief(), "phase = {:?}", machine.phase);
        assert!(machine.is_awaiting_input());
        assert_eq!(machine.records().len(), 8);

        // no responses at all: every go missed, every stop inhibited
        let omissions = machine
            .records()
            .iter()
            .filter(|r| r.classification == Classification::GoOmission)
            .count();
        let inhibits = machine
            .records()
            .iter()
            .filter(|r| r.classification == Classification::StopInhibit)
            .count();
        assert_eq!(omissions, 4);
        assert_eq!(inhibits, 4);

        // four inhibited stop trials walk the staircase up four steps
        assert_eq!(machine.current_ssd_ms(), 200 + 4 * 50);

        let stats = machine.overall_stats();
        assert_eq!(stats.mean_go_rt_ms, None);
        assert_eq!(stats.prop_correct_stops, Some(1.0));
    }

    #[test]
    fn stop_records_carry_the_ssd_they_ran_with() {
        let (mut machine, timer) = machine(small_config());
        machine.handle_event(ExperimentEvent::SpacePressed);
        drive(&mut machine, &timer, 60_000, 10);

        for record in machine.records() {
            match record.kind {
                TrialKind::Stop => assert!(record.ssd_ms.is_some()),
                TrialKind::Go => assert_eq!(record.ssd_ms, None),
            }
        }
    }

    #[test]
    fn space_skips_a_block_break() {
        let (mut machine, timer) = machine(small_config());
        machine.handle_event(ExperimentEvent::SpacePressed);

        // finish the practice block, then stop inside the break
        while !machine.in_block_break() {
            drive(&mut machine, &timer, 10, 10);
        }
        assert!(machine.block_summary().is_some());
        assert!(machine.break_remaining_ms().unwrap() > 0);

        machine.handle_event(ExperimentEvent::SpacePressed);
        assert!(!machine.in_block_break());
        assert!(machine.display_frame().is_some());
    }

    #[test]
    fn results_file_round_trips_as_json() {
        let (mut machine, timer) = machine(small_config());
        machine.handle_event(ExperimentEvent::SpacePressed);
        drive(&mut machine, &timer, 60_000, 10);

        let path = std::env::temp_dir().join("stopsig_state_test_results.json");
        machine.save_results(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 8);
        assert!(text.contains("classification"));
        std::fs::remove_file(&path).ok();
    }
}
