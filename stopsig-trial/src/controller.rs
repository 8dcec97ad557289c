use stopsig_core::{Key, Stimulus, TrialOutcome, TrialPhase, TrialSpec};
use stopsig_timing::{Schedule, Timer};

use crate::display::{DisplaySurface, StimulusFrame, StimulusRole};
use crate::finalize::finalize;
use crate::listener::ResponseListener;

/// Delayed transitions of one trial, armed at start against the trial clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrialTimer {
    ShowPrimary,
    ShowSecondary,
    Deadline,
}

/// Runs one trial: races the scheduled stimulus transitions and the hard
/// deadline against the subject's keypress, and terminates exactly once.
///
/// The host loop owns the ordering discipline this type relies on: deliver
/// keypresses via [`TrialController::key_press`] before calling
/// [`TrialController::poll`] within a tick. A response observed in the same
/// tick as a due deadline is then handled first, which is what makes the
/// response win exact ties against the deadline timer.
///
/// Exactly one of `key_press`/`poll` ever returns an outcome; afterwards every
/// timer is cancelled, the listener is deaf, and both methods return `None`
/// forever, so nothing from a finished trial can fire into a later one.
pub struct TrialController<S: Stimulus, T: Timer<Timestamp = u64>> {
    spec: TrialSpec<S>,
    timer: T,
    start_ns: u64,
    phase: TrialPhase,
    schedule: Schedule<TrialTimer>,
    listener: ResponseListener,
    display: DisplaySurface<S>,
}

impl<S: Stimulus, T: Timer<Timestamp = u64>> TrialController<S, T> {
    /// Start the trial at `timer.now()`: show fixation or primary, arm the
    /// listener, and register every delayed transition the spec asks for.
    pub fn start(spec: TrialSpec<S>, timer: T) -> Self {
        let start_ns = timer.now();
        let mut schedule = Schedule::new();
        let mut display = DisplaySurface::new();
        let mut listener = ResponseListener::idle();

        let fixation_ns = spec.fixation_ms.unwrap_or(0) * 1_000_000;

        let phase = match spec.fixation_ms {
            Some(_) => {
                display.show(StimulusFrame::new(spec.fixation.clone(), StimulusRole::Fixation));
                schedule.arm(fixation_ns, TrialTimer::ShowPrimary);
                TrialPhase::Fixation
            }
            None => {
                display.show(
                    StimulusFrame::new(spec.primary.clone(), StimulusRole::Primary)
                        .with_prompt(spec.prompt.clone()),
                );
                TrialPhase::Primary
            }
        };

        // go trials never swap, even with an ISI configured
        if spec.is_stop_trial() {
            if let Some(isi_ms) = spec.isi_ms {
                schedule.arm(fixation_ns + isi_ms * 1_000_000, TrialTimer::ShowSecondary);
            }
        }

        listener.arm(&spec.allowed_keys);

        if let Some(duration_ms) = spec.trial_duration_ms {
            schedule.arm(fixation_ns + duration_ms * 1_000_000, TrialTimer::Deadline);
        }

        TrialController {
            spec,
            timer,
            start_ns,
            phase,
            schedule,
            listener,
            display,
        }
    }

    /// Apply every transition that has come due. Returns the outcome if the
    /// deadline terminated the trial, `None` while it is still running or
    /// once it has already produced its outcome.
    pub fn poll(&mut self) -> Option<TrialOutcome<S>> {
        if self.phase == TrialPhase::Terminated {
            return None;
        }
        let elapsed = self.elapsed_ns();
        for timer in self.schedule.due(elapsed) {
            match timer {
                TrialTimer::ShowPrimary => {
                    self.display.show(
                        StimulusFrame::new(self.spec.primary.clone(), StimulusRole::Primary)
                            .with_prompt(self.spec.prompt.clone()),
                    );
                    self.phase = TrialPhase::Primary;
                }
                TrialTimer::ShowSecondary => {
                    self.display.show(StimulusFrame::new(
                        self.spec.secondary.clone(),
                        StimulusRole::Secondary,
                    ));
                    self.phase = TrialPhase::Secondary;
                }
                TrialTimer::Deadline => return self.terminate(),
            }
        }
        None
    }

    /// Feed one observed keypress into the trial. Returns the outcome when a
    /// qualifying response terminates the trial, `None` otherwise.
    pub fn key_press(&mut self, key: Key) -> Option<TrialOutcome<S>> {
        if self.phase == TrialPhase::Terminated {
            return None;
        }
        // the listener already keeps only the first press; re-check here so a
        // press racing cancellation can never overwrite a recorded response
        if self.listener.response().is_some() {
            return None;
        }
        let at_ns = self.elapsed_ns();
        if !self.listener.offer(key, at_ns) {
            return None;
        }
        self.display.acknowledge_response();
        if self.spec.ends_on_response {
            return self.terminate();
        }
        None
    }

    /// Single termination path. Disarms everything before assembling the
    /// outcome, then clears the display; idempotent by construction.
    fn terminate(&mut self) -> Option<TrialOutcome<S>> {
        if self.phase == TrialPhase::Terminated {
            return None;
        }
        self.phase = TrialPhase::Terminated;
        self.schedule.cancel_all();
        self.listener.cancel();
        let outcome = finalize(&self.spec, self.listener.response());
        self.display.clear();
        Some(outcome)
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.timer.now().saturating_sub(self.start_ns)
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == TrialPhase::Terminated
    }

    pub fn display(&self) -> &DisplaySurface<S> {
        &self.display
    }

    pub fn spec(&self) -> &TrialSpec<S> {
        &self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stopsig_core::{ArrowDirection, KeySet, StimulusType};
    use stopsig_timing::ManualTimer;

    fn go_arrow() -> StimulusType {
        StimulusType::Arrow {
            direction: ArrowDirection::Left,
            size: 60.0,
            color: [255, 255, 255, 255],
        }
    }

    fn stop_arrow() -> StimulusType {
        StimulusType::SignaledArrow {
            direction: ArrowDirection::Left,
            size: 60.0,
            color: [204, 0, 0, 255],
            ring: [204, 0, 0, 255],
        }
    }

    fn fixation() -> StimulusType {
        StimulusType::FixationCross {
            size: 40.0,
            color: [255, 255, 255, 255],
        }
    }

    /// 250 ms fixation, 1250 ms deadline, arrow keys. The reference spec of
    /// the engine's test vectors.
    fn reference_spec(primary: StimulusType, secondary: StimulusType) -> TrialSpec<StimulusType> {
        let mut spec = TrialSpec::new(fixation(), primary, secondary);
        spec.fixation_ms = Some(250);
        spec.trial_duration_ms = Some(1250);
        spec.allowed_keys = KeySet::of(["leftarrow", "rightarrow"]);
        spec
    }

    fn run_until(controller: &mut TrialController<StimulusType, ManualTimer>, timer: &ManualTimer, ms: u64, step_ms: u64) -> Option<TrialOutcome<StimulusType>> {
        while timer.now() < ms * 1_000_000 {
            timer.advance_ms(step_ms);
            if let Some(outcome) = controller.poll() {
                return Some(outcome);
            }
        }
        None
    }

    #[test]
    fn left_press_at_900_gives_raw_900_corrected_650() {
        let timer = ManualTimer::new();
        let mut controller =
            TrialController::start(reference_spec(go_arrow(), go_arrow()), timer.clone());

        timer.set_ms(900);
        assert!(controller.poll().is_none());
        let outcome = controller.key_press(Key::new("leftarrow")).expect("ends trial");

        assert_eq!(outcome.raw_rt_ns, Some(900_000_000));
        assert_eq!(outcome.corrected_rt_ns, Some(650_000_000));
        assert_eq!(outcome.key_pressed, Some(Key::new("leftarrow")));
        assert!(controller.is_terminated());
    }

    #[test]
    fn no_press_terminates_at_1500_with_null_fields() {
        let timer = ManualTimer::new();
        let mut controller =
            TrialController::start(reference_spec(go_arrow(), go_arrow()), timer.clone());

        timer.set_ms(1499);
        assert!(controller.poll().is_none());
        timer.set_ms(1500);
        let outcome = controller.poll().expect("deadline fires at fixation + trial duration");

        assert_eq!(outcome.raw_rt_ns, None);
        assert_eq!(outcome.corrected_rt_ns, None);
        assert_eq!(outcome.key_pressed, None);
    }

    #[test]
    fn go_trial_never_swaps_but_secondary_onset_is_still_computed() {
        let timer = ManualTimer::new();
        let mut spec = reference_spec(go_arrow(), go_arrow());
        spec.isi_ms = Some(200);
        let mut controller = TrialController::start(spec, timer.clone());

        // well past fixation + isi: still the primary stimulus
        timer.set_ms(1000);
        assert!(controller.poll().is_none());
        let frame = controller.display().current().unwrap();
        assert_eq!(frame.role, StimulusRole::Primary);

        timer.set_ms(1500);
        let outcome = controller.poll().unwrap();
        assert_eq!(outcome.onset_secondary_ns, 450_000_000);
    }

    #[test]
    fn stop_trial_swaps_exactly_at_fixation_plus_isi() {
        let timer = ManualTimer::new();
        let mut spec = reference_spec(go_arrow(), stop_arrow());
        spec.isi_ms = Some(200);
        let mut controller = TrialController::start(spec, timer.clone());

        assert_eq!(
            controller.display().current().unwrap().role,
            StimulusRole::Fixation
        );

        timer.set_ms(250);
        assert!(controller.poll().is_none());
        assert_eq!(
            controller.display().current().unwrap().role,
            StimulusRole::Primary
        );

        // immediately before the swap instant
        timer.set_ms(449);
        assert!(controller.poll().is_none());
        assert_eq!(
            controller.display().current().unwrap().role,
            StimulusRole::Primary
        );

        // at the swap instant
        timer.set_ms(450);
        assert!(controller.poll().is_none());
        let frame = controller.display().current().unwrap();
        assert_eq!(frame.role, StimulusRole::Secondary);
        assert_eq!(frame.stimulus, stop_arrow());
    }

    #[test]
    fn press_during_fixation_yields_negative_corrected_rt() {
        let timer = ManualTimer::new();
        let mut controller =
            TrialController::start(reference_spec(go_arrow(), go_arrow()), timer.clone());

        timer.set_ms(100);
        let outcome = controller.key_press(Key::new("rightarrow")).unwrap();
        assert_eq!(outcome.raw_rt_ns, Some(100_000_000));
        assert_eq!(outcome.corrected_rt_ns, Some(-150_000_000));
    }

    #[test]
    fn without_ends_on_response_the_trial_runs_to_deadline() {
        let timer = ManualTimer::new();
        let mut spec = reference_spec(go_arrow(), go_arrow());
        spec.ends_on_response = false;
        let mut controller = TrialController::start(spec, timer.clone());

        timer.set_ms(900);
        assert!(controller.poll().is_none());
        assert!(controller.key_press(Key::new("leftarrow")).is_none());
        assert!(!controller.is_terminated());

        let outcome = run_until(&mut controller, &timer, 1500, 10).expect("deadline ends it");
        assert_eq!(outcome.raw_rt_ns, Some(900_000_000));
        assert_eq!(outcome.key_pressed, Some(Key::new("leftarrow")));
    }

    #[test]
    fn second_press_has_no_observable_effect() {
        let timer = ManualTimer::new();
        let mut spec = reference_spec(go_arrow(), go_arrow());
        spec.ends_on_response = false;
        let mut controller = TrialController::start(spec, timer.clone());

        timer.set_ms(600);
        controller.poll();
        assert!(controller.key_press(Key::new("leftarrow")).is_none());
        timer.set_ms(700);
        assert!(controller.key_press(Key::new("rightarrow")).is_none());

        let outcome = run_until(&mut controller, &timer, 1500, 10).unwrap();
        assert_eq!(outcome.key_pressed, Some(Key::new("leftarrow")));
        assert_eq!(outcome.raw_rt_ns, Some(600_000_000));
    }

    #[test]
    fn outcome_is_produced_exactly_once() {
        let timer = ManualTimer::new();
        let mut controller =
            TrialController::start(reference_spec(go_arrow(), go_arrow()), timer.clone());

        timer.set_ms(900);
        assert!(controller.key_press(Key::new("leftarrow")).is_some());

        // no further timer or listener callback is observable
        timer.set_ms(1500);
        assert!(controller.poll().is_none());
        assert!(controller.key_press(Key::new("rightarrow")).is_none());
        timer.set_ms(5000);
        assert!(controller.poll().is_none());
        assert!(controller.display().is_blank());
    }

    #[test]
    fn response_wins_an_exact_tie_with_the_deadline() {
        let timer = ManualTimer::new();
        let mut controller =
            TrialController::start(reference_spec(go_arrow(), go_arrow()), timer.clone());

        // both the press and the deadline land at t = 1500; the host delivers
        // the press first and the deadline then finds the trial terminated
        timer.set_ms(1500);
        let outcome = controller.key_press(Key::new("leftarrow")).unwrap();
        assert_eq!(outcome.key_pressed, Some(Key::new("leftarrow")));
        assert!(controller.poll().is_none());
    }

    #[test]
    fn no_fixation_starts_in_primary_at_t_zero() {
        let timer = ManualTimer::new();
        let mut spec = TrialSpec::new(fixation(), go_arrow(), go_arrow());
        spec.trial_duration_ms = Some(1000);
        spec.prompt = Some("respond with the arrow keys".to_string());
        let mut controller = TrialController::start(spec, timer.clone());

        let frame = controller.display().current().unwrap();
        assert_eq!(frame.role, StimulusRole::Primary);
        assert_eq!(frame.prompt.as_deref(), Some("respond with the arrow keys"));

        timer.set_ms(400);
        let outcome = controller.key_press(Key::new("space")).unwrap();
        // no fixation: corrected equals raw, onsets are zero
        assert_eq!(outcome.onset_primary_ns, 0);
        assert_eq!(outcome.corrected_rt_ns, Some(400_000_000));
    }

    #[test]
    fn no_keys_sentinel_ignores_every_press() {
        let timer = ManualTimer::new();
        let mut spec = reference_spec(go_arrow(), go_arrow());
        spec.allowed_keys = KeySet::None;
        let mut controller = TrialController::start(spec, timer.clone());

        timer.set_ms(900);
        assert!(controller.key_press(Key::new("leftarrow")).is_none());
        let outcome = run_until(&mut controller, &timer, 1500, 10).unwrap();
        assert_eq!(outcome.key_pressed, None);
    }

    #[test]
    fn non_qualifying_key_is_discarded() {
        let timer = ManualTimer::new();
        let mut controller =
            TrialController::start(reference_spec(go_arrow(), go_arrow()), timer.clone());

        timer.set_ms(900);
        assert!(controller.key_press(Key::new("space")).is_none());
        assert!(!controller.is_terminated());
        let outcome = controller.key_press(Key::new("leftarrow")).unwrap();
        assert_eq!(outcome.key_pressed, Some(Key::new("leftarrow")));
    }

    #[test]
    fn deadline_fires_even_mid_fixation() {
        // a deadline shorter than the remaining phases still terminates;
        // inconsistent specs run as written instead of failing
        let timer = ManualTimer::new();
        let mut spec = reference_spec(go_arrow(), stop_arrow());
        spec.fixation_ms = Some(500);
        spec.trial_duration_ms = Some(0);
        spec.isi_ms = Some(200);
        let mut controller = TrialController::start(spec, timer.clone());

        timer.set_ms(500);
        // fixation end and deadline land on the same instant; registration
        // order shows the primary first, then the deadline terminates
        let outcome = controller.poll().expect("deadline at fixation end");
        assert_eq!(outcome.raw_rt_ns, None);
        assert!(controller.is_terminated());
    }

    #[test]
    fn trial_without_deadline_runs_until_response() {
        let timer = ManualTimer::new();
        let mut spec = TrialSpec::new(fixation(), go_arrow(), go_arrow());
        spec.fixation_ms = Some(250);
        let mut controller = TrialController::start(spec, timer.clone());

        timer.set_ms(60_000);
        assert!(controller.poll().is_none());
        assert!(!controller.is_terminated());
        let outcome = controller.key_press(Key::new("space")).unwrap();
        assert_eq!(outcome.raw_rt_ns, Some(60_000_000_000));
    }
}
