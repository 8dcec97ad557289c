/// One-up/one-down tracking of the stop-signal delay.
///
/// Successful inhibitions make the next stop signal later (harder), failed
/// ones make it earlier (easier), converging on the delay where the subject
/// stops about half the time. Owned by the experiment layer; the trial engine
/// itself never adapts timing.
#[derive(Debug, Clone)]
pub struct SsdStaircase {
    ssd_ms: u64,
    step_ms: u64,
    floor_ms: u64,
    ceiling_ms: u64,
}

impl SsdStaircase {
    /// The step is also the lowest possible SSD; the ceiling keeps the signal
    /// inside the trial.
    pub fn new(start_ms: u64, step_ms: u64, ceiling_ms: u64) -> Self {
        let floor_ms = step_ms;
        SsdStaircase {
            ssd_ms: start_ms.clamp(floor_ms, ceiling_ms),
            step_ms,
            floor_ms,
            ceiling_ms,
        }
    }

    pub fn current_ms(&self) -> u64 {
        self.ssd_ms
    }

    /// Feed the classified result of a stop trial.
    pub fn record(&mut self, inhibited: bool) {
        self.ssd_ms = if inhibited {
            (self.ssd_ms + self.step_ms).min(self.ceiling_ms)
        } else {
            self.ssd_ms.saturating_sub(self.step_ms).max(self.floor_ms)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_up_on_inhibit_and_down_on_respond() {
        let mut staircase = SsdStaircase::new(200, 50, 1250);
        staircase.record(true);
        assert_eq!(staircase.current_ms(), 250);
        staircase.record(false);
        staircase.record(false);
        assert_eq!(staircase.current_ms(), 150);
    }

    #[test]
    fn never_leaves_the_floor_or_ceiling() {
        let mut staircase = SsdStaircase::new(200, 50, 1250);
        for _ in 0..10 {
            staircase.record(false);
        }
        assert_eq!(staircase.current_ms(), 50); // the step is the floor

        for _ in 0..50 {
            staircase.record(true);
        }
        assert_eq!(staircase.current_ms(), 1250);
    }

    #[test]
    fn start_value_is_clamped() {
        let staircase = SsdStaircase::new(5000, 50, 1250);
        assert_eq!(staircase.current_ms(), 1250);
    }
}
