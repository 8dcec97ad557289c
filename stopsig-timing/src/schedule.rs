/// Handle to one scheduled entry, usable for targeted cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Entry<E> {
    seq: u64,
    due_ns: u64,
    event: E,
}

/// Delayed events registered against a single trial-relative clock.
///
/// All offsets are nanoseconds since trial start. Entries due at the same
/// instant fire in registration order, so callers get deterministic
/// tie-breaking. Cancellation is authoritative: once `cancel_all` runs, an
/// entry can never be yielded again, even if its offset had already passed.
#[derive(Debug, Default)]
pub struct Schedule<E> {
    pending: Vec<Entry<E>>,
    next_seq: u64,
}

impl<E> Schedule<E> {
    pub fn new() -> Self {
        Schedule {
            pending: Vec::new(),
            next_seq: 0,
        }
    }

    /// Register `event` to fire once `due(elapsed)` is called with an elapsed
    /// time of at least `due_ns`.
    pub fn arm(&mut self, due_ns: u64, event: E) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Entry { seq, due_ns, event });
        TimerHandle(seq)
    }

    /// Cancel one entry. Unknown or already-fired handles are ignored.
    pub fn cancel(&mut self, handle: TimerHandle) {
        self.pending.retain(|e| e.seq != handle.0);
    }

    /// Cancel every outstanding entry. Idempotent, and safe when entries
    /// already fired or none were ever armed.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Drain every entry whose offset has been reached, in (due, registration)
    /// order. Entries not yet due stay armed.
    pub fn due(&mut self, elapsed_ns: u64) -> Vec<E> {
        let mut fired: Vec<Entry<E>> = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].due_ns <= elapsed_ns {
                fired.push(self.pending.swap_remove(i));
            } else {
                i += 1;
            }
        }
        fired.sort_by_key(|e| (e.due_ns, e.seq));
        fired.into_iter().map(|e| e.event).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_due_then_registration_order() {
        let mut schedule = Schedule::new();
        schedule.arm(200, "deadline");
        schedule.arm(100, "show-primary");
        schedule.arm(200, "late-but-registered-after-deadline");

        assert_eq!(schedule.due(50), Vec::<&str>::new());
        assert_eq!(schedule.due(100), vec!["show-primary"]);
        assert_eq!(
            schedule.due(250),
            vec!["deadline", "late-but-registered-after-deadline"]
        );
        assert!(schedule.is_empty());
    }

    #[test]
    fn cancel_all_beats_an_already_due_entry() {
        let mut schedule = Schedule::new();
        schedule.arm(100, "swap");
        // the entry is due, but cancellation wins over firing order
        schedule.cancel_all();
        assert_eq!(schedule.due(100), Vec::<&str>::new());
        // idempotent, including on an empty schedule
        schedule.cancel_all();
        assert!(schedule.is_empty());
    }

    #[test]
    fn targeted_cancel_leaves_the_rest() {
        let mut schedule = Schedule::new();
        let swap = schedule.arm(100, "swap");
        schedule.arm(200, "deadline");
        schedule.cancel(swap);
        schedule.cancel(swap);
        assert_eq!(schedule.due(300), vec!["deadline"]);
    }

    #[test]
    fn entries_due_at_zero_fire_on_first_poll() {
        let mut schedule = Schedule::new();
        schedule.arm(0, "immediate");
        assert_eq!(schedule.due(0), vec!["immediate"]);
    }
}
