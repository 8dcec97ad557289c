use stopsig_core::{Key, KeySet, ResponseEvent};

/// Captures at most one qualifying keypress per trial.
///
/// The listener enforces "first press wins" itself; the trial controller
/// re-checks on top of that, so a press racing a cancellation can never
/// overwrite a recorded response.
#[derive(Debug)]
pub struct ResponseListener {
    armed: bool,
    keys: KeySet,
    response: Option<ResponseEvent>,
}

impl ResponseListener {
    /// A listener that hears nothing until armed.
    pub fn idle() -> Self {
        ResponseListener {
            armed: false,
            keys: KeySet::None,
            response: None,
        }
    }

    /// Arm for the given key set. With the "no keys" sentinel this is a no-op
    /// and no response can ever be recorded.
    pub fn arm(&mut self, keys: &KeySet) {
        if keys.is_none() {
            return;
        }
        self.keys = keys.clone();
        self.armed = true;
    }

    /// Offer an observed keypress. Returns true only for the first qualifying
    /// press while armed; everything else is observed and discarded.
    pub fn offer(&mut self, key: Key, at_ns: u64) -> bool {
        if !self.armed || self.response.is_some() || !self.keys.admits(&key) {
            return false;
        }
        self.response = Some(ResponseEvent { key, at_ns });
        true
    }

    /// Deafen the listener. Idempotent; the recorded response survives for
    /// the finalizer.
    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn response(&self) -> Option<&ResponseEvent> {
        self.response.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_qualifying_press_is_recorded() {
        let mut listener = ResponseListener::idle();
        listener.arm(&KeySet::of(["leftarrow", "rightarrow"]));

        assert!(!listener.offer(Key::new("space"), 100)); // not in set
        assert!(listener.offer(Key::new("leftarrow"), 200));
        assert!(!listener.offer(Key::new("rightarrow"), 300)); // second press

        let response = listener.response().unwrap();
        assert_eq!(response.key, Key::new("leftarrow"));
        assert_eq!(response.at_ns, 200);
    }

    #[test]
    fn no_keys_sentinel_never_arms() {
        let mut listener = ResponseListener::idle();
        listener.arm(&KeySet::None);
        assert!(!listener.is_armed());
        assert!(!listener.offer(Key::new("leftarrow"), 100));
        assert!(listener.response().is_none());
    }

    #[test]
    fn cancel_is_idempotent_and_keeps_the_response() {
        let mut listener = ResponseListener::idle();
        listener.arm(&KeySet::All);
        assert!(listener.offer(Key::new("space"), 50));
        listener.cancel();
        listener.cancel();
        assert!(!listener.offer(Key::new("space"), 60));
        assert_eq!(listener.response().unwrap().at_ns, 50);
    }

    #[test]
    fn unarmed_listener_hears_nothing() {
        let mut listener = ResponseListener::idle();
        assert!(!listener.offer(Key::new("space"), 10));
        assert!(listener.response().is_none());
    }
}
