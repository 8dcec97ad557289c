use stopsig_core::Stimulus;

/// Which slot of the trial the shown stimulus fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StimulusRole {
    Fixation,
    Primary,
    Secondary,
}

/// One replacement of the presentation area: the stimulus itself, its role,
/// the prompt that rides along with it, and whether a response has been
/// visually acknowledged on it.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusFrame<S> {
    pub stimulus: S,
    pub role: StimulusRole,
    pub prompt: Option<String>,
    pub responded: bool,
}

impl<S> StimulusFrame<S> {
    pub fn new(stimulus: S, role: StimulusRole) -> Self {
        StimulusFrame {
            stimulus,
            role,
            prompt: None,
            responded: false,
        }
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }
}

/// What is currently on screen. Pure rendering state: every swap is
/// synchronous and atomic, and no timing logic lives here.
#[derive(Debug)]
pub struct DisplaySurface<S> {
    current: Option<StimulusFrame<S>>,
}

impl<S: Stimulus> DisplaySurface<S> {
    pub fn new() -> Self {
        DisplaySurface { current: None }
    }

    pub fn show(&mut self, frame: StimulusFrame<S>) {
        self.current = Some(frame);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&StimulusFrame<S>> {
        self.current.as_ref()
    }

    pub fn is_blank(&self) -> bool {
        self.current.is_none()
    }

    /// Mark the currently shown stimulus as responded-to. The flag survives
    /// later swaps only as part of the new frame, mirroring an effect that
    /// attaches to whatever stimulus is on screen when the key lands.
    pub fn acknowledge_response(&mut self) {
        if let Some(frame) = &mut self.current {
            frame.responded = true;
        }
    }
}

impl<S: Stimulus> Default for DisplaySurface<S> {
    fn default() -> Self {
        Self::new()
    }
}
