pub mod key;
pub mod outcome;
pub mod phase;
pub mod spec;
pub mod stimulus;
pub mod trial;

pub use key::{Key, KeySet};
pub use outcome::TrialOutcome;
pub use phase::{Phase, StandardPhase};
pub use spec::TrialSpec;
pub use stimulus::{ArrowDirection, Stimulus, StimulusType};
pub use trial::{ResponseEvent, TrialPhase};
