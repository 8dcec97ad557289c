pub mod controller;
pub mod display;
pub mod finalize;
pub mod listener;

pub use controller::TrialController;
pub use display::{DisplaySurface, StimulusFrame, StimulusRole};
pub use finalize::finalize;
pub use listener::ResponseListener;
