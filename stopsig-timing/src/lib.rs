pub mod schedule;
pub mod timer;

pub use schedule::{Schedule, TimerHandle};
pub use timer::{FrameTimingStats, HighPrecisionTimer, ManualTimer, Timer};
