/// Defines experiment phases and behavior
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn allows_response(&self) -> bool;
    fn next(&self) -> Option<Self>;

    fn is_practice(&self) -> bool {
        false
    }
    fn is_experiment(&self) -> bool {
        false
    }
    fn is_welcome(&self) -> bool {
        false
    }
    fn is_debrief(&self) -> bool {
        false
    }
}

/// Phase order of the stop-signal experiment: one practice block with
/// immediate feedback, then the experimental blocks, then the debrief.
#[derive(Copy, Debug, Clone, PartialEq, Default)]
pub enum StandardPhase {
    #[default]
    Welcome,
    Practice,
    Experiment,
    Debrief,
}

impl Phase for StandardPhase {
    fn allows_response(&self) -> bool {
        matches!(self, StandardPhase::Practice | StandardPhase::Experiment)
    }

    fn next(&self) -> Option<Self> {
        use StandardPhase::*;
        Some(match self {
            Welcome => Practice,
            Practice => Experiment,
            Experiment => Debrief,
            Debrief => return None,
        })
    }

    fn is_practice(&self) -> bool {
        matches!(self, StandardPhase::Practice)
    }

    fn is_experiment(&self) -> bool {
        matches!(self, StandardPhase::Experiment)
    }

    fn is_welcome(&self) -> bool {
        matches!(self, StandardPhase::Welcome)
    }

    fn is_debrief(&self) -> bool {
        matches!(self, StandardPhase::Debrief)
    }
}
