use serde::Serialize;
use stopsig_cache::intern_text;

/// Defines stimuli and their render identity.
///
/// Equality carries experimental meaning: a trial whose primary and secondary
/// stimuli compare equal is a go trial and never swaps its display.
pub trait Stimulus: Clone + PartialEq + Send + Sync + std::fmt::Debug {
    fn cache_id(&self) -> usize;
    fn is_text(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArrowDirection {
    Left,
    Right,
}

/// Drawable stimuli of the stop-signal task. The arrows are the go stimuli;
/// `SignaledArrow` is the same arrow recolored inside a signal ring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StimulusType {
    FixationCross {
        size: f32,
        color: [u8; 4],
    },
    Arrow {
        direction: ArrowDirection,
        size: f32,
        color: [u8; 4],
    },
    SignaledArrow {
        direction: ArrowDirection,
        size: f32,
        color: [u8; 4],
        ring: [u8; 4],
    },
    Text {
        content: &'static str,
        size: f32,
        color: [u8; 4],
    },
}

impl Stimulus for StimulusType {
    fn cache_id(&self) -> usize {
        match self {
            StimulusType::FixationCross { .. } => 0,
            StimulusType::Arrow { direction, .. } => 1 + *direction as usize,
            StimulusType::SignaledArrow { direction, .. } => 3 + *direction as usize,
            // Add more variants here, ensuring unique IDs.
            StimulusType::Text { content, .. } => 5 + intern_text(content),
        }
    }

    fn is_text(&self) -> bool {
        matches!(self, StimulusType::Text { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_ids_are_distinct_per_variant() {
        let white = [255, 255, 255, 255];
        let red = [204, 0, 0, 255];
        let stimuli = [
            StimulusType::FixationCross {
                size: 40.0,
                color: white,
            },
            StimulusType::Arrow {
                direction: ArrowDirection::Left,
                size: 60.0,
                color: white,
            },
            StimulusType::Arrow {
                direction: ArrowDirection::Right,
                size: 60.0,
                color: white,
            },
            StimulusType::SignaledArrow {
                direction: ArrowDirection::Left,
                size: 60.0,
                color: red,
                ring: red,
            },
            StimulusType::SignaledArrow {
                direction: ArrowDirection::Right,
                size: 60.0,
                color: red,
                ring: red,
            },
        ];
        for (i, a) in stimuli.iter().enumerate() {
            for b in &stimuli[i + 1..] {
                assert_ne!(a.cache_id(), b.cache_id(), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn go_and_stop_variants_differ() {
        let go = StimulusType::Arrow {
            direction: ArrowDirection::Left,
            size: 60.0,
            color: [255, 255, 255, 255],
        };
        let stop = StimulusType::SignaledArrow {
            direction: ArrowDirection::Left,
            size: 60.0,
            color: [204, 0, 0, 255],
            ring: [204, 0, 0, 255],
        };
        assert_ne!(go, stop);
        assert_eq!(go, go.clone());
    }
}
