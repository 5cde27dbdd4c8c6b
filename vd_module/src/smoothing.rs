use api::UnifiedExpressions;

pub const DEFAULT_SMOOTHING_FACTOR: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

/// One filtered quantity. Distinct slots never share state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// A unified channel read through the mapping table.
    Shape(UnifiedExpressions),
    /// A unified channel computed from several raw channels.
    Composite(UnifiedExpressions),
    Openness(Eye),
    Gaze(Eye, Axis),
}

const SHAPES: usize = UnifiedExpressions::COUNT;
const SLOT_COUNT: usize = SHAPES * 2 + 2 + 4;

impl Slot {
    fn index(self) -> usize {
        match self {
            Slot::Shape(unified) => unified as usize,
            Slot::Composite(unified) => SHAPES + unified as usize,
            Slot::Openness(eye) => SHAPES * 2 + eye as usize,
            Slot::Gaze(eye, axis) => SHAPES * 2 + 2 + eye as usize * 2 + axis as usize,
        }
    }
}

/// Single-pole exponential filter with one state value per [`Slot`].
///
/// `state = state * alpha + raw * (1 - alpha)`. With the default alpha of 0.5
/// the group delay is about one tick.
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    alpha: f32,
    state: Vec<f32>,
}

impl TemporalSmoother {
    /// `alpha` is clamped to `[0, 1)`; 0 disables smoothing.
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(0.0, 1.0 - f32::EPSILON)
        } else {
            DEFAULT_SMOOTHING_FACTOR
        };
        Self {
            alpha,
            state: vec![0.0; SLOT_COUNT],
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Advances `slot` by one step. An invalid frame, or a NaN sample, leaves
    /// the slot untouched and returns the held value.
    pub fn filter(&mut self, slot: Slot, raw: f32, valid_frame: bool) -> f32 {
        let value = &mut self.state[slot.index()];
        if valid_frame && !raw.is_nan() {
            *value = *value * self.alpha + raw * (1.0 - self.alpha);
        }
        *value
    }

    pub fn value(&self, slot: Slot) -> f32 {
        self.state[slot.index()]
    }

    pub fn reset(&mut self) {
        self.state.fill(0.0);
    }
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_disjoint() {
        let mut slots = vec![Slot::Openness(Eye::Left), Slot::Openness(Eye::Right)];
        for eye in [Eye::Left, Eye::Right] {
            for axis in [Axis::X, Axis::Y] {
                slots.push(Slot::Gaze(eye, axis));
            }
        }
        for unified in UnifiedExpressions::all() {
            slots.push(Slot::Shape(unified));
            slots.push(Slot::Composite(unified));
        }

        let mut indices: Vec<usize> = slots.iter().map(|s| s.index()).collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), slots.len());
        assert!(indices.iter().all(|&i| i < SLOT_COUNT));
    }

    #[test]
    fn converges_monotonically_to_constant_input() {
        let mut smoother = TemporalSmoother::default();
        let slot = Slot::Shape(UnifiedExpressions::JawOpen);
        let target = 0.8;

        let mut prev_error = f32::MAX;
        for _ in 0..40 {
            let error = (smoother.filter(slot, target, true) - target).abs();
            assert!(error <= prev_error);
            prev_error = error;
        }
        assert!(prev_error < 1e-6);
    }

    #[test]
    fn converges_from_above() {
        let mut smoother = TemporalSmoother::default();
        let slot = Slot::Openness(Eye::Right);
        for _ in 0..10 {
            smoother.filter(slot, 1.0, true);
        }
        let mut prev = smoother.value(slot);
        for _ in 0..40 {
            let next = smoother.filter(slot, 0.2, true);
            assert!(next <= prev && next >= 0.2);
            prev = next;
        }
        assert!((prev - 0.2).abs() < 1e-5);
    }

    #[test]
    fn invalid_frame_freezes_exactly() {
        let mut smoother = TemporalSmoother::default();
        let slot = Slot::Gaze(Eye::Left, Axis::Y);
        let held = smoother.filter(slot, 0.37, true);

        let frozen = smoother.filter(slot, 0.0, false);
        assert_eq!(frozen.to_bits(), held.to_bits());
        assert_eq!(smoother.filter(slot, f32::NAN, true).to_bits(), held.to_bits());
    }

    #[test]
    fn first_step_from_zero_is_half_way() {
        let mut smoother = TemporalSmoother::default();
        assert_eq!(smoother.filter(Slot::Openness(Eye::Left), 1.0, true), 0.5);
        assert_eq!(smoother.value(Slot::Openness(Eye::Right)), 0.0);
    }

    #[test]
    fn alpha_is_clamped() {
        assert_eq!(TemporalSmoother::new(-1.0).alpha(), 0.0);
        assert!(TemporalSmoother::new(2.0).alpha() < 1.0);
        assert_eq!(TemporalSmoother::new(f32::NAN).alpha(), DEFAULT_SMOOTHING_FACTOR);
    }
}
