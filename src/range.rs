const MIN_WIDTH: f32 = 1e-6;

/// Self-adjusting range that maps feature values to ratios for driving visuals
///
/// Values above the range stretch it, values below move its lower bound down,
/// and [`AdaptiveRange::decay`] slowly shrinks it again so the range follows
/// the signal over time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveRange {
    lower: f32,
    width: f32,
    decay: f32,
}

impl AdaptiveRange {
    pub fn new(lower: f32, width: f32) -> Self {
        AdaptiveRange {
            lower,
            width: width.max(MIN_WIDTH),
            decay: 0.999,
        }
    }
    /// Set the factor the width is multiplied by on each decay
    pub fn with_decay(self, decay: f32) -> Self {
        AdaptiveRange {
            decay: decay.max(0.0).min(1.0),
            ..self
        }
    }
    pub fn lower(&self) -> f32 {
        self.lower
    }
    pub fn upper(&self) -> f32 {
        self.lower + self.width
    }
    pub fn width(&self) -> f32 {
        self.width
    }
    pub fn bounds(&self) -> (f32, f32) {
        (self.lower, self.upper())
    }
    /// Position of `value` within the range before it is adjusted
    ///
    /// The result is outside 0..=1 exactly when the range had to grow.
    /// Non-finite values map to zero and leave the range unchanged.
    pub fn observe(&mut self, value: f32) -> f32 {
        if !value.is_finite() {
            return 0.0;
        }
        let ratio = (value - self.lower) / self.width;
        if ratio > 1.0 {
            self.width = (value - self.lower).max(MIN_WIDTH);
        } else if ratio < 0.0 {
            self.lower = value;
        }
        ratio
    }
    pub fn decay(&mut self) {
        self.width = (self.width * self.decay).max(MIN_WIDTH);
    }
}
