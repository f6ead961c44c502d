use log::{debug, trace, warn};
use rustfft::FftPlanner;

use crate::{EstimateError, EstimateResult, SampleBlock, Spectrum};

/// How a block's loudness is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmplitudeMeasure {
    /// Root-mean-square of the samples
    Rms,
    /// Largest absolute sample
    Peak,
}

impl Default for AmplitudeMeasure {
    fn default() -> Self {
        AmplitudeMeasure::Rms
    }
}

/// Amplitude and dominant frequency of a block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureEstimate {
    pub amplitude: f32,
    /// In hz
    pub dominant_frequency: f32,
}

/// Rolling averages for amplitude and frequency
#[derive(Debug, Clone, Copy, PartialEq)]
struct SmoothingState {
    amplitude: f32,
    frequency: f32,
    learning_rate: f32,
}

impl SmoothingState {
    fn update(&mut self, raw: FeatureEstimate) -> FeatureEstimate {
        let rate = self.learning_rate;
        self.amplitude = (1.0 - rate) * self.amplitude + rate * raw.amplitude;
        self.frequency = (1.0 - rate) * self.frequency + rate * raw.dominant_frequency;
        self.estimate()
    }
    fn estimate(&self) -> FeatureEstimate {
        FeatureEstimate {
            amplitude: self.amplitude,
            dominant_frequency: self.frequency,
        }
    }
}

/// Converts raw audio into a smoothed amplitude and frequency stream
///
/// Every mutating operation takes `&mut self`, so callers sharing an estimator
/// between a capture thread and a render thread must serialize access
/// themselves, e.g. behind a `Mutex`.
pub struct FeatureEstimator {
    planner: FftPlanner<f32>,
    state: SmoothingState,
    smoothing: bool,
    measure: AmplitudeMeasure,
    initial: FeatureEstimate,
    min_learning_rate: f32,
    max_learning_rate: f32,
    learning_rate_step: f32,
}

pub struct FeatureEstimatorBuilder {
    /// Weight of the newest measurement in the rolling averages
    pub learning_rate: f32,
    /// Lower clamp for the learning rate
    pub min_learning_rate: f32,
    /// Upper clamp for the learning rate
    pub max_learning_rate: f32,
    /// Amount the learning rate moves per increase or decrease
    pub learning_rate_step: f32,
    pub smoothing: bool,
    pub measure: AmplitudeMeasure,
    /// Starting values of the rolling averages
    pub initial: FeatureEstimate,
}

impl FeatureEstimatorBuilder {
    pub fn learning_rate(self, learning_rate: f32) -> Self {
        FeatureEstimatorBuilder {
            learning_rate,
            ..self
        }
    }
    pub fn learning_rate_bounds(self, min_learning_rate: f32, max_learning_rate: f32) -> Self {
        FeatureEstimatorBuilder {
            min_learning_rate,
            max_learning_rate,
            ..self
        }
    }
    pub fn learning_rate_step(self, learning_rate_step: f32) -> Self {
        FeatureEstimatorBuilder {
            learning_rate_step,
            ..self
        }
    }
    pub fn smoothing(self, smoothing: bool) -> Self {
        FeatureEstimatorBuilder { smoothing, ..self }
    }
    pub fn measure(self, measure: AmplitudeMeasure) -> Self {
        FeatureEstimatorBuilder { measure, ..self }
    }
    pub fn initial(self, initial: FeatureEstimate) -> Self {
        FeatureEstimatorBuilder { initial, ..self }
    }
    pub fn build(self) -> EstimateResult<FeatureEstimator> {
        check_unit("learning rate", self.learning_rate)?;
        check_unit("minimum learning rate", self.min_learning_rate)?;
        check_unit("maximum learning rate", self.max_learning_rate)?;
        check_unit("learning rate step", self.learning_rate_step)?;
        if self.min_learning_rate > self.max_learning_rate {
            return Err(EstimateError::OutOfRange {
                what: "minimum learning rate",
                value: self.min_learning_rate,
            });
        }
        let initial = self.initial;
        if !valid_feature(initial.amplitude) || !valid_feature(initial.dominant_frequency) {
            return Err(EstimateError::InvalidInput(format!(
                "initial estimate {:?} must be finite and non-negative",
                initial
            )));
        }
        let learning_rate = self
            .learning_rate
            .max(self.min_learning_rate)
            .min(self.max_learning_rate);
        debug!(
            "feature estimator: learning rate {} in [{}, {}], smoothing {}, {:?}",
            learning_rate,
            self.min_learning_rate,
            self.max_learning_rate,
            self.smoothing,
            self.measure
        );
        Ok(FeatureEstimator {
            planner: FftPlanner::new(),
            state: SmoothingState {
                amplitude: initial.amplitude,
                frequency: initial.dominant_frequency,
                learning_rate,
            },
            smoothing: self.smoothing,
            measure: self.measure,
            initial,
            min_learning_rate: self.min_learning_rate,
            max_learning_rate: self.max_learning_rate,
            learning_rate_step: self.learning_rate_step,
        })
    }
}

/// Rates must lie in (0, 1]
fn check_unit(what: &'static str, value: f32) -> EstimateResult<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(EstimateError::OutOfRange { what, value })
    }
}

fn valid_feature(value: f32) -> bool {
    value.is_finite() && value >= 0.0
}

impl FeatureEstimator {
    pub fn builder() -> FeatureEstimatorBuilder {
        FeatureEstimatorBuilder {
            learning_rate: 0.1,
            min_learning_rate: f32::MIN_POSITIVE,
            max_learning_rate: 1.0,
            learning_rate_step: 0.01,
            smoothing: true,
            measure: AmplitudeMeasure::Rms,
            initial: FeatureEstimate::default(),
        }
    }
    /// Measure a block and fold it into the rolling averages
    ///
    /// While smoothing is disabled the raw measurement is returned and the
    /// averages are left alone.
    pub fn process(&mut self, block: SampleBlock) -> EstimateResult<FeatureEstimate> {
        let raw = self.measure(&block)?;
        if !self.smoothing {
            return Ok(raw);
        }
        let smoothed = self.state.update(raw);
        trace!("raw {:?}, smoothed {:?}", raw, smoothed);
        Ok(smoothed)
    }
    /// Measure a block without touching the rolling averages
    pub fn measure(&mut self, block: &SampleBlock) -> EstimateResult<FeatureEstimate> {
        let spectrum = self.spectrum(block)?;
        let amplitude = match self.measure {
            AmplitudeMeasure::Rms => block.rms(),
            AmplitudeMeasure::Peak => block.peak(),
        };
        Ok(FeatureEstimate {
            amplitude,
            dominant_frequency: spectrum.dominant(),
        })
    }
    pub fn spectrum(&mut self, block: &SampleBlock) -> EstimateResult<Spectrum> {
        if let Err(e) = block.validate() {
            warn!("rejected sample block: {}", e);
            return Err(e);
        }
        Ok(Spectrum::from_samples(
            block.samples(),
            block.sample_rate(),
            &mut self.planner,
        ))
    }
    pub fn learning_rate(&self) -> f32 {
        self.state.learning_rate
    }
    /// Set the learning rate, clamped to the configured bounds
    ///
    /// Rates outside (0, 1] are rejected.
    pub fn set_learning_rate(&mut self, rate: f32) -> EstimateResult<()> {
        check_unit("learning rate", rate)?;
        self.state.learning_rate = rate.max(self.min_learning_rate).min(self.max_learning_rate);
        debug!("learning rate set to {}", self.state.learning_rate);
        Ok(())
    }
    /// Step the learning rate up, returning the new rate
    pub fn increase_learning_rate(&mut self) -> f32 {
        let rate = (self.state.learning_rate + self.learning_rate_step).min(self.max_learning_rate);
        self.state.learning_rate = rate;
        debug!("learning rate increased to {}", rate);
        rate
    }
    /// Step the learning rate down, returning the new rate
    ///
    /// Stepping down never goes below one step, so the averages cannot freeze.
    pub fn decrease_learning_rate(&mut self) -> f32 {
        let current = self.state.learning_rate;
        let floor = current.min(self.learning_rate_step.max(self.min_learning_rate));
        let rate = (current - self.learning_rate_step).max(floor);
        self.state.learning_rate = rate;
        debug!("learning rate decreased to {}", rate);
        rate
    }
    pub fn smoothing_enabled(&self) -> bool {
        self.smoothing
    }
    pub fn set_smoothing_enabled(&mut self, enabled: bool) {
        self.smoothing = enabled;
        debug!("smoothing {}", if enabled { "enabled" } else { "disabled" });
    }
    /// Flip smoothing on or off, returning whether it is now enabled
    pub fn toggle_smoothing(&mut self) -> bool {
        self.set_smoothing_enabled(!self.smoothing);
        self.smoothing
    }
    /// The current rolling averages
    pub fn smoothed(&self) -> FeatureEstimate {
        self.state.estimate()
    }
    /// Return the rolling averages to their initial values
    pub fn reset(&mut self) {
        self.state.amplitude = self.initial.amplitude;
        self.state.frequency = self.initial.dominant_frequency;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(samples: &[f32]) -> SampleBlock {
        SampleBlock::new(samples.to_vec(), 8000)
    }

    #[test]
    fn builder_validation() {
        let out_of_range = |builder: FeatureEstimatorBuilder| {
            matches!(builder.build(), Err(EstimateError::OutOfRange { .. }))
        };
        assert!(out_of_range(FeatureEstimator::builder().learning_rate(0.0)));
        assert!(out_of_range(FeatureEstimator::builder().learning_rate(1.1)));
        assert!(out_of_range(FeatureEstimator::builder().learning_rate_step(0.0)));
        assert!(out_of_range(
            FeatureEstimator::builder().learning_rate_bounds(0.5, 0.2)
        ));
        assert!(out_of_range(
            FeatureEstimator::builder().learning_rate_bounds(0.0, 0.2)
        ));
        assert!(matches!(
            FeatureEstimator::builder()
                .initial(FeatureEstimate {
                    amplitude: -1.0,
                    dominant_frequency: 0.0
                })
                .build(),
            Err(EstimateError::InvalidInput(_))
        ));
    }

    #[test]
    fn builder_clamps_initial_rate() {
        let estimator = FeatureEstimator::builder()
            .learning_rate(0.9)
            .learning_rate_bounds(0.05, 0.5)
            .build()
            .unwrap();
        assert_eq!(estimator.learning_rate(), 0.5);
    }

    #[test]
    fn set_learning_rate_clamps_to_bounds() {
        let mut estimator = FeatureEstimator::builder()
            .learning_rate_bounds(0.05, 0.5)
            .build()
            .unwrap();
        estimator.set_learning_rate(0.9).unwrap();
        assert_eq!(estimator.learning_rate(), 0.5);
        estimator.set_learning_rate(0.01).unwrap();
        assert_eq!(estimator.learning_rate(), 0.05);
        assert!(estimator.set_learning_rate(f32::NAN).is_err());
        assert!(estimator.set_learning_rate(-0.1).is_err());
        assert_eq!(estimator.learning_rate(), 0.05);
    }

    #[test]
    fn learning_rate_steps() {
        let mut estimator = FeatureEstimator::builder()
            .learning_rate(0.5)
            .learning_rate_step(0.25)
            .build()
            .unwrap();
        assert_eq!(estimator.increase_learning_rate(), 0.75);
        assert_eq!(estimator.increase_learning_rate(), 1.0);
        assert_eq!(estimator.increase_learning_rate(), 1.0);
        assert_eq!(estimator.decrease_learning_rate(), 0.75);
        assert_eq!(estimator.decrease_learning_rate(), 0.5);
        assert_eq!(estimator.decrease_learning_rate(), 0.25);
        assert_eq!(estimator.decrease_learning_rate(), 0.25);

        estimator.set_learning_rate(0.1).unwrap();
        assert_eq!(estimator.decrease_learning_rate(), 0.1);
    }

    #[test]
    fn peak_measure() {
        let mut estimator = FeatureEstimator::builder()
            .measure(AmplitudeMeasure::Peak)
            .smoothing(false)
            .build()
            .unwrap();
        let estimate = estimator.process(block(&[0.1, -0.8, 0.3])).unwrap();
        assert_eq!(estimate.amplitude, 0.8);
    }

    #[test]
    fn measure_leaves_state_alone() {
        let mut estimator = FeatureEstimator::builder().build().unwrap();
        let raw = estimator.measure(&block(&[0.5, -0.5, 0.5, -0.5])).unwrap();
        assert!(raw.amplitude > 0.0);
        assert_eq!(estimator.smoothed(), FeatureEstimate::default());
    }

    #[test]
    fn toggle_and_reset() {
        let initial = FeatureEstimate {
            amplitude: 0.2,
            dominant_frequency: 300.0,
        };
        let mut estimator = FeatureEstimator::builder()
            .initial(initial)
            .learning_rate(0.5)
            .build()
            .unwrap();
        assert!(estimator.smoothing_enabled());
        assert!(!estimator.toggle_smoothing());
        assert!(estimator.toggle_smoothing());

        estimator.process(block(&[0.9, -0.9, 0.9, -0.9])).unwrap();
        assert_ne!(estimator.smoothed(), initial);
        estimator.reset();
        assert_eq!(estimator.smoothed(), initial);
    }

    #[test]
    fn rejects_invalid_blocks_without_state_change() {
        let mut estimator = FeatureEstimator::builder().build().unwrap();
        assert!(matches!(
            estimator.process(block(&[])),
            Err(EstimateError::InvalidInput(_))
        ));
        assert!(matches!(
            estimator.process(block(&[0.1, f32::INFINITY])),
            Err(EstimateError::InvalidInput(_))
        ));
        assert_eq!(estimator.smoothed(), FeatureEstimate::default());
    }
}
