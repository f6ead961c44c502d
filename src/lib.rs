/*!
Smoothed amplitude and dominant frequency estimation for audio visualizers.

Raw audio arrives as [`SampleBlock`]s. A [`FeatureEstimator`] measures each
block's amplitude and dominant frequency and runs both through a rolling
average, so visuals driven by the result move without flicker.

```
use swell::{FeatureEstimator, SampleBlock, DEFAULT_SAMPLE_RATE};

let mut estimator = FeatureEstimator::builder().learning_rate(0.5).build().unwrap();
let samples = (0..2048)
    .map(|i| (2.0 * std::f32::consts::PI * 441.0 * i as f32 / DEFAULT_SAMPLE_RATE as f32).sin())
    .collect();
let estimate = estimator.process(SampleBlock::new(samples, DEFAULT_SAMPLE_RATE)).unwrap();
assert!(estimate.amplitude > 0.0);
```
*/

mod estimator;
#[cfg(feature = "input")]
mod input;
mod range;
mod spectrum;

use std::time::Duration;

pub use estimator::*;
#[cfg(feature = "input")]
pub use input::*;
pub use range::*;
pub use spectrum::*;

#[cfg(feature = "input")]
pub use cpal;

/// Sample rate of the capture format visualizers have historically used
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EstimateError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: f32 },
}

pub type EstimateResult<T> = Result<T, EstimateError>;

/// A chunk of mono audio captured over a fixed time slice
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBlock {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        SampleBlock {
            samples,
            sample_rate,
        }
    }
    /// Build a block from signed 16-bit PCM, scaled so full scale is ±1.0
    pub fn from_pcm_i16(samples: &[i16], sample_rate: u32) -> Self {
        SampleBlock::new(
            samples
                .iter()
                .map(|&s| s as f32 / -(i16::MIN as f32))
                .collect(),
            sample_rate,
        )
    }
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::from_secs(0);
        }
        Duration::from_secs_f64(self.len() as f64 / self.sample_rate as f64)
    }
    /// Root-mean-square of the samples
    pub fn rms(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| s as f64 * s as f64).sum();
        (sum / self.len() as f64).sqrt() as f32
    }
    /// Largest absolute sample
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0, |max, s| s.abs().max(max))
    }
    pub(crate) fn validate(&self) -> EstimateResult<()> {
        if self.is_empty() {
            return Err(EstimateError::InvalidInput("sample block is empty".into()));
        }
        if self.sample_rate == 0 {
            return Err(EstimateError::InvalidInput("sample rate is zero".into()));
        }
        if let Some(i) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(EstimateError::InvalidInput(format!(
                "sample {} is {}",
                i, self.samples[i]
            )));
        }
        Ok(())
    }
}
