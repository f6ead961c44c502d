use std::{cmp::Ordering, f32::consts::PI};

use rustfft::{num_complex::Complex, FftPlanner};

/// Magnitude spectrum of a single block, from DC up to the Nyquist frequency
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    amps: Vec<f32>,
    fft_len: usize,
    sample_rate: u32,
    dominant: f32,
}

impl Spectrum {
    /// The samples are mean-centered, scaled to unit peak and Hann-windowed
    /// before the transform, so arbitrarily loud blocks cannot overflow it.
    /// Magnitudes are scaled back afterwards, saturating at `f32::MAX`.
    pub(crate) fn from_samples(
        samples: &[f32],
        sample_rate: u32,
        planner: &mut FftPlanner<f32>,
    ) -> Self {
        let fft_len = samples.len();
        if fft_len == 0 {
            return Spectrum {
                amps: Vec::new(),
                fft_len,
                sample_rate,
                dominant: 0.0,
            };
        }
        let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / fft_len as f64;
        let scale = samples
            .iter()
            .map(|&s| (s as f64 - mean).abs())
            .fold(0.0, f64::max);
        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let centered = if scale > 0.0 {
                    ((s as f64 - mean) / scale) as f32
                } else {
                    0.0
                };
                Complex::new(centered * hann(i, fft_len), 0.0)
            })
            .collect();
        let fft = planner.plan_fft_forward(fft_len);
        fft.process(&mut buffer);
        buffer.truncate(fft_len / 2 + 1);
        let shape: Vec<f32> = buffer
            .into_iter()
            .map(Complex::norm)
            .map(|s| if s.is_nan() { 0.0 } else { s })
            .collect();
        let bin_width = sample_rate as f32 / fft_len as f32;
        let dominant = peak_frequency(&shape, bin_width, sample_rate as f32 / 2.0);
        Spectrum {
            amps: shape
                .into_iter()
                .map(|a| (a as f64 * scale).min(f32::MAX as f64) as f32)
                .collect(),
            fft_len,
            sample_rate,
            dominant,
        }
    }
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    /// Number of bins
    pub fn len(&self) -> usize {
        self.amps.len()
    }
    pub fn is_empty(&self) -> bool {
        self.amps.is_empty()
    }
    pub fn magnitudes(&self) -> &[f32] {
        &self.amps
    }
    pub fn bin_width(&self) -> f32 {
        if self.fft_len == 0 {
            return 0.0;
        }
        self.sample_rate as f32 / self.fft_len as f32
    }
    pub fn frequency_at(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_width()
    }
    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }
    /// Linearly interpolated magnitude at a frequency
    ///
    /// Frequencies that are negative, non-finite, or above Nyquist have no
    /// energy.
    pub fn amplitude(&self, freq: f32) -> f32 {
        if self.is_empty() || !freq.is_finite() || freq < 0.0 || freq > self.nyquist() {
            return 0.0;
        }
        let ratio = freq / self.bin_width();
        let floor = ratio.floor();
        let l = floor as usize;
        if l >= self.amps.len() {
            return 0.0;
        }
        let r = (l + 1).min(self.amps.len() - 1);
        let param = ratio - floor;
        (1.0 - param) * self.amps[l] + param * self.amps[r]
    }
    /// The frequency with the most energy, in hz
    ///
    /// DC is ignored. Silence has a dominant frequency of zero.
    pub fn dominant(&self) -> f32 {
        self.dominant
    }
    /// Average magnitude of `count` equal-width groups of bins
    ///
    /// If there are fewer bins than bands, each band gets one bin and the
    /// remaining bands are zero.
    pub fn bands(&self, count: usize) -> Vec<f32> {
        if count == 0 {
            return Vec::new();
        }
        let step = (self.amps.len() / count).max(1);
        (0..count)
            .map(|i| {
                let start = (i * step).min(self.amps.len());
                let end = (start + step).min(self.amps.len());
                let group = &self.amps[start..end];
                if group.is_empty() {
                    0.0
                } else {
                    group.iter().sum::<f32>() / group.len() as f32
                }
            })
            .collect()
    }
}

/// Interpolated frequency of the loudest non-DC bin
fn peak_frequency(amps: &[f32], bin_width: f32, nyquist: f32) -> f32 {
    let peak = amps
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, a)| **a > 0.0)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let bin = match peak {
        Some((bin, _)) => bin,
        None => return 0.0,
    };
    let freq = (bin as f32 + peak_offset(amps, bin)) * bin_width;
    freq.max(0.0).min(nyquist)
}

/// Parabolic interpolation of the true peak position around a bin
fn peak_offset(amps: &[f32], bin: usize) -> f32 {
    if bin == 0 || bin + 1 >= amps.len() {
        return 0.0;
    }
    let (a, b, c) = (amps[bin - 1], amps[bin], amps[bin + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() <= f32::EPSILON {
        return 0.0;
    }
    (0.5 * (a - c) / denom).max(-0.5).min(0.5)
}

/// Periodic Hann window
fn hann(index: usize, size: usize) -> f32 {
    0.5 * (1.0 - (2.0 * PI * index as f32 / size as f32).cos())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freqs: &[(f32, f32)], sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                freqs
                    .iter()
                    .map(|&(f, a)| a * (2.0 * PI * f * t).sin())
                    .sum()
            })
            .collect()
    }

    fn spectrum(samples: &[f32], sample_rate: u32) -> Spectrum {
        Spectrum::from_samples(samples, sample_rate, &mut FftPlanner::new())
    }

    #[test]
    fn bin_centered_tone() {
        let spec = spectrum(&tone(&[(100.0, 0.5)], 1024, 1024), 1024);
        assert_eq!(spec.len(), 513);
        assert_eq!(spec.bin_width(), 1.0);
        assert!((spec.dominant() - 100.0).abs() < 0.01);
        assert_eq!(spec.amplitude(100.0), spec.magnitudes()[100]);
    }

    #[test]
    fn louder_tone_dominates() {
        let samples = tone(&[(300.0, 0.2), (1200.0, 0.6)], 8000, 4096);
        let spec = spectrum(&samples, 8000);
        assert!((spec.dominant() - 1200.0).abs() < spec.bin_width());
    }

    #[test]
    fn silence_and_dc_have_no_dominant() {
        assert_eq!(spectrum(&[0.0; 256], 8000).dominant(), 0.0);
        assert_eq!(spectrum(&[0.25; 256], 8000).dominant(), 0.0);
        assert_eq!(spectrum(&[0.7], 8000).dominant(), 0.0);
    }

    #[test]
    fn amplitude_out_of_range() {
        let spec = spectrum(&tone(&[(100.0, 0.5)], 1024, 1024), 1024);
        assert_eq!(spec.amplitude(-1.0), 0.0);
        assert_eq!(spec.amplitude(600.0), 0.0);
        assert_eq!(spec.amplitude(f32::NAN), 0.0);
        let between = spec.amplitude(100.5);
        assert!(between <= spec.magnitudes()[100]);
        assert!(between >= spec.magnitudes()[101]);
    }

    #[test]
    fn loud_blocks_do_not_overflow() {
        let unit = spectrum(&[1.0, -1.0, -1.0, 1.0, 0.0], 44100);
        let loud = spectrum(&[f32::MAX, -f32::MAX, -f32::MAX, f32::MAX, 0.0], 44100);
        assert_eq!(unit.dominant(), 17640.0);
        assert_eq!(loud.dominant(), unit.dominant());
        assert!(loud.magnitudes().iter().all(|a| a.is_finite()));

        let quiet = spectrum(&tone(&[(1000.0, 1.0)], 8000, 1024), 8000);
        let samples: Vec<f32> = tone(&[(1000.0, 1e38)], 8000, 1024);
        let loud = spectrum(&samples, 8000);
        assert!((loud.dominant() - quiet.dominant()).abs() < 1e-3);
        assert!(loud.magnitudes().iter().all(|a| a.is_finite() && *a >= 0.0));
    }

    #[test]
    fn bands() {
        let spec = spectrum(&tone(&[(100.0, 0.5)], 1024, 1024), 1024);
        assert!(spec.bands(0).is_empty());

        let four = spec.bands(4);
        assert_eq!(four.len(), 4);
        assert!(four[0] > four[1] && four[0] > four[2] && four[0] > four[3]);

        let many = spec.bands(1000);
        assert_eq!(many.len(), 1000);
        assert_eq!(many[100], spec.magnitudes()[100]);
        assert_eq!(many[600], 0.0);
    }
}
