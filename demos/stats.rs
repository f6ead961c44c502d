use swell::*;

/// Prints what a statistics overlay would show, flipping smoothing every
/// 50 blocks and walking the learning rate up and down.
fn main() {
    env_logger::init();
    const BANDS: usize = 20;
    let input = Microphone::from_default_device().unwrap();
    let mut estimator = FeatureEstimator::builder()
        .smoothing(false)
        .build()
        .unwrap();
    let mut amplitude = AdaptiveRange::new(0.03, 0.003);
    let mut frequency = AdaptiveRange::new(1000.0, 100.0);
    for (i, block) in input.enumerate() {
        if i % 50 == 49 {
            estimator.toggle_smoothing();
        }
        if i % 10 == 9 {
            if (i / 100) % 2 == 0 {
                estimator.increase_learning_rate();
            } else {
                estimator.decrease_learning_rate();
            }
        }
        let spectrum = estimator.spectrum(&block).unwrap();
        let estimate = estimator.process(block).unwrap();
        let amp_ratio = amplitude.observe(estimate.amplitude);
        let freq_ratio = frequency.observe(estimate.dominant_frequency);
        amplitude.decay();
        frequency.decay();

        println!("-----------------------------------------");
        println!(
            "Amplitude {:.4} ({:.2})    Frequency {:.1} ({:.2})",
            estimate.amplitude, amp_ratio, estimate.dominant_frequency, freq_ratio
        );
        let (lo, hi) = amplitude.bounds();
        println!("Ampl {:.4} {:.4}", lo, hi);
        let (lo, hi) = frequency.bounds();
        println!("Freq {:.1} {:.1}", lo, hi);
        if estimator.smoothing_enabled() {
            println!("Learning Rate {:.2}", estimator.learning_rate());
        }
        for band in spectrum.bands(BANDS) {
            println!("{:#^1$}", "", (band * 10.0) as usize);
        }
    }
}
