use swell::*;

fn main() {
    env_logger::init();
    let input = Microphone::builder()
        .block_size(2048)
        .skip_stale(true)
        .build()
        .unwrap();
    let mut estimator = FeatureEstimator::builder().build().unwrap();
    for block in input {
        let estimate = estimator.process(block).unwrap();
        println!("{:.1}", estimate.dominant_frequency);
    }
}
