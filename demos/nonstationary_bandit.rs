//! Sample averages against a constant step size on a drifting bandit
//!
//! Every arm value takes a small random-walk step after each pull. The
//! agent with a constant step size keeps track of the moving values, the
//! sample-average agent does not.

use std::time::Instant;

use anyhow::Result;
use metropolis_rs::{simulate_runs, BanditSettings, ValueEstimator};

fn main() -> Result<()> {
    let estimators = [
        ValueEstimator::SampleAverage,
        ValueEstimator::ConstantStep(0.1),
    ];

    for estimator in estimators {
        let settings = BanditSettings {
            estimator,
            ..Default::default()
        };
        let start = Instant::now();
        let summary = simulate_runs(&settings)?;
        println!(
            "{:?} ({} runs of {} steps in {:.2?})",
            estimator,
            settings.num_runs,
            settings.num_steps,
            start.elapsed()
        );
        for checkpoint in [1000, 2500, 5000, 7500, 10_000] {
            let window = &summary.optimal_fraction[checkpoint - 1000..checkpoint];
            let reward = &summary.mean_reward[checkpoint - 1000..checkpoint];
            println!(
                "  steps {:>5}-{:>5}: optimal {:.3}  reward {:.3}",
                checkpoint - 1000,
                checkpoint,
                window.iter().sum::<f64>() / window.len() as f64,
                reward.iter().sum::<f64>() / reward.len() as f64,
            );
        }
    }
    Ok(())
}
