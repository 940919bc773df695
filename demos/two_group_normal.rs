//! Compare the means of two groups with a shared variance
//!
//! Runs four parallel Metropolis-Hastings chains on the two group normal
//! model, prints posterior summaries and writes the post-tuning draws as
//! CmdStan-like CSV files.

use std::time::{Duration, Instant};

use anyhow::Result;
use metropolis_rs::{
    sample_parallel, ChainProgress, CsvConfig, MetropolisSettings, Model, NormalPrior,
    ProgressCallback, TwoGroupNormal,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

fn summary(name: &str, values: &[f64]) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.);
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let quantile = |q: f64| sorted[((n - 1.) * q).round() as usize];
    println!(
        "  {:<8} mean {:>8.4}  sd {:>7.4}  90% interval [{:.4}, {:.4}]",
        name,
        mean,
        var.sqrt(),
        quantile(0.05),
        quantile(0.95)
    );
}

fn main() -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(20);
    let group_a = Normal::new(10., 2.)?;
    let group_b = Normal::new(11., 2.)?;
    let model = TwoGroupNormal::new(
        (0..40).map(|_| group_a.sample(&mut rng)).collect(),
        (0..40).map(|_| group_b.sample(&mut rng)).collect(),
        NormalPrior {
            mean: 10.,
            ..Default::default()
        },
    )?;

    let settings = MetropolisSettings {
        num_tune: 2000,
        num_draws: 5000,
        num_chains: 4,
        seed: 54,
        ..Default::default()
    };

    let callback = ProgressCallback {
        callback: Box::new(|elapsed: Duration, chains: Box<[ChainProgress]>| {
            let done: usize = chains.iter().map(|c| c.finished_draws).sum();
            let total: usize = chains.iter().map(|c| c.total_draws).sum();
            println!("{:>8.2?}: {} / {} draws", elapsed, done, total);
        }),
        rate: Duration::from_millis(100),
    };

    let start = Instant::now();
    let trace = sample_parallel(&model, settings, 4, Some(callback))?;
    println!("Sampling finished in {:?}\n", start.elapsed());

    for chain in trace.chains.iter() {
        println!(
            "Chain {}: acceptance rate {:.3}",
            chain.chain_id,
            chain.acceptance_rate(false)
        );
    }

    println!("\nPosterior:");
    let params = model.params();
    for (i, param) in params.iter().enumerate() {
        summary(&param.name, &trace.posterior_values(i));
    }
    let diff = trace
        .posterior_values(1)
        .iter()
        .zip(trace.posterior_values(0).iter())
        .map(|(b, a)| b - a)
        .collect::<Vec<_>>();
    summary("mu_b-mu_a", &diff);
    let prob = diff.iter().filter(|&&d| d > 0.).count() as f64 / diff.len() as f64;
    println!("  P(mu_b > mu_a) = {:.3}", prob);

    let output_path = "csv_output";
    let paths = CsvConfig::new(output_path)
        .store_warmup(false)
        .write(&trace, &params)?;
    println!("\nWrote {} files to {}/", paths.len(), output_path);
    Ok(())
}
