//! Epsilon-greedy agents on a non-stationary multi-armed bandit.
//!
//! The true values of all arms start equal and take independent
//! random-walk steps after every pull. Sample-average value estimates weigh
//! old rewards as much as recent ones and fall behind, while a constant
//! step size tracks the moving values.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, PartialEq)]
pub enum BanditError {
    #[error("A bandit needs at least one arm")]
    NoArms,
    #[error("Exploration probability must be in [0, 1], got {0}")]
    InvalidEpsilon(f64),
    #[error("Constant step size must be in (0, 1], got {0}")]
    InvalidStepSize(f64),
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidDeviation { name: &'static str, value: f64 },
    #[error("Initial arm value must be finite, got {0}")]
    InvalidInitialValue(f64),
}

pub type Result<T> = std::result::Result<T, BanditError>;

/// How an agent turns observed rewards into value estimates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueEstimator {
    /// Step size `1 / n` for the `n`-th reward of an arm.
    SampleAverage,
    /// Exponential recency-weighted average with a fixed step size.
    ConstantStep(f64),
}

/// Settings for bandit simulations
#[derive(Debug, Clone, Copy)]
pub struct BanditSettings {
    pub num_arms: usize,
    pub num_steps: usize,
    /// Probability of pulling a uniformly random arm instead of the best one
    pub epsilon: f64,
    /// Standard deviation of the random walk of the true arm values
    pub walk_sd: f64,
    /// Standard deviation of rewards around the true arm value
    pub reward_sd: f64,
    pub initial_value: f64,
    pub estimator: ValueEstimator,
    /// Number of independent runs averaged by `simulate_runs`
    pub num_runs: usize,
    pub seed: u64,
}

impl Default for BanditSettings {
    fn default() -> Self {
        BanditSettings {
            num_arms: 10,
            num_steps: 10_000,
            epsilon: 0.1,
            walk_sd: 0.01,
            reward_sd: 1.,
            initial_value: 0.,
            estimator: ValueEstimator::SampleAverage,
            num_runs: 200,
            seed: 0,
        }
    }
}

fn check_deviation(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0. {
        return Err(BanditError::InvalidDeviation { name, value });
    }
    Ok(())
}

impl BanditSettings {
    pub fn validate(&self) -> Result<()> {
        if self.num_arms == 0 {
            return Err(BanditError::NoArms);
        }
        if !(0. ..=1.).contains(&self.epsilon) {
            return Err(BanditError::InvalidEpsilon(self.epsilon));
        }
        if let ValueEstimator::ConstantStep(alpha) = self.estimator {
            if !(alpha > 0. && alpha <= 1.) {
                return Err(BanditError::InvalidStepSize(alpha));
            }
        }
        if !self.initial_value.is_finite() {
            return Err(BanditError::InvalidInitialValue(self.initial_value));
        }
        check_deviation("walk_sd", self.walk_sd)?;
        check_deviation("reward_sd", self.reward_sd)?;
        Ok(())
    }
}

/// The true, drifting values of the arms
#[derive(Debug, Clone)]
pub struct Testbed {
    values: Box<[f64]>,
    walk_sd: f64,
    reward_sd: f64,
}

impl Testbed {
    pub fn new(num_arms: usize, initial_value: f64, walk_sd: f64, reward_sd: f64) -> Result<Self> {
        if num_arms == 0 {
            return Err(BanditError::NoArms);
        }
        if !initial_value.is_finite() {
            return Err(BanditError::InvalidInitialValue(initial_value));
        }
        check_deviation("walk_sd", walk_sd)?;
        check_deviation("reward_sd", reward_sd)?;
        Ok(Testbed {
            values: vec![initial_value; num_arms].into(),
            walk_sd,
            reward_sd,
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The arm with the highest true value. Ties go to the lowest index.
    pub fn optimal_arm(&self) -> usize {
        self.values
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (arm, &value)| {
                if value > best.1 {
                    (arm, value)
                } else {
                    best
                }
            })
            .0
    }

    /// Whether no arm has a higher true value than `arm`.
    pub fn is_optimal(&self, arm: usize) -> bool {
        let value = self.values[arm];
        self.values.iter().all(|&other| other <= value)
    }

    /// Draw a reward for `arm`, then move all arm values one random-walk step.
    pub fn pull<R: Rng + ?Sized>(&mut self, rng: &mut R, arm: usize) -> f64 {
        let noise: f64 = StandardNormal.sample(rng);
        let reward = self.values[arm] + self.reward_sd * noise;
        for value in self.values.iter_mut() {
            let step: f64 = StandardNormal.sample(rng);
            *value += self.walk_sd * step;
        }
        reward
    }
}

/// An agent choosing arms by epsilon-greedy action selection
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    estimates: Box<[f64]>,
    counts: Box<[u64]>,
    epsilon: f64,
    estimator: ValueEstimator,
}

impl EpsilonGreedy {
    pub fn new(num_arms: usize, epsilon: f64, estimator: ValueEstimator) -> Result<Self> {
        let settings = BanditSettings {
            num_arms,
            epsilon,
            estimator,
            ..Default::default()
        };
        settings.validate()?;
        Ok(EpsilonGreedy {
            estimates: vec![0.; num_arms].into(),
            counts: vec![0; num_arms].into(),
            epsilon,
            estimator,
        })
    }

    pub fn estimates(&self) -> &[f64] {
        &self.estimates
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Explore with probability epsilon, otherwise pick the arm with the
    /// highest estimate, breaking ties uniformly at random.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let num_arms = self.estimates.len();
        if rng.random::<f64>() < self.epsilon {
            return rng.random_range(0..num_arms);
        }
        // Reservoir selection over the tied maxima. NaN estimates never win.
        let mut best = f64::NEG_INFINITY;
        let mut choice = None;
        let mut ties = 0u64;
        for (arm, &value) in self.estimates.iter().enumerate() {
            if value > best {
                best = value;
                choice = Some(arm);
                ties = 1;
            } else if value == best {
                ties += 1;
                if rng.random_range(0..ties) == 0 {
                    choice = Some(arm);
                }
            }
        }
        choice.unwrap_or_else(|| rng.random_range(0..num_arms))
    }

    pub fn update(&mut self, arm: usize, reward: f64) {
        self.counts[arm] += 1;
        let step = match self.estimator {
            ValueEstimator::SampleAverage => 1. / self.counts[arm] as f64,
            ValueEstimator::ConstantStep(alpha) => alpha,
        };
        self.estimates[arm] += step * (reward - self.estimates[arm]);
    }
}

/// The per-step outcome of a single simulation
#[derive(Debug, Clone)]
pub struct BanditRun {
    pub rewards: Vec<f64>,
    /// Whether the chosen arm was the optimal arm at the time of the pull
    pub optimal: Vec<bool>,
}

/// Run one agent on one testbed for `settings.num_steps` steps.
pub fn simulate<R: Rng + ?Sized>(settings: &BanditSettings, rng: &mut R) -> Result<BanditRun> {
    settings.validate()?;
    let mut testbed = Testbed::new(
        settings.num_arms,
        settings.initial_value,
        settings.walk_sd,
        settings.reward_sd,
    )?;
    let mut agent = EpsilonGreedy::new(settings.num_arms, settings.epsilon, settings.estimator)?;

    let mut rewards = Vec::with_capacity(settings.num_steps);
    let mut optimal = Vec::with_capacity(settings.num_steps);
    for _ in 0..settings.num_steps {
        let arm = agent.select(rng);
        optimal.push(testbed.is_optimal(arm));
        let reward = testbed.pull(rng, arm);
        agent.update(arm, reward);
        rewards.push(reward);
    }
    Ok(BanditRun { rewards, optimal })
}

/// Per-step averages over many independent runs
#[derive(Debug, Clone)]
pub struct BanditSummary {
    pub mean_reward: Vec<f64>,
    pub optimal_fraction: Vec<f64>,
}

impl BanditSummary {
    fn tail_mean(values: &[f64], last: usize) -> f64 {
        let tail = &values[values.len().saturating_sub(last)..];
        if tail.is_empty() {
            return 0.;
        }
        tail.iter().sum::<f64>() / tail.len() as f64
    }

    /// Average reward over the final `last` steps.
    pub fn final_reward(&self, last: usize) -> f64 {
        Self::tail_mean(&self.mean_reward, last)
    }

    /// Fraction of optimal pulls over the final `last` steps.
    pub fn final_optimal_fraction(&self, last: usize) -> f64 {
        Self::tail_mean(&self.optimal_fraction, last)
    }
}

/// Average `settings.num_runs` independent simulations in parallel.
///
/// Run `i` uses stream `i` of a `ChaCha8Rng` seeded with `settings.seed`,
/// so the result does not depend on the number of threads.
pub fn simulate_runs(settings: &BanditSettings) -> Result<BanditSummary> {
    settings.validate()?;
    let runs = (0..settings.num_runs)
        .into_par_iter()
        .map(|run| {
            let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
            rng.set_stream(run as u64);
            simulate(settings, &mut rng)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut mean_reward = vec![0f64; settings.num_steps];
    let mut optimal_fraction = vec![0f64; settings.num_steps];
    for run in runs.iter() {
        for (total, &reward) in mean_reward.iter_mut().zip(run.rewards.iter()) {
            *total += reward;
        }
        for (total, &optimal) in optimal_fraction.iter_mut().zip(run.optimal.iter()) {
            *total += optimal as u8 as f64;
        }
    }
    let n = settings.num_runs.max(1) as f64;
    mean_reward.iter_mut().for_each(|x| *x /= n);
    optimal_fraction.iter_mut().for_each(|x| *x /= n);

    log::debug!(
        "Simulated {} bandit runs of {} steps with {:?}",
        settings.num_runs,
        settings.num_steps,
        settings.estimator
    );
    Ok(BanditSummary {
        mean_reward,
        optimal_fraction,
    })
}
