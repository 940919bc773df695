//! Core abstractions for Metropolis-Hastings models.
//!
//! Provides the `Model` trait which describes a posterior by its log density,
//! its parameters and a way to find initial points, plus the two group
//! normal model with a shared variance.

use anyhow::{ensure, Result};
use multiversion::multiversion;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{logp::Infallible, LogpFunc, Param};

/// Trait for models that can be sampled by the Metropolis-Hastings sampler.
///
/// The trait is thread-safe to enable parallel sampling of several chains.
pub trait Model: Send + Sync + 'static {
    /// The log density of this model.
    ///
    /// The lifetime parameter allows the density to borrow from the model instance.
    type Density<'model>: LogpFunc
    where
        Self: 'model;

    /// Returns a new log density evaluator. Each chain gets its own.
    fn density(&self) -> Result<Self::Density<'_>>;

    /// Names and constraints of the parameters, in the order of the
    /// position vector.
    fn params(&self) -> Vec<Param>;

    /// Initializes the starting position for sampling.
    ///
    /// The starting position should be in a region where the log density
    /// is finite, and must respect the positivity of scale parameters.
    fn init_position<R: Rng + ?Sized>(&self, rng: &mut R, position: &mut [f64]) -> Result<()>;
}

/// Priors of the two group normal model
#[derive(Debug, Clone, Copy)]
pub struct NormalPrior {
    /// Mean of the normal prior on both group means
    pub mean: f64,
    /// Standard deviation of the normal prior on both group means
    pub sd: f64,
    /// Shape of the inverse gamma prior on the variance
    pub shape: f64,
    /// Rate of the inverse gamma prior on the variance
    pub rate: f64,
}

impl Default for NormalPrior {
    fn default() -> Self {
        NormalPrior {
            mean: 0.,
            sd: 10.,
            shape: 1.,
            rate: 1.,
        }
    }
}

/// Two groups of observations with their own means and a shared variance:
///
/// ```text
/// y_a ~ N(mu_a, sigma2)
/// y_b ~ N(mu_b, sigma2)
/// mu_a, mu_b ~ N(prior.mean, prior.sd^2)
/// sigma2 ~ InvGamma(prior.shape, prior.rate)
/// ```
///
/// The position vector is `[mu_a, mu_b, sigma2]`.
#[derive(Debug, Clone)]
pub struct TwoGroupNormal {
    group_a: Box<[f64]>,
    group_b: Box<[f64]>,
    prior: NormalPrior,
}

impl TwoGroupNormal {
    pub fn new(group_a: Vec<f64>, group_b: Vec<f64>, prior: NormalPrior) -> Result<Self> {
        ensure!(
            !group_a.is_empty() && !group_b.is_empty(),
            "Both groups need at least one observation"
        );
        ensure!(
            group_a.iter().chain(group_b.iter()).all(|x| x.is_finite()),
            "Observations must be finite"
        );
        ensure!(
            prior.sd > 0. && prior.shape > 0. && prior.rate > 0.,
            "Prior scale, shape and rate must be positive"
        );
        Ok(TwoGroupNormal {
            group_a: group_a.into(),
            group_b: group_b.into(),
            prior,
        })
    }

    pub fn group_a(&self) -> &[f64] {
        &self.group_a
    }

    pub fn group_b(&self) -> &[f64] {
        &self.group_b
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[multiversion(targets("x86_64+avx+avx2+fma", "arm+neon"))]
fn sum_sq_dev(values: &[f64], mu: f64) -> f64 {
    let mut total = 0f64;
    for &x in values {
        let diff = x - mu;
        total += diff * diff;
    }
    total
}

/// Log density of the two group normal model, borrowing the data.
#[derive(Debug, Clone, Copy)]
pub struct TwoGroupNormalLogp<'model> {
    model: &'model TwoGroupNormal,
}

impl LogpFunc for TwoGroupNormalLogp<'_> {
    type LogpError = Infallible;

    fn dim(&self) -> usize {
        3
    }

    fn logp(&mut self, position: &[f64]) -> Result<f64, Infallible> {
        assert!(position.len() == 3);
        let (mu_a, mu_b, sigma2) = (position[0], position[1], position[2]);
        if !(sigma2 > 0.) {
            return Ok(f64::NEG_INFINITY);
        }
        let model = self.model;
        let prior = model.prior;

        let n = (model.group_a.len() + model.group_b.len()) as f64;
        let ss = sum_sq_dev(&model.group_a, mu_a) + sum_sq_dev(&model.group_b, mu_b);
        let log_lik = -0.5 * n * sigma2.ln() - 0.5 * ss / sigma2;

        let prior_var = prior.sd * prior.sd;
        let log_prior_mu = -0.5 * ((mu_a - prior.mean).powi(2) + (mu_b - prior.mean).powi(2))
            / prior_var;
        let log_prior_sigma2 = -(prior.shape + 1.) * sigma2.ln() - prior.rate / sigma2;

        Ok(log_lik + log_prior_mu + log_prior_sigma2)
    }
}

impl Model for TwoGroupNormal {
    type Density<'model>
        = TwoGroupNormalLogp<'model>
    where
        Self: 'model;

    fn density(&self) -> Result<Self::Density<'_>> {
        Ok(TwoGroupNormalLogp { model: self })
    }

    fn params(&self) -> Vec<Param> {
        vec![
            Param::location("mu_a"),
            Param::location("mu_b"),
            Param::scale("sigma2"),
        ]
    }

    /// Jitter around the group means and the pooled variance of the data.
    fn init_position<R: Rng + ?Sized>(&self, rng: &mut R, position: &mut [f64]) -> Result<()> {
        ensure!(position.len() == 3, "Expected a position of length 3");
        let mean_a = mean(&self.group_a);
        let mean_b = mean(&self.group_b);
        let n = (self.group_a.len() + self.group_b.len()) as f64;
        let pooled =
            (sum_sq_dev(&self.group_a, mean_a) + sum_sq_dev(&self.group_b, mean_b)) / n;
        let pooled = if pooled > 0. { pooled } else { 1. };

        let jitter = Normal::new(0., 1.)?;
        let sd = pooled.sqrt();
        position[0] = mean_a + sd * jitter.sample(rng);
        position[1] = mean_b + sd * jitter.sample(rng);
        position[2] = pooled * (0.5 * jitter.sample(rng)).exp();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Model, NormalPrior, TwoGroupNormal};
    use crate::{LogpFunc, ParamKind};

    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn model() -> TwoGroupNormal {
        TwoGroupNormal::new(vec![1., 2., 3.], vec![5., 6., 7.], NormalPrior::default()).unwrap()
    }

    #[test]
    fn params() {
        let params = model().params();
        let kinds = params.iter().map(|p| p.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![ParamKind::Location, ParamKind::Location, ParamKind::Scale]
        );
        assert_eq!(params[2].name, "sigma2");
    }

    #[test]
    fn nonpositive_variance_has_no_mass() {
        let model = model();
        let mut density = model.density().unwrap();
        assert_eq!(density.logp(&[2., 6., 0.]).unwrap(), f64::NEG_INFINITY);
        assert_eq!(density.logp(&[2., 6., -1.]).unwrap(), f64::NEG_INFINITY);
        assert_eq!(density.logp(&[2., 6., f64::NAN]).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn matches_closed_form() {
        let model = model();
        let mut density = model.density().unwrap();
        let logp = density.logp(&[2., 6., 1.]).unwrap();
        // ss = 2 + 2, log lik = -2, prior on mus = -(4 + 36) / 200, prior on sigma2 = -1
        assert_relative_eq!(logp, -2. - 0.2 - 1., epsilon = 1e-12);
    }

    #[test]
    fn means_are_preferred_at_data_means() {
        let model = model();
        let mut density = model.density().unwrap();
        let at_means = density.logp(&[2., 6., 1.]).unwrap();
        let shifted = density.logp(&[3., 6., 1.]).unwrap();
        assert!(at_means > shifted);
    }

    #[test]
    fn init_is_valid() {
        let model = model();
        let mut density = model.density().unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut position = [0.; 3];
        for _ in 0..100 {
            model.init_position(&mut rng, &mut position).unwrap();
            assert!(position[2] > 0.);
            assert!(density.logp(&position).unwrap().is_finite());
        }
    }

    #[test]
    fn rejects_bad_input() {
        assert!(TwoGroupNormal::new(vec![], vec![1.], NormalPrior::default()).is_err());
        assert!(TwoGroupNormal::new(vec![f64::NAN], vec![1.], NormalPrior::default()).is_err());
        let prior = NormalPrior {
            sd: 0.,
            ..Default::default()
        };
        assert!(TwoGroupNormal::new(vec![1.], vec![1.], prior).is_err());
    }
}
