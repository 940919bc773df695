use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::metropolis::{MetropolisError, Result};

/// How a parameter is perturbed by the random walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Unbounded parameter, perturbed additively.
    Location,
    /// Strictly positive parameter, perturbed multiplicatively so that the
    /// walk is additive on the log scale.
    Scale,
}

/// A named model parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

impl Param {
    pub fn location(name: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            kind: ParamKind::Location,
        }
    }

    pub fn scale(name: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            kind: ParamKind::Scale,
        }
    }
}

/// Gaussian random walk proposal.
///
/// Each coordinate gets independent normal noise with standard deviation
/// `scale * steps[i]`. Location coordinates move additively, scale
/// coordinates move on the log scale. `scale` is the global multiplier
/// that is tuned during adaptation.
#[derive(Debug, Clone)]
pub struct RandomWalkProposal {
    kinds: Box<[ParamKind]>,
    steps: Box<[f64]>,
    scale: f64,
}

fn check_step(step: f64) -> Result<()> {
    if !step.is_finite() || step <= 0. {
        return Err(MetropolisError::InvalidScale(step));
    }
    Ok(())
}

impl RandomWalkProposal {
    pub fn new(kinds: Vec<ParamKind>, steps: Vec<f64>) -> Result<Self> {
        if kinds.len() != steps.len() {
            return Err(MetropolisError::DimensionMismatch {
                expected: kinds.len(),
                found: steps.len(),
            });
        }
        steps.iter().try_for_each(|&step| check_step(step))?;
        Ok(RandomWalkProposal {
            kinds: kinds.into(),
            steps: steps.into(),
            scale: 1.,
        })
    }

    /// A proposal with the same step size for every coordinate.
    pub fn isotropic(kinds: Vec<ParamKind>, step: f64) -> Result<Self> {
        let steps = vec![step; kinds.len()];
        Self::new(kinds, steps)
    }

    pub fn from_params(params: &[Param], step: f64) -> Result<Self> {
        Self::isotropic(params.iter().map(|p| p.kind).collect(), step)
    }

    pub fn dim(&self) -> usize {
        self.kinds.len()
    }

    pub fn kinds(&self) -> &[ParamKind] {
        &self.kinds
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) -> Result<()> {
        check_step(scale)?;
        self.scale = scale;
        Ok(())
    }

    /// Check that `position` is a valid starting point for the walk.
    pub fn check_position(&self, position: &[f64]) -> Result<()> {
        if position.len() != self.dim() {
            return Err(MetropolisError::DimensionMismatch {
                expected: self.dim(),
                found: position.len(),
            });
        }
        self.kinds
            .iter()
            .zip(position)
            .enumerate()
            .try_for_each(|(index, (kind, &value))| match kind {
                ParamKind::Scale if !(value > 0. && value.is_finite()) => {
                    Err(MetropolisError::NotPositive { index, value })
                }
                _ => Ok(()),
            })
    }

    /// Write a proposal into `candidate` and return the log Hastings
    /// correction `log q(current | candidate) - log q(candidate | current)`.
    ///
    /// The correction is zero for location coordinates. For a scale
    /// coordinate the log-normal step contributes
    /// `ln(candidate) - ln(current)`.
    pub fn propose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        current: &[f64],
        candidate: &mut [f64],
    ) -> f64 {
        assert!(current.len() == self.dim());
        assert!(candidate.len() == self.dim());

        let mut log_correction = 0f64;
        for ((kind, &step), (&x, out)) in self
            .kinds
            .iter()
            .zip(self.steps.iter())
            .zip(current.iter().zip(candidate.iter_mut()))
        {
            let z: f64 = StandardNormal.sample(rng);
            let delta = self.scale * step * z;
            match kind {
                ParamKind::Location => *out = x + delta,
                ParamKind::Scale => {
                    *out = x * delta.exp();
                    log_correction += delta;
                }
            }
        }
        log_correction
    }
}
