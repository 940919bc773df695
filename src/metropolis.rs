use rand::Rng;
use thiserror::Error;

use crate::{acceptance::accept, logp::LogpError, LogpFunc, RandomWalkProposal};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MetropolisError {
    #[error("Logp function returned unrecoverable error")]
    LogpFailure(Box<dyn std::error::Error + Send + Sync>),
    #[error("Log density at the initial position is not finite: {0}")]
    NonFiniteInitialDensity(f64),
    #[error("Expected {expected} parameters but got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Proposal scale must be positive and finite, got {0}")]
    InvalidScale(f64),
    #[error("Parameter {index} must be strictly positive, got {value}")]
    NotPositive { index: usize, value: f64 },
    #[error("Chain has no position, call set_position before drawing")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, MetropolisError>;

/// The outcome of a single Metropolis-Hastings transition
#[derive(Debug, Clone, Copy)]
pub struct SampleInfo {
    /// Whether the proposed point was accepted
    pub accepted: bool,
    /// The probability with which the proposal was accepted
    pub accept_prob: f64,
}

/// Information about a draw of a chain
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Progress {
    pub draw: u64,
    pub chain: u64,
    pub accepted: bool,
    pub accept_prob: f64,
    pub tuning: bool,
    pub scale: f64,
    pub logp: f64,
}

/// Evaluate the log density and map errors.
///
/// Recoverable errors are returned as `Ok(None)`.
pub(crate) fn eval_logp<F: LogpFunc>(logp: &mut F, position: &[f64]) -> Result<Option<f64>> {
    match logp.logp(position) {
        Ok(val) => Ok(Some(val)),
        Err(err) if err.is_recoverable() => Ok(None),
        Err(err) => Err(MetropolisError::LogpFailure(Box::new(err))),
    }
}

/// Perform one Metropolis-Hastings transition.
///
/// `position` and `current_logp` hold the current state of the chain and
/// are overwritten with the proposal if it is accepted. `candidate` is
/// scratch space of the same length.
pub(crate) fn step<F: LogpFunc, R: Rng + ?Sized>(
    logp: &mut F,
    proposal: &RandomWalkProposal,
    rng: &mut R,
    position: &mut [f64],
    current_logp: &mut f64,
    candidate: &mut [f64],
) -> Result<SampleInfo> {
    let log_correction = proposal.propose(rng, position, candidate);
    let proposed_logp = eval_logp(logp, candidate)?;

    let log_ratio = match proposed_logp {
        Some(val) if val.is_finite() => val - *current_logp + log_correction,
        _ => f64::NEG_INFINITY,
    };

    // Draw the uniform even for certain rejections, so that the random
    // stream is the same for every outcome.
    let (accepted, accept_prob) = accept(rng, log_ratio);
    if accepted {
        position.copy_from_slice(candidate);
        // accepted implies a finite proposal density
        *current_logp = proposed_logp.unwrap_or(f64::NEG_INFINITY);
    }

    Ok(SampleInfo {
        accepted,
        accept_prob,
    })
}
