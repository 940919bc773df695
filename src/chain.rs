use rand::Rng;

use crate::{
    metropolis::{eval_logp, step, MetropolisError, Progress, Result},
    scale_adapt::{AcceptanceRateCollector, ScaleAdaptation},
    LogpFunc, RandomWalkProposal,
};

/// Draw samples from the posterior distribution using Metropolis-Hastings.
pub trait Chain {
    /// Initialize the sampler to a position. This should be called
    /// before calling draw.
    ///
    /// This fails if the logp function returns an error or a non-finite
    /// value, or if the position violates a positivity constraint.
    fn set_position(&mut self, position: &[f64]) -> Result<()>;

    /// Draw a new sample and return the position and some diagnosic information.
    fn draw(&mut self) -> Result<(Box<[f64]>, Progress)>;

    /// The dimensionality of the posterior.
    fn dim(&self) -> usize;
}

struct CurrentPoint {
    position: Box<[f64]>,
    logp: f64,
}

pub struct MetropolisChain<F, R>
where
    F: LogpFunc,
    R: Rng,
{
    logp: F,
    proposal: RandomWalkProposal,
    adaptation: ScaleAdaptation,
    collector: AcceptanceRateCollector,
    rng: R,
    current: Option<CurrentPoint>,
    candidate: Box<[f64]>,
    chain: u64,
    draw_count: u64,
}

impl<F, R> MetropolisChain<F, R>
where
    F: LogpFunc,
    R: Rng,
{
    pub fn new(
        logp: F,
        proposal: RandomWalkProposal,
        adaptation: ScaleAdaptation,
        rng: R,
        chain: u64,
    ) -> Result<Self> {
        if proposal.dim() != logp.dim() {
            return Err(MetropolisError::DimensionMismatch {
                expected: logp.dim(),
                found: proposal.dim(),
            });
        }
        let candidate = vec![0f64; logp.dim()].into();
        Ok(MetropolisChain {
            logp,
            proposal,
            adaptation,
            collector: AcceptanceRateCollector::new(),
            rng,
            current: None,
            candidate,
            chain,
            draw_count: 0,
        })
    }

    /// The fraction of accepted proposals over all draws so far.
    pub fn acceptance_rate(&self) -> f64 {
        self.collector.acceptance_rate()
    }

    pub fn proposal(&self) -> &RandomWalkProposal {
        &self.proposal
    }

    pub fn draw_count(&self) -> u64 {
        self.draw_count
    }

    pub fn chain(&self) -> u64 {
        self.chain
    }

    pub fn is_tuning(&self) -> bool {
        self.adaptation.is_tuning(self.draw_count)
    }
}

impl<F, R> Chain for MetropolisChain<F, R>
where
    F: LogpFunc,
    R: Rng,
{
    fn set_position(&mut self, position: &[f64]) -> Result<()> {
        self.proposal.check_position(position)?;
        let logp = eval_logp(&mut self.logp, position)?
            .ok_or(MetropolisError::NonFiniteInitialDensity(f64::NAN))?;
        if !logp.is_finite() {
            return Err(MetropolisError::NonFiniteInitialDensity(logp));
        }
        self.current = Some(CurrentPoint {
            position: position.into(),
            logp,
        });
        Ok(())
    }

    fn draw(&mut self) -> Result<(Box<[f64]>, Progress)> {
        let current = self
            .current
            .as_mut()
            .ok_or(MetropolisError::NotInitialized)?;

        let tuning = self.adaptation.is_tuning(self.draw_count);
        let scale = self.proposal.scale();

        let info = step(
            &mut self.logp,
            &self.proposal,
            &mut self.rng,
            &mut current.position,
            &mut current.logp,
            &mut self.candidate,
        )?;

        self.collector
            .register_draw(info.accepted, info.accept_prob);
        if let Some(new_scale) = self.adaptation.adapt(self.draw_count, info.accept_prob) {
            self.proposal.set_scale(new_scale)?;
        }

        let progress = Progress {
            draw: self.draw_count,
            chain: self.chain,
            accepted: info.accepted,
            accept_prob: info.accept_prob,
            tuning,
            scale,
            logp: current.logp,
        };
        let position = current.position.clone();

        self.draw_count += 1;
        Ok((position, progress))
    }

    fn dim(&self) -> usize {
        self.logp.dim()
    }
}
