use anyhow::{ensure, Context, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::ThreadPoolBuilder;
use std::{
    sync::{
        mpsc::{channel, RecvTimeoutError},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use crate::{
    chain::{Chain, MetropolisChain},
    model::Model,
    scale_adapt::{default_target_accept, DualAverageOptions, ScaleAdaptation},
    storage::{ChainTrace, Trace},
    LogpFunc, ParamKind, Progress, RandomWalkProposal,
};

/// Settings for the Metropolis-Hastings sampler
#[derive(Debug, Clone, Copy)]
pub struct MetropolisSettings {
    /// The number of tuning steps, where we fit the proposal scale.
    pub num_tune: u64,
    /// The number of draws after tuning
    pub num_draws: u64,
    pub num_chains: usize,
    pub seed: u64,
    /// Proposal standard deviation for every coordinate before adaptation.
    pub initial_scale: f64,
    /// Acceptance rate the proposal scale is tuned to. Defaults to a
    /// value depending on the dimension of the model.
    pub target_accept: Option<f64>,
    pub adapt_scale: bool,
    /// How often to try new initial points before giving up.
    pub max_init_tries: usize,
    pub scale_adapt: DualAverageOptions,
}

impl Default for MetropolisSettings {
    fn default() -> Self {
        Self {
            num_tune: 1000,
            num_draws: 1000,
            num_chains: 4,
            seed: 0,
            initial_scale: 1.,
            target_accept: None,
            adapt_scale: true,
            max_init_tries: 100,
            scale_adapt: DualAverageOptions::default(),
        }
    }
}

impl MetropolisSettings {
    pub fn total_draws(&self) -> u64 {
        self.num_tune + self.num_draws
    }

    pub fn new_chain<F: LogpFunc, R: Rng>(
        &self,
        chain: u64,
        logp: F,
        kinds: Vec<ParamKind>,
        rng: &mut R,
    ) -> Result<MetropolisChain<F, SmallRng>> {
        let target_accept = self
            .target_accept
            .unwrap_or_else(|| default_target_accept(kinds.len()));
        ensure!(
            target_accept > 0. && target_accept < 1.,
            "Target acceptance rate must be in (0, 1), got {}",
            target_accept
        );
        // The global scale starts at one, the initial step sizes are per coordinate.
        let proposal = RandomWalkProposal::isotropic(kinds, self.initial_scale)?;
        let adaptation = ScaleAdaptation::new(
            self.scale_adapt,
            1.,
            target_accept,
            self.num_tune,
            self.adapt_scale,
        );

        let rng = SmallRng::from_rng(rng);
        Ok(MetropolisChain::new(logp, proposal, adaptation, rng, chain)?)
    }
}

/// Sample a single chain on the current thread.
pub fn sample_sequentially<F: LogpFunc, R: Rng>(
    logp: F,
    kinds: Vec<ParamKind>,
    settings: MetropolisSettings,
    start: &[f64],
    draws: u64,
    chain: u64,
    rng: &mut R,
) -> Result<impl Iterator<Item = Result<(Box<[f64]>, Progress)>>> {
    let mut sampler = settings.new_chain(chain, logp, kinds, rng)?;
    sampler.set_position(start)?;
    Ok((0..draws).map(move |_| Ok(sampler.draw()?)))
}

#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct ChainProgress {
    pub finished_draws: usize,
    pub total_draws: usize,
    pub accepted_draws: usize,
    pub tuning: bool,
    pub started: bool,
    pub scale: f64,
    pub runtime: Duration,
}

impl ChainProgress {
    fn new(total: usize) -> Self {
        Self {
            finished_draws: 0,
            total_draws: total,
            accepted_draws: 0,
            tuning: true,
            started: false,
            scale: 0f64,
            runtime: Duration::ZERO,
        }
    }

    fn update(&mut self, stats: &Progress, draw_duration: Duration) {
        if stats.accepted {
            self.accepted_draws += 1;
        }
        self.finished_draws += 1;
        self.tuning = stats.tuning;
        self.scale = stats.scale;
        self.runtime += draw_duration;
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.finished_draws == 0 {
            return 0.;
        }
        self.accepted_draws as f64 / self.finished_draws as f64
    }
}

pub struct ProgressCallback {
    pub callback: Box<dyn FnMut(Duration, Box<[ChainProgress]>) + Send>,
    pub rate: Duration,
}

fn run_chain<M: Model>(
    model: &M,
    settings: &MetropolisSettings,
    chain_id: u64,
    progress: &Mutex<ChainProgress>,
) -> Result<ChainTrace> {
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
    rng.set_stream(chain_id);

    let logp = model.density().context("Failed to create model density")?;
    let dim = logp.dim();
    let params = model.params();
    ensure!(
        params.len() == dim,
        "Model has {} parameters but its density has dimension {}",
        params.len(),
        dim
    );
    let kinds = params.iter().map(|p| p.kind).collect_vec();

    let mut sampler = settings.new_chain(chain_id, logp, kinds, &mut rng)?;
    let draws = settings.total_draws();
    let mut trace = ChainTrace::new(chain_id, dim, draws as usize);

    debug!("Starting chain {} with {} parameters", chain_id, dim);
    progress.lock().expect("Poisoned mutex").started = true;

    ensure!(
        settings.max_init_tries > 0,
        "At least one initialization attempt is required"
    );
    let mut initval = vec![0f64; dim];
    let mut error = None;
    for attempt in 0..settings.max_init_tries {
        model
            .init_position(&mut rng, &mut initval)
            .context("Failed to generate a new initial position")?;
        match sampler.set_position(&initval) {
            Ok(()) => {
                error = None;
                break;
            }
            Err(err) => {
                debug!("Chain {}: initial point {} rejected: {}", chain_id, attempt, err);
                error = Some(err);
            }
        }
    }
    if let Some(error) = error {
        return Err(anyhow::Error::from(error).context("All initialization points failed"));
    }

    let mut accepted = 0u64;
    for _ in 0..draws {
        let now = Instant::now();
        let (point, info) = sampler.draw()?;
        progress
            .lock()
            .expect("Poisoned mutex")
            .update(&info, now.elapsed());
        if info.accepted && !info.tuning {
            accepted += 1;
        }
        trace.append_value(&point, &info);
    }

    let rate = accepted as f64 / settings.num_draws.max(1) as f64;
    info!(
        "Finished chain {}: acceptance rate {:.3}, proposal scale {:.4}",
        chain_id,
        rate,
        sampler.proposal().scale()
    );
    if settings.num_draws > 0 && !(0.1..=0.9).contains(&rate) {
        warn!(
            "Chain {} has an acceptance rate of {:.3} after tuning",
            chain_id, rate
        );
    }
    Ok(trace)
}

/// Sample `settings.num_chains` chains in parallel.
///
/// Each chain draws from its own stream of a `ChaCha8Rng` seeded with
/// `settings.seed`, so results do not depend on the number of threads.
/// If a callback is given, it is called from the controller thread at most
/// once per `rate`, and once after all chains finished.
pub fn sample_parallel<M: Model>(
    model: &M,
    settings: MetropolisSettings,
    num_cores: usize,
    callback: Option<ProgressCallback>,
) -> Result<Trace> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_cores.max(1) + 1) // One more thread because the controller also uses one
        .thread_name(|i| format!("metropolis-worker-{}", i))
        .build()
        .context("Could not start thread pool")?;

    let total = settings.total_draws() as usize;
    let progress = (0..settings.num_chains)
        .map(|_| Arc::new(Mutex::new(ChainProgress::new(total))))
        .collect_vec();
    let mut callback = callback;
    let settings_ref = &settings;

    let results = pool.scope_fifo(|scope| {
        let (results_tx, results_rx) = channel();

        for (chain_id, chain_progress) in progress.iter().enumerate() {
            let results_tx = results_tx.clone();
            let chain_progress = chain_progress.clone();
            scope.spawn_fifo(move |_| {
                let result = run_chain(model, settings_ref, chain_id as u64, &chain_progress);
                results_tx
                    .send((chain_id, result))
                    .expect("Could not send sampling results to controller thread.");
            });
        }
        drop(results_tx);

        let snapshot = || {
            progress
                .iter()
                .map(|p| p.lock().expect("Poisoned mutex").clone())
                .collect_vec()
                .into_boxed_slice()
        };

        let start_time = Instant::now();
        let mut progress_rate = Duration::MAX;
        if let Some(ProgressCallback { callback, rate }) = &mut callback {
            callback(start_time.elapsed(), snapshot());
            progress_rate = *rate;
        }
        let mut last_progress = Instant::now();

        let mut results = Vec::with_capacity(settings_ref.num_chains);
        loop {
            let timeout = progress_rate
                .checked_sub(last_progress.elapsed())
                .unwrap_or(Duration::ZERO);
            match results_rx.recv_timeout(timeout) {
                Ok(result) => results.push(result),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if last_progress.elapsed() >= progress_rate {
                if let Some(ProgressCallback { callback, .. }) = &mut callback {
                    callback(start_time.elapsed(), snapshot());
                }
                last_progress = Instant::now();
            }
        }
        if let Some(ProgressCallback { callback, .. }) = &mut callback {
            callback(start_time.elapsed(), snapshot());
        }
        results
    });

    let (traces, errors): (Vec<_>, Vec<_>) = results
        .into_iter()
        .map(|(chain_id, result)| {
            result
                .and_then(|trace| trace.finalize())
                .with_context(|| format!("Chain {} failed", chain_id))
        })
        .partition_result();
    if let Some(error) = errors.into_iter().next() {
        return Err(error);
    }
    Ok(traces.into_iter().into())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::{sample_parallel, sample_sequentially, MetropolisSettings, ProgressCallback};
    use crate::{
        logp::test_logps::NormalLogp, Chain, Model, NormalPrior, ParamKind, TwoGroupNormal,
    };

    use anyhow::Result;
    use itertools::Itertools;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn sample_chain() -> Result<()> {
        let settings = MetropolisSettings {
            num_tune: 100,
            num_draws: 100,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(42);

        let mut chain = settings.new_chain(
            0,
            NormalLogp::new(10, 0.1),
            vec![ParamKind::Location; 10],
            &mut rng,
        )?;
        chain.set_position(&[0.2; 10])?;
        let (_draw, info) = chain.draw()?;
        assert!(info.tuning);
        assert_eq!(info.draw, 0);
        Ok(())
    }

    #[test]
    fn sample_seq() {
        let settings = MetropolisSettings {
            num_tune: 100,
            num_draws: 100,
            ..Default::default()
        };
        let start = vec![0.2; 10];
        let mut rng = StdRng::seed_from_u64(42);

        let chain = sample_sequentially(
            NormalLogp::new(10, 0.1),
            vec![ParamKind::Location; 10],
            settings,
            &start,
            200,
            1,
            &mut rng,
        )
        .unwrap();
        let mut draws = chain.collect_vec();
        assert_eq!(draws.len(), 200);

        let draw0 = draws.remove(100).unwrap();
        let (vals, stats) = draw0;
        assert_eq!(vals.len(), 10);
        assert_eq!(stats.chain, 1);
        assert_eq!(stats.draw, 100);
        assert!(!stats.tuning);
    }

    #[test]
    fn bad_target_accept() {
        let settings = MetropolisSettings {
            target_accept: Some(1.5),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        assert!(settings
            .new_chain(0, NormalLogp::new(1, 0.), vec![ParamKind::Location], &mut rng)
            .is_err());
    }

    fn two_group_model() -> TwoGroupNormal {
        TwoGroupNormal::new(
            vec![4.8, 5.1, 5.3, 4.9, 5.0, 5.2],
            vec![7.1, 6.8, 7.0, 7.3, 6.9, 7.2],
            NormalPrior::default(),
        )
        .unwrap()
    }

    #[test]
    fn sample_parallel_chains() -> Result<()> {
        let model = two_group_model();
        let settings = MetropolisSettings {
            num_tune: 200,
            num_draws: 300,
            num_chains: 3,
            seed: 10,
            ..Default::default()
        };

        let calls = Arc::new(Mutex::new(0usize));
        let calls_inner = calls.clone();
        let callback = ProgressCallback {
            callback: Box::new(move |_elapsed, progress| {
                assert_eq!(progress.len(), 3);
                *calls_inner.lock().unwrap() += 1;
            }),
            rate: Duration::from_millis(1),
        };

        let trace = sample_parallel(&model, settings, 2, Some(callback))?;
        assert_eq!(trace.chains.len(), 3);
        for (i, chain) in trace.chains.iter().enumerate() {
            assert_eq!(chain.chain_id, i as u64);
            assert_eq!(chain.num_draws(), 500);
            assert_eq!(chain.dim(), 3);
            assert!(chain.param_values(2).iter().all(|&s| s > 0.));
        }
        assert!(*calls.lock().unwrap() >= 2);
        Ok(())
    }

    #[test]
    fn parallel_is_reproducible() -> Result<()> {
        let model = two_group_model();
        let settings = MetropolisSettings {
            num_tune: 50,
            num_draws: 50,
            num_chains: 2,
            seed: 3,
            ..Default::default()
        };
        let trace1 = sample_parallel(&model, settings, 1, None)?;
        let trace2 = sample_parallel(&model, settings, 2, None)?;
        for (a, b) in trace1.chains.iter().zip(trace2.chains.iter()) {
            assert_eq!(a.flat_values(), b.flat_values());
        }
        assert!(trace1.chains[0].flat_values() != trace1.chains[1].flat_values());
        Ok(())
    }

    #[test]
    fn params_must_match_density() {
        struct Broken;

        impl Model for Broken {
            type Density<'model>
                = NormalLogp
            where
                Self: 'model;

            fn density(&self) -> Result<NormalLogp> {
                Ok(NormalLogp::new(2, 0.))
            }

            fn params(&self) -> Vec<crate::Param> {
                vec![crate::Param::location("x")]
            }

            fn init_position<R: rand::Rng + ?Sized>(
                &self,
                _rng: &mut R,
                position: &mut [f64],
            ) -> Result<()> {
                position.fill(0.);
                Ok(())
            }
        }

        let settings = MetropolisSettings {
            num_chains: 1,
            ..Default::default()
        };
        assert!(sample_parallel(&Broken, settings, 1, None).is_err());
    }
}
