//! Random-walk Metropolis-Hastings sampling with proposal-scale tuning,
//! parallel chains and arrow or CSV traces, plus epsilon-greedy agents on a
//! non-stationary bandit.
//!
//! Users define a log density by implementing [`LogpFunc`], or a whole
//! model with parameter constraints and initial points by implementing
//! [`Model`].
//!
//! ```
//! use metropolis_rs::{sample_parallel, MetropolisSettings, NormalPrior, TwoGroupNormal};
//!
//! let model = TwoGroupNormal::new(
//!     vec![4.9, 5.2, 5.1, 4.7],
//!     vec![6.1, 5.8, 6.3, 6.0],
//!     NormalPrior::default(),
//! )
//! .unwrap();
//! let settings = MetropolisSettings {
//!     num_tune: 200,
//!     num_draws: 200,
//!     num_chains: 2,
//!     ..Default::default()
//! };
//! let trace = sample_parallel(&model, settings, 2, None).unwrap();
//! assert_eq!(trace.chains.len(), 2);
//! assert!(trace.posterior_values(2).iter().all(|&s| s > 0.));
//! ```

pub(crate) mod acceptance;
pub(crate) mod bandit;
pub(crate) mod chain;
pub(crate) mod csv_storage;
pub(crate) mod logp;
pub(crate) mod metropolis;
pub(crate) mod model;
pub(crate) mod proposal;
pub(crate) mod sampler;
pub(crate) mod scale_adapt;
pub(crate) mod storage;

pub use acceptance::{accept, acceptance_probability};
pub use bandit::{
    simulate, simulate_runs, BanditError, BanditRun, BanditSettings, BanditSummary,
    EpsilonGreedy, Testbed, ValueEstimator,
};
pub use chain::{Chain, MetropolisChain};
pub use csv_storage::CsvConfig;
pub use logp::{test_logps, Infallible, LogpError, LogpFunc};
pub use metropolis::{MetropolisError, Progress, SampleInfo};
pub use model::{Model, NormalPrior, TwoGroupNormal, TwoGroupNormalLogp};
pub use proposal::{Param, ParamKind, RandomWalkProposal};
pub use sampler::{
    sample_parallel, sample_sequentially, ChainProgress, MetropolisSettings, ProgressCallback,
};
pub use scale_adapt::{
    default_target_accept, AcceptanceRateCollector, DualAverage, DualAverageOptions,
    ScaleAdaptation,
};
pub use storage::{ChainOutput, ChainTrace, Trace};
