/// Settings for proposal scale adaptation
#[derive(Debug, Clone, Copy)]
pub struct DualAverageOptions {
    pub k: f64,
    pub t0: f64,
    pub gamma: f64,
}

impl Default for DualAverageOptions {
    fn default() -> DualAverageOptions {
        DualAverageOptions {
            k: 0.75,
            t0: 10.,
            gamma: 0.05,
        }
    }
}

/// Dual averaging on the log of the proposal scale.
#[derive(Clone, Debug)]
pub struct DualAverage {
    log_scale: f64,
    log_scale_adapted: f64,
    hbar: f64,
    mu: f64,
    count: u64,
    settings: DualAverageOptions,
}

impl DualAverage {
    pub fn new(settings: DualAverageOptions, initial_scale: f64) -> DualAverage {
        DualAverage {
            log_scale: initial_scale.ln(),
            log_scale_adapted: initial_scale.ln(),
            hbar: 0.,
            mu: initial_scale.ln(),
            count: 1,
            settings,
        }
    }

    /// Move the scale towards the target acceptance rate.
    ///
    /// An acceptance statistic below the target shrinks the scale, one above
    /// it grows the scale.
    pub fn advance(&mut self, accept_stat: f64, target: f64) {
        let w = 1. / (self.count as f64 + self.settings.t0);
        self.hbar = (1. - w) * self.hbar + w * (accept_stat - target);
        self.log_scale = self.mu + self.hbar * (self.count as f64).sqrt() / self.settings.gamma;
        let mk = (self.count as f64).powf(-self.settings.k);
        self.log_scale_adapted = mk * self.log_scale + (1. - mk) * self.log_scale_adapted;
        self.count += 1;
    }

    pub fn current_scale(&self) -> f64 {
        self.log_scale.exp()
    }

    pub fn current_scale_adapted(&self) -> f64 {
        self.log_scale_adapted.exp()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RunningMean {
    sum: f64,
    count: u64,
}

impl RunningMean {
    pub(crate) fn new() -> RunningMean {
        RunningMean { sum: 0., count: 0 }
    }

    pub(crate) fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub(crate) fn current(&self) -> f64 {
        if self.count == 0 {
            return 0.;
        }
        self.sum / self.count as f64
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }
}

/// Tracks the acceptance of a chain.
///
/// `mean_prob` averages the acceptance probabilities, which is a lower
/// variance estimate of the acceptance rate than the accepted fraction.
#[derive(Debug, Clone)]
pub struct AcceptanceRateCollector {
    pub(crate) mean_prob: RunningMean,
    accepted: u64,
}

impl AcceptanceRateCollector {
    pub(crate) fn new() -> AcceptanceRateCollector {
        AcceptanceRateCollector {
            mean_prob: RunningMean::new(),
            accepted: 0,
        }
    }

    pub(crate) fn register_draw(&mut self, accepted: bool, accept_prob: f64) {
        self.mean_prob.add(accept_prob);
        if accepted {
            self.accepted += 1;
        }
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn draws(&self) -> u64 {
        self.mean_prob.count()
    }

    /// The fraction of accepted proposals.
    pub fn acceptance_rate(&self) -> f64 {
        if self.draws() == 0 {
            return 0.;
        }
        self.accepted as f64 / self.draws() as f64
    }

    pub fn mean_accept_prob(&self) -> f64 {
        self.mean_prob.current()
    }
}

/// The acceptance rate a random walk should be tuned to.
///
/// 0.44 is optimal for one dimensional targets, and 0.234 the asymptotic
/// optimum for higher dimensions.
pub fn default_target_accept(dim: usize) -> f64 {
    if dim <= 1 {
        0.44
    } else {
        0.234
    }
}

/// Adaptation of the proposal scale during tuning
#[derive(Debug, Clone)]
pub struct ScaleAdaptation {
    dual_average: DualAverage,
    target_accept: f64,
    num_tune: u64,
    enabled: bool,
}

impl ScaleAdaptation {
    pub fn new(
        options: DualAverageOptions,
        initial_scale: f64,
        target_accept: f64,
        num_tune: u64,
        enabled: bool,
    ) -> Self {
        ScaleAdaptation {
            dual_average: DualAverage::new(options, initial_scale),
            target_accept,
            num_tune,
            enabled,
        }
    }

    pub fn is_tuning(&self, draw: u64) -> bool {
        draw < self.num_tune
    }

    pub fn target_accept(&self) -> f64 {
        self.target_accept
    }

    /// Update with the acceptance probability of `draw`, and return the
    /// scale to use for the next proposal if it changed.
    pub fn adapt(&mut self, draw: u64, accept_prob: f64) -> Option<f64> {
        if !self.enabled || !self.is_tuning(draw) {
            return None;
        }
        self.dual_average.advance(accept_prob, self.target_accept);
        if draw + 1 == self.num_tune {
            Some(self.dual_average.current_scale_adapted())
        } else {
            Some(self.dual_average.current_scale())
        }
    }
}
