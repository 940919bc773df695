use rand::Rng;

/// The probability of accepting a proposal, `min(1, exp(log_ratio))`.
///
/// `log_ratio` is the log of the Metropolis-Hastings ratio, ie the
/// difference of log densities at the proposed and current point plus
/// the log Hastings correction of the proposal. A NAN ratio, as produced
/// when both densities are infinite, is never accepted.
#[inline]
pub fn acceptance_probability(log_ratio: f64) -> f64 {
    if log_ratio.is_nan() {
        return 0.;
    }
    log_ratio.min(0.).exp()
}

/// Decide whether to accept a proposal.
///
/// Returns the decision and the acceptance probability it was based on.
/// Exactly one uniform number is drawn from `rng`, so that the stream
/// of random numbers does not depend on the outcome.
pub fn accept<R: Rng + ?Sized>(rng: &mut R, log_ratio: f64) -> (bool, f64) {
    let prob = acceptance_probability(log_ratio);
    let u: f64 = rng.random();
    (u < prob, prob)
}

#[cfg(test)]
mod tests {
    use super::{accept, acceptance_probability};

    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn clamps_large_ratio() {
        assert_eq!(acceptance_probability(1e10f64.ln()), 1.);
        assert_eq!(acceptance_probability(f64::INFINITY), 1.);
        assert_eq!(acceptance_probability(0.), 1.);
    }

    #[test]
    fn small_ratio() {
        assert_relative_eq!(
            acceptance_probability(1e-10f64.ln()),
            1e-10,
            max_relative = 1e-12
        );
        assert_eq!(acceptance_probability(f64::NEG_INFINITY), 0.);
    }

    #[test]
    fn nan_is_rejected() {
        assert_eq!(acceptance_probability(f64::NAN), 0.);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(!accept(&mut rng, f64::NAN).0);
        }
    }

    #[test]
    fn deterministic() {
        let decisions = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50)
                .map(|i| accept(&mut rng, -(i as f64) / 10.).0)
                .collect::<Vec<_>>()
        };
        assert_eq!(decisions(42), decisions(42));
    }

    #[test]
    fn always_accepts_uphill() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let (accepted, prob) = accept(&mut rng, 0.5);
            assert!(accepted);
            assert_eq!(prob, 1.);
        }
    }

    proptest! {
        #[test]
        fn probability_in_unit_interval(log_ratio in proptest::num::f64::ANY) {
            let prob = acceptance_probability(log_ratio);
            prop_assert!((0. ..=1.).contains(&prob));
        }
    }
}
