use std::fmt::Debug;

/// Errors that happen when we evaluate the log density
pub trait LogpError: std::error::Error {
    /// Unrecoverable errors during logp computation stop sampling,
    /// recoverable errors reject the proposed point.
    fn is_recoverable(&self) -> bool;
}

/// The unnormalized log posterior density we want to sample from.
///
/// This needs to be implemented by users of the library. The value
/// is the sum of the log-likelihood and the log-prior, up to an
/// additive constant.
pub trait LogpFunc {
    type LogpError: Debug + Send + Sync + LogpError + 'static;

    /// The number of parameters of the density.
    fn dim(&self) -> usize;

    /// Compute the log density at `position`.
    ///
    /// Returning a non-finite value is allowed and leads to a rejection
    /// of that position during sampling.
    fn logp(&mut self, position: &[f64]) -> Result<f64, Self::LogpError>;
}

impl<F: LogpFunc + ?Sized> LogpFunc for &mut F {
    type LogpError = F::LogpError;

    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn logp(&mut self, position: &[f64]) -> Result<f64, Self::LogpError> {
        (**self).logp(position)
    }
}

/// Error type for densities that can not fail.
#[derive(thiserror::Error, Debug)]
pub enum Infallible {}

impl LogpError for Infallible {
    fn is_recoverable(&self) -> bool {
        match *self {}
    }
}

pub mod test_logps {
    use super::{Infallible, LogpFunc};

    /// Independent normal distributions with a common mean and unit variance.
    #[derive(Clone, Debug)]
    pub struct NormalLogp {
        pub dim: usize,
        pub mu: f64,
    }

    impl NormalLogp {
        pub fn new(dim: usize, mu: f64) -> NormalLogp {
            NormalLogp { dim, mu }
        }
    }

    impl LogpFunc for NormalLogp {
        type LogpError = Infallible;

        fn dim(&self) -> usize {
            self.dim
        }

        fn logp(&mut self, position: &[f64]) -> Result<f64, Infallible> {
            assert!(position.len() == self.dim);
            Ok(position
                .iter()
                .map(|&p| {
                    let val = p - self.mu;
                    -val * val / 2.
                })
                .sum())
        }
    }
}
