//! Smoothed round-trip time, Jacobson/Karels style.
//!
//! Everything is integer nanoseconds. The weights are stored as inverses so that each update adds
//! the terms together first and divides once at the end, rather than dividing small numbers and
//! losing their low digits.

/// Inverse weight of a new sample in the variance.
const IBETA: u64 = 4;
/// Inverse weight of a new sample in the mean.
const IALPHA: u64 = 8;

/// Tracks a smoothed RTT and its mean deviation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RttEstimator {
    rtt: u64,
    rttvar: u64,
}

impl RttEstimator {
    /// Start from zero for both the mean and the variance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a new sample, in nanoseconds.
    pub fn update(&mut self, sample: u64) {
        // The variance has to be measured against the mean from _before_ this sample.
        self.rttvar = ((IBETA - 1) * self.rttvar + self.rtt.abs_diff(sample)) / IBETA;
        self.rtt = (sample + (IALPHA - 1) * self.rtt) / IALPHA;
    }

    /// Smoothed RTT in nanoseconds.
    pub fn rtt(&self) -> u64 {
        self.rtt
    }

    /// Mean deviation of the RTT in nanoseconds.
    pub fn rttvar(&self) -> u64 {
        self.rttvar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let estimator = RttEstimator::new();

        assert_eq!(estimator.rtt(), 0);
        assert_eq!(estimator.rttvar(), 0);
    }

    /// Given a scripted sequence of samples
    /// When each one is folded in
    /// Then the variance should always be measured against the previous mean
    #[test]
    fn variance_uses_previous_rtt() {
        let mut estimator = RttEstimator::new();

        // |0 - 800| / 4, then 800 / 8
        estimator.update(800);
        assert_eq!((estimator.rtt(), estimator.rttvar()), (100, 200));

        // (3 * 200 + |100 - 800|) / 4 = 325, (800 + 7 * 100) / 8 = 187
        estimator.update(800);
        assert_eq!((estimator.rtt(), estimator.rttvar()), (187, 325));

        // (3 * 325 + |187 - 100|) / 4 = 265, (100 + 7 * 187) / 8 = 176
        estimator.update(100);
        assert_eq!((estimator.rtt(), estimator.rttvar()), (176, 265));
    }

    #[test]
    fn converges_on_a_steady_sample() {
        let mut estimator = RttEstimator::new();

        for _ in 0..200 {
            estimator.update(1_000_000);
        }

        // Integer division leaves the mean just short of the sample.
        assert!(estimator.rtt() > 999_990, "rtt: {}", estimator.rtt());
        assert!(estimator.rtt() <= 1_000_000);
        assert!(estimator.rttvar() < 10, "rttvar: {}", estimator.rttvar());
    }
}
