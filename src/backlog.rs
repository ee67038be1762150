//! Smoothed backlog, used to decide whether to keep sending or to gate.
//!
//! The raw number of requests in flight is noisy: sends go out in bursts and replies come back in
//! bursts. Averaging it over roughly one second of traffic stops the pacer flapping between
//! sending and gated on every tick.

/// Exponential moving average of the number of requests in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BacklogEstimator {
    ema: u64,
}

impl BacklogEstimator {
    /// Fold in the current backlog, averaging over `pps` samples (one second's worth).
    ///
    /// `ema_n+1 = (sample - ema_n) * (2 / (n + 1)) + ema_n`, rearranged so everything is summed
    /// before the single division.
    pub fn update(&mut self, backlog: u64, pps: u32) -> u64 {
        let n = i128::from(pps) + 1;
        let backlog = i128::from(backlog);
        let ema = i128::from(self.ema);

        let next = ((backlog - ema) * 2 + n * ema) / n;

        // Non-negative for any pps >= 1, which the config guarantees.
        self.ema = u64::try_from(next).unwrap_or(0);
        self.ema
    }

    /// Whether the estimated queueing delay is still below `milliseconds` at `pps`.
    ///
    /// Scales the backlog by 1000 ms/s rather than dividing the rate down.
    pub fn admits(&self, pps: u32, milliseconds: u32) -> bool {
        u128::from(self.ema) * 1000 < u128::from(pps) * u128::from(milliseconds)
    }

    /// The current average.
    pub fn ema(&self) -> u64 {
        self.ema
    }

    #[cfg(test)]
    pub fn with_ema(ema: u64) -> Self {
        Self { ema }
    }
}
