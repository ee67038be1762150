//! Counters and latency histogram for a run.

use std::time::Duration;

use tokio::time::Instant;

/// Upper bounds, in nanoseconds, of every histogram bucket but the last.
const BUCKET_BOUNDS: [u64; 7] = [
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
];

/// Number of latency buckets: one per decade from under a microsecond to over a second.
pub const BUCKETS: usize = BUCKET_BOUNDS.len() + 1;

/// Reply latencies, counted by decade.
///
/// | Bucket | Latency         |
/// |--------|-----------------|
/// | 0      | < 1 µs          |
/// | 1      | < 10 µs         |
/// | 2      | < 100 µs        |
/// | 3      | < 1 ms          |
/// | 4      | < 10 ms         |
/// | 5      | < 100 ms        |
/// | 6      | < 1 s           |
/// | 7      | >= 1 s          |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyHistogram {
    counts: [u64; BUCKETS],
}

impl LatencyHistogram {
    /// Which bucket a latency of `nanos` falls into.
    pub fn bucket(nanos: u64) -> usize {
        BUCKET_BOUNDS
            .iter()
            .position(|bound| nanos < *bound)
            .unwrap_or(BUCKETS - 1)
    }

    pub(crate) fn record(&mut self, nanos: u64) {
        self.counts[Self::bucket(nanos)] += 1;
    }

    /// Count per bucket, fastest first.
    pub fn counts(&self) -> &[u64; BUCKETS] {
        &self.counts
    }

    /// Total number of latencies recorded.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Statistics for a run.
///
/// Times are in nanoseconds unless they are [`Instant`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Stats {
    /// When the run started.
    pub start: Option<Instant>,
    /// When the last outstanding reply arrived after the run started draining.
    pub end: Option<Instant>,
    /// When requests were last sent.
    pub last_send: Option<Instant>,

    /// Smoothed round-trip time.
    pub rtt: u64,
    /// Mean deviation of the round-trip time.
    pub rttvar: u64,

    /// Current target rate.
    pub pps: u32,
    /// Rate at which replies have come back during the current ramp step.
    pub pps_accepted: u64,

    /// Requests sent.
    pub sent: u64,
    /// Replies received.
    pub received: u64,

    /// Smoothed number of requests in flight.
    pub backlog_ema: u64,
    /// Most requests ever in flight at once.
    pub max_backlog: u64,
    /// Set when a reply releases a gated send. Cleared once the backlog allows free sending again.
    pub blocked: bool,

    /// Reply latencies.
    pub histogram: LatencyHistogram,
}

impl Stats {
    /// Requests currently in flight.
    pub fn backlog(&self) -> u64 {
        self.sent - self.received
    }

    /// Smoothed round-trip time.
    pub fn rtt(&self) -> Duration {
        Duration::from_nanos(self.rtt)
    }

    /// Mean deviation of the round-trip time.
    pub fn rttvar(&self) -> Duration {
        Duration::from_nanos(self.rttvar)
    }

    /// Time since the run started, or zero if it hasn't.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.start
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }

    /// How long the run took, once it has finished draining.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.end?.saturating_duration_since(self.start?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_bucket_per_decade() {
        let latencies = [
            999,
            9_999,
            99_999,
            999_999,
            9_999_999,
            99_999_999,
            999_999_999,
            1_000_000_000,
        ];

        for (expected, nanos) in latencies.into_iter().enumerate() {
            let mut histogram = LatencyHistogram::default();
            histogram.record(nanos);

            let mut counts = [0; BUCKETS];
            counts[expected] = 1;
            assert_eq!(histogram.counts(), &counts, "latency {nanos}ns");
        }
    }

    #[test]
    fn bounds_are_exclusive() {
        assert_eq!(LatencyHistogram::bucket(0), 0);
        assert_eq!(LatencyHistogram::bucket(1_000), 1);
        assert_eq!(LatencyHistogram::bucket(1_000_000), 4);
        assert_eq!(LatencyHistogram::bucket(u64::MAX), 7);
    }

    #[test]
    fn totals() {
        let mut histogram = LatencyHistogram::default();
        histogram.record(10);
        histogram.record(20);
        histogram.record(50_000_000);

        assert_eq!(histogram.total(), 3);
        assert_eq!(histogram.counts()[0], 2);
        assert_eq!(histogram.counts()[5], 1);
    }

    #[test]
    fn durations() {
        let start = Instant::now();
        let stats = Stats {
            start: Some(start),
            end: Some(start + Duration::from_secs(3)),
            rtt: 1_500,
            sent: 10,
            received: 7,
            ..Default::default()
        };

        assert_eq!(stats.backlog(), 3);
        assert_eq!(stats.rtt(), Duration::from_nanos(1_500));
        assert_eq!(stats.elapsed(start + Duration::from_secs(1)), Duration::from_secs(1));
        assert_eq!(stats.duration(), Some(Duration::from_secs(3)));
        assert_eq!(Stats::default().elapsed(start), Duration::ZERO);
    }
}
