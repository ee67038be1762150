use std::{
    fmt::{self, Display},
    time::Duration,
};

use bon::bon;

/// Controls the offered rate and how it ramps up over time.
///
/// The rate starts at `start_pps` and is held for `step_duration`, then increases by `step`
/// packets per second. This repeats until the rate goes over `max_pps`, at which point no more
/// requests are sent and the run drains.
///
/// If the smoothed number of requests in flight grows to more than `milliseconds` worth of the
/// current rate, sending becomes gated: one new request per reply received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Config {
    pub(crate) start_pps: u32,
    pub(crate) max_pps: Option<u32>,
    pub(crate) step: u32,
    pub(crate) step_duration: Duration,
    pub(crate) milliseconds: u32,
    pub(crate) parallel: u32,
}

const DEFAULT_START_PPS: u32 = 1;
const DEFAULT_MILLISECONDS: u32 = 1000;
const DEFAULT_PARALLEL: u32 = 1;

#[bon]
impl Config {
    #[allow(missing_docs)]
    #[builder]
    pub fn new(
        /// Packets per second to start at. Zero means the default.
        #[builder(default = DEFAULT_START_PPS)]
        start_pps: u32,
        /// Stop ramping once the rate goes above this. `None` or zero means no limit.
        max_pps: Option<u32>,
        /// How much to increase the rate by at the end of each ramp step.
        #[builder(default)]
        step: u32,
        /// How long to hold each rate for.
        step_duration: Duration,
        /// How many milliseconds of backlog to allow before gating. Zero means the default.
        #[builder(default = DEFAULT_MILLISECONDS)]
        milliseconds: u32,
        /// How many requests to send on each tick. Zero means the default.
        #[builder(default = DEFAULT_PARALLEL)]
        parallel: u32,
    ) -> Self {
        Self {
            start_pps,
            max_pps,
            step,
            step_duration,
            milliseconds,
            parallel,
        }
        .normalise()
    }

    /// Zero means "use the default" for the rate, backlog window and burst size.
    fn normalise(self) -> Self {
        Self {
            start_pps: if self.start_pps == 0 {
                DEFAULT_START_PPS
            } else {
                self.start_pps
            },
            max_pps: self.max_pps.filter(|max| *max != 0),
            milliseconds: if self.milliseconds == 0 {
                DEFAULT_MILLISECONDS
            } else {
                self.milliseconds
            },
            parallel: if self.parallel == 0 {
                DEFAULT_PARALLEL
            } else {
                self.parallel
            },
            ..self
        }
    }

    /// Packets per second to start at.
    pub fn start_pps(&self) -> u32 {
        self.start_pps
    }

    /// The rate limit, if there is one.
    pub fn max_pps(&self) -> Option<u32> {
        self.max_pps
    }

    /// Rate increase per ramp step.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// How long each ramp step lasts.
    pub fn step_duration(&self) -> Duration {
        self.step_duration
    }

    /// Backlog window, in milliseconds, that triggers gating.
    pub fn milliseconds(&self) -> u32 {
        self.milliseconds
    }

    /// Requests sent per tick.
    pub fn parallel(&self) -> u32 {
        self.parallel
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "start_pps: {}, max_pps: ", self.start_pps)?;
        match self.max_pps {
            Some(max) => write!(f, "{max}")?,
            None => f.write_str("unbounded")?,
        }
        write!(
            f,
            ", step: {}, step_duration: {:?}, milliseconds: {}, parallel: {}",
            self.step, self.step_duration, self.milliseconds, self.parallel
        )
    }
}
