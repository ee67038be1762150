//! Generate paced, ramping load that backs off under pressure.
//!
//! Requests are sent at a target rate, in packets per second. The rate is held for a while, then
//! stepped up, until it goes over a limit. Latency and throughput are tracked from the replies.
//!
//! If replies stop keeping up, requests pile up in flight. A smoothed measure of that backlog is
//! compared to how much backlog is acceptable at the current rate. Past that point sending is
//! _gated_: a new request only goes out when a reply comes in. Once the backlog is back under
//! control, sending goes back to the full rate.
//!
//! There are two ways in:
//!
//! - [`Pacer`] is the engine itself. It doesn't own a clock or an event loop: every entry point
//!   takes the current time, and it asks a [`Timer`] to call it back when it's time to send again.
//! - [`LoadGenerator`] runs a `Pacer` on a background tokio task, with a tokio-backed timer.
//!
//! What a request actually is, and how replies get matched to requests, is up to the caller.
//!
//! See the README for an example.

#![deny(missing_docs)]

#[cfg(doctest)]
use doc_comment::doctest;
#[cfg(doctest)]
doctest!("../README.md");

mod backlog;
mod config;
pub mod error;
mod generator;
mod pacer;
pub mod report;
mod rtt;
mod stats;
mod timer;
mod worker;

pub use config::Config;
pub use error::{GeneratorError, PacerError, TimerError};
pub use generator::{LoadGenerator, Replier};
pub use pacer::{Pacer, ReplyStatus, RequestSender, State};
pub use rtt::RttEstimator;
pub use stats::{LatencyHistogram, Stats, BUCKETS};
pub use timer::Timer;
