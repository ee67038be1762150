use std::{
    fmt::{self, Display},
    time::Duration,
};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    backlog::BacklogEstimator,
    config::Config,
    error::{PacerError, TimerError},
    report,
    rtt::RttEstimator,
    stats::Stats,
    timer::Timer,
};

const NSEC: u64 = 1_000_000_000;

/// Sends one request.
///
/// Called synchronously from inside the pacer, so it should return quickly. Anything that takes
/// time, like waiting for the reply, belongs in a spawned task.
pub trait RequestSender {
    /// Send a request. `now` is the send time to hand back to
    /// [`Pacer::have_reply()`] when the reply arrives.
    fn send(&mut self, now: Instant);
}

impl<F> RequestSender for F
where
    F: FnMut(Instant),
{
    fn send(&mut self, now: Instant) {
        self(now)
    }
}

/// What the pacer is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Not started yet.
    Init,
    /// Sending at the full target rate, driven by the timer.
    Sending,
    /// Too much backlog. A new request is only sent when a reply comes in.
    Gated,
    /// Not sending any more. Waiting for the outstanding replies.
    Draining,
}

/// What the caller should do after reporting a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ReplyStatus {
    /// Keep going.
    Continue,
    /// Every request has been replied to and nothing more will be sent. The final statistics are
    /// ready.
    Done,
}

/// Paces requests at a ramping target rate, backing off when replies don't keep up.
///
/// The pacer doesn't own a clock. Every entry point takes the current time, and the [`Timer`]
/// calls back into [`Pacer::on_timer()`] when it's time to send again.
///
/// All entry points take `&mut self`: there is exactly one writer, and a reply that releases a
/// gated send just calls straight back into the tick.
#[derive(Debug)]
pub struct Pacer<T: Timer, S> {
    config: Config,
    timer: T,
    /// The one outstanding timer, if any.
    pending: Option<T::Handle>,
    sender: S,

    state: State,
    stats: Stats,
    rtt: RttEstimator,
    backlog: BacklogEstimator,

    /// When the current ramp step started.
    step_start: Instant,
    /// When the current ramp step ends. `None` if it lasts longer than the clock can count.
    step_end: Option<Instant>,
    /// How many replies we had when the current ramp step started.
    step_received: u64,

    pps: u32,
    /// Time between ticks.
    delta: Duration,
    /// When we're next supposed to send.
    next: Instant,
    /// How many requests to send on the next tick.
    count: u32,

    /// Whether the CSV header has been handed out.
    header_written: bool,
}

impl<T: Timer, S: RequestSender> Pacer<T, S> {
    /// Create a pacer. Nothing happens until [`Pacer::start()`].
    pub fn new(timer: T, config: Config, sender: S) -> Self {
        let now = Instant::now();
        Self {
            config,
            timer,
            pending: None,
            sender,

            state: State::Init,
            stats: Stats::default(),
            rtt: RttEstimator::new(),
            backlog: BacklogEstimator::default(),

            step_start: now,
            step_end: None,
            step_received: 0,

            pps: config.start_pps,
            delta: interval(config.parallel, config.start_pps),
            next: now,
            count: config.parallel,

            header_written: false,
        }
    }

    /// Start sending. The first burst goes out before this returns.
    ///
    /// Fails if the first timer can't be armed. In that case nothing is sent and the pacer is left
    /// draining.
    pub fn start(&mut self, now: Instant) -> Result<(), PacerError> {
        if self.state != State::Init {
            return Err(PacerError::AlreadyStarted);
        }

        self.stats.start = Some(now);
        self.step_start = now;
        self.step_end = now.checked_add(self.config.step_duration);

        self.pps = self.config.start_pps;
        self.stats.pps = self.pps;
        self.delta = interval(self.config.parallel, self.pps);
        self.next = self.step_start + self.delta;
        self.count = self.config.parallel;

        info!(config = %self.config, "Starting load generation");

        self.tick(now)?;
        Ok(())
    }

    /// Stop sending. Any requests already in flight are still accounted for, and the last reply
    /// will report [`ReplyStatus::Done`].
    ///
    /// Idempotent. Does nothing before [`Pacer::start()`].
    pub fn stop(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.timer.cancel(handle);
        }

        if matches!(self.state, State::Sending | State::Gated) {
            self.transition(State::Draining);
        }
    }

    /// The armed timer has expired.
    ///
    /// A fire with no timer armed is ignored, e.g. one that raced with [`Pacer::stop()`].
    pub fn on_timer(&mut self, now: Instant) {
        if self.pending.take().is_none() {
            debug!("Ignoring timer fire with no timer armed");
            return;
        }

        self.resume(now);
    }

    /// A reply has come in for the request sent at `sent_at`.
    pub fn have_reply(&mut self, sent_at: Instant, now: Instant) -> Result<ReplyStatus, PacerError> {
        match self.state {
            State::Init => return Err(PacerError::NotStarted),
            _ if self.stats.end.is_some() => return Err(PacerError::Finished),
            _ if self.stats.received >= self.stats.sent => {
                return Err(PacerError::UnexpectedReply)
            }
            _ => {}
        }

        let t = nanos(now.saturating_duration_since(sent_at));

        self.rtt.update(t);
        self.stats.rtt = self.rtt.rtt();
        self.stats.rttvar = self.rtt.rttvar();

        self.stats.received += 1;

        // The step starts at a scheduled send time, which can still be in the future.
        let step_elapsed = nanos(now.saturating_duration_since(self.step_start));
        if step_elapsed > 0 {
            let accepted = u128::from(self.stats.received - self.step_received) * u128::from(NSEC)
                / u128::from(step_elapsed);
            self.stats.pps_accepted = u64::try_from(accepted).unwrap_or(u64::MAX);
        }

        self.stats.histogram.record(t);

        match self.state {
            State::Init | State::Sending => Ok(ReplyStatus::Continue),

            State::Gated => {
                // Backlog was too high, so sends are waiting on replies. Here's one.
                self.stats.blocked = true;
                self.resume(now);
                Ok(ReplyStatus::Continue)
            }

            State::Draining => {
                if self.stats.received < self.stats.sent {
                    return Ok(ReplyStatus::Continue);
                }

                self.stats.end = Some(now);
                info!(
                    sent = self.stats.sent,
                    max_backlog = self.stats.max_backlog,
                    "Load generation finished"
                );
                Ok(ReplyStatus::Done)
            }
        }
    }

    /// Statistics so far.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// What the pacer is currently doing.
    pub fn state(&self) -> State {
        self.state
    }

    /// Requests sent that haven't been replied to yet.
    pub fn outstanding(&self) -> u64 {
        self.stats.backlog()
    }

    /// The armed timer, if there is one.
    pub fn pending_timer(&self) -> Option<&T::Handle> {
        self.pending.as_ref()
    }

    /// The next CSV line for plotting this run.
    ///
    /// The first call returns the header and no data. Every call after that returns a data row for
    /// `now`.
    pub fn format_stats_line(&mut self, now: Instant) -> String {
        if !self.header_written {
            self.header_written = true;
            return report::HEADER.to_string();
        }

        report::data_row(&self.stats, now)
    }

    /// Tick outside of `start()`, where a timer failure has nobody to report to.
    fn resume(&mut self, now: Instant) {
        if let Err(err) = self.tick(now) {
            warn!(error = %err, "Unable to arm pacing timer, draining");
        }
    }

    /// Decide how much to send, send it, and schedule the next tick.
    ///
    /// If the timer can't be armed, nothing is sent and the pacer drains.
    fn tick(&mut self, now: Instant) -> Result<(), TimerError> {
        let queued = self.count;
        self.stats.sent += u64::from(queued);

        // The decision is made on the backlog as if the queued burst goes out.
        let previous = self.backlog;
        self.backlog.update(self.stats.backlog(), self.pps);
        self.stats.backlog_ema = self.backlog.ema();

        let delay = if self.backlog.admits(self.pps, self.config.milliseconds) {
            self.transition(State::Sending);
            self.stats.blocked = false;
            self.count = self.config.parallel;

            let next = self.next + self.delta;
            self.next = next;
            // Running late: catch up straight away.
            next.saturating_duration_since(now)
        } else {
            // Only send what's already been counted. More goes out as replies come in.
            self.transition(State::Gated);
            self.count = 1;

            self.next = now + self.delta;
            self.delta
        };

        // Count what is actually about to be sent.
        self.stats.sent = self.stats.sent - u64::from(queued) + u64::from(self.count);

        if self.step_end.is_some_and(|end| self.next >= end) {
            self.next_step();
        }

        // Arm the timer before sending, so time spent in the sender doesn't delay the next tick.
        if self.state == State::Sending {
            debug_assert!(self.pending.is_none(), "only one timer should be armed");

            match self.timer.arm(delay) {
                Ok(handle) => self.pending = Some(handle),
                Err(err) => {
                    // Never send without a timer to bound the burst.
                    self.stats.sent -= u64::from(self.count);
                    self.backlog = previous;
                    self.stats.backlog_ema = previous.ema();
                    self.transition(State::Draining);
                    return Err(err);
                }
            }
        }

        // High-water mark over the whole run, of what actually went out.
        self.stats.max_backlog = self.stats.max_backlog.max(self.stats.backlog());
        self.stats.last_send = Some(now);

        for _ in 0..self.count {
            self.sender.send(now);
        }

        Ok(())
    }

    fn next_step(&mut self) {
        self.step_start = self.next;
        self.step_end = self.next.checked_add(self.config.step_duration);
        self.step_received = self.stats.received;

        self.pps = self.pps.saturating_add(self.config.step);
        self.stats.pps = self.pps;
        self.delta = interval(self.config.parallel, self.pps);

        info!(pps = self.pps, "Next ramp step");

        if self.config.max_pps.is_some_and(|max| self.pps > max) {
            self.transition(State::Draining);
        }
    }

    fn transition(&mut self, to: State) {
        if self.state != to {
            debug!(from = %self.state, %to, pps = self.pps, "Pacer state changed");
            self.state = to;
        }
    }
}

impl<T: Timer, S> Drop for Pacer<T, S> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.timer.cancel(handle);
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Init => "init",
            State::Sending => "sending",
            State::Gated => "gated",
            State::Draining => "draining",
        })
    }
}

/// Time between ticks when sending `parallel` requests per tick at `pps`.
fn interval(parallel: u32, pps: u32) -> Duration {
    Duration::from_nanos(NSEC * u64::from(parallel) / u64::from(pps.max(1)))
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
