use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::debug;

use crate::{error::TimerError, worker::Message};

/// Schedules the pacer's next tick.
///
/// When an armed timer expires, whoever owns the timer must call
/// [`Pacer::on_timer()`](crate::Pacer::on_timer) once. The pacer only ever has one timer armed at
/// a time, and cancels it before dropping it.
pub trait Timer {
    /// Identifies an armed timer.
    type Handle;

    /// Arrange for the pacer to be ticked no sooner than `delay` from now.
    fn arm(&mut self, delay: Duration) -> Result<Self::Handle, TimerError>;

    /// Make sure an armed timer never fires.
    fn cancel(&mut self, handle: Self::Handle);
}

/// Counts up every time a timer is armed, so a fire from a cancelled timer can be told apart from
/// the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Sleeps on the tokio timer wheel, then tells the worker.
#[derive(Debug)]
pub(crate) struct TokioTimer {
    tx: mpsc::Sender<Message>,
    generation: Generation,
}

#[derive(Debug)]
pub(crate) struct TokioTimerHandle {
    generation: Generation,
    handle: JoinHandle<()>,
}

impl TokioTimer {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self {
            tx,
            generation: Generation::default(),
        }
    }
}

impl TokioTimerHandle {
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl Timer for TokioTimer {
    type Handle = TokioTimerHandle;

    fn arm(&mut self, delay: Duration) -> Result<TokioTimerHandle, TimerError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TimerError::NoRuntime)?;
        if self.tx.is_closed() {
            return Err(TimerError::Closed);
        }

        self.generation = self.generation.next();
        let generation = self.generation;

        let deadline = Instant::now() + delay;
        let tx = self.tx.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;

            if tx.send(Message::TimerFired(generation)).await.is_err() {
                // The worker must have shut down, so there's nothing left to pace.
                debug!("A pacing timer fired but the worker has shut down");
            }
        });

        Ok(TokioTimerHandle { generation, handle })
    }

    fn cancel(&mut self, handle: TokioTimerHandle) {
        handle.handle.abort();
    }
}
