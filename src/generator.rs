use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};

use crate::{
    config::Config,
    error::GeneratorResult,
    pacer::RequestSender,
    stats::Stats,
    worker::{Message, Worker, WorkerDropGuard},
};

/// Runs a [`Pacer`](crate::Pacer) on a background tokio task.
///
/// The pacer starts sending as soon as the generator is spawned. Requests are sent by calling the
/// [`RequestSender`] built from a [`Replier`], which must be told about every reply.
///
/// Cheap to clone. Cloned instances share the same background worker task.
///
/// ## Drop
///
/// When the last instance of a `LoadGenerator` is dropped, the worker task will be aborted. Use
/// [`LoadGenerator::stop()`] and [`LoadGenerator::finished()`] to wind the run down cleanly.
#[derive(Debug)]
pub struct LoadGenerator {
    name: String,
    msg_tx: mpsc::Sender<Message>,
    worker_guard: Arc<WorkerDropGuard>,
}

/// Reports replies back to a [`LoadGenerator`].
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct Replier {
    tx: mpsc::UnboundedSender<Instant>,
}

impl LoadGenerator {
    /// Spawn a worker task and start generating load.
    ///
    /// `make_sender` is given the [`Replier`] for this generator and returns what sends each
    /// request. Must be called from inside a tokio runtime.
    pub fn spawn<S>(
        name: impl Into<String>,
        config: Config,
        make_sender: impl FnOnce(Replier) -> S,
    ) -> Self
    where
        S: RequestSender + Send + 'static,
    {
        let name = name.into();

        let (msg_tx, worker_guard) = Worker::spawn(&name, config, make_sender);

        Self {
            name,
            msg_tx,
            worker_guard: Arc::new(worker_guard),
        }
    }

    /// The name given to this generator.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A snapshot of the statistics so far.
    pub async fn stats(&self) -> GeneratorResult<Stats> {
        let (tx, rx) = oneshot::channel();
        self.msg_tx.send(Message::Stats(tx)).await?;

        Ok(rx.await?)
    }

    /// The next CSV line for plotting this run.
    ///
    /// The first call for a generator returns the header, every later call a data row.
    pub async fn stats_line(&self) -> GeneratorResult<String> {
        let (tx, rx) = oneshot::channel();
        self.msg_tx.send(Message::StatsLine(tx)).await?;

        Ok(rx.await?)
    }

    /// Stop sending new requests. The run finishes once every outstanding request has been
    /// replied to.
    pub async fn stop(&self) -> GeneratorResult<()> {
        self.msg_tx.send(Message::Stop).await?;

        Ok(())
    }

    /// Wait for the run to finish, and get the final statistics.
    ///
    /// A run finishes when it has stopped sending, either because the rate went over the limit or
    /// because it was stopped, and every request has been replied to.
    pub async fn finished(&self) -> GeneratorResult<Stats> {
        let (tx, rx) = oneshot::channel();
        self.msg_tx.send(Message::Finished(tx)).await?;

        rx.await?
    }
}

impl Clone for LoadGenerator {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            msg_tx: self.msg_tx.clone(),
            worker_guard: Arc::clone(&self.worker_guard),
        }
    }
}

impl Replier {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Instant>) -> Self {
        Self { tx }
    }

    /// A reply has come in for the request sent at `sent_at`.
    pub fn reply(&self, sent_at: Instant) -> GeneratorResult<()> {
        self.tx.send(sent_at)?;

        Ok(())
    }
}
