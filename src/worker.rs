use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    config::Config,
    error::{GeneratorError, GeneratorResult},
    generator::Replier,
    pacer::{Pacer, ReplyStatus, RequestSender, State},
    stats::Stats,
    timer::{Generation, TokioTimer},
};

/// Timer fires and queries are rare, so this only needs to avoid blocking in normal operation.
const MESSAGE_CAPACITY: usize = 16;

pub(crate) struct Worker<S> {
    /// The pacer this worker drives. Only ever touched from the worker task.
    pacer: Pacer<TokioTimer, S>,

    /// Receives timer fires and requests from handles.
    msg_rx: mpsc::Receiver<Message>,
    /// Receives the send times of requests that have been replied to.
    reply_rx: mpsc::UnboundedReceiver<Instant>,

    /// How the run ended, once it has.
    outcome: Option<GeneratorResult<Stats>>,
    /// Waiting to be told how the run ended.
    finish_notifiers: Vec<oneshot::Sender<GeneratorResult<Stats>>>,
}

#[derive(Debug)]
pub(crate) enum Message {
    TimerFired(Generation),
    Stats(oneshot::Sender<Stats>),
    StatsLine(oneshot::Sender<String>),
    Stop,
    Finished(oneshot::Sender<GeneratorResult<Stats>>),
}

/// Aborts the worker task when dropped.
#[derive(Debug)]
pub(crate) struct WorkerDropGuard {
    handle: JoinHandle<()>,
}

impl<S> Worker<S>
where
    S: RequestSender + Send + 'static,
{
    pub fn spawn(
        name: &str,
        config: Config,
        make_sender: impl FnOnce(Replier) -> S,
    ) -> (mpsc::Sender<Message>, WorkerDropGuard) {
        let (msg_tx, msg_rx) = mpsc::channel(MESSAGE_CAPACITY);
        // Replies must never be dropped or block the caller, otherwise the accounting drifts.
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let sender = make_sender(Replier::new(reply_tx));
        let timer = TokioTimer::new(msg_tx.clone());

        let mut worker = Worker {
            pacer: Pacer::new(timer, config, sender),

            msg_rx,
            reply_rx,

            outcome: None,
            finish_notifiers: Vec::new(),
        };

        let span = info_span!("load generator", name);
        let handle = tokio::spawn(
            async move {
                worker.run().await;
            }
            .instrument(span),
        );

        (msg_tx, WorkerDropGuard { handle })
    }

    fn handle(&mut self, msg: Message) {
        match msg {
            Message::TimerFired(generation) => self.on_timer(generation),

            Message::Stats(tx) => {
                if tx.send(self.pacer.stats().clone()).is_err() {
                    debug!("Unable to send stats: receiver dropped");
                }
            }

            Message::StatsLine(tx) => {
                let line = self.pacer.format_stats_line(Instant::now());
                if tx.send(line).is_err() {
                    debug!("Unable to send stats line: receiver dropped");
                }
            }

            Message::Stop => {
                info!("Stopping load generation");
                self.pacer.stop();
                self.finish_if_drained();
            }

            Message::Finished(tx) => match &self.outcome {
                Some(outcome) => {
                    if tx.send(outcome.clone()).is_err() {
                        debug!("Unable to send outcome: receiver dropped");
                    }
                }
                None => self.finish_notifiers.push(tx),
            },
        }
    }

    fn on_timer(&mut self, generation: Generation) {
        let current = self
            .pacer
            .pending_timer()
            .is_some_and(|handle| handle.generation() == generation);

        if !current {
            // Cancelled after it had already fired.
            debug!("Ignoring stale pacing timer");
            return;
        }

        self.pacer.on_timer(Instant::now());
        self.finish_if_drained();
    }

    fn on_reply(&mut self, sent_at: Instant) {
        match self.pacer.have_reply(sent_at, Instant::now()) {
            Ok(ReplyStatus::Continue) => {}
            Ok(ReplyStatus::Done) => self.finish(Ok(self.pacer.stats().clone())),
            Err(err) => warn!(error = %err, "Ignoring reply"),
        }
    }

    /// A run can end up draining with nothing in flight, e.g. stopped between bursts. No reply
    /// is coming to finish it, so finish it here.
    fn finish_if_drained(&mut self) {
        if self.outcome.is_none()
            && self.pacer.state() == State::Draining
            && self.pacer.outstanding() == 0
        {
            self.finish(Ok(self.pacer.stats().clone()));
        }
    }

    fn finish(&mut self, outcome: GeneratorResult<Stats>) {
        if let Ok(stats) = &outcome {
            info!(
                sent = stats.sent,
                received = stats.received,
                "Load generator finished"
            );
        }

        for tx in self.finish_notifiers.drain(..) {
            if tx.send(outcome.clone()).is_err() {
                debug!("Unable to send outcome: receiver dropped");
            }
        }

        self.outcome = Some(outcome);
    }

    /// Start pacing, then run the worker event loop.
    async fn run(&mut self) {
        match self.pacer.start(Instant::now()) {
            Ok(()) => self.finish_if_drained(),
            Err(err) => {
                warn!(error = %err, "Unable to start load generation");
                self.finish(Err(GeneratorError::Start(err)));
            }
        }

        loop {
            tokio::select! {
                Some(msg) = self.msg_rx.recv() => {
                    self.handle(msg);
                }

                Some(sent_at) = self.reply_rx.recv() => {
                    self.on_reply(sent_at);
                }

                else => break,
            }
        }

        debug!("Load generator worker stopped");
    }
}

impl Drop for WorkerDropGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
