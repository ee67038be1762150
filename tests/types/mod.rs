use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use load_pacer::Replier;
use tokio::time::Instant;

/// Replies to every request after a fixed latency.
pub fn reply_after(replier: Replier, latency: Duration) -> impl FnMut(Instant) + Send + 'static {
    move |sent_at: Instant| {
        let replier = replier.clone();
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            // Fine if the generator has gone away.
            let _ = replier.reply(sent_at);
        });
    }
}

/// Requests that haven't been replied to, by send time.
pub type Held = Arc<Mutex<Vec<Instant>>>;

/// Never replies. Keeps track of what was sent so the test can reply when it wants.
pub fn hold(held: Held) -> impl FnMut(Instant) + Send + 'static {
    move |sent_at: Instant| held.lock().unwrap().push(sent_at)
}
