//! Advisory lifecycle notifications. Observers never influence control
//! flow; a slow or failing observer only loses events.

use model::events::LoadEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub trait LoadObserver: Send + Sync {
    fn notify(&self, event: &LoadEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LoadObserver for NoopObserver {
    fn notify(&self, _event: &LoadEvent) {}
}

/// Logs every event; errors at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LoadObserver for TracingObserver {
    fn notify(&self, event: &LoadEvent) {
        let run_id = event.run_id().as_str();
        if event.is_error() {
            warn!(run_id, event = event.event_type(), ?event, "Load event");
        } else {
            info!(run_id, event = event.event_type(), "Load event");
        }
    }
}

/// Forwards events to a bounded channel without blocking the run.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::Sender<LoadEvent>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::Sender<LoadEvent>) -> Self {
        Self { sender }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LoadEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl LoadObserver for ChannelObserver {
    fn notify(&self, event: &LoadEvent) {
        if let Err(e) = self.sender.try_send(event.clone()) {
            warn!(
                event = event.event_type(),
                error = %e,
                "Dropped load event for slow subscriber"
            );
        }
    }
}

impl<F> LoadObserver for F
where
    F: Fn(&LoadEvent) + Send + Sync,
{
    fn notify(&self, event: &LoadEvent) {
        self(event)
    }
}
