use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle over a set of background loops sharing one shutdown signal.
/// - dropping the group drops `shutdown_tx`, which also stops the loops
/// - `shutdown_and_join()` waits for every loop to return
pub struct LoopGroup {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    joins: Vec<(&'static str, JoinHandle<()>)>,
}

impl LoopGroup {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            shutdown_rx,
            joins: Vec::new(),
        }
    }

    /// Spawn a loop. It receives its own shutdown receiver.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, make: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let join = tokio::spawn(make(self.shutdown_rx.clone()));
        self.joins.push((name, join));
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Ask every loop to stop. Loops finish their current iteration first.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for (name, join) in self.joins {
            match join.await {
                Ok(()) => debug!(task = name, "background loop stopped"),
                Err(err) => warn!(task = name, error = %err, "background loop panicked"),
            }
        }
    }
}

impl Default for LoopGroup {
    fn default() -> Self {
        Self::new()
    }
}
