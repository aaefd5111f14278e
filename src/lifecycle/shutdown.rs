//! Stop signal shared by the accept loop, the expirer and every connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Cloneable stop switch.
///
/// Receivers created before [`Shutdown::trigger`] get one `()` message.
/// A receiver created afterwards would wait forever, so callers that may
/// subscribe late use [`Shutdown::subscribe_unless_triggered`].
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Only the first call notifies.
    pub fn trigger(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(());
        }
    }

    /// Subscribe, or `None` if the signal already fired.
    ///
    /// The receiver exists before the flag is read, so a trigger racing with
    /// this call is either reported here or delivered to the receiver.
    pub fn subscribe_unless_triggered(&self) -> Option<broadcast::Receiver<()>> {
        let rx = self.tx.subscribe();
        if self.is_triggered() {
            None
        } else {
            Some(rx)
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Tasks still holding a receiver.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
