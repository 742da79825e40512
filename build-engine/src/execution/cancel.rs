// Cooperative Cancellation
// Watch-based scope passed down the plan traversal and observed at every
// suspension point

use tokio::sync::watch;

/// Create a cancellation scope. The source cancels it; the signal is cloned
/// into every concurrent unit the scope covers.
pub fn cancel_scope() -> (CancelSource, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelSource { tx }, CancelSignal { rx })
}

/// Owning side of a cancellation scope
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    /// Flag the scope as cancelled. Idempotent, and effective even before
    /// any signal is observing the scope.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A fresh signal observing this scope.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observing side of a cancellation scope
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once the scope is cancelled; pends forever if the scope ends
    /// without cancellation.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // The source is gone and never cancelled; nothing left to observe.
        std::future::pending::<()>().await
    }
}
