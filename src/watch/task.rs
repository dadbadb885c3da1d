use std::panic;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned task that stops when its token is cancelled.
pub(crate) struct CancellableTask<T> {
    pub(crate) join_handle: JoinHandle<T>,
    pub(crate) token: CancellationToken,
}

impl<T> CancellableTask<T> {
    /// Signals the task without waiting for it.
    pub(crate) fn signal(&self) {
        self.token.cancel();
    }

    /// Signals the task and waits until it has finished, re-raising its panic if it had one.
    pub(crate) async fn cancel(self) {
        self.token.cancel();
        if let Err(err) = self.join_handle.await {
            if let Ok(panic) = err.try_into_panic() {
                panic::resume_unwind(panic)
            }
        }
    }
}
