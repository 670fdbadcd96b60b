use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A cancellable one-shot timer: fires `on_fire` after `delay` unless [`RetryTimer::cancel`] wins
/// the race first. Cancelling after it has already fired is a harmless no-op, matching the
/// `cancel_upload`/`select!` shape used for worker cancellation elsewhere in this codebase.
pub struct RetryTimer {
    cancel: CancellationToken,
}

impl RetryTimer {
    pub fn spawn<F>(delay: Duration, on_fire: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => on_fire.await,
                _ = token.cancelled() => {}
            }
        });
        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
