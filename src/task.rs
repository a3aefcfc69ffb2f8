use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A spawned background loop that is cancelled when stopped or dropped.
///
/// Every timer-driven loop (frame sending, calibration sampling, dwell
/// evaluation, stream reconnection) is held through one of these, so a
/// component going away can never leave a stray timer behind.
pub struct ScopedTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScopedTask {
    /// Spawn `body` with a token it must watch for cancellation
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(body(cancel.clone()));
        debug!("Started task '{}'", name);

        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    /// Task name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the task body has returned
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Cancel and wait for the task to wind down, aborting it after `grace`
    pub async fn stop(mut self, grace: Duration) {
        self.cancel.cancel();
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!("Task '{}' did not stop within {:?}, aborting", self.name, grace);
                handle.abort();
            }
        }
        debug!("Stopped task '{}'", self.name);
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn ticking_task(counter: Arc<AtomicU32>) -> ScopedTask {
        ScopedTask::spawn("ticker", move |cancel| async move {
            let mut interval = tokio::time::interval(Duration::from_millis(10));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_task() {
        let counter = Arc::new(AtomicU32::new(0));
        let task = ticking_task(Arc::clone(&counter));

        tokio::time::sleep(Duration::from_millis(55)).await;
        drop(task);
        let after_drop = counter.load(Ordering::SeqCst);
        assert!(after_drop > 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_task() {
        let counter = Arc::new(AtomicU32::new(0));
        let task = ticking_task(Arc::clone(&counter));

        tokio::time::sleep(Duration::from_millis(25)).await;
        task.stop(Duration::from_secs(1)).await;
        let after_stop = counter.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }
}
