//! Coalescing debounce queue
//!
//! Collects signals and flushes once after a quiet interval: a burst of
//! signals inside the window collapses to a single flush. The window is a
//! first-class parameter so tests can exercise coalescing under a paused
//! clock.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

/// A coalescing signal queue with a trailing quiet-interval flush.
#[derive(Clone)]
pub struct CoalescingQueue {
    tx: mpsc::UnboundedSender<()>,
}

impl CoalescingQueue {
    /// Spawn the flush task. `on_flush` runs once per coalesced burst.
    pub fn spawn<F, Fut>(window: Duration, mut on_flush: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Keep absorbing signals until the window stays quiet
                loop {
                    match tokio::time::timeout(window, rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => {
                            on_flush().await;
                            return;
                        }
                        Err(_) => break,
                    }
                }
                on_flush().await;
            }
        });
        Self { tx }
    }

    /// Record one signal. Never blocks; sends after the queue is gone are
    /// silently dropped.
    pub fn signal(&self) {
        let _ = self.tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_to_one_flush() {
        let flushes = Arc::new(AtomicUsize::new(0));
        let counter = flushes.clone();
        let queue = CoalescingQueue::spawn(Duration::from_millis(100), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for _ in 0..5 {
            queue.signal();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn separated_bursts_flush_separately() {
        let flushes = Arc::new(AtomicUsize::new(0));
        let counter = flushes.clone();
        let queue = CoalescingQueue::spawn(Duration::from_millis(100), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        queue.signal();
        tokio::time::sleep(Duration::from_millis(200)).await;
        queue.signal();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(flushes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn signals_inside_window_extend_the_quiet_wait() {
        let flushes = Arc::new(AtomicUsize::new(0));
        let counter = flushes.clone();
        let queue = CoalescingQueue::spawn(Duration::from_millis(100), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // A steady trickle faster than the window keeps coalescing
        for _ in 0..4 {
            queue.signal();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(flushes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
    }
}
