//! Search input debouncing.
//!
//! Each keystroke calls [`SearchDebouncer::settle`]. The call resolves to the
//! text once the quiet period passes with no newer input, or to `None` as soon
//! as it is overtaken. Only the last input of a burst is committed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub struct SearchDebouncer {
    delay: Duration,
    generation: AtomicU64,
}

impl SearchDebouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: AtomicU64::new(0),
        }
    }

    /// Waits out the quiet period. Returns `Some(text)` if no newer input
    /// arrived in the meantime.
    pub async fn settle(&self, text: String) -> Option<String> {
        let mine = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        (self.generation.load(Ordering::SeqCst) == mine).then_some(text)
    }

    /// Discards any pending input.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn only_last_input_of_a_burst_settles() {
        let debouncer = Arc::new(SearchDebouncer::new(Duration::from_millis(300)));

        let first = {
            let d = Arc::clone(&debouncer);
            tokio::spawn(async move { d.settle("ac".into()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = {
            let d = Arc::clone(&debouncer);
            tokio::spawn(async move { d.settle("acme".into()).await })
        };

        assert_eq!(first.await.unwrap(), None);
        assert_eq!(second.await.unwrap(), Some("acme".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_inputs_both_settle() {
        let debouncer = SearchDebouncer::new(Duration::from_millis(50));
        assert_eq!(debouncer.settle("a".into()).await, Some("a".to_string()));
        assert_eq!(debouncer.settle("b".into()).await, Some("b".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_input() {
        let debouncer = Arc::new(SearchDebouncer::new(Duration::from_millis(50)));
        let pending = {
            let d = Arc::clone(&debouncer);
            tokio::spawn(async move { d.settle("x".into()).await })
        };
        while debouncer.generation.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        debouncer.cancel();
        assert_eq!(pending.await.unwrap(), None);
    }
}
