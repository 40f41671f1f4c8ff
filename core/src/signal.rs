use std::sync::Arc;
use tokio::sync::Notify;

/// Coalescing wake-up flag shared between a producer and one waiting task.
///
/// At most one pending raise is stored: raising again before the waiter
/// consumes it is absorbed, so frames or packets in between are skipped.
/// Safe to raise from a plain OS thread.
#[derive(Debug, Default)]
pub struct ReadySignal {
    notify: Notify,
}

impl ReadySignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn raise(&self) {
        self.notify.notify_one();
    }

    /// Waits for a pending raise and clears it.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn pending_raise_wakes_later_waiter() {
        let signal = ReadySignal::new();
        signal.raise();
        timeout(Duration::from_millis(200), signal.wait())
            .await
            .expect("stored raise should complete the wait");
    }

    #[tokio::test]
    async fn repeated_raises_collapse_into_one() {
        let signal = ReadySignal::new();
        signal.raise();
        signal.raise();
        signal.raise();

        signal.wait().await;
        let second = timeout(Duration::from_millis(50), signal.wait()).await;
        assert!(second.is_err(), "only one raise should have been stored");
    }

    #[tokio::test]
    async fn raise_from_os_thread_wakes_task() {
        let signal = ReadySignal::new();
        let producer = Arc::clone(&signal);
        let waiter = tokio::spawn(async move { signal.wait().await });
        std::thread::spawn(move || producer.raise());
        timeout(Duration::from_millis(500), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
