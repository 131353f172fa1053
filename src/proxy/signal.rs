//! Single-fire shutdown signal.
//!
//! The notifier fires when [`ShutdownNotifier::notify`] is called or when it
//! is dropped, whichever comes first, and never more than once. Moving the
//! notifier into a task therefore signals the task's end on every path,
//! including errors and panics.

use tokio::sync::oneshot;

/// Create a connected notifier/waiter pair.
pub fn shutdown_signal() -> (ShutdownNotifier, ShutdownWaiter) {
    let (tx, rx) = oneshot::channel();
    (
        ShutdownNotifier { tx: Some(tx) },
        ShutdownWaiter { rx },
    )
}

/// Sending half; fires at most once.
#[derive(Debug)]
pub struct ShutdownNotifier {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownNotifier {
    /// Fire the signal now.
    pub fn notify(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownNotifier {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Receiving half; awaited once.
#[derive(Debug)]
pub struct ShutdownWaiter {
    rx: oneshot::Receiver<()>,
}

impl ShutdownWaiter {
    /// Wait until the notifier fires.
    pub async fn wait(self) {
        // A closed channel also means the notifier is gone.
        let _ = self.rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_explicit_notify() {
        let (notifier, waiter) = shutdown_signal();
        notifier.notify();
        timeout(Duration::from_secs(1), waiter.wait())
            .await
            .expect("waiter should be released");
    }

    #[tokio::test]
    async fn test_drop_fires() {
        let (notifier, waiter) = shutdown_signal();
        drop(notifier);
        timeout(Duration::from_secs(1), waiter.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_panicking_task_fires() {
        let (notifier, waiter) = shutdown_signal();
        let handle = tokio::spawn(async move {
            let _notifier = notifier;
            panic!("accept loop crashed");
        });

        assert!(handle.await.is_err());
        timeout(Duration::from_secs(1), waiter.wait())
            .await
            .expect("panicking task must still signal");
    }

    #[tokio::test]
    async fn test_pending_until_fired() {
        let (notifier, waiter) = shutdown_signal();
        let wait = tokio::spawn(waiter.wait());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!wait.is_finished());

        notifier.notify();
        timeout(Duration::from_secs(1), wait).await.unwrap().unwrap();
    }
}
