//! One-shot readiness signal.

use tokio::sync::watch;

use crate::StreamAppAudioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Pending,
    Ready,
    Closed,
}

/// Fires once, the first time a pipeline becomes active.
///
/// Closing an unfired signal wakes waiters with an error instead.
pub(crate) struct Readiness {
    tx: watch::Sender<Signal>,
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Signal::Pending);
        Self { tx }
    }

    /// Marks the signal ready. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|signal| {
            if *signal == Signal::Pending {
                *signal = Signal::Ready;
                true
            } else {
                false
            }
        })
    }

    /// Releases waiters of a signal that never fired.
    pub fn close(&self) {
        self.tx.send_if_modified(|signal| {
            if *signal == Signal::Pending {
                *signal = Signal::Closed;
                true
            } else {
                false
            }
        });
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow() == Signal::Ready
    }

    /// Waits until the signal fires.
    pub async fn wait(&self) -> Result<(), StreamAppAudioError> {
        let mut rx = self.tx.subscribe();
        let signal = rx
            .wait_for(|signal| *signal != Signal::Pending)
            .await
            .map_err(|_| StreamAppAudioError::SessionClosed)?;
        match *signal {
            Signal::Ready => Ok(()),
            Signal::Pending | Signal::Closed => Err(StreamAppAudioError::SessionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fires_exactly_once() {
        let readiness = Readiness::new();
        assert!(!readiness.is_ready());
        assert!(readiness.fire());
        assert!(!readiness.fire());
        assert!(readiness.is_ready());
    }

    #[test]
    fn test_close_after_fire_keeps_ready() {
        let readiness = Readiness::new();
        readiness.fire();
        readiness.close();
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn test_wait_after_fire_returns_immediately() {
        let readiness = Readiness::new();
        readiness.fire();
        readiness.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_fire() {
        let readiness = Arc::new(Readiness::new());
        let waiter = {
            let readiness = readiness.clone();
            tokio::spawn(async move { readiness.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        readiness.fire();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let readiness = Readiness::new();
        readiness.close();
        assert!(!readiness.fire());
        let err = readiness.wait().await.unwrap_err();
        assert!(matches!(err, StreamAppAudioError::SessionClosed));
    }
}
