//! Consumer session lifecycle and readiness signalling.
//!
//! The consumer group publishes its state through a watch channel. Readiness
//! flips once, on the first successful join, and is withdrawn when shutdown
//! begins.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::error::EventError;

/// Lifecycle of a consumer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Ready,
    Consuming,
    Rebalancing,
    ShuttingDown,
    Closed,
}

impl SessionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Consuming => "consuming",
            Self::Rebalancing => "rebalancing",
            Self::ShuttingDown => "shutting_down",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// True once the group has been joined at least once.
    pub joined: bool,
}

impl SessionStatus {
    /// Whether `/readyz` should report ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.joined && !matches!(self.state, SessionState::ShuttingDown | SessionState::Closed)
    }
}

/// Owned by the consumer group; drives state transitions.
#[derive(Debug)]
pub struct SessionTracker {
    tx: watch::Sender<SessionStatus>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionStatus {
            state: SessionState::Initializing,
            joined: false,
        });
        Self { tx }
    }

    /// A readiness handle for external observers.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        Readiness {
            rx: self.tx.subscribe(),
        }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.tx.borrow()
    }

    fn transition(&self, state: SessionState, joined: bool) {
        self.tx.send_modify(|status| {
            if status.state != state {
                info!(from = %status.state, to = %state, "Consumer session transition");
            }
            status.state = state;
            status.joined |= joined;
        });
    }

    /// Partitions were assigned by the group coordinator.
    pub fn joined(&self) {
        let first = !self.status().joined;
        self.transition(SessionState::Ready, true);
        if first {
            info!("Consumer group joined");
        }
    }

    /// A claim received its first message.
    pub fn consuming(&self) {
        if self.status().state == SessionState::Ready {
            self.transition(SessionState::Consuming, false);
        }
    }

    /// The coordinator revoked partitions.
    pub fn rebalancing(&self) {
        self.transition(SessionState::Rebalancing, false);
    }

    pub fn shutting_down(&self) {
        self.transition(SessionState::ShuttingDown, false);
    }

    pub fn closed(&self) {
        self.transition(SessionState::Closed, false);
    }
}

/// Observer side of a [`SessionTracker`].
#[derive(Debug, Clone)]
pub struct Readiness {
    rx: watch::Receiver<SessionStatus>,
}

impl Readiness {
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.rx.borrow()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status().is_ready()
    }

    /// Wait for the first successful join.
    ///
    /// Returns false if the session closes, or its tracker is dropped, first.
    pub async fn wait_ready(&mut self) -> bool {
        let result = self
            .rx
            .wait_for(|status| status.joined || status.state == SessionState::Closed)
            .await;
        match result {
            Ok(status) => status.joined,
            Err(_) => false,
        }
    }

    /// [`wait_ready`](Self::wait_ready), bounded by `timeout`.
    ///
    /// An unreachable broker never produces a join or a close, so startup
    /// uses this to fail instead of waiting forever.
    pub async fn wait_joined(&mut self, timeout: Duration) -> Result<bool, EventError> {
        tokio::time::timeout(timeout, self.wait_ready())
            .await
            .map_err(|_| EventError::JoinTimeout {
                timeout_secs: timeout.as_secs(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_before_join() {
        let tracker = SessionTracker::new();
        let readiness = tracker.readiness();
        assert!(!readiness.is_ready());
        assert_eq!(readiness.status().state, SessionState::Initializing);
    }

    #[test]
    fn test_ready_survives_rebalance_but_not_shutdown() {
        let tracker = SessionTracker::new();
        let readiness = tracker.readiness();

        tracker.joined();
        tracker.consuming();
        assert_eq!(readiness.status().state, SessionState::Consuming);
        assert!(readiness.is_ready());

        tracker.rebalancing();
        assert!(readiness.is_ready());

        tracker.shutting_down();
        assert!(!readiness.is_ready());
        assert!(readiness.status().joined);
    }

    #[tokio::test]
    async fn test_wait_ready_resolves_on_join() {
        let tracker = SessionTracker::new();
        let mut readiness = tracker.readiness();

        let waiter = tokio::spawn(async move { readiness.wait_ready().await });
        tracker.joined();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_ready_false_when_closed_first() {
        let tracker = SessionTracker::new();
        let mut readiness = tracker.readiness();
        tracker.closed();
        assert!(!readiness.wait_ready().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_joined_times_out_without_join() {
        let tracker = SessionTracker::new();
        let mut readiness = tracker.readiness();

        let err = readiness
            .wait_joined(Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::JoinTimeout { timeout_secs: 30 }));
        assert!(!readiness.is_ready());
        drop(tracker);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_joined_returns_once_joined() {
        let tracker = SessionTracker::new();
        let mut readiness = tracker.readiness();

        let waiter =
            tokio::spawn(async move { readiness.wait_joined(Duration::from_secs(30)).await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        tracker.joined();
        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_wait_ready_false_when_tracker_dropped() {
        let tracker = SessionTracker::new();
        let mut readiness = tracker.readiness();
        drop(tracker);
        assert!(!readiness.wait_ready().await);
    }
}
