//! Transport liveness.
//!
//! rumqttc reconnects on the next `poll()` after a connection error, so the
//! supervisor's job is pacing and bookkeeping: hold polling back for a fixed
//! retry interval after each failure, and re-subscribe the routing topics on
//! every ConnAck (sessions are clean, subscriptions do not survive).

use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::ErrorKind;
use crate::transport::Publisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Connected,
    /// Waiting for the retry window to open.
    Backoff,
    /// Retry window is open; the next poll attempts a reconnect.
    Reconnecting,
}

pub struct ConnectionSupervisor {
    topics: Vec<String>,
    retry_interval: Duration,
    connected: bool,
    retry_at: Option<Instant>,
    attempts: u32,
}

impl ConnectionSupervisor {
    pub fn new(topics: Vec<String>, retry_interval: Duration) -> Self {
        Self {
            topics,
            retry_interval,
            connected: false,
            retry_at: None,
            attempts: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the control loop may poll the event loop at `now`.
    pub fn may_poll(&self, now: Instant) -> bool {
        self.retry_at.map_or(true, |at| now >= at)
    }

    /// ConnAck received: re-subscribe everything the router listens on.
    /// Returns the subscribe failures; the connection itself is still up.
    pub fn on_connected(&mut self, publisher: &dyn Publisher) -> Vec<ErrorKind> {
        self.connected = true;
        self.retry_at = None;
        if self.attempts > 0 {
            info!(attempts = self.attempts, "transport reconnected");
        }
        self.attempts = 0;

        let mut failures = Vec::new();
        for topic in &self.topics {
            match publisher.subscribe(topic) {
                Ok(()) => info!(%topic, "subscribed"),
                Err(e) => {
                    warn!(%topic, "subscribe failed: {e}");
                    failures.push(e);
                }
            }
        }
        failures
    }

    pub fn on_disconnected(&mut self, now: Instant, reason: &str) -> ErrorKind {
        self.connected = false;
        self.attempts = self.attempts.saturating_add(1);
        self.retry_at = Some(now + self.retry_interval);
        let err = ErrorKind::TransportDisconnected(reason.to_string());
        warn!(
            attempt = self.attempts,
            retry_in_ms = self.retry_interval.as_millis() as u64,
            "{err}"
        );
        err
    }

    /// Periodic liveness check.
    pub fn check(&self, now: Instant) -> Liveness {
        if self.is_connected() {
            return Liveness::Connected;
        }
        let state = if self.may_poll(now) {
            Liveness::Reconnecting
        } else {
            Liveness::Backoff
        };
        warn!(attempts = self.attempts, ?state, "transport down");
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingPublisher;

    fn supervisor() -> ConnectionSupervisor {
        ConnectionSupervisor::new(
            vec!["1/device".into(), "greenhouse/schedule".into()],
            Duration::from_secs(2),
        )
    }

    #[test]
    fn starts_disconnected_but_pollable() {
        let s = supervisor();
        assert!(!s.is_connected());
        assert!(s.may_poll(Instant::now()));
    }

    #[test]
    fn connack_resubscribes_all_topics() {
        let mut s = supervisor();
        let p = RecordingPublisher::default();
        let failures = s.on_connected(&p);
        assert!(failures.is_empty());
        assert!(s.is_connected());
        assert_eq!(*p.subscribed.borrow(), ["1/device", "greenhouse/schedule"]);
    }

    #[test]
    fn every_reconnect_resubscribes_again() {
        let mut s = supervisor();
        let p = RecordingPublisher::default();
        s.on_connected(&p);
        s.on_disconnected(Instant::now(), "io error");
        s.on_connected(&p);
        assert_eq!(p.subscribed.borrow().len(), 4);
    }

    #[test]
    fn subscribe_failures_are_reported() {
        let mut s = supervisor();
        let failures = s.on_connected(&RecordingPublisher::failing());
        assert_eq!(failures.len(), 2);
        assert!(s.is_connected());
    }

    #[test]
    fn disconnect_holds_polling_for_fixed_interval() {
        let mut s = supervisor();
        let t0 = Instant::now();
        let err = s.on_disconnected(t0, "connection refused");
        assert!(matches!(err, ErrorKind::TransportDisconnected(_)));
        assert!(!s.may_poll(t0));
        assert!(!s.may_poll(t0 + Duration::from_millis(1999)));
        assert!(s.may_poll(t0 + Duration::from_secs(2)));
        assert_eq!(s.check(t0), Liveness::Backoff);
        assert_eq!(s.check(t0 + Duration::from_secs(3)), Liveness::Reconnecting);
    }

    #[test]
    fn retry_interval_does_not_grow() {
        let mut s = supervisor();
        let t0 = Instant::now();
        s.on_disconnected(t0, "a");
        let t1 = t0 + Duration::from_secs(2);
        s.on_disconnected(t1, "b");
        assert_eq!(s.attempts(), 2);
        assert!(s.may_poll(t1 + Duration::from_secs(2)));
    }

    #[test]
    fn connack_clears_attempts() {
        let mut s = supervisor();
        s.on_disconnected(Instant::now(), "a");
        s.on_connected(&RecordingPublisher::default());
        assert_eq!(s.attempts(), 0);
        assert_eq!(s.check(Instant::now()), Liveness::Connected);
    }
}
