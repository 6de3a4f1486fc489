//! Server-driven heartbeat monitoring.
//!
//! After `public/set_heartbeat` the exchange sends a `heartbeat` push every
//! interval and drops the connection unless each test request is answered with
//! `public/test`. The session replies inline; this monitor tracks test request and
//! reply counts and detects a silent connection.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Heartbeat monitor for one session.
pub struct HeartbeatMonitor {
    /// Requested server heartbeat interval.
    interval: Duration,
    /// The session is considered dead after `interval * timeout_multiplier`
    /// without any inbound frame.
    timeout_multiplier: u32,
    /// Last frame of any kind.
    last_message: RwLock<DateTime<Utc>>,
    /// Last heartbeat test request.
    last_test_request: RwLock<Option<DateTime<Utc>>>,
    test_requests: AtomicU64,
    replies_acked: AtomicU64,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, timeout_multiplier: u32) -> Self {
        Self {
            interval,
            timeout_multiplier: timeout_multiplier.max(1),
            last_message: RwLock::new(Utc::now()),
            last_test_request: RwLock::new(None),
            test_requests: AtomicU64::new(0),
            replies_acked: AtomicU64::new(0),
        }
    }

    /// Reset state (called on connect).
    pub fn reset(&self) {
        *self.last_message.write() = Utc::now();
        *self.last_test_request.write() = None;
        self.test_requests.store(0, Ordering::Relaxed);
        self.replies_acked.store(0, Ordering::Relaxed);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Silence budget before the session is declared dead.
    pub fn timeout(&self) -> Duration {
        self.interval * self.timeout_multiplier
    }

    pub fn record_message(&self) {
        *self.last_message.write() = Utc::now();
    }

    /// Record an inbound test request (a reply is sent right away).
    pub fn record_test_request(&self) {
        let now = Utc::now();
        *self.last_test_request.write() = Some(now);
        let count = self.test_requests.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(count, "Heartbeat test request received");
    }

    /// Record the exchange's response to our `public/test` reply.
    pub fn record_reply_ack(&self) {
        self.replies_acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn test_request_count(&self) -> u64 {
        self.test_requests.load(Ordering::Relaxed)
    }

    pub fn reply_ack_count(&self) -> u64 {
        self.replies_acked.load(Ordering::Relaxed)
    }

    pub fn last_test_request(&self) -> Option<DateTime<Utc>> {
        *self.last_test_request.read()
    }

    pub fn time_since_last_message_ms(&self) -> i64 {
        (Utc::now() - *self.last_message.read()).num_milliseconds()
    }

    /// No inbound frame within the silence budget.
    pub fn is_stale(&self) -> bool {
        self.time_since_last_message_ms() > self.timeout().as_millis() as i64
    }
}
