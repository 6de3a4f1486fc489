//! Active channel tracking.
//!
//! Two subscription classes:
//! - always-on: underlying tickers and the mark-price curve, subscribed
//!   once when the session becomes ready and never touched afterwards
//! - dynamic: per-expiration OTM option tickers, replaced on each
//!   recomputation through a minimal unsubscribe/subscribe diff

use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Ordered set of channel names.
pub type ChannelSet = BTreeSet<String>;

/// Channels to drop and to add, in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDiff {
    pub unsubscribe: Vec<String>,
    pub subscribe: Vec<String>,
}

impl SubscriptionDiff {
    /// Set difference in both directions.
    ///
    /// A channel present in both sets appears in neither list.
    pub fn between(previous: &ChannelSet, next: &ChannelSet) -> Self {
        Self {
            unsubscribe: previous.difference(next).cloned().collect(),
            subscribe: next.difference(previous).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.unsubscribe.is_empty() && self.subscribe.is_empty()
    }
}

/// Tracks which channels the session is subscribed to.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    always_on: RwLock<ChannelSet>,
    dynamic: RwLock<ChannelSet>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_always_on(channels: impl IntoIterator<Item = String>) -> Self {
        let manager = Self::new();
        manager.always_on.write().extend(channels);
        manager
    }

    pub fn always_on(&self) -> ChannelSet {
        self.always_on.read().clone()
    }

    pub fn dynamic(&self) -> ChannelSet {
        self.dynamic.read().clone()
    }

    /// All channels currently subscribed.
    pub fn active(&self) -> ChannelSet {
        let mut all = self.always_on();
        all.extend(self.dynamic.read().iter().cloned());
        all
    }

    /// Diff from the current dynamic set to `next`.
    ///
    /// Always-on channels are filtered out of both sides.
    pub fn plan_dynamic(&self, next: &ChannelSet) -> SubscriptionDiff {
        let always_on = self.always_on.read();
        let next: ChannelSet = next.difference(&always_on).cloned().collect();
        SubscriptionDiff::between(&self.dynamic.read(), &next)
    }

    /// Apply a diff once it has been sent.
    pub fn commit(&self, diff: &SubscriptionDiff) {
        let mut dynamic = self.dynamic.write();
        for channel in &diff.unsubscribe {
            dynamic.remove(channel);
        }
        dynamic.extend(diff.subscribe.iter().cloned());
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.always_on.read().contains(channel) || self.dynamic.read().contains(channel)
    }
}
