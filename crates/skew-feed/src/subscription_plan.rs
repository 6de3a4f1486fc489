//! Dynamic subscription planning.
//!
//! For each selected expiration pick one OTM call and one OTM put from the
//! observed strike universe, then replace the dynamic ticker set through a
//! minimal unsubscribe/subscribe diff.

use crate::market_state::MarketState;
use skew_core::{Channels, CycleOutcome, Expiration, LegPair, OptionKind, SkipReason, Strike};
use skew_ws::{ChannelSet, SendError, SubscriptionDiff, SubscriptionManager, WsWriteHandle};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pick the OTM call/put pair for one expiration.
///
/// The call is the strike closest to `underlying * e^target`; the put is the
/// strike closest to `underlying^2 / call`. Ties go to the lower strike.
pub fn select_otm_strikes(underlying: f64, strikes: &[Strike], target_log_moneyness: f64) -> Option<LegPair> {
    if !(underlying.is_finite() && underlying > 0.0) {
        return None;
    }
    let call = closest(strikes, underlying * target_log_moneyness.exp())?;
    let put = closest(strikes, underlying * underlying / call as f64)?;
    Some(LegPair { call, put })
}

fn closest(strikes: &[Strike], target: f64) -> Option<Strike> {
    let mut best: Option<(Strike, f64)> = None;
    for &strike in strikes {
        let distance = (strike as f64 - target).abs();
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((strike, distance)),
        }
    }
    best.map(|(strike, _)| strike)
}

/// Result of one planning pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicPlan {
    /// Selected legs by expiration label.
    pub legs: BTreeMap<String, LegPair>,
    /// Dynamic option ticker channels.
    pub channels: ChannelSet,
}

/// Derives channel sets from the selected expirations and market state.
#[derive(Debug, Clone)]
pub struct SubscriptionPlanner {
    channels: Channels,
    expirations: Vec<Expiration>,
    perpetual_proxies: Vec<Expiration>,
    otm_log_moneyness: f64,
}

impl SubscriptionPlanner {
    pub fn new(
        channels: Channels,
        expirations: Vec<Expiration>,
        perpetual_proxies: Vec<Expiration>,
        otm_log_moneyness: f64,
    ) -> Self {
        Self {
            channels,
            expirations,
            perpetual_proxies,
            otm_log_moneyness,
        }
    }

    /// Underlying tickers and the mark-price curve.
    pub fn always_on(&self) -> ChannelSet {
        let mut set = ChannelSet::new();
        for expiration in &self.expirations {
            // A proxy expiration takes its underlying price from the
            // perpetual ticker; its own future ticker is never subscribed.
            if !self.perpetual_proxies.contains(expiration) {
                set.insert(self.channels.future_ticker(expiration));
            }
        }
        if !self.perpetual_proxies.is_empty() {
            set.insert(self.channels.perpetual_ticker());
        }
        set.insert(self.channels.mark_price_curve());
        set
    }

    /// Plan the dynamic set.
    ///
    /// Every selected expiration needs an underlying price and a non-empty
    /// strike universe; otherwise nothing is planned.
    pub fn plan(&self, state: &MarketState) -> Result<DynamicPlan, SkipReason> {
        let mut legs = BTreeMap::new();
        let mut channels = ChannelSet::new();

        for expiration in &self.expirations {
            let label = expiration.label();
            let underlying = state
                .underlying(label)
                .ok_or_else(|| SkipReason::NotReady(format!("underlying price for {label}")))?;
            let strikes = state.strikes(label);
            if strikes.is_empty() {
                return Err(SkipReason::NotReady(format!("strike universe for {label}")));
            }
            let pair = select_otm_strikes(underlying, &strikes, self.otm_log_moneyness)
                .ok_or_else(|| SkipReason::InsufficientData(format!("no strike selectable for {label}")))?;

            channels.insert(self.channels.option_ticker(expiration, pair.call, OptionKind::Call));
            channels.insert(self.channels.option_ticker(expiration, pair.put, OptionKind::Put));
            legs.insert(label.to_string(), pair);
        }

        Ok(DynamicPlan { legs, channels })
    }
}

/// Periodic subscription recomputation.
pub struct SubscriptionUpdater {
    planner: SubscriptionPlanner,
    state: Arc<MarketState>,
    manager: Arc<SubscriptionManager>,
    handle: WsWriteHandle,
    retry_after: Duration,
}

impl SubscriptionUpdater {
    pub fn new(
        planner: SubscriptionPlanner,
        state: Arc<MarketState>,
        manager: Arc<SubscriptionManager>,
        handle: WsWriteHandle,
        retry_after: Duration,
    ) -> Self {
        Self {
            planner,
            state,
            manager,
            handle,
            retry_after,
        }
    }

    /// Recompute and apply the dynamic subscription set.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let plan = match self.planner.plan(&self.state) {
            Ok(plan) => plan,
            Err(reason) => {
                return CycleOutcome::Deferred {
                    reason,
                    retry_after: self.retry_after,
                }
            }
        };

        let diff = self.manager.plan_dynamic(&plan.channels);
        if diff.is_empty() {
            debug!(channels = plan.channels.len(), "Dynamic subscriptions unchanged");
        } else {
            if let Err(e) = self.handle.unsubscribe(&diff.unsubscribe).await {
                return self.send_failure(e);
            }
            if let Err(e) = self.handle.subscribe(&diff.subscribe).await {
                self.manager.commit(&SubscriptionDiff {
                    unsubscribe: diff.unsubscribe.clone(),
                    subscribe: Vec::new(),
                });
                return self.send_failure(e);
            }
            self.manager.commit(&diff);
            info!(
                removed = diff.unsubscribe.len(),
                added = diff.subscribe.len(),
                channels = ?plan.channels,
                "Subscriptions updated"
            );
        }

        for (label, pair) in &plan.legs {
            self.state.set_legs(label, *pair);
        }
        CycleOutcome::Completed
    }

    fn send_failure(&self, error: SendError) -> CycleOutcome {
        match error {
            SendError::ChannelClosed => CycleOutcome::Fatal("session writer closed".to_string()),
            SendError::NotReady => CycleOutcome::Deferred {
                reason: SkipReason::NotReady("session not ready".to_string()),
                retry_after: self.retry_after,
            },
            SendError::Encode(e) => {
                warn!(error = %e, "Subscription request could not be encoded");
                CycleOutcome::Skipped(SkipReason::Failed(e))
            }
        }
    }

    pub fn planner(&self) -> &SubscriptionPlanner {
        &self.planner
    }
}
