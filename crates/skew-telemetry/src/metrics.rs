//! Prometheus metrics for the skew bot.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means a duplicate metric name, which should crash at startup rather than
//! fail silently. These panics only happen during static initialization.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_int_counter, register_int_gauge, CounterVec, Encoder,
    GaugeVec, IntCounter, IntGauge, TextEncoder,
};

const SESSION_STATES: [&str; 5] = ["disconnected", "connecting", "authenticating", "ready", "closing"];

/// Session state machine current state.
/// Labels: state (disconnected/connecting/authenticating/ready/closing)
pub static SESSION_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "skew_session_state",
        "Session state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Heartbeat test requests answered with `public/test`.
pub static HEARTBEAT_REPLIES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "skew_heartbeat_replies",
        "Heartbeat test requests answered in the current session"
    )
    .unwrap()
});

/// Rows forwarded to storage.
pub static ROWS_STORED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("skew_rows_stored_total", "Option rows forwarded to storage").unwrap()
});

/// Option rows rejected by ingest.
/// Labels: reason (not_selected/no_underlying/in_the_money/missing_quote/malformed)
pub static ROWS_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "skew_rows_rejected_total",
        "Option rows rejected by ingest",
        &["reason"]
    )
    .unwrap()
});

/// Latest at-the-money slope per expiration.
pub static ATM_SLOPE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "skew_atm_slope",
        "At-the-money slope of the fitted smile",
        &["expiration"]
    )
    .unwrap()
});

/// Skewness of the risk-neutral density per expiration.
pub static DENSITY_SKEWNESS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "skew_density_skewness",
        "Standardized third moment of the risk-neutral density",
        &["expiration"]
    )
    .unwrap()
});

/// Latest risk-reversal spread.
/// Labels: variant (iv/price)
pub static RR_SPREAD: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "skew_rr_spread",
        "Latest calendar risk-reversal spread",
        &["variant"]
    )
    .unwrap()
});

/// Margin pre-check results.
/// Labels: direction (SHORT/LONG), result (pass/fail)
pub static MARGIN_CHECK_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "skew_margin_check_total",
        "Margin pre-check evaluations",
        &["direction", "result"]
    )
    .unwrap()
});

/// Spread executions.
/// Labels: direction, result (fired/partial)
pub static EXECUTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "skew_executions_total",
        "Four-leg spread executions",
        &["direction", "result"]
    )
    .unwrap()
});

/// Periodic cycle outcomes.
/// Labels: task, outcome (completed/skipped/deferred/fatal)
pub static CYCLE_OUTCOMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "skew_cycle_outcomes_total",
        "Outcomes of periodic cycles",
        &["task", "outcome"]
    )
    .unwrap()
});

/// Exchange responses to order-related requests.
/// Labels: kind (order/cancel/edit/combo/simulate/positions), result (ok/error)
pub static ORDER_RESPONSES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "skew_order_responses_total",
        "Responses to private requests",
        &["kind", "result"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Set session state. Only the active state is 1.
    pub fn session_state(state: &str) {
        for s in SESSION_STATES {
            SESSION_STATE.with_label_values(&[s]).set(0.0);
        }
        SESSION_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn heartbeat_replies(count: u64) {
        HEARTBEAT_REPLIES.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn rows_stored(count: usize) {
        ROWS_STORED_TOTAL.inc_by(count as u64);
    }

    pub fn row_rejected(reason: &str) {
        ROWS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn atm_slope(expiration: &str, slope: f64) {
        ATM_SLOPE.with_label_values(&[expiration]).set(slope);
    }

    pub fn density_skewness(expiration: &str, skewness: f64) {
        DENSITY_SKEWNESS.with_label_values(&[expiration]).set(skewness);
    }

    /// Record the latest iv- and price-based spreads.
    pub fn rr_spread(rr_iv: f64, rr_price: f64) {
        RR_SPREAD.with_label_values(&["iv"]).set(rr_iv);
        RR_SPREAD.with_label_values(&["price"]).set(rr_price);
    }

    pub fn margin_check(direction: &str, passed: bool) {
        let result = if passed { "pass" } else { "fail" };
        MARGIN_CHECK_TOTAL
            .with_label_values(&[direction, result])
            .inc();
    }

    pub fn execution(direction: &str, complete: bool) {
        let result = if complete { "fired" } else { "partial" };
        EXECUTIONS_TOTAL.with_label_values(&[direction, result]).inc();
    }

    pub fn cycle_outcome(task: &str, outcome: &str) {
        CYCLE_OUTCOMES_TOTAL
            .with_label_values(&[task, outcome])
            .inc();
    }

    pub fn order_response(kind: &str, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        ORDER_RESPONSES_TOTAL.with_label_values(&[kind, result]).inc();
    }
}

/// Render the default registry in the text exposition format.
pub fn gather_text() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
}
