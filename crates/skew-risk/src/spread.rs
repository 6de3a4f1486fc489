//! Calendar risk-reversal spread.
//!
//! ```text
//! SHORT: far = bid(far call) - ask(far put),  near = bid(near put)  - ask(near call)
//! LONG:  far = bid(far put)  - ask(far call), near = bid(near call) - ask(near put)
//! RR    = far + near
//! ```
//!
//! Computed once with iv quotes and once with price quotes.

use crate::resample::{QuoteSample, ResampledSeries};
use skew_core::SpreadDirection;

/// The four series at one grid time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinedLegs {
    pub timestamp_ms: i64,
    pub far_call: QuoteSample,
    pub far_put: QuoteSample,
    pub near_call: QuoteSample,
    pub near_put: QuoteSample,
}

impl JoinedLegs {
    /// Mid price and mid iv of each leg.
    pub fn mids(&self) -> LegMids {
        LegMids {
            timestamp_ms: self.timestamp_ms,
            far_call: LegMid::from(&self.far_call),
            far_put: LegMid::from(&self.far_put),
            near_call: LegMid::from(&self.near_call),
            near_put: LegMid::from(&self.near_put),
        }
    }
}

/// Mid of one leg; `None` where a side is unquoted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LegMid {
    pub price: Option<f64>,
    pub iv: Option<f64>,
}

impl From<&QuoteSample> for LegMid {
    fn from(sample: &QuoteSample) -> Self {
        Self {
            price: sample.mid_price(),
            iv: sample.mid_iv(),
        }
    }
}

/// Leg mids at one grid time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegMids {
    pub timestamp_ms: i64,
    pub far_call: LegMid,
    pub far_put: LegMid,
    pub near_call: LegMid,
    pub near_put: LegMid,
}

/// Spread at one grid time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadRow {
    pub timestamp_ms: i64,
    pub rr_iv: f64,
    pub rr_price: f64,
}

/// Inner join of the four series on their common grid times.
pub fn join_legs(
    far_call: &ResampledSeries,
    far_put: &ResampledSeries,
    near_call: &ResampledSeries,
    near_put: &ResampledSeries,
) -> Vec<JoinedLegs> {
    far_call
        .iter()
        .filter_map(|(ts, fc)| {
            Some(JoinedLegs {
                timestamp_ms: *ts,
                far_call: *fc,
                far_put: *far_put.get(ts)?,
                near_call: *near_call.get(ts)?,
                near_put: *near_put.get(ts)?,
            })
        })
        .collect()
}

/// Spread of one joined row, `None` if any needed quote is missing.
pub fn rr_spread(direction: SpreadDirection, legs: &JoinedLegs) -> Option<SpreadRow> {
    let rr_iv = leg_spread(direction, legs, |q| q.bid_iv, |q| q.ask_iv)?;
    let rr_price = leg_spread(direction, legs, |q| q.bid_price, |q| q.ask_price)?;
    if !rr_iv.is_finite() || !rr_price.is_finite() {
        return None;
    }
    Some(SpreadRow {
        timestamp_ms: legs.timestamp_ms,
        rr_iv,
        rr_price,
    })
}

fn leg_spread(
    direction: SpreadDirection,
    legs: &JoinedLegs,
    bid: impl Fn(&QuoteSample) -> Option<f64>,
    ask: impl Fn(&QuoteSample) -> Option<f64>,
) -> Option<f64> {
    let (far, near) = match direction {
        SpreadDirection::Short => (
            bid(&legs.far_call)? - ask(&legs.far_put)?,
            bid(&legs.near_put)? - ask(&legs.near_call)?,
        ),
        SpreadDirection::Long => (
            bid(&legs.far_put)? - ask(&legs.far_call)?,
            bid(&legs.near_call)? - ask(&legs.near_put)?,
        ),
    };
    Some(far + near)
}

/// Spread history in time order; rows with a missing quote are dropped.
pub fn spread_history(direction: SpreadDirection, joined: &[JoinedLegs]) -> Vec<SpreadRow> {
    joined
        .iter()
        .filter_map(|legs| rr_spread(direction, legs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(bid: f64, ask: f64) -> QuoteSample {
        QuoteSample {
            bid_price: Some(bid / 100.0),
            ask_price: Some(ask / 100.0),
            bid_iv: Some(bid),
            ask_iv: Some(ask),
        }
    }

    fn swapped(q: QuoteSample) -> QuoteSample {
        QuoteSample {
            bid_price: q.ask_price,
            ask_price: q.bid_price,
            bid_iv: q.ask_iv,
            ask_iv: q.bid_iv,
        }
    }

    fn legs() -> JoinedLegs {
        JoinedLegs {
            timestamp_ms: 20_000,
            far_call: sample(52.0, 53.0),
            far_put: sample(50.0, 51.0),
            near_call: sample(48.0, 49.5),
            near_put: sample(55.0, 56.0),
        }
    }

    #[test]
    fn test_short_formula() {
        let row = rr_spread(SpreadDirection::Short, &legs()).unwrap();
        // far: 52 - 51 = 1, near: 55 - 49.5 = 5.5
        assert!((row.rr_iv - 6.5).abs() < 1e-12);
        assert!((row.rr_price - 0.065).abs() < 1e-12);
    }

    #[test]
    fn test_long_formula() {
        let row = rr_spread(SpreadDirection::Long, &legs()).unwrap();
        // far: 50 - 53 = -3, near: 48 - 56 = -8
        assert!((row.rr_iv + 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_directions_flip_sign_with_swapped_quotes() {
        let original = legs();
        let mirrored = JoinedLegs {
            timestamp_ms: original.timestamp_ms,
            far_call: swapped(original.far_call),
            far_put: swapped(original.far_put),
            near_call: swapped(original.near_call),
            near_put: swapped(original.near_put),
        };
        let short = rr_spread(SpreadDirection::Short, &original).unwrap();
        let long = rr_spread(SpreadDirection::Long, &mirrored).unwrap();
        assert!((short.rr_iv + long.rr_iv).abs() < 1e-12);
        assert!((short.rr_price + long.rr_price).abs() < 1e-12);
    }

    #[test]
    fn test_leg_mids() {
        let mut legs = legs();
        legs.near_put.ask_iv = None;
        let mids = legs.mids();
        assert_eq!(mids.timestamp_ms, 20_000);
        assert!((mids.far_call.iv.unwrap() - 52.5).abs() < 1e-12);
        assert!((mids.far_call.price.unwrap() - 0.525).abs() < 1e-12);
        assert!((mids.near_call.iv.unwrap() - 48.75).abs() < 1e-12);
        assert_eq!(mids.near_put.iv, None);
        assert!(mids.near_put.price.is_some());
    }

    #[test]
    fn test_inner_join_and_missing_quotes_dropped() {
        let mut fc = ResampledSeries::new();
        let mut fp = ResampledSeries::new();
        let mut nc = ResampledSeries::new();
        let mut np = ResampledSeries::new();
        for ts in [0, 20_000, 40_000] {
            fc.insert(ts, sample(52.0, 53.0));
            fp.insert(ts, sample(50.0, 51.0));
            nc.insert(ts, sample(48.0, 49.5));
        }
        np.insert(20_000, sample(55.0, 56.0));
        np.insert(40_000, QuoteSample { bid_iv: None, ..sample(55.0, 56.0) });

        let joined = join_legs(&fc, &fp, &nc, &np);
        assert_eq!(joined.len(), 2);

        let history = spread_history(SpreadDirection::Short, &joined);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp_ms, 20_000);
    }
}
