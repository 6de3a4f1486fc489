//! Fixed-grid resampling of quote series.
//!
//! A series is deduplicated to one observation per second (newest wins),
//! then sampled on epoch-aligned multiples of the step. Each grid value is
//! the last observation at or before the grid time.

use skew_core::OptionQuote;
use std::collections::BTreeMap;

/// Bid/ask snapshot of one series.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuoteSample {
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
    pub bid_iv: Option<f64>,
    pub ask_iv: Option<f64>,
}

impl QuoteSample {
    pub fn mid_price(&self) -> Option<f64> {
        mid(self.bid_price, self.ask_price)
    }

    pub fn mid_iv(&self) -> Option<f64> {
        mid(self.bid_iv, self.ask_iv)
    }
}

impl From<&OptionQuote> for QuoteSample {
    fn from(quote: &OptionQuote) -> Self {
        Self {
            bid_price: quote.bid_price,
            ask_price: quote.ask_price,
            bid_iv: quote.bid_iv,
            ask_iv: quote.ask_iv,
        }
    }
}

/// Series keyed by grid timestamp (ms).
pub type ResampledSeries = BTreeMap<i64, QuoteSample>;

/// Resample rows onto a `step_ms` grid.
///
/// `rows` may come in any order; for rows inside the same second the one
/// with the greatest timestamp wins.
pub fn resample<'a>(rows: impl IntoIterator<Item = &'a OptionQuote>, step_ms: i64) -> ResampledSeries {
    let mut per_second: BTreeMap<i64, (i64, QuoteSample)> = BTreeMap::new();
    for row in rows {
        let second = row.timestamp_ms.div_euclid(1000);
        let newer = per_second
            .get(&second)
            .map_or(true, |(ts, _)| row.timestamp_ms > *ts);
        if newer {
            per_second.insert(second, (row.timestamp_ms, QuoteSample::from(row)));
        }
    }

    let mut grid = ResampledSeries::new();
    if step_ms <= 0 {
        return grid;
    }
    let observations: Vec<(i64, QuoteSample)> = per_second
        .into_iter()
        .map(|(second, (_, sample))| (second * 1000, sample))
        .collect();
    let (Some(first), Some(last)) = (observations.first(), observations.last()) else {
        return grid;
    };

    let mut t = first.0.div_euclid(step_ms) * step_ms;
    if t < first.0 {
        t += step_ms;
    }
    let last_ts = last.0;
    let mut cursor = 0;
    while t <= last_ts {
        while cursor + 1 < observations.len() && observations[cursor + 1].0 <= t {
            cursor += 1;
        }
        grid.insert(t, observations[cursor].1);
        t += step_ms;
    }
    grid
}

fn mid(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        _ => None,
    }
}
