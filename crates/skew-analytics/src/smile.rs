//! Implied volatility smile from mark-curve rows.

use crate::error::{AnalyticsError, AnalyticsResult};
use skew_core::{log_moneyness, MarkQuote, OptionKind, Strike};
use std::collections::BTreeSet;

/// One smile point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmilePoint {
    pub log_moneyness: f64,
    /// Mean mark iv of the bucket.
    pub iv: f64,
}

/// Smile of one expiration at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Smile {
    /// Underlying of the newest row; every point's moneyness uses it.
    pub underlying: f64,
    /// Timestamp of the newest row (ms).
    pub timestamp_ms: i64,
    /// Sorted by log-moneyness, one point per distinct value.
    pub points: Vec<SmilePoint>,
    /// Strikes contributing to the smile, ascending.
    pub strikes: Vec<Strike>,
    pub calls: usize,
    pub puts: usize,
}

impl Smile {
    /// Build from rows ordered newest first.
    ///
    /// Keeps the newest row per (kind, strike) and needs at least
    /// `min_per_side` unique strikes on each side.
    pub fn from_marks(rows: &[MarkQuote], min_per_side: usize) -> AnalyticsResult<Self> {
        let newest = rows
            .first()
            .ok_or_else(|| AnalyticsError::InsufficientData("no mark rows".to_string()))?;
        let underlying = newest.underlying_price;
        if !(underlying.is_finite() && underlying > 0.0) {
            return Err(AnalyticsError::InvalidInput(format!("underlying {underlying}")));
        }

        let mut seen: BTreeSet<(OptionKind, Strike)> = BTreeSet::new();
        let mut raw: Vec<(f64, f64)> = Vec::new();
        let (mut calls, mut puts) = (0, 0);
        for row in rows {
            if !seen.insert((row.kind, row.strike)) {
                continue;
            }
            match row.kind {
                OptionKind::Call => calls += 1,
                OptionKind::Put => puts += 1,
            }
            raw.push((log_moneyness(row.strike, underlying), row.mark_iv));
        }

        if calls < min_per_side || puts < min_per_side {
            return Err(AnalyticsError::InsufficientData(format!(
                "{calls} calls / {puts} puts, need {min_per_side} each"
            )));
        }

        raw.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut points: Vec<SmilePoint> = Vec::with_capacity(raw.len());
        let mut bucket: Vec<f64> = Vec::new();
        let mut current: Option<f64> = None;
        for (m, iv) in raw {
            if current != Some(m) {
                if let Some(prev) = current {
                    points.push(bucket_point(prev, &bucket));
                }
                bucket.clear();
                current = Some(m);
            }
            bucket.push(iv);
        }
        if let Some(prev) = current {
            points.push(bucket_point(prev, &bucket));
        }

        let strikes: BTreeSet<Strike> = seen.iter().map(|(_, strike)| *strike).collect();

        Ok(Self {
            underlying,
            timestamp_ms: newest.timestamp_ms,
            points,
            strikes: strikes.into_iter().collect(),
            calls,
            puts,
        })
    }

    pub fn log_moneyness(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.log_moneyness).collect()
    }

    pub fn ivs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.iv).collect()
    }

    /// Moneyness range covered by the points.
    pub fn range(&self) -> (f64, f64) {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (first.log_moneyness, last.log_moneyness),
            _ => (0.0, 0.0),
        }
    }
}

fn bucket_point(log_moneyness: f64, ivs: &[f64]) -> SmilePoint {
    SmilePoint {
        log_moneyness,
        iv: ivs.iter().sum::<f64>() / ivs.len() as f64,
    }
}
