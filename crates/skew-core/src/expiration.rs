//! Option expiration identifiers.
//!
//! The exchange labels expiries as `DDMMMYY` (e.g. `28MAR25`, `5JUL24`).
//! Options settle at 08:00 UTC on the expiry date.

use crate::error::{CoreError, Result};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hour (UTC) at which options settle on their expiry date.
pub const SETTLEMENT_HOUR_UTC: u32 = 8;

/// A selected expiration.
///
/// Immutable once parsed. Ordering is by expiry timestamp, so sorting a
/// list of expirations yields near-to-far order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expiration {
    label: String,
    date: NaiveDate,
    expiry_ts: i64,
}

impl Expiration {
    /// Parse an exchange expiry label.
    ///
    /// Accepts one or two day digits, a three letter month and a two digit
    /// year. The label is normalized to upper case without zero padding,
    /// matching the exchange's instrument names.
    pub fn parse(label: &str) -> Result<Self> {
        let label = label.trim().to_ascii_uppercase();
        let day_len = label.chars().take_while(|c| c.is_ascii_digit()).count();
        if !(1..=2).contains(&day_len) || label.len() != day_len + 5 {
            return Err(CoreError::InvalidExpiration(label));
        }

        let padded = if day_len == 1 {
            format!("0{label}")
        } else {
            label.clone()
        };
        let date = NaiveDate::parse_from_str(&padded, "%d%b%y")
            .map_err(|e| CoreError::InvalidExpiration(format!("{label}: {e}")))?;

        let settlement = NaiveTime::from_hms_opt(SETTLEMENT_HOUR_UTC, 0, 0)
            .ok_or_else(|| CoreError::InvalidExpiration(label.clone()))?;
        let expiry_ts = Utc.from_utc_datetime(&date.and_time(settlement)).timestamp();

        // Canonical label drops a leading zero ("05JUL24" -> "5JUL24").
        let label = label.trim_start_matches('0').to_string();

        Ok(Self {
            label,
            date,
            expiry_ts,
        })
    }

    /// Exchange label, e.g. `28MAR25`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Settlement timestamp in seconds since the epoch.
    pub fn expiry_ts(&self) -> i64 {
        self.expiry_ts
    }

    /// Remaining time to expiry in years, measured from `now_ms`.
    ///
    /// Negative once the option has settled.
    pub fn years_to_expiry(&self, now_ms: i64, days_per_year: f64) -> f64 {
        let remaining_secs = self.expiry_ts as f64 - now_ms as f64 / 1000.0;
        remaining_secs / (days_per_year * 86_400.0)
    }
}

impl PartialOrd for Expiration {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expiration {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.expiry_ts
            .cmp(&other.expiry_ts)
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl fmt::Display for Expiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}
