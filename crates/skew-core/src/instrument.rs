//! Option instrument naming and moneyness helpers.
//!
//! Instrument names follow `<SYMBOL>-<DDMMMYY>-<STRIKE>-<C|P>`,
//! e.g. `BTC-28MAR25-60000-C`.

use crate::error::{CoreError, Result};
use crate::expiration::Expiration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strike price. Exchange strikes for BTC options are whole USD amounts.
pub type Strike = u64;

/// Option type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    /// Instrument-name suffix.
    pub fn suffix(&self) -> char {
        match self {
            Self::Call => 'C',
            Self::Put => 'P',
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "C" => Some(Self::Call),
            "P" => Some(Self::Put),
            _ => None,
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

/// A decoded option instrument name.
///
/// Unique per (expiration, strike, kind) for a given symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionInstrument {
    pub symbol: String,
    pub expiration: Expiration,
    pub strike: Strike,
    pub kind: OptionKind,
}

impl OptionInstrument {
    pub fn new(symbol: impl Into<String>, expiration: Expiration, strike: Strike, kind: OptionKind) -> Self {
        Self {
            symbol: symbol.into(),
            expiration,
            strike,
            kind,
        }
    }

    /// Decode an instrument name.
    ///
    /// Futures (`BTC-28MAR25`), perpetuals and anything else not matching
    /// the option grammar return `InvalidInstrument`.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidInstrument(name.to_string());

        let mut parts = name.split('-');
        let (Some(symbol), Some(date), Some(strike), Some(kind), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(invalid());
        };

        if symbol.is_empty() || strike.is_empty() || !strike.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        // Labels are upper case on the wire; reject anything else rather than normalizing.
        if date.bytes().any(|b| b.is_ascii_lowercase()) {
            return Err(invalid());
        }

        let expiration = Expiration::parse(date).map_err(|_| invalid())?;
        let strike: Strike = strike.parse().map_err(|_| invalid())?;
        let kind = OptionKind::from_suffix(kind).ok_or_else(invalid)?;

        Ok(Self::new(symbol, expiration, strike, kind))
    }

    /// Exchange instrument name.
    pub fn name(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.symbol,
            self.expiration.label(),
            self.strike,
            self.kind.suffix()
        )
    }
}

impl fmt::Display for OptionInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// `ln(strike / underlying)`.
pub fn log_moneyness(strike: Strike, underlying: f64) -> f64 {
    (strike as f64 / underlying).ln()
}

/// Out-of-the-money test.
///
/// Calls need `strike >= underlying`, puts need `strike <= underlying`.
/// At-the-money strikes pass on both sides.
pub fn is_out_of_the_money(kind: OptionKind, strike: Strike, underlying: f64) -> bool {
    let strike = strike as f64;
    match kind {
        OptionKind::Call => strike >= underlying,
        OptionKind::Put => strike <= underlying,
    }
}
