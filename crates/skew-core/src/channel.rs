//! Subscription channel names.

use crate::expiration::Expiration;
use crate::instrument::{OptionKind, Strike};

/// Channel name builder for one currency (e.g. `BTC`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channels {
    symbol: String,
}

impl Channels {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().to_ascii_uppercase(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Future ticker for an expiration, e.g. `ticker.BTC-28MAR25.100ms`.
    pub fn future_ticker(&self, expiration: &Expiration) -> String {
        format!("ticker.{}-{}.100ms", self.symbol, expiration.label())
    }

    /// `ticker.BTC-PERPETUAL.100ms`
    pub fn perpetual_ticker(&self) -> String {
        format!("ticker.{}-PERPETUAL.100ms", self.symbol)
    }

    /// Batched mark-price curve, e.g. `markprice.options.btc_usd`.
    pub fn mark_price_curve(&self) -> String {
        format!("markprice.options.{}_usd", self.symbol.to_ascii_lowercase())
    }

    /// Per-strike option ticker, e.g. `ticker.BTC-28MAR25-110000-C.100ms`.
    pub fn option_ticker(&self, expiration: &Expiration, strike: Strike, kind: OptionKind) -> String {
        format!(
            "ticker.{}.100ms",
            self.option_instrument(expiration, strike, kind)
        )
    }

    /// Instrument name for an option.
    pub fn option_instrument(&self, expiration: &Expiration, strike: Strike, kind: OptionKind) -> String {
        format!(
            "{}-{}-{}-{}",
            self.symbol,
            expiration.label(),
            strike,
            kind.suffix()
        )
    }

    /// Instrument name of the future behind `future_ticker`.
    pub fn future_instrument(&self, expiration: &Expiration) -> String {
        format!("{}-{}", self.symbol, expiration.label())
    }

    pub fn perpetual_instrument(&self) -> String {
        format!("{}-PERPETUAL", self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        let ch = Channels::new("btc");
        let exp = Expiration::parse("28MAR25").unwrap();

        assert_eq!(ch.future_ticker(&exp), "ticker.BTC-28MAR25.100ms");
        assert_eq!(ch.perpetual_ticker(), "ticker.BTC-PERPETUAL.100ms");
        assert_eq!(ch.mark_price_curve(), "markprice.options.btc_usd");
        assert_eq!(
            ch.option_ticker(&exp, 110_000, OptionKind::Call),
            "ticker.BTC-28MAR25-110000-C.100ms"
        );
        assert_eq!(
            ch.option_instrument(&exp, 90_000, OptionKind::Put),
            "BTC-28MAR25-90000-P"
        );
        assert_eq!(ch.future_instrument(&exp), "BTC-28MAR25");
        assert_eq!(ch.perpetual_instrument(), "BTC-PERPETUAL");
    }
}
