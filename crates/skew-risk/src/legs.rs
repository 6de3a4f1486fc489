//! The four instruments of the spread.

use rust_decimal::Decimal;
use skew_core::{Channels, Expiration, OptionKind, OrderSide, SpreadDirection};
use skew_feed::MarketState;
use skew_ws::SimulatedPositions;

/// What to trade: the expiration pair, direction and per-leg amount.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadTarget {
    pub channels: Channels,
    pub near: Expiration,
    pub far: Expiration,
    pub direction: SpreadDirection,
    pub amount: Decimal,
}

impl SpreadTarget {
    pub fn currency(&self) -> &str {
        self.channels.symbol()
    }

    pub fn resolve_legs(&self, state: &MarketState) -> Option<SpreadLegs> {
        SpreadLegs::resolve(&self.channels, &self.near, &self.far, state)
    }
}

/// Instrument names of the currently selected legs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadLegs {
    pub far_call: String,
    pub far_put: String,
    pub near_call: String,
    pub near_put: String,
}

impl SpreadLegs {
    /// Legs from the strike selection of both expirations.
    ///
    /// `None` until both have been selected.
    pub fn resolve(channels: &Channels, near: &Expiration, far: &Expiration, state: &MarketState) -> Option<Self> {
        let near_legs = state.legs(near.label())?;
        let far_legs = state.legs(far.label())?;
        Some(Self {
            far_call: channels.option_instrument(far, far_legs.call, OptionKind::Call),
            far_put: channels.option_instrument(far, far_legs.put, OptionKind::Put),
            near_call: channels.option_instrument(near, near_legs.call, OptionKind::Call),
            near_put: channels.option_instrument(near, near_legs.put, OptionKind::Put),
        })
    }

    /// Orders in submission order: far call, far put, near call, near put.
    ///
    /// SHORT sells the far call and the near put and buys the other two;
    /// LONG does the opposite.
    pub fn orders(&self, direction: SpreadDirection) -> [(&str, OrderSide); 4] {
        let short = [
            (self.far_call.as_str(), OrderSide::Sell),
            (self.far_put.as_str(), OrderSide::Buy),
            (self.near_call.as_str(), OrderSide::Buy),
            (self.near_put.as_str(), OrderSide::Sell),
        ];
        match direction {
            SpreadDirection::Short => short,
            SpreadDirection::Long => short.map(|(instrument, side)| (instrument, side.opposite())),
        }
    }

    /// Signed position changes for a portfolio simulation.
    pub fn simulated_positions(&self, direction: SpreadDirection, amount: Decimal) -> SimulatedPositions {
        let mut positions = SimulatedPositions::default();
        for (instrument, side) in self.orders(direction) {
            positions.insert(instrument, amount * Decimal::from(side.sign()));
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use skew_core::LegPair;

    fn legs() -> SpreadLegs {
        let near = Expiration::parse("28MAR25").unwrap();
        let far = Expiration::parse("27JUN25").unwrap();
        let state = MarketState::new();
        let channels = Channels::new("BTC");
        assert!(SpreadLegs::resolve(&channels, &near, &far, &state).is_none());

        state.set_legs("28MAR25", LegPair { call: 110_000, put: 90_000 });
        assert!(SpreadLegs::resolve(&channels, &near, &far, &state).is_none());
        state.set_legs("27JUN25", LegPair { call: 115_000, put: 85_000 });
        SpreadLegs::resolve(&channels, &near, &far, &state).unwrap()
    }

    #[test]
    fn test_resolve_names() {
        let legs = legs();
        assert_eq!(legs.far_call, "BTC-27JUN25-115000-C");
        assert_eq!(legs.far_put, "BTC-27JUN25-85000-P");
        assert_eq!(legs.near_call, "BTC-28MAR25-110000-C");
        assert_eq!(legs.near_put, "BTC-28MAR25-90000-P");
    }

    #[test]
    fn test_short_orders() {
        let legs = legs();
        let orders = legs.orders(SpreadDirection::Short);
        assert_eq!(orders[0], ("BTC-27JUN25-115000-C", OrderSide::Sell));
        assert_eq!(orders[1], ("BTC-27JUN25-85000-P", OrderSide::Buy));
        assert_eq!(orders[2], ("BTC-28MAR25-110000-C", OrderSide::Buy));
        assert_eq!(orders[3], ("BTC-28MAR25-90000-P", OrderSide::Sell));
    }

    #[test]
    fn test_simulated_positions_signs() {
        let legs = legs();
        let short = legs.simulated_positions(SpreadDirection::Short, dec!(0.1));
        assert_eq!(short.0["BTC-27JUN25-115000-C"], dec!(-0.1));
        assert_eq!(short.0["BTC-27JUN25-85000-P"], dec!(0.1));
        assert_eq!(short.0["BTC-28MAR25-110000-C"], dec!(0.1));
        assert_eq!(short.0["BTC-28MAR25-90000-P"], dec!(-0.1));

        let long = legs.simulated_positions(SpreadDirection::Long, dec!(0.1));
        for (instrument, amount) in &short.0 {
            assert_eq!(long.0[instrument], -*amount);
        }
    }
}
