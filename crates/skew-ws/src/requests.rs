//! Typed private API requests.
//!
//! Amounts and prices are `Decimal` internally and go over the wire as
//! JSON numbers.

use crate::message::{JsonRpcRequest, RequestKind};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use skew_core::OrderSide;
use std::collections::BTreeMap;

/// `type` of a single-instrument order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// Parameters of `private/buy` / `private/sell`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderParams {
    pub instrument_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
    pub post_only: bool,
    pub reduce_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl OrderParams {
    /// Market order.
    pub fn market(instrument_name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            amount,
            order_type: OrderType::Market,
            price: None,
            post_only: false,
            reduce_only: false,
            label: None,
        }
    }

    /// Limit order when a price is given, market order otherwise.
    pub fn with_optional_price(instrument_name: impl Into<String>, amount: Decimal, price: Option<Decimal>) -> Self {
        let mut params = Self::market(instrument_name, amount);
        if let Some(price) = price {
            params.order_type = OrderType::Limit;
            params.price = Some(price);
        }
        params
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One leg of `private/create_combo_order`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComboLeg {
    pub instrument_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    pub direction: OrderSide,
}

/// Hypothetical position changes for `private/simulate_portfolio`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatedPositions(pub BTreeMap<String, Decimal>);

impl SimulatedPositions {
    pub fn insert(&mut self, instrument: impl Into<String>, amount: Decimal) {
        self.0.insert(instrument.into(), amount);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SimulatedPositions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (instrument, amount) in &self.0 {
            let amount = amount
                .to_f64()
                .ok_or_else(|| serde::ser::Error::custom(format!("amount out of range: {amount}")))?;
            map.serialize_entry(instrument, &amount)?;
        }
        map.end()
    }
}

impl JsonRpcRequest {
    pub fn order(side: OrderSide, params: &OrderParams) -> serde_json::Result<Self> {
        let method = match side {
            OrderSide::Buy => "private/buy",
            OrderSide::Sell => "private/sell",
        };
        Ok(Self::new(RequestKind::Order, method, serde_json::to_value(params)?))
    }

    pub fn cancel(order_id: &str) -> Self {
        Self::new(
            RequestKind::Cancel,
            "private/cancel",
            serde_json::json!({ "order_id": order_id }),
        )
    }

    pub fn edit(order_id: &str, price: Option<Decimal>, amount: Option<Decimal>) -> Self {
        let mut params = serde_json::Map::new();
        params.insert("order_id".to_string(), order_id.into());
        if let Some(price) = price.and_then(|p| p.to_f64()) {
            params.insert("price".to_string(), price.into());
        }
        if let Some(amount) = amount.and_then(|a| a.to_f64()) {
            params.insert("amount".to_string(), amount.into());
        }
        Self::new(RequestKind::Edit, "private/edit", serde_json::Value::Object(params))
    }

    pub fn create_combo(legs: &[ComboLeg]) -> serde_json::Result<Self> {
        Ok(Self::new(
            RequestKind::Combo,
            "private/create_combo_order",
            serde_json::json!({ "combo_order": serde_json::to_value(legs)? }),
        ))
    }

    pub fn simulate_portfolio(currency: &str, positions: &SimulatedPositions) -> serde_json::Result<Self> {
        Ok(Self::new(
            RequestKind::SimulatePortfolio,
            "private/simulate_portfolio",
            serde_json::json!({
                "currency": currency,
                "add_positions": true,
                "simulated_positions": serde_json::to_value(positions)?,
            }),
        ))
    }

    pub fn get_positions(currency: &str, kind: &str) -> Self {
        Self::new(
            RequestKind::Positions,
            "private/get_positions",
            serde_json::json!({ "currency": currency, "kind": kind }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_order_shape() {
        let params = OrderParams::market("BTC-28MAR25-110000-C", dec!(0.1)).with_label("rr_1");
        let req = JsonRpcRequest::order(OrderSide::Sell, &params).unwrap();
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(value["id"], 1001);
        assert_eq!(value["method"], "private/sell");
        assert_eq!(value["params"]["instrument_name"], "BTC-28MAR25-110000-C");
        assert_eq!(value["params"]["amount"], 0.1);
        assert_eq!(value["params"]["type"], "market");
        assert_eq!(value["params"]["post_only"], false);
        assert_eq!(value["params"]["reduce_only"], false);
        assert_eq!(value["params"]["label"], "rr_1");
        assert!(value["params"].get("price").is_none());
    }

    #[test]
    fn test_limit_order_when_priced() {
        let params = OrderParams::with_optional_price("BTC-28MAR25-90000-P", dec!(0.5), Some(dec!(0.0125)));
        let value = serde_json::to_value(JsonRpcRequest::order(OrderSide::Buy, &params).unwrap()).unwrap();
        assert_eq!(value["method"], "private/buy");
        assert_eq!(value["params"]["type"], "limit");
        assert_eq!(value["params"]["price"], 0.0125);
        assert!(value["params"].get("label").is_none());
    }

    #[test]
    fn test_cancel_and_edit() {
        let cancel = serde_json::to_value(JsonRpcRequest::cancel("ETH-123")).unwrap();
        assert_eq!(cancel["id"], 1002);
        assert_eq!(cancel["params"]["order_id"], "ETH-123");

        let edit = serde_json::to_value(JsonRpcRequest::edit("ETH-123", Some(dec!(0.02)), None)).unwrap();
        assert_eq!(edit["id"], 1003);
        assert_eq!(edit["params"]["price"], 0.02);
        assert!(edit["params"].get("amount").is_none());
    }

    #[test]
    fn test_combo() {
        let legs = vec![ComboLeg {
            instrument_name: "BTC-28MAR25-110000-C".to_string(),
            amount: dec!(0.1),
            price: None,
            direction: OrderSide::Sell,
        }];
        let value = serde_json::to_value(JsonRpcRequest::create_combo(&legs).unwrap()).unwrap();
        assert_eq!(value["id"], 1004);
        assert_eq!(value["params"]["combo_order"][0]["direction"], "sell");
        assert!(value["params"]["combo_order"][0]["price"].is_null());
    }

    #[test]
    fn test_simulate_portfolio_and_positions() {
        let mut positions = SimulatedPositions::default();
        positions.insert("BTC-27JUN25-120000-C", dec!(-0.1));
        positions.insert("BTC-27JUN25-85000-P", dec!(0.1));

        let value = serde_json::to_value(JsonRpcRequest::simulate_portfolio("BTC", &positions).unwrap()).unwrap();
        assert_eq!(value["id"], 1005);
        assert_eq!(value["params"]["currency"], "BTC");
        assert_eq!(value["params"]["add_positions"], true);
        assert_eq!(value["params"]["simulated_positions"]["BTC-27JUN25-120000-C"], -0.1);
        assert_eq!(value["params"]["simulated_positions"]["BTC-27JUN25-85000-P"], 0.1);

        let value = serde_json::to_value(JsonRpcRequest::get_positions("BTC", "option")).unwrap();
        assert_eq!(value["id"], 1006);
        assert_eq!(value["params"]["kind"], "option");
    }
}
