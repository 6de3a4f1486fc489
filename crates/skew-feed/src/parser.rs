//! Message parsing for market data pushes.
//!
//! Two push shapes:
//! 1. Single-instrument tickers (`ticker.<INSTRUMENT>.100ms`) for futures,
//!    the perpetual and per-strike options
//! 2. Batched mark-price curve (`markprice.options.<symbol>_usd`), an
//!    array of `{instrument_name, timestamp, mark_price, iv}`
//!
//! Malformed option names are counted and dropped, never fatal.

use crate::error::{FeedError, FeedResult};
use serde::Deserialize;
use skew_core::{Channels, Expiration, OptionInstrument};
use tracing::debug;

/// Raw ticker payload. Only the fields we consume.
#[derive(Debug, Deserialize)]
pub struct RawTicker {
    pub timestamp: i64,
    pub instrument_name: String,
    #[serde(default)]
    pub mark_price: Option<f64>,
    #[serde(default)]
    pub best_bid_price: Option<f64>,
    #[serde(default)]
    pub best_ask_price: Option<f64>,
    #[serde(default)]
    pub bid_iv: Option<f64>,
    #[serde(default)]
    pub ask_iv: Option<f64>,
    #[serde(default)]
    pub greeks: Option<RawGreeks>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawGreeks {
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub vega: Option<f64>,
    #[serde(default)]
    pub theta: Option<f64>,
}

/// One element of a mark-price curve push.
#[derive(Debug, Deserialize)]
pub struct RawMarkPoint {
    pub instrument_name: String,
    pub timestamp: i64,
    #[serde(default)]
    pub mark_price: Option<f64>,
    #[serde(default)]
    pub iv: Option<f64>,
}

/// Decoded per-strike option ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionTicker {
    pub instrument: OptionInstrument,
    pub timestamp_ms: i64,
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
    pub bid_iv: Option<f64>,
    pub ask_iv: Option<f64>,
    pub delta: Option<f64>,
    pub vega: Option<f64>,
    pub theta: Option<f64>,
}

/// Decoded mark-price curve element.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkPoint {
    pub instrument: OptionInstrument,
    pub timestamp_ms: i64,
    pub mark_price: Option<f64>,
    pub iv: Option<f64>,
}

/// Parsed market data event.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Dated future ticker (underlying of its expiration).
    FuturePrice {
        expiration: Expiration,
        price: f64,
        timestamp_ms: i64,
    },
    /// Perpetual ticker (underlying of proxy expirations).
    PerpetualPrice { price: f64, timestamp_ms: i64 },
    /// Per-strike option ticker.
    OptionTicker(OptionTicker),
    /// Mark-price curve snapshot.
    MarkCurve {
        points: Vec<MarkPoint>,
        /// Elements whose instrument name did not decode.
        malformed: usize,
    },
}

/// Push parser for one currency.
#[derive(Debug, Clone)]
pub struct MessageParser {
    channels: Channels,
    curve_channel: String,
    perpetual: String,
}

impl MessageParser {
    pub fn new(channels: Channels) -> Self {
        Self {
            curve_channel: channels.mark_price_curve(),
            perpetual: channels.perpetual_instrument(),
            channels,
        }
    }

    /// Parse a `subscription` push.
    ///
    /// Returns `Ok(None)` for channels this client does not consume and for
    /// option tickers with malformed instrument names.
    pub fn parse_channel_message(&self, channel: &str, data: &serde_json::Value) -> FeedResult<Option<FeedEvent>> {
        if channel == self.curve_channel {
            return self.parse_mark_curve(data).map(Some);
        }
        if channel.starts_with("ticker.") {
            return self.parse_ticker(data);
        }

        debug!(channel, "Ignoring unhandled channel");
        Ok(None)
    }

    fn parse_ticker(&self, data: &serde_json::Value) -> FeedResult<Option<FeedEvent>> {
        let raw: RawTicker = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::ParseError(format!("ticker: {e}")))?;

        if raw.instrument_name == self.perpetual {
            let price = require_price(&raw)?;
            return Ok(Some(FeedEvent::PerpetualPrice {
                price,
                timestamp_ms: raw.timestamp,
            }));
        }

        if let Ok(instrument) = OptionInstrument::parse(&raw.instrument_name) {
            let greeks = raw.greeks.unwrap_or_default();
            return Ok(Some(FeedEvent::OptionTicker(OptionTicker {
                instrument,
                timestamp_ms: raw.timestamp,
                bid_price: raw.best_bid_price,
                ask_price: raw.best_ask_price,
                bid_iv: raw.bid_iv,
                ask_iv: raw.ask_iv,
                delta: greeks.delta,
                vega: greeks.vega,
                theta: greeks.theta,
            })));
        }

        if let Some(expiration) = self.future_expiration(&raw.instrument_name) {
            let price = require_price(&raw)?;
            return Ok(Some(FeedEvent::FuturePrice {
                expiration,
                price,
                timestamp_ms: raw.timestamp,
            }));
        }

        debug!(instrument = %raw.instrument_name, "Dropping ticker with malformed instrument name");
        Ok(None)
    }

    fn parse_mark_curve(&self, data: &serde_json::Value) -> FeedResult<FeedEvent> {
        let raw: Vec<RawMarkPoint> = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::ParseError(format!("mark curve: {e}")))?;

        let mut points = Vec::with_capacity(raw.len());
        let mut malformed = 0;
        for element in raw {
            match OptionInstrument::parse(&element.instrument_name) {
                Ok(instrument) => points.push(MarkPoint {
                    instrument,
                    timestamp_ms: element.timestamp,
                    mark_price: element.mark_price,
                    iv: element.iv,
                }),
                Err(_) => malformed += 1,
            }
        }

        if malformed > 0 {
            debug!(malformed, decoded = points.len(), "Mark curve contained malformed names");
        }
        Ok(FeedEvent::MarkCurve { points, malformed })
    }

    /// `BTC-28MAR25` -> expiration `28MAR25`.
    fn future_expiration(&self, instrument_name: &str) -> Option<Expiration> {
        let rest = instrument_name
            .strip_prefix(self.channels.symbol())?
            .strip_prefix('-')?;
        if rest.contains('-') || rest.bytes().any(|b| b.is_ascii_lowercase()) {
            return None;
        }
        Expiration::parse(rest).ok()
    }
}

fn require_price(raw: &RawTicker) -> FeedResult<f64> {
    match raw.mark_price {
        Some(price) if price.is_finite() && price > 0.0 => Ok(price),
        other => Err(FeedError::InvalidData(format!(
            "{}: unusable mark_price {other:?}",
            raw.instrument_name
        ))),
    }
}
