//! Market data ingest.
//!
//! Turns parsed pushes into shared-state updates and stored rows:
//! - future / perpetual tickers overwrite the underlying price of their
//!   expiration(s)
//! - option tickers become `OptionQuote` rows
//! - mark-curve elements grow the strike universe and become `MarkQuote` rows
//!
//! Every stored option row passed the out-of-the-money filter against the
//! underlying price known at that moment.

use crate::error::FeedResult;
use crate::market_state::MarketState;
use crate::parser::{FeedEvent, MarkPoint, MessageParser, OptionTicker};
use skew_core::{
    is_out_of_the_money, log_moneyness, Channels, Expiration, MarkQuote, OptionInstrument, OptionQuote,
};
use skew_persistence::TickStore;
use skew_ws::ChannelMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Why an option row was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Expiration is not one of the selected ones.
    NotSelected,
    /// No underlying price for the expiration yet.
    NoUnderlying,
    InTheMoney,
    /// No usable price or implied vol.
    MissingQuote,
    /// Instrument name did not decode.
    Malformed,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSelected => "not_selected",
            Self::NoUnderlying => "no_underlying",
            Self::InTheMoney => "in_the_money",
            Self::MissingQuote => "missing_quote",
            Self::Malformed => "malformed",
        }
    }
}

/// What one push produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Rows forwarded to storage.
    pub stored: usize,
    /// Underlying prices updated.
    pub prices_updated: usize,
    pub rejected: Vec<RejectReason>,
}

impl IngestReport {
    fn reject(&mut self, reason: RejectReason) {
        self.rejected.push(reason);
    }
}

/// Market data ingest for the selected expirations.
pub struct Ingest {
    parser: MessageParser,
    state: Arc<MarketState>,
    store: Arc<dyn TickStore>,
    /// Selected expirations by label.
    expirations: HashMap<String, Expiration>,
    /// Labels whose underlying is the perpetual.
    perpetual_proxies: Vec<String>,
}

impl Ingest {
    pub fn new(
        channels: Channels,
        expirations: &[Expiration],
        perpetual_proxies: &[Expiration],
        state: Arc<MarketState>,
        store: Arc<dyn TickStore>,
    ) -> Self {
        Self {
            parser: MessageParser::new(channels),
            state,
            store,
            expirations: expirations
                .iter()
                .map(|e| (e.label().to_string(), e.clone()))
                .collect(),
            perpetual_proxies: perpetual_proxies.iter().map(|e| e.label().to_string()).collect(),
        }
    }

    /// Process one `subscription` push.
    pub fn handle(&self, message: &ChannelMessage) -> FeedResult<IngestReport> {
        let mut report = IngestReport::default();
        let Some(event) = self
            .parser
            .parse_channel_message(&message.channel, &message.data)?
        else {
            return Ok(report);
        };

        match event {
            FeedEvent::FuturePrice {
                expiration,
                price,
                timestamp_ms,
            } => {
                if self.expirations.contains_key(expiration.label()) {
                    self.state.set_underlying(expiration.label(), price, timestamp_ms);
                    report.prices_updated += 1;
                    trace!(expiration = %expiration, price, "Underlying updated");
                }
            }
            FeedEvent::PerpetualPrice { price, timestamp_ms } => {
                for label in &self.perpetual_proxies {
                    self.state.set_underlying(label, price, timestamp_ms);
                    report.prices_updated += 1;
                }
                trace!(price, proxies = self.perpetual_proxies.len(), "Perpetual price updated");
            }
            FeedEvent::OptionTicker(ticker) => self.handle_ticker(ticker, &mut report)?,
            FeedEvent::MarkCurve { points, malformed } => {
                report
                    .rejected
                    .extend(std::iter::repeat(RejectReason::Malformed).take(malformed));
                self.handle_curve(points, &mut report)?;
            }
        }

        Ok(report)
    }

    fn handle_ticker(&self, ticker: OptionTicker, report: &mut IngestReport) -> FeedResult<()> {
        let underlying = match self.otm_underlying(&ticker.instrument) {
            Ok(underlying) => underlying,
            Err(reason) => {
                report.reject(reason);
                return Ok(());
            }
        };

        let has_price = is_present(ticker.bid_price) || is_present(ticker.ask_price);
        let has_iv = is_positive(ticker.bid_iv) || is_positive(ticker.ask_iv);
        if !has_price || !has_iv {
            report.reject(RejectReason::MissingQuote);
            return Ok(());
        }

        let instrument = &ticker.instrument;
        let quote = OptionQuote {
            timestamp_ms: ticker.timestamp_ms,
            instrument: instrument.name(),
            expiration_ts: instrument.expiration.expiry_ts(),
            kind: instrument.kind,
            strike: instrument.strike,
            bid_price: ticker.bid_price,
            ask_price: ticker.ask_price,
            bid_iv: ticker.bid_iv,
            ask_iv: ticker.ask_iv,
            underlying_price: underlying,
            log_moneyness: log_moneyness(instrument.strike, underlying),
            delta: ticker.delta,
            vega: ticker.vega,
            theta: ticker.theta,
        };
        self.store.insert_quote(&quote)?;
        report.stored += 1;
        Ok(())
    }

    fn handle_curve(&self, points: Vec<MarkPoint>, report: &mut IngestReport) -> FeedResult<()> {
        // Grow strike universes from every element of a selected expiration.
        let mut observed: HashMap<&str, Vec<u64>> = HashMap::new();
        for point in &points {
            let label = point.instrument.expiration.label();
            if self.expirations.contains_key(label) {
                observed.entry(label).or_default().push(point.instrument.strike);
            }
        }
        for (label, strikes) in observed {
            self.state.add_strikes(label, strikes);
        }

        for point in points {
            let underlying = match self.otm_underlying(&point.instrument) {
                Ok(underlying) => underlying,
                Err(reason) => {
                    report.reject(reason);
                    continue;
                }
            };
            let (Some(mark_price), Some(mark_iv)) = (
                point.mark_price.filter(|p| is_positive(Some(*p))),
                point.iv.filter(|v| is_positive(Some(*v))),
            ) else {
                report.reject(RejectReason::MissingQuote);
                continue;
            };

            let instrument = &point.instrument;
            let mark = MarkQuote {
                timestamp_ms: point.timestamp_ms,
                instrument: instrument.name(),
                expiration_ts: instrument.expiration.expiry_ts(),
                kind: instrument.kind,
                strike: instrument.strike,
                mark_price,
                mark_iv,
                underlying_price: underlying,
                log_moneyness: log_moneyness(instrument.strike, underlying),
            };
            self.store.insert_mark(&mark)?;
            report.stored += 1;
        }

        if report.stored > 0 {
            debug!(stored = report.stored, rejected = report.rejected.len(), "Mark curve ingested");
        }
        Ok(())
    }

    /// Underlying price for a selected, out-of-the-money instrument.
    fn otm_underlying(&self, instrument: &OptionInstrument) -> Result<f64, RejectReason> {
        let label = instrument.expiration.label();
        if !self.expirations.contains_key(label) {
            return Err(RejectReason::NotSelected);
        }
        let underlying = self
            .state
            .underlying(label)
            .ok_or(RejectReason::NoUnderlying)?;
        if !is_out_of_the_money(instrument.kind, instrument.strike, underlying) {
            return Err(RejectReason::InTheMoney);
        }
        Ok(underlying)
    }

    pub fn state(&self) -> &Arc<MarketState> {
        &self.state
    }
}

fn is_present(value: Option<f64>) -> bool {
    value.map(f64::is_finite).unwrap_or(false)
}

/// The exchange reports an absent implied vol as 0.
fn is_positive(value: Option<f64>) -> bool {
    value.map(|v| v.is_finite() && v > 0.0).unwrap_or(false)
}
