//! Market data ingest for the options risk-reversal bot.
//!
//! Decodes ticker and mark-price-curve pushes, applies the
//! out-of-the-money filter, keeps the shared underlying-price and
//! strike-universe state, forwards normalized rows to storage and plans
//! the dynamic OTM option subscriptions.

pub mod error;
pub mod ingest;
pub mod market_state;
pub mod parser;
pub mod subscription_plan;

pub use error::{FeedError, FeedResult};
pub use ingest::{Ingest, IngestReport, RejectReason};
pub use market_state::{MarketState, UnderlyingPrice};
pub use parser::{FeedEvent, MarkPoint, MessageParser, OptionTicker};
pub use subscription_plan::{select_otm_strikes, DynamicPlan, SubscriptionPlanner, SubscriptionUpdater};
