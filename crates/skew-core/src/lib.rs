//! Core domain types for the options risk-reversal bot.
//!
//! This crate provides fundamental types used throughout the trading system:
//! - `Expiration`: Exchange expiry label (`28MAR25`) with its settlement timestamp
//! - `OptionInstrument`: Decoded `<SYMBOL>-<DDMMMYY>-<STRIKE>-<C|P>` instrument names
//! - `OptionQuote`, `MarkQuote`, `SkewnessRecord`: Rows exchanged with storage
//! - `SpreadDirection`, `LegPair`, `OrderSide`: Trading enums
//! - `CycleOutcome`: Result of one run of a periodic task

pub mod channel;
pub mod cycle;
pub mod error;
pub mod expiration;
pub mod instrument;
pub mod order;
pub mod quote;

pub use channel::Channels;
pub use cycle::{CycleOutcome, SkipReason};
pub use error::{CoreError, Result};
pub use expiration::Expiration;
pub use instrument::{is_out_of_the_money, log_moneyness, OptionInstrument, OptionKind, Strike};
pub use order::{LegPair, OrderLabel, OrderSide, SpreadDirection};
pub use quote::{MarkQuote, OptionQuote, SkewnessRecord};
