//! Integration tests for skew-bot.
//!
//! These run the session against an in-process mock exchange:
//! - authentication and the always-on subscription
//! - heartbeat test requests and their replies
//! - push forwarding into the dispatcher
//! - fatal session loss

pub mod common;
