//! Notifier - Messenger webhook receiver with a keyword search auto-responder
//!
//! Incoming page deliveries are authenticated with the app secret, split
//! into messaging events, answered from a search service (or a fixed
//! command table), and the replies are posted back through the Send API.

pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod responder;
pub mod search;
pub mod send;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::NotifierConfig;
pub use error::{ConfigError, DispatchError, UpstreamError};
