//! Signal Relay: conversational trading-signal composer for chat bots.

pub mod bot;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod store;
