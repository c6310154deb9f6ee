//! Chat abstractions: outbound sends, inbound update feed.

pub mod port;
pub mod throttled;
pub mod types;
