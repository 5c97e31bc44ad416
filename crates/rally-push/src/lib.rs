//! # Rally Push
//!
//! Fan-out notification delivery: resolve recipients and device tokens,
//! persist one notification record per recipient, multicast through the
//! messaging gateway, and report per-token results.

pub mod dispatch;
pub mod events;
pub mod gateway;
pub mod resolve;

pub use dispatch::{DispatchReport, Dispatcher};
pub use events::{NotifyOutcome, SkipReason};
pub use gateway::{HttpPushGateway, MulticastOutcome, PushGateway, PushMessage, TokenResult};
