//! Live document subscriptions.
//!
//! - One remote listener per watched document, shared by all its callbacks
//! - Full snapshots, never diffs
//! - Caller-driven cancellation only: per callback, or registry-wide

mod registry;
mod types;

pub use registry::SubscriptionRegistry;
pub use types::{ChangeCallback, ErrorCallback, Subscription};
