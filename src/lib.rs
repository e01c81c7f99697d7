//! Client-side access layer for remote document stores.
//!
//! [`DataService`] sits between application code and a [`RemoteStore`]
//! and provides:
//! - time-boxed caching of page queries and document reads
//! - live document subscriptions, one remote listener per document
//! - cursor-based pagination
//! - large writes split into atomic, concurrently committed chunks

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod query;
pub mod remote;
pub mod service;
pub mod subscriptions;

pub use config::Config;
pub use error::{DataError, RemoteError, Result};
pub use query::{Page, PageRequest};
pub use remote::{Document, QuerySpec, RemoteStore};
pub use service::DataService;
pub use subscriptions::Subscription;
