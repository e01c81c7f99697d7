//! Paginated collection queries.

mod engine;
mod page;

pub use engine::{CachedRead, PaginatedQueryEngine};
pub use page::{Page, PageRequest};
