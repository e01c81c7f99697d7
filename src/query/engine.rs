//! Cursor-paginated, cache-first collection queries.

use std::sync::Arc;
use tracing::debug;

use crate::cache::{CacheKey, CacheResult, CacheStore};
use crate::error::{DataError, Result};
use crate::remote::{Cursor, Document, QuerySpec, RemoteStore};

use super::page::{Page, PageRequest};

/// Values held by the shared read cache.
#[derive(Debug, Clone)]
pub enum CachedRead {
  Page(Page),
  Document(Document),
}

/// Issues paginated queries against a remote store, caching every page.
///
/// Each distinct `(collection, query, page_size, cursor)` is cached on its
/// own. A fresh entry is returned as-is, items, cursor and `has_more`
/// together, without contacting the store.
#[derive(Clone)]
pub struct PaginatedQueryEngine {
  store: Arc<dyn RemoteStore>,
  cache: Arc<CacheStore<CachedRead>>,
}

impl PaginatedQueryEngine {
  pub fn new(store: Arc<dyn RemoteStore>, cache: Arc<CacheStore<CachedRead>>) -> Self {
    Self { store, cache }
  }

  /// Fetch at most `page_size` items of `collection` after `cursor`.
  pub async fn query(
    &self,
    collection: &str,
    query: &QuerySpec,
    page_size: usize,
    cursor: Option<&Cursor>,
  ) -> Result<CacheResult<Page>> {
    let mut request = PageRequest::new(collection, query.clone(), page_size);
    request.cursor = cursor.cloned();
    self.fetch(request).await
  }

  /// Fetch the page described by `request`.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. Otherwise fetch from the store and cache the page
  pub async fn fetch(&self, request: PageRequest) -> Result<CacheResult<Page>> {
    if request.page_size == 0 {
      return Err(DataError::InvalidArgument(
        "page size must be at least 1".to_string(),
      ));
    }

    let key = request.cache_key();
    let hash = key.cache_hash();
    if let Some(entry) = self.cache.get_entry(&hash) {
      if let CachedRead::Page(page) = entry.value {
        debug!(query = %key.description(), "page cache hit");
        return Ok(CacheResult::from_cache(page, entry.stored_at));
      }
    }
    debug!(query = %key.description(), "page cache miss");

    let fetched = self
      .store
      .fetch_page(
        &request.collection,
        &request.query,
        request.page_size,
        request.cursor.as_ref(),
      )
      .await?;

    let page = Page::new(request, fetched.documents, fetched.cursor);
    self.cache.set(hash, CachedRead::Page(page.clone()));
    Ok(CacheResult::from_network(page))
  }

  /// Fetch the page following `page`, or `None` if it reported no more.
  pub async fn load_more(&self, page: &Page) -> Result<Option<CacheResult<Page>>> {
    match page.continuation() {
      Some(request) => self.fetch(request).await.map(Some),
      None => Ok(None),
    }
  }

  /// Read a single document, cache-first.
  ///
  /// Missing documents are not cached.
  pub async fn get_document(
    &self,
    collection: &str,
    id: &str,
  ) -> Result<CacheResult<Option<Document>>> {
    let key = CacheKey::Document { collection, id };
    let hash = key.cache_hash();
    if let Some(entry) = self.cache.get_entry(&hash) {
      if let CachedRead::Document(doc) = entry.value {
        debug!(document = %key.description(), "document cache hit");
        return Ok(CacheResult::from_cache(Some(doc), entry.stored_at));
      }
    }

    let doc = self.store.get_document(collection, id).await?;
    if let Some(doc) = &doc {
      self.cache.set(hash, CachedRead::Document(doc.clone()));
    }
    Ok(CacheResult::from_network(doc))
  }
}
