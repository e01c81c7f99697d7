//! The application-facing data service.

use chrono::Duration;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::info;

use crate::batch::{BatchReport, BatchWriteCoordinator};
use crate::cache::{CacheResult, CacheStore, MAX_TTL_SECS};
use crate::config::Config;
use crate::error::{DataError, Result};
use crate::query::{CachedRead, Page, PageRequest, PaginatedQueryEngine};
use crate::remote::{Document, DocumentRef, Fields, QuerySpec, RemoteStore, WriteBatch};
use crate::subscriptions::{Subscription, SubscriptionRegistry};

/// One shared cache, subscription registry and batch coordinator over a
/// remote store.
///
/// Build it once at the composition root and hand out references; every
/// consumer then shares the same cache and subscriptions.
pub struct DataService {
  store: Arc<dyn RemoteStore>,
  cache: Arc<CacheStore<CachedRead>>,
  queries: PaginatedQueryEngine,
  subscriptions: SubscriptionRegistry,
  batches: BatchWriteCoordinator,
  default_page_size: usize,
}

impl DataService {
  pub fn new(store: Arc<dyn RemoteStore>, config: &Config) -> Result<Self> {
    if config.query.default_page_size == 0 {
      return Err(DataError::InvalidArgument(
        "default page size must be at least 1".to_string(),
      ));
    }
    if !(0..=MAX_TTL_SECS).contains(&config.cache.ttl_secs) {
      return Err(DataError::InvalidArgument(format!(
        "cache TTL must be between 0 and {} seconds",
        MAX_TTL_SECS
      )));
    }

    let cache = match config.cache.max_entries {
      Some(max) => {
        let capacity = NonZeroUsize::new(max).ok_or_else(|| {
          DataError::InvalidArgument("cache capacity must be at least 1".to_string())
        })?;
        CacheStore::bounded(capacity)
      }
      None => CacheStore::new(),
    }
    .with_ttl(Duration::seconds(config.cache.ttl_secs));
    let cache = Arc::new(cache);

    let batches =
      BatchWriteCoordinator::new(Arc::clone(&store)).with_chunk_size(config.batch.chunk_size)?;

    info!(
      ttl_secs = config.cache.ttl_secs,
      max_entries = ?config.cache.max_entries,
      chunk_size = config.batch.chunk_size,
      "data service ready"
    );

    Ok(Self {
      queries: PaginatedQueryEngine::new(Arc::clone(&store), Arc::clone(&cache)),
      subscriptions: SubscriptionRegistry::new(Arc::clone(&store)),
      batches,
      cache,
      store,
      default_page_size: config.query.default_page_size,
    })
  }

  pub fn default_page_size(&self) -> usize {
    self.default_page_size
  }

  // --- Queries ---

  /// First page of `collection` matching `query`.
  pub async fn query(&self, collection: &str, query: &QuerySpec, page_size: usize) -> Result<Page> {
    let result = self.queries.query(collection, query, page_size, None).await?;
    Ok(result.data)
  }

  /// Page after `page`, or `None` once a page reported no more items.
  pub async fn load_more(&self, page: &Page) -> Result<Option<Page>> {
    let result = self.queries.load_more(page).await?;
    Ok(result.map(|r| r.data))
  }

  /// Fetch an explicit page request, reporting whether it came from cache.
  pub async fn fetch_page(&self, request: PageRequest) -> Result<CacheResult<Page>> {
    self.queries.fetch(request).await
  }

  // --- Single documents ---

  pub async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
    let result = self.queries.get_document(collection, id).await?;
    Ok(result.data)
  }

  pub async fn add_document(&self, collection: &str, fields: Fields) -> Result<String> {
    Ok(self.store.add_document(collection, fields).await?)
  }

  pub async fn update_document(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
    Ok(self.store.update_document(collection, id, fields).await?)
  }

  pub async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
    Ok(self.store.delete_document(collection, id).await?)
  }

  // --- Subscriptions ---

  pub fn subscribe<F>(&self, collection: &str, id: &str, on_change: F) -> Subscription
  where
    F: Fn(Document) + Send + Sync + 'static,
  {
    self.subscriptions.subscribe(collection, id, on_change)
  }

  pub fn subscribe_with_errors<F, E>(
    &self,
    collection: &str,
    id: &str,
    on_change: F,
    on_error: E,
  ) -> Subscription
  where
    F: Fn(Document) + Send + Sync + 'static,
    E: Fn(&DataError) + Send + Sync + 'static,
  {
    self
      .subscriptions
      .subscribe_with_errors(collection, id, on_change, on_error)
  }

  pub fn cancel_all_subscriptions(&self) {
    self.subscriptions.cancel_all();
  }

  pub fn subscriptions(&self) -> &SubscriptionRegistry {
    &self.subscriptions
  }

  // --- Batch writes ---

  pub async fn batch_write<T, F>(&self, items: &[T], operation: F, collection: &str) -> Result<()>
  where
    F: FnMut(&mut WriteBatch, &T, &DocumentRef),
  {
    self.batches.batch_write(items, operation, collection).await
  }

  pub async fn batch_write_tracked<T, F>(
    &self,
    items: &[T],
    operation: F,
    collection: &str,
  ) -> BatchReport
  where
    F: FnMut(&mut WriteBatch, &T, &DocumentRef),
  {
    self
      .batches
      .batch_write_tracked(items, operation, collection)
      .await
  }

  // --- Cache ---

  /// Drop every cached page and document.
  pub fn clear_cache(&self) {
    self.cache.clear();
  }

  /// Number of cached reads, expired ones included.
  pub fn cached_entries(&self) -> usize {
    self.cache.len()
  }
}
