//! Size-limited, concurrently committed batch writes.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{DataError, Result};
use crate::remote::{DocumentRef, RemoteStore, WriteBatch, MAX_BATCH_WRITES};

use super::report::{plan_chunks, BatchReport, ChunkOutcome};

/// Splits large write jobs into atomic chunks and commits them together.
///
/// Items are cut into contiguous chunks of at most `chunk_size`, keeping
/// their order. Every item gets a freshly allocated document id and is
/// staged into its chunk's batch by the caller's operation. All chunk
/// batches are then committed concurrently, and the coordinator waits for
/// every commit to settle before reporting.
///
/// A chunk commits all of its writes or none, but chunks are independent:
/// a failed chunk does not roll back the others. [`batch_write`] reports
/// any failure as one [`DataError::BatchAggregate`] that does not say which
/// chunks made it; [`batch_write_tracked`] returns the per-chunk outcomes.
///
/// [`batch_write`]: Self::batch_write
/// [`batch_write_tracked`]: Self::batch_write_tracked
#[derive(Clone)]
pub struct BatchWriteCoordinator {
  store: Arc<dyn RemoteStore>,
  chunk_size: usize,
}

impl BatchWriteCoordinator {
  /// Create a coordinator using the store's full batch size.
  pub fn new(store: Arc<dyn RemoteStore>) -> Self {
    Self {
      store,
      chunk_size: MAX_BATCH_WRITES,
    }
  }

  /// Use smaller chunks. Must be between 1 and [`MAX_BATCH_WRITES`].
  pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self> {
    if chunk_size == 0 || chunk_size > MAX_BATCH_WRITES {
      return Err(DataError::InvalidArgument(format!(
        "chunk size must be between 1 and {}, got {}",
        MAX_BATCH_WRITES, chunk_size
      )));
    }
    self.chunk_size = chunk_size;
    Ok(self)
  }

  pub fn chunk_size(&self) -> usize {
    self.chunk_size
  }

  /// Write `items` into `collection`, failing with one aggregate error if
  /// any chunk commit fails.
  pub async fn batch_write<T, F>(&self, items: &[T], operation: F, collection: &str) -> Result<()>
  where
    F: FnMut(&mut WriteBatch, &T, &DocumentRef),
  {
    self
      .batch_write_tracked(items, operation, collection)
      .await
      .into_result()
  }

  /// Write `items` into `collection` and report each chunk's outcome.
  pub async fn batch_write_tracked<T, F>(
    &self,
    items: &[T],
    mut operation: F,
    collection: &str,
  ) -> BatchReport
  where
    F: FnMut(&mut WriteBatch, &T, &DocumentRef),
  {
    let mut staged = Vec::new();
    for (index, range) in plan_chunks(items.len(), self.chunk_size)
      .into_iter()
      .enumerate()
    {
      let mut batch = self.store.new_write_batch();
      let mut ids = Vec::with_capacity(range.len());
      for item in &items[range.clone()] {
        let target = self.store.new_document_ref(collection);
        operation(&mut batch, item, &target);
        ids.push(target.id);
      }
      staged.push((index, range, ids, batch));
    }

    let commits = staged.into_iter().map(|(index, range, ids, batch)| {
      let store = Arc::clone(&self.store);
      async move {
        let result = store.commit(batch).await;
        ChunkOutcome {
          index,
          items: range,
          ids,
          result,
        }
      }
    });
    let report = BatchReport {
      chunks: join_all(commits).await,
    };

    for chunk in report.chunks.iter().filter(|c| !c.is_committed()) {
      if let Err(error) = &chunk.result {
        warn!(collection, chunk = chunk.index, %error, "batch chunk commit failed");
      }
    }
    info!(
      collection,
      items = items.len(),
      chunks = report.total_chunks(),
      failed = report.failed_chunks(),
      "batch write settled"
    );
    report
  }
}
