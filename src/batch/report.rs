//! Chunk planning and per-chunk outcomes of a batch write.

use std::ops::Range;

use crate::error::{DataError, RemoteError};

/// Split `len` items into contiguous index ranges of at most `chunk_size`.
pub fn plan_chunks(len: usize, chunk_size: usize) -> Vec<Range<usize>> {
  (0..len)
    .step_by(chunk_size.max(1))
    .map(|start| start..(start + chunk_size.max(1)).min(len))
    .collect()
}

/// Outcome of committing one chunk.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
  /// Position of the chunk within the job.
  pub index: usize,
  /// Indices of the input items staged into this chunk.
  pub items: Range<usize>,
  /// Ids allocated for the items, in item order.
  pub ids: Vec<String>,
  pub result: Result<(), RemoteError>,
}

impl ChunkOutcome {
  pub fn is_committed(&self) -> bool {
    self.result.is_ok()
  }
}

/// Per-chunk results of a batch write.
///
/// Each chunk commits atomically on its own; committed chunks stay
/// committed even when others fail.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
  pub chunks: Vec<ChunkOutcome>,
}

impl BatchReport {
  pub fn total_chunks(&self) -> usize {
    self.chunks.len()
  }

  pub fn failed_chunks(&self) -> usize {
    self.chunks.iter().filter(|c| !c.is_committed()).count()
  }

  pub fn is_success(&self) -> bool {
    self.failed_chunks() == 0
  }

  /// Ids of every document written by a committed chunk.
  pub fn committed_ids(&self) -> impl Iterator<Item = &str> {
    self
      .chunks
      .iter()
      .filter(|c| c.is_committed())
      .flat_map(|c| c.ids.iter().map(String::as_str))
  }

  /// Collapse into the aggregate form: `Ok` or a single error that does
  /// not identify the failed chunks.
  pub fn into_result(self) -> Result<(), DataError> {
    let failed = self.failed_chunks();
    if failed == 0 {
      Ok(())
    } else {
      Err(DataError::BatchAggregate {
        failed,
        total: self.total_chunks(),
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_plan_1200_by_500() {
    let chunks = plan_chunks(1200, 500);
    assert_eq!(chunks, vec![0..500, 500..1000, 1000..1200]);
  }

  #[test]
  fn test_plan_exact_multiple_and_empty() {
    assert_eq!(plan_chunks(1000, 500), vec![0..500, 500..1000]);
    assert!(plan_chunks(0, 500).is_empty());
    assert_eq!(plan_chunks(3, 500), vec![0..3]);
  }

  #[test]
  fn test_plan_covers_every_index_once() {
    let chunks = plan_chunks(1234, 100);
    let flattened: Vec<usize> = chunks.into_iter().flatten().collect();
    assert_eq!(flattened, (0..1234).collect::<Vec<_>>());
  }

  #[test]
  fn test_report_aggregates_failures() {
    let outcome = |index: usize, result| ChunkOutcome {
      index,
      items: index * 2..index * 2 + 2,
      ids: vec![format!("a{}", index), format!("b{}", index)],
      result,
    };
    let report = BatchReport {
      chunks: vec![
        outcome(0, Ok(())),
        outcome(1, Err(RemoteError::Aborted("x".into()))),
        outcome(2, Ok(())),
      ],
    };
    assert_eq!(report.failed_chunks(), 1);
    assert_eq!(report.committed_ids().count(), 4);
    assert!(matches!(
      report.into_result(),
      Err(DataError::BatchAggregate {
        failed: 1,
        total: 3
      })
    ));
  }
}
