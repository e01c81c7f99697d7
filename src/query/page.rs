//! Page and request types of collection queries.

use serde::de::DeserializeOwned;

use crate::cache::CacheKey;
use crate::remote::{Cursor, Document, QuerySpec};

/// Everything needed to fetch one page of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
  pub collection: String,
  pub query: QuerySpec,
  pub page_size: usize,
  /// Start after this position; `None` starts from the beginning.
  pub cursor: Option<Cursor>,
}

impl PageRequest {
  pub fn new(collection: impl Into<String>, query: QuerySpec, page_size: usize) -> Self {
    Self {
      collection: collection.into(),
      query,
      page_size,
      cursor: None,
    }
  }

  pub fn after(mut self, cursor: Cursor) -> Self {
    self.cursor = Some(cursor);
    self
  }

  pub(crate) fn cache_key(&self) -> CacheKey<'_> {
    CacheKey::Page {
      collection: &self.collection,
      query: &self.query,
      page_size: self.page_size,
      cursor: self.cursor.as_ref(),
    }
  }
}

/// One page of query results.
#[derive(Debug, Clone)]
pub struct Page {
  pub items: Vec<Document>,
  /// Position of the last item, `None` when the page is empty.
  pub next_cursor: Option<Cursor>,
  /// True whenever the page came back full.
  ///
  /// This is a heuristic: when the remaining item count is an exact
  /// multiple of the page size, the last full page still reports `true`
  /// and the following page is empty with `has_more == false`.
  pub has_more: bool,
  request: PageRequest,
}

impl Page {
  pub(crate) fn new(
    request: PageRequest,
    items: Vec<Document>,
    next_cursor: Option<Cursor>,
  ) -> Self {
    let has_more = items.len() == request.page_size;
    Self {
      items,
      next_cursor,
      has_more,
      request,
    }
  }

  /// The request that produced this page.
  pub fn request(&self) -> &PageRequest {
    &self.request
  }

  /// Request for the following page, if there may be one.
  pub fn continuation(&self) -> Option<PageRequest> {
    if !self.has_more {
      return None;
    }
    let cursor = self.next_cursor.clone()?;
    Some(self.request.clone().after(cursor))
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// Deserialize every item into `T`.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>, serde_json::Error> {
    self.items.iter().map(Document::decode).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::Fields;

  fn docs(count: usize) -> Vec<Document> {
    (0..count)
      .map(|i| Document::new(format!("d{}", i), Fields::new()))
      .collect()
  }

  #[test]
  fn test_full_page_reports_more() {
    let request = PageRequest::new("tasks", QuerySpec::new(), 3);
    let page = Page::new(request, docs(3), Some(Cursor::new("d2")));
    assert!(page.has_more);
    let next = page.continuation().unwrap();
    assert_eq!(next.cursor, Some(Cursor::new("d2")));
    assert_eq!(next.page_size, 3);
  }

  #[test]
  fn test_short_page_has_no_continuation() {
    let request = PageRequest::new("tasks", QuerySpec::new(), 3);
    let page = Page::new(request, docs(2), Some(Cursor::new("d1")));
    assert!(!page.has_more);
    assert!(page.continuation().is_none());
    assert_eq!(page.next_cursor, Some(Cursor::new("d1")));
  }

  #[test]
  fn test_empty_page() {
    let request = PageRequest::new("tasks", QuerySpec::new(), 3);
    let page = Page::new(request, Vec::new(), None);
    assert!(page.is_empty());
    assert!(!page.has_more);
  }
}
