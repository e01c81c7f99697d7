//! Cache keys for remote reads.

use sha2::{Digest, Sha256};

use crate::remote::{Cursor, QuerySpec};

/// Identity of a cacheable remote read.
#[derive(Clone, Debug)]
pub enum CacheKey<'a> {
  /// One page of a collection query
  Page {
    collection: &'a str,
    query: &'a QuerySpec,
    page_size: usize,
    cursor: Option<&'a Cursor>,
  },
  /// A single document
  Document { collection: &'a str, id: &'a str },
}

impl CacheKey<'_> {
  /// Stable, fixed-length hash of everything that identifies the read.
  pub fn cache_hash(&self) -> String {
    // Serialized as a tuple so no component can bleed into its neighbour.
    let input = match self {
      Self::Page {
        collection,
        query,
        page_size,
        cursor,
      } => serde_json::to_string(&(
        "page",
        collection,
        query,
        page_size,
        cursor.map(Cursor::as_str),
      )),
      Self::Document { collection, id } => serde_json::to_string(&("doc", collection, id)),
    }
    .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable form for logs.
  pub fn description(&self) -> String {
    match self {
      Self::Page {
        collection,
        page_size,
        cursor,
        ..
      } => {
        if cursor.is_some() {
          format!("{} page of {} (continued)", collection, page_size)
        } else {
          format!("{} first page of {}", collection, page_size)
        }
      }
      Self::Document { collection, id } => format!("document {}/{}", collection, id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::Direction;

  fn page_hash(query: &QuerySpec, page_size: usize, cursor: Option<&Cursor>) -> String {
    CacheKey::Page {
      collection: "tasks",
      query,
      page_size,
      cursor,
    }
    .cache_hash()
  }

  #[test]
  fn test_identical_reads_share_a_key() {
    let a = QuerySpec::new().where_eq("status", "open");
    let b = QuerySpec::new().where_eq("status", "open");
    assert_eq!(page_hash(&a, 20, None), page_hash(&b, 20, None));
    assert_eq!(page_hash(&a, 20, None).len(), 64);
  }

  #[test]
  fn test_every_component_changes_the_key() {
    let base = QuerySpec::new().where_eq("status", "open");
    let ordered = base.clone().order_by("due", Direction::Ascending);
    let cursor = Cursor::new("c1");

    let reference = page_hash(&base, 20, None);
    assert_ne!(reference, page_hash(&ordered, 20, None));
    assert_ne!(reference, page_hash(&base, 10, None));
    assert_ne!(reference, page_hash(&base, 20, Some(&cursor)));

    let other_collection = CacheKey::Page {
      collection: "units",
      query: &base,
      page_size: 20,
      cursor: None,
    };
    assert_ne!(reference, other_collection.cache_hash());
  }

  #[test]
  fn test_separators_inside_components_do_not_collide() {
    let query = QuerySpec::new();
    let query_json = serde_json::to_string(&query).unwrap();
    let long_collection = format!("x:{}:20", query_json);
    let tail_cursor = Cursor::new(format!("{}:20:", query_json));

    let a = CacheKey::Page {
      collection: &long_collection,
      query: &query,
      page_size: 20,
      cursor: None,
    };
    let b = CacheKey::Page {
      collection: "x",
      query: &query,
      page_size: 20,
      cursor: Some(&tail_cursor),
    };
    assert_ne!(a.cache_hash(), b.cache_hash());

    let nested = CacheKey::Document {
      collection: "a/b",
      id: "c",
    };
    let flat = CacheKey::Document {
      collection: "a",
      id: "b/c",
    };
    assert_ne!(nested.cache_hash(), flat.cache_hash());
  }

  #[test]
  fn test_document_and_page_keys_differ() {
    let doc = CacheKey::Document {
      collection: "tasks",
      id: "t1",
    };
    assert_ne!(doc.cache_hash(), page_hash(&QuerySpec::new(), 20, None));
    assert_eq!(doc.description(), "document tasks/t1");
  }
}
