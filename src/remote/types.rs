//! Value types exchanged with a remote document store.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// Maximum number of writes a single atomic batch may carry.
pub const MAX_BATCH_WRITES: usize = 500;

/// A single document as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub id: String,
  pub fields: Fields,
}

impl Document {
  pub fn new(id: impl Into<String>, fields: Fields) -> Self {
    Self {
      id: id.into(),
      fields,
    }
  }

  pub fn get(&self, field: &str) -> Option<&Value> {
    self.fields.get(field)
  }

  /// Deserialize the document into `T`.
  ///
  /// The document id is exposed as an `id` field unless the stored data
  /// already carries one.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
    let mut map = self.fields.clone();
    map
      .entry("id")
      .or_insert_with(|| Value::String(self.id.clone()));
    serde_json::from_value(Value::Object(map))
  }
}

/// Address of a document inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef {
  pub collection: String,
  pub id: String,
}

impl DocumentRef {
  pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
    Self {
      collection: collection.into(),
      id: id.into(),
    }
  }

  /// `collection/id`, also used as the subscription key.
  pub fn path(&self) -> String {
    format!("{}/{}", self.collection, self.id)
  }
}

/// Comparison operator of a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOp {
  Equal,
  NotEqual,
  LessThan,
  LessThanOrEqual,
  GreaterThan,
  GreaterThanOrEqual,
  ArrayContains,
  In,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
  pub field: String,
  pub op: FilterOp,
  pub value: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  #[default]
  Ascending,
  Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
  pub field: String,
  pub direction: Direction,
}

/// Filters and ordering applied to a collection query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
  pub filters: Vec<Filter>,
  pub order_by: Vec<OrderBy>,
}

impl QuerySpec {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
    self.where_op(field, FilterOp::Equal, value)
  }

  pub fn where_op(
    mut self,
    field: impl Into<String>,
    op: FilterOp,
    value: impl Into<Value>,
  ) -> Self {
    self.filters.push(Filter {
      field: field.into(),
      op,
      value: value.into(),
    });
    self
  }

  pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
    self.order_by.push(OrderBy {
      field: field.into(),
      direction,
    });
    self
  }
}

/// Opaque continuation token marking the last item of a fetched page.
///
/// Only the store that produced a cursor knows how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
  pub fn new(token: impl Into<String>) -> Self {
    Self(token.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

/// Raw result of a single `fetch_page` call.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
  pub documents: Vec<Document>,
  /// Cursor after the last returned document, `None` for an empty page.
  pub cursor: Option<Cursor>,
}

/// A write staged into a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
  /// Create or replace the whole document.
  Set { target: DocumentRef, fields: Fields },
  /// Merge fields into an existing document.
  Update { target: DocumentRef, fields: Fields },
  Delete { target: DocumentRef },
}

impl WriteOp {
  pub fn target(&self) -> &DocumentRef {
    match self {
      Self::Set { target, .. } | Self::Update { target, .. } | Self::Delete { target } => target,
    }
  }
}

/// Writes that a store commits atomically: all of them or none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
  ops: Vec<WriteOp>,
}

impl WriteBatch {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&mut self, target: &DocumentRef, fields: Fields) -> &mut Self {
    self.ops.push(WriteOp::Set {
      target: target.clone(),
      fields,
    });
    self
  }

  pub fn update(&mut self, target: &DocumentRef, fields: Fields) -> &mut Self {
    self.ops.push(WriteOp::Update {
      target: target.clone(),
      fields,
    });
    self
  }

  pub fn delete(&mut self, target: &DocumentRef) -> &mut Self {
    self.ops.push(WriteOp::Delete {
      target: target.clone(),
    });
    self
  }

  pub fn ops(&self) -> &[WriteOp] {
    &self.ops
  }

  pub fn len(&self) -> usize {
    self.ops.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ops.is_empty()
  }
}
