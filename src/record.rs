use crate::error::Result;
use crate::guard::AttributeGuard;
use crate::model::ModelSchema;
use crate::value::{Row, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

static NULL: Value = Value::Null;

/// Lifecycle of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
  /// Built in memory, never written.
  New,
  /// Stored in exactly one shard table.
  Persisted,
  /// Removed from its shard table.
  Destroyed,
}

/// An in-memory entity of a sharded model.
///
/// Attributes are only assigned through [`Record::set`], which runs the
/// attribute guard first. The record tracks the original value of every
/// attribute changed since it was loaded or last written.
#[derive(Clone)]
pub struct Record {
  schema: Arc<ModelSchema>,
  id: Option<i64>,
  attributes: Row,
  // column -> value before the first unsaved change
  changes: BTreeMap<String, Value>,
  state: RecordState,
  frozen: bool,
}

impl Record {
  pub(crate) fn new(schema: Arc<ModelSchema>) -> Self {
    Self {
      schema,
      id: None,
      attributes: Row::new(),
      changes: BTreeMap::new(),
      state: RecordState::New,
      frozen: false,
    }
  }

  pub(crate) fn loaded(schema: Arc<ModelSchema>, id: i64, attributes: Row) -> Self {
    Self {
      schema,
      id: Some(id),
      attributes,
      changes: BTreeMap::new(),
      state: RecordState::Persisted,
      frozen: false,
    }
  }

  pub fn type_name(&self) -> &str {
    &self.schema.type_name
  }

  pub fn id(&self) -> Option<i64> {
    self.id
  }

  pub fn state(&self) -> RecordState {
    self.state
  }

  pub fn is_new(&self) -> bool {
    self.state == RecordState::New
  }

  pub fn is_persisted(&self) -> bool {
    self.state == RecordState::Persisted
  }

  pub fn is_destroyed(&self) -> bool {
    self.state == RecordState::Destroyed
  }

  pub fn is_frozen(&self) -> bool {
    self.frozen
  }

  /// Prevents any further assignment or write through this record.
  pub fn freeze(&mut self) {
    self.frozen = true;
  }

  pub fn attributes(&self) -> &Row {
    &self.attributes
  }

  /// Current value of a column; missing columns read as `Null`.
  pub fn get(&self, column: &str) -> &Value {
    self.attributes.get(column).unwrap_or(&NULL)
  }

  pub fn shard_key(&self) -> &Value {
    self.get(&self.schema.shard_key)
  }

  /// The shard key the stored row was written with. Differs from
  /// [`Record::shard_key`] only while a key change is pending.
  pub fn persisted_shard_key(&self) -> &Value {
    self
      .changes
      .get(&self.schema.shard_key)
      .unwrap_or_else(|| self.shard_key())
  }

  /// Assigns an attribute.
  ///
  /// # Errors
  ///
  /// * `Error::Immutable` if the record is frozen or destroyed
  /// * `Error::ShardingViolation` when assigning a different shard key to a
  ///   persisted record of a type that rejects key changes
  pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
    let value = value.into();
    AttributeGuard::before_assign(self, column, &value)?;
    self.write_attribute(column, value);
    Ok(())
  }

  /// Whether any attribute changed since the last load or write.
  pub fn is_dirty(&self) -> bool {
    !self.changes.is_empty()
  }

  pub fn is_changed(&self, column: &str) -> bool {
    self.changes.contains_key(column)
  }

  /// Names of the changed attributes, in column order.
  pub fn changed_attributes(&self) -> Vec<&str> {
    self.changes.keys().map(String::as_str).collect()
  }

  /// `(was, is)` for a changed attribute.
  pub fn change(&self, column: &str) -> Option<(&Value, &Value)> {
    self.changes.get(column).map(|was| (was, self.get(column)))
  }

  pub(crate) fn schema(&self) -> &Arc<ModelSchema> {
    &self.schema
  }

  /// Raw assignment, bypassing the guard. Used for values the write path
  /// maintains itself (timestamps, lock versions).
  pub(crate) fn write_attribute(&mut self, column: &str, value: Value) {
    let current = self.get(column).clone();
    if current == value {
      return;
    }

    match self.changes.get(column) {
      Some(original) if *original == value => {
        self.changes.remove(column);
      }
      Some(_) => {}
      None => {
        self.changes.insert(column.to_string(), current);
      }
    }
    self.attributes.insert(column.to_string(), value);
  }

  /// Current values of the changed attributes.
  pub(crate) fn changed_row(&self) -> Row {
    self
      .changes
      .keys()
      .map(|column| (column.clone(), self.get(column).clone()))
      .collect()
  }

  pub(crate) fn clear_changes(&mut self) {
    self.changes.clear();
  }

  pub(crate) fn clear_changes_for<'a>(&mut self, columns: impl IntoIterator<Item = &'a String>) {
    for column in columns {
      self.changes.remove(column);
    }
  }

  pub(crate) fn mark_persisted(&mut self, id: i64) {
    self.id = Some(id);
    self.state = RecordState::Persisted;
    self.changes.clear();
  }

  pub(crate) fn mark_destroyed(&mut self) {
    self.state = RecordState::Destroyed;
    self.frozen = true;
  }

  /// Replaces all attributes with freshly loaded ones.
  pub(crate) fn reset(&mut self, attributes: Row) {
    self.attributes = attributes;
    self.changes.clear();
  }
}

impl fmt::Debug for Record {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Record")
      .field("type", &self.schema.type_name)
      .field("id", &self.id)
      .field("state", &self.state)
      .field("frozen", &self.frozen)
      .field("attributes", &self.attributes)
      .field("changed", &self.changed_attributes())
      .finish()
  }
}
