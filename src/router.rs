//! Write routing.
//!
//! Every write resolves the record's shard through the registry and runs
//! against that shard's table only. Updates enforce shard-key immutability and,
//! when the type has a lock column, optimistic locking.

use crate::config::KeyChangePolicy;
use crate::error::{Error, Result};
use crate::guard::sharding_violation;
use crate::mapping::RowMatch;
use crate::model::ModelSchema;
use crate::record::Record;
use crate::registry::{ShardDescriptor, ShardRegistry};
use crate::util;
use crate::value::{Row, Value};
use std::sync::Arc;

pub(crate) struct WriteRouter<'a> {
  schema: &'a ModelSchema,
  registry: &'a ShardRegistry,
}

impl<'a> WriteRouter<'a> {
  pub fn new(schema: &'a ModelSchema, registry: &'a ShardRegistry) -> Self {
    Self { schema, registry }
  }

  fn shard(&self, key: &Value) -> Result<Arc<ShardDescriptor>> {
    self.schema.descriptor(self.registry, key)
  }

  fn ensure_writable(&self, record: &Record) -> Result<i64> {
    if record.is_frozen() || record.is_destroyed() {
      return Err(Error::Immutable(format!(
        "can't modify frozen {} (id {:?})",
        record.type_name(),
        record.id()
      )));
    }
    match record.id() {
      Some(id) if record.is_persisted() => Ok(id),
      _ => Err(Error::NotPersisted),
    }
  }

  /// Reads the lock column, treating NULL as version 0.
  fn lock_value(&self, record: &Record, column: &str) -> Result<(Value, i64)> {
    let current = record.get(column).clone();
    let version = match &current {
      Value::Null => 0,
      Value::Int(v) => *v,
      other => {
        return Err(Error::Validation(format!(
          "lock column {} holds a {} value",
          column,
          other.kind()
        )));
      }
    };
    Ok((current, version))
  }

  fn stamp(&self, record: &mut Record, columns: &[String], only_if_null: bool) {
    if columns.is_empty() {
      return;
    }
    let now = Value::Timestamp(util::now_micros());
    for column in columns {
      let skip = if only_if_null {
        !record.get(column).is_null()
      } else {
        record.is_changed(column)
      };
      if !skip {
        record.write_attribute(column, now.clone());
      }
    }
  }

  /// Inserts a new record into the shard of its current key.
  pub fn create(&self, record: &mut Record) -> Result<i64> {
    if record.is_frozen() || record.is_destroyed() {
      return Err(Error::Immutable(format!("can't insert frozen {}", record.type_name())));
    }
    if !record.is_new() {
      return Err(Error::Validation(format!(
        "{} {:?} is already persisted",
        record.type_name(),
        record.id()
      )));
    }

    let key = record.shard_key().clone();
    if key.is_null() {
      return Err(Error::Validation(format!("{} can't be blank", self.schema.shard_key)));
    }
    let descriptor = self.shard(&key)?;

    self.stamp(record, &self.schema.create_timestamps, true);
    if let Some(lock) = &self.schema.locking_column {
      if record.get(lock).is_null() {
        record.write_attribute(lock, Value::Int(0));
      }
    }

    let id = descriptor.table().insert(record.id(), record.attributes())?;
    record.mark_persisted(id);

    tracing::debug!(
      target: "ironshard::router",
      "Inserted {} id {} into {}",
      record.type_name(),
      id,
      descriptor.table_name()
    );
    Ok(id)
  }

  /// Writes the changed attributes of a persisted record and returns the
  /// affected-row count.
  pub fn update(&self, record: &mut Record) -> Result<u64> {
    let id = self.ensure_writable(record)?;

    if let Some((was, is)) = record.change(&self.schema.shard_key) {
      let (was, is) = (was.clone(), is.clone());
      match self.schema.on_key_change {
        KeyChangePolicy::Reject => return Err(sharding_violation(self.schema, &was, &is)),
        KeyChangePolicy::Relocate => {
          if self.schema.index_for(&was)? != self.schema.index_for(&is)? {
            return self.relocate(record, id, &was);
          }
        }
      }
    }

    if !record.is_dirty() {
      return Ok(0);
    }

    let descriptor = self.shard(record.shard_key())?;
    self.stamp(record, &self.schema.update_timestamps, false);

    let Some(lock) = self.schema.locking_column.as_deref() else {
      let affected = descriptor.table().update(&RowMatch::id(id), &record.changed_row())?;
      record.clear_changes();
      return Ok(affected);
    };

    let (previous, version) = self.lock_value(record, lock)?;
    record.write_attribute(lock, Value::Int(version + 1));

    let filter = RowMatch::versioned(id, lock, previous.clone());
    let result = descriptor.table().update(&filter, &record.changed_row());

    match result {
      Ok(1) => {
        record.clear_changes();
        Ok(1)
      }
      Ok(affected) => {
        // If something went wrong, revert the version.
        record.write_attribute(lock, previous);
        tracing::warn!(
          target: "ironshard::router",
          "Stale update of {} id {} in {} ({} rows matched version {})",
          record.type_name(),
          id,
          descriptor.table_name(),
          affected,
          version
        );
        Err(Error::StaleObject {
          table: descriptor.table_name().to_string(),
          id,
          operation: "update",
        })
      }
      Err(e) => {
        record.write_attribute(lock, previous);
        Err(e)
      }
    }
  }

  /// Moves a record whose key changed to its new shard.
  ///
  /// The full row is inserted into the destination under the same id before
  /// the source row is deleted. If the delete does not remove exactly one row
  /// the inserted copy is deleted again.
  fn relocate(&self, record: &mut Record, id: i64, was: &Value) -> Result<u64> {
    let from = self.shard(was)?;
    let to = self.shard(record.shard_key())?;

    self.stamp(record, &self.schema.update_timestamps, false);

    let mut row = record.attributes().clone();
    let mut filter = RowMatch::id(id);
    let mut next_version = None;
    if let Some(lock) = self.schema.locking_column.as_deref() {
      let (previous, version) = self.lock_value(record, lock)?;
      row.insert(lock.to_string(), Value::Int(version + 1));
      filter = RowMatch::versioned(id, lock, previous);
      next_version = Some((lock, version + 1));
    }

    to.table().insert(Some(id), &row)?;

    let removed = match from.table().delete(&filter) {
      Ok(removed) => removed,
      Err(e) => {
        self.compensate(&to, id);
        return Err(e);
      }
    };
    if removed != 1 {
      self.compensate(&to, id);
      tracing::warn!(
        target: "ironshard::router",
        "Stale relocation of {} id {}: source row in {} changed or vanished",
        record.type_name(),
        id,
        from.table_name()
      );
      return Err(Error::StaleObject {
        table: from.table_name().to_string(),
        id,
        operation: "relocate",
      });
    }

    if let Some((lock, version)) = next_version {
      record.write_attribute(lock, Value::Int(version));
    }
    record.clear_changes();
    record.freeze();

    tracing::info!(
      target: "ironshard::router",
      "Relocated {} id {} from {} to {}",
      record.type_name(),
      id,
      from.table_name(),
      to.table_name()
    );
    Ok(1)
  }

  fn compensate(&self, to: &ShardDescriptor, id: i64) {
    if let Err(e) = to.table().delete(&RowMatch::id(id)) {
      tracing::error!(
        target: "ironshard::router",
        "Failed to remove relocated copy of id {} from {}: {}. Row exists in both shards.",
        id,
        to.table_name(),
        e
      );
    }
  }

  /// Stamps the update timestamps and `extra` columns with the current time
  /// and bumps the lock version. Matches on the primary key only.
  pub fn touch(&self, record: &mut Record, extra: &[&str]) -> Result<bool> {
    if record.is_new() {
      return Err(Error::NotPersisted);
    }
    let id = self.ensure_writable(record)?;

    let mut columns: Vec<String> = self.schema.update_timestamps.clone();
    for column in extra {
      if !columns.iter().any(|c| c == column) {
        columns.push(column.to_string());
      }
    }
    if columns.is_empty() {
      return Ok(true);
    }

    let descriptor = self.shard(record.persisted_shard_key())?;
    let now = Value::Timestamp(util::now_micros());
    let mut changes = Row::new();
    for column in &columns {
      record.write_attribute(column, now.clone());
      changes.insert(column.clone(), now.clone());
    }

    if let Some(lock) = self.schema.locking_column.as_deref() {
      let (_, version) = self.lock_value(record, lock)?;
      record.write_attribute(lock, Value::Int(version + 1));
      changes.insert(lock.to_string(), Value::Int(version + 1));
    }

    record.clear_changes_for(changes.keys());

    let affected = descriptor.table().update(&RowMatch::id(id), &changes)?;
    Ok(affected == 1)
  }

  /// Deletes a persisted record from its shard.
  pub fn destroy(&self, record: &mut Record) -> Result<bool> {
    if record.is_destroyed() {
      return Ok(false);
    }
    let id = self.ensure_writable(record)?;
    let descriptor = self.shard(record.persisted_shard_key())?;

    let filter = match self.schema.locking_column.as_deref() {
      Some(lock) => {
        let (current, _) = self.lock_value(record, lock)?;
        let expected = record.change(lock).map_or(current, |(was, _)| was.clone());
        RowMatch::versioned(id, lock, expected)
      }
      None => RowMatch::id(id),
    };

    let removed = descriptor.table().delete(&filter)?;
    if filter.version.is_some() && removed != 1 {
      return Err(Error::StaleObject {
        table: descriptor.table_name().to_string(),
        id,
        operation: "destroy",
      });
    }

    record.mark_destroyed();
    Ok(removed == 1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ShardOptions;
  use crate::mapping::MemoryStore;
  use crate::model::ShardedModel;

  fn setup(options: ShardOptions) -> (ShardedModel, MemoryStore) {
    let store = MemoryStore::new();
    for i in 0..options.strategy.modulus() {
      store
        .create_table(&util::shard_table_name("mod4_models", i), &["hash_id", "lock_version", "name"])
        .unwrap();
    }
    let registry = Arc::new(ShardRegistry::new(Arc::new(store.clone())));
    (ShardedModel::new("Mod4Model", options, registry).unwrap(), store)
  }

  #[test]
  fn test_raw_key_change_is_caught_before_writing() {
    let (model, _store) = setup(ShardOptions::modulo("hash_id", 4));
    let mut record = model.create([("hash_id", 1)]).unwrap();

    // Bypass the guard the way an internal loader could.
    record.write_attribute("hash_id", Value::Int(2));

    let err = model.update(&mut record).unwrap_err();
    assert!(matches!(err, Error::ShardingViolation { .. }));
    assert_eq!(model.shard(1).unwrap().count().unwrap(), 1);
    assert_eq!(model.shard(2).unwrap().count().unwrap(), 0);
  }

  #[test]
  fn test_unknown_column_reverts_lock_version() {
    let (model, _store) = setup(ShardOptions::modulo("hash_id", 4).locking("lock_version"));
    let mut record = model.create([("hash_id", 1)]).unwrap();

    record.set("missing", 1).unwrap();
    let err = model.update(&mut record).unwrap_err();

    assert!(matches!(err, Error::UnknownColumn { .. }));
    assert_eq!(record.get("lock_version"), &Value::Int(0));
    assert!(!record.is_changed("lock_version"));
  }

  #[test]
  fn test_relocation_within_same_shard_is_plain_update() {
    let (model, _store) = setup(ShardOptions::modulo("hash_id", 4).relocate_on_key_change());
    let mut record = model.create([("hash_id", 1)]).unwrap();

    record.set("hash_id", 5).unwrap();
    assert_eq!(model.update(&mut record).unwrap(), 1);
    assert!(!record.is_frozen());
    assert_eq!(model.shard(1).unwrap().count().unwrap(), 1);
  }

  #[test]
  fn test_lock_column_with_wrong_type() {
    let (model, _store) = setup(ShardOptions::modulo("hash_id", 4).locking("lock_version"));
    let mut record = model.create([("hash_id", Value::Int(1)), ("lock_version", Value::from("v1"))]).unwrap();
    record.set("name", "x").unwrap();
    assert!(matches!(model.update(&mut record), Err(Error::Validation(_))));
  }
}
