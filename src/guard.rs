//! The before-assign hook run by [`Record::set`].

use crate::config::KeyChangePolicy;
use crate::error::{Error, Result};
use crate::model::ModelSchema;
use crate::record::Record;
use crate::value::Value;

/// Rejects assignments that the write path would reject later anyway, so the
/// failure surfaces where the attribute is changed rather than on save.
pub struct AttributeGuard;

impl AttributeGuard {
  pub fn before_assign(record: &Record, column: &str, value: &Value) -> Result<()> {
    if record.is_frozen() || record.is_destroyed() {
      return Err(Error::Immutable(format!(
        "can't modify frozen {} (id {:?})",
        record.type_name(),
        record.id()
      )));
    }

    let schema = record.schema();
    if record.is_persisted() && column == schema.shard_key && schema.on_key_change == KeyChangePolicy::Reject {
      let current = record.persisted_shard_key();
      if current == value {
        return Ok(());
      }
      return Err(sharding_violation(schema, current, value));
    }

    Ok(())
  }
}

/// Builds the violation error naming both shard tables. Falls back to naming
/// only the key when the new value can't be resolved to a shard.
pub(crate) fn sharding_violation(schema: &ModelSchema, from: &Value, to: &Value) -> Error {
  match (schema.table_for(from), schema.table_for(to)) {
    (Ok(from), Ok(to)) => Error::ShardingViolation { from, to },
    _ => Error::ShardKeyLocked(schema.shard_key.clone()),
  }
}
