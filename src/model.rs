//! Sharded entity types.

use crate::config::{KeyChangePolicy, ShardOptions};
use crate::error::{Error, Result};
use crate::record::{Record, RecordState};
use crate::registry::{ShardDescriptor, ShardLayout, ShardRegistry, ShardSet};
use crate::resolver::ShardStrategy;
use crate::router::WriteRouter;
use crate::util;
use crate::value::Value;
use std::sync::Arc;

/// The validated declaration shared by a model and all of its records.
#[derive(Debug)]
pub(crate) struct ModelSchema {
  pub type_name: String,
  pub shard_key: String,
  pub strategy: ShardStrategy,
  pub layout: ShardLayout,
  pub shards: Arc<ShardSet>,
  pub locking_column: Option<String>,
  pub create_timestamps: Vec<String>,
  pub update_timestamps: Vec<String>,
  pub on_key_change: KeyChangePolicy,
}

impl ModelSchema {
  /// Resolves a key to a checked shard index.
  pub fn index_for(&self, key: &Value) -> Result<u32> {
    let index = self.strategy.resolve(key)?;
    let modulus = self.layout.modulus;
    if index < 0 || index >= modulus as i64 {
      return Err(Error::ShardOutOfRange { index, modulus });
    }
    Ok(index as u32)
  }

  /// Table name for a key, without touching the registry.
  pub fn table_for(&self, key: &Value) -> Result<String> {
    Ok(util::shard_table_name(&self.layout.base_table_name, self.index_for(key)?))
  }

  pub fn descriptor(&self, registry: &ShardRegistry, key: &Value) -> Result<Arc<ShardDescriptor>> {
    let index = self.strategy.resolve(key)?;
    registry.shard_in(&self.shards, index)
  }
}

/// A sharded entity type bound to a registry.
///
/// # Example
///
/// ```
/// use ironshard::{MemoryStore, ShardOptions, ShardRegistry, ShardedModel, Value};
/// use std::sync::Arc;
///
/// # fn main() -> ironshard::Result<()> {
/// let store = MemoryStore::new();
/// for i in 0..4 {
///     store.create_table(&format!("users_{:04}", i), &["tenant_id", "name"])?;
/// }
///
/// let registry = Arc::new(ShardRegistry::new(Arc::new(store)));
/// let users = ShardedModel::new("User", ShardOptions::modulo("tenant_id", 4), registry)?;
///
/// let user = users.create([("tenant_id", Value::from(6)), ("name", Value::from("ada"))])?;
/// assert_eq!(users.shard_of(&user)?.table_name(), "users_0002");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ShardedModel {
  schema: Arc<ModelSchema>,
  registry: Arc<ShardRegistry>,
}

impl ShardedModel {
  /// Declares an entity type.
  ///
  /// # Errors
  ///
  /// Returns `Error::Config` if the options are invalid or the registry already
  /// knows `type_name` with a different layout (base table, modulus or
  /// exporter).
  pub fn new(type_name: impl Into<String>, options: ShardOptions, registry: Arc<ShardRegistry>) -> Result<Self> {
    let type_name = type_name.into();
    let base_table_name = options.validate(&type_name)?;

    let layout = ShardLayout {
      type_name: type_name.clone(),
      base_table_name,
      modulus: options.strategy.modulus(),
      exporter: options.exporter.clone(),
    };
    let shards = registry.declare(&layout)?;

    tracing::debug!(
      target: "ironshard::model",
      "Declared {} sharded by {} over {} tables",
      type_name,
      options.shard_key,
      layout.modulus
    );

    let schema = ModelSchema {
      type_name,
      shard_key: options.shard_key,
      strategy: options.strategy,
      layout,
      shards,
      locking_column: options.locking_column,
      create_timestamps: options.create_timestamps,
      update_timestamps: options.update_timestamps,
      on_key_change: options.on_key_change,
    };

    Ok(Self {
      schema: Arc::new(schema),
      registry,
    })
  }

  pub fn type_name(&self) -> &str {
    &self.schema.type_name
  }

  pub fn shard_key(&self) -> &str {
    &self.schema.shard_key
  }

  pub fn base_table_name(&self) -> &str {
    &self.schema.layout.base_table_name
  }

  pub fn modulus(&self) -> u32 {
    self.schema.layout.modulus
  }

  pub fn locking_enabled(&self) -> bool {
    self.schema.locking_column.is_some()
  }

  pub fn registry(&self) -> &Arc<ShardRegistry> {
    &self.registry
  }

  fn router(&self) -> WriteRouter<'_> {
    WriteRouter::new(&self.schema, &self.registry)
  }

  /// Builds an unsaved record.
  pub fn build<I, K, V>(&self, attributes: I) -> Record
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Value>,
  {
    let mut record = Record::new(self.schema.clone());
    for (column, value) in attributes {
      record.write_attribute(column.as_ref(), value.into());
    }
    record
  }

  /// Builds and inserts a record.
  pub fn create<I, K, V>(&self, attributes: I) -> Result<Record>
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Value>,
  {
    let mut record = self.build(attributes);
    self.insert(&mut record)?;
    Ok(record)
  }

  /// Inserts a new record into the shard of its key and returns the id.
  pub fn insert(&self, record: &mut Record) -> Result<i64> {
    self.router().create(record)
  }

  /// Inserts new records, updates persisted ones. Returns affected rows.
  pub fn save(&self, record: &mut Record) -> Result<u64> {
    if record.is_new() {
      self.insert(record)?;
      Ok(1)
    } else {
      self.update(record)
    }
  }

  /// Writes the changed attributes of a persisted record.
  pub fn update(&self, record: &mut Record) -> Result<u64> {
    self.router().update(record)
  }

  /// Assigns each attribute through the guard, then updates.
  pub fn update_attributes<I, K, V>(&self, record: &mut Record, attributes: I) -> Result<u64>
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Value>,
  {
    for (column, value) in attributes {
      record.set(column.as_ref(), value)?;
    }
    self.update(record)
  }

  /// Stamps the update timestamps (plus `extra` columns) with the current time.
  pub fn touch(&self, record: &mut Record, extra: &[&str]) -> Result<bool> {
    self.router().touch(record, extra)
  }

  pub fn destroy(&self, record: &mut Record) -> Result<bool> {
    self.router().destroy(record)
  }

  /// Loads the record with `id` from the shard of `shard_key`.
  pub fn find(&self, shard_key: impl Into<Value>, id: i64) -> Result<Option<Record>> {
    let descriptor = self.sharding(&shard_key.into())?;
    Ok(descriptor
      .find(id)?
      .map(|row| Record::loaded(self.schema.clone(), id, row)))
  }

  /// Discards unsaved changes and re-reads the stored row.
  pub fn reload(&self, record: &mut Record) -> Result<()> {
    let id = match (record.state(), record.id()) {
      (RecordState::Persisted, Some(id)) => id,
      _ => return Err(Error::NotPersisted),
    };

    let descriptor = self.sharding(record.persisted_shard_key())?;
    let row = descriptor.find(id)?.ok_or_else(|| Error::NotFound {
      table: descriptor.table_name().to_string(),
      id,
    })?;
    record.reset(row);
    Ok(())
  }

  /// The shard descriptor for a key value.
  pub fn sharding(&self, key: &Value) -> Result<Arc<ShardDescriptor>> {
    self.schema.descriptor(&self.registry, key)
  }

  /// The shard descriptor for an index.
  pub fn shard(&self, index: u32) -> Result<Arc<ShardDescriptor>> {
    self.registry.shard_in(&self.schema.shards, index as i64)
  }

  /// The shard a record lives in (or will be inserted into, if new).
  pub fn shard_of(&self, record: &Record) -> Result<Arc<ShardDescriptor>> {
    self.sharding(record.persisted_shard_key())
  }

  /// Descriptors for every shard of this type, binding any not yet bound.
  pub fn shards(&self) -> Result<Vec<Arc<ShardDescriptor>>> {
    (0..self.modulus()).map(|i| self.shard(i)).collect()
  }

  /// Exports one shard through the type's export capability.
  pub fn export_shard(&self, index: u32) -> Result<Vec<u8>> {
    self.shard(index)?.export()
  }

  #[cfg(test)]
  pub(crate) fn loaded<I, K, V>(&self, id: i64, attributes: I) -> Record
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Value>,
  {
    let row = attributes
      .into_iter()
      .map(|(k, v)| (k.as_ref().to_string(), v.into()))
      .collect();
    Record::loaded(self.schema.clone(), id, row)
  }
}
