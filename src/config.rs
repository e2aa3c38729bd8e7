use crate::error::{Error, Result};
use crate::export::BatchExport;
use crate::resolver::ShardStrategy;
use crate::util;
use std::fmt;
use std::sync::Arc;

/// What an update does when the shard key of a persisted record changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyChangePolicy {
  /// Fail with `Error::ShardingViolation` before anything is written.
  /// The attribute guard also rejects the assignment itself.
  #[default]
  Reject,

  /// Move the row: insert it into the destination shard, delete it from the
  /// source shard and freeze the in-memory record.
  Relocate,
}

/// Declaration of a sharded entity type.
#[derive(Clone)]
pub struct ShardOptions {
  /// Attribute whose value selects the shard. Required.
  pub shard_key: String,

  pub strategy: ShardStrategy,

  /// Overrides the table name derived from the type name.
  /// Default: None (`Mod4Model` -> `mod4_models`).
  pub base_table_name: Option<String>,

  /// Lock-version column. Enables optimistic locking when set.
  /// Default: None.
  pub locking_column: Option<String>,

  /// Columns stamped with the current time on create when still null.
  pub create_timestamps: Vec<String>,

  /// Columns stamped on update and touch.
  pub update_timestamps: Vec<String>,

  pub on_key_change: KeyChangePolicy,

  /// Batch export capability passed through to every shard handle.
  pub exporter: Option<Arc<dyn BatchExport>>,
}

impl Default for ShardOptions {
  fn default() -> Self {
    Self {
      shard_key: String::new(),
      strategy: ShardStrategy::modulo(1),
      base_table_name: None,
      locking_column: None,
      create_timestamps: Vec::new(),
      update_timestamps: Vec::new(),
      on_key_change: KeyChangePolicy::Reject,
      exporter: None,
    }
  }
}

impl fmt::Debug for ShardOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardOptions")
      .field("shard_key", &self.shard_key)
      .field("strategy", &self.strategy)
      .field("base_table_name", &self.base_table_name)
      .field("locking_column", &self.locking_column)
      .field("create_timestamps", &self.create_timestamps)
      .field("update_timestamps", &self.update_timestamps)
      .field("on_key_change", &self.on_key_change)
      .field("exporter", &self.exporter.is_some())
      .finish()
  }
}

impl ShardOptions {
  pub fn new(shard_key: impl Into<String>, strategy: ShardStrategy) -> Self {
    Self {
      shard_key: shard_key.into(),
      strategy,
      ..Default::default()
    }
  }

  /// Shorthand for the built-in modulo strategy.
  pub fn modulo(shard_key: impl Into<String>, modulus: u32) -> Self {
    Self::new(shard_key, ShardStrategy::modulo(modulus))
  }

  pub fn table_name(mut self, name: impl Into<String>) -> Self {
    self.base_table_name = Some(name.into());
    self
  }

  pub fn locking(mut self, column: impl Into<String>) -> Self {
    self.locking_column = Some(column.into());
    self
  }

  /// Enables the conventional `created_at` / `updated_at` columns.
  pub fn with_timestamps(mut self) -> Self {
    self.create_timestamps = vec!["created_at".into(), "updated_at".into()];
    self.update_timestamps = vec!["updated_at".into()];
    self
  }

  pub fn relocate_on_key_change(mut self) -> Self {
    self.on_key_change = KeyChangePolicy::Relocate;
    self
  }

  pub fn exporter(mut self, exporter: Arc<dyn BatchExport>) -> Self {
    self.exporter = Some(exporter);
    self
  }

  /// Checks the declaration and resolves the base table name.
  pub(crate) fn validate(&self, type_name: &str) -> Result<String> {
    if self.shard_key.trim().is_empty() {
      return Err(Error::Config("shard key attribute cannot be empty".into()));
    }
    self.strategy.validate()?;

    if self.locking_column.as_deref() == Some(self.shard_key.as_str()) {
      return Err(Error::Config("the shard key can't double as the lock column".into()));
    }

    let base = match &self.base_table_name {
      Some(name) => name.clone(),
      None => util::default_table_name(type_name),
    };
    util::validate_table_name(&base)?;
    Ok(base)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_derives_table_name() {
    let opts = ShardOptions::modulo("hash_id", 4);
    assert_eq!(opts.validate("Mod4Model").unwrap(), "mod4_models");

    let opts = ShardOptions::modulo("hash_id", 4).table_name("events");
    assert_eq!(opts.validate("Mod4Model").unwrap(), "events");
  }

  #[test]
  fn test_rejects_bad_declarations() {
    assert!(matches!(ShardOptions::modulo("", 4).validate("T"), Err(Error::Config(_))));
    assert!(matches!(ShardOptions::modulo("k", 0).validate("T"), Err(Error::Config(_))));
    assert!(matches!(
      ShardOptions::modulo("k", 2).table_name("Bad-Name").validate("T"),
      Err(Error::Config(_))
    ));
    assert!(matches!(
      ShardOptions::modulo("k", 2).locking("k").validate("T"),
      Err(Error::Config(_))
    ));
  }

  #[test]
  fn test_timestamps_builder() {
    let opts = ShardOptions::modulo("k", 2).with_timestamps();
    assert_eq!(opts.create_timestamps, vec!["created_at", "updated_at"]);
    assert_eq!(opts.update_timestamps, vec!["updated_at"]);
    assert_eq!(opts.on_key_change, KeyChangePolicy::Reject);
  }
}
