#![allow(dead_code)]

use ironshard::{MemoryStore, ShardOptions, ShardRegistry, ShardedModel, shard_table_name};
use std::sync::Arc;

pub const COLUMNS: &[&str] = &["hash_id", "lock_version", "name", "created_at", "updated_at"];

pub struct TestEnv {
  pub store: MemoryStore,
  pub registry: Arc<ShardRegistry>,
}

impl TestEnv {
  /// A store with `mod2_models_000{0,1}` and `mod4_models_000{0..3}`.
  pub fn new() -> Self {
    let store = MemoryStore::new();
    create_shards(&store, "mod2_models", 2);
    create_shards(&store, "mod4_models", 4);
    let registry = Arc::new(ShardRegistry::new(Arc::new(store.clone())));
    Self { store, registry }
  }

  pub fn model(&self, type_name: &str, options: ShardOptions) -> ShardedModel {
    ShardedModel::new(type_name, options, self.registry.clone()).unwrap()
  }

  pub fn mod2(&self) -> ShardedModel {
    self.model("Mod2Model", ShardOptions::modulo("hash_id", 2))
  }

  pub fn mod4(&self) -> ShardedModel {
    self.model("Mod4Model", ShardOptions::modulo("hash_id", 4))
  }

  /// Mod4 with optimistic locking on `lock_version`.
  pub fn mod4_locking(&self) -> ShardedModel {
    self.model(
      "Mod4Model",
      ShardOptions::modulo("hash_id", 4).locking("lock_version").with_timestamps(),
    )
  }

  /// Row counts per shard, in index order.
  pub fn counts(&self, model: &ShardedModel) -> Vec<u64> {
    model
      .shards()
      .unwrap()
      .iter()
      .map(|shard| shard.count().unwrap())
      .collect()
  }
}

pub fn create_shards(store: &MemoryStore, base: &str, modulus: u32) {
  for i in 0..modulus {
    store.create_table(&shard_table_name(base, i), COLUMNS).unwrap();
  }
}
