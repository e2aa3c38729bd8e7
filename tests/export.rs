mod common;
use common::TestEnv;
use ironshard::{BatchExport, Error, Result, Row, ShardOptions, ShardedModel, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Renders one line per row: `collection:id`.
#[derive(Default)]
struct LineExport {
  calls: AtomicUsize,
}

impl BatchExport for LineExport {
  fn export(&self, collection: &str, rows: &[(i64, Row)]) -> Result<Vec<u8>> {
    self.calls.fetch_add(1, Ordering::Relaxed);
    let lines: Vec<String> = rows.iter().map(|(id, _)| format!("{}:{}", collection, id)).collect();
    Ok(lines.join("\n").into_bytes())
  }
}

#[test]
fn test_every_shard_carries_the_capability() {
  let env = TestEnv::new();
  let exporter = Arc::new(LineExport::default());
  let model = env.model("Mod4Model", ShardOptions::modulo("hash_id", 4).exporter(exporter.clone()));

  for key in 0..6 {
    model.create([("hash_id", key)]).unwrap();
  }

  for shard in model.shards().unwrap() {
    assert!(shard.supports_export());
  }
  assert_eq!(model.export_shard(1).unwrap(), b"mod4_models:1\nmod4_models:2");
  assert_eq!(model.export_shard(3).unwrap(), b"mod4_models:1");
  assert_eq!(exporter.calls.load(Ordering::Relaxed), 2);
}

#[test]
fn test_export_without_capability() {
  let env = TestEnv::new();
  let model = env.mod2();

  assert!(model.shards().unwrap().iter().all(|s| !s.supports_export()));
  assert!(matches!(model.export_shard(0), Err(Error::Unsupported(_))));
}

#[test]
fn test_redeclaring_with_other_exporter_fails() {
  let env = TestEnv::new();
  let plain = env.mod4();
  plain.shard(0).unwrap();

  let exporting = ShardedModel::new(
    "Mod4Model",
    ShardOptions::modulo("hash_id", 4).exporter(Arc::new(LineExport::default())),
    env.registry.clone(),
  );
  assert!(matches!(exporting, Err(Error::Config(_))));
  assert!(matches!(plain.export_shard(0), Err(Error::Unsupported(_))));
}

#[test]
fn test_redeclaring_with_same_exporter_shares_shards() {
  let env = TestEnv::new();
  let exporter: Arc<dyn BatchExport> = Arc::new(LineExport::default());
  let options = ShardOptions::modulo("hash_id", 4).exporter(exporter.clone());

  let first = env.model("Mod4Model", options.clone());
  first.create([("hash_id", 2)]).unwrap();
  let second = env.model("Mod4Model", options);

  assert!(Arc::ptr_eq(&first.shard(2).unwrap(), &second.shard(2).unwrap()));
  assert_eq!(second.export_shard(2).unwrap(), b"mod4_models:1");

  let without = ShardedModel::new("Mod4Model", ShardOptions::modulo("hash_id", 4), env.registry.clone());
  assert!(matches!(without, Err(Error::Config(_))));
}

#[cfg(feature = "json")]
#[test]
fn test_json_export() {
  use ironshard::JsonExport;

  let env = TestEnv::new();
  let model = env.model("Mod2Model", ShardOptions::modulo("hash_id", 2).exporter(Arc::new(JsonExport)));
  model.create([("hash_id", Value::Int(4)), ("name", Value::from("even"))]).unwrap();
  model.create([("hash_id", Value::Int(5)), ("name", Value::from("odd"))]).unwrap();

  let bytes = model.export_shard(0).unwrap();
  let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
  let rows = parsed["mod2_models"].as_array().unwrap();

  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0]["id"], 1);
  assert_eq!(rows[0]["hash_id"], 4);
  assert_eq!(rows[0]["name"], "even");
  assert!(rows[0]["lock_version"].is_null());
}
