//! Example: a mod-4 sharded entity type over the in-memory store
//!
//! This example demonstrates:
//! - Declaring an entity type sharded by `hash_id % 4`
//! - Creating records and inspecting where they landed
//! - Updating a record under optimistic locking
//! - The refused shard-key change and the opt-in relocation mode
//! - Exporting a shard and snapshotting the store

use ironshard::{Error, MemoryStore, ShardOptions, ShardRegistry, ShardedModel, Value};
use std::sync::Arc;

const COLUMNS: &[&str] = &["hash_id", "name", "lock_version", "created_at", "updated_at"];

fn main() -> ironshard::Result<()> {
  println!("=== IronShard Mod-4 Example ===\n");

  // 1. Physical tables, one per shard
  let store = MemoryStore::new();
  for i in 0..4 {
    store.create_table(&ironshard::shard_table_name("mod4_models", i), COLUMNS)?;
    store.create_table(&ironshard::shard_table_name("moving_models", i), COLUMNS)?;
  }
  println!("✓ Created tables: {:?}", store.table_names());

  // 2. Declare the entity type
  let registry = Arc::new(ShardRegistry::new(Arc::new(store.clone())));
  let options = ShardOptions::modulo("hash_id", 4)
    .locking("lock_version")
    .with_timestamps();
  #[cfg(feature = "json")]
  let options = options.exporter(Arc::new(ironshard::JsonExport));
  let model = ShardedModel::new("Mod4Model", options, registry.clone())?;
  println!("✓ Declared {} over {} shards", model.type_name(), model.modulus());

  // 3. Create records
  println!("\n--- Creating Records ---");
  let mut records = Vec::new();
  for key in 0..6 {
    let record = model.create([("hash_id", Value::Int(key)), ("name", Value::from(format!("user_{}", key)))])?;
    println!("  hash_id {} -> {}", key, model.shard_of(&record)?.table_name());
    records.push(record);
  }
  for shard in model.shards()? {
    println!("  {} holds {} rows", shard.table_name(), shard.count()?);
  }

  // 4. Optimistic locking
  println!("\n--- Optimistic Locking ---");
  let id = records[1].id().ok_or(Error::NotPersisted)?;
  let mut stale = model.find(1, id)?.ok_or(Error::NotFound {
    table: "mod4_models_0001".into(),
    id,
  })?;

  records[1].set("name", "renamed")?;
  model.update(&mut records[1])?;
  println!("✓ Updated id {} (lock_version {})", id, records[1].get("lock_version"));

  stale.set("name", "lost update")?;
  match model.update(&mut stale) {
    Err(e) if e.is_stale() => println!("✓ Stale copy refused: {}", e),
    other => println!("! Unexpected result: {:?}", other),
  }

  // 5. Shard keys are immutable
  println!("\n--- Shard Key Changes ---");
  match records[1].set("hash_id", 2) {
    Err(e) => println!("✓ Refused: {}", e),
    Ok(()) => println!("! Key change was accepted"),
  }

  let moving = ShardedModel::new(
    "MovingModel",
    ShardOptions::modulo("hash_id", 4).locking("lock_version").relocate_on_key_change(),
    registry.clone(),
  )?;
  let mut mover = moving.create([("hash_id", Value::Int(1)), ("name", Value::from("mover"))])?;
  mover.set("hash_id", 2)?;
  moving.update(&mut mover)?;
  println!(
    "✓ Relocation mode moved id {:?} to {} (record frozen: {})",
    mover.id(),
    moving.sharding(&Value::Int(2))?.table_name(),
    mover.is_frozen()
  );

  // 6. Export and snapshot
  println!("\n--- Export & Snapshot ---");
  match model.export_shard(1) {
    Ok(bytes) => println!("  shard 1: {}", String::from_utf8_lossy(&bytes)),
    Err(e) => println!("  export unavailable: {}", e),
  }

  let path = std::env::temp_dir().join("ironshard_example.snap");
  store.save_snapshot(&path)?;
  let restored = MemoryStore::load_snapshot(&path)?;
  println!("✓ Snapshot restored {} tables from {}", restored.table_names().len(), path.display());
  std::fs::remove_file(&path)?;

  println!("\n✓ Registry holds {} bound shards", registry.len());
  Ok(())
}
