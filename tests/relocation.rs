//! Key changes under `KeyChangePolicy::Relocate`

mod common;
use common::TestEnv;
use ironshard::{Error, KeyChangePolicy, ShardOptions, ShardedModel, Value};

fn relocating(env: &TestEnv) -> ShardedModel {
  env.model(
    "Mod4Model",
    ShardOptions::modulo("hash_id", 4).locking("lock_version").relocate_on_key_change(),
  )
}

#[test]
fn test_relocation_moves_row() {
  let env = TestEnv::new();
  let model = relocating(&env);

  let mut record = model.create([("hash_id", Value::Int(1)), ("name", Value::from("mover"))]).unwrap();
  let id = record.id().unwrap();

  record.set("hash_id", 2).unwrap();
  assert_eq!(model.update(&mut record).unwrap(), 1);

  assert!(record.is_frozen());
  assert!(!record.is_dirty());
  assert_eq!(env.counts(&model), vec![0, 0, 1, 0]);

  assert!(model.find(1, id).unwrap().is_none());
  let moved = model.find(2, id).unwrap().unwrap();
  assert_eq!(moved.get("name"), &Value::from("mover"));
  assert_eq!(moved.get("hash_id"), &Value::Int(2));
  assert_eq!(moved.get("lock_version"), &Value::Int(1));

  // The frozen record can't be written again, the reloaded copy can
  assert!(matches!(record.set("name", "again"), Err(Error::Immutable(_))));
  let mut moved = moved;
  moved.set("name", "again").unwrap();
  assert_eq!(model.update(&mut moved).unwrap(), 1);
}

#[test]
fn test_stale_relocation_is_compensated() {
  let env = TestEnv::new();
  let model = relocating(&env);

  let created = model.create([("hash_id", 1)]).unwrap();
  let id = created.id().unwrap();
  let mut first = model.find(1, id).unwrap().unwrap();
  let mut second = model.find(1, id).unwrap().unwrap();

  first.set("name", "first").unwrap();
  model.update(&mut first).unwrap();

  second.set("hash_id", 3).unwrap();
  let err = model.update(&mut second).unwrap_err();
  assert!(matches!(err, Error::StaleObject { operation: "relocate", .. }));

  assert!(!second.is_frozen());
  assert_eq!(env.counts(&model), vec![0, 1, 0, 0]);
}

#[test]
fn test_relocation_into_occupied_id_fails() {
  let env = TestEnv::new();
  let model = relocating(&env);

  let mut record = model.create([("hash_id", 1)]).unwrap();
  // Same generated id in the destination shard
  model.create([("hash_id", 2)]).unwrap();

  record.set("hash_id", 2).unwrap();
  assert!(matches!(model.update(&mut record), Err(Error::DuplicateKey { .. })));
  assert_eq!(env.counts(&model), vec![0, 1, 1, 0]);
}

#[test]
fn test_default_policy_rejects() {
  let options = ShardOptions::modulo("hash_id", 4);
  assert_eq!(options.on_key_change, KeyChangePolicy::Reject);
}
