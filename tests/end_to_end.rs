mod common;
use common::TestEnv;
use ironshard::{Error, Value};

#[test]
fn test_mod4_lifecycle() {
  let env = TestEnv::new();
  let model = env.mod4();

  model.create([("hash_id", 0)]).unwrap();
  let mut second = model.create([("hash_id", 1)]).unwrap();
  assert_eq!(env.counts(&model), vec![1, 1, 0, 0]);

  // Non-key updates stay in place
  second.set("name", "renamed").unwrap();
  assert_eq!(model.update(&mut second).unwrap(), 1);
  assert_eq!(model.shard_of(&second).unwrap().table_name(), "mod4_models_0001");
  assert_eq!(env.counts(&model), vec![1, 1, 0, 0]);

  // Key changes are refused
  let err = second.set("hash_id", 2).unwrap_err();
  assert!(matches!(err, Error::ShardingViolation { ref from, ref to }
    if from == "mod4_models_0001" && to == "mod4_models_0002"));
  assert_eq!(model.shard(1).unwrap().count().unwrap(), 1);
  assert_eq!(model.shard(2).unwrap().count().unwrap(), 0);

  let stored = model.find(1, second.id().unwrap()).unwrap().unwrap();
  assert_eq!(stored.get("name"), &Value::from("renamed"));
  assert_eq!(stored.get("hash_id"), &Value::Int(1));
}

#[test]
fn test_registry_shared_between_types() {
  let env = TestEnv::new();
  let mod2 = env.mod2();
  let mod4 = env.mod4();

  for key in 0..8 {
    mod2.create([("hash_id", key)]).unwrap();
    mod4.create([("hash_id", key)]).unwrap();
  }

  assert_eq!(env.counts(&mod2), vec![4, 4]);
  assert_eq!(env.counts(&mod4), vec![2, 2, 2, 2]);
  assert_eq!(env.registry.len(), 6);
  assert_eq!(env.registry.shards_for("Mod2Model").len(), 2);
  assert_eq!(env.store.bind_count(), 6);
}
