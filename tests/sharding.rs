mod common;
use common::TestEnv;
use ironshard::{Error, ShardOptions, ShardStrategy, Value, parse_shard_index};

#[test]
fn test_mod2_table_names() {
  let env = TestEnv::new();
  let model = env.mod2();

  assert_eq!(model.base_table_name(), "mod2_models");
  for key in 0..6 {
    let shard = model.sharding(&Value::Int(key)).unwrap();
    assert_eq!(shard.table_name(), format!("mod2_models_{:04}", key % 2));
    assert_eq!(shard.index() as i64, key % 2);
  }
}

#[test]
fn test_mod4_table_names() {
  let env = TestEnv::new();
  let model = env.mod4();

  let names: Vec<String> = model
    .shards()
    .unwrap()
    .iter()
    .map(|s| s.table_name().to_string())
    .collect();
  assert_eq!(
    names,
    vec!["mod4_models_0000", "mod4_models_0001", "mod4_models_0002", "mod4_models_0003"]
  );

  for name in &names {
    assert!(parse_shard_index(name, "mod4_models").is_some());
  }
}

#[test]
fn test_text_keys_resolve_like_integers() {
  let env = TestEnv::new();
  let model = env.mod4();

  let from_text = model.sharding(&Value::from(" 7 ")).unwrap();
  let from_int = model.sharding(&Value::Int(7)).unwrap();
  assert_eq!(from_text.table_name(), "mod4_models_0003");
  assert!(std::sync::Arc::ptr_eq(&from_text, &from_int));

  assert!(matches!(model.sharding(&Value::from("abc")), Err(Error::InvalidShardKey(_))));
  assert!(matches!(model.sharding(&Value::Bool(true)), Err(Error::InvalidShardKey(_))));
}

#[test]
fn test_negative_keys_stay_in_range() {
  let env = TestEnv::new();
  let model = env.mod4();
  assert_eq!(model.sharding(&Value::Int(-1)).unwrap().table_name(), "mod4_models_0003");
}

#[test]
fn test_custom_strategy() {
  let env = TestEnv::new();
  // Routes by the last character of a text key.
  let strategy = ShardStrategy::custom(2, vec![Value::Int(2)], |key, args| {
    let modulus = args[0].as_int().unwrap_or(1);
    let tail = key.as_text().and_then(|s| s.bytes().last()).unwrap_or(0) as i64;
    Ok(tail % modulus)
  });
  let model = env.model("Mod2Model", ShardOptions::new("hash_id", strategy));

  assert_eq!(model.sharding(&Value::from("a")).unwrap().index(), 1);
  assert_eq!(model.sharding(&Value::from("b")).unwrap().index(), 0);
}

#[test]
fn test_named_strategy() {
  assert_eq!(ShardStrategy::named("mod", 4).unwrap().modulus(), 4);
  assert_eq!(ShardStrategy::named("modulo", 2).unwrap().modulus(), 2);
  assert!(matches!(ShardStrategy::named("range", 2), Err(Error::Config(_))));
}

#[test]
fn test_missing_shard_table_fails_binding() {
  let env = TestEnv::new();
  let model = env.model("Mod8Model", ShardOptions::modulo("hash_id", 8));

  assert!(matches!(model.shard(3), Err(Error::TableNotFound(name)) if name == "mod8_models_0003"));
  assert!(env.registry.cached("Mod8Model", 3).is_none());
}

#[test]
fn test_declaration_errors() {
  let env = TestEnv::new();
  let registry = env.registry.clone();

  let zero = ironshard::ShardedModel::new("Mod4Model", ShardOptions::modulo("hash_id", 0), registry.clone());
  assert!(matches!(zero, Err(Error::Config(_))));

  let no_key = ironshard::ShardedModel::new("Mod4Model", ShardOptions::modulo("", 4), registry);
  assert!(matches!(no_key, Err(Error::Config(_))));
}
