//! Shard-key resolution.
//!
//! Maps a shard-key value to a shard index. Resolution must be pure: the
//! registry caches one descriptor per index and relies on the same key always
//! resolving to the same shard.

use crate::error::{Error, Result};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied resolution function: `(key, args) -> index`.
pub type ShardFn = dyn Fn(&Value, &[Value]) -> Result<i64> + Send + Sync;

/// How a shard-key value is turned into a shard index.
#[derive(Clone)]
pub enum ShardStrategy {
  /// `index = integer(key) mod modulus`
  Modulo { modulus: u32 },

  /// A caller-supplied function. The result is range checked against
  /// `modulus` by the registry before any table is bound.
  Custom {
    modulus: u32,
    func: Arc<ShardFn>,
    args: Vec<Value>,
  },
}

impl ShardStrategy {
  pub fn modulo(modulus: u32) -> Self {
    ShardStrategy::Modulo { modulus }
  }

  pub fn custom<F>(modulus: u32, args: Vec<Value>, func: F) -> Self
  where
    F: Fn(&Value, &[Value]) -> Result<i64> + Send + Sync + 'static,
  {
    ShardStrategy::Custom {
      modulus,
      func: Arc::new(func),
      args,
    }
  }

  /// Builds a built-in strategy from its configured name.
  ///
  /// # Errors
  ///
  /// Returns `Error::Config` for unknown kinds, so that a bad declaration
  /// fails when the entity type is declared rather than on first write.
  pub fn named(kind: &str, modulus: u32) -> Result<Self> {
    match kind.trim() {
      "mod" | "modulo" => Ok(ShardStrategy::Modulo { modulus }),
      other => Err(Error::Config(format!("Unknown sharding strategy: {:?}", other))),
    }
  }

  /// Total number of shards.
  pub fn modulus(&self) -> u32 {
    match self {
      ShardStrategy::Modulo { modulus } | ShardStrategy::Custom { modulus, .. } => *modulus,
    }
  }

  pub(crate) fn validate(&self) -> Result<()> {
    if self.modulus() == 0 {
      return Err(Error::Config("modulus must be greater than zero".into()));
    }
    Ok(())
  }

  /// Resolves a key to its raw shard index.
  ///
  /// The built-in strategy always lands in `0..modulus`; custom functions are
  /// not trusted and are checked at the registry boundary.
  pub fn resolve(&self, key: &Value) -> Result<i64> {
    if key.is_null() {
      return Err(Error::Validation("shard key can't be blank".into()));
    }

    match self {
      ShardStrategy::Modulo { modulus } => {
        if *modulus == 0 {
          return Err(Error::Config("modulus must be greater than zero".into()));
        }
        Ok(integer_key(key)?.rem_euclid(*modulus as i64))
      }
      ShardStrategy::Custom { func, args, .. } => func(key, args),
    }
  }
}

impl fmt::Debug for ShardStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ShardStrategy::Modulo { modulus } => f.debug_struct("Modulo").field("modulus", modulus).finish(),
      ShardStrategy::Custom { modulus, args, .. } => f
        .debug_struct("Custom")
        .field("modulus", modulus)
        .field("args", args)
        .finish_non_exhaustive(),
    }
  }
}

/// Converts a key to the integer the modulo strategy operates on.
pub fn integer_key(key: &Value) -> Result<i64> {
  match key {
    Value::Int(v) => Ok(*v),
    Value::Text(s) => s
      .trim()
      .parse::<i64>()
      .map_err(|_| Error::InvalidShardKey(format!("{:?} is not an integer", s))),
    other => Err(Error::InvalidShardKey(format!(
      "{} values can't be used with the modulo strategy",
      other.kind()
    ))),
  }
}
