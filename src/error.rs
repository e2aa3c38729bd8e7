use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
  #[error("Sharding Violation: please move from {from} to {to} manually")]
  ShardingViolation { from: String, to: String },

  #[error("Sharding Violation: the sharding key {0} can't be changed")]
  ShardKeyLocked(String),

  #[error("Stale Object: attempted to {operation} a stale row (id {id}) in {table}")]
  StaleObject { table: String, id: i64, operation: &'static str },

  #[error("Validation Failed: {0}")]
  Validation(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Immutable Record: {0}")]
  Immutable(String),

  #[error("Record has not been persisted yet")]
  NotPersisted,

  #[error("Record not found: id {id} in {table}")]
  NotFound { table: String, id: i64 },

  #[error("Shard index {index} out of range (modulus: {modulus})")]
  ShardOutOfRange { index: i64, modulus: u32 },

  #[error("Invalid shard key: {0}")]
  InvalidShardKey(String),

  #[error("Table not found: {0}")]
  TableNotFound(String),

  #[error("Unknown column {column} in {table}")]
  UnknownColumn { table: String, column: String },

  #[error("Duplicate primary key {id} in {table}")]
  DuplicateKey { table: String, id: i64 },

  #[error("Unsupported: {0}")]
  Unsupported(String),

  #[error("I/O Error: {0}")]
  Io(#[from] io::Error),

  #[error("Data Corruption: {0}")]
  Corruption(String),

  #[error("CRC32 Checksum Mismatch: expected {expected:#x}, got {actual:#x} in table frame {table}")]
  CrcMismatch { expected: u32, actual: u32, table: String },

  #[error("Serialization Error: {0}")]
  Serialization(String),
}

impl Error {
  /// True for errors raised because a write raced with another writer.
  pub fn is_stale(&self) -> bool {
    matches!(self, Error::StaleObject { .. })
  }

  /// True for both flavours of shard-key immutability failures.
  pub fn is_sharding_violation(&self) -> bool {
    matches!(self, Error::ShardingViolation { .. } | Error::ShardKeyLocked(_))
  }
}
