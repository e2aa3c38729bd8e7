//! # IronShard
//!
//! `ironshard` routes the rows of an entity type across N physical tables
//! ("shards") chosen deterministically from a shard-key attribute.
//!
//! ## Key Features
//!
//! * **Deterministic Resolution**: Shard keys map to `<table>_NNNN` tables through a pure strategy.
//! * **Lazy Registry**: Shard handles are bound on first use, exactly once, even under contention.
//! * **Immutable Shard Keys**: Changing the key of a stored record fails where it is assigned.
//! * **Optimistic Locking**: Updates are conditional on a lock-version column when one is declared.
//! * **Pluggable Storage**: Any relational layer that implements [`Mapper`] and [`Table`].
//!
//! ## Example
//!
//! ```
//! use ironshard::{MemoryStore, ShardOptions, ShardRegistry, ShardedModel, Value};
//! use std::sync::Arc;
//!
//! # fn main() -> ironshard::Result<()> {
//! let store = MemoryStore::new();
//! for i in 0..4 {
//!     store.create_table(&format!("mod4_models_{:04}", i), &["hash_id", "name", "lock_version"])?;
//! }
//!
//! let registry = Arc::new(ShardRegistry::new(Arc::new(store)));
//! let model = ShardedModel::new(
//!     "Mod4Model",
//!     ShardOptions::modulo("hash_id", 4).locking("lock_version"),
//!     registry,
//! )?;
//!
//! let mut record = model.create([("hash_id", Value::from(5)), ("name", Value::from("a"))])?;
//! assert_eq!(model.shard(1)?.count()?, 1);
//!
//! // Shard keys of stored records are immutable
//! assert!(record.set("hash_id", 6).is_err());
//!
//! record.set("name", "b")?;
//! model.update(&mut record)?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod export;
mod guard;
mod mapping;
mod model;
mod record;
mod registry;
mod resolver;
mod router;
mod util;
mod value;

// Re-exports for the flat public API
pub use config::{KeyChangePolicy, ShardOptions};
pub use error::{Error, Result};
#[cfg(feature = "json")]
pub use export::JsonExport;
pub use export::BatchExport;
pub use guard::AttributeGuard;
pub use mapping::{Mapper, MemoryStore, RowMatch, Table};
pub use model::ShardedModel;
pub use record::{Record, RecordState};
pub use registry::{ShardDescriptor, ShardLayout, ShardRegistry, ShardSet};
pub use resolver::{ShardFn, ShardStrategy, integer_key};
pub use util::{default_table_name, parse_shard_index, shard_table_name};
pub use value::{Row, Value};
