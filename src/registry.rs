//! The shard registry.
//!
//! Maps `(entity type, shard index)` to an immutable [`ShardDescriptor`].
//! Descriptors are created lazily, exactly once per key, and live as long as
//! the registry. The number of entries is bounded by the sum of the moduli of
//! the declared entity types, so nothing is ever evicted.

use crate::error::{Error, Result};
use crate::export::BatchExport;
use crate::mapping::{Mapper, Table};
use crate::util;
use crate::value::Row;

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Everything the registry needs to know about an entity type to bind its shards.
#[derive(Clone)]
pub struct ShardLayout {
  pub type_name: String,
  pub base_table_name: String,
  pub modulus: u32,
  pub exporter: Option<Arc<dyn BatchExport>>,
}

impl fmt::Debug for ShardLayout {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardLayout")
      .field("type_name", &self.type_name)
      .field("base_table_name", &self.base_table_name)
      .field("modulus", &self.modulus)
      .finish_non_exhaustive()
  }
}

/// The cached binding of one shard index to its table.
pub struct ShardDescriptor {
  index: u32,
  table_name: String,
  collection: String,
  table: Arc<dyn Table>,
  exporter: Option<Arc<dyn BatchExport>>,
}

impl ShardDescriptor {
  pub fn index(&self) -> u32 {
    self.index
  }

  pub fn table_name(&self) -> &str {
    &self.table_name
  }

  /// The bound table handle.
  pub fn table(&self) -> &Arc<dyn Table> {
    &self.table
  }

  pub fn count(&self) -> Result<u64> {
    self.table.count()
  }

  pub fn find(&self, id: i64) -> Result<Option<Row>> {
    self.table.find(id)
  }

  /// Whether the entity type declared an export capability.
  pub fn supports_export(&self) -> bool {
    self.exporter.is_some()
  }

  /// Exports every row of this shard through the entity type's exporter.
  pub fn export(&self) -> Result<Vec<u8>> {
    let exporter = self
      .exporter
      .as_ref()
      .ok_or_else(|| Error::Unsupported(format!("{} has no export capability", self.table_name)))?;
    exporter.export(&self.collection, &self.table.scan()?)
  }
}

impl fmt::Debug for ShardDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardDescriptor")
      .field("index", &self.index)
      .field("table_name", &self.table_name)
      .field("exportable", &self.exporter.is_some())
      .finish()
  }
}

/// The shard slots of one declared entity type.
///
/// One slot per index, sized by the modulus at declaration. A filled slot is
/// never replaced, so reading it is a single atomic load with no lock.
pub struct ShardSet {
  layout: ShardLayout,
  slots: Box<[OnceLock<Arc<ShardDescriptor>>]>,
}

impl ShardSet {
  fn new(layout: &ShardLayout) -> Self {
    Self {
      layout: layout.clone(),
      slots: (0..layout.modulus).map(|_| OnceLock::new()).collect(),
    }
  }

  pub fn layout(&self) -> &ShardLayout {
    &self.layout
  }

  /// The descriptor for `index` if it has been bound. Never blocks.
  pub fn get(&self, index: u32) -> Option<Arc<ShardDescriptor>> {
    self.slots.get(index as usize)?.get().cloned()
  }

  /// Bound descriptors, ordered by index.
  pub fn bound(&self) -> Vec<Arc<ShardDescriptor>> {
    self.slots.iter().filter_map(|slot| slot.get().cloned()).collect()
  }

  fn matches(&self, layout: &ShardLayout) -> bool {
    self.layout.base_table_name == layout.base_table_name
      && self.layout.modulus == layout.modulus
      && same_exporter(&self.layout.exporter, &layout.exporter)
  }
}

impl fmt::Debug for ShardSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardSet")
      .field("layout", &self.layout)
      .field("bound", &self.slots.iter().filter(|s| s.get().is_some()).count())
      .finish()
  }
}

// Compares exporter identity. Only the data pointer counts, vtables may be duplicated.
fn same_exporter(a: &Option<Arc<dyn BatchExport>>, b: &Option<Arc<dyn BatchExport>>) -> bool {
  match (a, b) {
    (None, None) => true,
    (Some(a), Some(b)) => std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ()),
    _ => false,
  }
}

/// A thread-safe, lazily populated cache of shard descriptors.
///
/// Each declared type owns a [`ShardSet`]. Models keep the set returned by
/// [`ShardRegistry::declare`] and read bound descriptors from it without
/// taking any lock. Binding is serialized by a single registry-wide mutex and
/// re-checks the slot after acquiring it, so concurrent first accesses bind
/// exactly one handle. Lookups by type name ([`ShardRegistry::get_or_create`],
/// [`ShardRegistry::cached`]) additionally take a shared read guard on the
/// type map, which is only written by declarations.
pub struct ShardRegistry {
  mapper: Arc<dyn Mapper>,
  types: RwLock<HashMap<String, Arc<ShardSet>>>,
  create_lock: Mutex<()>,
}

impl ShardRegistry {
  pub fn new(mapper: Arc<dyn Mapper>) -> Self {
    Self {
      mapper,
      types: RwLock::new(HashMap::new()),
      create_lock: Mutex::new(()),
    }
  }

  pub fn mapper(&self) -> &Arc<dyn Mapper> {
    &self.mapper
  }

  /// Registers an entity type and returns its shard set.
  ///
  /// Declaring the same type twice is allowed as long as the base table name,
  /// modulus and export capability (the same `Arc`) agree. Anything else
  /// would leave already bound shards with a stale layout.
  pub fn declare(&self, layout: &ShardLayout) -> Result<Arc<ShardSet>> {
    if let Some(existing) = self.types.read().get(&layout.type_name) {
      return check_layout(existing, layout);
    }

    let mut types = self.types.write();
    match types.get(&layout.type_name) {
      Some(existing) => check_layout(existing, layout),
      None => {
        let set = Arc::new(ShardSet::new(layout));
        types.insert(layout.type_name.clone(), set.clone());
        Ok(set)
      }
    }
  }

  /// Returns the descriptor for `index`, binding its table on first use.
  /// Declares the type if it is not known yet.
  ///
  /// # Errors
  ///
  /// * `Error::Config` if the type is declared with a different layout
  /// * `Error::ShardOutOfRange` if `index` is outside `0..modulus`
  /// * any error from `Mapper::bind`. Failed bindings are not cached, the
  ///   next call retries.
  pub fn get_or_create(&self, layout: &ShardLayout, index: i64) -> Result<Arc<ShardDescriptor>> {
    let set = self.declare(layout)?;
    self.shard_in(&set, index)
  }

  /// Same as [`ShardRegistry::get_or_create`] for a set already in hand.
  pub fn shard_in(&self, set: &ShardSet, index: i64) -> Result<Arc<ShardDescriptor>> {
    let layout = &set.layout;
    let index = check_range(index, layout.modulus)?;

    // 1. Lock-free read
    if let Some(descriptor) = set.get(index) {
      return Ok(descriptor);
    }

    // 2. Serialize creation, then re-check: a racing caller may have bound it already
    let _guard = self.create_lock.lock();
    if let Some(descriptor) = set.get(index) {
      return Ok(descriptor);
    }

    let table_name = util::shard_table_name(&layout.base_table_name, index);
    let table = self.mapper.bind(&table_name).inspect_err(|e| {
      tracing::warn!(target: "ironshard::registry", "Failed to bind {} for {}: {}", table_name, layout.type_name, e);
    })?;

    let descriptor = Arc::new(ShardDescriptor {
      index,
      table_name,
      collection: layout.base_table_name.clone(),
      table,
      exporter: layout.exporter.clone(),
    });

    // Only this thread can fill the slot while holding create_lock
    let _ = set.slots[index as usize].set(descriptor.clone());

    tracing::debug!(
      target: "ironshard::registry",
      "Bound shard {} of {} to {}",
      index,
      layout.type_name,
      descriptor.table_name
    );

    Ok(descriptor)
  }

  /// Looks up a descriptor without creating it.
  pub fn cached(&self, type_name: &str, index: u32) -> Option<Arc<ShardDescriptor>> {
    let set = self.types.read().get(type_name).cloned()?;
    set.get(index)
  }

  /// Descriptors created so far for a type, ordered by index.
  pub fn shards_for(&self, type_name: &str) -> Vec<Arc<ShardDescriptor>> {
    let set = self.types.read().get(type_name).cloned();
    set.map(|set| set.bound()).unwrap_or_default()
  }

  /// Total number of descriptors across all types.
  pub fn len(&self) -> usize {
    self.types.read().values().map(|set| set.bound().len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

fn check_layout(existing: &Arc<ShardSet>, layout: &ShardLayout) -> Result<Arc<ShardSet>> {
  if existing.matches(layout) {
    return Ok(existing.clone());
  }
  let existing = &existing.layout;
  Err(Error::Config(format!(
    "{} is already declared with {} shards of {} ({} export capability)",
    layout.type_name,
    existing.modulus,
    existing.base_table_name,
    if existing.exporter.is_some() { "with" } else { "without" }
  )))
}

fn check_range(index: i64, modulus: u32) -> Result<u32> {
  if index < 0 || index >= modulus as i64 {
    return Err(Error::ShardOutOfRange { index, modulus });
  }
  Ok(index as u32)
}
