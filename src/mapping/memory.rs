use crate::error::{Error, Result};
use crate::mapping::{Mapper, RowMatch, Table};
use crate::value::{Row, Value};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mutable contents of a table.
#[derive(Debug, Default, Clone)]
pub(crate) struct TableData {
  pub next_id: i64,
  pub rows: BTreeMap<i64, Row>,
}

/// One in-memory table. Each table has its own lock so writers to different
/// shards never contend.
pub(crate) struct MemoryTable {
  pub name: String,
  pub columns: BTreeSet<String>,
  pub data: RwLock<TableData>,
}

impl MemoryTable {
  pub(crate) fn new(name: String, columns: BTreeSet<String>, data: TableData) -> Self {
    Self {
      name,
      columns,
      data: RwLock::new(data),
    }
  }

  fn check_columns(&self, row: &Row) -> Result<()> {
    match row.keys().find(|c| !self.columns.contains(*c)) {
      Some(column) => Err(Error::UnknownColumn {
        table: self.name.clone(),
        column: column.clone(),
      }),
      None => Ok(()),
    }
  }

  fn matches(row: &Row, filter: &RowMatch) -> bool {
    match &filter.version {
      None => true,
      Some((column, expected)) => row.get(column).unwrap_or(&Value::Null) == expected,
    }
  }
}

impl Table for MemoryTable {
  fn name(&self) -> &str {
    &self.name
  }

  fn insert(&self, id: Option<i64>, row: &Row) -> Result<i64> {
    self.check_columns(row)?;

    let mut data = self.data.write();
    let id = match id {
      Some(id) => {
        if data.rows.contains_key(&id) {
          return Err(Error::DuplicateKey {
            table: self.name.clone(),
            id,
          });
        }
        data.next_id = data.next_id.max(id);
        id
      }
      None => {
        data.next_id += 1;
        data.next_id
      }
    };

    // Columns absent from the row are stored as NULL.
    let mut stored: Row = self.columns.iter().map(|c| (c.clone(), Value::Null)).collect();
    stored.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
    data.rows.insert(id, stored);

    Ok(id)
  }

  fn update(&self, filter: &RowMatch, changes: &Row) -> Result<u64> {
    self.check_columns(changes)?;

    let mut data = self.data.write();
    match data.rows.get_mut(&filter.id) {
      Some(row) if Self::matches(row, filter) => {
        for (column, value) in changes {
          row.insert(column.clone(), value.clone());
        }
        Ok(1)
      }
      _ => Ok(0),
    }
  }

  fn delete(&self, filter: &RowMatch) -> Result<u64> {
    let mut data = self.data.write();
    let matched = data.rows.get(&filter.id).is_some_and(|row| Self::matches(row, filter));
    if matched {
      data.rows.remove(&filter.id);
      Ok(1)
    } else {
      Ok(0)
    }
  }

  fn find(&self, id: i64) -> Result<Option<Row>> {
    Ok(self.data.read().rows.get(&id).cloned())
  }

  fn count(&self) -> Result<u64> {
    Ok(self.data.read().rows.len() as u64)
  }

  fn scan(&self) -> Result<Vec<(i64, Row)>> {
    let data = self.data.read();
    Ok(data.rows.iter().map(|(id, row)| (*id, row.clone())).collect())
  }
}

pub(crate) struct StoreState {
  pub tables: RwLock<HashMap<String, Arc<MemoryTable>>>,
  binds: AtomicUsize,
}

/// An in-process relational store: named tables with fixed columns and
/// auto-increment primary keys.
///
/// `MemoryStore` is cheap to clone; clones share the same tables.
///
/// # Example
///
/// ```
/// use ironshard::{Mapper, MemoryStore};
///
/// # fn main() -> ironshard::Result<()> {
/// let store = MemoryStore::new();
/// store.create_table("users_0000", &["tenant_id", "name"])?;
///
/// let table = store.bind("users_0000")?;
/// assert_eq!(table.count()?, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
  pub(crate) inner: Arc<StoreState>,
}

impl std::fmt::Debug for MemoryStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MemoryStore").finish_non_exhaustive()
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::from_tables(HashMap::new())
  }

  pub(crate) fn from_tables(tables: HashMap<String, Arc<MemoryTable>>) -> Self {
    Self {
      inner: Arc::new(StoreState {
        tables: RwLock::new(tables),
        binds: AtomicUsize::new(0),
      }),
    }
  }

  /// Creates an empty table. Creating an existing table is a no-op as long
  /// as the column set is identical.
  pub fn create_table(&self, name: &str, columns: &[&str]) -> Result<()> {
    let columns: BTreeSet<String> = columns.iter().map(|c| c.to_string()).collect();

    let mut tables = self.inner.tables.write();
    if let Some(existing) = tables.get(name) {
      if existing.columns == columns {
        return Ok(());
      }
      return Err(Error::Config(format!("Table {} already exists with different columns", name)));
    }

    tables.insert(
      name.to_string(),
      Arc::new(MemoryTable::new(name.to_string(), columns, TableData::default())),
    );
    Ok(())
  }

  /// Removes a table. Handles bound earlier keep the detached data alive.
  pub fn drop_table(&self, name: &str) -> bool {
    self.inner.tables.write().remove(name).is_some()
  }

  pub fn table_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.inner.tables.read().keys().cloned().collect();
    names.sort();
    names
  }

  pub fn has_table(&self, name: &str) -> bool {
    self.inner.tables.read().contains_key(name)
  }

  /// Number of successful `bind` calls since the store was created.
  pub fn bind_count(&self) -> usize {
    self.inner.binds.load(Ordering::Acquire)
  }
}

impl Mapper for MemoryStore {
  fn bind(&self, table_name: &str) -> Result<Arc<dyn Table>> {
    let tables = self.inner.tables.read();
    let table = tables
      .get(table_name)
      .cloned()
      .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;

    self.inner.binds.fetch_add(1, Ordering::AcqRel);
    Ok(table as Arc<dyn Table>)
  }
}
