//! Point-in-time snapshots of a [`MemoryStore`].
//!
//! ## Binary Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ MAGIC          │ 4 bytes  │ "ISNP"                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │ VERSION        │ 1 byte   │ Format version (0x01)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │ TABLE_COUNT    │ 4 bytes  │ Number of table frames (u32 LE) │
//! ├─────────────────────────────────────────────────────────────┤
//! │ FRAMES         │ ...      │ One frame per table             │
//! └─────────────────────────────────────────────────────────────┘
//!
//! Frame: [CRC32: 4][PAYLOAD_LEN: 4][PAYLOAD: N]
//!
//! Payload:
//!   [NAME_LEN: 2][NAME]
//!   [COLUMN_COUNT: 2] then per column [LEN: 2][NAME]
//!   [NEXT_ID: 8][ROW_COUNT: 4]
//!   per row: [ID: 8] then one value per column, in column order
//!
//! Value: [TAG: 1][DATA]
//!   0 Null, 1 Bool (1 byte), 2 Int (8), 3 Float (8),
//!   4 Text ([LEN: 4][UTF-8]), 5 Timestamp (8)
//! ```

use crate::error::{Error, Result};
use crate::mapping::memory::{MemoryStore, MemoryTable, TableData};
use crate::value::{Row, Value};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Magic bytes identifying a snapshot file: "ISNP"
pub const MAGIC: &[u8; 4] = b"ISNP";

/// Current snapshot format version
pub const VERSION: u8 = 0x01;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_TEXT: u8 = 4;
const TAG_TIMESTAMP: u8 = 5;

impl MemoryStore {
  /// Writes every table to `path` atomically (temp file, fsync, rename).
  ///
  /// Each table is copied under its own read lock, so the snapshot is
  /// consistent per table but not across tables.
  pub fn save_snapshot(&self, path: &Path) -> Result<()> {
    let tables: Vec<Arc<MemoryTable>> = {
      let map = self.inner.tables.read();
      let mut tables: Vec<_> = map.values().cloned().collect();
      tables.sort_by(|a, b| a.name.cmp(&b.name));
      tables
    };

    let file_name = path
      .file_name()
      .ok_or_else(|| Error::Config(format!("Invalid snapshot path: {}", path.display())))?;
    let temp_path = path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));

    // 1. Write to a temporary file
    let file = File::create(&temp_path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(MAGIC)?;
    writer.write_u8(VERSION)?;
    writer.write_u32::<LittleEndian>(checked_u32(tables.len(), "table count")?)?;

    for table in &tables {
      let payload = encode_table(table)?;
      writer.write_u32::<LittleEndian>(checksum(&payload))?;
      writer.write_u32::<LittleEndian>(checked_u32(payload.len(), "table frame")?)?;
      writer.write_all(&payload)?;
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;

    // 2. Atomically rename the temp file to the final name
    fs::rename(&temp_path, path)?;

    // 3. fsync the parent directory so the rename survives a crash
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      File::open(parent)?.sync_all()?;
    }

    tracing::debug!(target: "ironshard::snapshot", "Saved {} tables to {}", tables.len(), path.display());
    Ok(())
  }

  /// Loads a store previously written by [`MemoryStore::save_snapshot`].
  pub fn load_snapshot(path: &Path) -> Result<Self> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
      return Err(Error::Corruption(format!("Invalid snapshot magic: {:?}", magic)));
    }

    let version = reader.read_u8()?;
    if version != VERSION {
      return Err(Error::Corruption(format!(
        "Unsupported snapshot version: expected {}, got {}",
        VERSION, version
      )));
    }

    let table_count = reader.read_u32::<LittleEndian>()?;
    let mut tables = HashMap::with_capacity(table_count as usize);

    for _ in 0..table_count {
      let expected = reader.read_u32::<LittleEndian>()?;
      let len = reader.read_u32::<LittleEndian>()? as usize;
      let mut payload = vec![0u8; len];
      reader.read_exact(&mut payload).map_err(|e| {
        tracing::warn!(target: "ironshard::snapshot", "Truncated snapshot frame in {}: {}", path.display(), e);
        Error::Corruption(format!("Truncated table frame: {}", e))
      })?;

      let actual = checksum(&payload);
      if actual != expected {
        let name = read_str16(&mut Cursor::new(payload.as_slice())).unwrap_or_else(|_| "<unknown>".into());
        return Err(Error::CrcMismatch {
          expected,
          actual,
          table: name,
        });
      }

      let table = decode_table(&payload)?;

      tables.insert(table.name.clone(), Arc::new(table));
    }

    Ok(MemoryStore::from_tables(tables))
  }
}

fn checksum(payload: &[u8]) -> u32 {
  let mut hasher = Hasher::new();
  hasher.update(payload);
  hasher.finalize()
}

fn checked_u32(len: usize, what: &str) -> Result<u32> {
  u32::try_from(len).map_err(|_| Error::Serialization(format!("{} too large: {}", what, len)))
}

fn write_str16(buf: &mut Vec<u8>, s: &str) -> Result<()> {
  let len = u16::try_from(s.len()).map_err(|_| Error::Serialization(format!("Name too long: {}", s)))?;
  buf.write_u16::<LittleEndian>(len)?;
  buf.write_all(s.as_bytes())?;
  Ok(())
}

fn read_str16(cursor: &mut Cursor<&[u8]>) -> Result<String> {
  let len = cursor.read_u16::<LittleEndian>()? as usize;
  let mut bytes = vec![0u8; len];
  cursor.read_exact(&mut bytes)?;
  String::from_utf8(bytes).map_err(|e| Error::Corruption(format!("Invalid UTF-8 in snapshot: {}", e)))
}

fn encode_table(table: &MemoryTable) -> Result<Vec<u8>> {
  let data = table.data.read();
  let mut buf = Vec::new();

  write_str16(&mut buf, &table.name)?;
  let column_count = u16::try_from(table.columns.len())
    .map_err(|_| Error::Serialization(format!("Too many columns in {}: {}", table.name, table.columns.len())))?;
  buf.write_u16::<LittleEndian>(column_count)?;
  for column in &table.columns {
    write_str16(&mut buf, column)?;
  }

  buf.write_i64::<LittleEndian>(data.next_id)?;
  buf.write_u32::<LittleEndian>(checked_u32(data.rows.len(), "row count")?)?;
  for (id, row) in &data.rows {
    buf.write_i64::<LittleEndian>(*id)?;
    for column in &table.columns {
      encode_value(&mut buf, row.get(column).unwrap_or(&Value::Null))?;
    }
  }

  Ok(buf)
}

fn decode_table(payload: &[u8]) -> Result<MemoryTable> {
  let mut cursor = Cursor::new(payload);

  let name = read_str16(&mut cursor)?;
  let column_count = cursor.read_u16::<LittleEndian>()?;
  let mut columns = Vec::with_capacity(column_count as usize);
  for _ in 0..column_count {
    columns.push(read_str16(&mut cursor)?);
  }

  let mut data = TableData {
    next_id: cursor.read_i64::<LittleEndian>()?,
    ..Default::default()
  };

  let row_count = cursor.read_u32::<LittleEndian>()?;
  for _ in 0..row_count {
    let id = cursor.read_i64::<LittleEndian>()?;
    let mut row = Row::new();
    for column in &columns {
      row.insert(column.clone(), decode_value(&mut cursor)?);
    }
    data.rows.insert(id, row);
  }

  let columns: BTreeSet<String> = columns.into_iter().collect();
  Ok(MemoryTable::new(name, columns, data))
}

fn encode_value(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
  match value {
    Value::Null => buf.write_u8(TAG_NULL)?,
    Value::Bool(v) => {
      buf.write_u8(TAG_BOOL)?;
      buf.write_u8(*v as u8)?;
    }
    Value::Int(v) => {
      buf.write_u8(TAG_INT)?;
      buf.write_i64::<LittleEndian>(*v)?;
    }
    Value::Float(v) => {
      buf.write_u8(TAG_FLOAT)?;
      buf.write_f64::<LittleEndian>(*v)?;
    }
    Value::Text(v) => {
      buf.write_u8(TAG_TEXT)?;
      buf.write_u32::<LittleEndian>(checked_u32(v.len(), "text value")?)?;
      buf.write_all(v.as_bytes())?;
    }
    Value::Timestamp(v) => {
      buf.write_u8(TAG_TIMESTAMP)?;
      buf.write_i64::<LittleEndian>(*v)?;
    }
  }
  Ok(())
}

fn decode_value(cursor: &mut Cursor<&[u8]>) -> Result<Value> {
  let value = match cursor.read_u8()? {
    TAG_NULL => Value::Null,
    TAG_BOOL => Value::Bool(cursor.read_u8()? != 0),
    TAG_INT => Value::Int(cursor.read_i64::<LittleEndian>()?),
    TAG_FLOAT => Value::Float(cursor.read_f64::<LittleEndian>()?),
    TAG_TEXT => {
      let len = cursor.read_u32::<LittleEndian>()? as usize;
      let mut bytes = vec![0u8; len];
      cursor.read_exact(&mut bytes)?;
      Value::Text(String::from_utf8(bytes).map_err(|e| Error::Corruption(format!("Invalid UTF-8 in snapshot: {}", e)))?)
    }
    TAG_TIMESTAMP => Value::Timestamp(cursor.read_i64::<LittleEndian>()?),
    tag => return Err(Error::Corruption(format!("Unknown value tag: {}", tag))),
  };
  Ok(value)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_value_encoding() {
    let values = vec![
      Value::Null,
      Value::Bool(true),
      Value::Int(-42),
      Value::Float(1.25),
      Value::Text("héllo".into()),
      Value::Timestamp(1_700_000_000_000_000),
    ];

    let mut buf = Vec::new();
    for v in &values {
      encode_value(&mut buf, v).unwrap();
    }

    let mut cursor = Cursor::new(buf.as_slice());
    for v in &values {
      assert_eq!(&decode_value(&mut cursor).unwrap(), v);
    }
  }

  #[test]
  fn test_oversized_lengths_are_rejected() {
    let name = "c".repeat(u16::MAX as usize + 1);
    let mut buf = Vec::new();
    assert!(matches!(write_str16(&mut buf, &name), Err(Error::Serialization(_))));
    assert!(buf.is_empty());

    let columns: BTreeSet<String> = (0..=u16::MAX as u32).map(|i| format!("c{}", i)).collect();
    let table = MemoryTable::new("wide_0000".into(), columns, TableData::default());
    assert!(matches!(encode_table(&table), Err(Error::Serialization(_))));

    assert!(checked_u32(u32::MAX as usize, "row count").is_ok());
    #[cfg(target_pointer_width = "64")]
    assert!(matches!(
      checked_u32(u32::MAX as usize + 1, "row count"),
      Err(Error::Serialization(_))
    ));
  }

  #[test]
  fn test_unknown_tag_is_corruption() {
    let buf = [9u8];
    let mut cursor = Cursor::new(&buf[..]);
    assert!(matches!(decode_value(&mut cursor), Err(Error::Corruption(_))));
  }
}
