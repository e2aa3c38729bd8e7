//! Optional batch-serialization capability.
//!
//! An entity type may carry a [`BatchExport`]. The registry hands it to every
//! shard descriptor it creates for that type, so exporting works the same on
//! every shard.

use crate::error::Result;
use crate::value::Row;

/// Serializes a batch of rows read from one shard table.
pub trait BatchExport: Send + Sync {
  /// `collection` is the base table name of the entity type, `rows` are
  /// `(id, row)` pairs ordered by id.
  fn export(&self, collection: &str, rows: &[(i64, Row)]) -> Result<Vec<u8>>;
}

/// Renders `{"<collection>": [{"id": 1, ...columns}, ...]}`.
#[cfg(feature = "json")]
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExport;

#[cfg(feature = "json")]
impl BatchExport for JsonExport {
  fn export(&self, collection: &str, rows: &[(i64, Row)]) -> Result<Vec<u8>> {
    use crate::error::Error;
    use serde_json::{Map, Value as Json};

    let records = rows
      .iter()
      .map(|(id, row)| {
        let mut object = Map::new();
        object.insert("id".into(), Json::from(*id));
        for (column, value) in row {
          let json = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
          object.insert(column.clone(), json);
        }
        Ok(Json::Object(object))
      })
      .collect::<Result<Vec<_>>>()?;

    let mut envelope = Map::new();
    envelope.insert(collection.to_string(), Json::Array(records));
    serde_json::to_vec(&Json::Object(envelope)).map_err(|e| Error::Serialization(e.to_string()))
  }
}
