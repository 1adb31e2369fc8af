//! Decoding of `ovs-vsctl --format json` output.
//!
//! Table output is `{"headings": [...], "data": [[...], ...]}`. Cells are
//! plain JSON values or OVSDB tagged values such as `["set", [...]]` and
//! `["uuid", "..."]`; they are flattened to strings here. Columns are always
//! looked up by heading, never by position.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::guest::Nic;

/// Decoded table output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularResult {
    pub headings: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Tool output the table was decoded from.
    pub raw: String,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    #[serde(alias = "Headings")]
    headings: Vec<String>,
    #[serde(alias = "Data")]
    data: Vec<Vec<Value>>,
}

impl TabularResult {
    /// Parse a single JSON table object.
    pub fn parse(raw: &str) -> Result<Self> {
        let table: RawTable = serde_json::from_str(raw.trim())
            .map_err(|e| Error::parse(format!("invalid table JSON: {e}"), raw))?;

        let width = table.headings.len();
        let mut rows = Vec::with_capacity(table.data.len());
        for (i, row) in table.data.iter().enumerate() {
            if row.len() != width {
                return Err(Error::parse(
                    format!("row {} has {} cells, expected {}", i, row.len(), width),
                    raw,
                ));
            }
            rows.push(row.iter().map(cell_text).collect());
        }

        Ok(Self {
            headings: table.headings,
            rows,
            raw: raw.to_string(),
        })
    }

    /// Map heading name to column index.
    pub fn columns(&self) -> HashMap<&str, usize> {
        self.headings
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect()
    }

    /// Decode rows of a `name,mac_in_use,type` Interface query.
    pub fn interfaces(&self) -> Result<Vec<SwitchInterface>> {
        let columns = self.columns();
        let index = |heading: &str| {
            columns.get(heading).copied().ok_or_else(|| {
                Error::parse(format!("missing column '{heading}'"), self.raw.as_str())
            })
        };

        let name = index("name")?;
        let mac = index("mac_in_use")?;
        let kind = index("type")?;

        Ok(self
            .rows
            .iter()
            .map(|row| SwitchInterface {
                name: row[name].clone(),
                mac: row[mac].clone(),
                kind: row[kind].clone(),
            })
            .collect())
    }
}

/// One interface row from the switch database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchInterface {
    pub name: String,
    pub mac: String,
    pub kind: String,
}

impl SwitchInterface {
    /// Nic record for this interface on `bridge`.
    pub fn into_nic(self, bridge: &str) -> Nic {
        Nic {
            device: self.name.clone(),
            name: self.name,
            network: bridge.to_string(),
            mac: self.mac,
            ..Default::default()
        }
    }
}

/// Parse an interface name listing.
///
/// Accepts a JSON array of strings or one name per line; empty output is an
/// empty bridge.
pub fn parse_name_list(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| Error::parse(format!("invalid name list JSON: {e}"), raw));
    }
    Ok(crate::command::split_lines(trimmed))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(items) => match items.as_slice() {
            [Value::String(tag), Value::Array(members)] if tag == "set" => members
                .iter()
                .map(cell_text)
                .collect::<Vec<_>>()
                .join(","),
            [Value::String(tag), Value::Array(pairs)] if tag == "map" => pairs
                .iter()
                .filter_map(|pair| match pair.as_array()?.as_slice() {
                    [k, v] => Some(format!("{}={}", cell_text(k), cell_text(v))),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(","),
            [Value::String(tag), inner] if tag == "uuid" || tag == "named-uuid" => {
                cell_text(inner)
            }
            _ => value.to_string(),
        },
        Value::Object(_) => value.to_string(),
    }
}
