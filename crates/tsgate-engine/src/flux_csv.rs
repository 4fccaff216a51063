//! Annotated CSV decoding for `/api/v2/query` responses.
//!
//! A response is a sequence of blocks. Each block starts with `#datatype`,
//! `#group` and `#default` annotation rows, then a header row, then data
//! rows. The first column of every row is reserved for annotations and is
//! empty on header and data rows. Rows carry a `table` column; several
//! tables may share one block.

use std::collections::BTreeMap;

use serde_json::Value;
use tsgate_core::{Error, Result};

use crate::types::{FluxColumn, FluxRecord, FluxTable};

/// Decode a full annotated CSV body into tables, ordered by table index.
pub fn decode(body: &str) -> Result<Vec<FluxTable>> {
    let mut tables: BTreeMap<i64, FluxTable> = BTreeMap::new();
    let mut block = Block::default();

    for row in split_rows(body) {
        if row.iter().all(|f| f.is_empty()) {
            block = Block::default();
            continue;
        }

        let first = row[0].as_str();
        if first.starts_with('#') {
            if block.header.is_some() {
                block = Block::default();
            }
            let values: Vec<String> = row[1..].to_vec();
            match first {
                "#datatype" => block.datatypes = values,
                "#group" => block.groups = values.iter().map(|v| v == "true").collect(),
                "#default" => block.defaults = values,
                _ => {}
            }
            continue;
        }

        let Some(header) = block.header.as_ref() else {
            block.header = Some(row[1..].to_vec());
            if is_error_header(&row[1..]) {
                block.error = true;
            }
            continue;
        };

        if block.error {
            let message = row.get(1).cloned().unwrap_or_default();
            return Err(Error::Upstream {
                status: 500,
                body: message,
            });
        }

        let mut values = BTreeMap::new();
        for (i, name) in header.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            let raw = row.get(i + 1).map(String::as_str).unwrap_or("");
            let raw = if raw.is_empty() {
                block.defaults.get(i).map(String::as_str).unwrap_or("")
            } else {
                raw
            };
            let datatype = block.datatypes.get(i).map(String::as_str).unwrap_or("string");
            values.insert(name.clone(), convert(raw, datatype));
        }

        let index = values.get("table").and_then(Value::as_i64).unwrap_or(0);
        let table = tables.entry(index).or_insert_with(|| FluxTable {
            index,
            columns: block.columns(),
            records: Vec::new(),
        });
        table.records.push(FluxRecord {
            table: index,
            values,
        });
    }

    Ok(tables.into_values().collect())
}

#[derive(Default)]
struct Block {
    datatypes: Vec<String>,
    groups: Vec<bool>,
    defaults: Vec<String>,
    header: Option<Vec<String>>,
    error: bool,
}

impl Block {
    fn columns(&self) -> Vec<FluxColumn> {
        self.header
            .iter()
            .flatten()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(i, name)| FluxColumn {
                name: name.clone(),
                data_type: self
                    .datatypes
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| "string".into()),
                group: self.groups.get(i).copied().unwrap_or(false),
            })
            .collect()
    }
}

fn is_error_header(header: &[String]) -> bool {
    header.len() >= 2 && header[0] == "error" && header[1] == "reference"
}

fn convert(raw: &str, datatype: &str) -> Value {
    if raw.is_empty() && datatype != "string" {
        return Value::Null;
    }
    match datatype {
        "double" => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "long" => raw.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
        "unsignedLong" => raw.parse::<u64>().map(Value::from).unwrap_or(Value::Null),
        "boolean" => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Null,
        },
        _ => Value::String(raw.to_string()),
    }
}

/// Split CSV text into rows of fields, honouring double-quoted fields that
/// may contain commas, doubled quotes and newlines. Blank lines come out as
/// a row with a single empty field.
fn split_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                c => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            c => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
