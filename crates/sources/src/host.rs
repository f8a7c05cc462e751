//! The contract between a data source and the query host.
//!
//! The host asks for the input arguments, hands back the values the user
//! picked, asks for the columns, then pulls pages until it has enough.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rad_core::ParameterKey;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

pub trait DataSource {
    fn input_arguments(&self) -> Vec<ArgumentSpec>;

    fn process_arguments(&mut self, args: &Arguments) -> Result<(), SourceError>;

    /// Called once after the arguments are processed, before the first page.
    fn prepare_fetch(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn columns(&self) -> Vec<Column>;

    fn next_page(&mut self) -> Result<Page, SourceError>;
}

// ── Arguments ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    String,
    Int,
    Bool,
    DateTime,
    /// String restricted to `ArgumentSpec::options`.
    Dropdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<ArgValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl ArgumentSpec {
    pub fn new(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
            options: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: ArgValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    DateTime(DateTime<Utc>),
    String(String),
}

/// Argument values by name, as supplied by the host.
///
/// Lookups are typed: a value of the wrong type reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments(BTreeMap<String, ArgValue>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: ArgValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: ArgValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ArgValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(ArgValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.0.get(name) {
            Some(ArgValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn datetime(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.0.get(name) {
            Some(ArgValue::DateTime(t)) => Some(*t),
            _ => None,
        }
    }
}

// ── Columns and rows ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    String,
    Int,
    Bool,
    Double,
    TimeSpan,
    DateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    String(String),
    Int(i64),
    Bool(bool),
    Double(f64),
    TimeSpan(Duration),
    DateTime(DateTime<Utc>),
    Null,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::String(s) => f.write_str(s),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Double(d) => write!(f, "{}", d),
            Cell::TimeSpan(d) => write!(f, "{}m", d.as_secs() / 60),
            Cell::DateTime(t) => write!(f, "{}", t.to_rfc3339()),
            Cell::Null => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub cells: Vec<Cell>,
    /// Parameters the row refers to, so the host can link to them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterKey>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            parameters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    pub rows: Vec<Row>,
    pub has_next_page: bool,
}

impl Page {
    pub fn last(rows: Vec<Row>) -> Self {
        Self {
            rows,
            has_next_page: false,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}
