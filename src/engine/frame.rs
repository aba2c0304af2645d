use crate::document::Document;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// One cell of a [`Frame`]: a JSON scalar as stored, or a dense vector
/// in the engine's own representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Value(Value),
    Vector(Vec<f64>),
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Value(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
            Cell::Value(value) => value.as_f64(),
            Cell::Vector(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Value(value) => value.as_str(),
            Cell::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Cell::Vector(values) => Some(values),
            Cell::Value(_) => None,
        }
    }

    /// Vectors become plain JSON arrays of numbers.
    pub fn into_json(self) -> Value {
        match self {
            Cell::Value(value) => value,
            Cell::Vector(values) => Value::Array(values.into_iter().map(Value::from).collect()),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Value(Value::from(value))
    }
}

pub type Record = BTreeMap<String, Cell>;

/// Tabular dataset handed between the feature pipeline and the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl Frame {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    /// Columns are the union of document fields in first-seen order.
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let rows = documents
            .into_iter()
            .map(|doc| {
                doc.into_iter()
                    .map(|(field, value)| {
                        if !columns.contains(&field) {
                            columns.push(field.clone());
                        }
                        (field, Cell::Value(value))
                    })
                    .collect::<Record>()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = Option<&'a Cell>> + 'a {
        self.rows.iter().map(move |row| row.get(name))
    }

    pub fn filter(self, keep: impl Fn(&Record) -> bool) -> Self {
        Self {
            columns: self.columns,
            rows: self.rows.into_iter().filter(|row| keep(row)).collect(),
        }
    }

    pub fn drop_columns(mut self, names: &[&str]) -> Self {
        self.columns.retain(|c| !names.contains(&c.as_str()));
        for row in &mut self.rows {
            row.retain(|field, _| !names.contains(&field.as_str()));
        }
        self
    }

    /// Sets `name` on every row, replacing an existing column of that name.
    pub fn with_column(mut self, name: &str, values: Vec<Cell>) -> Result<Self> {
        if values.len() != self.rows.len() {
            return Err(Error::Engine(format!(
                "column {} has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(name.to_string(), value);
        }
        Ok(self)
    }

    /// Splits rows by position; rows where `take(index)` holds go to the second frame.
    pub fn split_by_index(self, take: impl Fn(usize) -> bool) -> (Self, Self) {
        let mut kept = Vec::new();
        let mut taken = Vec::new();
        for (index, row) in self.rows.into_iter().enumerate() {
            if take(index) {
                taken.push(row);
            } else {
                kept.push(row);
            }
        }
        (
            Self::new(self.columns.clone(), kept),
            Self::new(self.columns, taken),
        )
    }
}
