#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

use std::error::Error;
use std::fmt;
use std::io;

pub mod catalog;
pub mod database;
pub mod logical_plan;
pub mod statement;
pub mod table;
pub mod testutil;

pub use logical_plan::{AggregateKind, Comparator, Operator};

/// Custom error type.
#[derive(Debug, Clone, PartialEq)]
pub enum DbError {
    /// IO Errors.
    IOError(String),
    /// Invalid path, incompatible slot or a removal that breaks the node invariant.
    TreeError(String),
    /// A referenced column is absent from the current relation.
    ColumnError(String),
    /// Comparator or literal incompatible with a column's data type.
    TypeError(String),
    /// Malformed statement tokens.
    ValidationError(String),
    /// Execution errors.
    ExecutionError(String),
    /// Internal consistency faults. Never recovered from.
    InternalError(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                DbError::TreeError(s) => format!("Tree Error: {}", s),
                DbError::ColumnError(s) => format!("Column Error: {}", s),
                DbError::TypeError(s) => format!("Type Error: {}", s),
                DbError::ValidationError(s) => format!("Validation Error: {}", s),
                DbError::ExecutionError(s) => format!("Execution Error: {}", s),
                DbError::InternalError(s) => format!("Internal Error: {}", s),
                DbError::IOError(s) => s.to_string(),
            }
        )
    }
}

impl From<io::Error> for DbError {
    fn from(error: io::Error) -> Self {
        DbError::IOError(error.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(error: serde_json::Error) -> Self {
        DbError::IOError(error.to_string())
    }
}

impl Error for DbError {}

/// Enumerate the supported data kinds.
#[derive(PartialEq, Eq, Serialize, Deserialize, Clone, Copy, Debug)]
pub enum DataType {
    Number,
    Char,
    Date,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Number => "NUMBER",
            DataType::Char => "CHAR",
            DataType::Date => "DATE",
        };
        write!(f, "{}", s)
    }
}

/// Column descriptor. Pairs the name with the data kind and a display width.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct Column {
    /// Column name, `table.column` once extracted from a table.
    pub name: String,
    /// Column data kind.
    pub dtype: DataType,
    /// Display width.
    pub width: usize,
}

impl Column {
    /// Create a new column.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the column.
    /// * `dtype` - Data kind of the column.
    /// * `width` - Display width of the column.
    pub fn new(name: &str, dtype: DataType, width: usize) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            width,
        }
    }

    /// Returns the name of the column.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data kind of the column.
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Copy of the column tagged with its originating table, `table.column`.
    ///
    /// Columns that already carry a table prefix are left as they are.
    pub fn qualified(&self, table: &str) -> Self {
        if self.name.contains('.') {
            return self.clone();
        }
        Self {
            name: format!("{}.{}", table, self.name),
            dtype: self.dtype,
            width: self.width,
        }
    }
}

/// Checks whether a column called `name` answers to `reference`.
///
/// A bare reference `c` matches `c` and `t.c`; a qualified reference `t.c` matches `t.c` and a
/// bare `c`. Aggregate output names such as `SUM(qty)` only match exactly.
pub fn column_matches(name: &str, reference: &str) -> bool {
    if name == reference {
        return true;
    }
    if name.contains('(') || reference.contains('(') {
        return false;
    }
    match (name.split_once('.'), reference.split_once('.')) {
        (Some((_, col)), None) => col == reference,
        (None, Some((_, col))) => name == col,
        _ => false,
    }
}

/// Finds the position of the column answering to `reference`.
///
/// Exact name matches win; otherwise the reference must match exactly one column.
pub fn find_column<'a, I>(names: I, reference: &str) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();
    if let Some(i) = names.iter().position(|n| *n == reference) {
        return Some(i);
    }
    let mut found = None;
    for (i, name) in names.iter().enumerate() {
        if column_matches(name, reference) {
            if found.is_some() {
                debug!("column reference {} is ambiguous", reference);
                return None;
            }
            found = Some(i);
        }
    }
    found
}

/// Strips a `table.` prefix from a column name.
pub fn strip_table(name: &str) -> &str {
    if name.contains('(') {
        return name;
    }
    match name.split_once('.') {
        Some((_, col)) => col,
        None => name,
    }
}

#[cfg(test)]
mod libtests {
    use super::*;

    #[test]
    fn test_column_matches() {
        assert!(column_matches("emp.id", "id"));
        assert!(column_matches("emp.id", "emp.id"));
        assert!(column_matches("id", "emp.id"));
        assert!(!column_matches("emp.id", "dept.id"));
        assert!(!column_matches("emp.idx", "id"));
        assert!(column_matches("SUM(qty)", "SUM(qty)"));
        assert!(!column_matches("SUM(t.qty)", "qty)"));
    }

    #[test]
    fn test_find_column() {
        let names = vec!["emp.id", "emp.name", "dept.id"];
        assert_eq!(find_column(names.clone(), "name"), Some(1));
        assert_eq!(find_column(names.clone(), "dept.id"), Some(2));
        // Bare `id` is ambiguous between the two tables.
        assert_eq!(find_column(names.clone(), "id"), None);
        assert_eq!(find_column(names, "salary"), None);
    }

    #[test]
    fn test_qualified() {
        let col = Column::new("id", DataType::Number, 4);
        assert_eq!(col.qualified("emp").name(), "emp.id");
        assert_eq!(col.qualified("emp").qualified("x").name(), "emp.id");
        assert_eq!(strip_table("emp.id"), "id");
        assert_eq!(strip_table("SUM(emp.id)"), "SUM(emp.id)");
    }

    #[test]
    fn test_error_display() {
        let err = DbError::TreeError(String::from("no node"));
        assert_eq!(err.to_string(), "Tree Error: no node");
    }
}
