use crate::table::*;
use crate::{column_matches, DbError};
use std::collections::HashMap;

/// Functions needed to implement a catalog. It keeps track of all available tables and their
/// columns.
pub trait Catalog {
    /// Get tables from catalog.
    fn tables(&self) -> &HashMap<String, Table>;

    /// Get a table by name.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the table.
    fn get_table(&self, name: &str) -> Result<&Table, DbError> {
        self.tables()
            .get(name)
            .ok_or_else(|| DbError::ValidationError(format!("Table {} not found", name)))
    }

    /// Checks if the table name is valid in the catalog.
    fn is_valid_table(&self, name: &str) -> bool {
        self.tables().contains_key(name)
    }

    /// Checks if the column is valid for the given table.
    ///
    /// # Arguments
    ///
    /// * `table` - Name of table to look for the column name in.
    /// * `col_name` - Name of column to look for in the table, bare or qualified.
    fn is_valid_column(&self, table: &str, col_name: &str) -> bool {
        match self.tables().get(table) {
            Some(t) => t
                .qualified_names()
                .iter()
                .any(|n| column_matches(n, col_name)),
            None => false,
        }
    }

    /// Number of rows held by the table, used for cardinality estimates.
    fn table_size(&self, name: &str) -> Result<usize, DbError> {
        Ok(self.get_table(name)?.size())
    }
}
