use crate::{Column, DataType};

/// Foreign key metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ForeignKey {
    /// Referencing column of this table.
    pub column: String,
    /// Referenced table.
    pub ref_table: String,
    /// Referenced column.
    pub ref_column: String,
}

/// Table implementation. Cells are kept text-encoded, one per column.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Ordered column descriptors, unqualified.
    pub columns: Vec<Column>,
    /// Primary key columns.
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Foreign keys.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Row data.
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates a new empty table with the given name and columns.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of table.
    /// * `columns` - Columns of the table in order.
    pub fn new(name: &str, columns: Vec<Column>) -> Self {
        Table {
            name: name.to_string(),
            columns,
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Creates a table from column names and kinds; widths are taken from the names.
    pub fn from_vecs(name: &str, names: Vec<&str>, dtypes: Vec<DataType>) -> Self {
        let columns = names
            .iter()
            .zip(dtypes.iter())
            .map(|(n, t)| Column::new(n, *t, n.len().max(8)))
            .collect();
        Table::new(name, columns)
    }

    /// Sets the primary key columns.
    pub fn with_primary_key(mut self, columns: Vec<&str>) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Appends a row of text cells.
    pub fn push_row(&mut self, row: Vec<&str>) {
        self.rows.push(row.iter().map(|c| c.to_string()).collect());
    }

    /// Column names qualified with the table name, in table order.
    pub fn qualified_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.qualified(&self.name).name)
            .collect()
    }

    /// Returns the number of rows.
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Checks if the column is part of the primary key.
    pub fn is_primary_key(&self, column: &str) -> bool {
        let column = crate::strip_table(column);
        self.primary_key.len() == 1 && self.primary_key[0] == column
    }
}
