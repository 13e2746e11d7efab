use crate::catalog::Catalog;
use crate::table::*;
use crate::DbError;
use std::collections::HashMap;

/// The in-memory database: a named set of tables.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Database {
    /// Name of the database.
    pub name: String,
    /// Tables by name.
    pub tables: HashMap<String, Table>,
}

impl Database {
    /// Initialize a new database with a given name.
    ///
    /// # Arguments
    ///
    /// * `name` - Name for the new database.
    pub fn new(name: &str) -> Self {
        Database {
            name: name.to_string(),
            tables: HashMap::new(),
        }
    }

    /// Adds a table, replacing any table of the same name.
    pub fn add_table(&mut self, table: Table) {
        debug!("adding table {} with {} rows", table.name, table.size());
        self.tables.insert(table.name.clone(), table);
    }

    /// Adds a table; errors if the name is taken.
    pub fn create_table(&mut self, table: Table) -> Result<(), DbError> {
        if self.tables.contains_key(&table.name) {
            return Err(DbError::ValidationError(format!(
                "Table {} already exists",
                table.name
            )));
        }
        self.add_table(table);
        Ok(())
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Catalog for Database {
    fn tables(&self) -> &HashMap<String, Table> {
        &self.tables
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::DataType;

    #[test]
    fn test_catalog_lookup() {
        let mut db = Database::new("test");
        let mut t = Table::from_vecs("emp", vec!["id", "name"], vec![DataType::Number, DataType::Char]);
        t.push_row(vec!["1", "ann"]);
        db.add_table(t);
        assert!(db.is_valid_table("emp"));
        assert!(!db.is_valid_table("dept"));
        assert!(db.is_valid_column("emp", "name"));
        assert!(db.is_valid_column("emp", "emp.id"));
        assert!(!db.is_valid_column("emp", "salary"));
        assert_eq!(db.table_size("emp").unwrap(), 1);
        assert!(db.get_table("dept").is_err());
    }

    #[test]
    fn test_create_table_twice() {
        let mut db = Database::new("test");
        let t = Table::from_vecs("emp", vec!["id"], vec![DataType::Number]);
        db.create_table(t.clone()).unwrap();
        assert!(db.create_table(t).is_err());
        assert_eq!(db.table_names(), vec![String::from("emp")]);
    }
}
