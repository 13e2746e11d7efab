use common::database::Database;
use common::table::{ForeignKey, Table};
use common::{Column, DataType, DbError};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// One table of a catalog file. Rows come from `csv`, relative to the catalog file.
#[derive(Deserialize, Debug)]
struct TableEntry {
    name: String,
    columns: Vec<Column>,
    #[serde(default)]
    primary_key: Vec<String>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKey>,
    csv: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CatalogFile {
    name: String,
    tables: Vec<TableEntry>,
}

/// Loads a JSON catalog and the CSV data of each of its tables.
pub fn load_catalog(path: &str) -> Result<Database, DbError> {
    let contents = fs::read_to_string(path)?;
    let file: CatalogFile = serde_json::from_str(&contents)?;
    let base = Path::new(path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(PathBuf::new);

    let mut db = Database::new(&file.name);
    for entry in file.tables {
        let mut table = Table::new(&entry.name, entry.columns);
        table.primary_key = entry.primary_key;
        table.foreign_keys = entry.foreign_keys;
        if let Some(csv_path) = &entry.csv {
            import_csv(&mut table, &base.join(csv_path))?;
        }
        db.create_table(table)?;
    }
    info!("Loaded catalog {} with tables {:?}", db.name, db.table_names());
    Ok(db)
}

/// Appends the rows of a header-less csv file to `table`.
///
/// Records with the wrong number of fields, or text in a NUMBER column, are skipped.
pub fn import_csv(table: &mut Table, path: &Path) -> Result<usize, DbError> {
    debug!("importing {:?} into {}", path, table.name);
    let file = File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut imported = 0;
    for (line, result) in rdr.records().enumerate() {
        let rec = match result {
            Ok(rec) => rec,
            Err(e) => {
                error!("Could not read row {} of {:?}: {}", line + 1, path, e);
                continue;
            }
        };
        if rec.len() != table.columns.len() {
            error!(
                "Row {} of {:?} has {} fields, {} expects {}",
                line + 1,
                path,
                rec.len(),
                table.name,
                table.columns.len()
            );
            continue;
        }
        let bad_number = rec
            .iter()
            .zip(table.columns.iter())
            .any(|(v, c)| c.dtype == DataType::Number && v.parse::<f64>().is_err());
        if bad_number {
            error!("Row {} of {:?} has text in a NUMBER column", line + 1, path);
            continue;
        }
        table.rows.push(rec.iter().map(|v| v.to_string()).collect());
        imported += 1;
    }
    info!("Num records imported into {}: {}", table.name, imported);
    Ok(imported)
}

#[cfg(test)]
mod test {
    use super::*;
    use common::catalog::Catalog;
    use std::env;
    use std::io::Write;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_catalog() {
        let dir = env::temp_dir().join(format!("crusty-catalog-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        write(&dir, "emp.csv", "1, Ann, 10\n2,bob,10\nx,bad,1\n3,Cid\n");
        let catalog = write(
            &dir,
            "catalog.json",
            r#"{
                "name": "shop",
                "tables": [
                    {
                        "name": "emp",
                        "columns": [
                            {"name": "id", "dtype": "Number", "width": 4},
                            {"name": "name", "dtype": "Char", "width": 10},
                            {"name": "dept_id", "dtype": "Number", "width": 7}
                        ],
                        "primary_key": ["id"],
                        "csv": "emp.csv"
                    },
                    {
                        "name": "dept",
                        "columns": [{"name": "id", "dtype": "Number", "width": 4}]
                    }
                ]
            }"#,
        );

        let db = load_catalog(catalog.to_str().unwrap()).unwrap();
        assert_eq!(db.table_names(), vec!["dept", "emp"]);
        let emp = db.get_table("emp").unwrap();
        assert_eq!(emp.rows, vec![vec!["1", "Ann", "10"], vec!["2", "bob", "10"]]);
        assert!(emp.is_primary_key("id"));
        assert_eq!(db.table_size("dept").unwrap(), 0);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_files() {
        assert!(load_catalog("/nonexistent/catalog.json").is_err());
        let mut table = Table::new("t", Vec::new());
        assert!(import_csv(&mut table, Path::new("/nonexistent/t.csv")).is_err());
    }
}
