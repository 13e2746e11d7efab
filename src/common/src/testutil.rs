use crate::database::Database;
use crate::table::{ForeignKey, Table};
use crate::{Column, DataType};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{thread_rng, Rng, SeedableRng};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn gen_rand_string(n: usize) -> String {
    thread_rng()
        .sample_iter(Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

/// Fixture database.
///
/// * `emp(id, name, dept_id, salary, hired)`, primary key `id`
/// * `dept(id, dname, budget)`, primary key `id`
/// * `sales(emp_id, qty, region)`
pub fn sample_db() -> Database {
    let mut emp = Table::new(
        "emp",
        vec![
            Column::new("id", DataType::Number, 4),
            Column::new("name", DataType::Char, 10),
            Column::new("dept_id", DataType::Number, 7),
            Column::new("salary", DataType::Number, 8),
            Column::new("hired", DataType::Date, 10),
        ],
    )
    .with_primary_key(vec!["id"]);
    emp.foreign_keys.push(ForeignKey {
        column: String::from("dept_id"),
        ref_table: String::from("dept"),
        ref_column: String::from("id"),
    });
    emp.push_row(vec!["1", "Ann", "10", "5200", "2019-03-01"]);
    emp.push_row(vec!["2", "bob", "10", "4100", "2020-07-15"]);
    emp.push_row(vec!["3", "Cid", "20", "6100", "2018-11-30"]);
    emp.push_row(vec!["4", "Dee", "30", "3900", "2021-01-04"]);
    emp.push_row(vec!["5", "eve", "20", "4800", "2020-02-29"]);

    let mut dept = Table::new(
        "dept",
        vec![
            Column::new("id", DataType::Number, 4),
            Column::new("dname", DataType::Char, 12),
            Column::new("budget", DataType::Number, 8),
        ],
    )
    .with_primary_key(vec!["id"]);
    dept.push_row(vec!["10", "Sales", "100000"]);
    dept.push_row(vec!["20", "Research", "250000"]);
    dept.push_row(vec!["30", "Support", "80000"]);

    let mut sales = Table::new(
        "sales",
        vec![
            Column::new("emp_id", DataType::Number, 6),
            Column::new("qty", DataType::Number, 5),
            Column::new("region", DataType::Char, 8),
        ],
    );
    sales.foreign_keys.push(ForeignKey {
        column: String::from("emp_id"),
        ref_table: String::from("emp"),
        ref_column: String::from("id"),
    });
    for (e, q, r) in &[
        ("1", "3", "north"),
        ("1", "7", "south"),
        ("2", "2", "north"),
        ("3", "9", "east"),
        ("3", "1", "north"),
        ("5", "4", "west"),
        ("5", "6", "south"),
    ] {
        sales.push_row(vec![*e, *q, *r]);
    }

    let mut db = Database::new("sample");
    db.add_table(emp);
    db.add_table(dept);
    db.add_table(sales);
    db
}

/// Creates a table of NUMBER columns filled with values in `0..max_val`.
pub fn random_table(name: &str, columns: Vec<&str>, rows: usize, max_val: i32, seed: u64) -> Table {
    let mut rng = StdRng::seed_from_u64(seed);
    let dtypes = vec![DataType::Number; columns.len()];
    let mut table = Table::from_vecs(name, columns, dtypes);
    for _ in 0..rows {
        let row = (0..table.columns.len())
            .map(|_| rng.gen_range(0..max_val).to_string())
            .collect();
        table.rows.push(row);
    }
    table
}

/// Compares two relations as bags of rows, ignoring row order and column order.
///
/// Columns are lined up by name, so both sides must carry the same column names.
pub fn compare_unordered_rows(
    a_names: &[String],
    a_rows: &[Vec<String>],
    b_names: &[String],
    b_rows: &[Vec<String>],
) -> bool {
    // Quick check
    if a_names.len() != b_names.len() || a_rows.len() != b_rows.len() {
        return false;
    }
    let mut order = Vec::with_capacity(a_names.len());
    for name in a_names {
        match b_names.iter().position(|n| n == name) {
            Some(i) => order.push(i),
            None => return false,
        }
    }
    let mut b: Vec<Vec<String>> = b_rows
        .iter()
        .map(|row| order.iter().map(|i| row[*i].clone()).collect())
        .collect();

    for x in a_rows {
        match b.iter().position(|y| y == x) {
            None => {
                //Was not found, not equal
                return false;
            }
            Some(idx) => {
                b.swap_remove(idx);
            }
        }
    }
    //since they are the same size, b should be empty
    b.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_compare() {
        let mut rng = thread_rng();
        let a = random_table("a", vec!["x", "y"], 50, 10, 7);
        let a_names = a.qualified_names();
        let mut b = a.rows.clone();
        b.shuffle(&mut rng);
        assert!(compare_unordered_rows(&a_names, &a.rows, &a_names, &b));

        // Same data with the columns swapped.
        let swapped: Vec<Vec<String>> = b.iter().map(|r| vec![r[1].clone(), r[0].clone()]).collect();
        let swapped_names = vec![a_names[1].clone(), a_names[0].clone()];
        assert!(compare_unordered_rows(&a_names, &a.rows, &swapped_names, &swapped));

        let mut c = a.rows.clone();
        c.pop();
        assert!(!compare_unordered_rows(&a_names, &a.rows, &a_names, &c));
        c.push(vec![gen_rand_string(3), String::from("0")]);
        assert!(!compare_unordered_rows(&a_names, &a.rows, &a_names, &c));
        assert!(!compare_unordered_rows(&a_names, &a.rows, &names(&["p", "q"]), &a.rows));
    }

    #[test]
    fn test_random_table_is_seeded() {
        let a = random_table("a", vec!["x"], 20, 100, 42);
        let b = random_table("a", vec!["x"], 20, 100, 42);
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.size(), 20);
    }

    #[test]
    fn test_sample_db() {
        let db = sample_db();
        assert_eq!(db.table_names(), names(&["dept", "emp", "sales"]));
        assert!(db.tables["emp"].is_primary_key("emp.id"));
        assert!(!db.tables["sales"].is_primary_key("emp_id"));
    }
}
