//! Fixtures shared by the end-to-end benchmarks.
use common::database::Database;
use common::statement::Statement;
use common::testutil::random_table;
use optimizer::OptimizerConfig;
use queryexe::Executor;

/// Joins three tables; written with the largest table first.
pub const THREE_WAY: &str = "select testA.a, testC.b from testA, testB, testC \
     where testA.b = testB.a and testB.b = testC.a and testA.a > 2";

/// Three tables whose sizes differ enough for the join order to matter.
pub fn three_tables(rows: usize) -> Database {
    let mut db = Database::new("bench");
    db.add_table(random_table("testA", vec!["a", "b"], rows, 50, 1));
    db.add_table(random_table("testB", vec!["a", "b"], rows / 10 + 1, 50, 2));
    db.add_table(random_table("testC", vec!["a", "b"], rows / 2 + 1, 50, 3));
    db
}

/// Optimizes and runs `sql`, returning the number of result rows (0 on error).
pub fn run_query(db: &Database, sql: &str, rearrange_joins: bool) -> usize {
    let stmt = Statement::select(sql);
    match Executor::run(&stmt, db, OptimizerConfig { rearrange_joins }) {
        Ok((_, rs)) => rs.len(),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_join_order_does_not_change_rows() {
        let db = three_tables(40);
        assert_eq!(
            run_query(&db, THREE_WAY, true),
            run_query(&db, THREE_WAY, false)
        );
    }
}
