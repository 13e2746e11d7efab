//! Row-count guesses used to order joins.
use crate::columns::output_columns;
use common::catalog::Catalog;
use common::logical_plan::{Comparator, NodeView, Operator};
use common::{find_column, strip_table, DbError};

/// Fraction of rows expected to pass a comparison.
pub fn selectivity(op: Comparator) -> f64 {
    match op {
        Comparator::Equals => 0.1,
        Comparator::NotEq => 0.9,
        _ => 1.0 / 3.0,
    }
}

/// Estimated size of the join of two inputs on `left <op> right`.
///
/// An equality on a column that is a table's primary key can match each row of the other side
/// at most once, so the other side's size is the estimate.
pub fn join_size(
    left_rows: f64,
    right_rows: f64,
    op: Comparator,
    left_is_key: bool,
    right_is_key: bool,
) -> f64 {
    if op == Comparator::Equals {
        if right_is_key {
            return left_rows;
        }
        if left_is_key {
            return right_rows;
        }
    }
    left_rows * right_rows * selectivity(op)
}

/// Whether `column` is the single-column primary key of a table in the catalog.
///
/// Only qualified names can be traced back to their table.
pub fn is_primary_key(catalog: &dyn Catalog, column: &str) -> bool {
    match column.split_once('.') {
        Some((table, _)) if !column.contains('(') => catalog
            .get_table(table)
            .map(|t| t.is_primary_key(strip_table(column)))
            .unwrap_or(false),
        _ => false,
    }
}

/// Estimated number of rows the subtree under `view` produces.
pub fn estimate_rows(view: &NodeView<'_>, catalog: &dyn Catalog) -> Result<f64, DbError> {
    let op = view.operator();
    let input = || match view.only_child() {
        Some(child) => estimate_rows(&child, catalog),
        None => Err(DbError::TreeError(format!("{} has no input", op))),
    };
    match op {
        Operator::Relation(r) => Ok(catalog.table_size(&r.table)? as f64),
        Operator::Projection(_) => input(),
        Operator::SimpleSelection(c) => Ok(input()? * selectivity(c.op)),
        Operator::CompoundSelection(s) => Ok(s
            .conditions
            .iter()
            .fold(input()?, |rows, c| rows * selectivity(c.op))),
        Operator::AggregateSelection(s) => Ok(s
            .conditions
            .iter()
            .fold(input()?, |rows, c| rows * selectivity(c.op))),
        Operator::Aggregation(a) => {
            if a.group_by.is_empty() {
                Ok(1.0)
            } else {
                input()
            }
        }
        Operator::CartesianProduct | Operator::InnerJoin(_) => {
            let (l, r) = match (view.left(), view.right()) {
                (Some(l), Some(r)) => (l, r),
                _ => return Err(DbError::TreeError(format!("{} is missing an input", op))),
            };
            let (lr, rr) = (estimate_rows(&l, catalog)?, estimate_rows(&r, catalog)?);
            match op {
                Operator::InnerJoin(j) => {
                    let lcols = output_columns(&l, catalog)?;
                    let rcols = output_columns(&r, catalog)?;
                    let key = |cols: &[String], name: &str| {
                        find_column(cols.iter().map(|s| s.as_str()), name)
                            .map(|i| is_primary_key(catalog, &cols[i]))
                            .unwrap_or(false)
                    };
                    Ok(join_size(
                        lr,
                        rr,
                        j.op,
                        key(&lcols, &j.left),
                        key(&rcols, &j.right),
                    ))
                }
                _ => Ok(lr * rr),
            }
        }
        Operator::PipelinedExpression(p) => {
            let mut ops = p.operators.iter().rev();
            let mut rows = match p.operators.last() {
                Some(Operator::Relation(r)) => {
                    ops.next();
                    catalog.table_size(&r.table)? as f64
                }
                _ => input()?,
            };
            for inner in ops {
                rows = match inner {
                    Operator::SimpleSelection(c) => rows * selectivity(c.op),
                    Operator::CompoundSelection(s) => s
                        .conditions
                        .iter()
                        .fold(rows, |acc, c| acc * selectivity(c.op)),
                    Operator::Aggregation(a) if a.group_by.is_empty() => 1.0,
                    _ => rows,
                };
            }
            Ok(rows)
        }
    }
}
