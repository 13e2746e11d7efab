use common::catalog::Catalog;
use common::logical_plan::{NodeView, Operator};
use common::{find_column, DbError};

/// Names of the columns the subtree under `view` produces, in output order.
///
/// Relation columns come out qualified (`table.column`), aggregates as `KIND(column)`.
pub fn output_columns(view: &NodeView<'_>, catalog: &dyn Catalog) -> Result<Vec<String>, DbError> {
    let op = view.operator();
    match op {
        Operator::Relation(r) => Ok(catalog.get_table(&r.table)?.qualified_names()),
        Operator::CartesianProduct | Operator::InnerJoin(_) => {
            let (left, right) = match (view.left(), view.right()) {
                (Some(l), Some(r)) => (l, r),
                _ => {
                    return Err(DbError::TreeError(format!(
                        "{} at {:?} is missing an input",
                        op,
                        view.path()
                    )))
                }
            };
            let mut cols = output_columns(&left, catalog)?;
            cols.extend(output_columns(&right, catalog)?);
            Ok(cols)
        }
        Operator::PipelinedExpression(p) => {
            let mut ops = p.operators.iter().rev();
            let mut cols = match p.operators.last() {
                Some(Operator::Relation(r)) => {
                    ops.next();
                    catalog.get_table(&r.table)?.qualified_names()
                }
                _ => input_columns(view, catalog)?,
            };
            for inner in ops {
                cols = apply_unary(inner, cols)?;
            }
            Ok(cols)
        }
        _ => apply_unary(op, input_columns(view, catalog)?),
    }
}

/// Output columns of the only child of `view`.
pub fn input_columns(view: &NodeView<'_>, catalog: &dyn Catalog) -> Result<Vec<String>, DbError> {
    match view.only_child() {
        Some(child) => output_columns(&child, catalog),
        None => Err(DbError::TreeError(format!(
            "{} at {:?} has no input",
            view.operator(),
            view.path()
        ))),
    }
}

/// Columns a unary operator produces from `input`.
pub fn apply_unary(op: &Operator, input: Vec<String>) -> Result<Vec<String>, DbError> {
    match op {
        Operator::Projection(p) => {
            let mut keep = vec![false; input.len()];
            for c in &p.columns {
                match find_column(input.iter().map(|s| s.as_str()), c) {
                    Some(i) => keep[i] = true,
                    None => {
                        return Err(DbError::ColumnError(format!(
                            "Projected column {} is not produced below",
                            c
                        )))
                    }
                }
            }
            Ok(input
                .into_iter()
                .zip(keep.into_iter())
                .filter(|(_, k)| *k)
                .map(|(c, _)| c)
                .collect())
        }
        Operator::Aggregation(a) => {
            let mut cols = Vec::new();
            for g in &a.group_by {
                let i = find_column(input.iter().map(|s| s.as_str()), g).ok_or_else(|| {
                    DbError::ColumnError(format!("Group column {} is not produced below", g))
                })?;
                cols.push(input[i].clone());
            }
            for (kind, c) in &a.aggregates {
                cols.push(kind.output_name(c));
            }
            Ok(cols)
        }
        Operator::SimpleSelection(_)
        | Operator::CompoundSelection(_)
        | Operator::AggregateSelection(_) => Ok(input),
        other => Err(DbError::InternalError(format!("{} is not a unary operator", other))),
    }
}

/// Whether every reference resolves against `columns`.
pub fn produces_all(columns: &[String], references: &[String]) -> bool {
    references
        .iter()
        .all(|r| find_column(columns.iter().map(|s| s.as_str()), r).is_some())
}

#[cfg(test)]
mod test {
    use super::*;
    use common::logical_plan::{Direction, QueryTree, Target};
    use common::testutil::sample_db;

    #[test]
    fn test_output_columns() {
        let db = sample_db();
        let mut tree = QueryTree::with_root(Operator::projection(vec!["dname", "emp.id"]));
        tree.add(&[], Target::Down, Operator::join("emp.dept_id", "dept.id"))
            .unwrap();
        tree.add(&[Direction::Down], Target::Left, Operator::relation("emp"))
            .unwrap();
        tree.add(&[Direction::Down], Target::Right, Operator::relation("dept"))
            .unwrap();

        let join = tree.view(&[Direction::Down]).unwrap();
        assert_eq!(output_columns(&join, &db).unwrap().len(), 8);
        let root = tree.root_view().unwrap();
        assert_eq!(
            output_columns(&root, &db).unwrap(),
            vec!["emp.id", "dept.dname"]
        );
    }

    #[test]
    fn test_missing_column() {
        let db = sample_db();
        let mut tree = QueryTree::with_root(Operator::projection(vec!["budget"]));
        tree.add(&[], Target::Down, Operator::relation("emp")).unwrap();
        assert!(output_columns(&tree.root_view().unwrap(), &db).is_err());
    }
}
