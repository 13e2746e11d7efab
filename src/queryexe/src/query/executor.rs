use crate::result_set::{ConditionExpr, ResultSet};
use common::catalog::Catalog;
use common::logical_plan::{Comparator, Condition, NodeView, Operator, QueryTree};
use common::statement::Statement;
use common::{find_column, DbError};
use optimizer::{OptimizedPlan, Optimizer, OptimizerConfig};

/// Evaluates query trees against a catalog by mapping each operator onto a ResultSet operation.
pub struct Executor;

impl Executor {
    /// Optimizes `statement`, evaluates the final tree and applies its ORDER BY.
    ///
    /// # Arguments
    ///
    /// * `statement` - Tokenized SELECT statement.
    /// * `catalog` - Tables the statement reads.
    /// * `config` - Optimizer knobs.
    pub fn run<T: Catalog>(
        statement: &Statement,
        catalog: &T,
        config: OptimizerConfig,
    ) -> Result<(OptimizedPlan, ResultSet), DbError> {
        let plan = Optimizer::new(catalog, config).optimize(statement)?;
        let tree = plan
            .final_tree()
            .ok_or_else(|| DbError::InternalError(String::from("Optimizer produced no tree")))?;
        let result = Self::execute(tree, catalog);
        let result = match &plan.ordering {
            Some(order) if !result.is_failed() => {
                if find_column(result.columns().iter().map(|c| c.name()), &order.column).is_none()
                {
                    return Err(DbError::ValidationError(format!(
                        "ORDER BY column {} is not selected",
                        order.column
                    )));
                }
                if order.descending {
                    result.order_by_desc(&order.column)
                } else {
                    result.order_by_asc(&order.column)
                }
            }
            _ => result,
        };
        info!("{} rows", result.len());
        Ok((plan, result))
    }

    /// Evaluates `tree` bottom-up.
    ///
    /// A failing operation yields an empty ResultSet carrying its message; operators above it
    /// pass that ResultSet through untouched.
    pub fn execute<T: Catalog>(tree: &QueryTree, catalog: &T) -> ResultSet {
        match tree.root_view() {
            Some(root) => Self::execute_helper(&root, catalog),
            None => ResultSet::failed("Nothing to execute in an empty query tree"),
        }
    }

    fn execute_helper(view: &NodeView<'_>, catalog: &dyn Catalog) -> ResultSet {
        let op = view.operator();
        match op {
            Operator::Relation(_) => Self::apply_leaf(op, catalog),
            Operator::CartesianProduct | Operator::InnerJoin(_) => {
                let (left, right) = match (view.left(), view.right()) {
                    (Some(l), Some(r)) => (
                        Self::execute_helper(&l, catalog),
                        Self::execute_helper(&r, catalog),
                    ),
                    _ => return ResultSet::failed(&format!("{} is missing an input", op)),
                };
                if left.is_failed() {
                    return left;
                }
                if right.is_failed() {
                    return right;
                }
                match op {
                    Operator::InnerJoin(j) if j.op == Comparator::Equals => {
                        left.inner_join(&right, &j.left, &j.right)
                    }
                    Operator::InnerJoin(j) => left
                        .cartesian_product(&right)
                        .selection(&Condition::columns(&j.left, j.op, &j.right)),
                    _ => left.cartesian_product(&right),
                }
            }
            Operator::PipelinedExpression(p) => {
                let mut ops = p.operators.iter().rev().peekable();
                let mut current = match ops.peek() {
                    Some(Operator::Relation(_)) => match ops.next() {
                        Some(rel) => Self::apply_leaf(rel, catalog),
                        None => ResultSet::failed("Empty pipeline"),
                    },
                    _ => match view.only_child() {
                        Some(child) => Self::execute_helper(&child, catalog),
                        None => {
                            return ResultSet::failed(&format!("{} has no input", op));
                        }
                    },
                };
                for inner in ops {
                    if current.is_failed() {
                        break;
                    }
                    current = Self::apply_unary(inner, &current);
                }
                current
            }
            _ => {
                let input = match view.only_child() {
                    Some(child) => Self::execute_helper(&child, catalog),
                    None => return ResultSet::failed(&format!("{} has no input", op)),
                };
                if input.is_failed() {
                    return input;
                }
                Self::apply_unary(op, &input)
            }
        }
    }

    fn apply_leaf(op: &Operator, catalog: &dyn Catalog) -> ResultSet {
        match op {
            Operator::Relation(r) => match catalog.get_table(&r.table) {
                Ok(table) => ResultSet::from_table(table),
                Err(e) => ResultSet::failed(&e.to_string()),
            },
            other => ResultSet::failed(&format!("{} is not a relation", other)),
        }
    }

    /// AND-chains `conditions` into one expression.
    fn conjunction(conditions: Vec<Condition>) -> Option<ConditionExpr> {
        let mut conditions = conditions.into_iter();
        let first = conditions.next()?;
        Some(conditions.fold(ConditionExpr::new(first), |expr, c| expr.and(c)))
    }

    fn apply_unary(op: &Operator, input: &ResultSet) -> ResultSet {
        match op {
            Operator::Projection(p) => input.projection(&p.columns),
            Operator::SimpleSelection(c) => input.selection(c),
            Operator::CompoundSelection(s) => match Self::conjunction(s.conditions.clone()) {
                Some(expr) => input.selection_expr(&expr),
                None => input.clone(),
            },
            Operator::AggregateSelection(s) => {
                let conditions = s.conditions.iter().map(|c| c.as_condition()).collect();
                match Self::conjunction(conditions) {
                    Some(expr) => input.selection_expr(&expr),
                    None => input.clone(),
                }
            }
            Operator::Aggregation(a) => input.aggregate(&a.group_by, &a.aggregates),
            other => ResultSet::failed(&format!("{} does not take a single input", other)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::logical_plan::{
        AggregateKind, AggregationNode, CompoundSelectionNode, Direction, JoinNode,
        PipelineNode, Target,
    };
    use common::testutil::{compare_unordered_rows, sample_db};

    fn rows(rs: &ResultSet) -> Vec<Vec<String>> {
        rs.rows().to_vec()
    }

    #[test]
    fn test_execute_relation_and_projection() {
        let db = sample_db();
        let mut tree = QueryTree::with_root(Operator::projection(vec!["dname"]));
        tree.add(&[], Target::Down, Operator::relation("dept")).unwrap();
        let rs = Executor::execute(&tree, &db);
        assert!(!rs.is_failed());
        assert_eq!(rs.column_names(), vec![String::from("dept.dname")]);
        assert_eq!(rs.len(), 3);
    }

    #[test]
    fn test_execute_join_matches_selection() {
        let db = sample_db();
        let mut joined = QueryTree::with_root(Operator::join("emp.dept_id", "dept.id"));
        joined.add(&[], Target::Left, Operator::relation("emp")).unwrap();
        joined.add(&[], Target::Right, Operator::relation("dept")).unwrap();

        let mut naive = QueryTree::with_root(Operator::selection(Condition::columns(
            "emp.dept_id",
            Comparator::Equals,
            "dept.id",
        )));
        naive.add(&[], Target::Down, Operator::CartesianProduct).unwrap();
        naive.add(&[Direction::Down], Target::Left, Operator::relation("emp"))
            .unwrap();
        naive.add(&[Direction::Down], Target::Right, Operator::relation("dept"))
            .unwrap();

        let a = Executor::execute(&joined, &db);
        let b = Executor::execute(&naive, &db);
        assert_eq!(a.len(), 5);
        assert!(compare_unordered_rows(
            &a.column_names(),
            &rows(&a),
            &b.column_names(),
            &rows(&b)
        ));
    }

    #[test]
    fn test_execute_range_join() {
        let db = sample_db();
        let mut tree = QueryTree::with_root(Operator::InnerJoin(JoinNode {
            left: String::from("emp.dept_id"),
            op: Comparator::GreaterThan,
            right: String::from("dept.id"),
        }));
        tree.add(&[], Target::Left, Operator::relation("emp")).unwrap();
        tree.add(&[], Target::Right, Operator::relation("dept")).unwrap();
        // dept_ids 10, 10, 20, 30, 20 against 10, 20, 30.
        assert_eq!(Executor::execute(&tree, &db).len(), 5);
    }

    #[test]
    fn test_execute_not_equal_join() {
        let db = sample_db();
        let mut tree = QueryTree::with_root(Operator::InnerJoin(JoinNode {
            left: String::from("emp.dept_id"),
            op: Comparator::NotEq,
            right: String::from("dept.id"),
        }));
        tree.add(&[], Target::Left, Operator::relation("emp")).unwrap();
        tree.add(&[], Target::Right, Operator::relation("dept")).unwrap();
        let rs = Executor::execute(&tree, &db);
        // 5 employees times 3 departments, less the 5 matching pairs.
        assert_eq!(rs.len(), 10);
        let names = rs.column_names();
        let (i, j) = (
            names.iter().position(|n| n == "emp.dept_id").unwrap(),
            names.iter().position(|n| n == "dept.id").unwrap(),
        );
        assert!(rs.rows().iter().all(|r| r[i] != r[j]));
    }

    #[test]
    fn test_execute_pipeline_matches_chain() {
        let db = sample_db();
        let agg = Operator::Aggregation(AggregationNode {
            group_by: vec![String::from("sales.region")],
            aggregates: vec![(AggregateKind::Sum, String::from("sales.qty"))],
        });
        let sel = Operator::CompoundSelection(CompoundSelectionNode {
            conditions: vec![Condition::literal("sales.qty", Comparator::GreaterThan, "1")],
        });
        let mut chain = QueryTree::with_root(agg.clone());
        chain.add(&[], Target::Down, sel.clone()).unwrap();
        chain.add(&[Direction::Down], Target::Down, Operator::relation("sales"))
            .unwrap();
        let pipe = QueryTree::with_root(Operator::PipelinedExpression(PipelineNode {
            operators: vec![agg, sel, Operator::relation("sales")],
            index: 1,
        }));

        let a = Executor::execute(&chain, &db);
        let b = Executor::execute(&pipe, &db);
        assert_eq!(a.column_names(), vec!["sales.region", "SUM(sales.qty)"]);
        assert_eq!(rows(&a), rows(&b));
        // The qty of 1 in north is filtered out: north 3+2, south 7+6, east 9, west 4.
        assert_eq!(a.len(), 4);
        assert!(rows(&a).contains(&vec![String::from("north"), String::from("5")]));
    }

    #[test]
    fn test_failure_propagates() {
        let db = sample_db();
        let mut tree = QueryTree::with_root(Operator::projection(vec!["emp.name"]));
        tree.add(
            &[],
            Target::Down,
            Operator::selection(Condition::literal("emp.nope", Comparator::Equals, "1")),
        )
        .unwrap();
        tree.add(&[Direction::Down], Target::Down, Operator::relation("emp"))
            .unwrap();
        let rs = Executor::execute(&tree, &db);
        assert!(rs.is_failed());
        assert!(rs.is_empty());
        assert!(rs.message().unwrap().contains("emp.nope"));

        let missing = QueryTree::with_root(Operator::relation("nope"));
        assert!(Executor::execute(&missing, &db).is_failed());
        assert!(Executor::execute(&QueryTree::new(), &db).is_failed());
    }

    #[test]
    fn test_run_with_ordering() {
        let db = sample_db();
        let stmt = Statement::select(
            "SELECT region, SUM(qty) FROM sales GROUP BY region ORDER BY SUM(qty) DESC",
        );
        let (plan, rs) = Executor::run(&stmt, &db, OptimizerConfig::default()).unwrap();
        assert!(plan.snapshot("Build").is_some());
        let first: Vec<&str> = rs.rows().iter().map(|r| r[0].as_str()).collect();
        assert_eq!(first, vec!["south", "east", "north", "west"]);
    }

    #[test]
    fn test_run_rejects_unselected_ordering() {
        let db = sample_db();
        let stmt = Statement::select("SELECT name FROM emp ORDER BY salary");
        assert!(matches!(
            Executor::run(&stmt, &db, OptimizerConfig::default()),
            Err(DbError::ValidationError(_))
        ));
    }
}
