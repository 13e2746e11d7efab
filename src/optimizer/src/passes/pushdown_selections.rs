use crate::columns::{input_columns, output_columns, produces_all};
use crate::optimizer::{Pass, PassContext};
use common::catalog::Catalog;
use common::logical_plan::{Direction, Operator, QueryTree, Target};
use common::DbError;

/// Moves each single-condition selection as close to the relations as its columns allow.
///
/// A selection sinks below projections and aggregations whose input still carries the columns it
/// reads, and into whichever input of a product or join produces all of them. Selections are
/// only ever moved past other operators, never reordered among themselves.
pub struct PushDownSelections;

/// Where a selection moves: into `target` of the node at `path`.
struct Move {
    from: Vec<Direction>,
    path: Vec<Direction>,
    target: Target,
}

fn next_move(tree: &QueryTree, catalog: &dyn Catalog) -> Result<Option<Move>, DbError> {
    for (op, from) in tree.traverse() {
        if !matches!(op, Operator::SimpleSelection(_)) {
            continue;
        }
        let refs = op.references();
        let mut below = tree.view(&from)?.only_child();
        while let Some(v) = below.clone() {
            if !v.operator().is_selection() {
                break;
            }
            below = v.only_child();
        }
        let blocker = match below {
            Some(v) => v,
            None => continue,
        };
        let target = match blocker.operator() {
            Operator::Projection(_) | Operator::Aggregation(_) => {
                if produces_all(&input_columns(&blocker, catalog)?, &refs) {
                    Some(Target::Down)
                } else {
                    None
                }
            }
            Operator::CartesianProduct | Operator::InnerJoin(_) => {
                match (blocker.left(), blocker.right()) {
                    (Some(l), Some(r)) => {
                        if produces_all(&output_columns(&l, catalog)?, &refs) {
                            Some(Target::Left)
                        } else if produces_all(&output_columns(&r, catalog)?, &refs) {
                            Some(Target::Right)
                        } else {
                            None
                        }
                    }
                    _ => None,
                }
            }
            _ => None,
        };
        if let Some(target) = target {
            return Ok(Some(Move {
                from,
                path: blocker.path().to_vec(),
                target,
            }));
        }
    }
    Ok(None)
}

impl Pass for PushDownSelections {
    fn name(&self) -> &str {
        "Push down selections"
    }

    fn run(&self, tree: &QueryTree, ctx: &PassContext<'_>) -> Result<QueryTree, DbError> {
        let mut out = tree.clone();
        let mut moves = 0;
        while let Some(m) = next_move(&out, ctx.catalog)? {
            let selection = out.get(&m.from, Target::None)?.clone();
            // The destination lies below the selection, so inserting first keeps `from` valid.
            out.add(&m.path, m.target, selection)?;
            out.remove(&m.from, Target::None)?;
            moves += 1;
        }
        debug!("moved selections {} times", moves);
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::passes::test_trees::*;
    use common::logical_plan::{AggregateKind, AggregationNode, Comparator, Condition};
    use common::testutil::sample_db;

    #[test]
    fn test_push_into_product_sides() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let mut tree = selection_over_product(eq("emp.dept_id", "dept.id"), "emp", "dept");
        tree.add(
            &[Direction::Down],
            Target::None,
            Operator::selection(Condition::literal("budget", Comparator::GreaterThan, "90000")),
        )
        .unwrap();
        tree.add(
            &[],
            Target::Up,
            Operator::selection(Condition::literal("emp.salary", Comparator::GreaterThan, "4000")),
        )
        .unwrap();
        assert_eq!(
            tree.to_algebra(),
            "σ[emp.salary>4000](σ[emp.dept_id=dept.id](σ[budget>90000](emp × dept)))"
        );

        let out = PushDownSelections.run(&tree, &ctx).unwrap();
        assert_eq!(
            out.to_algebra(),
            "σ[emp.dept_id=dept.id](σ[emp.salary>4000](emp) × σ[budget>90000](dept))"
        );
        assert_eq!(out.size(), tree.size());
        out.validate().unwrap();
        let again = PushDownSelections.run(&out, &ctx).unwrap();
        assert_eq!(again.to_algebra(), out.to_algebra());
    }

    #[test]
    fn test_push_below_projection_and_grouping() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let mut tree = QueryTree::with_root(Operator::selection(Condition::literal(
            "sales.region",
            Comparator::Equals,
            "north",
        )));
        tree.add(
            &[],
            Target::Down,
            Operator::selection(Condition::literal(
                "SUM(sales.qty)",
                Comparator::GreaterThan,
                "2",
            )),
        )
        .unwrap();
        tree.add(
            &[Direction::Down],
            Target::Down,
            Operator::Aggregation(AggregationNode {
                group_by: vec![String::from("sales.region")],
                aggregates: vec![(AggregateKind::Sum, String::from("sales.qty"))],
            }),
        )
        .unwrap();
        tree.add(
            &[Direction::Down, Direction::Down],
            Target::Down,
            Operator::projection(vec!["sales.region", "sales.qty"]),
        )
        .unwrap();
        tree.add(
            &[Direction::Down, Direction::Down, Direction::Down],
            Target::Down,
            Operator::relation("sales"),
        )
        .unwrap();

        let out = PushDownSelections.run(&tree, &ctx).unwrap();
        assert_eq!(
            out.to_algebra(),
            "σ[SUM(sales.qty)>2](sales.region𝒢[SUM(sales.qty)](π[sales.region,sales.qty](σ[sales.region=north](sales))))"
        );
    }
}
