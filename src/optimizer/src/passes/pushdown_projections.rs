use crate::columns::output_columns;
use crate::optimizer::{Pass, PassContext};
use common::catalog::Catalog;
use common::logical_plan::{NodeView, Operator, ProjectionNode, QueryTree, Target};
use common::{column_matches, find_column, DbError};

/// Narrows tuples as early as possible.
///
/// Projections are inserted above relations and above the inputs of products and joins, keeping
/// only the columns something above reads. Existing projections lose the columns nobody above
/// needs. Rows are never de-duplicated.
pub struct PushDownProjections;

/// Columns of `produced` that answer to one of `needed`.
fn wanted(produced: &[String], needed: &[String]) -> Vec<String> {
    produced
        .iter()
        .filter(|c| needed.iter().any(|r| column_matches(c, r)))
        .cloned()
        .collect()
}

/// `needed` plus the operator's own references.
fn with_references(needed: Option<&[String]>, op: &Operator) -> Option<Vec<String>> {
    needed.map(|n| {
        let mut all = n.to_vec();
        for r in op.references() {
            if !all.contains(&r) {
                all.push(r);
            }
        }
        all
    })
}

struct Rewriter<'a> {
    tree: &'a QueryTree,
    catalog: &'a dyn Catalog,
}

impl<'a> Rewriter<'a> {
    fn only_child<'v>(&self, view: &NodeView<'v>) -> Result<NodeView<'v>, DbError> {
        view.only_child().ok_or_else(|| {
            DbError::TreeError(format!("{} at {:?} has no input", view.operator(), view.path()))
        })
    }

    /// Rebuilds the subtree under `view`.
    ///
    /// `needed` lists the columns read above, `None` when all of them are. `covered` is set when
    /// a projection directly above already narrows this subtree.
    fn rewrite(
        &self,
        view: &NodeView<'_>,
        needed: Option<&[String]>,
        covered: bool,
    ) -> Result<QueryTree, DbError> {
        let op = view.operator();
        match op {
            Operator::Relation(_) => {
                let mut out = QueryTree::with_root(op.clone());
                if let (Some(n), false) = (needed, covered) {
                    let produced = output_columns(view, self.catalog)?;
                    let keep = wanted(&produced, n);
                    if !keep.is_empty() && keep.len() < produced.len() {
                        out.add(
                            &[],
                            Target::Up,
                            Operator::Projection(ProjectionNode { columns: keep }),
                        )?;
                    }
                }
                Ok(out)
            }
            Operator::PipelinedExpression(_) => self.tree.subtree(view.path()),
            Operator::Projection(p) => {
                let child = self.only_child(view)?;
                let input = output_columns(&child, self.catalog)?;
                let mut columns = Vec::new();
                let mut below = Vec::new();
                for c in &p.columns {
                    let i = find_column(input.iter().map(|s| s.as_str()), c).ok_or_else(|| {
                        DbError::ColumnError(format!("Projected column {} is not produced", c))
                    })?;
                    let keep = match needed {
                        Some(n) => n.iter().any(|r| r == c || column_matches(&input[i], r)),
                        None => true,
                    };
                    if keep {
                        columns.push(c.clone());
                        below.push(input[i].clone());
                    }
                }
                if columns.is_empty() {
                    columns = p.columns.clone();
                    below = wanted(&input, &columns);
                }
                let mut out = self.rewrite(&child, Some(&below), true)?;
                out.add(
                    &[],
                    Target::Up,
                    Operator::Projection(ProjectionNode { columns }),
                )?;
                Ok(out)
            }
            Operator::Aggregation(_) => {
                let child = self.only_child(view)?;
                let mut out = self.rewrite(&child, Some(&op.references()), false)?;
                out.add(&[], Target::Up, op.clone())?;
                Ok(out)
            }
            Operator::SimpleSelection(_)
            | Operator::CompoundSelection(_)
            | Operator::AggregateSelection(_) => {
                let child = self.only_child(view)?;
                let child_needed = with_references(needed, op);
                let mut out = self.rewrite(&child, child_needed.as_deref(), false)?;
                out.add(&[], Target::Up, op.clone())?;
                Ok(out)
            }
            Operator::CartesianProduct | Operator::InnerJoin(_) => {
                let mut out = QueryTree::with_root(op.clone());
                let here = with_references(needed, op);
                let sides = [(view.left(), Target::Left), (view.right(), Target::Right)];
                for (side, target) in sides.iter() {
                    let side = side.as_ref().ok_or_else(|| {
                        DbError::TreeError(format!("{} is missing an input", op))
                    })?;
                    let sub = match &here {
                        None => self.rewrite(side, None, false)?,
                        Some(n) => {
                            let produced = output_columns(side, self.catalog)?;
                            let keep = wanted(&produced, n);
                            let insert = !matches!(side.operator(), Operator::Projection(_))
                                && !keep.is_empty()
                                && keep.len() < produced.len();
                            let mut sub = self.rewrite(side, Some(&keep), insert)?;
                            if insert {
                                sub.add(
                                    &[],
                                    Target::Up,
                                    Operator::Projection(ProjectionNode { columns: keep }),
                                )?;
                            }
                            sub
                        }
                    };
                    out.add_subtree(&[], *target, &sub)?;
                }
                Ok(out)
            }
        }
    }
}

impl Pass for PushDownProjections {
    fn name(&self) -> &str {
        "Push down projections"
    }

    fn run(&self, tree: &QueryTree, ctx: &PassContext<'_>) -> Result<QueryTree, DbError> {
        let root = match tree.root_view() {
            Some(root) => root,
            None => return Ok(tree.clone()),
        };
        let rewriter = Rewriter {
            tree,
            catalog: ctx.catalog,
        };
        let out = rewriter.rewrite(&root, None, false)?;
        debug!(
            "projections: {} nodes before, {} after",
            tree.size(),
            out.size()
        );
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::logical_plan::{AggregateKind, AggregationNode, Comparator, Condition, Direction};
    use common::testutil::sample_db;

    fn joined() -> QueryTree {
        let mut tree = QueryTree::with_root(Operator::projection(vec!["emp.name"]));
        tree.add(&[], Target::Down, Operator::join("emp.dept_id", "dept.id"))
            .unwrap();
        let join = [Direction::Down];
        tree.add(
            &join,
            Target::Left,
            Operator::selection(Condition::literal("emp.salary", Comparator::GreaterThan, "4000")),
        )
        .unwrap();
        tree.add(&join, Target::Right, Operator::relation("dept"))
            .unwrap();
        tree.add(&[Direction::Down, Direction::Left], Target::Down, Operator::relation("emp"))
            .unwrap();
        tree
    }

    #[test]
    fn test_pushdown_through_join() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let tree = joined();
        assert_eq!(
            tree.to_algebra(),
            "π[emp.name](σ[emp.salary>4000](emp) ⨝[emp.dept_id=dept.id] dept)"
        );
        let out = PushDownProjections.run(&tree, &ctx).unwrap();
        assert_eq!(
            out.to_algebra(),
            "π[emp.name](π[emp.name,emp.dept_id](σ[emp.salary>4000](π[emp.name,emp.dept_id,emp.salary](emp))) ⨝[emp.dept_id=dept.id] π[dept.id](dept))"
        );
        out.validate().unwrap();

        // Nothing more to narrow on a second run.
        let again = PushDownProjections.run(&out, &ctx).unwrap();
        assert_eq!(again.to_algebra(), out.to_algebra());
    }

    #[test]
    fn test_select_star_keeps_everything() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let mut tree = QueryTree::with_root(Operator::join("emp.dept_id", "dept.id"));
        tree.add(&[], Target::Left, Operator::relation("emp")).unwrap();
        tree.add(&[], Target::Right, Operator::relation("dept")).unwrap();
        let out = PushDownProjections.run(&tree, &ctx).unwrap();
        assert_eq!(out.to_algebra(), tree.to_algebra());
    }

    #[test]
    fn test_prunes_below_aggregation() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let mut tree = QueryTree::with_root(Operator::projection(vec!["SUM(sales.qty)"]));
        tree.add(
            &[],
            Target::Down,
            Operator::Aggregation(AggregationNode {
                group_by: vec![String::from("sales.region")],
                aggregates: vec![(AggregateKind::Sum, String::from("sales.qty"))],
            }),
        )
        .unwrap();
        tree.add(
            &[Direction::Down],
            Target::Down,
            Operator::projection(vec!["sales.emp_id", "sales.qty", "sales.region"]),
        )
        .unwrap();
        tree.add(&[Direction::Down, Direction::Down], Target::Down, Operator::relation("sales"))
            .unwrap();
        let out = PushDownProjections.run(&tree, &ctx).unwrap();
        assert_eq!(
            out.to_algebra(),
            "π[SUM(sales.qty)](sales.region𝒢[SUM(sales.qty)](π[sales.qty,sales.region](sales)))"
        );
    }
}
