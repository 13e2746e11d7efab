use crate::optimizer::{Pass, PassContext};
use common::logical_plan::{NodeView, Operator, PipelineNode, QueryTree, Target};
use common::DbError;

/// Collapses each maximal chain of unary operators into one pipelined expression.
///
/// A chain ending at a relation swallows the relation and becomes a leaf. A chain ending at a
/// product, join or earlier pipeline keeps that node as its input. Pipelines are numbered in the
/// order they would be evaluated.
pub struct PipelineSubtrees;

struct Collapser {
    next_index: usize,
}

impl Collapser {
    fn chainable(op: &Operator) -> bool {
        op.is_unary() && !matches!(op, Operator::PipelinedExpression(_))
    }

    fn collapse(&mut self, view: &NodeView<'_>) -> Result<QueryTree, DbError> {
        let op = view.operator();
        if op.is_binary() {
            let mut out = QueryTree::with_root(op.clone());
            for (side, target) in &[(view.left(), Target::Left), (view.right(), Target::Right)] {
                let side = side.as_ref().ok_or_else(|| {
                    DbError::TreeError(format!("{} at {:?} is missing an input", op, view.path()))
                })?;
                let sub = self.collapse(side)?;
                out.add_subtree(&[], *target, &sub)?;
            }
            return Ok(out);
        }
        if !Self::chainable(op) {
            // Relations and existing pipelines stay; only what lies below a pipeline is revisited.
            let mut out = QueryTree::with_root(op.clone());
            if let Some(child) = view.only_child() {
                let sub = self.collapse(&child)?;
                out.add_subtree(&[], Target::Down, &sub)?;
            }
            return Ok(out);
        }

        let mut operators = vec![op.clone()];
        let mut end = view.only_child();
        while let Some(v) = end.clone() {
            if !Self::chainable(v.operator()) {
                break;
            }
            operators.push(v.operator().clone());
            end = v.only_child();
        }
        let end = end.ok_or_else(|| {
            DbError::TreeError(format!("{} at {:?} has no input", op, view.path()))
        })?;
        let input = match end.operator() {
            Operator::Relation(_) => {
                operators.push(end.operator().clone());
                None
            }
            _ => Some(self.collapse(&end)?),
        };
        let index = self.next_index;
        self.next_index += 1;
        let mut out = QueryTree::with_root(Operator::PipelinedExpression(PipelineNode {
            operators,
            index,
        }));
        if let Some(input) = input {
            out.add_subtree(&[], Target::Down, &input)?;
        }
        Ok(out)
    }
}

impl Pass for PipelineSubtrees {
    fn name(&self) -> &str {
        "Pipeline subtrees"
    }

    fn run(&self, tree: &QueryTree, _ctx: &PassContext<'_>) -> Result<QueryTree, DbError> {
        let root = match tree.root_view() {
            Some(root) => root,
            None => return Ok(tree.clone()),
        };
        let first = tree
            .traverse()
            .iter()
            .filter_map(|(op, _)| match op {
                Operator::PipelinedExpression(p) => Some(p.index),
                _ => None,
            })
            .max()
            .map_or(1, |i| i + 1);
        let mut collapser = Collapser { next_index: first };
        let out = collapser.collapse(&root)?;
        debug!("formed {} pipelines", collapser.next_index - first);
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::logical_plan::{Comparator, Condition, Direction};
    use common::testutil::sample_db;

    #[test]
    fn test_pipelines_around_join() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let mut tree = QueryTree::with_root(Operator::projection(vec!["emp.name"]));
        tree.add(&[], Target::Down, Operator::join("emp.dept_id", "dept.id"))
            .unwrap();
        let join = [Direction::Down];
        tree.add(&join, Target::Left, Operator::relation("emp")).unwrap();
        tree.add(&join, Target::Right, Operator::relation("dept"))
            .unwrap();
        tree.add(
            &[Direction::Down, Direction::Left],
            Target::None,
            Operator::selection(Condition::literal("emp.salary", Comparator::GreaterThan, "4000")),
        )
        .unwrap();
        assert_eq!(
            tree.to_algebra(),
            "π[emp.name](σ[emp.salary>4000](emp) ⨝[emp.dept_id=dept.id] dept)"
        );

        let out = PipelineSubtrees.run(&tree, &ctx).unwrap();
        // The bare dept relation needs no pipeline; the root chain is numbered after its input.
        assert_eq!(
            out.to_algebra(),
            "P2{π[emp.name]}(P1{σ[emp.salary>4000] emp} ⨝[emp.dept_id=dept.id] dept)"
        );
        assert_eq!(out.size(), 4);
        out.validate().unwrap();

        let again = PipelineSubtrees.run(&out, &ctx).unwrap();
        assert_eq!(again.to_algebra(), out.to_algebra());
    }

    #[test]
    fn test_numbering_continues() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let mut tree = QueryTree::with_root(Operator::projection(vec!["emp.name"]));
        tree.add(
            &[],
            Target::Down,
            Operator::PipelinedExpression(PipelineNode {
                operators: vec![Operator::relation("emp")],
                index: 4,
            }),
        )
        .unwrap();
        let out = PipelineSubtrees.run(&tree, &ctx).unwrap();
        assert_eq!(out.to_algebra(), "P5{π[emp.name]}(P4{emp})");
    }

    #[test]
    fn test_single_relation() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let tree = QueryTree::with_root(Operator::relation("emp"));
        let out = PipelineSubtrees.run(&tree, &ctx).unwrap();
        assert_eq!(out.to_algebra(), "emp");
        assert!(PipelineSubtrees
            .run(&QueryTree::new(), &ctx)
            .unwrap()
            .is_empty());
    }
}
