use crate::optimizer::{Pass, PassContext};
use common::logical_plan::{Condition, Operator, QueryTree, Target};
use common::DbError;

/// Splits AND-ed selections into chains of single-condition selections.
///
/// `σ[c1 ∧ c2](R)` becomes `σ[c1](σ[c2](R))`. HAVING selections become selections over the
/// aggregate output columns.
pub struct CascadeSelections;

impl Pass for CascadeSelections {
    fn name(&self) -> &str {
        "Cascade selections"
    }

    fn run(&self, tree: &QueryTree, _ctx: &PassContext<'_>) -> Result<QueryTree, DbError> {
        let mut out = tree.clone();
        // Back to front, so inserting below a node never moves a node still to be visited.
        for (op, path) in tree.traverse().into_iter().rev() {
            let conditions: Vec<Condition> = match op {
                Operator::CompoundSelection(s) => s.conditions,
                Operator::AggregateSelection(s) => {
                    s.conditions.iter().map(|c| c.as_condition()).collect()
                }
                _ => continue,
            };
            let mut conditions = conditions.into_iter();
            match conditions.next() {
                Some(first) => {
                    out.set(&path, Target::None, Operator::SimpleSelection(first))?;
                    for cond in conditions.rev() {
                        out.add(&path, Target::Down, Operator::SimpleSelection(cond))?;
                    }
                }
                None => {
                    out.remove(&path, Target::None)?;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::logical_plan::{
        AggregateCondition, AggregateKind, AggregateSelectionNode, Comparator,
        CompoundSelectionNode, Direction,
    };
    use common::testutil::sample_db;

    #[test]
    fn test_cascade() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let mut tree = QueryTree::with_root(Operator::projection(vec!["emp.name"]));
        tree.add(
            &[],
            Target::Down,
            Operator::CompoundSelection(CompoundSelectionNode {
                conditions: vec![
                    Condition::literal("emp.id", Comparator::GreaterThan, "1"),
                    Condition::literal("emp.salary", Comparator::LessThan, "5000"),
                    Condition::literal("emp.name", Comparator::NotEq, "bob"),
                ],
            }),
        )
        .unwrap();
        tree.add(&[Direction::Down], Target::Down, Operator::relation("emp"))
            .unwrap();

        let out = CascadeSelections.run(&tree, &ctx).unwrap();
        assert_eq!(
            out.to_algebra(),
            "π[emp.name](σ[emp.id>1](σ[emp.salary<5000](σ[emp.name!=bob](emp))))"
        );
        assert_eq!(out.size(), 5);
        out.validate().unwrap();
        // The input is untouched and a second run changes nothing.
        assert_eq!(tree.size(), 3);
        let again = CascadeSelections.run(&out, &ctx).unwrap();
        assert_eq!(again.to_algebra(), out.to_algebra());
    }

    #[test]
    fn test_cascade_having() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let having = |kind, lit: &str| AggregateCondition {
            kind,
            column: String::from("sales.qty"),
            op: Comparator::GreaterThan,
            literal: lit.to_string(),
        };
        let mut tree = QueryTree::with_root(Operator::AggregateSelection(AggregateSelectionNode {
            conditions: vec![having(AggregateKind::Sum, "5"), having(AggregateKind::Count, "1")],
        }));
        tree.add(&[], Target::Down, Operator::relation("sales")).unwrap();
        let out = CascadeSelections.run(&tree, &ctx).unwrap();
        assert_eq!(
            out.to_algebra(),
            "σ[SUM(sales.qty)>5](σ[COUNT(sales.qty)>1](sales))"
        );
    }
}
