use crate::columns::{output_columns, produces_all};
use crate::optimizer::{Pass, PassContext};
use common::catalog::Catalog;
use common::logical_plan::{Comparator, Direction, JoinNode, Operator, QueryTree, Target};
use common::DbError;

/// Folds `σ[a=b](A × B)` into `A ⨝[a=b] B` when `a` and `b` come from different sides.
///
/// Other selections may sit between the equality and the product. Equalities without a product
/// below them are left where they are.
pub struct FormJoins;

/// A selection at `selection` that becomes `join` at `product`.
struct Fold {
    selection: Vec<Direction>,
    product: Vec<Direction>,
    join: JoinNode,
}

fn next_fold(tree: &QueryTree, catalog: &dyn Catalog) -> Result<Option<Fold>, DbError> {
    // Deepest first, so the equality closest to the product forms the join.
    for (op, path) in tree.traverse().into_iter().rev() {
        let (a, b) = match &op {
            Operator::SimpleSelection(c) => match c.equi_columns() {
                Some((a, b)) => (a.to_string(), b.to_string()),
                None => continue,
            },
            _ => continue,
        };
        let mut below = tree.view(&path)?.only_child();
        while let Some(v) = below.clone() {
            if !v.operator().is_selection() {
                break;
            }
            below = v.only_child();
        }
        let product = match below {
            Some(v) if matches!(v.operator(), Operator::CartesianProduct) => v,
            _ => continue,
        };
        let (left, right) = match (product.left(), product.right()) {
            (Some(l), Some(r)) => (
                output_columns(&l, catalog)?,
                output_columns(&r, catalog)?,
            ),
            _ => continue,
        };
        let side = |cols: &[String], c: &str| produces_all(cols, &[c.to_string()]);
        let (l, r) = if side(&left, &a) && side(&right, &b) {
            (a, b)
        } else if side(&left, &b) && side(&right, &a) {
            (b, a)
        } else {
            continue;
        };
        return Ok(Some(Fold {
            selection: path,
            product: product.path().to_vec(),
            join: JoinNode {
                left: l,
                op: Comparator::Equals,
                right: r,
            },
        }));
    }
    Ok(None)
}

impl Pass for FormJoins {
    fn name(&self) -> &str {
        "Form joins"
    }

    fn run(&self, tree: &QueryTree, ctx: &PassContext<'_>) -> Result<QueryTree, DbError> {
        let mut out = tree.clone();
        let mut formed = 0;
        while let Some(fold) = next_fold(&out, ctx.catalog)? {
            out.set(&fold.product, Target::None, Operator::InnerJoin(fold.join))?;
            out.remove(&fold.selection, Target::None)?;
            formed += 1;
        }
        debug!("formed {} joins", formed);
        Ok(out)
    }
}
