use crate::columns::output_columns;
use crate::estimate::{estimate_rows, is_primary_key, join_size, selectivity};
use crate::optimizer::{Pass, PassContext};
use common::catalog::Catalog;
use common::logical_plan::{
    Comparator, Condition, Direction, JoinNode, NodeView, Operator, QueryTree, Target,
};
use common::{find_column, DbError};

/// Reorders each group of directly connected products and joins into a left-deep chain,
/// greedily taking the input whose join with what is already joined is estimated smallest.
pub struct RearrangeJoins;

/// An input of a join group: any subtree whose root is not a product or join.
struct Leaf {
    tree: QueryTree,
    columns: Vec<String>,
    rows: f64,
}

/// A join condition with both columns traced to the leaves producing them.
#[derive(Clone)]
struct Predicate {
    left_leaf: usize,
    left: String,
    op: Comparator,
    right_leaf: usize,
    right: String,
}

impl Predicate {
    /// The condition oriented so its left column comes from `joined`, if it links `joined` to
    /// `leaf`.
    fn linking(&self, joined: &[usize], leaf: usize) -> Option<(String, Comparator, String)> {
        if joined.contains(&self.left_leaf) && self.right_leaf == leaf {
            Some((self.left.clone(), self.op, self.right.clone()))
        } else if joined.contains(&self.right_leaf) && self.left_leaf == leaf {
            Some((self.right.clone(), self.op.flip(), self.left.clone()))
        } else {
            None
        }
    }
}

fn collect_group(
    tree: &QueryTree,
    view: &NodeView<'_>,
    catalog: &dyn Catalog,
    leaves: &mut Vec<Leaf>,
    joins: &mut Vec<JoinNode>,
) -> Result<(), DbError> {
    match view.operator() {
        Operator::CartesianProduct | Operator::InnerJoin(_) => {
            for child in &[view.left(), view.right()] {
                let child = child.as_ref().ok_or_else(|| {
                    DbError::TreeError(format!("{} is missing an input", view.operator()))
                })?;
                collect_group(tree, child, catalog, leaves, joins)?;
            }
            // Lower joins first, so they keep their place as joins when conditions pile up.
            if let Operator::InnerJoin(j) = view.operator() {
                joins.push(j.clone());
            }
            Ok(())
        }
        _ => {
            leaves.push(Leaf {
                tree: tree.subtree(view.path())?,
                columns: output_columns(view, catalog)?,
                rows: estimate_rows(view, catalog)?,
            });
            Ok(())
        }
    }
}

/// Index and resolved name of the single leaf producing `column`.
fn trace(leaves: &[Leaf], column: &str) -> Option<(usize, String)> {
    let mut found = None;
    for (i, leaf) in leaves.iter().enumerate() {
        if let Some(c) = find_column(leaf.columns.iter().map(|s| s.as_str()), column) {
            if found.is_some() {
                return None;
            }
            found = Some((i, leaf.columns[c].clone()));
        }
    }
    found
}

/// Greedy left-deep ordering of one join group.
struct Planner<'a> {
    catalog: &'a dyn Catalog,
    leaves: Vec<Leaf>,
    predicates: Vec<Predicate>,
}

impl<'a> Planner<'a> {
    /// Estimated rows of joining the already joined leaves (`rows` of them) with `leaf`.
    fn estimate(&self, joined: &[usize], rows: f64, leaf: usize) -> f64 {
        let mut links = self.predicates.iter().filter_map(|p| p.linking(joined, leaf));
        let leaf_rows = self.leaves[leaf].rows;
        match links.next() {
            None => rows * leaf_rows,
            Some((ours, op, theirs)) => {
                // Key columns only stay unique while they come straight from a single input.
                let ours_key = joined.len() == 1 && is_primary_key(self.catalog, &ours);
                let theirs_key = is_primary_key(self.catalog, &theirs);
                links.fold(
                    join_size(rows, leaf_rows, op, ours_key, theirs_key),
                    |acc, (_, op, _)| acc * selectivity(op),
                )
            }
        }
    }

    /// Joins `leaf` onto `current`, carrying any further linking conditions as selections.
    fn attach(
        &self,
        current: &QueryTree,
        joined: &[usize],
        leaf: usize,
    ) -> Result<QueryTree, DbError> {
        let mut links = self.predicates.iter().filter_map(|p| p.linking(joined, leaf));
        let root = match links.next() {
            Some((left, op, right)) => Operator::InnerJoin(JoinNode { left, op, right }),
            None => Operator::CartesianProduct,
        };
        let mut next = QueryTree::with_root(root);
        next.add_subtree(&[], Target::Left, current)?;
        next.add_subtree(&[], Target::Right, &self.leaves[leaf].tree)?;
        for (left, op, right) in links {
            next.add(
                &[],
                Target::Up,
                Operator::selection(Condition::columns(&left, op, &right)),
            )?;
        }
        Ok(next)
    }

    fn plan(&self) -> Result<QueryTree, DbError> {
        let n = self.leaves.len();
        let mut best: Option<(f64, usize, usize)> = None;
        for i in 0..n {
            for j in (i + 1)..n {
                let est = self.estimate(&[i], self.leaves[i].rows, j);
                if best.map(|(b, _, _)| est < b).unwrap_or(true) {
                    best = Some((est, i, j));
                }
            }
        }
        let (mut rows, first, second) = best.ok_or_else(|| {
            DbError::InternalError(String::from("Join group with fewer than two inputs"))
        })?;
        let mut current = self.attach(&self.leaves[first].tree, &[first], second)?;
        let mut joined = vec![first, second];

        while joined.len() < n {
            let mut next: Option<(f64, usize)> = None;
            for k in (0..n).filter(|k| !joined.contains(k)) {
                let est = self.estimate(&joined, rows, k);
                if next.map(|(b, _)| est < b).unwrap_or(true) {
                    next = Some((est, k));
                }
            }
            let (est, k) = match next {
                Some(choice) => choice,
                None => break,
            };
            current = self.attach(&current, &joined, k)?;
            joined.push(k);
            rows = est;
        }
        debug!("join order {:?}, estimated {} rows", joined, rows);
        Ok(current)
    }
}

/// Builds the reordered subtree for the join group rooted at `path`, or `None` when a join
/// column cannot be traced to exactly one input.
fn rearrange_group(
    tree: &QueryTree,
    path: &[Direction],
    catalog: &dyn Catalog,
) -> Result<Option<QueryTree>, DbError> {
    let mut leaves = Vec::new();
    let mut joins = Vec::new();
    collect_group(tree, &tree.view(path)?, catalog, &mut leaves, &mut joins)?;

    let mut predicates = Vec::new();
    for j in joins {
        match (trace(&leaves, &j.left), trace(&leaves, &j.right)) {
            (Some((li, l)), Some((ri, r))) if li != ri => predicates.push(Predicate {
                left_leaf: li,
                left: l,
                op: j.op,
                right_leaf: ri,
                right: r,
            }),
            _ => {
                debug!("cannot trace join {} to its inputs, keeping order", j.left);
                return Ok(None);
            }
        }
    }
    let planner = Planner {
        catalog,
        leaves,
        predicates,
    };
    planner.plan().map(Some)
}

impl Pass for RearrangeJoins {
    fn name(&self) -> &str {
        "Rearrange joins"
    }

    fn run(&self, tree: &QueryTree, ctx: &PassContext<'_>) -> Result<QueryTree, DbError> {
        let mut out = tree.clone();
        let mut groups = Vec::new();
        for (op, path) in tree.traverse() {
            if !op.is_binary() {
                continue;
            }
            let parent_binary = match path.split_last() {
                Some((_, up)) => tree.view(up)?.operator().is_binary(),
                None => false,
            };
            if !parent_binary {
                groups.push(path);
            }
        }
        // Deepest groups first, so earlier paths stay valid.
        for path in groups.into_iter().rev() {
            if let Some(reordered) = rearrange_group(&out, &path, ctx.catalog)? {
                out.remove_subtree(&path)?;
                out.add_subtree(&path, Target::None, &reordered)?;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::database::Database;
    use common::testutil::{init, random_table, sample_db};

    /// `(a top b) top c`, where `top` and `inner` are the two binary operators.
    fn left_deep(inner: Operator, top: Operator, a: &str, b: &str, c: &str) -> QueryTree {
        let mut tree = QueryTree::with_root(top);
        tree.add(&[], Target::Left, inner).unwrap();
        tree.add(&[], Target::Right, Operator::relation(c)).unwrap();
        tree.add(&[Direction::Left], Target::Left, Operator::relation(a))
            .unwrap();
        tree.add(&[Direction::Left], Target::Right, Operator::relation(b))
            .unwrap();
        tree
    }

    #[test]
    fn test_greedy_order_with_keys() {
        init();
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let tree = left_deep(
            Operator::join("sales.emp_id", "emp.id"),
            Operator::join("emp.dept_id", "dept.id"),
            "sales",
            "emp",
            "dept",
        );
        assert_eq!(
            tree.to_algebra(),
            "(sales ⨝[sales.emp_id=emp.id] emp) ⨝[emp.dept_id=dept.id] dept"
        );

        // emp ⨝ dept keeps emp's 5 rows since dept.id is a key; it goes first.
        let out = RearrangeJoins.run(&tree, &ctx).unwrap();
        assert_eq!(
            out.to_algebra(),
            "(emp ⨝[emp.dept_id=dept.id] dept) ⨝[emp.id=sales.emp_id] sales"
        );
        assert_eq!(out.size(), tree.size());
        out.validate().unwrap();
    }

    #[test]
    fn test_products_smallest_first() {
        let mut db = Database::new("sizes");
        db.add_table(random_table("t1", vec!["a"], 100, 10, 1));
        db.add_table(random_table("t2", vec!["b"], 5, 10, 2));
        db.add_table(random_table("t3", vec!["c"], 50, 10, 3));
        let ctx = PassContext { catalog: &db };

        let mut tree = left_deep(
            Operator::CartesianProduct,
            Operator::CartesianProduct,
            "t1",
            "t2",
            "t3",
        );
        tree.add(&[], Target::Up, Operator::projection(vec!["a", "b"]))
            .unwrap();

        let out = RearrangeJoins.run(&tree, &ctx).unwrap();
        assert_eq!(out.to_algebra(), "π[a,b]((t2 × t3) × t1)");
        let again = RearrangeJoins.run(&out, &ctx).unwrap();
        assert_eq!(again.to_algebra(), out.to_algebra());
    }

    #[test]
    fn test_extra_conditions_become_selections() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        // The upper join only relates emp and dept, so both conditions link the same inputs.
        let tree = left_deep(
            Operator::join("emp.dept_id", "dept.id"),
            Operator::join("emp.id", "dept.id"),
            "emp",
            "dept",
            "sales",
        );
        let out = RearrangeJoins.run(&tree, &ctx).unwrap();
        assert_eq!(
            out.to_algebra(),
            "σ[emp.id=dept.id](emp ⨝[emp.dept_id=dept.id] dept) × sales"
        );
        out.validate().unwrap();
    }

    #[test]
    fn test_untraceable_join_is_kept() {
        let db = sample_db();
        let ctx = PassContext { catalog: &db };
        let tree = left_deep(
            Operator::join("emp.dept_id", "dept.id"),
            Operator::join("id", "sales.emp_id"),
            "emp",
            "dept",
            "sales",
        );
        let out = RearrangeJoins.run(&tree, &ctx).unwrap();
        assert_eq!(out.to_algebra(), tree.to_algebra());
    }
}
