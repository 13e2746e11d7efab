//! The rewrite passes, one module each.
mod build;
mod cascade;
mod form_joins;
mod pipeline;
mod pushdown_projections;
mod pushdown_selections;
mod rearrange_joins;

pub use build::BuildPass;
pub use cascade::CascadeSelections;
pub use form_joins::FormJoins;
pub use pipeline::PipelineSubtrees;
pub use pushdown_projections::PushDownProjections;
pub use pushdown_selections::PushDownSelections;
pub use rearrange_joins::RearrangeJoins;

#[cfg(test)]
pub(crate) mod test_trees {
    use common::logical_plan::{Comparator, Condition, Direction, Operator, QueryTree, Target};

    /// `sel(left × right)`, built through the path API.
    pub fn selection_over_product(sel: Condition, left: &str, right: &str) -> QueryTree {
        let mut tree = QueryTree::with_root(Operator::selection(sel));
        tree.add(&[], Target::Down, Operator::CartesianProduct)
            .unwrap();
        tree.add(&[Direction::Down], Target::Left, Operator::relation(left))
            .unwrap();
        tree.add(&[Direction::Down], Target::Right, Operator::relation(right))
            .unwrap();
        tree
    }

    pub fn eq(left: &str, right: &str) -> Condition {
        Condition::columns(left, Comparator::Equals, right)
    }
}
