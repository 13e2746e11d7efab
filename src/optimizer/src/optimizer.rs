use crate::passes::{
    BuildPass, CascadeSelections, FormJoins, PipelineSubtrees, PushDownProjections,
    PushDownSelections, RearrangeJoins,
};
use common::catalog::Catalog;
use common::logical_plan::QueryTree;
use common::statement::{Ordering, Statement};
use common::DbError;
use serde_json::json;

/// Optimizer knobs. Pass order is fixed; join rearrangement can be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_rearrange")]
    pub rearrange_joins: bool,
}

fn default_rearrange() -> bool {
    true
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            rearrange_joins: true,
        }
    }
}

/// What a rewrite pass can see besides the tree.
pub struct PassContext<'a> {
    pub catalog: &'a dyn Catalog,
}

/// A tree rewrite. Passes never modify their input; they return a new tree.
pub trait Pass {
    /// Name shown with the pass's snapshot.
    fn name(&self) -> &str;

    /// Runs the pass. A pass with nothing to rewrite returns an unchanged copy.
    fn run(&self, tree: &QueryTree, ctx: &PassContext<'_>) -> Result<QueryTree, DbError>;
}

/// The tree as it stood after one pass.
#[derive(Debug, Clone)]
pub struct PassSnapshot {
    pub name: String,
    pub tree: QueryTree,
}

/// Every pass's snapshot, in pipeline order, and the ordering to apply to the result.
#[derive(Debug, Clone)]
pub struct OptimizedPlan {
    pub snapshots: Vec<PassSnapshot>,
    pub ordering: Option<Ordering>,
}

impl OptimizedPlan {
    /// The tree the last pass produced.
    pub fn final_tree(&self) -> Option<&QueryTree> {
        self.snapshots.last().map(|s| &s.tree)
    }

    /// Snapshot of the pass called `name`.
    pub fn snapshot(&self, name: &str) -> Option<&QueryTree> {
        self.snapshots
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.tree)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let passes: Vec<serde_json::Value> = self
            .snapshots
            .iter()
            .map(|s| {
                json!({
                    "pass": s.name,
                    "algebra": s.tree.to_algebra(),
                    "tree": s.tree.to_json(),
                })
            })
            .collect();
        json!({ "passes": passes, "ordering": self.ordering })
    }
}

/// Heuristic optimizer: builds the naive tree for a statement and rewrites it pass by pass.
pub struct Optimizer<'a, T: Catalog> {
    catalog: &'a T,
    config: OptimizerConfig,
}

impl<'a, T: 'a + Catalog> Optimizer<'a, T> {
    /// Creates a new optimizer.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Tables the statement may read.
    /// * `config` - Optimizer knobs.
    pub fn new(catalog: &'a T, config: OptimizerConfig) -> Self {
        Self { catalog, config }
    }

    /// The rewrite passes, in the order they run.
    pub fn passes(&self) -> Vec<Box<dyn Pass>> {
        let mut passes: Vec<Box<dyn Pass>> = vec![
            Box::new(CascadeSelections),
            Box::new(PushDownSelections),
            Box::new(FormJoins),
        ];
        if self.config.rearrange_joins {
            passes.push(Box::new(RearrangeJoins));
        }
        passes.push(Box::new(PushDownProjections));
        passes.push(Box::new(PipelineSubtrees));
        passes
    }

    /// Builds the naive tree for `statement` and runs every pass over it.
    pub fn optimize(&self, statement: &Statement) -> Result<OptimizedPlan, DbError> {
        let build = BuildPass::new(statement.clauses()?);
        let ctx = PassContext {
            catalog: self.catalog,
        };
        let tree = build.build(&ctx)?;
        let mut plan = self.run_pipeline(BuildPass::NAME, tree)?;
        plan.ordering = build.ordering(&ctx)?;
        Ok(plan)
    }

    /// Runs the rewrite passes over an already built tree.
    ///
    /// The first snapshot is the input tree itself.
    pub fn optimize_tree(&self, tree: QueryTree) -> Result<OptimizedPlan, DbError> {
        self.run_pipeline("Input", tree)
    }

    fn run_pipeline(&self, first: &str, tree: QueryTree) -> Result<OptimizedPlan, DbError> {
        let ctx = PassContext {
            catalog: self.catalog,
        };
        tree.validate()?;
        let mut snapshots = vec![PassSnapshot {
            name: String::from(first),
            tree,
        }];
        for pass in self.passes() {
            let before = match snapshots.last() {
                Some(s) => &s.tree,
                None => break,
            };
            let after = pass.run(before, &ctx)?;
            after.validate()?;
            if after.to_algebra() == before.to_algebra() {
                debug!("{}: nothing to rewrite", pass.name());
            } else {
                debug!("{}: {}", pass.name(), after.to_algebra());
            }
            snapshots.push(PassSnapshot {
                name: String::from(pass.name()),
                tree: after,
            });
        }
        if let Some(last) = snapshots.last() {
            info!(
                "optimized plan has {} nodes: {}",
                last.tree.size(),
                last.tree.to_algebra()
            );
        }
        Ok(OptimizedPlan {
            snapshots,
            ordering: None,
        })
    }
}
