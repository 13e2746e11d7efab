#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

pub mod columns;
pub mod estimate;
pub mod optimizer;
pub mod passes;

pub use crate::optimizer::{OptimizedPlan, Optimizer, OptimizerConfig, Pass, PassContext, PassSnapshot};
