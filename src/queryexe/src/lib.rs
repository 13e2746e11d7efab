#[macro_use]
extern crate log;

pub mod query;
pub mod result_set;

pub use query::Executor;
pub use result_set::{ConditionExpr, Connector, ResultSet};
