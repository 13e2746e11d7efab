use crate::DbError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An Operator represents one relational-algebra step of a query tree.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Operator {
    Relation(RelationNode),
    Projection(ProjectionNode),
    SimpleSelection(Condition),
    CompoundSelection(CompoundSelectionNode),
    AggregateSelection(AggregateSelectionNode),
    Aggregation(AggregationNode),
    CartesianProduct,
    InnerJoin(JoinNode),
    PipelinedExpression(PipelineNode),
}

/// Relation leaf.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RelationNode {
    /// Table to read.
    pub table: String,
}

/// Projection node.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProjectionNode {
    /// Columns to keep.
    pub columns: Vec<String>,
}

/// AND-ed selection conditions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CompoundSelectionNode {
    pub conditions: Vec<Condition>,
}

/// AND-ed conditions evaluated after aggregation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AggregateSelectionNode {
    pub conditions: Vec<AggregateCondition>,
}

/// Aggregation node.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AggregationNode {
    /// Columns to group by.
    pub group_by: Vec<String>,
    /// Aggregates to compute.
    pub aggregates: Vec<(AggregateKind, String)>,
}

/// JoinNode
/// * left - column of the left input
/// * op - comparison operator
/// * right - column of the right input
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JoinNode {
    pub left: String,
    pub op: Comparator,
    pub right: String,
}

/// A collapsed chain of operators evaluated without materializing intermediates.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PipelineNode {
    /// Operators from the top of the chain down.
    pub operators: Vec<Operator>,
    /// Staging subscript.
    pub index: usize,
}

/// Comparison operators.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equals,
    NotEq,
    GreaterThan,
    LessThan,
    GreaterThanOrEq,
    LessThanOrEq,
}

impl Comparator {
    /// Parse a comparator symbol.
    pub fn from_symbol(symbol: &str) -> Result<Self, DbError> {
        match symbol {
            "=" => Ok(Comparator::Equals),
            "!=" | "<>" => Ok(Comparator::NotEq),
            ">" => Ok(Comparator::GreaterThan),
            "<" => Ok(Comparator::LessThan),
            ">=" => Ok(Comparator::GreaterThanOrEq),
            "<=" => Ok(Comparator::LessThanOrEq),
            _ => Err(DbError::ValidationError(format!(
                "Unknown comparator {}",
                symbol
            ))),
        }
    }

    /// Returns the comparator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Equals => "=",
            Comparator::NotEq => "!=",
            Comparator::GreaterThan => ">",
            Comparator::LessThan => "<",
            Comparator::GreaterThanOrEq => ">=",
            Comparator::LessThanOrEq => "<=",
        }
    }

    /// Do the comparison.
    ///
    /// # Arguments
    ///
    /// * `left` - Left side of the comparison.
    /// * `right` - Right side of the comparison.
    pub fn compare<T: PartialOrd>(&self, left: &T, right: &T) -> bool {
        match self {
            Comparator::Equals => left == right,
            Comparator::NotEq => left != right,
            Comparator::GreaterThan => left > right,
            Comparator::LessThan => left < right,
            Comparator::GreaterThanOrEq => left >= right,
            Comparator::LessThanOrEq => left <= right,
        }
    }

    /// Whether the comparator only tests (in)equality.
    pub fn is_equality(&self) -> bool {
        matches!(self, Comparator::Equals | Comparator::NotEq)
    }

    /// Flip the operator, for when the operands swap sides.
    pub fn flip(&self) -> Self {
        match self {
            Comparator::GreaterThan => Comparator::LessThan,
            Comparator::LessThan => Comparator::GreaterThan,
            Comparator::LessThanOrEq => Comparator::GreaterThanOrEq,
            Comparator::GreaterThanOrEq => Comparator::LessThanOrEq,
            op => *op,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Aggregation operations.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Min,
    Max,
    Avg,
    Count,
    Sum,
}

impl AggregateKind {
    /// Parse an aggregate name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "MIN" => Some(AggregateKind::Min),
            "MAX" => Some(AggregateKind::Max),
            "AVG" => Some(AggregateKind::Avg),
            "COUNT" => Some(AggregateKind::Count),
            "SUM" => Some(AggregateKind::Sum),
            _ => None,
        }
    }

    /// Name of the column an aggregate over `column` produces, `KIND(column)`.
    pub fn output_name(&self, column: &str) -> String {
        format!("{}({})", self, column)
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
            AggregateKind::Avg => "AVG",
            AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
        };
        write!(f, "{}", op_str)
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Operand {
    /// Text-encoded literal, parsed per the compared column's kind.
    Literal(String),
    /// Another column.
    Column(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(l) => write!(f, "{}", l),
            Operand::Column(c) => write!(f, "{}", c),
        }
    }
}

/// `column <op> operand`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: Comparator,
    pub operand: Operand,
}

impl Condition {
    /// Condition against a literal.
    pub fn literal(column: &str, op: Comparator, literal: &str) -> Self {
        Self {
            column: column.to_string(),
            op,
            operand: Operand::Literal(literal.to_string()),
        }
    }

    /// Condition between two columns.
    pub fn columns(column: &str, op: Comparator, other: &str) -> Self {
        Self {
            column: column.to_string(),
            op,
            operand: Operand::Column(other.to_string()),
        }
    }

    /// Columns the condition reads.
    pub fn references(&self) -> Vec<String> {
        let mut refs = vec![self.column.clone()];
        if let Operand::Column(c) = &self.operand {
            refs.push(c.clone());
        }
        refs
    }

    /// The column pair of a column-to-column equality, if this is one.
    pub fn equi_columns(&self) -> Option<(&str, &str)> {
        match (&self.operand, self.op) {
            (Operand::Column(c), Comparator::Equals) => Some((&self.column, c)),
            _ => None,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.column, self.op, self.operand)
    }
}

/// `KIND(column) <op> literal`, evaluated post-aggregation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AggregateCondition {
    pub kind: AggregateKind,
    pub column: String,
    pub op: Comparator,
    pub literal: String,
}

impl AggregateCondition {
    /// The same test expressed over the aggregate's output column.
    pub fn as_condition(&self) -> Condition {
        Condition::literal(&self.output_name(), self.op, &self.literal)
    }

    /// Name of the aggregate output column this condition reads.
    pub fn output_name(&self) -> String {
        self.kind.output_name(&self.column)
    }
}

impl fmt::Display for AggregateCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.output_name(), self.op, self.literal)
    }
}

impl Operator {
    /// Shorthand for a relation leaf.
    pub fn relation(table: &str) -> Self {
        Operator::Relation(RelationNode {
            table: table.to_string(),
        })
    }

    /// Shorthand for a projection.
    pub fn projection(columns: Vec<&str>) -> Self {
        Operator::Projection(ProjectionNode {
            columns: columns.iter().map(|c| c.to_string()).collect(),
        })
    }

    /// Shorthand for a single-condition selection.
    pub fn selection(condition: Condition) -> Self {
        Operator::SimpleSelection(condition)
    }

    /// Shorthand for an equi-join.
    pub fn join(left: &str, right: &str) -> Self {
        Operator::InnerJoin(JoinNode {
            left: left.to_string(),
            op: Comparator::Equals,
            right: right.to_string(),
        })
    }

    /// Column names this operator references.
    ///
    /// Aggregate selections reference their aggregate output columns, `KIND(column)`.
    pub fn references(&self) -> Vec<String> {
        match self {
            Operator::Relation(_) | Operator::CartesianProduct => Vec::new(),
            Operator::Projection(p) => p.columns.clone(),
            Operator::SimpleSelection(c) => c.references(),
            Operator::CompoundSelection(s) => {
                s.conditions.iter().flat_map(|c| c.references()).collect()
            }
            Operator::AggregateSelection(s) => {
                s.conditions.iter().map(|c| c.output_name()).collect()
            }
            Operator::Aggregation(a) => {
                let mut refs = a.group_by.clone();
                for (_, col) in &a.aggregates {
                    if !refs.contains(col) {
                        refs.push(col.clone());
                    }
                }
                refs
            }
            Operator::InnerJoin(j) => vec![j.left.clone(), j.right.clone()],
            Operator::PipelinedExpression(p) => {
                let mut refs: Vec<String> = Vec::new();
                for op in &p.operators {
                    for r in op.references() {
                        if !refs.contains(&r) {
                            refs.push(r);
                        }
                    }
                }
                refs
            }
        }
    }

    /// Operators with no inputs.
    ///
    /// A pipeline ending at a relation is a leaf as well.
    pub fn is_leaf(&self) -> bool {
        match self {
            Operator::Relation(_) => true,
            Operator::PipelinedExpression(p) => {
                matches!(p.operators.last(), Some(Operator::Relation(_)))
            }
            _ => false,
        }
    }

    /// Operators reading two inputs.
    pub fn is_binary(&self) -> bool {
        matches!(self, Operator::CartesianProduct | Operator::InnerJoin(_))
    }

    /// Operators reading a single input.
    pub fn is_unary(&self) -> bool {
        !self.is_leaf() && !self.is_binary()
    }

    /// Any selection variant.
    pub fn is_selection(&self) -> bool {
        matches!(
            self,
            Operator::SimpleSelection(_)
                | Operator::CompoundSelection(_)
                | Operator::AggregateSelection(_)
        )
    }
}

fn join_conditions<T: fmt::Display>(conds: &[T]) -> String {
    conds
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<String>>()
        .join(" ∧ ")
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Relation(r) => write!(f, "{}", r.table),
            Operator::Projection(p) => write!(f, "π[{}]", p.columns.join(",")),
            Operator::SimpleSelection(c) => write!(f, "σ[{}]", c),
            Operator::CompoundSelection(s) => write!(f, "σ[{}]", join_conditions(&s.conditions)),
            Operator::AggregateSelection(s) => {
                write!(f, "σ[{}]", join_conditions(&s.conditions))
            }
            Operator::Aggregation(a) => {
                let aggs: Vec<String> = a
                    .aggregates
                    .iter()
                    .map(|(k, c)| k.output_name(c))
                    .collect();
                if a.group_by.is_empty() {
                    write!(f, "𝒢[{}]", aggs.join(","))
                } else {
                    write!(f, "{}𝒢[{}]", a.group_by.join(","), aggs.join(","))
                }
            }
            Operator::CartesianProduct => write!(f, "×"),
            Operator::InnerJoin(j) => write!(f, "⨝[{}{}{}]", j.left, j.op, j.right),
            Operator::PipelinedExpression(p) => {
                let ops: Vec<String> = p.operators.iter().map(|o| o.to_string()).collect();
                write!(f, "P{}{{{}}}", p.index, ops.join(" "))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_references() {
        let op = Operator::CompoundSelection(CompoundSelectionNode {
            conditions: vec![
                Condition::literal("a", Comparator::Equals, "1"),
                Condition::columns("x.c", Comparator::Equals, "y.c"),
            ],
        });
        assert_eq!(op.references(), vec!["a", "x.c", "y.c"]);
        assert!(Operator::CartesianProduct.references().is_empty());
        assert!(Operator::relation("t").references().is_empty());

        let agg = Operator::Aggregation(AggregationNode {
            group_by: vec![String::from("dept")],
            aggregates: vec![
                (AggregateKind::Sum, String::from("qty")),
                (AggregateKind::Max, String::from("qty")),
            ],
        });
        assert_eq!(agg.references(), vec!["dept", "qty"]);

        let having = Operator::AggregateSelection(AggregateSelectionNode {
            conditions: vec![AggregateCondition {
                kind: AggregateKind::Sum,
                column: String::from("qty"),
                op: Comparator::GreaterThan,
                literal: String::from("3"),
            }],
        });
        assert_eq!(having.references(), vec!["SUM(qty)"]);
    }

    #[test]
    fn test_arity() {
        assert!(Operator::relation("t").is_leaf());
        assert!(Operator::CartesianProduct.is_binary());
        assert!(Operator::join("a.x", "b.x").is_binary());
        assert!(Operator::projection(vec!["a"]).is_unary());
        let leaf_pipe = Operator::PipelinedExpression(PipelineNode {
            operators: vec![Operator::projection(vec!["a"]), Operator::relation("t")],
            index: 1,
        });
        assert!(leaf_pipe.is_leaf());
        let pipe = Operator::PipelinedExpression(PipelineNode {
            operators: vec![Operator::projection(vec!["a"])],
            index: 2,
        });
        assert!(pipe.is_unary());
    }

    #[test]
    fn test_comparator() {
        for sym in &["=", "!=", ">", "<", ">=", "<="] {
            assert_eq!(Comparator::from_symbol(sym).unwrap().symbol(), *sym);
        }
        assert!(Comparator::from_symbol("~").is_err());
        assert!(Comparator::GreaterThan.compare(&2.0, &1.0));
        assert!(Comparator::LessThanOrEq.compare(&1, &1));
        assert_eq!(Comparator::GreaterThan.flip(), Comparator::LessThan);
    }

    #[test]
    fn test_display() {
        let sel = Operator::selection(Condition::literal("a", Comparator::Equals, "1"));
        assert_eq!(sel.to_string(), "σ[a=1]");
        assert_eq!(Operator::join("x.c", "y.c").to_string(), "⨝[x.c=y.c]");
        assert_eq!(Operator::projection(vec!["a", "b"]).to_string(), "π[a,b]");
        assert_eq!(AggregateKind::Sum.output_name("qty"), "SUM(qty)");
    }
}
