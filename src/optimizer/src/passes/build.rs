use crate::optimizer::PassContext;
use common::logical_plan::{
    AggregateCondition, AggregateKind, AggregateSelectionNode, AggregationNode,
    CompoundSelectionNode, Condition, Operand, Operator, ProjectionNode, QueryTree, Target,
};
use common::statement::{Ordering, SelectClauses, SelectItem};
use common::DbError;

/// Translates the clauses of a SELECT into the naive tree: a left-deep chain of cartesian
/// products over the FROM relations, wrapped by the WHERE selection, the aggregation, the HAVING
/// selection and the outer projection.
///
/// Column references are validated against the FROM relations and qualified as `table.column`.
pub struct BuildPass {
    clauses: SelectClauses,
}

impl BuildPass {
    pub const NAME: &'static str = "Build";

    pub fn new(clauses: SelectClauses) -> Self {
        Self { clauses }
    }

    pub fn name(&self) -> &str {
        Self::NAME
    }

    /// Given a column name, figure out which FROM relation it belongs to.
    ///
    /// # Returns
    ///
    /// The name qualified as `table.column`.
    fn qualify(&self, ctx: &PassContext<'_>, column: &str) -> Result<String, DbError> {
        if let Some((table, col)) = column.split_once('.') {
            if !self.clauses.relations.iter().any(|r| r == table) {
                return Err(DbError::ColumnError(format!(
                    "The field {} names a table missing from the FROM clause",
                    column
                )));
            }
            if !ctx.catalog.is_valid_column(table, col) {
                return Err(DbError::ColumnError(format!(
                    "The field {} is not present in table {}",
                    column, table
                )));
            }
            return Ok(column.to_string());
        }

        let mut found: Option<&String> = None;
        for table in &self.clauses.relations {
            if ctx.catalog.is_valid_column(table, column) {
                if found.is_some() {
                    return Err(DbError::ValidationError(format!(
                        "The field {} could refer to more than one table listed in the query",
                        column
                    )));
                }
                found = Some(table);
            }
        }
        found
            .map(|t| format!("{}.{}", t, column))
            .ok_or_else(|| {
                DbError::ColumnError(format!(
                    "The field {} is not present in tables listed in the query",
                    column
                ))
            })
    }

    fn qualify_condition(&self, ctx: &PassContext<'_>, c: &Condition) -> Result<Condition, DbError> {
        let operand = match &c.operand {
            Operand::Column(other) => Operand::Column(self.qualify(ctx, other)?),
            lit => lit.clone(),
        };
        Ok(Condition {
            column: self.qualify(ctx, &c.column)?,
            op: c.op,
            operand,
        })
    }

    /// Every aggregate the select list and HAVING compute, qualified, without repeats.
    fn aggregates(&self, ctx: &PassContext<'_>) -> Result<Vec<(AggregateKind, String)>, DbError> {
        let mut aggs = Vec::new();
        let requested = self
            .clauses
            .projection
            .iter()
            .filter_map(|item| match item {
                SelectItem::Aggregate(kind, col) => Some((*kind, col)),
                SelectItem::Column(_) => None,
            })
            .chain(self.clauses.having.iter().map(|h| (h.kind, &h.column)));
        for (kind, col) in requested {
            let agg = (kind, self.qualify(ctx, col)?);
            if !aggs.contains(&agg) {
                aggs.push(agg);
            }
        }
        Ok(aggs)
    }

    /// Builds the naive tree.
    pub fn build(&self, ctx: &PassContext<'_>) -> Result<QueryTree, DbError> {
        let relations = &self.clauses.relations;
        for (i, r) in relations.iter().enumerate() {
            ctx.catalog.get_table(r)?;
            if relations[..i].contains(r) {
                return Err(DbError::ValidationError(format!(
                    "Table {} appears twice in the FROM clause",
                    r
                )));
            }
        }
        let first = relations
            .first()
            .ok_or_else(|| DbError::ValidationError(String::from("SELECT without FROM")))?;

        let mut tree = QueryTree::with_root(Operator::relation(first));
        for r in &relations[1..] {
            let mut product = QueryTree::with_root(Operator::CartesianProduct);
            product.add_subtree(&[], Target::Left, &tree)?;
            product.add(&[], Target::Right, Operator::relation(r))?;
            tree = product;
        }

        if !self.clauses.conditions.is_empty() {
            let conditions = self
                .clauses
                .conditions
                .iter()
                .map(|c| self.qualify_condition(ctx, c))
                .collect::<Result<Vec<_>, _>>()?;
            tree.add(
                &[],
                Target::Up,
                Operator::CompoundSelection(CompoundSelectionNode { conditions }),
            )?;
        }

        let aggregates = self.aggregates(ctx)?;
        let group_by = self
            .clauses
            .group_by
            .iter()
            .map(|g| self.qualify(ctx, g))
            .collect::<Result<Vec<_>, _>>()?;
        if !aggregates.is_empty() || !group_by.is_empty() {
            for item in &self.clauses.projection {
                if let SelectItem::Column(c) = item {
                    if !group_by.contains(&self.qualify(ctx, c)?) {
                        return Err(DbError::ValidationError(format!(
                            "Column {} must appear in GROUP BY or inside an aggregate",
                            c
                        )));
                    }
                }
            }
            tree.add(
                &[],
                Target::Up,
                Operator::Aggregation(AggregationNode {
                    group_by,
                    aggregates,
                }),
            )?;
        }

        if !self.clauses.having.is_empty() {
            let conditions = self
                .clauses
                .having
                .iter()
                .map(|h| {
                    Ok(AggregateCondition {
                        kind: h.kind,
                        column: self.qualify(ctx, &h.column)?,
                        op: h.op,
                        literal: h.literal.clone(),
                    })
                })
                .collect::<Result<Vec<_>, DbError>>()?;
            tree.add(
                &[],
                Target::Up,
                Operator::AggregateSelection(AggregateSelectionNode { conditions }),
            )?;
        }

        if !self.clauses.projection.is_empty() {
            let mut columns = Vec::new();
            for item in &self.clauses.projection {
                let name = match item {
                    SelectItem::Column(c) => self.qualify(ctx, c)?,
                    SelectItem::Aggregate(kind, c) => kind.output_name(&self.qualify(ctx, c)?),
                };
                columns.push(name);
            }
            tree.add(
                &[],
                Target::Up,
                Operator::Projection(ProjectionNode { columns }),
            )?;
        }

        debug!("built {}", tree.to_algebra());
        Ok(tree)
    }

    /// The ORDER BY request with its column qualified like the rest of the tree.
    pub fn ordering(&self, ctx: &PassContext<'_>) -> Result<Option<Ordering>, DbError> {
        let order = match &self.clauses.order_by {
            Some(o) => o,
            None => return Ok(None),
        };
        let column = match order.column.split_once('(') {
            Some((kind, rest)) => {
                let kind = AggregateKind::from_name(kind).ok_or_else(|| {
                    DbError::ValidationError(format!("Cannot order by {}", order.column))
                })?;
                kind.output_name(&self.qualify(ctx, rest.trim_end_matches(')'))?)
            }
            None => self.qualify(ctx, &order.column)?,
        };
        Ok(Some(Ordering {
            column,
            descending: order.descending,
        }))
    }
}
