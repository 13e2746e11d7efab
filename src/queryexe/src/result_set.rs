use chrono::NaiveDate;
use common::logical_plan::{AggregateKind, Comparator, Condition, Operand};
use common::table::Table;
use common::{find_column, strip_table, Column, DataType, DbError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// How two conditions of a [`ConditionExpr`] combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connector {
    And,
    Or,
}

/// Flat condition list joined by AND/OR. AND binds tighter than OR; no grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionExpr {
    conditions: Vec<Condition>,
    connectors: Vec<Connector>,
}

impl ConditionExpr {
    pub fn new(first: Condition) -> Self {
        Self {
            conditions: vec![first],
            connectors: Vec::new(),
        }
    }

    pub fn and(mut self, next: Condition) -> Self {
        self.connectors.push(Connector::And);
        self.conditions.push(next);
        self
    }

    pub fn or(mut self, next: Condition) -> Self {
        self.connectors.push(Connector::Or);
        self.conditions.push(next);
        self
    }

    /// Maximal AND-runs, split at OR boundaries.
    fn and_runs(&self) -> Vec<Vec<&Condition>> {
        let mut runs = vec![Vec::new()];
        for (i, cond) in self.conditions.iter().enumerate() {
            if i > 0 && self.connectors[i - 1] == Connector::Or {
                runs.push(Vec::new());
            }
            if let Some(run) = runs.last_mut() {
                run.push(cond);
            }
        }
        runs
    }
}

/// A materialized relation: column descriptors plus row-major text cells.
///
/// Every operation returns a new ResultSet and leaves its inputs untouched. Operations that
/// cannot proceed return an empty ResultSet carrying a message instead of failing the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
    message: Option<String>,
}

fn parse_number(cell: &str) -> Result<f64, DbError> {
    cell.trim()
        .parse::<f64>()
        .map_err(|_| DbError::TypeError(format!("{} is not a number", cell)))
}

fn parse_date(cell: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(cell.trim(), DATE_FORMAT)
        .map_err(|_| DbError::TypeError(format!("{} is not a date ({})", cell, DATE_FORMAT)))
}

/// Numbers print without a fractional part when they have none.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// Compares two cells under the rules of `dtype`.
fn compare_cells(dtype: DataType, left: &str, op: Comparator, right: &str) -> Result<bool, DbError> {
    match dtype {
        DataType::Number => Ok(op.compare(&parse_number(left)?, &parse_number(right)?)),
        DataType::Date => Ok(op.compare(&parse_date(left)?, &parse_date(right)?)),
        DataType::Char => {
            let equal = left.to_lowercase() == right.to_lowercase();
            match op {
                Comparator::Equals => Ok(equal),
                Comparator::NotEq => Ok(!equal),
                _ => Err(DbError::TypeError(format!(
                    "Comparator {} is not defined on CHAR values",
                    op
                ))),
            }
        }
    }
}

impl ResultSet {
    /// Creates a result set from columns and rows.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<String>>) -> Self {
        Self {
            columns,
            rows,
            message: None,
        }
    }

    /// No rows over `columns`.
    pub fn empty(columns: Vec<Column>) -> Self {
        Self::new(columns, Vec::new())
    }

    /// An empty result set carrying the reason an operation could not proceed.
    pub fn failed(message: &str) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            message: Some(message.to_string()),
        }
    }

    /// Deep-copies a table, prefixing each column name with the table name.
    pub fn from_table(table: &Table) -> Self {
        let columns = table.columns.iter().map(|c| c.qualified(&table.name)).collect();
        Self::new(columns, table.rows.clone())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Why the operation that produced this result set failed, if it did.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_failed(&self) -> bool {
        self.message.is_some()
    }

    fn degrade(operation: &str, result: Result<ResultSet, DbError>) -> ResultSet {
        match result {
            Ok(rs) => rs,
            Err(e) => {
                warn!("{} returned no rows: {}", operation, e);
                ResultSet::failed(&e.to_string())
            }
        }
    }

    fn column_index(&self, name: &str) -> Result<usize, DbError> {
        find_column(self.columns.iter().map(|c| c.name()), name).ok_or_else(|| {
            DbError::ColumnError(format!(
                "Column {} not found among [{}]",
                name,
                self.column_names().join(", ")
            ))
        })
    }

    /// Keeps the requested columns, in this result set's column order.
    ///
    /// # Arguments
    ///
    /// * `columns` - Names of the columns to keep, bare or qualified.
    pub fn projection<S: AsRef<str>>(&self, columns: &[S]) -> ResultSet {
        Self::degrade("projection", self.try_projection(columns))
    }

    fn try_projection<S: AsRef<str>>(&self, columns: &[S]) -> Result<ResultSet, DbError> {
        let mut indices = columns
            .iter()
            .map(|c| self.column_index(c.as_ref()))
            .collect::<Result<Vec<usize>, DbError>>()?;
        indices.sort_unstable();
        indices.dedup();
        let cols = indices.iter().map(|i| self.columns[*i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|i| row[*i].clone()).collect())
            .collect();
        Ok(ResultSet::new(cols, rows))
    }

    /// Keeps the rows satisfying `column <op> operand`.
    ///
    /// NUMBER columns compare as numbers and DATE columns as dates. CHAR columns only support
    /// `=` and `!=`, case-insensitively.
    pub fn selection(&self, condition: &Condition) -> ResultSet {
        Self::degrade("selection", self.try_selection(condition))
    }

    fn try_selection(&self, condition: &Condition) -> Result<ResultSet, DbError> {
        let i = self.column_index(&condition.column)?;
        let (dtype, operand) = match &condition.operand {
            Operand::Literal(lit) => {
                let dtype = self.columns[i].dtype;
                // Check the literal once so an empty input reports the same error.
                compare_cells(dtype, &sample_cell(dtype), condition.op, lit)?;
                (dtype, Rhs::Literal(lit.as_str()))
            }
            Operand::Column(c) => {
                let j = self.column_index(c)?;
                let (a, b) = (self.columns[i].dtype, self.columns[j].dtype);
                let dtype = if a == b { a } else { DataType::Char };
                (dtype, Rhs::Column(j))
            }
        };
        let mut rows = Vec::new();
        for row in &self.rows {
            let right: &str = match operand {
                Rhs::Column(j) => &row[j],
                Rhs::Literal(lit) => lit,
            };
            if compare_cells(dtype, &row[i], condition.op, right)? {
                rows.push(row.clone());
            }
        }
        Ok(ResultSet::new(self.columns.clone(), rows))
    }

    /// Evaluates an AND/OR condition list: each AND-run is a chain of selections combined by
    /// intersection, and the runs are combined by union.
    pub fn selection_expr(&self, expr: &ConditionExpr) -> ResultSet {
        Self::degrade("selection", self.try_selection_expr(expr))
    }

    fn try_selection_expr(&self, expr: &ConditionExpr) -> Result<ResultSet, DbError> {
        let mut result: Option<ResultSet> = None;
        for run in expr.and_runs() {
            let mut acc: Option<ResultSet> = None;
            for cond in run {
                let selected = self.try_selection(cond)?;
                acc = Some(match acc {
                    Some(prev) => prev.try_intersection(&selected)?,
                    None => selected,
                });
            }
            if let Some(run_result) = acc {
                result = Some(match result {
                    Some(prev) => prev.try_union(&run_result)?,
                    None => run_result,
                });
            }
        }
        Ok(result.unwrap_or_else(|| self.clone()))
    }

    /// Rows of this result set that also appear, cell for cell, in `other`.
    pub fn intersection(&self, other: &ResultSet) -> ResultSet {
        Self::degrade("intersection", self.try_intersection(other))
    }

    fn try_intersection(&self, other: &ResultSet) -> Result<ResultSet, DbError> {
        if other.rows.is_empty() {
            return Ok(ResultSet::empty(self.columns.clone()));
        }
        let present: HashSet<&Vec<String>> = other.rows.iter().collect();
        let rows = self
            .rows
            .iter()
            .filter(|r| present.contains(r))
            .cloned()
            .collect();
        Ok(ResultSet::new(self.columns.clone(), rows))
    }

    /// This result set's rows followed by the rows of `other` not already present.
    ///
    /// The schemas need not match: `other`'s columns missing here are appended and cells with
    /// no source column are left empty.
    pub fn union(&self, other: &ResultSet) -> ResultSet {
        Self::degrade("union", self.try_union(other))
    }

    fn try_union(&self, other: &ResultSet) -> Result<ResultSet, DbError> {
        let mut columns = self.columns.clone();
        for col in &other.columns {
            if !columns.iter().any(|c| c.name == col.name) {
                columns.push(col.clone());
            }
        }
        let other_map: Vec<Option<usize>> = columns
            .iter()
            .map(|c| other.columns.iter().position(|o| o.name == c.name))
            .collect();
        let extra = columns.len() - self.columns.len();

        let mut rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| {
                let mut row = r.clone();
                row.extend(std::iter::repeat(String::new()).take(extra));
                row
            })
            .collect();
        let mut seen: HashSet<Vec<String>> = rows.iter().cloned().collect();
        for r in &other.rows {
            let row: Vec<String> = other_map
                .iter()
                .map(|i| i.map(|i| r[i].clone()).unwrap_or_default())
                .collect();
            if seen.insert(row.clone()) {
                rows.push(row);
            }
        }
        Ok(ResultSet::new(columns, rows))
    }

    /// Every pairing of a row of this result set with a row of `other`, this side's columns
    /// first.
    pub fn cartesian_product(&self, other: &ResultSet) -> ResultSet {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        let mut rows = Vec::with_capacity(self.rows.len() * other.rows.len());
        for left in &self.rows {
            for right in &other.rows {
                let mut row = left.clone();
                row.extend(right.iter().cloned());
                rows.push(row);
            }
        }
        ResultSet::new(columns, rows)
    }

    /// Equi-join on a column both sides carry, e.g. `USING (id)`.
    pub fn join_using(&self, other: &ResultSet, column: &str) -> ResultSet {
        Self::degrade("join", self.try_join_using(other, column))
    }

    fn try_join_using(&self, other: &ResultSet, column: &str) -> Result<ResultSet, DbError> {
        let column = strip_table(column);
        let a = self.columns[self.column_index(column)?].name.clone();
        let b = other.columns[other.column_index(column)?].name.clone();
        self.try_inner_join(other, &a, &b)
    }

    /// The cartesian product restricted to rows where `col_a` equals `col_b`.
    ///
    /// Keys compare the way `selection` compares two columns: by type when both columns share
    /// one, as case-insensitive text otherwise.
    pub fn inner_join(&self, other: &ResultSet, col_a: &str, col_b: &str) -> ResultSet {
        Self::degrade("join", self.try_inner_join(other, col_a, col_b))
    }

    fn try_inner_join(
        &self,
        other: &ResultSet,
        col_a: &str,
        col_b: &str,
    ) -> Result<ResultSet, DbError> {
        let offset = self.columns.len();
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        let names = || columns.iter().map(|c| c.name());
        let missing = |c: &str| DbError::ColumnError(format!("Join column {} not found", c));

        // Prefer col_a on the left and col_b on the right, then anywhere in the product.
        let i = find_column(names().take(offset), col_a)
            .or_else(|| find_column(names(), col_a))
            .ok_or_else(|| missing(col_a))?;
        let j = find_column(names().skip(offset), col_b)
            .map(|j| j + offset)
            .or_else(|| find_column(names(), col_b))
            .ok_or_else(|| missing(col_b))?;
        let (a, b) = (columns[i].dtype, columns[j].dtype);
        let dtype = if a == b { a } else { DataType::Char };

        let mut rows = Vec::new();
        for left in &self.rows {
            for right in &other.rows {
                let cell = |k: usize| {
                    if k < offset {
                        &left[k]
                    } else {
                        &right[k - offset]
                    }
                };
                if compare_cells(dtype, cell(i), Comparator::Equals, cell(j))? {
                    let mut row = left.clone();
                    row.extend(right.iter().cloned());
                    rows.push(row);
                }
            }
        }
        Ok(ResultSet::new(columns, rows))
    }

    /// Aggregates the whole result set as one group, returning exactly one row with one
    /// `KIND(column)` column per aggregate.
    pub fn group_by(&self, aggregates: &[(AggregateKind, String)]) -> ResultSet {
        Self::degrade("aggregation", self.try_aggregate(&[], aggregates))
    }

    /// Aggregates per distinct value of the `group_by` columns, groups in first-seen order.
    ///
    /// Output columns are the group columns followed by one `KIND(column)` per aggregate.
    pub fn aggregate(
        &self,
        group_by: &[String],
        aggregates: &[(AggregateKind, String)],
    ) -> ResultSet {
        Self::degrade("aggregation", self.try_aggregate(group_by, aggregates))
    }

    fn try_aggregate(
        &self,
        group_by: &[String],
        aggregates: &[(AggregateKind, String)],
    ) -> Result<ResultSet, DbError> {
        let group_idx = group_by
            .iter()
            .map(|g| self.column_index(g))
            .collect::<Result<Vec<usize>, DbError>>()?;
        let agg_idx = aggregates
            .iter()
            .map(|(_, c)| self.column_index(c))
            .collect::<Result<Vec<usize>, DbError>>()?;

        let mut columns: Vec<Column> = group_idx.iter().map(|i| self.columns[*i].clone()).collect();
        for ((kind, name), i) in aggregates.iter().zip(agg_idx.iter()) {
            let source = &self.columns[*i];
            let dtype = match kind {
                AggregateKind::Min | AggregateKind::Max => source.dtype,
                AggregateKind::Count | AggregateKind::Sum | AggregateKind::Avg => {
                    if *kind != AggregateKind::Count && source.dtype != DataType::Number {
                        return Err(DbError::TypeError(format!(
                            "{} needs a NUMBER column, {} is {}",
                            kind, source.name, source.dtype
                        )));
                    }
                    DataType::Number
                }
            };
            let out_name = kind.output_name(name);
            let width = out_name.len().max(source.width);
            columns.push(Column::new(&out_name, dtype, width));
        }

        let mut groups: Vec<(Vec<String>, Vec<&Vec<String>>)> = Vec::new();
        let mut lookup: HashMap<Vec<String>, usize> = HashMap::new();
        if group_idx.is_empty() {
            groups.push((Vec::new(), self.rows.iter().collect()));
        } else {
            for row in &self.rows {
                let key: Vec<String> = group_idx.iter().map(|i| row[*i].clone()).collect();
                match lookup.get(&key) {
                    Some(g) => groups[*g].1.push(row),
                    None => {
                        lookup.insert(key.clone(), groups.len());
                        groups.push((key, vec![row]));
                    }
                }
            }
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            let mut row = key;
            for ((kind, _), i) in aggregates.iter().zip(agg_idx.iter()) {
                let values: Vec<&str> = members.iter().map(|r| r[*i].as_str()).collect();
                row.push(aggregate_values(*kind, self.columns[*i].dtype, &values)?);
            }
            rows.push(row);
        }
        Ok(ResultSet::new(columns, rows))
    }

    /// Stable sort by one column, ascending.
    ///
    /// The sort is numeric when the column's first cell parses as a number, otherwise
    /// lexicographic. In a numeric sort, cells that are not numbers (NaN included) follow all
    /// numbers in text order.
    pub fn order_by_asc(&self, column: &str) -> ResultSet {
        Self::degrade("order by", self.try_order_by(column, false))
    }

    /// The ascending order, reversed.
    pub fn order_by_desc(&self, column: &str) -> ResultSet {
        Self::degrade("order by", self.try_order_by(column, true))
    }

    fn try_order_by(&self, column: &str, descending: bool) -> Result<ResultSet, DbError> {
        let i = self.column_index(column)?;
        let numeric = self
            .rows
            .first()
            .map(|r| sort_number(&r[i]).is_some())
            .unwrap_or(false);
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            if !numeric {
                return a[i].cmp(&b[i]);
            }
            // Cells that are not numbers sort after every number.
            match (sort_number(&a[i]), sort_number(&b[i])) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a[i].cmp(&b[i]),
            }
        });
        if descending {
            rows.reverse();
        }
        Ok(ResultSet::new(self.columns.clone(), rows))
    }
}

/// A cell's value for numeric ordering; NaN counts as text.
fn sort_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Right-hand side of a resolved condition.
#[derive(Clone, Copy)]
enum Rhs<'a> {
    Literal(&'a str),
    Column(usize),
}

/// A cell value valid for `dtype`, used to check literals up front.
fn sample_cell(dtype: DataType) -> String {
    match dtype {
        DataType::Number => String::from("0"),
        DataType::Char => String::new(),
        DataType::Date => String::from("1970-01-01"),
    }
}

fn aggregate_values(kind: AggregateKind, dtype: DataType, values: &[&str]) -> Result<String, DbError> {
    if kind == AggregateKind::Count {
        return Ok(values.len().to_string());
    }
    if values.is_empty() {
        return Ok(match kind {
            AggregateKind::Sum => String::from("0"),
            _ => String::new(),
        });
    }
    match (kind, dtype) {
        (AggregateKind::Min, DataType::Number) | (AggregateKind::Max, DataType::Number) => {
            let nums = values
                .iter()
                .map(|v| parse_number(v))
                .collect::<Result<Vec<f64>, DbError>>()?;
            let pick = nums.iter().cloned().fold(nums[0], |acc, v| {
                if (kind == AggregateKind::Min) == (v < acc) {
                    v
                } else {
                    acc
                }
            });
            Ok(format_number(pick))
        }
        (AggregateKind::Min, _) | (AggregateKind::Max, _) => {
            let mut best = values[0];
            for v in &values[1..] {
                let ord = if dtype == DataType::Date {
                    parse_date(v)?.cmp(&parse_date(best)?)
                } else {
                    v.cmp(&best)
                };
                let better = match kind {
                    AggregateKind::Min => ord == Ordering::Less,
                    _ => ord == Ordering::Greater,
                };
                if better {
                    best = v;
                }
            }
            Ok(best.to_string())
        }
        (AggregateKind::Sum, _) | (AggregateKind::Avg, _) => {
            let mut sum = 0.0;
            for v in values {
                sum += parse_number(v)?;
            }
            if kind == AggregateKind::Avg {
                sum /= values.len() as f64;
            }
            Ok(format_number(sum))
        }
        (AggregateKind::Count, _) => Ok(values.len().to_string()),
    }
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(msg) = &self.message {
            return writeln!(f, "{}", msg);
        }
        let widths: Vec<usize> = self
            .columns
            .iter()
            .map(|c| c.width.max(c.name.len()) + 2)
            .collect();
        for (col, width) in self.columns.iter().zip(widths.iter()) {
            write!(f, "{:width$}", col.name, width = *width)?;
        }
        writeln!(f)?;
        for row in &self.rows {
            for (cell, width) in row.iter().zip(widths.iter()) {
                write!(f, "{:width$}", cell, width = *width)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
