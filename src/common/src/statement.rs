use crate::logical_plan::{AggregateCondition, AggregateKind, Comparator, Condition, Operand};
use crate::DbError;

/// Statement classification produced by the syntax checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Other,
}

/// A tokenized, already validated statement.
///
/// Qualified identifiers arrive as one token (`t.c`), string literals keep their quotes and
/// aggregate calls arrive as `KIND`, `(`, `column`, `)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub tokens: Vec<String>,
}

/// One entry of the select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Column(String),
    Aggregate(AggregateKind, String),
}

/// ORDER BY request, applied after evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    pub column: String,
    pub descending: bool,
}

/// The clauses of a SELECT statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectClauses {
    /// Select list, empty for `*`.
    pub projection: Vec<SelectItem>,
    /// FROM relations in order.
    pub relations: Vec<String>,
    /// AND-ed WHERE conditions.
    pub conditions: Vec<Condition>,
    pub group_by: Vec<String>,
    /// AND-ed HAVING conditions.
    pub having: Vec<AggregateCondition>,
    pub order_by: Option<Ordering>,
}

#[derive(Clone, Copy, PartialEq)]
enum Clause {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
}

fn invalid(msg: String) -> DbError {
    DbError::ValidationError(msg)
}

fn is_keyword(token: &str, keyword: &str) -> bool {
    token.eq_ignore_ascii_case(keyword)
}

/// Splits tokens on a separator, dropping the separators.
fn split_on<'a>(tokens: &'a [String], sep: &str) -> Vec<&'a [String]> {
    tokens
        .split(|t| is_keyword(t, sep))
        .filter(|part| !part.is_empty())
        .collect()
}

fn is_literal(token: &str) -> bool {
    token.starts_with('\'') || token.parse::<f64>().is_ok()
}

fn unquote(token: &str) -> String {
    token.trim_matches('\'').to_string()
}

fn parse_operand(token: &str) -> Operand {
    if is_literal(token) {
        Operand::Literal(unquote(token))
    } else {
        Operand::Column(token.to_string())
    }
}

/// `KIND ( column )`
fn parse_aggregate(tokens: &[String]) -> Result<Option<(AggregateKind, String)>, DbError> {
    if tokens.len() != 4 || tokens[1] != "(" || tokens[3] != ")" {
        return Ok(None);
    }
    match AggregateKind::from_name(&tokens[0]) {
        Some(kind) => Ok(Some((kind, tokens[2].clone()))),
        None => Err(invalid(format!("Unknown aggregate {}", tokens[0]))),
    }
}

fn parse_condition(tokens: &[String]) -> Result<Condition, DbError> {
    if tokens.len() != 3 {
        return Err(invalid(format!("Malformed condition {}", tokens.join(" "))));
    }
    let op = Comparator::from_symbol(&tokens[1])?;
    match (parse_operand(&tokens[0]), parse_operand(&tokens[2])) {
        (Operand::Column(c), operand) => Ok(Condition {
            column: c,
            op,
            operand,
        }),
        (Operand::Literal(l), Operand::Column(c)) => Ok(Condition::literal(&c, op.flip(), &l)),
        (Operand::Literal(_), Operand::Literal(_)) => Err(invalid(format!(
            "Condition {} compares two literals",
            tokens.join(" ")
        ))),
    }
}

fn parse_having(tokens: &[String]) -> Result<AggregateCondition, DbError> {
    if tokens.len() != 6 {
        return Err(invalid(format!(
            "Malformed HAVING condition {}",
            tokens.join(" ")
        )));
    }
    let (kind, column) = parse_aggregate(&tokens[..4])?.ok_or_else(|| {
        invalid(format!(
            "HAVING condition {} must start with an aggregate",
            tokens.join(" ")
        ))
    })?;
    Ok(AggregateCondition {
        kind,
        column,
        op: Comparator::from_symbol(&tokens[4])?,
        literal: unquote(&tokens[5]),
    })
}

impl Statement {
    /// Creates a statement from tokens, classifying it by its first token.
    pub fn new(tokens: Vec<String>) -> Self {
        let kind = match tokens.first() {
            Some(t) if is_keyword(t, "SELECT") => StatementKind::Select,
            _ => StatementKind::Other,
        };
        Self { kind, tokens }
    }

    /// Tokenizes a SELECT on whitespace, commas, parentheses and comparators.
    ///
    /// This only splits text; it is a stand-in for the syntax checker in tests and tools.
    pub fn select(sql: &str) -> Self {
        let mut tokens = Vec::new();
        let mut cur = String::new();
        let mut chars = sql.chars().peekable();
        let flush = |cur: &mut String, tokens: &mut Vec<String>| {
            if !cur.is_empty() {
                tokens.push(std::mem::take(cur));
            }
        };
        while let Some(c) = chars.next() {
            match c {
                '\'' => {
                    flush(&mut cur, &mut tokens);
                    let mut lit = String::from("'");
                    for n in chars.by_ref() {
                        lit.push(n);
                        if n == '\'' {
                            break;
                        }
                    }
                    tokens.push(lit);
                }
                ',' | '(' | ')' | ';' => {
                    flush(&mut cur, &mut tokens);
                    if c != ';' {
                        tokens.push(c.to_string());
                    }
                }
                '=' | '!' | '<' | '>' => {
                    flush(&mut cur, &mut tokens);
                    let mut sym = c.to_string();
                    if let Some(&n) = chars.peek() {
                        if n == '=' || (c == '<' && n == '>') {
                            sym.push(n);
                            chars.next();
                        }
                    }
                    tokens.push(sym);
                }
                c if c.is_whitespace() => flush(&mut cur, &mut tokens),
                c => cur.push(c),
            }
        }
        flush(&mut cur, &mut tokens);
        Statement::new(tokens)
    }

    /// Extracts the clauses of a SELECT statement.
    pub fn clauses(&self) -> Result<SelectClauses, DbError> {
        if self.kind != StatementKind::Select {
            return Err(invalid(String::from("Only SELECT statements have a query tree")));
        }
        let mut sections: Vec<(Clause, Vec<String>)> = Vec::new();
        let mut i = 0;
        while i < self.tokens.len() {
            let token = &self.tokens[i];
            let next_is_by = self
                .tokens
                .get(i + 1)
                .map(|t| is_keyword(t, "BY"))
                .unwrap_or(false);
            let clause = if is_keyword(token, "SELECT") {
                Some(Clause::Select)
            } else if is_keyword(token, "FROM") {
                Some(Clause::From)
            } else if is_keyword(token, "WHERE") {
                Some(Clause::Where)
            } else if is_keyword(token, "HAVING") {
                Some(Clause::Having)
            } else if is_keyword(token, "GROUP") && next_is_by {
                i += 1;
                Some(Clause::GroupBy)
            } else if is_keyword(token, "ORDER") && next_is_by {
                i += 1;
                Some(Clause::OrderBy)
            } else {
                None
            };
            if let Some(c) = clause {
                if sections.iter().any(|(seen, _)| *seen == c) {
                    return Err(invalid(format!("Clause {} appears twice", token)));
                }
                sections.push((c, Vec::new()));
            } else if let Some((_, body)) = sections.last_mut() {
                body.push(token.clone());
            } else {
                return Err(invalid(format!("Unexpected token {}", token)));
            }
            i += 1;
        }

        let mut clauses = SelectClauses::default();
        for (clause, body) in &sections {
            match clause {
                Clause::Select => {
                    if body.first().map(|t| is_keyword(t, "DISTINCT")).unwrap_or(false) {
                        return Err(invalid(String::from("DISTINCT not supported")));
                    }
                    if body.len() == 1 && body[0] == "*" {
                        continue;
                    }
                    for item in split_on(body, ",") {
                        match parse_aggregate(item)? {
                            Some((kind, col)) => {
                                clauses.projection.push(SelectItem::Aggregate(kind, col))
                            }
                            None if item.len() == 1 => {
                                clauses.projection.push(SelectItem::Column(item[0].clone()))
                            }
                            None => {
                                return Err(invalid(format!(
                                    "Unsupported select item {}",
                                    item.join(" ")
                                )))
                            }
                        }
                    }
                }
                Clause::From => {
                    for rel in split_on(body, ",") {
                        if rel.len() != 1 {
                            return Err(invalid(format!(
                                "Unsupported FROM item {}",
                                rel.join(" ")
                            )));
                        }
                        clauses.relations.push(rel[0].clone());
                    }
                }
                Clause::Where => {
                    if body.iter().any(|t| is_keyword(t, "OR")) {
                        return Err(invalid(String::from(
                            "Disjunctive WHERE clauses have no query tree form",
                        )));
                    }
                    for cond in split_on(body, "AND") {
                        clauses.conditions.push(parse_condition(cond)?);
                    }
                }
                Clause::GroupBy => {
                    for col in split_on(body, ",") {
                        clauses.group_by.push(col.join(""));
                    }
                }
                Clause::Having => {
                    for cond in split_on(body, "AND") {
                        clauses.having.push(parse_having(cond)?);
                    }
                }
                Clause::OrderBy => {
                    let (descending, column) = match body.last() {
                        Some(t) if is_keyword(t, "DESC") => (true, &body[..body.len() - 1]),
                        Some(t) if is_keyword(t, "ASC") => (false, &body[..body.len() - 1]),
                        _ => (false, &body[..]),
                    };
                    if column.is_empty() {
                        return Err(invalid(String::from("ORDER BY needs a column")));
                    }
                    clauses.order_by = Some(Ordering {
                        column: column.join(""),
                        descending,
                    });
                }
            }
        }
        if clauses.relations.is_empty() {
            return Err(invalid(String::from("SELECT without FROM")));
        }
        Ok(clauses)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tokenize() {
        let stmt = Statement::select("SELECT a, SUM(b) FROM t WHERE a>=1 AND name = 'x y';");
        assert_eq!(stmt.kind, StatementKind::Select);
        assert_eq!(
            stmt.tokens,
            vec![
                "SELECT", "a", ",", "SUM", "(", "b", ")", "FROM", "t", "WHERE", "a", ">=", "1",
                "AND", "name", "=", "'x y'"
            ]
        );
        assert_eq!(Statement::select("DELETE FROM t").kind, StatementKind::Other);
    }

    #[test]
    fn test_clauses() {
        let stmt = Statement::select(
            "select dept, sum(qty) from emp, sales where emp.id = sales.emp_id and 5 < qty \
             group by dept having sum(qty) > 10 order by dept desc",
        );
        let c = stmt.clauses().unwrap();
        assert_eq!(
            c.projection,
            vec![
                SelectItem::Column(String::from("dept")),
                SelectItem::Aggregate(AggregateKind::Sum, String::from("qty"))
            ]
        );
        assert_eq!(c.relations, vec!["emp", "sales"]);
        assert_eq!(
            c.conditions,
            vec![
                Condition::columns("emp.id", Comparator::Equals, "sales.emp_id"),
                Condition::literal("qty", Comparator::GreaterThan, "5"),
            ]
        );
        assert_eq!(c.group_by, vec!["dept"]);
        assert_eq!(c.having[0].output_name(), "SUM(qty)");
        assert_eq!(c.having[0].literal, "10");
        assert_eq!(
            c.order_by,
            Some(Ordering {
                column: String::from("dept"),
                descending: true
            })
        );
    }

    #[test]
    fn test_wildcard_and_literals() {
        let c = Statement::select("SELECT * FROM t WHERE name != 'bob'")
            .clauses()
            .unwrap();
        assert!(c.projection.is_empty());
        assert_eq!(
            c.conditions,
            vec![Condition::literal("name", Comparator::NotEq, "bob")]
        );
    }

    #[test]
    fn test_rejected() {
        assert!(Statement::select("SELECT a FROM t WHERE a = 1 OR a = 2")
            .clauses()
            .is_err());
        assert!(Statement::select("SELECT DISTINCT a FROM t").clauses().is_err());
        assert!(Statement::select("SELECT a").clauses().is_err());
        assert!(Statement::select("SELECT a FROM t WHERE 1 = 2").clauses().is_err());
        assert!(Statement::select("SELECT a FROM t WHERE a ~ 2").clauses().is_err());
        assert!(Statement::select("SELECT FOO(a) FROM t").clauses().is_err());
        assert!(Statement::select("DELETE FROM t").clauses().is_err());
    }
}
