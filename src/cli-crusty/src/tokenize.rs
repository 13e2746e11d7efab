use common::statement::Statement;
use common::DbError;
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Turns one SQL line into the token stream a [`Statement`] expects.
///
/// Whitespace and `;` are dropped, `t . c` is glued into `t.c` and string literals keep their
/// quotes.
pub fn tokenize(sql: &str) -> Result<Statement, DbError> {
    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| DbError::ValidationError(format!("Could not tokenize: {:?}", e)))?;

    let mut out: Vec<String> = Vec::new();
    let mut glue = false;
    for token in tokens {
        let text = match token {
            Token::Whitespace(_) | Token::SemiColon => continue,
            Token::Period => {
                match out.last_mut() {
                    Some(prev) => prev.push('.'),
                    None => {
                        return Err(DbError::ValidationError(String::from(
                            "Statement starts with '.'",
                        )))
                    }
                }
                glue = true;
                continue;
            }
            Token::Word(w) => w.value,
            Token::Number(n) => n,
            Token::SingleQuotedString(s) => format!("'{}'", s),
            Token::Comma => String::from(","),
            Token::LParen => String::from("("),
            Token::RParen => String::from(")"),
            Token::Mult => String::from("*"),
            Token::Eq => String::from("="),
            Token::Neq => String::from("!="),
            Token::Lt => String::from("<"),
            Token::Gt => String::from(">"),
            Token::LtEq => String::from("<="),
            Token::GtEq => String::from(">="),
            other => {
                return Err(DbError::ValidationError(format!(
                    "Unsupported token {:?}",
                    other
                )))
            }
        };
        match (glue, out.last_mut()) {
            (true, Some(prev)) => prev.push_str(&text),
            _ => out.push(text),
        }
        glue = false;
    }
    debug!("tokens: {:?}", out);
    Ok(Statement::new(out))
}

#[cfg(test)]
mod test {
    use super::*;
    use common::statement::StatementKind;

    #[test]
    fn test_tokenize_select() {
        let stmt = tokenize("SELECT emp.name, SUM(qty) FROM emp WHERE name <> 'bob' AND id >= 2;")
            .unwrap();
        assert_eq!(stmt.kind, StatementKind::Select);
        assert_eq!(
            stmt.tokens,
            vec![
                "SELECT", "emp.name", ",", "SUM", "(", "qty", ")", "FROM", "emp", "WHERE", "name",
                "!=", "'bob'", "AND", "id", ">=", "2"
            ]
        );
    }

    #[test]
    fn test_tokenize_matches_statement_select() {
        let sql = "select * from emp, dept where emp.dept_id = dept.id";
        let stmt = tokenize(sql).unwrap();
        assert_eq!(stmt.tokens, Statement::select(sql).tokens);
        assert_eq!(
            stmt.clauses().unwrap(),
            Statement::select(sql).clauses().unwrap()
        );
    }

    #[test]
    fn test_tokenize_rejects() {
        assert!(tokenize(".a FROM t").is_err());
        assert!(tokenize("SELECT a + 1 FROM t").is_err());
        assert_eq!(tokenize("DELETE FROM t").unwrap().kind, StatementKind::Other);
    }
}
