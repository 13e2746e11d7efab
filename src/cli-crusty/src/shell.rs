use crate::tokenize::tokenize;
use common::database::Database;
use common::DbError;
use optimizer::OptimizerConfig;
use queryexe::Executor;

/// What the REPL should do after a line.
#[derive(Debug, PartialEq)]
pub enum Response {
    Output(String),
    Quit,
}

/// Shell state: the loaded catalog and the optimizer knobs.
pub struct Shell {
    db: Database,
    config: OptimizerConfig,
    show_snapshots: bool,
}

impl Shell {
    pub fn new(db: Database, config: OptimizerConfig, show_snapshots: bool) -> Self {
        Self {
            db,
            config,
            show_snapshots,
        }
    }

    /// Handles a `\` command or a SELECT statement.
    pub fn handle_line(&mut self, line: &str) -> Response {
        let line = line.trim();
        if line.starts_with('\\') {
            return self.command(line);
        }
        match self.query(line) {
            Ok(out) => Response::Output(out),
            Err(e) => Response::Output(format!("{}\n", e)),
        }
    }

    fn command(&mut self, line: &str) -> Response {
        let mut words = line.split_whitespace();
        let out = match (words.next(), words.next()) {
            (Some("\\quit"), _) | (Some("\\q"), _) => return Response::Quit,
            (Some("\\tables"), _) => {
                let mut out = String::new();
                for name in self.db.table_names() {
                    let table = &self.db.tables[&name];
                    let cols: Vec<String> = table
                        .columns
                        .iter()
                        .map(|c| format!("{} {}", c.name, c.dtype))
                        .collect();
                    out += &format!("{} ({}) {} rows\n", name, cols.join(", "), table.size());
                }
                out
            }
            (Some("\\rearrange"), Some(flag)) => match flag {
                "on" | "off" => {
                    self.config.rearrange_joins = flag == "on";
                    format!("Join rearrangement {}\n", flag)
                }
                _ => String::from("Usage: \\rearrange on|off\n"),
            },
            (Some("\\snapshots"), Some(flag)) => match flag {
                "on" | "off" => {
                    self.show_snapshots = flag == "on";
                    format!("Pass snapshots {}\n", flag)
                }
                _ => String::from("Usage: \\snapshots on|off\n"),
            },
            _ => format!("Unknown command {}\n", line),
        };
        Response::Output(out)
    }

    fn query(&self, sql: &str) -> Result<String, DbError> {
        let statement = tokenize(sql)?;
        let (plan, result) = Executor::run(&statement, &self.db, self.config)?;
        let mut out = String::new();
        if self.show_snapshots {
            for snap in &plan.snapshots {
                out += &format!("-- {}\n{}\n", snap.name, snap.tree.to_algebra());
            }
        }
        out += &result.to_string();
        if !result.is_failed() {
            out += &format!("({} rows)\n", result.len());
        }
        Ok(out)
    }
}
