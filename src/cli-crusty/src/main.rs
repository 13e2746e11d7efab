#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;
extern crate clap;
extern crate rustyline;
use clap::{App, Arg};
use env_logger::Env;

use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::fs;
use std::process;

use common::database::Database;
use common::testutil::sample_db;
use common::DbError;
use optimizer::OptimizerConfig;

mod catalog_file;
mod shell;
mod tokenize;

use shell::{Response, Shell};

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Debug)]
struct CliConfig {
    /// Catalog file; the built-in sample catalog when absent.
    catalog: Option<String>,
    #[serde(default = "default_true")]
    rearrange_joins: bool,
    #[serde(default = "default_true")]
    show_snapshots: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        CliConfig {
            catalog: None,
            rearrange_joins: true,
            show_snapshots: true,
        }
    }
}

fn process_cli_input(shell: &mut Shell) {
    let mut rl = Editor::<()>::new();
    if rl.load_history("history.txt").is_err() {
        info!("No previous history.");
    }
    let prompt: &str = "[crustydb]>>";
    loop {
        let readline = rl.readline(prompt);
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                rl.add_history_entry(line.as_str());
                match shell.handle_line(&line) {
                    Response::Output(out) => print!("{}", out),
                    Response::Quit => break,
                }
            }
            Err(ReadlineError::Interrupted) => {
                info!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                info!("CTRL-D");
                break;
            }
            Err(err) => {
                error!("Error: {:?}", err);
                break;
            }
        }
    }
    if let Err(e) = rl.save_history("history.txt") {
        warn!("Could not save history: {}", e);
    }
}

fn process_script_input(shell: &mut Shell, script: &str) {
    for line in script.split(';') {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        let clean_command = command.replace("\n", " ");
        info!("Script clean command: {}", clean_command);
        match shell.handle_line(&clean_command) {
            Response::Output(out) => print!("{}", out),
            Response::Quit => break,
        }
    }
}

fn load_config(path: Option<&str>) -> Result<CliConfig, DbError> {
    match path {
        Some(p) => {
            let contents = fs::read_to_string(p)?;
            Ok(serde_json::from_str(&contents)?)
        }
        None => Ok(CliConfig::default()),
    }
}

fn main() {
    // Configure log environment
    env_logger::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Sets a custom config file")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("catalog")
                .short("d")
                .long("catalog")
                .value_name("CATALOG")
                .help("JSON catalog listing tables and their csv files")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("no-rearrange")
                .long("no-rearrange")
                .help("Skips the join rearrangement pass"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("Prints only results, not the tree after each pass"),
        )
        .arg(
            Arg::with_name("script")
                .short("s")
                .long("script")
                .value_name("CRUSTY_SCRIPT")
                .help("Takes in a semicolon delimited file of crusty commands and SQL queries.")
                .takes_value(true)
                .required(false),
        )
        .get_matches();

    let mut config = match load_config(matches.value_of("config")) {
        Ok(c) => c,
        Err(e) => {
            error!("Could not read config: {}", e);
            process::exit(1);
        }
    };
    if let Some(c) = matches.value_of("catalog") {
        config.catalog = Some(c.to_string());
    }
    if matches.is_present("no-rearrange") {
        config.rearrange_joins = false;
    }
    if matches.is_present("quiet") {
        config.show_snapshots = false;
    }
    info!("Starting shell with config: {:?}", config);

    let db: Database = match &config.catalog {
        Some(path) => match catalog_file::load_catalog(path) {
            Ok(db) => db,
            Err(e) => {
                error!("Could not load catalog {}: {}", path, e);
                process::exit(1);
            }
        },
        None => {
            info!("No catalog given, using the sample catalog");
            sample_db()
        }
    };
    let mut shell = Shell::new(
        db,
        OptimizerConfig {
            rearrange_joins: config.rearrange_joins,
        },
        config.show_snapshots,
    );

    match matches.value_of("script") {
        Some(path) => match fs::read_to_string(path) {
            Ok(script) => process_script_input(&mut shell, &script),
            Err(e) => error!("Could not read script {}: {}", path, e),
        },
        None => process_cli_input(&mut shell),
    }
    info!("Terminated.");
}
