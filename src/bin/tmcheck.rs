//! Command-line interface for tmcheck
//!
//! Usage:
//!   tmcheck `<grammar>` `<fixture>` `<expectations>` [--grammars `<dir>`] [--config `<file>`]
//!
//! Exit codes: 0 when every check passes, 1 on failed checks or fatal
//! errors, 2 on usage errors.

use clap::{Arg, Command};
use std::io;
use std::path::PathBuf;
use tmcheck::config::{Loader, TmCheckConfig};
use tmcheck::{logging, HarnessError, Invocation};

fn main() {
    let matches = Command::new("tmcheck")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Check the scopes a TextMate grammar assigns to a sample file")
        .arg_required_else_help(true)
        .arg(
            Arg::new("grammar")
                .help("Path to the grammar (.tmLanguage.json, or .yaml/.yml)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("fixture")
                .help("Sample source file to tokenize")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::new("expectations")
                .help("Expectation file with a checks[] list")
                .required(true)
                .index(3),
        )
        .arg(
            Arg::new("grammars")
                .long("grammars")
                .short('g')
                .value_name("DIR")
                .help("Directory of embedded grammars named <scope>.tmLanguage.json (default: grammars/ next to the binary)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("TOML file layered over the built-in defaults"),
        )
        .get_matches();

    logging::init();

    let invocation = Invocation {
        grammar: PathBuf::from(matches.get_one::<String>("grammar").unwrap()),
        fixture: PathBuf::from(matches.get_one::<String>("fixture").unwrap()),
        expectations: PathBuf::from(matches.get_one::<String>("expectations").unwrap()),
    };

    let config = load_config(
        matches.get_one::<String>("config"),
        matches.get_one::<String>("grammars"),
    )
    .unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });

    let grammars_dir = config.grammars.resolve_directory();
    let outcome = tmcheck::run(
        &invocation,
        &config,
        grammars_dir.as_deref(),
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
    )
    .unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });

    std::process::exit(outcome.exit_code());
}

fn load_config(
    config_path: Option<&String>,
    grammars_dir: Option<&String>,
) -> Result<TmCheckConfig, HarnessError> {
    let mut loader = Loader::new();
    if let Some(path) = config_path {
        loader = loader.with_file(path);
    }
    if let Some(dir) = grammars_dir {
        loader = loader.set_override("grammars.directory", dir.as_str())?;
    }
    Ok(loader.build()?)
}
