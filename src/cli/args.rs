//! Command-line argument parsing and validation

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cmdbind - bind raw command lines to declared commands and invoke them
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "cmdbind")]
pub struct Args {
    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Catalog selection and resolution inputs shared by catalog-driven commands
#[derive(clap::Args, Debug, Clone)]
pub struct CatalogArgs {
    /// JSON catalog declaring commands, globals and enums
    #[arg(short = 'c', long = "catalog")]
    pub catalog: PathBuf,

    /// Base property visible as `${sys.KEY}`
    #[arg(short = 'P', long = "property", value_name = "KEY=VALUE")]
    pub properties: Vec<String>,

    /// Entry of the generic default-value context, visible as `${KEY}`
    #[arg(long = "default", value_name = "KEY=VALUE")]
    pub defaults: Vec<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bind and invoke one argv: [globals...] command [args...]
    Run {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Tokens to bind, usually after `--`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },

    /// Tokenize a raw line and invoke each pipeline stage
    Exec {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Raw command line, quotes and `|` included
        line: String,
    },

    /// Print the tokens of a raw line without invoking anything
    Tokenize {
        /// Raw command line
        line: String,
    },

    /// List the commands a catalog declares
    List {
        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// Validate a catalog without invoking anything
    Check {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
}

impl Command {
    /// Catalog arguments, for commands that read one
    pub fn catalog_args(&self) -> Option<&CatalogArgs> {
        match self {
            Self::Run { catalog, .. }
            | Self::Exec { catalog, .. }
            | Self::List { catalog }
            | Self::Check { catalog } => Some(catalog),
            Self::Tokenize { .. } => None,
        }
    }
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokenize() {
        let args = Args::try_parse_from(["cmdbind", "tokenize", "a 'b c'"]).unwrap();
        assert!(!args.debug);
        assert!(matches!(args.command, Command::Tokenize { ref line } if line == "a 'b c'"));
        assert!(args.command.catalog_args().is_none());
    }

    #[test]
    fn test_parse_debug_flag() {
        let args = Args::try_parse_from(["cmdbind", "--debug", "list", "-c", "cat.json"]).unwrap();
        assert!(args.debug);
    }

    #[test]
    fn test_parse_run_keeps_hyphenated_argv() {
        let args = Args::try_parse_from([
            "cmdbind", "run", "-c", "cat.json", "-P", "mode=dev", "--", "-Dx=1", "--red=12",
            "deploy", "--force",
        ])
        .unwrap();
        match args.command {
            Command::Run { catalog, argv } => {
                assert_eq!(catalog.catalog, PathBuf::from("cat.json"));
                assert_eq!(catalog.properties, vec!["mode=dev"]);
                assert_eq!(argv, vec!["-Dx=1", "--red=12", "deploy", "--force"]);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_requires_argv() {
        assert!(Args::try_parse_from(["cmdbind", "run", "-c", "cat.json"]).is_err());
    }
}
