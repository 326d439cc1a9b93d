//! # cmdbind
//!
//! A command-binding and invocation engine. Commands are declared once, either in
//! code or in a JSON catalog, and then invoked from raw command lines. The engine
//! tokenizes the line, separates global options from the command, resolves
//! `${name:-default}` expressions, converts text into declared types, binds
//! parameters and runs the command through its interceptor chain.
//!
//! ## Features
//!
//! - Quote- and escape-aware tokenizer with `|` pipelines
//! - Plain, option, bean-option and engine-supplied internal parameters
//! - Pluggable type converters and resolver contexts
//! - Interceptor chains with short-circuit and fan-out
//! - Structured errors naming the offending parameter, option or value
//!
//! ## Example
//!
//! ```
//! use cmdbind::core::{CommandEngine, CommandSpec, ParameterSpec, TypeSpec, Value, spec::action};
//!
//! let engine = CommandEngine::builder()
//!     .command(
//!         CommandSpec::new(
//!             "greet",
//!             action(|args: &[Value]| Ok(Value::text(format!("hello {}", args[0])))),
//!         )
//!         .param(ParameterSpec::option("name", TypeSpec::text()).with_default("${NAME:-world}")),
//!     )
//!     .build()?;
//!
//! assert_eq!(engine.run(&["greet"])?.result, Value::text("hello world"));
//! assert_eq!(engine.run(&["greet", "--name=ada"])?.result, Value::text("hello ada"));
//! # Ok::<(), cmdbind::error::EngineError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod utils;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging with appropriate verbosity.
///
/// Logs go to stderr so that command results on stdout stay machine-readable.
pub fn setup_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .compact(),
        )
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
