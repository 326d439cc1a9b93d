//! Command implementations for the CLI

use crate::{
    cli::Command,
    config::Config,
    core::{
        Catalog, CommandEngine, ConverterRegistry, ParameterKind, ParameterSpec, ValueKind,
        interceptor::builtin_interceptors, tokenize,
    },
};
use anyhow::Context;
use serde::Serialize;
use serde_json::{Value as Json, json};
use tracing::{info, instrument, warn};

/// Execute the appropriate command based on CLI arguments
#[instrument(skip(config))]
pub fn execute_command(config: &Config, command: &Command) -> anyhow::Result<()> {
    match command {
        Command::Run { argv, .. } => execute_run_command(config, argv),
        Command::Exec { line, .. } => execute_exec_command(config, line),
        Command::Tokenize { line } => execute_tokenize_command(line),
        Command::List { .. } => execute_list_command(config),
        Command::Check { .. } => execute_check_command(config),
    }
}

/// Execute the run command
#[instrument(skip(config))]
fn execute_run_command(config: &Config, argv: &[String]) -> anyhow::Result<()> {
    let engine = load_engine(config)?;
    let outcome = engine
        .run(argv)
        .with_context(|| format!("Failed to run: {}", argv.join(" ")))?;
    print_json(&outcome)
}

/// Execute the exec command
#[instrument(skip(config))]
fn execute_exec_command(config: &Config, line: &str) -> anyhow::Result<()> {
    let engine = load_engine(config)?;
    let outcomes = engine
        .run_line(line)
        .with_context(|| format!("Failed to execute line: {line}"))?;
    info!("Executed {} pipeline stage(s)", outcomes.len());
    print_json(&outcomes)
}

/// Execute the tokenize command
#[instrument]
fn execute_tokenize_command(line: &str) -> anyhow::Result<()> {
    let stages = tokenize(line).context("Failed to tokenize line")?;
    print_json(&stages)
}

/// Execute the list command
#[instrument(skip(config))]
fn execute_list_command(config: &Config) -> anyhow::Result<()> {
    let engine = load_engine(config)?;
    let commands: Vec<Json> = engine
        .registry()
        .commands()
        .map(|command| {
            json!({
                "name": command.name,
                "description": command.description,
                "target": format!("{}::{}", command.target.declaring_type, command.target.handle),
                "interceptors": command.interceptors,
                "parameters": command.parameters.iter().map(describe_parameter).collect::<Vec<_>>(),
            })
        })
        .collect();
    let globals: Vec<Json> = engine
        .global_options()
        .groups
        .iter()
        .map(describe_parameter)
        .collect();
    print_json(&json!({ "globals": globals, "commands": commands }))
}

/// Execute the check command
#[instrument(skip(config))]
fn execute_check_command(config: &Config) -> anyhow::Result<()> {
    let engine = load_engine(config)?;
    let converters = ConverterRegistry::with_builtins();
    let interceptors = builtin_interceptors();
    let mut warnings = Vec::new();

    for command in engine.registry().commands() {
        for reference in &command.interceptors {
            if !interceptors.contains(reference) {
                warnings.push(format!(
                    "command '{}' references interceptor '{}', which must be supplied at run time",
                    command.name, reference
                ));
            }
        }
        collect_converter_warnings(&command.name, &command.parameters, &converters, &mut warnings);
    }
    collect_converter_warnings("<global>", &engine.global_options().groups, &converters, &mut warnings);

    for warning in &warnings {
        warn!("{}", warning);
    }
    info!("Catalog is valid");
    print_json(&json!({
        "commands": engine.registry().len(),
        "globals": engine.global_options().groups.len(),
        "warnings": warnings,
    }))
}

fn load_engine(config: &Config) -> anyhow::Result<CommandEngine> {
    let path = config.require_catalog()?;
    let catalog = Catalog::load(path).context("Failed to load catalog")?;
    catalog
        .into_builder()
        .properties(config.resolution.properties.clone())
        .defaults(config.resolution.defaults.clone())
        .build()
        .context("Invalid catalog declarations")
}

fn describe_parameter(parameter: &ParameterSpec) -> Json {
    let kind = match parameter.kind {
        ParameterKind::Plain => "plain",
        ParameterKind::Option => "option",
        ParameterKind::BeanOption => "bean",
        ParameterKind::Internal => "internal",
    };
    let mut described = json!({
        "name": parameter.name,
        "kind": kind,
        "type": parameter.ty.to_string(),
        "required": parameter.is_required(),
    });
    if let Some(default) = &parameter.default {
        described["default"] = json!(default);
    }
    if parameter.kind == ParameterKind::BeanOption {
        described["nillable"] = json!(parameter.nillable);
        described["members"] = json!(parameter.members.iter().map(describe_parameter).collect::<Vec<_>>());
    }
    described
}

fn collect_converter_warnings(
    owner: &str,
    parameters: &[ParameterSpec],
    converters: &ConverterRegistry,
    warnings: &mut Vec<String>,
) {
    for parameter in parameters {
        if let ValueKind::Named(key) = &parameter.ty.kind {
            if parameter.kind != ParameterKind::Internal && !converters.contains(key) {
                warnings.push(format!(
                    "'{}' in '{}' has type '{}' with no stock converter",
                    parameter.name, owner, key
                ));
            }
        }
        collect_converter_warnings(owner, &parameter.members, converters, warnings);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{rendered}");
    Ok(())
}
