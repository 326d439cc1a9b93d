//! JSON declaration catalog
//!
//! Loads command, global option and enum declarations from a JSON document and
//! turns them into specs. Targets are picked by name from a small set of stock
//! actions; interceptor names are kept as written and resolved by the engine
//! when a chain first reaches them.
//!
//! ```json
//! {
//!   "enums": [{ "name": "Level", "constants": ["LOW", "HIGH"] }],
//!   "globals": [
//!     { "kind": "bean", "name": "color", "type": "Color", "members": [
//!       { "kind": "option", "name": "red", "type": "int", "default": "255" }
//!     ]}
//!   ],
//!   "commands": [
//!     { "name": "deploy", "target": "echo", "interceptors": ["trace"], "parameters": [
//!       { "kind": "plain", "name": "env", "type": "text" },
//!       { "kind": "option", "name": "level", "type": "enum:Level?" }
//!     ]}
//!   ]
//! }
//! ```

use crate::core::engine::EngineBuilder;
use crate::core::spec::{
    CommandSpec, CommandTarget, EnumType, GlobalOptionsSpec, ParameterSpec, TypeSpec, ValueKind,
    action,
};
use crate::core::value::Value;
use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Names of the stock target actions a catalog can refer to
pub const BUILTIN_TARGETS: &[&str] = &["echo", "join", "fail"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    enums: Vec<EnumDecl>,
    #[serde(default)]
    globals: Vec<ParameterDecl>,
    #[serde(default)]
    commands: Vec<CommandDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnumDecl {
    name: String,
    constants: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandDecl {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_target")]
    target: String,
    #[serde(default)]
    declared_in: Option<String>,
    #[serde(default)]
    returns: Option<String>,
    #[serde(default)]
    interceptors: Vec<String>,
    #[serde(default)]
    parameters: Vec<ParameterDecl>,
}

fn default_target() -> String {
    "echo".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DeclKind {
    Plain,
    Option,
    Bean,
    Internal,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParameterDecl {
    kind: DeclKind,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    ty: Option<String>,
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    nillable: bool,
    #[serde(default)]
    members: Vec<ParameterDecl>,
}

/// Declarations read from one catalog document
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub commands: Vec<CommandSpec>,
    pub globals: GlobalOptionsSpec,
    pub enums: Vec<Arc<EnumType>>,
}

impl Catalog {
    /// Read and parse a catalog file
    #[instrument]
    pub fn load<P: AsRef<Path> + std::fmt::Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading catalog: {}", path.display());

        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::file_system("read", path.to_path_buf(), e))?;
        let catalog = Self::from_json(&content, path)?;

        info!(
            "Loaded {} command(s) and {} global group(s) from {}",
            catalog.commands.len(),
            catalog.globals.groups.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Parse catalog text; `origin` is only used in error messages
    pub fn from_json(content: &str, origin: &Path) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(content).map_err(|e| EngineError::Catalog {
            message: format!("invalid catalog document: {e}"),
            path: origin.to_path_buf(),
            source: Some(e.into()),
        })?;
        Resolver::new(origin, &file.enums)?.resolve(file)
    }

    /// Engine builder pre-loaded with these declarations
    pub fn into_builder(self) -> EngineBuilder {
        EngineBuilder::new()
            .globals(self.globals)
            .commands(self.commands)
    }
}

/// Stock target action by name
pub fn builtin_target(name: &str) -> Option<Arc<dyn CommandTarget>> {
    let target = match name {
        "echo" => action(|args: &[Value]| Ok(Value::List(args.to_vec()))),
        "join" => action(|args: &[Value]| {
            let parts: Vec<String> = args
                .iter()
                .filter(|value| !value.is_null())
                .map(ToString::to_string)
                .collect();
            Ok(Value::Text(parts.join(" ")))
        }),
        "fail" => action(|args: &[Value]| {
            let detail: Vec<String> = args.iter().map(ToString::to_string).collect();
            Err(anyhow::anyhow!("command failed: [{}]", detail.join(", ")))
        }),
        _ => return None,
    };
    Some(target)
}

/// Turns raw declarations into specs against one set of enum types
struct Resolver {
    origin: PathBuf,
    enums: HashMap<String, Arc<EnumType>>,
}

impl Resolver {
    fn new(origin: &Path, decls: &[EnumDecl]) -> Result<Self> {
        let mut enums = HashMap::new();
        for decl in decls {
            if decl.constants.is_empty() {
                return Err(EngineError::catalog(
                    format!("enum '{}' declares no constants", decl.name),
                    origin,
                ));
            }
            let enum_type = Arc::new(EnumType::new(&decl.name, decl.constants.iter().cloned()));
            if enums.insert(decl.name.clone(), enum_type).is_some() {
                return Err(EngineError::catalog(
                    format!("enum '{}' is declared twice", decl.name),
                    origin,
                ));
            }
        }
        Ok(Self {
            origin: origin.to_path_buf(),
            enums,
        })
    }

    fn resolve(&self, file: CatalogFile) -> Result<Catalog> {
        let globals = file
            .globals
            .into_iter()
            .map(|decl| self.parameter(decl))
            .collect::<Result<Vec<_>>>()?;
        let commands = file
            .commands
            .into_iter()
            .map(|decl| self.command(decl))
            .collect::<Result<Vec<_>>>()?;

        let mut enums: Vec<Arc<EnumType>> = self.enums.values().cloned().collect();
        enums.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Catalog {
            commands,
            globals: GlobalOptionsSpec::new(globals),
            enums,
        })
    }

    fn command(&self, decl: CommandDecl) -> Result<CommandSpec> {
        let target = builtin_target(&decl.target).ok_or_else(|| {
            self.error(format!(
                "command '{}' uses unknown target '{}' (available: {})",
                decl.name,
                decl.target,
                BUILTIN_TARGETS.join(", ")
            ))
        })?;

        let mut spec = CommandSpec::new(&decl.name, target)
            .declared_in(decl.declared_in.unwrap_or_else(|| "catalog".to_string()))
            .handle(&decl.target);
        if let Some(description) = decl.description {
            spec = spec.describe(description);
        }
        if let Some(returns) = decl.returns {
            spec = spec.returns(self.type_spec(&returns)?);
        }
        for interceptor in decl.interceptors {
            spec = spec.intercepted_by(interceptor);
        }
        for parameter in decl.parameters {
            spec = spec.param(self.parameter(parameter)?);
        }
        Ok(spec)
    }

    fn parameter(&self, decl: ParameterDecl) -> Result<ParameterSpec> {
        let mut spec = match decl.kind {
            DeclKind::Plain => ParameterSpec::plain(&decl.name, self.declared_type(&decl)?),
            DeclKind::Option => ParameterSpec::option(&decl.name, self.declared_type(&decl)?),
            DeclKind::Internal => ParameterSpec::internal(&decl.name),
            DeclKind::Bean => {
                let type_name = decl.ty.clone().unwrap_or_else(|| decl.name.clone());
                let members = decl
                    .members
                    .into_iter()
                    .map(|member| self.parameter(member))
                    .collect::<Result<Vec<_>>>()?;
                ParameterSpec::bean(&decl.name, type_name, members)
            }
        };
        if let Some(default) = decl.default {
            spec = spec.with_default(default);
        }
        if decl.nillable {
            spec = spec.nillable();
        }
        Ok(spec)
    }

    fn declared_type(&self, decl: &ParameterDecl) -> Result<TypeSpec> {
        match &decl.ty {
            Some(ty) => self.type_spec(ty),
            None => Ok(TypeSpec::text()),
        }
    }

    /// Parse `int`, `text?`, `enum:Level`, or any other name as a converter key
    fn type_spec(&self, raw: &str) -> Result<TypeSpec> {
        let raw = raw.trim();
        let (base, nullable) = match raw.strip_suffix('?') {
            Some(base) => (base.trim(), true),
            None => (raw, false),
        };

        let kind = match base {
            "" => return Err(self.error("empty type name")),
            "bool" | "boolean" => ValueKind::Bool,
            "int" | "integer" => ValueKind::Int,
            "float" | "double" => ValueKind::Float,
            "text" | "string" => ValueKind::Text,
            other => match other.strip_prefix("enum:") {
                Some(name) => {
                    let enum_type = self
                        .enums
                        .get(name)
                        .ok_or_else(|| self.error(format!("unknown enum type '{name}'")))?;
                    ValueKind::Enum(Arc::clone(enum_type))
                }
                None => ValueKind::Named(other.to_string()),
            },
        };

        let spec = TypeSpec::new(kind);
        Ok(if nullable { spec.nullable() } else { spec })
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::catalog(message, self.origin.clone())
    }
}
