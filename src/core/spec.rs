//! Command and parameter declarations
//!
//! Specs are assembled once by a declaration source (see [`crate::core::catalog`])
//! and never mutated afterwards. Per-invocation state lives elsewhere.

use crate::core::value::Value;
use std::fmt;
use std::sync::Arc;

/// Declared enum type with its constants in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub constants: Vec<String>,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, constants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            constants: constants.into_iter().map(Into::into).collect(),
        }
    }
}

/// Kind of a declared type, without nullability
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Enum(Arc<EnumType>),
    /// Nested option object, identified by its type name
    Bean(String),
    /// Type resolved through the converter registry under this key
    Named(String),
}

impl ValueKind {
    /// Key used for converter registry lookups
    pub fn key(&self) -> &str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Enum(e) => &e.name,
            Self::Bean(name) | Self::Named(name) => name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

/// Declared type of a parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub kind: ValueKind,
    /// Nullable types bind `Null` when absent instead of failing
    pub nullable: bool,
}

impl TypeSpec {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    pub fn bool() -> Self {
        Self::new(ValueKind::Bool)
    }

    pub fn int() -> Self {
        Self::new(ValueKind::Int)
    }

    pub fn float() -> Self {
        Self::new(ValueKind::Float)
    }

    pub fn text() -> Self {
        Self::new(ValueKind::Text)
    }

    pub fn named(key: impl Into<String>) -> Self {
        Self::new(ValueKind::Named(key.into()))
    }

    pub fn enumeration(enum_type: Arc<EnumType>) -> Self {
        Self::new(ValueKind::Enum(enum_type))
    }

    pub fn bean(type_name: impl Into<String>) -> Self {
        Self::new(ValueKind::Bean(type_name.into()))
    }

    /// Same kind, nullable
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Value bound when an absent parameter has neither token nor default
    pub fn zero_value(&self) -> Option<Value> {
        if self.nullable {
            return None;
        }
        match self.kind {
            ValueKind::Bool => Some(Value::Bool(false)),
            ValueKind::Int => Some(Value::Int(0)),
            ValueKind::Float => Some(Value::Float(0.0)),
            _ => None,
        }
    }

    pub fn is_bool(&self) -> bool {
        self.kind == ValueKind::Bool
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Enum(e) => write!(f, "enum:{}", e.name)?,
            ValueKind::Bean(name) => write!(f, "bean:{name}")?,
            kind => write!(f, "{}", kind.key())?,
        }
        if self.nullable {
            write!(f, "?")?;
        }
        Ok(())
    }
}

/// How a parameter receives its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Bound positionally, in declaration order
    Plain,
    /// Bound by `--name[=value]` or `-name`
    Option,
    /// Nested group of options materialized as a [`crate::core::value::Bean`]
    BeanOption,
    /// Supplied by the engine from invocation facts
    Internal,
}

/// One parameter slot of a command
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub kind: ParameterKind,
    pub name: String,
    pub ty: TypeSpec,
    /// Default-value expression, may contain `${...}` substitutions
    pub default: Option<String>,
    /// Members of a bean option
    pub members: Vec<ParameterSpec>,
    /// Bean option binds `Null` when none of its members matched a token
    pub nillable: bool,
}

impl ParameterSpec {
    fn with_kind(kind: ParameterKind, name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            kind,
            name: name.into(),
            ty,
            default: None,
            members: Vec::new(),
            nillable: false,
        }
    }

    /// Positional parameter; the name is informational only
    pub fn plain(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self::with_kind(ParameterKind::Plain, name, ty)
    }

    pub fn option(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self::with_kind(ParameterKind::Option, name, ty)
    }

    pub fn bean(
        name: impl Into<String>,
        type_name: impl Into<String>,
        members: Vec<ParameterSpec>,
    ) -> Self {
        let mut spec = Self::with_kind(ParameterKind::BeanOption, name, TypeSpec::bean(type_name));
        spec.members = members;
        spec
    }

    pub fn internal(name: impl Into<String>) -> Self {
        Self::with_kind(ParameterKind::Internal, name, TypeSpec::text().nullable())
    }

    #[must_use]
    pub fn with_default(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(expression.into());
        self
    }

    #[must_use]
    pub fn nillable(mut self) -> Self {
        self.nillable = true;
        self
    }

    /// Positionals are required unless they carry a default; options also
    /// need a non-nullable type without a zero value
    pub fn is_required(&self) -> bool {
        match self.kind {
            ParameterKind::BeanOption => {
                !self.nillable && self.members.iter().any(ParameterSpec::is_required)
            }
            ParameterKind::Internal => false,
            ParameterKind::Plain => self.default.is_none(),
            ParameterKind::Option => self.default.is_none() && !self.ty.nullable && self.ty.zero_value().is_none(),
        }
    }

    /// Type name of a bean option
    pub fn bean_type(&self) -> &str {
        self.ty.kind.key()
    }

    /// Option names reachable from this parameter, nested members included
    pub fn option_names(&self) -> Vec<&str> {
        match self.kind {
            ParameterKind::Option => vec![self.name.as_str()],
            ParameterKind::BeanOption => self
                .members
                .iter()
                .flat_map(ParameterSpec::option_names)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Describes the action a command invokes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    /// Type that declared the command
    pub declaring_type: String,
    /// Handle name of the action
    pub handle: String,
    pub returns: Option<TypeSpec>,
}

/// Action invoked once binding, validation and every interceptor have passed
pub trait CommandTarget: Send + Sync {
    fn invoke(&self, args: &[Value]) -> anyhow::Result<Value>;
}

impl<F> CommandTarget for F
where
    F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync,
{
    fn invoke(&self, args: &[Value]) -> anyhow::Result<Value> {
        self(args)
    }
}

/// Wrap a closure as a shareable target handle
pub fn action<F>(f: F) -> Arc<dyn CommandTarget>
where
    F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Immutable description of one invocable command
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    pub target: TargetDescriptor,
    pub action: Arc<dyn CommandTarget>,
    /// Interceptor references, resolved when the chain reaches them
    pub interceptors: Vec<String>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, action: Arc<dyn CommandTarget>) -> Self {
        let name = name.into();
        Self {
            target: TargetDescriptor {
                declaring_type: String::new(),
                handle: name.clone(),
                returns: None,
            },
            name,
            description: String::new(),
            parameters: Vec::new(),
            action,
            interceptors: Vec::new(),
        }
    }

    #[must_use]
    pub fn declared_in(mut self, declaring_type: impl Into<String>) -> Self {
        self.target.declaring_type = declaring_type.into();
        self
    }

    #[must_use]
    pub fn handle(mut self, handle: impl Into<String>) -> Self {
        self.target.handle = handle.into();
        self
    }

    #[must_use]
    pub fn returns(mut self, ty: TypeSpec) -> Self {
        self.target.returns = Some(ty);
        self
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn param(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn intercepted_by(mut self, interceptor: impl Into<String>) -> Self {
        self.interceptors.push(interceptor.into());
        self
    }

    /// Names of internal parameters, nested ones excluded
    pub fn internal_names(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.kind == ParameterKind::Internal)
            .map(|p| p.name.as_str())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("target", &self.target)
            .field("interceptors", &self.interceptors)
            .finish_non_exhaustive()
    }
}

/// Global option groups bound ahead of the command name
#[derive(Debug, Clone, Default)]
pub struct GlobalOptionsSpec {
    /// Each group is a bean option; `nillable` applies per group
    pub groups: Vec<ParameterSpec>,
}

impl GlobalOptionsSpec {
    pub fn new(groups: Vec<ParameterSpec>) -> Self {
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
