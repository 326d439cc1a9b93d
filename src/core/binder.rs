//! Parameter binding
//!
//! Matches a command's arguments to its parameter specs. Arguments are first
//! partitioned into option tokens and positional tokens, each keeping its
//! relative order. Parameters are then walked in declaration order:
//!
//! - plain parameters take the next positional token,
//! - options take (and consume) their token from the shared option pool, falling
//!   back to the default expression, then to null or the type's zero value,
//! - bean options bind their members recursively against the same pool,
//! - internal parameters receive engine-supplied invocation facts.
//!
//! Any option token left in the pool afterwards is unknown. Nothing is invoked
//! until binding has fully succeeded.

use crate::core::converter::ConverterRegistry;
use crate::core::spec::{CommandSpec, ParameterKind, ParameterSpec};
use crate::core::substitution::SubstitutionEngine;
use crate::core::value::{Bean, Value};
use crate::error::{EngineError, Result};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, instrument, trace};

/// Marks the end of options; later tokens are positional
const END_OF_OPTIONS: &str = "--";

/// Engine-supplied values for internal parameters, keyed by parameter name
pub type Internals = BTreeMap<String, Value>;

/// One option token from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
struct OptionToken {
    name: String,
    value: Option<String>,
    raw: String,
    consumed: bool,
}

/// Option tokens shared by every parameter bound in one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionPool {
    tokens: Vec<OptionToken>,
}

/// A matched option: the token as written and its `=value`, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionMatch {
    pub raw: String,
    pub value: Option<String>,
}

impl OptionPool {
    /// Consume every occurrence of `name`; the last one wins
    pub fn take(&mut self, name: &str) -> Option<OptionMatch> {
        let mut found = None;
        for token in self.tokens.iter_mut().filter(|t| !t.consumed && t.name == name) {
            token.consumed = true;
            found = Some(OptionMatch {
                raw: token.raw.clone(),
                value: token.value.clone(),
            });
        }
        found
    }

    /// Whether any unconsumed token carries one of `names`
    pub fn contains_any(&self, names: &[&str]) -> bool {
        self.tokens
            .iter()
            .any(|t| !t.consumed && names.contains(&t.name.as_str()))
    }

    /// Raw text of tokens nobody consumed
    pub fn unconsumed(&self) -> impl Iterator<Item = &str> {
        self.tokens
            .iter()
            .filter(|t| !t.consumed)
            .map(|t| t.raw.as_str())
    }

    /// Fail with the first token nobody consumed
    pub fn ensure_consumed(&self) -> Result<()> {
        match self.unconsumed().next() {
            Some(raw) => Err(EngineError::unknown_option(raw)),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Arguments split into option tokens and positional tokens
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub options: OptionPool,
    pub positionals: VecDeque<String>,
}

/// Partition arguments into options and positionals, keeping relative order
pub fn partition<S: AsRef<str>>(args: &[S]) -> Partition {
    let mut partition = Partition::default();
    let mut options_ended = false;

    for arg in args {
        let token = arg.as_ref();
        if options_ended {
            partition.positionals.push_back(token.to_string());
            continue;
        }
        if token == END_OF_OPTIONS {
            options_ended = true;
            continue;
        }

        let body = if let Some(long) = token.strip_prefix("--") {
            Some(long)
        } else if token.len() > 1 && token.starts_with('-') && !looks_numeric(token) {
            Some(&token[1..])
        } else {
            None
        };

        match body {
            Some(body) => {
                let (name, value) = match body.split_once('=') {
                    Some((name, value)) => (name, Some(value.to_string())),
                    None => (body, None),
                };
                partition.options.tokens.push(OptionToken {
                    name: name.to_string(),
                    value,
                    raw: token.to_string(),
                    consumed: false,
                });
            }
            None => partition.positionals.push_back(token.to_string()),
        }
    }

    partition
}

/// Negative numbers are positional, not short options
fn looks_numeric(token: &str) -> bool {
    token[1..]
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '.')
        && token.parse::<f64>().is_ok()
}

/// A bound value and whether it came from a literal token
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub value: Value,
    pub literal: bool,
}

impl Bound {
    fn literal(value: Value) -> Self {
        Self {
            value,
            literal: true,
        }
    }

    fn derived(value: Value) -> Self {
        Self {
            value,
            literal: false,
        }
    }
}

/// Binds arguments to parameter specs
#[derive(Debug, Clone, Copy)]
pub struct Binder<'a> {
    converters: &'a ConverterRegistry,
    substitution: &'a SubstitutionEngine,
    internals: Option<&'a Internals>,
}

impl<'a> Binder<'a> {
    pub fn new(converters: &'a ConverterRegistry, substitution: &'a SubstitutionEngine) -> Self {
        Self {
            converters,
            substitution,
            internals: None,
        }
    }

    #[must_use]
    pub fn with_internals(mut self, internals: &'a Internals) -> Self {
        self.internals = Some(internals);
        self
    }

    /// Bind `args` to the parameters of `spec`
    #[instrument(skip(self, spec), fields(command = %spec.name))]
    pub fn bind<S: AsRef<str> + std::fmt::Debug>(
        &self,
        spec: &CommandSpec,
        args: &[S],
    ) -> Result<Vec<Value>> {
        let Partition {
            mut options,
            mut positionals,
        } = partition(args);

        let bound = self.bind_parameters(&spec.parameters, &mut options, &mut positionals)?;

        options.ensure_consumed()?;
        if let Some(extra) = positionals.pop_front() {
            return Err(EngineError::UnexpectedArgument { value: extra });
        }

        debug!("Bound {} parameter(s) for '{}'", bound.len(), spec.name);
        Ok(bound.into_iter().map(|b| b.value).collect())
    }

    /// Bind a parameter list in declaration order against a shared pool
    pub fn bind_parameters(
        &self,
        parameters: &[ParameterSpec],
        options: &mut OptionPool,
        positionals: &mut VecDeque<String>,
    ) -> Result<Vec<Bound>> {
        let mut bound = Vec::with_capacity(parameters.len());
        for (index, parameter) in parameters.iter().enumerate() {
            let value = match parameter.kind {
                ParameterKind::Plain => self.bind_plain(parameter, index, positionals)?,
                ParameterKind::Option => self.bind_option(parameter, options)?,
                ParameterKind::BeanOption => self.bind_bean(parameter, options, positionals)?,
                ParameterKind::Internal => self.bind_internal(parameter),
            };
            trace!("Parameter '{}' bound to {:?}", parameter.name, value.value);
            bound.push(value);
        }
        Ok(bound)
    }

    fn bind_plain(
        &self,
        parameter: &ParameterSpec,
        index: usize,
        positionals: &mut VecDeque<String>,
    ) -> Result<Bound> {
        let label = if parameter.name.is_empty() {
            format!("arg{index}")
        } else {
            parameter.name.clone()
        };

        if let Some(token) = positionals.pop_front() {
            let value = self.converters.convert(Value::Text(token), &parameter.ty, &label)?;
            return Ok(Bound::literal(value));
        }

        match self.resolve_default(parameter, &label)? {
            Some(value) => Ok(Bound::derived(value)),
            None => Err(EngineError::missing_argument(
                label,
                "no positional argument left",
            )),
        }
    }

    fn bind_option(&self, parameter: &ParameterSpec, options: &mut OptionPool) -> Result<Bound> {
        let label = format!("--{}", parameter.name);

        if let Some(matched) = options.take(&parameter.name) {
            let raw = match matched.value {
                Some(text) => Value::Text(text),
                None if parameter.ty.is_bool() => Value::Bool(true),
                None => {
                    return Err(EngineError::missing_argument(
                        label,
                        format!("option {} requires a value", matched.raw),
                    ));
                }
            };
            let value = self.converters.convert(raw, &parameter.ty, &label)?;
            return Ok(Bound::literal(value));
        }

        if let Some(value) = self.resolve_default(parameter, &label)? {
            return Ok(Bound::derived(value));
        }
        if parameter.ty.nullable {
            return Ok(Bound::derived(Value::Null));
        }
        if let Some(zero) = parameter.ty.zero_value() {
            return Ok(Bound::derived(zero));
        }
        Err(EngineError::missing_argument(
            label,
            format!("required option of type {} was not given", parameter.ty),
        ))
    }

    fn bind_bean(
        &self,
        parameter: &ParameterSpec,
        options: &mut OptionPool,
        positionals: &mut VecDeque<String>,
    ) -> Result<Bound> {
        let names = parameter.option_names();
        if parameter.nillable && !options.contains_any(&names) {
            debug!("No option of nillable '{}' was given", parameter.name);
            return Ok(Bound::derived(Value::Null));
        }

        let members = self.bind_parameters(&parameter.members, options, positionals)?;
        let literal = members.iter().any(|m| m.literal);
        let bean = Bean {
            type_name: parameter.bean_type().to_string(),
            fields: parameter
                .members
                .iter()
                .zip(members)
                .map(|(member, bound)| (member.name.clone(), bound.value))
                .collect(),
        };
        Ok(Bound {
            value: Value::Bean(bean),
            literal,
        })
    }

    fn bind_internal(&self, parameter: &ParameterSpec) -> Bound {
        let value = self
            .internals
            .and_then(|internals| internals.get(&parameter.name))
            .cloned()
            .unwrap_or(Value::Null);
        Bound::derived(value)
    }

    /// Evaluate the default expression, `None` when absent or unresolved
    fn resolve_default(&self, parameter: &ParameterSpec, label: &str) -> Result<Option<Value>> {
        let Some(expression) = parameter.default.as_deref() else {
            return Ok(None);
        };
        match self.substitution.substitute(expression)? {
            Some(text) => {
                let value = self.converters.convert(Value::Text(text), &parameter.ty, label)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}
