//! Global option groups
//!
//! Every group binds against one shared pool of option tokens, in declaration
//! order, so a token consumed by an earlier group is invisible to later ones.

use crate::core::binder::{Binder, partition};
use crate::core::spec::{GlobalOptionsSpec, ParameterKind};
use crate::core::value::Value;
use crate::error::{EngineError, Result};
use std::collections::VecDeque;
use tracing::{debug, instrument};

/// Bind global tokens to the option groups; one entry per group
#[instrument(skip(binder, globals))]
pub fn parse_globals<S: AsRef<str> + std::fmt::Debug>(
    binder: &Binder<'_>,
    globals: &GlobalOptionsSpec,
    tokens: &[S],
) -> Result<Vec<Value>> {
    let mut partition = partition(tokens);
    let mut no_positionals = VecDeque::new();
    let mut values = Vec::with_capacity(globals.groups.len());

    for group in &globals.groups {
        if group.kind != ParameterKind::BeanOption {
            return Err(EngineError::invalid_declaration(
                "<global>",
                format!("global group '{}' must be a bean option", group.name),
            ));
        }
        let mut bound = binder.bind_parameters(
            std::slice::from_ref(group),
            &mut partition.options,
            &mut no_positionals,
        )?;
        let value = bound.pop().map(|b| b.value).unwrap_or(Value::Null);
        debug!("Global group '{}' bound to {}", group.name, value);
        values.push(value);
    }

    partition.options.ensure_consumed()?;
    if let Some(stray) = partition.positionals.pop_front() {
        return Err(EngineError::unknown_option(stray));
    }

    Ok(values)
}
