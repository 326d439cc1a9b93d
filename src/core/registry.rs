//! Immutable command catalog
//!
//! Built once from externally supplied declarations. Structural problems
//! (duplicate names, duplicate options in a flattened parameter set, misplaced
//! parameter kinds) are rejected here, before anything can be invoked.

use crate::core::spec::{CommandSpec, GlobalOptionsSpec, ParameterKind, ParameterSpec};
use crate::error::{EngineError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Read-only command lookup shared by every invocation
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<Arc<CommandSpec>>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    /// Validate and index the declarations, preserving their order
    #[instrument(skip(commands), fields(count = commands.len()))]
    pub fn build(commands: Vec<CommandSpec>) -> Result<Self> {
        let mut registry = Self::default();

        for command in commands {
            if command.name.is_empty() || command.name.starts_with('-') {
                return Err(EngineError::invalid_declaration(
                    &command.name,
                    "command names must be non-empty and must not start with '-'",
                ));
            }
            if registry.index.contains_key(&command.name) {
                return Err(EngineError::DuplicateCommand { name: command.name });
            }
            check_parameters(&command.name, &command.parameters, false)?;
            check_unique_options(&command.name, &command.parameters)?;

            debug!(
                "Registered command '{}' ({} parameter(s), {} interceptor(s))",
                command.name,
                command.parameters.len(),
                command.interceptors.len()
            );
            registry
                .index
                .insert(command.name.clone(), registry.commands.len());
            registry.commands.push(Arc::new(command));
        }

        info!("Command registry built with {} command(s)", registry.len());
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<Arc<CommandSpec>> {
        self.index.get(name).map(|&i| Arc::clone(&self.commands[i]))
    }

    /// Look up a command, suggesting a close match when it is unknown
    pub fn lookup(&self, name: &str) -> Result<Arc<CommandSpec>> {
        self.get(name)
            .ok_or_else(|| EngineError::unknown_command(name, self.suggest(name)))
    }

    /// Commands in declaration order
    pub fn commands(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.iter().map(AsRef::as_ref)
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Closest registered name: prefix match first, then small edit distance
    pub fn suggest(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        if let Some(prefixed) = self.commands.iter().find(|c| c.name.starts_with(name)) {
            return Some(prefixed.name.clone());
        }

        let (candidate, distance) = self
            .commands
            .iter()
            .map(|c| (c.name.as_str(), levenshtein_distance(name, &c.name)))
            .min_by_key(|(_, distance)| *distance)?;
        let threshold = match name.chars().count() {
            0..=4 => 1,
            5..=8 => 2,
            _ => 3,
        };
        (distance <= threshold).then(|| candidate.to_string())
    }
}

/// Check global option groups the same way command parameters are checked
pub fn check_globals(globals: &GlobalOptionsSpec) -> Result<()> {
    for group in &globals.groups {
        if group.kind != ParameterKind::BeanOption {
            return Err(EngineError::invalid_declaration(
                "<global>",
                format!("global group '{}' must be a bean option", group.name),
            ));
        }
        check_parameters("<global>", std::slice::from_ref(group), false)?;
        check_unique_options(&format!("<global:{}>", group.name), std::slice::from_ref(group))?;
    }
    Ok(())
}

fn check_parameters(command: &str, parameters: &[ParameterSpec], nested: bool) -> Result<()> {
    for parameter in parameters {
        match parameter.kind {
            ParameterKind::Plain | ParameterKind::Internal if nested => {
                return Err(EngineError::invalid_declaration(
                    command,
                    format!(
                        "bean member '{}' must be an option or a bean option",
                        parameter.name
                    ),
                ));
            }
            ParameterKind::Option | ParameterKind::BeanOption | ParameterKind::Internal
                if parameter.name.is_empty() =>
            {
                return Err(EngineError::invalid_declaration(
                    command,
                    "option, bean option and internal parameters need a name",
                ));
            }
            ParameterKind::BeanOption => check_parameters(command, &parameter.members, true)?,
            _ => {}
        }
    }
    Ok(())
}

fn check_unique_options(command: &str, parameters: &[ParameterSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in parameters.iter().flat_map(ParameterSpec::option_names) {
        if !seen.insert(name) {
            return Err(EngineError::DuplicateOptionName {
                command: command.to_string(),
                option: name.to_string(),
            });
        }
    }
    Ok(())
}

fn levenshtein_distance(left: &str, right: &str) -> usize {
    let right_chars: Vec<char> = right.chars().collect();
    let mut previous: Vec<usize> = (0..=right_chars.len()).collect();
    let mut current = vec![0; right_chars.len() + 1];

    for (i, lc) in left.chars().enumerate() {
        current[0] = i + 1;
        for (j, rc) in right_chars.iter().enumerate() {
            let substitution = previous[j] + usize::from(lc != *rc);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(substitution);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[right_chars.len()]
}
