//! Invocation engine
//!
//! Drives one invocation end to end: split, property overrides, registry lookup,
//! global options, parameter binding, validation, interceptor chain, target.
//! The engine itself is immutable after [`EngineBuilder::build`] and can serve
//! concurrent invocations; all per-invocation state is local to [`CommandEngine::run`].

use crate::core::binder::{Binder, Internals};
use crate::core::converter::ConverterRegistry;
use crate::core::globals::parse_globals;
use crate::core::interceptor::{
    InterceptorTable, InvocationContext, builtin_interceptors,
};
use crate::core::registry::{CommandRegistry, check_globals};
use crate::core::spec::{CommandSpec, GlobalOptionsSpec, TargetDescriptor};
use crate::core::splitter::split;
use crate::core::substitution::{PROPERTIES_PREFIX, ResolverContext, SubstitutionEngine};
use crate::core::tokenizer::tokenize;
use crate::core::value::Value;
use crate::error::{EngineError, Result};
use crate::utils::env::{PropertiesContext, extract_property_overrides};
use crate::utils::process::ProcessProbe;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Internal parameter names the engine knows how to fill
pub mod internal {
    pub const COMMAND_NAME: &str = "command.name";
    pub const GLOBALS: &str = "globals";
    /// Prefix for one global group by name, e.g. `global.color`
    pub const GLOBAL_PREFIX: &str = "global.";
    pub const PIPELINE_INPUT: &str = "pipeline.input";
    pub const PIPELINE_STAGE: &str = "pipeline.stage";
    pub const TERMINAL_WIDTH: &str = "terminal.width";
}

/// Structural validator run on bound values before the interceptor chain
pub trait Validator: Send + Sync {
    /// Return every violation; an empty list accepts the invocation
    fn validate(&self, declaring_type: &str, target: &TargetDescriptor, args: &[Value]) -> Vec<String>;
}

impl<F> Validator for F
where
    F: Fn(&str, &TargetDescriptor, &[Value]) -> Vec<String> + Send + Sync,
{
    fn validate(&self, declaring_type: &str, target: &TargetDescriptor, args: &[Value]) -> Vec<String> {
        self(declaring_type, target, args)
    }
}

/// Result of one successful invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationOutcome {
    pub command: String,
    pub globals: Vec<Value>,
    /// Values as bound, before any interceptor rewrote them
    pub arguments: Vec<Value>,
    pub result: Value,
}

/// Builder collecting everything an engine needs
pub struct EngineBuilder {
    commands: Vec<CommandSpec>,
    globals: GlobalOptionsSpec,
    converters: ConverterRegistry,
    contexts: Vec<(String, Arc<dyn ResolverContext>)>,
    defaults: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
    validator: Option<Arc<dyn Validator>>,
    interceptors: InterceptorTable,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Builder with the stock converters and interceptors installed
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            globals: GlobalOptionsSpec::default(),
            converters: ConverterRegistry::with_builtins(),
            contexts: Vec::new(),
            defaults: BTreeMap::new(),
            properties: BTreeMap::new(),
            validator: None,
            interceptors: builtin_interceptors(),
        }
    }

    #[must_use]
    pub fn command(mut self, command: CommandSpec) -> Self {
        self.commands.push(command);
        self
    }

    #[must_use]
    pub fn commands(mut self, commands: impl IntoIterator<Item = CommandSpec>) -> Self {
        self.commands.extend(commands);
        self
    }

    #[must_use]
    pub fn globals(mut self, globals: GlobalOptionsSpec) -> Self {
        self.globals = globals;
        self
    }

    #[must_use]
    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = converters;
        self
    }

    #[must_use]
    pub fn converter<F>(mut self, key: impl Into<String>, convert: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.converters.register(key, convert);
        self
    }

    /// Add a resolver context under a name prefix such as `vault.`
    #[must_use]
    pub fn context(mut self, prefix: impl Into<String>, context: Arc<dyn ResolverContext>) -> Self {
        self.contexts.push((prefix.into(), context));
        self
    }

    /// Entry of the generic default-value context
    #[must_use]
    pub fn default_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn defaults(mut self, defaults: BTreeMap<String, String>) -> Self {
        self.defaults.extend(defaults);
        self
    }

    /// Base property seen through the `sys.` context
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties.extend(properties);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn interceptor<F>(mut self, name: impl Into<String>, interceptor: F) -> Self
    where
        F: Fn(&mut InvocationContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.interceptors.register(name, interceptor);
        self
    }

    #[must_use]
    pub fn interceptors(mut self, interceptors: InterceptorTable) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Validate declarations and freeze the engine
    pub fn build(self) -> Result<CommandEngine> {
        check_globals(&self.globals)?;
        let registry = CommandRegistry::build(self.commands)?;

        let mut substitution = SubstitutionEngine::new()
            .with_context(PROPERTIES_PREFIX, Arc::new(PropertiesContext::new(self.properties)))
            .with_defaults(Arc::new(PropertiesContext::new(self.defaults)));
        for (prefix, context) in self.contexts {
            substitution = substitution.with_context(prefix, context);
        }

        Ok(CommandEngine {
            registry: Arc::new(registry),
            globals: self.globals,
            converters: self.converters,
            substitution,
            validator: self.validator,
            interceptors: self.interceptors,
            probe: ProcessProbe::new(),
        })
    }
}

/// Binds and invokes commands from a frozen catalog
pub struct CommandEngine {
    registry: Arc<CommandRegistry>,
    globals: GlobalOptionsSpec,
    converters: ConverterRegistry,
    substitution: SubstitutionEngine,
    validator: Option<Arc<dyn Validator>>,
    interceptors: InterceptorTable,
    probe: ProcessProbe,
}

impl std::fmt::Debug for CommandEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEngine")
            .field("commands", &self.registry.names())
            .field("globals", &self.globals.groups.len())
            .field("substitution", &self.substitution)
            .field("interceptors", &self.interceptors)
            .finish_non_exhaustive()
    }
}

/// Pipeline position of an invocation
#[derive(Debug, Clone)]
struct Stage {
    index: usize,
    input: Value,
}

impl CommandEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn global_options(&self) -> &GlobalOptionsSpec {
        &self.globals
    }

    /// Run one argv: `[globals...] command [args...]`
    pub fn run<S: AsRef<str>>(&self, argv: &[S]) -> Result<InvocationOutcome> {
        self.invoke(argv, None, None)
    }

    /// Run one argv with extra interceptor handles for this run only
    pub fn run_with<S: AsRef<str>>(
        &self,
        argv: &[S],
        handlers: &InterceptorTable,
    ) -> Result<InvocationOutcome> {
        self.invoke(argv, None, Some(handlers))
    }

    /// Tokenize a raw line and run each pipeline stage in order.
    ///
    /// Each stage sees the previous stage's result as its `pipeline.input`.
    #[instrument(skip(self))]
    pub fn run_line(&self, line: &str) -> Result<Vec<InvocationOutcome>> {
        let stages = tokenize(line)?;
        let mut outcomes: Vec<InvocationOutcome> = Vec::with_capacity(stages.len());

        for (index, argv) in stages.iter().enumerate() {
            let input = outcomes
                .last()
                .map(|outcome| outcome.result.clone())
                .unwrap_or(Value::Null);
            let outcome = self.invoke(argv, Some(Stage { index, input }), None)?;
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    fn invoke<S: AsRef<str>>(
        &self,
        argv: &[S],
        stage: Option<Stage>,
        handlers: Option<&InterceptorTable>,
    ) -> Result<InvocationOutcome> {
        let split = split(argv);
        let Some(name) = split.command.as_deref() else {
            return Err(EngineError::EmptyCommand);
        };
        let command = self.registry.lookup(name)?;
        info!("Invoking '{}'", command.name);

        let (overrides, global_tokens) = extract_property_overrides(&split.global)?;
        let substitution = if overrides.is_empty() {
            Cow::Borrowed(&self.substitution)
        } else {
            debug!("Applying {} property override(s)", overrides.len());
            Cow::Owned(self.substitution.with_property_overrides(&overrides))
        };

        let binder = Binder::new(&self.converters, &substitution);
        let globals = parse_globals(&binder, &self.globals, &global_tokens)?;

        let internals = self.internals(&command, &globals, stage);
        let arguments = binder.with_internals(&internals).bind(&command, &split.args)?;

        if let Some(validator) = &self.validator {
            let violations = validator.validate(
                &command.target.declaring_type,
                &command.target,
                &arguments,
            );
            if !violations.is_empty() {
                debug!("Validation rejected '{}': {:?}", command.name, violations);
                return Err(EngineError::Validation { violations });
            }
        }

        let mut context = InvocationContext::new(&command, arguments.clone(), &self.interceptors);
        if let Some(handlers) = handlers {
            context = context.with_run_handlers(handlers);
        }
        let result = context.start()?;

        debug!("'{}' returned {}", command.name, result);
        Ok(InvocationOutcome {
            command: command.name.clone(),
            globals,
            arguments,
            result,
        })
    }

    fn internals(&self, command: &CommandSpec, globals: &[Value], stage: Option<Stage>) -> Internals {
        let mut internals = Internals::new();
        internals.insert(internal::COMMAND_NAME.to_string(), Value::text(&command.name));
        internals.insert(internal::GLOBALS.to_string(), Value::List(globals.to_vec()));
        for (group, value) in self.globals.groups.iter().zip(globals) {
            internals.insert(
                format!("{}{}", internal::GLOBAL_PREFIX, group.name),
                value.clone(),
            );
        }
        if let Some(stage) = stage {
            internals.insert(internal::PIPELINE_STAGE.to_string(), Value::Int(stage.index as i64));
            internals.insert(internal::PIPELINE_INPUT.to_string(), stage.input);
        }
        if command.internal_names().any(|n| n == internal::TERMINAL_WIDTH) {
            let width = self
                .probe
                .terminal_width()
                .map_or(Value::Null, |w| Value::Int(i64::from(w)));
            internals.insert(internal::TERMINAL_WIDTH.to_string(), width);
        }
        internals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spec::{ParameterSpec, TypeSpec, action};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo(name: &str) -> CommandSpec {
        CommandSpec::new(name, action(|args: &[Value]| Ok(Value::List(args.to_vec()))))
            .declared_in("Test")
    }

    fn color_globals() -> GlobalOptionsSpec {
        GlobalOptionsSpec::new(vec![ParameterSpec::bean(
            "color",
            "Color",
            vec![
                ParameterSpec::option("red", TypeSpec::int()).with_default("255"),
                ParameterSpec::option("green", TypeSpec::int()).with_default("165"),
                ParameterSpec::option("blue", TypeSpec::int()).with_default("0"),
            ],
        )])
    }

    #[test]
    fn test_engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CommandEngine>();
        assert_send_sync::<CommandRegistry>();
    }

    #[test]
    fn test_full_invocation() {
        let engine = CommandEngine::builder()
            .globals(color_globals())
            .command(
                echo("deploy")
                    .param(ParameterSpec::plain("env", TypeSpec::text()))
                    .param(ParameterSpec::option("force", TypeSpec::bool())),
            )
            .build()
            .unwrap();

        let outcome = engine
            .run(&["--red=12", "deploy", "--force", "staging"])
            .unwrap();
        assert_eq!(outcome.command, "deploy");
        let color = outcome.globals[0].as_bean().unwrap();
        assert_eq!(color.get("red"), Some(&Value::Int(12)));
        assert_eq!(
            outcome.result,
            Value::List(vec![Value::text("staging"), Value::Bool(true)])
        );
    }

    #[test]
    fn test_binding_failure_never_invokes_target() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let engine = CommandEngine::builder()
            .command(
                CommandSpec::new(
                    "count",
                    action(move |_: &[Value]| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Value::Null)
                    }),
                )
                .param(ParameterSpec::option("n", TypeSpec::int())),
            )
            .build()
            .unwrap();

        assert!(engine.run(&["count", "--n=abc"]).is_err());
        assert!(engine.run(&["count", "--bogus"]).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        engine.run(&["count", "--n=1"]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_and_unknown_commands() {
        let engine = CommandEngine::builder().command(echo("deploy")).build().unwrap();
        let empty: [&str; 0] = [];
        assert!(matches!(engine.run(&empty), Err(EngineError::EmptyCommand)));
        assert!(matches!(engine.run(&["--verbose"]), Err(EngineError::EmptyCommand)));
        assert!(matches!(
            engine.run(&["deplo"]),
            Err(EngineError::UnknownCommand { suggestion: Some(_), .. })
        ));
    }

    #[test]
    fn test_validator_aggregates_violations() {
        let validator = |declaring: &str, target: &TargetDescriptor, args: &[Value]| {
            let mut violations = Vec::new();
            assert_eq!(declaring, "Test");
            assert_eq!(target.handle, "resize");
            for (i, value) in args.iter().enumerate() {
                if value.as_int().is_some_and(|n| n < 0) {
                    violations.push(format!("arg{i} must not be negative"));
                }
            }
            violations
        };
        let engine = CommandEngine::builder()
            .validator(Arc::new(validator))
            .command(
                echo("resize")
                    .param(ParameterSpec::plain("w", TypeSpec::int()))
                    .param(ParameterSpec::plain("h", TypeSpec::int())),
            )
            .build()
            .unwrap();

        match engine.run(&["resize", "-1", "-2"]).unwrap_err() {
            EngineError::Validation { violations } => {
                assert_eq!(
                    violations,
                    vec!["arg0 must not be negative", "arg1 must not be negative"]
                );
            }
            other => panic!("Expected Validation, got {other:?}"),
        }
        assert!(engine.run(&["resize", "3", "4"]).is_ok());
    }

    #[test]
    fn test_property_override_is_per_invocation() {
        let engine = CommandEngine::builder()
            .property("mode", "prod")
            .command(
                echo("show")
                    .param(ParameterSpec::option("mode", TypeSpec::text()).with_default("${sys.mode}")),
            )
            .build()
            .unwrap();

        let outcome = engine.run(&["-Dmode=dev", "show"]).unwrap();
        assert_eq!(outcome.result, Value::List(vec![Value::text("dev")]));

        let outcome = engine.run(&["show"]).unwrap();
        assert_eq!(outcome.result, Value::List(vec![Value::text("prod")]));
    }

    #[test]
    fn test_property_override_keeps_custom_properties_context() {
        let secrets = |key: &str| (key == "token").then(|| "s3cret".to_string());
        let engine = CommandEngine::builder()
            .context("sys.", Arc::new(secrets))
            .command(
                echo("show")
                    .param(ParameterSpec::option("t", TypeSpec::text()).with_default("${sys.token}"))
                    .param(ParameterSpec::option("x", TypeSpec::text()).with_default("${sys.x:-none}")),
            )
            .build()
            .unwrap();

        assert_eq!(
            engine.run(&["show"]).unwrap().result,
            Value::List(vec![Value::text("s3cret"), Value::text("none")])
        );
        assert_eq!(
            engine.run(&["-Dx=y", "show"]).unwrap().result,
            Value::List(vec![Value::text("s3cret"), Value::text("y")])
        );
    }

    #[test]
    fn test_default_value_context_and_cycle() {
        let engine = CommandEngine::builder()
            .default_value("a", "${b}")
            .default_value("b", "${a}")
            .default_value("greeting", "hello")
            .command(echo("hi").param(ParameterSpec::option("g", TypeSpec::text()).with_default("${greeting}")))
            .command(echo("loop").param(ParameterSpec::option("x", TypeSpec::text()).with_default("${a}")))
            .build()
            .unwrap();

        assert_eq!(
            engine.run(&["hi"]).unwrap().result,
            Value::List(vec![Value::text("hello")])
        );
        match engine.run(&["loop"]).unwrap_err() {
            EngineError::CyclicSubstitution { chain } => assert_eq!(chain, "a->b->a"),
            other => panic!("Expected CyclicSubstitution, got {other:?}"),
        }
    }

    #[test]
    fn test_internal_parameters_from_engine() {
        let engine = CommandEngine::builder()
            .globals(color_globals())
            .command(
                echo("whoami")
                    .param(ParameterSpec::internal(internal::COMMAND_NAME))
                    .param(ParameterSpec::internal("global.color")),
            )
            .build()
            .unwrap();

        let outcome = engine.run(&["--blue=7", "whoami"]).unwrap();
        let Value::List(values) = outcome.result else {
            panic!("Expected list result");
        };
        assert_eq!(values[0], Value::text("whoami"));
        assert_eq!(
            values[1].as_bean().and_then(|b| b.get("blue")),
            Some(&Value::Int(7))
        );
    }

    #[test]
    fn test_run_line_pipes_results() {
        let engine = CommandEngine::builder()
            .command(
                CommandSpec::new(
                    "words",
                    action(|args: &[Value]| {
                        let text = args[0].as_str().unwrap_or_default();
                        Ok(Value::List(text.split_whitespace().map(Value::text).collect()))
                    }),
                )
                .param(ParameterSpec::plain("text", TypeSpec::text())),
            )
            .command(
                CommandSpec::new(
                    "count",
                    action(|args: &[Value]| match &args[0] {
                        Value::List(items) => Ok(Value::Int(items.len() as i64)),
                        _ => Ok(Value::Int(0)),
                    }),
                )
                .param(ParameterSpec::internal(internal::PIPELINE_INPUT)),
            )
            .build()
            .unwrap();

        let outcomes = engine.run_line("words 'a b c' | count").unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].result, Value::Int(3));
    }

    #[test]
    fn test_run_with_supplies_late_interceptor() {
        let engine = CommandEngine::builder()
            .command(echo("guarded").intercepted_by("audit"))
            .build()
            .unwrap();

        let args: [&str; 1] = ["guarded"];
        assert!(matches!(
            engine.run(&args),
            Err(EngineError::UnresolvedInterceptor { .. })
        ));

        let mut handlers = InterceptorTable::new();
        handlers.register("audit", |ctx: &mut InvocationContext<'_>| ctx.proceed());
        let outcome = engine.run_with(&args, &handlers).unwrap();
        assert_eq!(outcome.result, Value::List(Vec::new()));
    }

    #[test]
    fn test_target_engine_error_propagates_unwrapped() {
        let engine = CommandEngine::builder()
            .command(CommandSpec::new(
                "nested",
                action(|_: &[Value]| Err(EngineError::EmptyCommand.into())),
            ))
            .build()
            .unwrap();
        assert!(matches!(engine.run(&["nested"]), Err(EngineError::EmptyCommand)));
    }

    #[test]
    fn test_concurrent_invocations() {
        let engine = CommandEngine::builder()
            .command(
                echo("add")
                    .param(ParameterSpec::plain("a", TypeSpec::int()))
                    .param(ParameterSpec::plain("b", TypeSpec::int())),
            )
            .build()
            .unwrap();

        std::thread::scope(|scope| {
            for i in 0..8i64 {
                let engine = &engine;
                scope.spawn(move || {
                    let a = i.to_string();
                    let b = (i * 2).to_string();
                    let outcome = engine.run(&["add", a.as_str(), b.as_str()]).unwrap();
                    assert_eq!(
                        outcome.result,
                        Value::List(vec![Value::Int(i), Value::Int(i * 2)])
                    );
                });
            }
        });
    }

    #[test]
    fn test_build_rejects_duplicate_options() {
        let result = CommandEngine::builder()
            .command(
                echo("dup")
                    .param(ParameterSpec::option("x", TypeSpec::int()))
                    .param(ParameterSpec::bean(
                        "g",
                        "G",
                        vec![ParameterSpec::option("x", TypeSpec::int())],
                    )),
            )
            .build();
        assert!(matches!(result, Err(EngineError::DuplicateOptionName { .. })));
    }
}
