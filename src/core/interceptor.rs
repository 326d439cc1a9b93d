//! Interceptor chain around the target invocation
//!
//! The stages of one invocation are the command's interceptor references followed
//! by the target itself. Each interceptor decides whether and how often to call
//! [`InvocationContext::proceed`]: never (short-circuit), once (pass-through) or
//! several times (fan-out, each call re-entering the next stage). References are
//! resolved only when the chain reaches them.

use crate::core::spec::{CommandSpec, TargetDescriptor};
use crate::core::value::Value;
use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

/// One stage wrapping the rest of the chain
pub trait Interceptor: Send + Sync {
    fn intercept(&self, ctx: &mut InvocationContext<'_>) -> Result<Value>;
}

impl<F> Interceptor for F
where
    F: Fn(&mut InvocationContext<'_>) -> Result<Value> + Send + Sync,
{
    fn intercept(&self, ctx: &mut InvocationContext<'_>) -> Result<Value> {
        self(ctx)
    }
}

/// Name to interceptor handle lookup
#[derive(Clone, Default)]
pub struct InterceptorTable {
    handlers: HashMap<String, Arc<dyn Interceptor>>,
}

impl std::fmt::Debug for InterceptorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("InterceptorTable").field("names", &names).finish()
    }
}

impl InterceptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure interceptor under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, interceptor: F)
    where
        F: Fn(&mut InvocationContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(interceptor));
    }

    /// Register a shared interceptor object under `name`
    pub fn insert(&mut self, name: impl Into<String>, interceptor: Arc<dyn Interceptor>) {
        self.handlers.insert(name.into(), interceptor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Interceptor>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Per-invocation chain state handed to every interceptor
pub struct InvocationContext<'a> {
    command: &'a CommandSpec,
    args: Vec<Value>,
    /// Index of the stage currently executing
    cursor: usize,
    table: &'a InterceptorTable,
    run_handlers: Option<&'a InterceptorTable>,
}

impl<'a> InvocationContext<'a> {
    pub fn new(command: &'a CommandSpec, args: Vec<Value>, table: &'a InterceptorTable) -> Self {
        Self {
            command,
            args,
            cursor: 0,
            table,
            run_handlers: None,
        }
    }

    /// Handlers consulted before the engine's table for this run only
    #[must_use]
    pub fn with_run_handlers(mut self, handlers: &'a InterceptorTable) -> Self {
        self.run_handlers = Some(handlers);
        self
    }

    pub fn command_name(&self) -> &str {
        &self.command.name
    }

    pub fn target(&self) -> &TargetDescriptor {
        &self.command.target
    }

    /// Bound values as later stages and the target will see them
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut Vec<Value> {
        &mut self.args
    }

    /// Index of the stage currently executing
    pub fn stage(&self) -> usize {
        self.cursor
    }

    /// Run the chain from the first stage
    #[instrument(skip(self), fields(command = %self.command.name))]
    pub fn start(&mut self) -> Result<Value> {
        self.cursor = 0;
        self.run_stage(0)
    }

    /// Run the rest of the chain after the current stage
    pub fn proceed(&mut self) -> Result<Value> {
        let caller = self.cursor;
        let next = caller + 1;
        trace!("Stage {} proceeding to stage {}", caller, next);
        self.cursor = next;
        let result = self.run_stage(next);
        self.cursor = caller;
        result
    }

    fn run_stage(&mut self, stage: usize) -> Result<Value> {
        let command = self.command;
        let Some(reference) = command.interceptors.get(stage) else {
            return self.invoke_target();
        };

        let interceptor =
            self.resolve(reference)
                .ok_or_else(|| EngineError::UnresolvedInterceptor {
                    command: command.name.clone(),
                    interceptor: reference.clone(),
                })?;
        debug!("Entering interceptor '{}' (stage {})", reference, stage);
        interceptor.intercept(self)
    }

    fn resolve(&self, reference: &str) -> Option<Arc<dyn Interceptor>> {
        self.run_handlers
            .and_then(|handlers| handlers.get(reference))
            .or_else(|| self.table.get(reference))
    }

    fn invoke_target(&mut self) -> Result<Value> {
        debug!(
            "Invoking target {}::{} with {} argument(s)",
            self.command.target.declaring_type,
            self.command.target.handle,
            self.args.len()
        );
        self.command
            .action
            .invoke(&self.args)
            .map_err(|e| EngineError::execution(self.command.name.clone(), e))
    }
}

/// Stock interceptors available to catalogs by name
pub fn builtin_interceptors() -> InterceptorTable {
    let mut table = InterceptorTable::new();
    table.register("trace", |ctx: &mut InvocationContext<'_>| {
        info!("-> {} {:?}", ctx.command_name(), ctx.args());
        let result = ctx.proceed();
        match &result {
            Ok(value) => info!("<- {} = {}", ctx.command_name(), value),
            Err(e) => info!("<- {} failed: {}", ctx.command_name(), e),
        }
        result
    });
    table.register("dry-run", |ctx: &mut InvocationContext<'_>| {
        info!("Dry run, skipping {}", ctx.command_name());
        Ok(Value::text(format!("dry-run: {}", ctx.command_name())))
    });
    table
}
