//! Core binding and invocation engine
//!
//! Turns a raw command line into a typed call: tokenizing, splitting global
//! options from the command, substituting `${...}` defaults, converting text into
//! declared types, binding parameters and running the interceptor chain.

pub mod binder;
pub mod catalog;
pub mod converter;
pub mod engine;
pub mod globals;
pub mod interceptor;
pub mod registry;
pub mod spec;
pub mod splitter;
pub mod substitution;
pub mod tokenizer;
pub mod value;

pub use catalog::Catalog;
pub use converter::{Converter, ConverterRegistry};
pub use engine::{CommandEngine, EngineBuilder, InvocationOutcome, Validator};
pub use interceptor::{Interceptor, InterceptorTable, InvocationContext};
pub use registry::CommandRegistry;
pub use spec::{
    CommandSpec, CommandTarget, EnumType, GlobalOptionsSpec, ParameterKind, ParameterSpec,
    TargetDescriptor, TypeSpec, ValueKind,
};
pub use substitution::{ResolverContext, SubstitutionEngine};
pub use tokenizer::tokenize;
pub use value::{Bean, Value};
