//! `${name[:-default]}` expansion
//!
//! Names resolve against prefix-keyed resolver contexts (longest prefix wins, the
//! prefix is stripped), then a generic default-value context keyed by the full
//! name, then the inline `:-default`. Resolved text is expanded again until no
//! expression is left; re-entering a name that is still being resolved is a cycle.

use crate::error::{EngineError, Result};
use crate::utils::env::{EnvContext, OverlayContext, PropertiesContext};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

const OPEN: &str = "${";
const ESCAPED_OPEN: &str = "\\${";
const DEFAULT_SEPARATOR: &str = ":-";
/// Prefix of the process-properties context
pub const PROPERTIES_PREFIX: &str = "sys.";

/// Source of values for one namespace of substitution names
pub trait ResolverContext: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

impl<F> ResolverContext for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn lookup(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// Prefix-keyed resolver contexts plus the generic default-value context
#[derive(Clone)]
pub struct SubstitutionEngine {
    /// Sorted longest prefix first
    contexts: Vec<(String, Arc<dyn ResolverContext>)>,
    defaults: Arc<dyn ResolverContext>,
}

impl std::fmt::Debug for SubstitutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefixes: Vec<&str> = self.contexts.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("SubstitutionEngine")
            .field("prefixes", &prefixes)
            .finish_non_exhaustive()
    }
}

impl Default for SubstitutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SubstitutionEngine {
    /// Engine with the `env.` and (empty) `sys.` contexts installed
    pub fn new() -> Self {
        Self {
            contexts: Vec::new(),
            defaults: Arc::new(PropertiesContext::default()),
        }
        .with_context("env.", Arc::new(EnvContext))
        .with_context(PROPERTIES_PREFIX, Arc::new(PropertiesContext::default()))
    }

    /// Install or replace the context for a prefix
    #[must_use]
    pub fn with_context(mut self, prefix: impl Into<String>, context: Arc<dyn ResolverContext>) -> Self {
        let prefix = prefix.into();
        self.contexts.retain(|(existing, _)| *existing != prefix);
        self.contexts.push((prefix, context));
        self.contexts
            .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        self
    }

    /// Replace the generic default-value context
    #[must_use]
    pub fn with_defaults(mut self, defaults: Arc<dyn ResolverContext>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Copy of this engine whose `sys.` context sees `overrides` first, then
    /// whatever `sys.` context was installed before
    pub fn with_property_overrides(&self, overrides: &BTreeMap<String, String>) -> Self {
        let current = self.context(PROPERTIES_PREFIX);
        self.clone().with_context(
            PROPERTIES_PREFIX,
            Arc::new(OverlayContext::new(overrides.clone(), current)),
        )
    }

    /// Context installed for exactly this prefix
    pub fn context(&self, prefix: &str) -> Option<Arc<dyn ResolverContext>> {
        self.contexts
            .iter()
            .find(|(existing, _)| existing == prefix)
            .map(|(_, context)| Arc::clone(context))
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.contexts.iter().map(|(prefix, _)| prefix.as_str())
    }

    /// Expand every expression in `text`.
    ///
    /// Returns `None` when the whole text is a single expression that did not
    /// resolve. Unresolved expressions inside longer text are kept verbatim.
    #[instrument(skip(self))]
    pub fn substitute(&self, text: &str) -> Result<Option<String>> {
        let mut stack = Vec::new();
        let expanded = self.expand(text, &mut stack)?;
        debug!("Substituted '{}' -> {:?}", text, expanded);
        Ok(expanded)
    }

    fn expand(&self, text: &str, stack: &mut Vec<String>) -> Result<Option<String>> {
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];

            if rest.starts_with(ESCAPED_OPEN) {
                out.push_str(OPEN);
                pos += ESCAPED_OPEN.len();
                continue;
            }

            if rest.starts_with(OPEN) {
                let body_start = pos + OPEN.len();
                let Some(close) = find_closing(text, body_start) else {
                    out.push_str(rest);
                    break;
                };
                let body = &text[body_start..close];
                let (name, default) = split_default(body);

                match self.resolve(name, default, stack)? {
                    Some(value) => out.push_str(&value),
                    None if pos == 0 && close + 1 == text.len() => return Ok(None),
                    None => out.push_str(&text[pos..=close]),
                }
                pos = close + 1;
                continue;
            }

            match rest.chars().next() {
                Some(ch) => {
                    out.push(ch);
                    pos += ch.len_utf8();
                }
                None => break,
            }
        }

        Ok(Some(out))
    }

    fn resolve(
        &self,
        name: &str,
        default: Option<&str>,
        stack: &mut Vec<String>,
    ) -> Result<Option<String>> {
        if let Some(start) = stack.iter().position(|entry| entry == name) {
            let mut chain: Vec<&str> = stack[start..].iter().map(String::as_str).collect();
            chain.push(name);
            return Err(EngineError::CyclicSubstitution {
                chain: chain.join("->"),
            });
        }

        stack.push(name.to_string());
        let found = match self.lookup(name) {
            Some(raw) => self.expand(&raw, stack),
            None => Ok(None),
        };
        stack.pop();

        match found? {
            Some(value) => Ok(Some(value)),
            None => match default {
                Some(fallback) => self.expand(fallback, stack),
                None => Ok(None),
            },
        }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        let scoped = self
            .contexts
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix.as_str()))
            .and_then(|(prefix, context)| {
                trace!("Resolving '{}' through context '{}'", name, prefix);
                context.lookup(&name[prefix.len()..])
            });
        scoped.or_else(|| self.defaults.lookup(name))
    }
}

/// Index of the `}` closing an expression whose body starts at `start`
fn find_closing(text: &str, start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut pos = start;
    while pos < text.len() {
        let rest = &text[pos..];
        if rest.starts_with(ESCAPED_OPEN) {
            pos += ESCAPED_OPEN.len();
        } else if rest.starts_with(OPEN) {
            depth += 1;
            pos += OPEN.len();
        } else if rest.starts_with('}') {
            depth -= 1;
            if depth == 0 {
                return Some(pos);
            }
            pos += 1;
        } else {
            pos += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    None
}

/// Split an expression body at its first top-level `:-`
fn split_default(body: &str) -> (&str, Option<&str>) {
    let mut depth = 0usize;
    let mut pos = 0;
    while pos < body.len() {
        let rest = &body[pos..];
        if rest.starts_with(OPEN) {
            depth += 1;
            pos += OPEN.len();
        } else if rest.starts_with('}') {
            depth = depth.saturating_sub(1);
            pos += 1;
        } else if depth == 0 && rest.starts_with(DEFAULT_SEPARATOR) {
            return (body[..pos].trim(), Some(&body[pos + DEFAULT_SEPARATOR.len()..]));
        } else {
            pos += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    (body.trim(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(defaults: &[(&str, &str)]) -> SubstitutionEngine {
        let map = defaults
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SubstitutionEngine::new().with_defaults(Arc::new(PropertiesContext::new(map)))
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        let engine = SubstitutionEngine::new();
        assert_eq!(engine.substitute("hello").unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn test_inline_default() {
        let engine = SubstitutionEngine::new();
        assert_eq!(
            engine.substitute("${missing:-fallback}").unwrap().as_deref(),
            Some("fallback")
        );
        assert_eq!(engine.substitute("${missing}").unwrap(), None);
    }

    #[test]
    fn test_nested_default_resolves_to_fixed_point() {
        let engine = engine_with(&[("region", "eu-${zone}"), ("zone", "west")]);
        assert_eq!(
            engine
                .substitute("${target:-${region:-none}}")
                .unwrap()
                .as_deref(),
            Some("eu-west")
        );
    }

    #[test]
    fn test_embedded_expressions() {
        let engine = engine_with(&[("user", "ada")]);
        assert_eq!(
            engine.substitute("hi ${user}, ${unknown}!").unwrap().as_deref(),
            Some("hi ada, ${unknown}!")
        );
    }

    #[test]
    fn test_env_context_strips_prefix() {
        unsafe { std::env::set_var("CMDBIND_SUBST_TEST", "from-env") };
        let engine = SubstitutionEngine::new();
        assert_eq!(
            engine.substitute("${env.CMDBIND_SUBST_TEST}").unwrap().as_deref(),
            Some("from-env")
        );
        unsafe { std::env::remove_var("CMDBIND_SUBST_TEST") };
    }

    #[test]
    fn test_longest_prefix_wins() {
        let short = PropertiesContext::new(BTreeMap::from([("db.host".to_string(), "short".to_string())]));
        let long = PropertiesContext::new(BTreeMap::from([("host".to_string(), "long".to_string())]));
        let engine = SubstitutionEngine::new()
            .with_context("app.", Arc::new(short))
            .with_context("app.db.", Arc::new(long));
        assert_eq!(
            engine.substitute("${app.db.host}").unwrap().as_deref(),
            Some("long")
        );
    }

    #[test]
    fn test_context_miss_falls_back_to_defaults() {
        let engine = engine_with(&[("sys.port", "8080")]);
        assert_eq!(engine.substitute("${sys.port}").unwrap().as_deref(), Some("8080"));
    }

    #[test]
    fn test_property_overrides() {
        let base = BTreeMap::from([
            ("mode".to_string(), "prod".to_string()),
            ("region".to_string(), "eu".to_string()),
        ]);
        let overrides = BTreeMap::from([("mode".to_string(), "dev".to_string())]);
        let engine = SubstitutionEngine::new().with_context("sys.", Arc::new(PropertiesContext::new(base)));
        let scoped = engine.with_property_overrides(&overrides);
        assert_eq!(scoped.substitute("${sys.mode}").unwrap().as_deref(), Some("dev"));
        assert_eq!(scoped.substitute("${sys.region}").unwrap().as_deref(), Some("eu"));
        assert_eq!(engine.substitute("${sys.mode}").unwrap().as_deref(), Some("prod"));
    }

    #[test]
    fn test_property_overrides_keep_custom_context() {
        let vault = |key: &str| (key == "token").then(|| "s3cret".to_string());
        let engine = SubstitutionEngine::new().with_context("sys.", Arc::new(vault));
        let scoped = engine.with_property_overrides(&BTreeMap::from([("x".to_string(), "y".to_string())]));
        assert_eq!(scoped.substitute("${sys.token}").unwrap().as_deref(), Some("s3cret"));
        assert_eq!(scoped.substitute("${sys.x}").unwrap().as_deref(), Some("y"));
    }

    #[test]
    fn test_direct_cycle_is_detected() {
        let engine = engine_with(&[("a", "x${a}")]);
        let err = engine.substitute("${a}").unwrap_err();
        match err {
            EngineError::CyclicSubstitution { chain } => assert_eq!(chain, "a->a"),
            other => panic!("Expected CyclicSubstitution, got {other:?}"),
        }
    }

    #[test]
    fn test_transitive_cycle_names_chain() {
        let engine = engine_with(&[("a", "${b}"), ("b", "${c}"), ("c", "${a}")]);
        let err = engine.substitute("${a}").unwrap_err();
        assert_eq!(err.to_string(), "Cyclic substitution: a->b->c->a");
    }

    #[test]
    fn test_escaped_expression_is_literal() {
        let engine = engine_with(&[("a", "value")]);
        assert_eq!(
            engine.substitute("\\${a} and ${a}").unwrap().as_deref(),
            Some("${a} and value")
        );
    }

    #[test]
    fn test_unterminated_expression_is_literal() {
        let engine = SubstitutionEngine::new();
        assert_eq!(engine.substitute("${open").unwrap().as_deref(), Some("${open"));
    }

    #[test]
    fn test_split_default() {
        assert_eq!(split_default("a"), ("a", None));
        assert_eq!(split_default("a:-b"), ("a", Some("b")));
        assert_eq!(split_default("a:-${b:-c}"), ("a", Some("${b:-c}")));
    }
}
