//! Rule matching
//!
//! A rule is a predicate over event fields. Every string field is a
//! regular expression with partial-match semantics; empty fields are
//! wildcards. Labels and annotations are AND'ed: every listed key must
//! be present on the involved object and its value must match.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::event::EnhancedEvent;

/// Patterns compiled once at validation time.
#[derive(Debug, Clone, Default)]
pub(crate) struct CompiledPatterns {
    message: Option<Regex>,
    api_version: Option<Regex>,
    kind: Option<Regex>,
    namespace: Option<Regex>,
    reason: Option<Regex>,
    type_: Option<Regex>,
    component: Option<Regex>,
    host: Option<Regex>,
    receiver: Option<Regex>,
    labels: HashMap<String, Regex>,
    annotations: HashMap<String, Regex>,
}

/// A rule for matching an event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rule {
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,

    pub message: String,
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub reason: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub component: String,
    pub host: String,

    /// Destination receiver name, read by the route engine on match.
    /// Not consulted by the matcher itself.
    pub receiver: String,

    pub min_count: i32,

    #[serde(skip)]
    pub(crate) compiled: Option<Box<CompiledPatterns>>,
}

fn compile(pattern: &str) -> Result<Option<Regex>, ConfigError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern).map(Some).map_err(|source| ConfigError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

fn compile_map(patterns: &HashMap<String, String>) -> Result<HashMap<String, Regex>, ConfigError> {
    let mut compiled = HashMap::with_capacity(patterns.len());
    for (key, pattern) in patterns {
        if let Some(re) = compile(pattern)? {
            compiled.insert(key.clone(), re);
        }
    }
    Ok(compiled)
}

/// Match with the precompiled pattern when validation ran, falling back
/// to runtime compilation otherwise (tests may construct bare rules).
fn match_field(pattern: &str, compiled: Option<&Regex>, value: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    match compiled {
        Some(re) => re.is_match(value),
        None => {
            debug!(pattern, "rule field is not precompiled, falling back to runtime compilation");
            Regex::new(pattern).map(|re| re.is_match(value)).unwrap_or(false)
        }
    }
}

impl Rule {
    /// Precompile every non-empty pattern. Called from config
    /// validation; a bad pattern aborts with the pattern named.
    pub fn compile_patterns(&mut self) -> Result<(), ConfigError> {
        self.compiled = Some(Box::new(CompiledPatterns {
            message: compile(&self.message)?,
            api_version: compile(&self.api_version)?,
            kind: compile(&self.kind)?,
            namespace: compile(&self.namespace)?,
            reason: compile(&self.reason)?,
            type_: compile(&self.type_)?,
            component: compile(&self.component)?,
            host: compile(&self.host)?,
            receiver: compile(&self.receiver)?,
            labels: compile_map(&self.labels)?,
            annotations: compile_map(&self.annotations)?,
        }));
        Ok(())
    }

    /// True when compile_patterns has populated this rule.
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Compare the rule to an event. All fields are regular
    /// expressions, so an empty rule matches every event.
    pub fn matches(&self, event: &EnhancedEvent) -> bool {
        let none = CompiledPatterns::default();
        let compiled = self.compiled.as_deref().unwrap_or(&none);

        let object = &event.involved_object;
        let fields: [(&str, Option<&Regex>, &str); 8] = [
            (&self.message, compiled.message.as_ref(), &event.message),
            (
                &self.api_version,
                compiled.api_version.as_ref(),
                object.reference.api_version.as_deref().unwrap_or(""),
            ),
            (
                &self.kind,
                compiled.kind.as_ref(),
                object.reference.kind.as_deref().unwrap_or(""),
            ),
            (&self.namespace, compiled.namespace.as_ref(), event.namespace()),
            (&self.reason, compiled.reason.as_ref(), &event.reason),
            (&self.type_, compiled.type_.as_ref(), &event.type_),
            (
                &self.component,
                compiled.component.as_ref(),
                event.source.component.as_deref().unwrap_or(""),
            ),
            (
                &self.host,
                compiled.host.as_ref(),
                event.source.host.as_deref().unwrap_or(""),
            ),
        ];

        for (pattern, re, value) in fields {
            if !match_field(pattern, re, value) {
                return false;
            }
        }

        // Every listed label must be present on the object. A missing
        // key fails the rule even when the pattern would match "".
        for (key, pattern) in &self.labels {
            match object.labels.get(key) {
                Some(value) => {
                    if !match_field(pattern, compiled.labels.get(key), value) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        for (key, pattern) in &self.annotations {
            match object.annotations.get(key) {
                Some(value) => {
                    if !match_field(pattern, compiled.annotations.get(key), value) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        // min_count defaults to 0, which every event satisfies.
        event.count >= self.min_count
    }
}
