//! Match outcomes and breadcrumb-annotated failures

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::error::ContractError;
use crate::value::Value;

/// Outcome of matching data against a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// Captured variable name → value, used for contract-state binding.
    Success(BTreeMap<String, String>),
    Failure(Failure),
}

impl MatchResult {
    #[must_use]
    pub fn success() -> Self {
        Self::Success(BTreeMap::new())
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f),
        }
    }

    /// Success if every result succeeded, otherwise all failures combined.
    pub fn from_results(results: impl IntoIterator<Item = MatchResult>) -> Self {
        let failures: Vec<Failure> = results
            .into_iter()
            .filter_map(|r| match r {
                Self::Success(_) => None,
                Self::Failure(f) => Some(f),
            })
            .collect();

        if failures.is_empty() {
            Self::success()
        } else {
            Self::Failure(Failure::from_failures(failures))
        }
    }

    /// Re-root a failure under `segment`; successes pass through.
    #[must_use]
    pub fn breadcrumb(self, segment: &str) -> Self {
        match self {
            Self::Failure(f) => Self::Failure(f.breadcrumb(segment)),
            success => success,
        }
    }

    /// Capture response data into the variables of a success.
    ///
    /// Selectors: `response-body`, `response-body.<dotted path>`, `response-header.<name>`.
    ///
    /// # Errors
    ///
    /// Returns an error if a selector is malformed or selects nothing.
    pub fn with_bindings(
        self,
        bindings: &BTreeMap<String, String>,
        headers: &IndexMap<String, String>,
        body: &Value,
    ) -> Result<Self, ContractError> {
        let Self::Success(mut variables) = self else {
            return Ok(self);
        };

        for (name, selector) in bindings {
            let captured = if selector == "response-body" {
                body.to_string_literal()
            } else if let Some(path) = selector.strip_prefix("response-body.") {
                body.select(path)
                    .map(Value::to_string_literal)
                    .ok_or_else(|| {
                        ContractError::Invalid(format!("Could not find {path} in the response body"))
                    })?
            } else if let Some(header) = selector.strip_prefix("response-header.") {
                headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(header))
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        ContractError::Invalid(format!("Response header {header} was not found"))
                    })?
            } else {
                return Err(ContractError::Invalid(format!(
                    "Binding selector {selector} must start with response-body or response-header"
                )));
            };
            variables.insert(name.clone(), captured);
        }

        Ok(Self::Success(variables))
    }
}

impl From<Failure> for MatchResult {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}

/// A failed match: message, path to the failing node, and nested causes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Failure {
    pub message: String,
    /// Leading segments first, e.g. `["QUERY-PARAMS", "ids"]`.
    pub breadcrumbs: Vec<String>,
    pub causes: Vec<Failure>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            breadcrumbs: Vec::new(),
            causes: Vec::new(),
        }
    }

    /// A failure with context wrapping a more specific cause.
    pub fn caused_by(message: impl Into<String>, cause: Failure) -> Self {
        Self {
            message: message.into(),
            breadcrumbs: Vec::new(),
            causes: vec![cause],
        }
    }

    pub fn from_failures(mut failures: Vec<Failure>) -> Self {
        if failures.len() == 1 {
            return failures.remove(0);
        }
        Self {
            message: String::new(),
            breadcrumbs: Vec::new(),
            causes: failures,
        }
    }

    /// Prepend `segment` to this failure's path. Empty segments are ignored.
    #[must_use]
    pub fn breadcrumb(mut self, segment: &str) -> Self {
        if !segment.is_empty() {
            self.breadcrumbs.insert(0, segment.to_string());
        }
        self
    }

    /// Every leaf failure with its full rendered path and the messages leading to it.
    pub fn entries(&self) -> Vec<(String, Vec<String>)> {
        let mut out = Vec::new();
        self.collect_entries(&[], &[], &mut out);
        out
    }

    /// Rendered paths of every leaf failure, e.g. `QUERY-PARAMS.ids`.
    pub fn paths(&self) -> Vec<String> {
        self.entries().into_iter().map(|(path, _)| path).collect()
    }

    fn collect_entries(&self, prefix: &[String], context: &[String], out: &mut Vec<(String, Vec<String>)>) {
        let path: Vec<String> = prefix.iter().chain(&self.breadcrumbs).cloned().collect();
        let mut messages = context.to_vec();
        if !self.message.is_empty() {
            messages.push(self.message.clone());
        }

        if self.causes.is_empty() {
            out.push((render_breadcrumbs(&path), messages));
        } else {
            for cause in &self.causes {
                cause.collect_entries(&path, &messages, out);
            }
        }
    }
}

/// Join breadcrumb segments into a readable path.
///
/// `[n]` indices attach directly, `(~~~name)` alternative markers render as `(when name)`.
pub fn render_breadcrumbs(segments: &[String]) -> String {
    let mut out = String::new();
    for segment in segments {
        if segment.starts_with('[') {
            out.push_str(segment);
        } else if let Some(inner) = segment
            .strip_prefix("(~~~")
            .and_then(|s| s.strip_suffix(')'))
        {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&format!("(when {inner})"));
        } else {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(segment);
        }
    }
    out
}
