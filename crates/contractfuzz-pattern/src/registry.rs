//! Named patterns resolved by deferred references

use indexmap::IndexMap;

use contractfuzz_core::ContractError;

use crate::pattern::{BooleanPattern, NumberPattern, Pattern, StringPattern};

/// Name → pattern lookup table, built alongside the pattern tree and never mutated afterwards.
///
/// Names are stored in token form, `(Node)`. The scalar tokens `(string)`,
/// `(number)`, `(boolean)` and `(null)` are always present.
#[derive(Debug, Clone)]
pub struct Registry {
    patterns: IndexMap<String, Pattern>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        let patterns = IndexMap::from([
            ("(string)".to_string(), Pattern::String(StringPattern::default())),
            ("(number)".to_string(), Pattern::Number(NumberPattern::default())),
            ("(boolean)".to_string(), Pattern::Boolean(BooleanPattern::default())),
            ("(null)".to_string(), Pattern::Null),
        ]);
        Self { patterns }
    }

    #[must_use]
    pub fn with(mut self, name: &str, pattern: Pattern) -> Self {
        self.insert(name, pattern);
        self
    }

    pub fn insert(&mut self, name: &str, pattern: Pattern) {
        self.patterns.insert(as_token(name), pattern);
    }

    /// # Errors
    ///
    /// Returns [`ContractError::UnknownType`] when nothing is registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<&Pattern, ContractError> {
        self.patterns
            .get(&as_token(name))
            .ok_or_else(|| ContractError::UnknownType(as_token(name)))
    }
}

/// `Node` and `(Node)` both become `(Node)`.
pub(crate) fn as_token(name: &str) -> String {
    if name.starts_with('(') && name.ends_with(')') {
        name.to_string()
    } else {
        format!("({name})")
    }
}
