use std::iter;

use contractfuzz_core::{ContractError, MatchResult, ReturnValue, Value};

use crate::pattern::{NegativeStream, PatternStream};
use crate::registry::as_token;
use crate::resolver::Resolver;
use crate::row::Row;

/// A reference to a registered pattern, resolved at traversal time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredPattern {
    /// Token form, e.g. `(Node)`.
    pub name: String,
}

impl DeferredPattern {
    pub fn new(name: &str) -> Self {
        Self { name: as_token(name) }
    }

    pub(crate) fn matches(&self, value: &Value, resolver: &Resolver<'_>) -> MatchResult {
        match resolver.lookup(&self.name) {
            Ok(pattern) => pattern.matches(value, resolver),
            Err(err) => err.failure().into(),
        }
    }

    pub(crate) fn generate(&self, resolver: &Resolver<'_>) -> Result<Value, ContractError> {
        resolver.lookup(&self.name)?.generate(resolver)
    }

    pub(crate) fn parse(&self, literal: &str, resolver: &Resolver<'_>) -> Result<Value, ContractError> {
        resolver.lookup(&self.name)?.parse(literal, resolver)
    }

    pub(crate) fn new_based_on<'a>(&self, row: &'a Row, resolver: &Resolver<'a>) -> PatternStream<'a> {
        match resolver.lookup(&self.name) {
            Ok(pattern) => pattern.new_based_on(row, resolver),
            Err(err) => Box::new(iter::once(Err(err))),
        }
    }

    pub(crate) fn negative_based_on<'a>(&self, row: &'a Row, resolver: &Resolver<'a>) -> NegativeStream<'a> {
        match resolver.lookup(&self.name) {
            Ok(pattern) => pattern.negative_based_on(row, resolver),
            Err(err) => Box::new(iter::once(ReturnValue::from_result(Err(err)))),
        }
    }
}
