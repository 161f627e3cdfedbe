use std::iter;

use rand::Rng;

use contractfuzz_core::{ContractError, MatchResult, ReturnValue, Value, mismatch_result};

use crate::pattern::{
    BooleanPattern, NegativeStream, NumberPattern, Pattern, PatternStream, StringPattern, exact_or_self,
};
use crate::registry::as_token;
use crate::resolver::{GenerationMode, Resolver};
use crate::row::Row;

/// A JSON array whose items all match one pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPattern {
    pub item: Box<Pattern>,
    pub type_alias: Option<String>,
    pub example: Option<String>,
}

impl ListPattern {
    pub fn new(item: Pattern) -> Self {
        Self {
            item: Box::new(item),
            type_alias: None,
            example: None,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.type_alias = Some(as_token(alias));
        self
    }

    #[must_use]
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    fn wrap(&self, item: Pattern) -> Pattern {
        Pattern::Array(ListPattern {
            item: Box::new(item),
            type_alias: self.type_alias.clone(),
            example: None,
        })
    }

    pub(crate) fn matches(&self, value: &Value, resolver: &Resolver<'_>) -> MatchResult {
        let Value::Array(items) = value else {
            let expected = format!("array of {}", self.item.type_name());
            return mismatch_result(&expected, Some(value), resolver.mismatch_messages()).into();
        };

        MatchResult::from_results(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| self.item.matches(item, resolver).breadcrumb(&format!("[{index}]"))),
        )
    }

    /// One to three items; an item that would re-enter a named pattern ends the list early.
    pub(crate) fn generate(&self, pattern: &Pattern, resolver: &Resolver<'_>) -> Result<Value, ContractError> {
        if let Some(example) = resolver.resolve_example(self.example.as_deref(), pattern)? {
            return Ok(example);
        }

        let count = resolver.with_rng(|rng| rng.gen_range(1..=3_usize));
        let mut items = Vec::with_capacity(count);
        for index in 0..count {
            let generated = resolver
                .with_cycle_prevention(&self.item, true, |r| self.item.generate(r))
                .map_err(|err| err.breadcrumb(&format!("[{index}]")))?;
            match generated {
                Some(item) => items.push(item),
                None => break,
            }
        }
        Ok(Value::Array(items))
    }

    pub(crate) fn new_based_on<'a>(&'a self, pattern: &'a Pattern, row: &'a Row, resolver: &Resolver<'a>) -> PatternStream<'a> {
        if resolver.mode() == GenerationMode::PreferExample && self.example.is_some() {
            return exact_or_self(pattern, resolver);
        }

        match resolver.cycle_guard(&self.item, true) {
            Ok(Some(child)) => Box::new(self.item.new_based_on(row, &child).map(move |candidate| match candidate {
                Ok(item) => Ok(self.wrap(item)),
                Err(err) if err.is_cycle() => Ok(Pattern::exact(Value::Array(Vec::new()))),
                Err(err) => Err(err.breadcrumb("[]")),
            })),
            Ok(None) => Box::new(iter::once(Ok(Pattern::exact(Value::Array(Vec::new()))))),
            Err(err) => Box::new(iter::once(Err(err))),
        }
    }

    /// Non-array values, then arrays holding one invalid item.
    pub(crate) fn negative_based_on<'a>(&'a self, row: &'a Row, resolver: &Resolver<'a>) -> NegativeStream<'a> {
        let wrong_shapes = [
            Pattern::Null,
            Pattern::String(StringPattern::default()),
            Pattern::Number(NumberPattern::default()),
            Pattern::Boolean(BooleanPattern::default()),
        ]
        .into_iter()
        .map(ReturnValue::value);

        let invalid_items: NegativeStream<'a> = match resolver.cycle_guard(&self.item, true) {
            Ok(Some(child)) => Box::new(
                self.item
                    .negative_based_on(row, &child)
                    .map(move |candidate| candidate.map(|item| self.wrap(item)).breadcrumb(Some("[]"))),
            ),
            Ok(None) => Box::new(iter::empty()),
            Err(err) => Box::new(iter::once(ReturnValue::from_result(Err(err)))),
        };

        Box::new(wrong_shapes.chain(invalid_items))
    }
}
