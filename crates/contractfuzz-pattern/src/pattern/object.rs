use std::iter;

use indexmap::IndexMap;
use rand::Rng;

use contractfuzz_core::{ContractError, Failure, MatchResult, Value, mismatch_result};

use crate::combinations::{Producer, key_combinations, producer, product};
use crate::negative::{AllNegativePatterns, NegativePatternsTemplate};
use crate::pattern::{
    NegativeStream, Pattern, PatternStream, TypeStack, is_optional, is_pattern_token, without_optionality,
};
use crate::registry::as_token;
use crate::resolver::{GenerationMode, KeyErrorKind, Resolver};
use crate::row::Row;

/// Named fields; a key ending in `?` is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPattern {
    pub fields: IndexMap<String, Pattern>,
    pub type_alias: Option<String>,
}

impl ObjectPattern {
    pub fn new<K: Into<String>>(fields: impl IntoIterator<Item = (K, Pattern)>) -> Self {
        Self {
            fields: fields.into_iter().map(|(k, p)| (k.into(), p)).collect(),
            type_alias: None,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.type_alias = Some(as_token(alias));
        self
    }

    fn entries(&self) -> Vec<(&str, &Pattern)> {
        self.fields.iter().map(|(k, p)| (k.as_str(), p)).collect()
    }

    pub(crate) fn matches(&self, value: &Value, resolver: &Resolver<'_>) -> MatchResult {
        let Value::Object(actual) = value else {
            return mismatch_result("json object", Some(value), resolver.mismatch_messages()).into();
        };

        let declared: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        let key_failures = resolver
            .find_key_errors(&declared, actual.keys().map(String::as_str))
            .into_iter()
            .map(|error| MatchResult::from(error.to_failure("key", resolver.mismatch_messages())));

        let field_results = self.fields.iter().filter_map(|(key, pattern)| {
            let name = without_optionality(key);
            actual
                .get(name)
                .map(|value| pattern.matches(value, resolver).breadcrumb(name))
        });

        MatchResult::from_results(key_failures.chain(field_results))
    }

    pub(crate) fn generate(&self, resolver: &Resolver<'_>) -> Result<Value, ContractError> {
        let mut entries = IndexMap::new();
        for (key, pattern) in &self.fields {
            let name = without_optionality(key);
            let optional = is_optional(key);
            if optional && !include_optional_key(resolver) {
                continue;
            }

            let generated = resolver
                .with_cycle_prevention(pattern, optional, |r| r.generate_keyed(Some(name), pattern))
                .map_err(|err| err.breadcrumb(name))?;
            if let Some(value) = generated {
                entries.insert(name.to_string(), value);
            }
        }
        Ok(Value::Object(entries))
    }

    pub(crate) fn new_based_on<'a>(&'a self, row: &'a Row, resolver: &Resolver<'a>) -> PatternStream<'a> {
        let entries = row.without_omitted_keys(&self.entries());
        let keys: Vec<&'a str> = entries.iter().map(|(key, _)| *key).collect();
        let alias = &self.type_alias;
        let max = resolver.max_combinations();
        let resolver = resolver.clone();

        let objects = key_combinations(&keys, row).flat_map(move |combination| {
            let fields: Vec<(&'a str, &'a Pattern)> = entries
                .iter()
                .filter(|(key, _)| combination.contains(key))
                .copied()
                .collect();
            fields_new_based_on(fields, row, &resolver).map(move |result| {
                result.map(|fields| {
                    Pattern::Object(ObjectPattern {
                        fields,
                        type_alias: alias.clone(),
                    })
                })
            })
        });

        match max {
            Some(max) => Box::new(objects.take(max)),
            None => Box::new(objects),
        }
    }

    pub(crate) fn negative_based_on<'a>(&'a self, row: &'a Row, resolver: &Resolver<'a>) -> NegativeStream<'a> {
        let fields = row.without_omitted_keys(&self.entries());
        let alias = &self.type_alias;
        Box::new(
            AllNegativePatterns
                .negative_based_on(fields, row, resolver)
                .map(move |candidate| {
                    candidate.map(|fields| {
                        Pattern::Object(ObjectPattern {
                            fields,
                            type_alias: alias.clone(),
                        })
                    })
                }),
        )
    }

    /// Every key `self` requires must be required by `other`, and shared keys must be compatible.
    pub(crate) fn encompasses(
        &self,
        other: &ObjectPattern,
        this_resolver: &Resolver<'_>,
        other_resolver: &Resolver<'_>,
        stack: &TypeStack,
    ) -> MatchResult {
        let messages = this_resolver.mismatch_messages();
        let mut results = Vec::new();

        for (key, pattern) in &self.fields {
            let name = without_optionality(key);
            let counterpart = other
                .fields
                .iter()
                .find(|(other_key, _)| without_optionality(other_key) == name);

            match counterpart {
                None if is_optional(key) => {}
                None => results.push(
                    Failure::new(messages.expected_key_was_missing("key", name))
                        .breadcrumb(name)
                        .into(),
                ),
                Some((other_key, _)) if !is_optional(key) && is_optional(other_key) => results.push(
                    Failure::new(format!("Expected required key named \"{name}\", but it is optional"))
                        .breadcrumb(name)
                        .into(),
                ),
                Some((_, other_pattern)) => results.push(
                    pattern
                        .encompasses_in(other_pattern, this_resolver, other_resolver, stack)
                        .breadcrumb(name),
                ),
            }
        }

        let declared: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        results.extend(
            this_resolver
                .find_key_errors(&declared, other.fields.keys().map(|k| without_optionality(k)))
                .into_iter()
                .filter(|error| error.kind == KeyErrorKind::Unexpected)
                .map(|error| MatchResult::from(error.to_failure("key", messages))),
        );

        MatchResult::from_results(results)
    }
}

fn include_optional_key(resolver: &Resolver<'_>) -> bool {
    resolver.mode() == GenerationMode::PreferExample || resolver.with_rng(|rng| rng.gen_bool(0.5))
}

/// Lazy product of every field's positive candidates, keys stripped of optionality.
pub(crate) fn fields_new_based_on<'a>(
    fields: Vec<(&'a str, &'a Pattern)>,
    row: &'a Row,
    resolver: &Resolver<'a>,
) -> Box<dyn Iterator<Item = Result<IndexMap<String, Pattern>, ContractError>> + 'a> {
    let producers: Vec<Producer<'a, (&'a str, Result<Option<Pattern>, ContractError>)>> = fields
        .into_iter()
        .map(|(key, pattern)| {
            let resolver = resolver.clone();
            producer(move || field_new_based_on(key, pattern, row, &resolver).map(move |candidate| (key, candidate)))
        })
        .collect();

    Box::new(product(producers).map(|combination| {
        let mut fields = IndexMap::new();
        for (key, candidate) in combination {
            let name = without_optionality(key);
            if let Some(pattern) = candidate.map_err(|err| err.breadcrumb(name))? {
                fields.insert(name.to_string(), pattern);
            }
        }
        Ok(fields)
    }))
}

/// Positive candidates for one field. `None` means the key is left out.
///
/// A row value is used as-is: a pattern token becomes a reference, any other
/// literal an exact value. Without one the field pattern is expanded under cycle
/// prevention; optional keys absorb cycles by being omitted.
pub(crate) fn field_new_based_on<'a>(
    key: &'a str,
    pattern: &'a Pattern,
    row: &'a Row,
    resolver: &Resolver<'a>,
) -> Box<dyn Iterator<Item = Result<Option<Pattern>, ContractError>> + 'a> {
    let name = without_optionality(key);
    if let Some(literal) = row.get_field(name) {
        let candidate = if is_pattern_token(literal) {
            Ok(Pattern::deferred(literal))
        } else {
            example_literal(literal, pattern, resolver)
        };
        return Box::new(iter::once(candidate.map(Some)));
    }

    let optional = is_optional(key);
    match resolver.cycle_guard(pattern, optional) {
        Ok(Some(child)) => Box::new(pattern.new_based_on(row, &child).map(move |candidate| match candidate {
            Err(err) if optional && err.is_cycle() => Ok(None),
            other => other.map(Some),
        })),
        Ok(None) => Box::new(iter::once(Ok(None))),
        Err(err) => Box::new(iter::once(Err(err))),
    }
}

fn example_literal(literal: &str, pattern: &Pattern, resolver: &Resolver<'_>) -> Result<Pattern, ContractError> {
    let value = pattern.parse(literal, resolver)?;
    match pattern.matches(&value, resolver) {
        MatchResult::Success(_) => Ok(Pattern::exact(value)),
        MatchResult::Failure(failure) => Err(ContractError::Failed(Failure::caused_by(
            format!("Example \"{literal}\" does not match {}", pattern.type_name()),
            failure,
        ))),
    }
}
