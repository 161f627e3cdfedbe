//! Union of alternative patterns: `oneOf`, `anyOf` and nullable schemas

use std::iter;

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use contractfuzz_core::{ContractError, Failure, MatchResult, ReturnValue, Value, mismatch_result, type_mismatch_result};

use crate::pattern::{NegativeStream, Pattern, PatternStream, TypeStack, resolved_hop, without_pattern_delimiters};
use crate::registry::as_token;
use crate::resolver::Resolver;
use crate::row::Row;

/// Alias that marks an alternative standing for "no value".
const EMPTY_ALIAS: &str = "(empty)";

#[derive(Debug, Clone, PartialEq)]
pub struct AnyPattern {
    pub alternatives: Vec<Pattern>,
    /// Dictionary key consulted when generating.
    pub key: Option<String>,
    pub type_alias: Option<String>,
    pub example: Option<String>,
}

impl AnyPattern {
    pub const fn new(alternatives: Vec<Pattern>) -> Self {
        Self {
            alternatives,
            key: None,
            type_alias: None,
            example: None,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
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

    pub(crate) fn has_null(&self) -> bool {
        self.alternatives.iter().any(|p| matches!(p, Pattern::Null))
    }

    /// Exactly one concrete alternative plus null (or the empty marker).
    fn is_nullable_pair(&self) -> bool {
        self.alternatives.len() == 2 && self.alternatives.iter().any(is_empty_marker)
    }

    fn nulls_last(&self) -> impl Iterator<Item = &Pattern> {
        let is_null = |p: &&Pattern| matches!(p, Pattern::Null);
        self.alternatives
            .iter()
            .filter(move |p| !is_null(p))
            .chain(self.alternatives.iter().filter(is_null))
    }

    pub fn type_name(&self) -> String {
        if self.is_nullable_pair()
            && let Some(concrete) = self.alternatives.iter().find(|p| !is_empty_marker(p))
        {
            return format!("({}?)", without_pattern_delimiters(&concrete.type_name()));
        }

        let names: Vec<String> = self
            .alternatives
            .iter()
            .map(|p| match without_pattern_delimiters(&p.type_name()) {
                "null" => "\"null\"".to_string(),
                name => name.to_string(),
            })
            .collect();
        format!("({})", names.join(" or "))
    }

    pub(crate) fn matches(&self, value: &Value, resolver: &Resolver<'_>) -> MatchResult {
        let mut failures = Vec::with_capacity(self.alternatives.len());
        for alternative in &self.alternatives {
            match alternative.matches(value, resolver) {
                success @ MatchResult::Success(_) => return success,
                MatchResult::Failure(failure) => failures.push(failure),
            }
        }

        let resolved: Vec<&Pattern> = self.alternatives.iter().map(|p| resolved_hop(p, resolver)).collect();
        if resolved.iter().any(|p| matches!(p, Pattern::Null))
            || resolved.iter().all(|p| matches!(p, Pattern::ExactValue(_)))
        {
            return self.failed_to_find_any(value, failures, resolver).into();
        }

        let failures = failures
            .into_iter()
            .zip(&self.alternatives)
            .enumerate()
            .map(|(index, (failure, alternative))| failure.breadcrumb(&alternative_marker(alternative, index + 1)))
            .collect();
        Failure::from_failures(failures).into()
    }

    /// One consolidated failure; for a nullable pair, the concrete alternative's own failure.
    fn failed_to_find_any(&self, value: &Value, mut failures: Vec<Failure>, resolver: &Resolver<'_>) -> Failure {
        if self.is_nullable_pair()
            && let Some(index) = self.alternatives.iter().position(|p| !is_empty_marker(p))
            && index < failures.len()
        {
            failures = vec![failures.swap_remove(index)];
        }

        if failures.len() == 1
            && let Some(failure) = failures.pop()
        {
            return failure;
        }
        mismatch_result(&self.type_name(), Some(value), resolver.mismatch_messages())
    }

    /// The example, or a random alternative. A cycle on the pick becomes null when the union is nullable.
    pub(crate) fn generate(&self, resolver: &Resolver<'_>) -> Result<Value, ContractError> {
        if let Some(value) = resolver.resolve_example_any(self.example.as_deref(), &self.alternatives)? {
            return Ok(value);
        }

        let Some(pick) = resolver.with_rng(|rng| self.alternatives.choose(rng)) else {
            return Err(ContractError::Invalid(format!(
                "{} has no alternatives to generate from",
                self.type_name()
            )));
        };

        let generated = resolver.with_cycle_prevention(pick, self.has_null(), |r| {
            r.generate_keyed(self.key.as_deref(), pick)
        })?;
        Ok(generated.unwrap_or(Value::Null))
    }

    /// Non-null alternatives first; the first successful interpretation wins.
    pub(crate) fn parse(&self, literal: &str, resolver: &Resolver<'_>) -> Result<Value, ContractError> {
        let (nulls, others): (Vec<&Pattern>, Vec<&Pattern>) = self
            .alternatives
            .iter()
            .map(|p| resolved_hop(p, resolver))
            .partition(|p| matches!(p, Pattern::Null));

        others
            .into_iter()
            .chain(nulls)
            .find_map(|p| p.parse(literal, resolver).ok())
            .ok_or_else(|| ContractError::Parse {
                value: literal.to_string(),
                expected: self.alternatives.iter().map(Pattern::type_name).collect(),
            })
    }

    pub(crate) fn new_based_on<'a>(&'a self, row: &'a Row, resolver: &Resolver<'a>) -> PatternStream<'a> {
        match resolver.resolve_example_any(self.example.as_deref(), &self.alternatives) {
            Ok(Some(value)) => return Box::new(iter::once(Ok(Pattern::exact(value)))),
            Ok(None) => {}
            Err(err) => return Box::new(iter::once(Err(err))),
        }
        if self.alternatives.is_empty() {
            return Box::new(iter::empty());
        }

        let nullable = self.has_null();
        let resolver = resolver.clone();
        let candidates = self
            .nulls_last()
            .flat_map(move |alternative| -> PatternStream<'a> {
                match resolver.cycle_guard(alternative, nullable) {
                    Ok(Some(child)) => alternative.new_based_on(row, &child),
                    Ok(None) => Box::new(iter::empty()),
                    Err(err) => Box::new(iter::once(Err(err))),
                }
            })
            .filter(move |candidate| !(nullable && matches!(candidate, Err(err) if err.is_cycle())));

        Box::new(OrExhausted::new(Box::new(candidates), "Could not generate new tests"))
    }

    /// Negatives of every alternative, deduplicated.
    ///
    /// A scalar candidate that some other alternative encompasses is dropped: for
    /// `string or number`, the number negative of the string alternative is a valid
    /// union value. Null is dropped when the union is nullable. Scalars and exact
    /// values are kept once per value; other composite candidates are always kept.
    pub(crate) fn negative_based_on<'a>(&'a self, row: &'a Row, resolver: &Resolver<'a>) -> NegativeStream<'a> {
        if self.alternatives.is_empty() {
            return Box::new(iter::empty());
        }

        let nullable = self.has_null();
        let expanding = resolver.clone();
        let candidates = self.nulls_last().flat_map(
            move |alternative| -> Box<dyn Iterator<Item = Result<ReturnValue<Pattern>, ContractError>> + 'a> {
                match expanding.cycle_guard(alternative, nullable) {
                    Ok(Some(child)) => Box::new(alternative.negative_based_on(row, &child).map(Ok)),
                    Ok(None) => Box::new(iter::empty()),
                    Err(err) => Box::new(iter::once(Err(err))),
                }
            },
        );

        let checking = resolver.clone();
        let mut seen: Vec<Pattern> = Vec::new();
        let negatives = OrExhausted::new(Box::new(candidates), "Could not get negative tests")
            .map(|candidate| candidate.unwrap_or_else(|err| ReturnValue::HasFailure(err.failure())))
            .filter(move |candidate| !(nullable && matches!(candidate.as_value(), Some(Pattern::Null))))
            .filter(move |candidate| match candidate.as_value() {
                Some(pattern) if pattern.is_scalar() => !self.accepts(pattern, &checking),
                _ => true,
            })
            .filter(move |candidate| candidate.as_value().is_none_or(|pattern| first_sighting(&mut seen, pattern)));

        Box::new(negatives)
    }

    /// Whether some alternative encompasses `candidate`, so the union accepts every value of it.
    /// Only consulted for scalar candidates.
    fn accepts(&self, candidate: &Pattern, resolver: &Resolver<'_>) -> bool {
        self.alternatives
            .iter()
            .any(|alternative| alternative.encompasses(candidate, resolver, resolver).is_success())
    }

    pub(crate) fn encompasses(
        &self,
        whole: &Pattern,
        other: &Pattern,
        this_resolver: &Resolver<'_>,
        other_resolver: &Resolver<'_>,
        stack: &TypeStack,
    ) -> MatchResult {
        let result = other.fits_within_in(&whole.pattern_set(this_resolver), other_resolver, this_resolver, stack);
        if !result.is_success() && self.all_values_are_scalar() {
            return type_mismatch_result(&self.type_name(), &other.type_name(), this_resolver.mismatch_messages()).into();
        }
        result
    }

    fn all_values_are_scalar(&self) -> bool {
        self.alternatives
            .iter()
            .all(|p| matches!(p, Pattern::ExactValue(exact) if exact.value.is_scalar()))
    }
}

/// False when an equal scalar or exact value was already seen.
fn first_sighting(seen: &mut Vec<Pattern>, pattern: &Pattern) -> bool {
    if !(pattern.is_scalar() || matches!(pattern, Pattern::ExactValue(_))) {
        return true;
    }
    if seen.contains(pattern) {
        debug!(candidate = %pattern, "duplicate negative candidate dropped");
        return false;
    }
    seen.push(pattern.clone());
    true
}

fn is_empty_marker(pattern: &Pattern) -> bool {
    matches!(pattern, Pattern::Null) || pattern.type_alias() == Some(EMPTY_ALIAS)
}

/// `(~~~Person object)` for a named alternative, `(~~~object 2)` otherwise.
fn alternative_marker(alternative: &Pattern, ordinal: usize) -> String {
    match alternative.type_alias() {
        Some(alias) if !alias.trim().is_empty() && alias != "()" => {
            format!("(~~~{} object)", without_pattern_delimiters(alias))
        }
        _ => format!("(~~~object {ordinal})"),
    }
}

/// Passes candidates through and sets failed ones aside. When the inner sequence
/// ends without a single candidate but with failures, yields one error carrying
/// every failure. Alternatives skipped by cycle prevention leave nothing behind,
/// so a sequence that was simply empty ends cleanly.
struct OrExhausted<'a, T> {
    inner: Box<dyn Iterator<Item = Result<T, ContractError>> + 'a>,
    message: &'static str,
    produced: bool,
    failures: Vec<ContractError>,
    finished: bool,
}

impl<'a, T> OrExhausted<'a, T> {
    fn new(inner: Box<dyn Iterator<Item = Result<T, ContractError>> + 'a>, message: &'static str) -> Self {
        Self {
            inner,
            message,
            produced: false,
            failures: Vec::new(),
            finished: false,
        }
    }
}

impl<T> Iterator for OrExhausted<'_, T> {
    type Item = Result<T, ContractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        for candidate in self.inner.by_ref() {
            match candidate {
                Ok(candidate) => {
                    self.produced = true;
                    return Some(Ok(candidate));
                }
                Err(err) => self.failures.push(err),
            }
        }
        self.finished = true;
        if self.produced || self.failures.is_empty() {
            return None;
        }

        let failures = std::mem::take(&mut self.failures);
        // a lone cycle must keep its identity so an enclosing nullable context can absorb it
        if failures.iter().all(ContractError::is_cycle) {
            return failures.into_iter().next().map(Err);
        }
        warn!(message = self.message, failures = failures.len(), "union produced no candidates");
        Some(Err(ContractError::aggregate(
            self.message,
            failures.iter().map(ContractError::failure).collect(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{NumberPattern, ObjectPattern, StringPattern};
    use crate::registry::Registry;

    fn string() -> Pattern {
        Pattern::String(StringPattern::default())
    }

    fn number() -> Pattern {
        Pattern::Number(NumberPattern::default())
    }

    #[test]
    fn nullable_type_name() {
        assert_eq!(AnyPattern::new(vec![string(), Pattern::Null]).type_name(), "(string?)");
        assert_eq!(AnyPattern::new(vec![string(), number()]).type_name(), "(string or number)");
        assert_eq!(
            AnyPattern::new(vec![string(), number(), Pattern::Null]).type_name(),
            "(string or number or \"null\")"
        );
    }

    #[test]
    fn nullable_string_rejects_numbers_and_accepts_null() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = Pattern::nullable(string());
        assert!(pattern.matches(&Value::Null, &resolver).is_success());

        let result = pattern.matches(&Value::integer(10), &resolver);
        assert_eq!(
            result.failure().unwrap().message,
            "Expected string, actual was 10 (number)"
        );
    }

    #[test]
    fn exact_alternatives_report_one_mismatch() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = Pattern::Any(AnyPattern::new(vec![
            Pattern::exact(Value::from("a")),
            Pattern::exact(Value::from("b")),
        ]));
        let result = pattern.matches(&Value::from("c"), &resolver);
        let failure = result.failure().unwrap();
        assert!(failure.causes.is_empty());
        assert_eq!(failure.message, "Expected (\"a\" or \"b\"), actual was \"c\" (string)");
    }

    #[test]
    fn other_alternatives_are_reported_separately() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let cat = ObjectPattern::new([("meow", string())]).with_alias("Cat");
        let pattern = Pattern::Any(AnyPattern::new(vec![Pattern::Object(cat), number()]));
        let result = pattern.matches(&Value::from("x"), &resolver);
        let mut paths = result.failure().unwrap().paths();
        paths.sort();
        assert_eq!(paths, vec!["(when Cat object)", "(when object 2)"]);
    }

    #[test]
    fn parse_prefers_non_null_alternatives() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = Pattern::Any(AnyPattern::new(vec![Pattern::Null, number()]));
        assert_eq!(pattern.parse("10", &resolver).unwrap(), Value::integer(10));

        let err = Pattern::Any(AnyPattern::new(vec![number(), Pattern::Boolean(Default::default())]))
            .parse("abc", &resolver)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to parse value \"abc\". It should have matched one of number, boolean."
        );
    }

    #[test]
    fn new_based_on_puts_null_last() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = Pattern::Any(AnyPattern::new(vec![Pattern::Null, number()]));
        let row = Row::new();
        let candidates: Vec<Pattern> = pattern.new_based_on(&row, &resolver).collect::<Result<_, _>>().unwrap();
        assert_eq!(candidates, vec![number(), Pattern::Null]);
    }

    #[test]
    fn no_candidates_is_an_error() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = Pattern::Any(AnyPattern::new(vec![Pattern::deferred("(Missing)")]));
        let row = Row::new();
        let candidates: Vec<_> = pattern.new_based_on(&row, &resolver).collect();
        assert_eq!(candidates.len(), 1);
        let err = candidates.into_iter().next().unwrap().unwrap_err();
        assert!(err.to_string().contains("Could not generate new tests"));
        assert!(err.to_string().contains("Type (Missing) is not defined"));
    }

    #[test]
    fn negatives_exclude_values_the_union_accepts() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = Pattern::Any(AnyPattern::new(vec![string(), number()]));
        let row = Row::new();
        let negatives: Vec<Pattern> = pattern
            .negative_based_on(&row, &resolver)
            .filter_map(|candidate| candidate.into_value().ok())
            .collect();
        assert_eq!(negatives, vec![Pattern::Null, Pattern::Boolean(Default::default())]);
    }

    #[test]
    fn nullable_negatives_drop_null() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = Pattern::nullable(string());
        let row = Row::new();
        let negatives: Vec<Pattern> = pattern
            .negative_based_on(&row, &resolver)
            .filter_map(|candidate| candidate.into_value().ok())
            .collect();
        assert!(!negatives.contains(&Pattern::Null));
        assert!(negatives.contains(&number()));
    }

    #[test]
    fn scalar_exact_unions_report_one_compatibility_mismatch() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = Pattern::Any(AnyPattern::new(vec![
            Pattern::exact(Value::from("a")),
            Pattern::exact(Value::from("b")),
        ]));
        let result = pattern.encompasses(&string(), &resolver, &resolver);
        assert_eq!(
            result.failure().unwrap().message,
            "Expected (\"a\" or \"b\"), actual was string"
        );
        assert!(pattern.encompasses(&Pattern::exact(Value::from("a")), &resolver, &resolver).is_success());
    }

    #[test]
    fn nullable_recursion_negates_without_failures() {
        let node = ObjectPattern::new([("value", number()), ("next", Pattern::nullable(Pattern::deferred("(Node)")))])
            .with_alias("(Node)");
        let registry = Registry::new().with("Node", Pattern::Object(node));
        let resolver = Resolver::new(&registry);
        let row = Row::new();
        let candidates: Vec<ReturnValue<Pattern>> = Pattern::deferred("(Node)").negative_based_on(&row, &resolver).collect();
        assert!(!candidates.is_empty());
        let failures: Vec<Failure> = candidates.iter().filter_map(ReturnValue::to_failure).collect();
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn union_of_only_null_has_no_negatives() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let row = Row::new();
        let pattern = Pattern::Any(AnyPattern::new(vec![Pattern::Null]));
        assert_eq!(pattern.negative_based_on(&row, &resolver).count(), 0);
    }

    #[test]
    fn exact_values_are_deduplicated_by_value() {
        let mut seen = Vec::new();
        let config = || Pattern::exact(Value::object([("debug", Value::Boolean(true))]));
        assert!(first_sighting(&mut seen, &config()));
        assert!(!first_sighting(&mut seen, &config()));
        assert!(first_sighting(&mut seen, &Pattern::exact(Value::object([("debug", Value::Boolean(false))]))));

        let object = Pattern::Object(ObjectPattern::new([("id", number())]));
        assert!(first_sighting(&mut seen, &object));
        assert!(first_sighting(&mut seen, &object));
    }

    #[test]
    fn nullable_union_generates_null_on_cycle() {
        let node = ObjectPattern::new([("value", number()), ("next", Pattern::nullable(Pattern::deferred("(Node)")))])
            .with_alias("(Node)");
        let registry = Registry::new().with("Node", Pattern::Object(node));
        let resolver = Resolver::new(&registry).with_seed(3);
        let reference = Pattern::deferred("(Node)");
        for _ in 0..20 {
            let value = reference.generate(&resolver).unwrap();
            assert!(reference.matches(&value, &resolver).is_success());
        }
    }
}
