//! Schema pattern nodes
//!
//! [`Pattern`] is a closed set of schema node kinds; every operation dispatches
//! exhaustively over the variants. Named and recursive schemas are expressed with
//! [`DeferredPattern`] references resolved through the [`Registry`](crate::Registry)
//! at traversal time, so a pattern tree is never cyclic.
//!
//! Derivation (`new_based_on`, `negative_based_on`) is lazy: the returned
//! iterators produce one candidate per pull and can be restarted only by calling
//! the operation again.

mod any;
mod deferred;
mod exact;
mod list;
mod object;
mod scalar;

use std::fmt;
use std::iter;

use contractfuzz_core::{ContractError, Failure, MatchResult, ReturnValue, Value, type_mismatch_result};

use crate::resolver::Resolver;
use crate::row::Row;

pub use any::AnyPattern;
pub use deferred::DeferredPattern;
pub use exact::ExactValuePattern;
pub use list::ListPattern;
pub use object::ObjectPattern;
pub use scalar::{BooleanPattern, NumberPattern, StringPattern};

pub(crate) use object::{field_new_based_on, fields_new_based_on};

/// Positive candidates; an error marks a candidate that could not be derived.
pub type PatternStream<'a> = Box<dyn Iterator<Item = Result<Pattern, ContractError>> + 'a>;

/// Negative candidates, each carrying its own failure when it could not be built.
pub type NegativeStream<'a> = Box<dyn Iterator<Item = ReturnValue<Pattern>> + 'a>;

/// Pairs of named patterns already being compared, so recursive schemas terminate.
pub(crate) type TypeStack = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    String(StringPattern),
    Number(NumberPattern),
    Boolean(BooleanPattern),
    Null,
    ExactValue(ExactValuePattern),
    Deferred(DeferredPattern),
    Object(ObjectPattern),
    Array(ListPattern),
    Any(AnyPattern),
}

impl Pattern {
    pub fn exact(value: Value) -> Self {
        Self::ExactValue(ExactValuePattern::new(value))
    }

    pub fn deferred(name: &str) -> Self {
        Self::Deferred(DeferredPattern::new(name))
    }

    /// `(string?)` style nullable union of `pattern` and null.
    pub fn nullable(pattern: Pattern) -> Self {
        Self::Any(AnyPattern::new(vec![pattern, Self::Null]))
    }

    pub fn type_name(&self) -> String {
        match self {
            Self::String(_) => "string".to_string(),
            Self::Number(_) => "number".to_string(),
            Self::Boolean(_) => "boolean".to_string(),
            Self::Null => "null".to_string(),
            Self::ExactValue(p) => p.value.displayable_value(),
            Self::Deferred(p) => without_pattern_delimiters(&p.name).to_string(),
            Self::Object(p) => p
                .type_alias
                .as_deref()
                .map_or_else(|| "json object".to_string(), |a| without_pattern_delimiters(a).to_string()),
            Self::Array(p) => format!("array of {}", p.item.type_name()),
            Self::Any(p) => p.type_name(),
        }
    }

    /// Name under which a schema was registered, e.g. `(Person)`.
    pub fn type_alias(&self) -> Option<&str> {
        match self {
            Self::ExactValue(p) => p.type_alias.as_deref(),
            Self::Object(p) => p.type_alias.as_deref(),
            Self::Array(p) => p.type_alias.as_deref(),
            Self::Any(p) => p.type_alias.as_deref(),
            Self::String(_) | Self::Number(_) | Self::Boolean(_) | Self::Null | Self::Deferred(_) => None,
        }
    }

    pub fn example(&self) -> Option<&str> {
        match self {
            Self::String(p) => p.example.as_deref(),
            Self::Number(p) => p.example.as_deref(),
            Self::Boolean(p) => p.example.as_deref(),
            Self::Array(p) => p.example.as_deref(),
            Self::Any(p) => p.example.as_deref(),
            Self::Null | Self::ExactValue(_) | Self::Deferred(_) | Self::Object(_) => None,
        }
    }

    /// Key used by cycle prevention. Unnamed patterns are never tracked.
    pub(crate) fn cycle_identity(&self) -> Option<String> {
        match self {
            Self::Deferred(p) => Some(crate::registry::as_token(&p.name)),
            other => other
                .type_alias()
                .filter(|a| !a.is_empty() && *a != "()")
                .map(crate::registry::as_token),
        }
    }

    /// Null, or a union with a null alternative (directly or through a nested union), after following references.
    pub fn is_nullable(&self, resolver: &Resolver<'_>) -> bool {
        match resolved_hop(self, resolver) {
            Self::Null => true,
            Self::Any(p) => {
                p.has_null()
                    || p.alternatives.iter().any(|alternative| match alternative {
                        Self::Any(_) => alternative.is_nullable(resolver),
                        other => matches!(resolved_hop(other, resolver), Self::Null),
                    })
            }
            _ => false,
        }
    }

    /// Scalar schema nodes; their negatives are compared by value when deduplicating.
    pub(crate) const fn is_scalar(&self) -> bool {
        match self {
            Self::String(_) | Self::Number(_) | Self::Boolean(_) | Self::Null => true,
            Self::ExactValue(p) => p.value.is_scalar(),
            Self::Deferred(_) | Self::Object(_) | Self::Array(_) | Self::Any(_) => false,
        }
    }

    /// Structural comparison; data mismatches are failures, never errors.
    pub fn matches(&self, value: &Value, resolver: &Resolver<'_>) -> MatchResult {
        match self {
            Self::String(p) => p.matches(value, resolver),
            Self::Number(p) => p.matches(value, resolver),
            Self::Boolean(_) => BooleanPattern::matches(value, resolver),
            Self::Null => scalar::null_matches(value, resolver),
            Self::ExactValue(p) => p.matches(value, resolver),
            Self::Deferred(p) => p.matches(value, resolver),
            Self::Object(p) => p.matches(value, resolver),
            Self::Array(p) => p.matches(value, resolver),
            Self::Any(p) => p.matches(value, resolver),
        }
    }

    /// # Errors
    ///
    /// Fails when the schema is contradictory, a reference is unknown, or an
    /// unresolved cycle occurs outside a nullable context.
    pub fn generate(&self, resolver: &Resolver<'_>) -> Result<Value, ContractError> {
        match self {
            Self::String(p) => p.generate(self, resolver),
            Self::Number(p) => p.generate(self, resolver),
            Self::Boolean(p) => p.generate(self, resolver),
            Self::Null => Ok(Value::Null),
            Self::ExactValue(p) => Ok(p.value.clone()),
            Self::Deferred(p) => p.generate(resolver),
            Self::Object(p) => p.generate(resolver),
            Self::Array(p) => p.generate(self, resolver),
            Self::Any(p) => p.generate(resolver),
        }
    }

    /// Interpret a raw literal as a value of this pattern's type.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Parse`] naming the attempted types when no interpretation succeeds.
    pub fn parse(&self, literal: &str, resolver: &Resolver<'_>) -> Result<Value, ContractError> {
        match self {
            Self::String(_) => Ok(Value::string(literal)),
            Self::Number(_) => scalar::parse_number(literal),
            Self::Boolean(_) => scalar::parse_boolean(literal),
            Self::Null => scalar::parse_null(literal),
            Self::ExactValue(p) => p.parse(literal),
            Self::Deferred(p) => p.parse(literal, resolver),
            Self::Object(_) | Self::Array(_) => parse_json(literal, self),
            Self::Any(p) => p.parse(literal, resolver),
        }
    }

    /// More specific patterns, one per positive test case.
    pub fn new_based_on<'a>(&'a self, row: &'a Row, resolver: &Resolver<'a>) -> PatternStream<'a> {
        match self {
            Self::String(_) | Self::Number(_) | Self::Boolean(_) => scalar::scalar_new_based_on(self, resolver),
            Self::Null | Self::ExactValue(_) => Box::new(iter::once(Ok(self.clone()))),
            Self::Deferred(p) => p.new_based_on(row, resolver),
            Self::Object(p) => p.new_based_on(row, resolver),
            Self::Array(p) => p.new_based_on(self, row, resolver),
            Self::Any(p) => p.new_based_on(row, resolver),
        }
    }

    /// Patterns describing invalid variants of this node.
    pub fn negative_based_on<'a>(&'a self, row: &'a Row, resolver: &Resolver<'a>) -> NegativeStream<'a> {
        match self {
            Self::String(p) => scalar::scalar_negatives(p.negatives()),
            Self::Number(p) => scalar::scalar_negatives(p.negatives()),
            Self::Boolean(_) => scalar::scalar_negatives(BooleanPattern::negatives()),
            Self::Null => Box::new(iter::empty()),
            Self::ExactValue(p) => scalar::scalar_negatives(p.negatives()),
            Self::Deferred(p) => p.negative_based_on(row, resolver),
            Self::Object(p) => p.negative_based_on(row, resolver),
            Self::Array(p) => p.negative_based_on(row, resolver),
            Self::Any(p) => p.negative_based_on(row, resolver),
        }
    }

    /// Whether every value of `other` is also a value of `self`.
    pub fn encompasses(&self, other: &Pattern, this_resolver: &Resolver<'_>, other_resolver: &Resolver<'_>) -> MatchResult {
        self.encompasses_in(other, this_resolver, other_resolver, &TypeStack::new())
    }

    pub(crate) fn encompasses_in(
        &self,
        other: &Pattern,
        this_resolver: &Resolver<'_>,
        other_resolver: &Resolver<'_>,
        stack: &TypeStack,
    ) -> MatchResult {
        if matches!(self, Self::Deferred(_)) || matches!(other, Self::Deferred(_)) {
            let pair = (self.type_name(), other.type_name());
            if stack.contains(&pair) {
                return MatchResult::success();
            }
            let mut stack = stack.clone();
            stack.push(pair);

            let this = match resolve_deferred(self, this_resolver) {
                Ok(p) => p,
                Err(err) => return err.failure().into(),
            };
            let that = match resolve_deferred(other, other_resolver) {
                Ok(p) => p,
                Err(err) => return err.failure().into(),
            };
            return this.encompasses_in(that, this_resolver, other_resolver, &stack);
        }

        let messages = this_resolver.mismatch_messages();
        match (self, other) {
            (Self::Any(p), _) => p.encompasses(self, other, this_resolver, other_resolver, stack),
            (_, Self::Any(_)) => other.fits_within_in(std::slice::from_ref(self), other_resolver, this_resolver, stack),
            (_, Self::ExactValue(exact)) => match self.matches(&exact.value, this_resolver) {
                MatchResult::Success(_) => MatchResult::success(),
                MatchResult::Failure(_) => type_mismatch_result(&self.type_name(), &other.type_name(), messages).into(),
            },
            (Self::String(this), Self::String(that)) => range_within(
                "length",
                this.min_length.map(to_f64),
                this.max_length.map(to_f64),
                that.min_length.map(to_f64),
                that.max_length.map(to_f64),
            ),
            (Self::Number(this), Self::Number(that)) => {
                range_within("value", this.minimum, this.maximum, that.minimum, that.maximum)
            }
            (Self::Boolean(_), Self::Boolean(_)) | (Self::Null, Self::Null) => MatchResult::success(),
            (Self::Object(this), Self::Object(that)) => {
                this.encompasses(that, this_resolver, other_resolver, stack)
            }
            (Self::Array(this), Self::Array(that)) => this
                .item
                .encompasses_in(&that.item, this_resolver, other_resolver, stack)
                .breadcrumb("[]"),
            _ => type_mismatch_result(&self.type_name(), &other.type_name(), messages).into(),
        }
    }

    /// Whether this pattern fits within one of `patterns`; unions must fit alternative by alternative.
    pub fn fits_within(
        &self,
        patterns: &[Pattern],
        this_resolver: &Resolver<'_>,
        other_resolver: &Resolver<'_>,
    ) -> MatchResult {
        self.fits_within_in(patterns, this_resolver, other_resolver, &TypeStack::new())
    }

    pub(crate) fn fits_within_in(
        &self,
        patterns: &[Pattern],
        this_resolver: &Resolver<'_>,
        other_resolver: &Resolver<'_>,
        stack: &TypeStack,
    ) -> MatchResult {
        let results = self.pattern_set(this_resolver).into_iter().map(|mine| {
            let attempts: Vec<MatchResult> = patterns
                .iter()
                .map(|container| container.encompasses_in(&mine, other_resolver, this_resolver, stack))
                .collect();
            attempts
                .iter()
                .find(|r| r.is_success())
                .or_else(|| attempts.first())
                .cloned()
                .unwrap_or_else(|| {
                    Failure::new(format!("No type to compare {} against", mine.type_name())).into()
                })
        });
        MatchResult::from_results(results.collect::<Vec<_>>())
    }

    /// The alternatives this pattern stands for; unions are flattened.
    pub fn pattern_set(&self, resolver: &Resolver<'_>) -> Vec<Pattern> {
        match resolved_hop(self, resolver) {
            Self::Any(p) => p
                .alternatives
                .iter()
                .flat_map(|alternative| match alternative {
                    Self::Any(_) => alternative.pattern_set(resolver),
                    other => vec![other.clone()],
                })
                .collect(),
            _ => vec![self.clone()],
        }
    }
}

/// Query-string style rendering: `(number)`, `(Person)`, or the literal of an exact value.
impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactValue(p) => f.write_str(&p.value.to_string_literal()),
            Self::Deferred(p) => f.write_str(&crate::registry::as_token(&p.name)),
            Self::Any(p) => f.write_str(&p.type_name()),
            other => write!(f, "({})", other.type_name()),
        }
    }
}

/// `key?` → `key`
pub fn without_optionality(key: &str) -> &str {
    key.strip_suffix('?').unwrap_or(key)
}

pub fn is_optional(key: &str) -> bool {
    key.ends_with('?')
}

/// Literals like `(number)` name a pattern instead of a value.
pub fn is_pattern_token(literal: &str) -> bool {
    literal.len() >= 2 && literal.starts_with('(') && literal.ends_with(')')
}

pub(crate) fn without_pattern_delimiters(name: &str) -> &str {
    name.strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(name)
}

/// Follow deferred references until a concrete pattern (or an unknown name) is reached.
pub(crate) fn resolved_hop<'a>(pattern: &'a Pattern, resolver: &Resolver<'a>) -> &'a Pattern {
    let mut current = pattern;
    let mut seen: Vec<&str> = Vec::new();
    while let Pattern::Deferred(deferred) = current {
        if seen.contains(&deferred.name.as_str()) {
            break;
        }
        seen.push(&deferred.name);
        match resolver.lookup(&deferred.name) {
            Ok(next) => current = next,
            Err(_) => break,
        }
    }
    current
}

fn resolve_deferred<'p>(pattern: &'p Pattern, resolver: &Resolver<'p>) -> Result<&'p Pattern, ContractError> {
    match pattern {
        Pattern::Deferred(deferred) => resolver.lookup(&deferred.name),
        other => Ok(other),
    }
}

/// Positive derivations of `pattern`, or its example as an exact value when examples are preferred.
pub(crate) fn exact_or_self<'a>(pattern: &'a Pattern, resolver: &Resolver<'a>) -> PatternStream<'a> {
    match resolver.resolve_example(pattern.example(), pattern) {
        Ok(Some(value)) => Box::new(iter::once(Ok(Pattern::exact(value)))),
        Ok(None) => Box::new(iter::once(Ok(pattern.clone()))),
        Err(err) => Box::new(iter::once(Err(err))),
    }
}

fn parse_json(literal: &str, pattern: &Pattern) -> Result<Value, ContractError> {
    let parsed = serde_json::from_str::<serde_json::Value>(literal).map(Value::from);
    match (parsed, pattern) {
        (Ok(value @ Value::Object(_)), Pattern::Object(_)) | (Ok(value @ Value::Array(_)), Pattern::Array(_)) => Ok(value),
        _ => Err(scalar::parse_error(literal, &pattern.type_name())),
    }
}

#[allow(clippy::cast_precision_loss)]
const fn to_f64(n: usize) -> f64 {
    n as f64
}

/// `other`'s declared range must lie inside `this` one.
fn range_within(
    what: &str,
    this_min: Option<f64>,
    this_max: Option<f64>,
    other_min: Option<f64>,
    other_max: Option<f64>,
) -> MatchResult {
    let min_ok = match (this_min, other_min) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(this), Some(other)) => other >= this,
    };
    let max_ok = match (this_max, other_max) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(this), Some(other)) => other <= this,
    };
    if min_ok && max_ok {
        MatchResult::success()
    } else {
        Failure::new(format!(
            "Expected {what} range {} to {}, the other schema allows {} to {}",
            render_bound(this_min),
            render_bound(this_max),
            render_bound(other_min),
            render_bound(other_max)
        ))
        .into()
    }
}

fn render_bound(bound: Option<f64>) -> String {
    bound.map_or_else(|| "unbounded".to_string(), |b| scalar::number_value(b).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn optionality_markers() {
        assert_eq!(without_optionality("id?"), "id");
        assert_eq!(without_optionality("id"), "id");
        assert!(is_optional("id?"));
        assert!(is_pattern_token("(number)"));
        assert!(!is_pattern_token("10"));
    }

    #[test]
    fn type_names() {
        let list = Pattern::Array(ListPattern::new(Pattern::Number(NumberPattern::default())));
        assert_eq!(list.type_name(), "array of number");
        assert_eq!(Pattern::exact(Value::from("abc")).type_name(), "\"abc\"");
        assert_eq!(Pattern::deferred("(Person)").type_name(), "Person");
        assert_eq!(
            Pattern::nullable(Pattern::String(StringPattern::default())).type_name(),
            "(string?)"
        );
    }

    #[test]
    fn display_renders_tokens() {
        assert_eq!(Pattern::Number(NumberPattern::default()).to_string(), "(number)");
        assert_eq!(Pattern::exact(Value::from("fixed")).to_string(), "fixed");
        assert_eq!(Pattern::deferred("Id").to_string(), "(Id)");
    }

    #[test]
    fn references_are_followed() {
        let registry = Registry::new()
            .with("Id", Pattern::deferred("(number)"))
            .with("Loop", Pattern::deferred("(Loop)"));
        let resolver = Resolver::new(&registry);
        let id = Pattern::deferred("(Id)");
        assert!(matches!(resolved_hop(&id, &resolver), Pattern::Number(_)));

        let looping = Pattern::deferred("(Loop)");
        assert!(matches!(resolved_hop(&looping, &resolver), Pattern::Deferred(_)));
        assert!(!id.is_nullable(&resolver));
    }

    #[test]
    fn number_range_compatibility() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let wide = Pattern::Number(NumberPattern::with_range(Some(0.0), Some(100.0)));
        let narrow = Pattern::Number(NumberPattern::with_range(Some(10.0), Some(20.0)));
        assert!(wide.encompasses(&narrow, &resolver, &resolver).is_success());
        assert!(!narrow.encompasses(&wide, &resolver, &resolver).is_success());
    }

    #[test]
    fn scalar_encompasses_matching_exact_value() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let number = Pattern::Number(NumberPattern::default());
        assert!(number.encompasses(&Pattern::exact(Value::integer(1)), &resolver, &resolver).is_success());
        let result = number.encompasses(&Pattern::exact(Value::from("a")), &resolver, &resolver);
        assert_eq!(result.failure().unwrap().message, "Expected number, actual was \"a\"");
    }

    #[test]
    fn recursive_schemas_are_compatible_with_themselves() {
        let node = ObjectPattern::new([
            ("value", Pattern::Number(NumberPattern::default())),
            ("next?", Pattern::deferred("(Node)")),
        ])
        .with_alias("(Node)");
        let registry = Registry::new().with("Node", Pattern::Object(node));
        let resolver = Resolver::new(&registry);
        let reference = Pattern::deferred("(Node)");
        assert!(reference.encompasses(&reference, &resolver, &resolver).is_success());
    }

    #[test]
    fn parse_json_containers() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let list = Pattern::Array(ListPattern::new(Pattern::Number(NumberPattern::default())));
        assert_eq!(
            list.parse("[1,2]", &resolver).unwrap(),
            Value::Array(vec![Value::integer(1), Value::integer(2)])
        );
        assert!(list.parse("{}", &resolver).is_err());
    }
}
