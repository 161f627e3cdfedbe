use contractfuzz_core::{ContractError, MatchResult, Value, mismatch_result};

use crate::pattern::scalar::{parse_boolean, parse_error, parse_null, parse_number};
use crate::pattern::{BooleanPattern, NumberPattern, Pattern, StringPattern};
use crate::resolver::Resolver;

/// Matches exactly one literal value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactValuePattern {
    pub value: Value,
    pub type_alias: Option<String>,
}

impl ExactValuePattern {
    pub const fn new(value: Value) -> Self {
        Self {
            value,
            type_alias: None,
        }
    }

    pub(crate) fn matches(&self, value: &Value, resolver: &Resolver<'_>) -> MatchResult {
        if same_value(&self.value, value) {
            MatchResult::success()
        } else {
            mismatch_result(&self.value.displayable_value(), Some(value), resolver.mismatch_messages()).into()
        }
    }

    /// Literals are read with the type of the expected value.
    pub(crate) fn parse(&self, literal: &str) -> Result<Value, ContractError> {
        match &self.value {
            Value::String(_) => Ok(Value::string(literal)),
            Value::Number(_) => parse_number(literal),
            Value::Boolean(_) => parse_boolean(literal),
            Value::Null => parse_null(literal),
            Value::Array(_) | Value::Object(_) => serde_json::from_str::<serde_json::Value>(literal)
                .map(Value::from)
                .map_err(|_| parse_error(literal, self.value.displayable_type())),
        }
    }

    /// Values of the wrong type for this literal.
    pub(crate) fn negatives(&self) -> Vec<Pattern> {
        let string = || Pattern::String(StringPattern::default());
        let number = || Pattern::Number(NumberPattern::default());
        let boolean = || Pattern::Boolean(BooleanPattern::default());
        match &self.value {
            Value::Null => Vec::new(),
            Value::String(_) => vec![Pattern::Null, number(), boolean()],
            Value::Number(_) => vec![Pattern::Null, string(), boolean()],
            Value::Boolean(_) => vec![Pattern::Null, number(), string()],
            Value::Array(_) | Value::Object(_) => vec![Pattern::Null, string(), number(), boolean()],
        }
    }
}

/// Numbers compare by magnitude, so `1` and `1.0` are the same value.
pub(crate) fn same_value(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => a == b,
        },
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn matches_only_the_literal() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = ExactValuePattern::new(Value::from("active"));
        assert!(pattern.matches(&Value::from("active"), &resolver).is_success());

        let result = pattern.matches(&Value::from("inactive"), &resolver);
        assert_eq!(
            result.failure().unwrap().message,
            "Expected \"active\", actual was \"inactive\" (string)"
        );
    }

    #[test]
    fn integers_and_floats_compare_by_value() {
        assert!(same_value(&Value::integer(1), &Value::float(1.0)));
        assert!(!same_value(&Value::integer(1), &Value::from("1")));
    }

    #[test]
    fn parses_with_the_literal_type() {
        let pattern = ExactValuePattern::new(Value::integer(10));
        assert_eq!(pattern.parse("10").unwrap(), Value::integer(10));
        assert!(pattern.parse("ten").is_err());
    }

    #[test]
    fn null_literal_has_no_negatives() {
        assert!(ExactValuePattern::new(Value::Null).negatives().is_empty());
    }
}
