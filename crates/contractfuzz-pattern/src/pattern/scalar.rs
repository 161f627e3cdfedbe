//! String, number, boolean and null patterns

use rand::Rng;

use contractfuzz_core::{ContractError, Failure, MatchResult, ReturnValue, Value, mismatch_result};

use crate::pattern::{NegativeStream, Pattern, PatternStream, exact_or_self};
use crate::resolver::Resolver;

/// Cap on generated string length, whatever maxLength says.
const MAX_STRING_LEN: usize = 10_000;

/// Span used when only one side of a numeric range is declared.
const DEFAULT_SPAN: i64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringPattern {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub example: Option<String>,
}

impl StringPattern {
    #[must_use]
    pub fn with_length(min_length: Option<usize>, max_length: Option<usize>) -> Self {
        Self {
            min_length,
            max_length,
            example: None,
        }
    }

    #[must_use]
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    pub(crate) fn matches(&self, value: &Value, resolver: &Resolver<'_>) -> MatchResult {
        let Value::String(s) = value else {
            return mismatch_result("string", Some(value), resolver.mismatch_messages()).into();
        };
        let length = s.chars().count();

        if let Some(min) = self.min_length
            && length < min
        {
            return length_mismatch(&format!("string with minLength {min}"), value, resolver);
        }
        if let Some(max) = self.max_length
            && length > max
        {
            return length_mismatch(&format!("string with maxLength {max}"), value, resolver);
        }
        MatchResult::success()
    }

    pub(crate) fn generate(&self, pattern: &Pattern, resolver: &Resolver<'_>) -> Result<Value, ContractError> {
        if let Some(example) = resolver.resolve_example(self.example.as_deref(), pattern)? {
            return Ok(example);
        }

        if let Some(min) = self.min_length
            && min > MAX_STRING_LEN
        {
            return Err(ContractError::Invalid(format!(
                "string minLength {min} is above the generation limit of {MAX_STRING_LEN}"
            )));
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length)
            && min > max
        {
            return Err(ContractError::Invalid(format!(
                "string minLength {min} is greater than maxLength {max}"
            )));
        }

        let min = self.min_length.unwrap_or(1);
        let max = self.max_length.map_or(min.max(20), |v| v.min(MAX_STRING_LEN));
        // only the default minimum can exceed maxLength 0
        let min = min.min(max);

        let s = resolver.with_rng(|rng| {
            let len = rng.gen_range(min..=max);
            random_alnum(rng, len)
        });
        Ok(Value::String(s))
    }

    /// Type confusion plus the lengths one past each declared bound.
    pub(crate) fn negatives(&self) -> Vec<Pattern> {
        let mut patterns = vec![
            Pattern::Null,
            Pattern::Number(NumberPattern::default()),
            Pattern::Boolean(BooleanPattern::default()),
        ];
        if let Some(min) = self.min_length
            && min > 0
        {
            patterns.push(Pattern::exact(Value::string("a".repeat(min - 1))));
        }
        if let Some(max) = self.max_length
            && max < MAX_STRING_LEN
        {
            patterns.push(Pattern::exact(Value::string("a".repeat(max + 1))));
        }
        patterns
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberPattern {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Generate fractional values instead of integers.
    pub is_double: bool,
    pub example: Option<String>,
}

impl NumberPattern {
    #[must_use]
    pub fn with_range(minimum: Option<f64>, maximum: Option<f64>) -> Self {
        Self {
            minimum,
            maximum,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn double() -> Self {
        Self {
            is_double: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    pub(crate) fn matches(&self, value: &Value, resolver: &Resolver<'_>) -> MatchResult {
        let Some(n) = value.as_f64() else {
            return mismatch_result("number", Some(value), resolver.mismatch_messages()).into();
        };

        if let Some(min) = self.minimum
            && n < min
        {
            return length_mismatch(&format!("number >= {}", number_value(min)), value, resolver);
        }
        if let Some(max) = self.maximum
            && n > max
        {
            return length_mismatch(&format!("number <= {}", number_value(max)), value, resolver);
        }
        MatchResult::success()
    }

    pub(crate) fn generate(&self, pattern: &Pattern, resolver: &Resolver<'_>) -> Result<Value, ContractError> {
        if let Some(example) = resolver.resolve_example(self.example.as_deref(), pattern)? {
            return Ok(example);
        }

        if let (Some(min), Some(max)) = (self.minimum, self.maximum)
            && min > max
        {
            return Err(ContractError::Invalid(format!(
                "number minimum {} is greater than maximum {}",
                number_value(min),
                number_value(max)
            )));
        }

        if self.is_double {
            let (min, max) = match (self.minimum, self.maximum) {
                (Some(min), Some(max)) => (min, max),
                (Some(min), None) => (min, min + 1000.0),
                (None, Some(max)) => (max - 1000.0, max),
                (None, None) => (0.0, 1000.0),
            };
            return Ok(Value::float(resolver.with_rng(|rng| rng.gen_range(min..=max))));
        }

        let (min, max) = self.integer_range()?;
        let bounded = self.minimum.is_some() && self.maximum.is_some();
        let n = resolver.with_rng(|rng| {
            // 20% of bounded draws land on an edge
            if bounded && rng.gen_bool(0.2) {
                if rng.gen_bool(0.5) { min } else { max }
            } else {
                rng.gen_range(min..=max)
            }
        });
        Ok(Value::integer(n))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn integer_range(&self) -> Result<(i64, i64), ContractError> {
        let min = self.minimum.map(|m| m.ceil() as i64);
        let max = self.maximum.map(|m| m.floor() as i64);
        let (min, max) = match (min, max) {
            (Some(min), Some(max)) => (min, max),
            (Some(min), None) => (min, min.saturating_add(DEFAULT_SPAN)),
            (None, Some(max)) => (max.saturating_sub(DEFAULT_SPAN), max),
            (None, None) => (-DEFAULT_SPAN, DEFAULT_SPAN),
        };
        if min > max {
            return Err(ContractError::Invalid(format!(
                "no integer lies between minimum {min} and maximum {max}"
            )));
        }
        Ok((min, max))
    }

    /// Type confusion plus the values just outside each declared bound.
    pub(crate) fn negatives(&self) -> Vec<Pattern> {
        let mut patterns = vec![
            Pattern::Null,
            Pattern::String(StringPattern::default()),
            Pattern::Boolean(BooleanPattern::default()),
        ];
        if let Some(min) = self.minimum {
            patterns.push(Pattern::exact(number_value(min - 1.0)));
        }
        if let Some(max) = self.maximum {
            patterns.push(Pattern::exact(number_value(max + 1.0)));
        }
        patterns
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BooleanPattern {
    pub example: Option<String>,
}

impl BooleanPattern {
    pub(crate) fn matches(value: &Value, resolver: &Resolver<'_>) -> MatchResult {
        match value {
            Value::Boolean(_) => MatchResult::success(),
            other => mismatch_result("boolean", Some(other), resolver.mismatch_messages()).into(),
        }
    }

    pub(crate) fn generate(&self, pattern: &Pattern, resolver: &Resolver<'_>) -> Result<Value, ContractError> {
        if let Some(example) = resolver.resolve_example(self.example.as_deref(), pattern)? {
            return Ok(example);
        }
        Ok(Value::Boolean(resolver.with_rng(|rng| rng.gen_bool(0.5))))
    }

    pub(crate) fn negatives() -> Vec<Pattern> {
        vec![
            Pattern::Null,
            Pattern::Number(NumberPattern::default()),
            Pattern::String(StringPattern::default()),
        ]
    }
}

pub(crate) fn null_matches(value: &Value, resolver: &Resolver<'_>) -> MatchResult {
    if value.is_null() {
        MatchResult::success()
    } else {
        mismatch_result("null", Some(value), resolver.mismatch_messages()).into()
    }
}

/// Scalars are replaced by their example when examples are preferred.
pub(crate) fn scalar_new_based_on<'a>(pattern: &'a Pattern, resolver: &Resolver<'a>) -> PatternStream<'a> {
    exact_or_self(pattern, resolver)
}

pub(crate) fn scalar_negatives<'a>(candidates: Vec<Pattern>) -> NegativeStream<'a> {
    Box::new(candidates.into_iter().map(ReturnValue::value))
}

pub(crate) fn parse_number(literal: &str) -> Result<Value, ContractError> {
    let trimmed = literal.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(Value::integer(n));
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(Value::float(n)),
        _ => Err(parse_error(literal, "number")),
    }
}

pub(crate) fn parse_boolean(literal: &str) -> Result<Value, ContractError> {
    match literal.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(Value::Boolean(true)),
        "false" => Ok(Value::Boolean(false)),
        _ => Err(parse_error(literal, "boolean")),
    }
}

pub(crate) fn parse_null(literal: &str) -> Result<Value, ContractError> {
    match literal.trim() {
        "" | "null" => Ok(Value::Null),
        _ => Err(parse_error(literal, "null")),
    }
}

pub(crate) fn parse_error(literal: &str, expected: &str) -> ContractError {
    ContractError::Parse {
        value: literal.to_string(),
        expected: vec![expected.to_string()],
    }
}

/// Integral values become integers, everything else a float.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Value::integer(n as i64)
    } else {
        Value::float(n)
    }
}

fn length_mismatch(expected: &str, value: &Value, resolver: &Resolver<'_>) -> MatchResult {
    Failure::new(
        resolver
            .mismatch_messages()
            .mismatch_message(expected, &value.error_snippet()),
    )
    .into()
}

fn random_alnum(rng: &mut impl Rng, len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..len)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn resolver(registry: &Registry) -> Resolver<'_> {
        Resolver::new(registry).with_seed(42)
    }

    #[test]
    fn gen_string_length_constraints() {
        let registry = Registry::new();
        let pattern = Pattern::String(StringPattern::with_length(Some(5), Some(10)));
        let value = pattern.generate(&resolver(&registry)).unwrap();
        let len = value.as_str().unwrap().len();
        assert!((5..=10).contains(&len));
    }

    #[test]
    fn contradictory_string_lengths_are_invalid() {
        let registry = Registry::new();
        let pattern = Pattern::String(StringPattern::with_length(Some(5), Some(2)));
        assert!(matches!(
            pattern.generate(&resolver(&registry)),
            Err(ContractError::Invalid(_))
        ));
    }

    #[test]
    fn min_length_above_the_generation_limit_is_invalid() {
        let registry = Registry::new();
        let pattern = Pattern::String(StringPattern::with_length(Some(MAX_STRING_LEN + 1), None));
        assert!(matches!(
            pattern.generate(&resolver(&registry)),
            Err(ContractError::Invalid(_))
        ));
    }

    #[test]
    fn large_max_length_is_capped_but_honours_min_length() {
        let registry = Registry::new();
        let resolver = resolver(&registry);
        let pattern = Pattern::String(StringPattern::with_length(Some(MAX_STRING_LEN), Some(50_000)));
        let value = pattern.generate(&resolver).unwrap();
        assert_eq!(value.as_str().unwrap().len(), MAX_STRING_LEN);
        assert!(pattern.matches(&value, &resolver).is_success());

        let empty = Pattern::String(StringPattern::with_length(None, Some(0)));
        assert_eq!(empty.generate(&resolver).unwrap(), Value::string(""));
    }

    #[test]
    fn gen_integer_range() {
        let registry = Registry::new();
        let pattern = Pattern::Number(NumberPattern::with_range(Some(10.0), Some(20.0)));
        let resolver = resolver(&registry);
        for _ in 0..50 {
            let n = pattern.generate(&resolver).unwrap().as_f64().unwrap();
            assert!((10.0..=20.0).contains(&n));
            assert_eq!(n.fract(), 0.0);
        }
    }

    #[test]
    fn gen_integer_with_only_minimum() {
        let registry = Registry::new();
        let pattern = Pattern::Number(NumberPattern::with_range(Some(5000.0), None));
        let n = pattern.generate(&resolver(&registry)).unwrap().as_f64().unwrap();
        assert!(n >= 5000.0);
    }

    #[test]
    fn contradictory_number_range_is_invalid() {
        let registry = Registry::new();
        let pattern = Pattern::Number(NumberPattern::with_range(Some(1.2), Some(1.8)));
        assert!(matches!(
            pattern.generate(&resolver(&registry)),
            Err(ContractError::Invalid(_))
        ));
    }

    #[test]
    fn number_bounds_are_matched() {
        let registry = Registry::new();
        let pattern = Pattern::Number(NumberPattern::with_range(Some(1.0), Some(10.0)));
        let resolver = resolver(&registry);
        assert!(pattern.matches(&Value::integer(5), &resolver).is_success());
        let failure = pattern.matches(&Value::integer(11), &resolver);
        assert_eq!(
            failure.failure().unwrap().message,
            "Expected number <= 10, actual was 11 (number)"
        );
    }

    #[test]
    fn string_mismatch_uses_error_snippet() {
        let registry = Registry::new();
        let result = Pattern::String(StringPattern::default()).matches(&Value::integer(10), &resolver(&registry));
        assert_eq!(
            result.failure().unwrap().message,
            "Expected string, actual was 10 (number)"
        );
    }

    #[test]
    fn parse_scalars() {
        assert_eq!(parse_number("10").unwrap(), Value::integer(10));
        assert_eq!(parse_number("1.5").unwrap(), Value::float(1.5));
        assert!(parse_number("abc").is_err());
        assert_eq!(parse_boolean("TRUE").unwrap(), Value::Boolean(true));
        assert!(parse_boolean("yes").is_err());
        assert_eq!(parse_null("null").unwrap(), Value::Null);
    }

    #[test]
    fn number_negatives_step_outside_bounds() {
        let negatives = NumberPattern::with_range(Some(1.0), Some(10.0)).negatives();
        assert!(negatives.contains(&Pattern::exact(Value::integer(0))));
        assert!(negatives.contains(&Pattern::exact(Value::integer(11))));
        assert!(negatives.contains(&Pattern::Null));
    }

    #[test]
    fn string_negatives_step_outside_lengths() {
        let negatives = StringPattern::with_length(Some(3), Some(5)).negatives();
        assert!(negatives.contains(&Pattern::exact(Value::string("aa"))));
        assert!(negatives.contains(&Pattern::exact(Value::string("aaaaaa"))));
    }
}
