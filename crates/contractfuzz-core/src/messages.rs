//! Mismatch message strategies

use std::fmt;

use crate::result::Failure;
use crate::value::Value;

/// How "expected X, got Y" and key errors are phrased.
pub trait MismatchMessages: fmt::Debug + Send + Sync {
    fn mismatch_message(&self, expected: &str, actual: &str) -> String;

    fn unexpected_key(&self, key_label: &str, key_name: &str) -> String;

    fn expected_key_was_missing(&self, key_label: &str, key_name: &str) -> String;
}

/// Phrasing used for requests and stubs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMismatchMessages;

impl MismatchMessages for DefaultMismatchMessages {
    fn mismatch_message(&self, expected: &str, actual: &str) -> String {
        format!("Expected {expected}, actual was {actual}")
    }

    fn unexpected_key(&self, key_label: &str, key_name: &str) -> String {
        format!("{} named \"{key_name}\" was unexpected", capitalize(key_label))
    }

    fn expected_key_was_missing(&self, key_label: &str, key_name: &str) -> String {
        format!("Expected {key_label} named \"{key_name}\" was missing")
    }
}

/// Phrasing used when a response is checked against the contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseMismatchMessages;

impl MismatchMessages for ResponseMismatchMessages {
    fn mismatch_message(&self, expected: &str, actual: &str) -> String {
        format!("Contract expected {expected} but response contained {actual}")
    }

    fn unexpected_key(&self, key_label: &str, key_name: &str) -> String {
        format!("{} named \"{key_name}\" in the response was not in the contract", capitalize(key_label))
    }

    fn expected_key_was_missing(&self, key_label: &str, key_name: &str) -> String {
        format!("{} named \"{key_name}\" in the contract was not found in the response", capitalize(key_label))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Failure for a value that does not fit the expected type.
pub fn mismatch_result(expected: &str, actual: Option<&Value>, messages: &dyn MismatchMessages) -> Failure {
    let actual = actual.map_or_else(|| "nothing".to_string(), Value::error_snippet);
    Failure::new(messages.mismatch_message(expected, &actual))
}

/// Failure for two incompatible schema types.
pub fn type_mismatch_result(expected: &str, actual: &str, messages: &dyn MismatchMessages) -> Failure {
    Failure::new(messages.mismatch_message(expected, actual))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_messages() {
        let m = DefaultMismatchMessages;
        assert_eq!(
            m.mismatch_message("number", "\"abc\" (string)"),
            "Expected number, actual was \"abc\" (string)"
        );
        assert_eq!(
            m.unexpected_key("query param", "id"),
            "Query param named \"id\" was unexpected"
        );
        assert_eq!(
            m.expected_key_was_missing("query param", "id"),
            "Expected query param named \"id\" was missing"
        );
    }

    #[test]
    fn mismatch_result_uses_error_snippet() {
        let failure = mismatch_result("string", Some(&Value::integer(10)), &DefaultMismatchMessages);
        assert_eq!(failure.message, "Expected string, actual was 10 (number)");
        assert!(failure.breadcrumbs.is_empty());
    }

    #[test]
    fn response_messages_mention_contract() {
        let failure = mismatch_result("string", None, &ResponseMismatchMessages);
        assert_eq!(failure.message, "Contract expected string but response contained nothing");
    }
}
