//! Value / failure / exception aggregation for generation pipelines
//!
//! Generation enumerates many candidates; one broken candidate must not abort
//! the rest. Each candidate is wrapped in a [`ReturnValue`] and failures are
//! carried along with their breadcrumbs until the consumer decides what to do.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::ContractError;
use crate::result::Failure;

/// An unexpected error captured at a generation boundary.
pub type RawError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Diagnostics accumulated on a successfully produced value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueDetails {
    pub messages: Vec<String>,
    pub breadcrumbs: Vec<String>,
}

#[derive(Clone)]
pub enum ReturnValue<T> {
    HasValue { value: T, details: Vec<ValueDetails> },
    HasFailure(Failure),
    HasException {
        error: RawError,
        message: String,
        breadcrumb: String,
    },
}

impl<T: fmt::Debug> fmt::Debug for ReturnValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HasValue { value, details } => f
                .debug_struct("HasValue")
                .field("value", value)
                .field("details", details)
                .finish(),
            Self::HasFailure(failure) => f.debug_tuple("HasFailure").field(failure).finish(),
            Self::HasException {
                error,
                message,
                breadcrumb,
            } => f
                .debug_struct("HasException")
                .field("error", &error.to_string())
                .field("message", message)
                .field("breadcrumb", breadcrumb)
                .finish(),
        }
    }
}

impl<T> ReturnValue<T> {
    pub const fn value(value: T) -> Self {
        Self::HasValue {
            value,
            details: Vec::new(),
        }
    }

    pub fn exception(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::HasException {
            error: Arc::new(error),
            message: String::new(),
            breadcrumb: String::new(),
        }
    }

    /// Contract errors become failures; they are expected outcomes of schema problems.
    pub fn from_result(result: Result<T, ContractError>) -> Self {
        match result {
            Ok(value) => Self::value(value),
            Err(err) => Self::HasFailure(err.failure()),
        }
    }

    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::HasValue { .. })
    }

    pub const fn as_value(&self) -> Option<&T> {
        match self {
            Self::HasValue { value, .. } => Some(value),
            _ => None,
        }
    }

    /// # Errors
    ///
    /// Returns the failure (or the exception as a failure) when there is no value.
    pub fn into_value(self) -> Result<T, ContractError> {
        match self {
            Self::HasValue { value, .. } => Ok(value),
            other => Err(ContractError::Failed(
                other.to_failure().unwrap_or_default(),
            )),
        }
    }

    pub fn with_default<U>(&self, default: U, f: impl FnOnce(&T) -> U) -> U {
        match self {
            Self::HasValue { value, .. } => f(value),
            _ => default,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ReturnValue<U> {
        match self {
            Self::HasValue { value, details } => ReturnValue::HasValue {
                value: f(value),
                details,
            },
            Self::HasFailure(failure) => ReturnValue::HasFailure(failure),
            Self::HasException {
                error,
                message,
                breadcrumb,
            } => ReturnValue::HasException {
                error,
                message,
                breadcrumb,
            },
        }
    }

    /// Combine two values. The first exception wins; failures on both sides are merged.
    pub fn combine_with<U>(self, other: ReturnValue<U>, f: impl FnOnce(T, U) -> T) -> Self {
        match (self, other) {
            (
                Self::HasValue { value, mut details },
                ReturnValue::HasValue {
                    value: other_value,
                    details: other_details,
                },
            ) => {
                details.extend(other_details);
                Self::HasValue {
                    value: f(value, other_value),
                    details,
                }
            }
            (exception @ Self::HasException { .. }, _) => exception,
            (
                _,
                ReturnValue::HasException {
                    error,
                    message,
                    breadcrumb,
                },
            ) => Self::HasException {
                error,
                message,
                breadcrumb,
            },
            (Self::HasFailure(a), ReturnValue::HasFailure(b)) => {
                Self::HasFailure(Failure::from_failures(vec![a, b]))
            }
            (failure @ Self::HasFailure(_), ReturnValue::HasValue { .. }) => failure,
            (Self::HasValue { .. }, ReturnValue::HasFailure(failure)) => Self::HasFailure(failure),
        }
    }

    /// Three-way case analysis used at generation boundaries.
    pub fn realise<U>(
        self,
        has_value: impl FnOnce(T, Option<String>) -> U,
        or_failure: impl FnOnce(Failure) -> U,
        or_exception: impl FnOnce(RawError, String, String) -> U,
    ) -> U {
        match self {
            Self::HasValue { value, details } => {
                let messages: Vec<String> = details
                    .into_iter()
                    .flat_map(|d| d.messages)
                    .filter(|m| !m.is_empty())
                    .collect();
                let message = (!messages.is_empty()).then(|| messages.join("\n"));
                has_value(value, message)
            }
            Self::HasFailure(failure) => or_failure(failure),
            Self::HasException {
                error,
                message,
                breadcrumb,
            } => or_exception(error, message, breadcrumb),
        }
    }

    #[must_use]
    pub fn add_details(self, message: &str, breadcrumb: &str) -> Self {
        match self {
            Self::HasValue { value, mut details } => {
                details.push(ValueDetails {
                    messages: vec![message.to_string()],
                    breadcrumbs: vec![breadcrumb.to_string()],
                });
                Self::HasValue { value, details }
            }
            Self::HasFailure(failure) => {
                let failure = if message.is_empty() {
                    failure
                } else {
                    Failure::caused_by(message, failure)
                };
                Self::HasFailure(failure.breadcrumb(breadcrumb))
            }
            Self::HasException {
                error,
                message: existing_message,
                breadcrumb: existing_breadcrumb,
            } => Self::HasException {
                error,
                message: join_non_empty(message, &existing_message, ": "),
                breadcrumb: join_non_empty(breadcrumb, &existing_breadcrumb, "."),
            },
        }
    }

    #[must_use]
    pub fn breadcrumb(self, breadcrumb: Option<&str>) -> Self {
        match breadcrumb {
            None => self,
            Some(b) => self.add_details("", b),
        }
    }

    /// Failure or exception as a failure; `None` for values.
    pub fn to_failure(&self) -> Option<Failure> {
        match self {
            Self::HasValue { .. } => None,
            Self::HasFailure(failure) => Some(failure.clone()),
            Self::HasException {
                error,
                message,
                breadcrumb,
            } => {
                let text = join_non_empty(message, &error.to_string(), ": ");
                let mut failure = Failure::new(text);
                failure.breadcrumbs = breadcrumb
                    .split('.')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                Some(failure)
            }
        }
    }
}

fn join_non_empty(outer: &str, inner: &str, separator: &str) -> String {
    match (outer.is_empty(), inner.is_empty()) {
        (true, _) => inner.to_string(),
        (false, true) => outer.to_string(),
        (false, false) => format!("{outer}{separator}{inner}"),
    }
}

/// Fold a mapping of return values into a return value of a mapping.
pub fn map_fold<K: Hash + Eq, V>(entries: IndexMap<K, ReturnValue<V>>) -> ReturnValue<IndexMap<K, V>> {
    entries
        .into_iter()
        .fold(ReturnValue::value(IndexMap::new()), |acc, (key, value)| {
            acc.combine_with(value, |mut map, v| {
                map.insert(key, v);
                map
            })
        })
}

/// Fold a list of return values into a return value of a list.
pub fn list_fold<T>(items: Vec<ReturnValue<T>>) -> ReturnValue<Vec<T>> {
    items
        .into_iter()
        .fold(ReturnValue::value(Vec::new()), |acc, item| {
            acc.combine_with(item, |mut list, v| {
                list.push(v);
                list
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct Boom;

    #[test]
    fn map_transforms_only_values() {
        let value = ReturnValue::value(2).map(|v| v * 10);
        assert_eq!(value.as_value(), Some(&20));

        let failure: ReturnValue<i32> = ReturnValue::HasFailure(Failure::new("bad"));
        assert!(failure.map(|v| v * 10).as_value().is_none());
    }

    #[test]
    fn combine_merges_failures_from_both_sides() {
        let a: ReturnValue<i32> = ReturnValue::HasFailure(Failure::new("a"));
        let b: ReturnValue<i32> = ReturnValue::HasFailure(Failure::new("b"));
        let combined = a.combine_with(b, |x, y| x + y);
        let failure = combined.to_failure().unwrap();
        assert_eq!(failure.causes.len(), 2);
    }

    #[test]
    fn combine_prefers_exceptions() {
        let a: ReturnValue<i32> = ReturnValue::HasFailure(Failure::new("a"));
        let b: ReturnValue<i32> = ReturnValue::exception(Boom);
        assert!(matches!(
            a.combine_with(b, |x, y| x + y),
            ReturnValue::HasException { .. }
        ));
    }

    #[test]
    fn map_fold_collects_values_in_order() {
        let entries = IndexMap::from([
            ("b", ReturnValue::value(2)),
            ("a", ReturnValue::value(1)),
        ]);
        let folded = map_fold(entries).into_value().unwrap();
        assert_eq!(folded.keys().copied().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn map_fold_short_circuits_but_keeps_failure_paths() {
        let entries = IndexMap::from([
            ("a", ReturnValue::value(1)),
            ("b", ReturnValue::HasFailure(Failure::new("bad b")).breadcrumb(Some("b"))),
            ("c", ReturnValue::HasFailure(Failure::new("bad c")).breadcrumb(Some("c"))),
        ]);
        let failure = map_fold(entries).to_failure().unwrap();
        assert_eq!(failure.paths(), vec!["b", "c"]);
    }

    #[test]
    fn list_fold_keeps_details() {
        let items = vec![
            ReturnValue::value(1).add_details("first", "x"),
            ReturnValue::value(2),
        ];
        let folded = list_fold(items);
        let ReturnValue::HasValue { value, details } = folded else {
            panic!("expected value");
        };
        assert_eq!(value, vec![1, 2]);
        assert_eq!(details[0].breadcrumbs, vec!["x"]);
    }

    #[test]
    fn realise_dispatches_on_case() {
        let describe = |rv: ReturnValue<i32>| {
            rv.realise(
                |v, _| format!("value {v}"),
                |f| format!("failure {}", f.message),
                |e, _, _| format!("exception {e}"),
            )
        };
        assert_eq!(describe(ReturnValue::value(1)), "value 1");
        assert_eq!(
            describe(ReturnValue::HasFailure(Failure::new("bad"))),
            "failure bad"
        );
        assert_eq!(describe(ReturnValue::exception(Boom)), "exception disk on fire");
    }

    #[test]
    fn exception_details_accumulate_outside_in() {
        let rv: ReturnValue<i32> = ReturnValue::exception(Boom)
            .add_details("while negating", "name")
            .add_details("", "BODY");
        let failure = rv.to_failure().unwrap();
        assert_eq!(failure.message, "while negating: disk on fire");
        assert_eq!(failure.breadcrumbs, vec!["BODY", "name"]);
    }

    proptest::proptest! {
        #[test]
        fn list_fold_reports_every_failed_item(items in proptest::collection::vec(proptest::option::of(0i32..100), 0..12)) {
            let folded = list_fold(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| match item {
                        Some(v) => ReturnValue::value(*v),
                        None => ReturnValue::HasFailure(Failure::new("missing")).breadcrumb(Some(&format!("[{i}]"))),
                    })
                    .collect(),
            );

            let failed: Vec<String> = items
                .iter()
                .enumerate()
                .filter(|(_, item)| item.is_none())
                .map(|(i, _)| format!("[{i}]"))
                .collect();
            match folded.to_failure() {
                Some(failure) => proptest::prop_assert_eq!(failure.paths(), failed),
                None => {
                    proptest::prop_assert!(failed.is_empty());
                    let expected: Vec<i32> = items.iter().flatten().copied().collect();
                    proptest::prop_assert_eq!(folded.into_value().unwrap(), expected);
                }
            }
        }
    }

    #[test]
    fn contract_errors_become_failures() {
        let rv: ReturnValue<i32> = ReturnValue::from_result(Err(ContractError::Invalid("empty".into())));
        assert_eq!(rv.to_failure().unwrap().message, "empty");
    }
}
