//! Query parameters: grouped, possibly repeated keys

use std::fmt;

use indexmap::IndexMap;

use contractfuzz_core::{ContractError, Failure, MatchResult, Value};

use crate::combinations::key_combinations;
use crate::negative::{NegativeMaps, NegativeNonStringlyPatterns, NegativePatternsTemplate};
use crate::pattern::{
    Pattern, StringPattern, fields_new_based_on, is_pattern_token, resolved_hop, without_optionality,
};
use crate::resolver::Resolver;
use crate::row::Row;

pub const QUERY_PARAMS_BREADCRUMB: &str = "QUERY-PARAMS";

/// Raw request parameters in arrival order; a key may repeat.
pub type QueryParams = [(String, String)];

/// Positive or negative parameter maps derived from a query pattern.
pub type QueryStream<'a> = Box<dyn Iterator<Item = Result<IndexMap<String, Pattern>, ContractError>> + 'a>;

/// Declared query parameters. A name may be declared more than once with
/// different patterns; a trailing `?` marks the parameter optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpQueryParamPattern {
    pub pairs: Vec<(String, Pattern)>,
}

impl HttpQueryParamPattern {
    pub fn new<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Pattern)>) -> Self {
        Self {
            pairs: pairs.into_iter().map(|(k, p)| (k.into(), p)).collect(),
        }
    }

    /// Build from a URL query template such as `id=(number)&sort=asc`.
    ///
    /// Every templated parameter is optional: tokens become references, other
    /// values exact strings. API-key parameters are added as optional strings.
    pub fn from_query_template(query: &str, api_key_params: &[&str]) -> Self {
        let mut params: IndexMap<String, Pattern> = api_key_params
            .iter()
            .map(|name| (format!("{name}?"), Pattern::String(StringPattern::default())))
            .collect();

        for (name, value) in query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        {
            let pattern = if is_pattern_token(value) {
                Pattern::deferred(value)
            } else {
                Pattern::exact(Value::string(value))
            };
            params.insert(format!("{name}?"), pattern);
        }

        Self::new(params)
    }

    /// One pattern per name; a later declaration replaces an earlier one.
    fn declared(&self) -> Vec<(&str, &Pattern)> {
        let unique: IndexMap<&str, &Pattern> = self.pairs.iter().map(|(k, p)| (k.as_str(), p)).collect();
        unique.into_iter().collect()
    }

    /// One pair per parameter; array values repeat the key once per element.
    ///
    /// # Errors
    ///
    /// Returns the generation error of the first parameter that cannot be generated,
    /// rooted at `QUERY-PARAMS.<name>`.
    pub fn generate(&self, resolver: &Resolver<'_>) -> Result<Vec<(String, String)>, ContractError> {
        let mut generated = Vec::new();
        for (key, pattern) in self.declared() {
            let name = without_optionality(key);
            let value = resolver
                .with_cycle_prevention(pattern, false, |r| r.generate_keyed(Some(name), pattern))
                .map_err(|err| err.breadcrumb(name).breadcrumb(QUERY_PARAMS_BREADCRUMB))?;

            match value {
                Some(Value::Array(items)) => {
                    generated.extend(items.iter().map(|item| (name.to_string(), item.to_string_literal())));
                }
                Some(value) => generated.push((name.to_string(), value.to_string_literal())),
                None => {}
            }
        }
        Ok(generated)
    }

    pub fn matches(&self, query: &QueryParams, resolver: &Resolver<'_>) -> MatchResult {
        let declared: Vec<&str> = self.declared().into_iter().map(|(key, _)| key).collect();
        let mut actual: Vec<&str> = Vec::new();
        for (name, _) in query {
            if !actual.contains(&name.as_str()) {
                actual.push(name.as_str());
            }
        }

        let messages = resolver.mismatch_messages();
        let key_errors = resolver
            .find_key_errors(&declared, actual)
            .into_iter()
            .map(|error| MatchResult::from(error.to_failure("query param", messages)));

        let mut groups: IndexMap<&str, Vec<&Pattern>> = IndexMap::new();
        for (key, pattern) in &self.pairs {
            groups.entry(key.as_str()).or_default().push(pattern);
        }

        let group_results = groups.into_iter().map(|(key, patterns)| {
            let name = without_optionality(key);
            let values: Vec<&str> = query
                .iter()
                .filter(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
                .collect();

            let result = match patterns.first() {
                Some(first) if matches!(resolved_hop(first, resolver), Pattern::Array(_)) => {
                    match_as_array(first, &values, resolver)
                }
                _ => match_repeated(&patterns, &values, resolver),
            };
            result.breadcrumb(name)
        });

        let results: Vec<MatchResult> = key_errors.chain(group_results).collect();
        MatchResult::from_results(results).breadcrumb(QUERY_PARAMS_BREADCRUMB)
    }

    /// Parameter maps for positive tests, one per present/omitted combination of optional parameters.
    pub fn new_based_on<'a>(&'a self, row: &'a Row, resolver: &Resolver<'a>) -> QueryStream<'a> {
        let entries = row.without_omitted_keys(&self.declared());
        let keys: Vec<&'a str> = entries.iter().map(|(key, _)| *key).collect();
        let resolver = resolver.clone();

        Box::new(key_combinations(&keys, row).flat_map(move |combination| {
            let fields = entries
                .iter()
                .filter(|(key, _)| combination.contains(key))
                .copied()
                .collect();
            fields_new_based_on(fields, row, &resolver)
                .map(|candidate| candidate.map_err(|err| err.breadcrumb(QUERY_PARAMS_BREADCRUMB)))
        }))
    }

    /// Parameter maps with one parameter negated, for every combination of optional parameters.
    pub fn negative_based_on<'a>(&'a self, row: &'a Row, resolver: &Resolver<'a>) -> NegativeMaps<'a> {
        let entries = row.without_omitted_keys(&self.declared());
        let keys: Vec<&'a str> = entries.iter().map(|(key, _)| *key).collect();
        let resolver = resolver.clone();

        Box::new(key_combinations(&keys, row).flat_map(move |combination| {
            let fields = entries
                .iter()
                .filter(|(key, _)| combination.contains(key))
                .copied()
                .collect();
            NegativeNonStringlyPatterns
                .negative_based_on(fields, row, &resolver)
                .map(|candidate| candidate.breadcrumb(Some(QUERY_PARAMS_BREADCRUMB)))
        }))
    }
}

/// Every raw value of the key, parsed as an item, matched as one array.
fn match_as_array(pattern: &Pattern, values: &[&str], resolver: &Resolver<'_>) -> MatchResult {
    let items = match resolved_hop(pattern, resolver) {
        Pattern::Array(list) => values
            .iter()
            .map(|raw| list.item.parse(raw, resolver).unwrap_or_else(|_| Value::string(*raw)))
            .collect(),
        _ => values.iter().map(|raw| Value::string(*raw)).collect(),
    };
    pattern.matches(&Value::Array(items), resolver)
}

/// Match raw values against every declaration of a repeated key, last declaration first.
///
/// A declaration that no remaining value satisfies fails on its own. Values that
/// satisfy a declaration are settled; the rest carry their failures forward, and
/// whatever is never settled reports its full history.
fn match_repeated(patterns: &[&Pattern], values: &[&str], resolver: &Resolver<'_>) -> MatchResult {
    let mut outcomes = Vec::with_capacity(patterns.len());
    let mut unmatched: Vec<(&str, Vec<Failure>)> = values.iter().map(|value| (*value, Vec::new())).collect();

    for pattern in patterns.iter().rev() {
        let attempts: Vec<MatchResult> = unmatched
            .iter()
            .map(|(raw, _)| {
                let parsed = pattern.parse(raw, resolver).unwrap_or_else(|_| Value::string(*raw));
                pattern.matches(&parsed, resolver)
            })
            .collect();

        if !attempts.iter().any(MatchResult::is_success) {
            outcomes.push(MatchResult::from_results(attempts));
            continue;
        }

        outcomes.push(MatchResult::success());
        unmatched = unmatched
            .into_iter()
            .zip(attempts)
            .filter_map(|((raw, mut history), attempt)| match attempt {
                MatchResult::Success(_) => None,
                MatchResult::Failure(failure) => {
                    history.push(failure);
                    Some((raw, history))
                }
            })
            .collect();
    }

    let leftovers = unmatched
        .into_iter()
        .flat_map(|(_, history)| history)
        .map(MatchResult::from);
    MatchResult::from_results([MatchResult::from_results(outcomes)].into_iter().chain(leftovers))
}

/// `?id=(number)&sort=asc`, or nothing when no parameter is declared.
impl fmt::Display for HttpQueryParamPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let declared = self.declared();
        if declared.is_empty() {
            return Ok(());
        }
        let rendered: Vec<String> = declared
            .into_iter()
            .map(|(key, pattern)| format!("{}={pattern}", without_optionality(key)))
            .collect();
        write!(f, "?{}", rendered.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{ListPattern, NumberPattern};
    use crate::registry::Registry;

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn ids() -> HttpQueryParamPattern {
        HttpQueryParamPattern::new([(
            "ids?",
            Pattern::Array(ListPattern::new(Pattern::Number(NumberPattern::default()))),
        )])
    }

    #[test]
    fn repeated_keys_match_an_array_parameter() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        assert!(ids().matches(&query(&[("ids", "1"), ("ids", "2")]), &resolver).is_success());

        let result = ids().matches(&query(&[("ids", "abc")]), &resolver);
        let paths = result.failure().unwrap().paths();
        assert_eq!(paths, vec!["QUERY-PARAMS.ids[0]"]);
    }

    #[test]
    fn missing_required_parameter_is_named() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = HttpQueryParamPattern::new([("status", Pattern::String(StringPattern::default()))]);
        let result = pattern.matches(&[], &resolver);
        let failure = result.failure().unwrap();
        assert_eq!(failure.paths(), vec!["QUERY-PARAMS.status"]);
        assert_eq!(
            failure.entries()[0].1,
            vec!["Expected query param named \"status\" was missing".to_string()]
        );
    }

    #[test]
    fn undeclared_parameter_is_unexpected() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let result = ids().matches(&query(&[("ids", "1"), ("page", "2")]), &resolver);
        assert_eq!(result.failure().unwrap().paths(), vec!["QUERY-PARAMS.page"]);
    }

    #[test]
    fn repeated_declarations_each_need_a_value() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = HttpQueryParamPattern::new([
            ("tag", Pattern::Number(NumberPattern::default())),
            ("tag", Pattern::exact(Value::from("new"))),
        ]);

        assert!(pattern.matches(&query(&[("tag", "10"), ("tag", "new")]), &resolver).is_success());

        let result = pattern.matches(&query(&[("tag", "10")]), &resolver);
        assert_eq!(result.failure().unwrap().paths(), vec!["QUERY-PARAMS.tag"]);

        let result = pattern.matches(&query(&[("tag", "10"), ("tag", "new"), ("tag", "old")]), &resolver);
        let failure = result.failure().unwrap();
        assert_eq!(failure.paths(), vec!["QUERY-PARAMS.tag", "QUERY-PARAMS.tag"]);
    }

    #[test]
    fn generated_pairs_repeat_array_elements() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry).with_seed(11);
        let pairs = ids().generate(&resolver).unwrap();
        assert!(!pairs.is_empty());
        assert!(pairs.iter().all(|(k, v)| k == "ids" && v.parse::<f64>().is_ok()));
        assert!(ids().matches(&pairs, &resolver).is_success());
    }

    #[test]
    fn template_parameters_are_optional() {
        let pattern = HttpQueryParamPattern::from_query_template("?id=(number)&sort=asc", &["api_key"]);
        assert_eq!(pattern.to_string(), "?api_key=(string)&id=(number)&sort=asc");

        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        assert!(pattern.matches(&query(&[("id", "5")]), &resolver).is_success());
        assert!(!pattern.matches(&query(&[("sort", "desc")]), &resolver).is_success());
    }

    #[test]
    fn combinations_toggle_optional_parameters() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = HttpQueryParamPattern::new([
            ("id", Pattern::Number(NumberPattern::default())),
            ("verbose?", Pattern::Boolean(Default::default())),
        ]);
        let row = Row::new();
        let keys: Vec<Vec<String>> = pattern
            .new_based_on(&row, &resolver)
            .map(|params| params.unwrap().keys().cloned().collect())
            .collect();
        assert_eq!(keys, vec![vec!["id".to_string(), "verbose".to_string()], vec!["id".to_string()]]);
    }

    #[test]
    fn negatives_skip_string_parameters() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let pattern = HttpQueryParamPattern::new([
            ("id", Pattern::Number(NumberPattern::default())),
            ("name", Pattern::String(StringPattern::default())),
        ]);
        let row = Row::new();
        let negatives: Vec<IndexMap<String, Pattern>> = pattern
            .negative_based_on(&row, &resolver)
            .map(|params| params.into_value().unwrap())
            .collect();

        assert!(!negatives.is_empty());
        for params in &negatives {
            assert_eq!(params["name"], Pattern::String(StringPattern::default()));
            assert_ne!(params["id"], Pattern::Number(NumberPattern::default()));
            assert_ne!(params["id"], Pattern::Null);
        }
    }
}
