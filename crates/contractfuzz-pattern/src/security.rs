//! Request credentials declared by a contract's security schemes

use indexmap::IndexMap;

use contractfuzz_core::{ContractError, Failure, MatchResult};

use crate::pattern::{Pattern, StringPattern};
use crate::query::QueryParams;
use crate::resolver::Resolver;
use crate::row::Row;

pub const AUTHORIZATION: &str = "Authorization";

/// How a request proves its identity. Configured values are used as-is;
/// missing ones are generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityScheme {
    Bearer { token: Option<String> },
    ApiKeyInHeader { name: String, value: Option<String> },
    ApiKeyInQuery { name: String, value: Option<String> },
}

impl SecurityScheme {
    /// Whether the credential is present in the request.
    pub fn matches(&self, headers: &IndexMap<String, String>, query: &QueryParams) -> MatchResult {
        match self {
            Self::Bearer { .. } => match header(headers, AUTHORIZATION) {
                None => Failure::new(format!("{AUTHORIZATION} header is missing in request")).into(),
                Some(value) if !value.to_lowercase().starts_with("bearer") => {
                    Failure::new(format!("{AUTHORIZATION} header must be prefixed with \"Bearer\"")).into()
                }
                Some(_) => MatchResult::success(),
            },
            Self::ApiKeyInHeader { name, .. } => match header(headers, name) {
                None => Failure::new(format!("API-Key named {name} was not present in the request headers")).into(),
                Some(_) => MatchResult::success(),
            },
            Self::ApiKeyInQuery { name, .. } => {
                if query.iter().any(|(k, _)| k == name) {
                    MatchResult::success()
                } else {
                    Failure::new(format!("API-Key named {name} was not present in the query string")).into()
                }
            }
        }
    }

    /// Add the credential header. Query schemes leave the headers alone.
    ///
    /// # Errors
    ///
    /// Propagates token generation errors.
    pub fn add_to_headers(
        &self,
        headers: &mut IndexMap<String, String>,
        resolver: &Resolver<'_>,
    ) -> Result<(), ContractError> {
        match self {
            Self::Bearer { token } => {
                let token = configured_or_generated(token.as_deref(), resolver)?;
                headers.insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
            }
            Self::ApiKeyInHeader { name, value } => {
                headers.insert(name.clone(), configured_or_generated(value.as_deref(), resolver)?);
            }
            Self::ApiKeyInQuery { .. } => {}
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates key generation errors.
    pub fn add_to_query(&self, query: &mut Vec<(String, String)>, resolver: &Resolver<'_>) -> Result<(), ContractError> {
        if let Self::ApiKeyInQuery { name, value } = self {
            query.retain(|(k, _)| k != name);
            query.push((name.clone(), configured_or_generated(value.as_deref(), resolver)?));
        }
        Ok(())
    }

    /// Strip the credential so the remaining request can be matched against the contract.
    pub fn remove_from(&self, headers: &mut IndexMap<String, String>, query: &mut Vec<(String, String)>) {
        match self {
            Self::Bearer { .. } => headers.retain(|k, _| !k.eq_ignore_ascii_case(AUTHORIZATION)),
            Self::ApiKeyInHeader { name, .. } => headers.retain(|k, _| !k.eq_ignore_ascii_case(name)),
            Self::ApiKeyInQuery { name, .. } => query.retain(|(k, _)| k != name),
        }
    }

    /// Whether an example row already supplies the credential.
    pub fn is_in_row(&self, row: &Row) -> bool {
        row.contains_field(self.parameter_name())
    }

    /// Name of the query parameter this scheme adds, for query template building.
    pub fn query_param(&self) -> Option<&str> {
        match self {
            Self::ApiKeyInQuery { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    fn parameter_name(&self) -> &str {
        match self {
            Self::Bearer { .. } => AUTHORIZATION,
            Self::ApiKeyInHeader { name, .. } | Self::ApiKeyInQuery { name, .. } => name,
        }
    }
}

/// Header names compare case-insensitively.
fn header<'h>(headers: &'h IndexMap<String, String>, name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn configured_or_generated(configured: Option<&str>, resolver: &Resolver<'_>) -> Result<String, ContractError> {
    match configured {
        Some(value) => Ok(value.to_string()),
        None => Ok(Pattern::String(StringPattern::default())
            .generate(resolver)?
            .to_string_literal()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn bearer_header_is_required() {
        let scheme = SecurityScheme::Bearer { token: None };
        let missing = scheme.matches(&IndexMap::new(), &[]);
        assert_eq!(missing.failure().unwrap().message, "Authorization header is missing in request");

        let basic = IndexMap::from([("authorization".to_string(), "Basic abc".to_string())]);
        assert_eq!(
            scheme.matches(&basic, &[]).failure().unwrap().message,
            "Authorization header must be prefixed with \"Bearer\""
        );

        let bearer = IndexMap::from([("AUTHORIZATION".to_string(), "bearer abc".to_string())]);
        assert!(scheme.matches(&bearer, &[]).is_success());
    }

    #[test]
    fn configured_token_is_used() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let mut headers = IndexMap::new();
        SecurityScheme::Bearer {
            token: Some("abc123".into()),
        }
        .add_to_headers(&mut headers, &resolver)
        .unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer abc123");
    }

    #[test]
    fn missing_token_is_generated() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry).with_seed(5);
        let scheme = SecurityScheme::Bearer { token: None };
        let mut headers = IndexMap::new();
        scheme.add_to_headers(&mut headers, &resolver).unwrap();
        assert!(headers[AUTHORIZATION].len() > "Bearer ".len());
        assert!(scheme.matches(&headers, &[]).is_success());
    }

    #[test]
    fn query_keys_round_trip() {
        let registry = Registry::new();
        let resolver = Resolver::new(&registry);
        let scheme = SecurityScheme::ApiKeyInQuery {
            name: "api_key".into(),
            value: Some("k".into()),
        };
        let mut query = vec![("page".to_string(), "1".to_string())];
        scheme.add_to_query(&mut query, &resolver).unwrap();
        assert!(scheme.matches(&IndexMap::new(), &query).is_success());

        let mut headers = IndexMap::new();
        scheme.remove_from(&mut headers, &mut query);
        assert_eq!(query, vec![("page".to_string(), "1".to_string())]);
        assert_eq!(scheme.query_param(), Some("api_key"));
    }

    #[test]
    fn rows_can_supply_credentials() {
        let scheme = SecurityScheme::ApiKeyInHeader {
            name: "X-API-Key".into(),
            value: None,
        };
        assert!(scheme.is_in_row(&Row::new().with_field("X-API-Key", "abc")));
        assert!(!scheme.is_in_row(&Row::new()));
    }
}
