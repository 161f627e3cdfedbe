//! Per-call matching and generation context
//!
//! A [`Resolver`] is built fresh for each top-level `matches` / `generate` /
//! `new_based_on` call. It carries the message and key policies, the generation
//! mode, the RNG, and the stack of named patterns currently being expanded.
//! Cycle-prevention state lives only on that stack: child resolvers are derived
//! for each expansion and dropped on return, so nothing leaks across calls.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::debug;

use contractfuzz_core::{
    ContractConfig, ContractError, DefaultMismatchMessages, Failure, MismatchMessages,
    ResponseMismatchMessages, Value,
};

use crate::pattern::{Pattern, is_optional, without_optionality};
use crate::registry::Registry;

/// Whether generation prefers schema examples or synthesizes fresh values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationMode {
    #[default]
    Synthesize,
    PreferExample,
}

/// Which key problems are reported when matching objects and query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCheck {
    pub report_missing: bool,
    pub report_unexpected: bool,
}

impl Default for KeyCheck {
    fn default() -> Self {
        Self {
            report_missing: true,
            report_unexpected: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyErrorKind {
    Missing,
    Unexpected,
}

/// A required key that is absent, or a present key that is not declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyError {
    pub name: String,
    pub kind: KeyErrorKind,
}

impl KeyError {
    /// `key_label` names the kind of key in messages, e.g. "key" or "query param".
    pub fn to_failure(&self, key_label: &str, messages: &dyn MismatchMessages) -> Failure {
        let message = match self.kind {
            KeyErrorKind::Missing => messages.expected_key_was_missing(key_label, &self.name),
            KeyErrorKind::Unexpected => messages.unexpected_key(key_label, &self.name),
        };
        Failure::new(message).breadcrumb(&self.name)
    }
}

/// A named pattern being expanded, and whether its context can absorb a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CycleKey {
    identity: String,
    nullable: bool,
}

#[derive(Debug, Clone)]
pub struct Resolver<'r> {
    registry: &'r Registry,
    messages: Arc<dyn MismatchMessages>,
    key_check: KeyCheck,
    mode: GenerationMode,
    max_combinations: Option<usize>,
    dictionary: Arc<IndexMap<String, Value>>,
    rng: Rc<RefCell<SmallRng>>,
    expanding: Vec<CycleKey>,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            messages: Arc::new(DefaultMismatchMessages),
            key_check: KeyCheck::default(),
            mode: GenerationMode::default(),
            max_combinations: None,
            dictionary: Arc::new(IndexMap::new()),
            rng: Rc::new(RefCell::new(SmallRng::from_entropy())),
            expanding: Vec::new(),
        }
    }

    /// Resolver for requests, stubs and test generation.
    pub fn from_config(registry: &'r Registry, config: &ContractConfig) -> Self {
        let mode = if config.schema_example_default {
            GenerationMode::PreferExample
        } else {
            GenerationMode::Synthesize
        };
        let resolver = Self::new(registry)
            .with_mode(mode)
            .with_key_check(KeyCheck {
                report_missing: true,
                report_unexpected: !config.extensible_schema,
            })
            .with_max_combinations(config.max_test_request_combinations);

        match config.seed {
            Some(seed) => resolver.with_seed(seed),
            None => resolver,
        }
    }

    /// Resolver for checking responses against the contract.
    pub fn for_response(registry: &'r Registry, config: &ContractConfig) -> Self {
        let resolver = Self::from_config(registry, config).with_messages(Arc::new(ResponseMismatchMessages));
        if config.validate_response_values {
            resolver.with_mode(GenerationMode::PreferExample)
        } else {
            resolver
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_key_check(mut self, key_check: KeyCheck) -> Self {
        self.key_check = key_check;
        self
    }

    #[must_use]
    pub fn with_messages(mut self, messages: Arc<dyn MismatchMessages>) -> Self {
        self.messages = messages;
        self
    }

    #[must_use]
    pub fn with_max_combinations(mut self, max: Option<usize>) -> Self {
        self.max_combinations = max;
        self
    }

    /// Values bound to keys; keyed unions use them in place of random generation.
    #[must_use]
    pub fn with_dictionary(mut self, dictionary: IndexMap<String, Value>) -> Self {
        self.dictionary = Arc::new(dictionary);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Rc::new(RefCell::new(SmallRng::seed_from_u64(seed)));
        self
    }

    pub fn mismatch_messages(&self) -> &dyn MismatchMessages {
        self.messages.as_ref()
    }

    pub const fn mode(&self) -> GenerationMode {
        self.mode
    }

    pub const fn max_combinations(&self) -> Option<usize> {
        self.max_combinations
    }

    /// # Errors
    ///
    /// Returns [`ContractError::UnknownType`] when the name is not registered.
    pub fn lookup(&self, name: &str) -> Result<&'r Pattern, ContractError> {
        self.registry.lookup(name)
    }

    pub(crate) fn with_rng<T>(&self, f: impl FnOnce(&mut SmallRng) -> T) -> T {
        f(&mut self.rng.borrow_mut())
    }

    /// Key problems between declared keys (optional ones end in `?`) and the keys present.
    pub fn find_key_errors<'k>(
        &self,
        declared: &[&str],
        actual: impl IntoIterator<Item = &'k str>,
    ) -> Vec<KeyError> {
        let actual: Vec<&str> = actual.into_iter().collect();
        let mut errors = Vec::new();

        if self.key_check.report_missing {
            errors.extend(
                declared
                    .iter()
                    .filter(|key| !is_optional(key) && !actual.contains(key))
                    .map(|key| KeyError {
                        name: (*key).to_string(),
                        kind: KeyErrorKind::Missing,
                    }),
            );
        }

        if self.key_check.report_unexpected {
            errors.extend(
                actual
                    .iter()
                    .filter(|key| !declared.iter().any(|d| without_optionality(d) == **key))
                    .map(|key| KeyError {
                        name: (*key).to_string(),
                        kind: KeyErrorKind::Unexpected,
                    }),
            );
        }

        errors
    }

    /// The example parsed through `pattern`, when examples are preferred.
    ///
    /// # Errors
    ///
    /// Returns an error when the example does not parse or does not match the pattern.
    pub fn resolve_example(&self, example: Option<&str>, pattern: &Pattern) -> Result<Option<Value>, ContractError> {
        let Some(example) = example else {
            return Ok(None);
        };
        if self.mode != GenerationMode::PreferExample {
            return Ok(None);
        }

        let value = pattern.parse(example, self)?;
        match pattern.matches(&value, self).failure() {
            None => Ok(Some(value)),
            Some(failure) => Err(ContractError::Failed(Failure::caused_by(
                format!("Example \"{example}\" does not match {} schema", pattern.type_name()),
                failure.clone(),
            ))),
        }
    }

    /// Like [`Self::resolve_example`], accepting the first alternative the example fits.
    ///
    /// # Errors
    ///
    /// Returns an error when the example fits none of the alternatives.
    pub fn resolve_example_any(
        &self,
        example: Option<&str>,
        alternatives: &[Pattern],
    ) -> Result<Option<Value>, ContractError> {
        let Some(example) = example else {
            return Ok(None);
        };
        if self.mode != GenerationMode::PreferExample {
            return Ok(None);
        }

        let mut failures = Vec::new();
        for alternative in alternatives {
            match self.resolve_example(Some(example), alternative) {
                Ok(value) => return Ok(value),
                Err(err) => failures.push(err.failure()),
            }
        }
        Err(ContractError::aggregate(
            format!("Example \"{example}\" does not match any of the schema alternatives"),
            failures,
        ))
    }

    /// A dictionary value bound to `key` when it fits, otherwise a generated one.
    ///
    /// # Errors
    ///
    /// Propagates generation errors.
    pub fn generate_keyed(&self, key: Option<&str>, pattern: &Pattern) -> Result<Value, ContractError> {
        if let Some(value) = key.and_then(|k| self.dictionary.get(k))
            && pattern.matches(value, self).is_success()
        {
            return Ok(value.clone());
        }
        pattern.generate(self)
    }

    /// Run `f` with `pattern` registered as being expanded.
    ///
    /// Re-entering a pattern already on the stack yields `Ok(None)` in a nullable
    /// context and a cycle error otherwise. A cycle error raised deeper down is
    /// absorbed the same way by the nearest nullable context.
    ///
    /// # Errors
    ///
    /// Returns errors from `f`, and cycle errors in non-nullable contexts.
    pub fn with_cycle_prevention<T>(
        &self,
        pattern: &Pattern,
        nullable: bool,
        f: impl FnOnce(&Resolver<'r>) -> Result<T, ContractError>,
    ) -> Result<Option<T>, ContractError> {
        let Some(child) = self.cycle_guard(pattern, nullable)? else {
            return Ok(None);
        };
        match f(&child) {
            Err(err) if nullable && err.is_cycle() => {
                debug!(pattern = %pattern.type_name(), "cycle absorbed by nullable context");
                Ok(None)
            }
            other => other.map(Some),
        }
    }

    /// Child resolver with `pattern` pushed, for expansions that outlive this call (lazy sequences).
    ///
    /// # Errors
    ///
    /// Returns a cycle error when the pattern is already being expanded in a non-nullable context.
    pub fn cycle_guard(&self, pattern: &Pattern, nullable: bool) -> Result<Option<Resolver<'r>>, ContractError> {
        let Some(identity) = pattern.cycle_identity() else {
            return Ok(Some(self.clone()));
        };
        let key = CycleKey { identity, nullable };

        if self.expanding.contains(&key) {
            debug!(
                identity = %key.identity,
                nullable,
                depth = self.expanding.len(),
                "cycle prevented"
            );
            if nullable {
                return Ok(None);
            }
            let mut stack: Vec<String> = self.expanding.iter().map(|k| k.identity.clone()).collect();
            stack.push(key.identity);
            return Err(ContractError::Cycle { stack });
        }

        let mut child = self.clone();
        child.expanding.push(key);
        Ok(Some(child))
    }
}
