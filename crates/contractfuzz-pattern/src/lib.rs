//! contractfuzz-pattern: Schema patterns for contract tests
//!
//! A [`Pattern`] tree is built once per schema and shared read-only. Every
//! operation takes a short-lived [`Resolver`] that carries named patterns,
//! message wording, key policy, the generation mode and the cycle-prevention
//! stack of the current call.
//!
//! - `matches`: structural comparison, always returns a [`MatchResult`]
//! - `generate`: a conforming value
//! - `new_based_on` / `negative_based_on`: lazy positive and negative test patterns
//! - `encompasses`: backward compatibility between two schema versions

mod combinations;
pub mod negative;
pub mod pattern;
pub mod query;
pub mod registry;
pub mod resolver;
pub mod row;
pub mod security;

pub use negative::{AllNegativePatterns, NegativeMaps, NegativeNonStringlyPatterns, NegativePatternsTemplate};
pub use pattern::{
    AnyPattern, BooleanPattern, DeferredPattern, ExactValuePattern, ListPattern, NegativeStream, NumberPattern,
    ObjectPattern, Pattern, PatternStream, StringPattern,
};
pub use query::{HttpQueryParamPattern, QUERY_PARAMS_BREADCRUMB, QueryParams, QueryStream};
pub use registry::Registry;
pub use resolver::{GenerationMode, KeyCheck, KeyError, KeyErrorKind, Resolver};
pub use row::Row;
pub use security::SecurityScheme;

pub use contractfuzz_core::{ContractConfig, ContractError, Failure, MatchResult, ReturnValue, Value};
