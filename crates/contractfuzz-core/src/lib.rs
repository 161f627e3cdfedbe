//! contractfuzz-core: Values, match results and failure aggregation for contract testing
//!
//! This crate provides the data that flows through the pattern engine: parsed
//! values, structural match results with breadcrumb paths, the value/failure/exception
//! aggregation type used by generation pipelines, and the configuration flags
//! that shape resolvers.

pub mod config;
pub mod error;
pub mod messages;
pub mod report;
pub mod result;
pub mod return_value;
pub mod value;

pub use config::{ConfigError, ContractConfig};
pub use error::ContractError;
pub use messages::{
    DefaultMismatchMessages, MismatchMessages, ResponseMismatchMessages, mismatch_result,
    type_mismatch_result,
};
pub use report::{FailureReport, ReportEntry, generate_report_schema};
pub use result::{Failure, MatchResult, render_breadcrumbs};
pub use return_value::{RawError, ReturnValue, ValueDetails, list_fold, map_fold};
pub use value::Value;
