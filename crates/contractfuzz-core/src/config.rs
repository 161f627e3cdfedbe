//! Contract-testing configuration flags
//!
//! Read once by the caller and passed into resolver construction; the pattern
//! engine never consults the environment itself.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Flags that shape how resolvers match and generate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Use schema examples as the default generated values
    pub schema_example_default: bool,

    /// Response checks prefer examples and use response-flavoured messages
    pub validate_response_values: bool,

    /// Tolerate object and query keys that the schema does not declare
    pub extensible_schema: bool,

    /// Cap on positive combinations enumerated per object (unbounded when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_test_request_combinations: Option<usize>,

    /// Seed for reproducible generation (fresh entropy when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl ContractConfig {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Example config file
    pub fn example() -> &'static str {
        r#"# contractfuzz configuration

# Prefer schema examples when generating values
schema_example_default = false

# Validate response values against examples, not just types
validate_response_values = false

# Allow keys the schema does not declare
extensible_schema = false

# Limit positive combinations per object
# max_test_request_combinations = 64

# Reproducible generation
# seed = 42
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}
