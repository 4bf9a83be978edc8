//! # REGISTRY CONFIGURATION
//!
//! Loaded from JSON; every field has a default so partial documents work.

use crate::errors::{RegistryError, Result};
use serde::{Deserialize, Serialize};

/// **REGISTRY CONFIG**
///
/// **PURPOSE**: Runtime knobs for one registry scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// **EARLY REFERENCES** - Let `get` consult registered early factories to
    /// break circular references.
    pub allow_early_references: bool,

    /// **SUPPRESSED ERROR LIMIT** - Cap on errors aggregated into one failed
    /// construction.
    pub suppressed_error_limit: usize,

    /// **MAXIMUM IDENTIFIER LENGTH**
    pub max_identifier_len: usize,

    /// **ALIAS OVERRIDING** - Allow re-pointing an existing alias.
    pub allow_alias_overriding: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            allow_early_references: true,
            suppressed_error_limit: 100,
            max_identifier_len: 256,
            allow_alias_overriding: true,
        }
    }
}

impl RegistryConfig {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RegistryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no registry can operate with.
    pub fn validate(&self) -> Result<()> {
        if self.max_identifier_len == 0 {
            return Err(RegistryError::Config {
                message: "max_identifier_len must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Check that `id` is a usable identifier.
    pub fn validate_identifier(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(RegistryError::InvalidIdentifier {
                message: "identifier cannot be empty".to_string(),
            });
        }
        if id.len() > self.max_identifier_len {
            return Err(RegistryError::InvalidIdentifier {
                message: format!(
                    "identifier length {} exceeds maximum length ({})",
                    id.len(),
                    self.max_identifier_len
                ),
            });
        }
        Ok(())
    }
}
