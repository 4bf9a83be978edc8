//! # REGISTRY ERRORS
//!
//! **CRITICAL**: Every failure the registry can surface, each paired with a stable
//! machine-readable code.

use thiserror::Error;

/// Boxed error returned by user-supplied callbacks, hooks and production steps.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Registry result alias.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// **REGISTRY ERROR CODES**
///
/// **MANDATE**: Use these standardized codes for consistent error reporting.
pub mod error_codes {
    /// Code for [`RegistryError::DuplicateRegistration`].
    pub const DUPLICATE_REGISTRATION: &str = "REGISTRY_DUPLICATE_REGISTRATION";
    /// Code for [`RegistryError::CurrentlyInCreation`].
    pub const CURRENTLY_IN_CREATION: &str = "REGISTRY_CURRENTLY_IN_CREATION";
    /// Code for [`RegistryError::CreationNotAllowed`].
    pub const CREATION_NOT_ALLOWED: &str = "REGISTRY_CREATION_NOT_ALLOWED";
    /// Code for [`RegistryError::ConstructionFailed`].
    pub const CONSTRUCTION_FAILED: &str = "REGISTRY_CONSTRUCTION_FAILED";
    /// Code for [`RegistryError::ProductionDuringCreationReturnedNull`].
    pub const PRODUCTION_RETURNED_NULL: &str = "REGISTRY_PRODUCTION_DURING_CREATION_RETURNED_NULL";
    /// Code for [`RegistryError::PostProcessingFailed`].
    pub const POST_PROCESSING_FAILED: &str = "REGISTRY_POST_PROCESSING_FAILED";
    /// Code for [`RegistryError::CircularDependsOn`].
    pub const CIRCULAR_DEPENDS_ON: &str = "REGISTRY_CIRCULAR_DEPENDS_ON";
    /// Code for [`RegistryError::AliasConflict`].
    pub const ALIAS_CONFLICT: &str = "REGISTRY_ALIAS_CONFLICT";
    /// Code for [`RegistryError::CircularAlias`].
    pub const CIRCULAR_ALIAS: &str = "REGISTRY_CIRCULAR_ALIAS";
    /// Code for [`RegistryError::InvalidIdentifier`].
    pub const INVALID_IDENTIFIER: &str = "REGISTRY_INVALID_IDENTIFIER";
    /// Code for [`RegistryError::InvariantViolation`].
    pub const INVARIANT_VIOLATION: &str = "REGISTRY_INVARIANT_VIOLATION";
    /// Code for [`RegistryError::Config`].
    pub const CONFIG: &str = "REGISTRY_CONFIG";
}

/// **REGISTRY ERROR**
///
/// **PURPOSE**: Enumerated error kinds replacing exception-driven control flow.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A finished instance is already bound to the identifier.
    #[error("DUPLICATE REGISTRATION: could not register '{id}', an instance is already bound")]
    DuplicateRegistration {
        /// Identifier that is already bound.
        id: String,
    },

    /// Re-entrant creation or registration through the direct entry points.
    #[error("CURRENTLY IN CREATION: '{id}' is already being created (unresolvable circular reference?)")]
    CurrentlyInCreation {
        /// Identifier that is mid-construction.
        id: String,
    },

    /// Creation attempted while the registry is shutting down or shut down.
    #[error("CREATION NOT ALLOWED: '{id}' requested while the registry is being destroyed")]
    CreationNotAllowed {
        /// Identifier that was requested.
        id: String,
    },

    /// The construction callback or production step failed.
    #[error("CONSTRUCTION FAILED: '{id}': {source}")]
    ConstructionFailed {
        /// Identifier being created.
        id: String,
        /// What the callback or step returned.
        #[source]
        source: BoxError,
        /// Non-fatal errors recorded during the same creation attempt.
        suppressed: Vec<String>,
    },

    /// A production step returned null for an identifier still in creation.
    #[error("PRODUCTION RETURNED NULL: production step for '{id}' returned null while '{id}' is in creation")]
    ProductionDuringCreationReturnedNull {
        /// Identifier whose step returned null.
        id: String,
    },

    /// The post-processor rejected a produced value.
    #[error("POST PROCESSING FAILED: '{id}': {source}")]
    PostProcessingFailed {
        /// Identifier whose product was being processed.
        id: String,
        /// What the post-processor returned.
        #[source]
        source: BoxError,
    },

    /// `id` declares a depends-on edge to an identifier that already depends on `id`.
    #[error("CIRCULAR DEPENDS-ON: '{id}' and '{dependency}' depend on each other")]
    CircularDependsOn {
        /// Identifier being created.
        id: String,
        /// Declared dependency that already depends on `id`.
        dependency: String,
    },

    /// An alias already points elsewhere and overriding is disabled.
    #[error("ALIAS CONFLICT: alias '{alias}' is already bound to '{existing}', cannot rebind to '{name}'")]
    AliasConflict {
        /// The alias being registered.
        alias: String,
        /// Requested target.
        name: String,
        /// Current target.
        existing: String,
    },

    /// Registering the alias would close a chain back onto itself.
    #[error("CIRCULAR ALIAS: registering '{alias}' for '{name}' would form a cycle")]
    CircularAlias {
        /// The alias being registered.
        alias: String,
        /// Requested target.
        name: String,
    },

    /// Empty or over-long identifier.
    #[error("INVALID IDENTIFIER: {message}")]
    InvalidIdentifier {
        /// Why the identifier was rejected.
        message: String,
    },

    /// Internal consistency failure; signals a programming error in the caller.
    #[error("INVARIANT VIOLATION: {message}")]
    InvariantViolation {
        /// What was inconsistent.
        message: String,
    },

    /// Configuration could not be loaded or is unusable.
    #[error("CONFIG ERROR: {message}")]
    Config {
        /// Parser or validation message.
        message: String,
    },
}

impl RegistryError {
    /// Stable error code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::DuplicateRegistration { .. } => error_codes::DUPLICATE_REGISTRATION,
            RegistryError::CurrentlyInCreation { .. } => error_codes::CURRENTLY_IN_CREATION,
            RegistryError::CreationNotAllowed { .. } => error_codes::CREATION_NOT_ALLOWED,
            RegistryError::ConstructionFailed { .. } => error_codes::CONSTRUCTION_FAILED,
            RegistryError::ProductionDuringCreationReturnedNull { .. } => {
                error_codes::PRODUCTION_RETURNED_NULL
            }
            RegistryError::PostProcessingFailed { .. } => error_codes::POST_PROCESSING_FAILED,
            RegistryError::CircularDependsOn { .. } => error_codes::CIRCULAR_DEPENDS_ON,
            RegistryError::AliasConflict { .. } => error_codes::ALIAS_CONFLICT,
            RegistryError::CircularAlias { .. } => error_codes::CIRCULAR_ALIAS,
            RegistryError::InvalidIdentifier { .. } => error_codes::INVALID_IDENTIFIER,
            RegistryError::InvariantViolation { .. } => error_codes::INVARIANT_VIOLATION,
            RegistryError::Config { .. } => error_codes::CONFIG,
        }
    }

    /// Follow nested `ConstructionFailed` sources down to the first error that
    /// is not itself a construction wrapper.
    ///
    /// Errors raised by the registry inside a callback (for instance
    /// `CurrentlyInCreation`) come back wrapped by the outer creation; this
    /// recovers them.
    pub fn innermost(&self) -> &RegistryError {
        let mut current = self;
        while let RegistryError::ConstructionFailed { source, .. } = current {
            match source.downcast_ref::<RegistryError>() {
                Some(inner) => current = inner,
                None => break,
            }
        }
        current
    }

    /// Suppressed error messages attached to a failed construction.
    pub fn suppressed(&self) -> &[String] {
        match self {
            RegistryError::ConstructionFailed { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        RegistryError::InvariantViolation {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_unwraps_nested_construction_failures() {
        let inner = RegistryError::CurrentlyInCreation { id: "a".into() };
        let middle = RegistryError::ConstructionFailed {
            id: "b".into(),
            source: Box::new(inner),
            suppressed: Vec::new(),
        };
        let outer = RegistryError::ConstructionFailed {
            id: "a".into(),
            source: Box::new(middle),
            suppressed: vec!["late".into()],
        };

        assert!(matches!(
            outer.innermost(),
            RegistryError::CurrentlyInCreation { id } if id == "a"
        ));
        assert_eq!(outer.suppressed(), ["late".to_string()]);
    }

    #[test]
    fn test_innermost_stops_at_foreign_error() {
        let err = RegistryError::ConstructionFailed {
            id: "a".into(),
            source: "disk on fire".into(),
            suppressed: Vec::new(),
        };
        assert_eq!(err.innermost().code(), error_codes::CONSTRUCTION_FAILED);
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            RegistryError::DuplicateRegistration { id: "x".into() },
            RegistryError::CurrentlyInCreation { id: "x".into() },
            RegistryError::CreationNotAllowed { id: "x".into() },
            RegistryError::ProductionDuringCreationReturnedNull { id: "x".into() },
            RegistryError::invariant("boom"),
        ];
        let mut codes: Vec<_> = errors.iter().map(RegistryError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_display_mentions_identifier() {
        let err = RegistryError::CreationNotAllowed {
            id: "orderService".into(),
        };
        assert!(err.to_string().contains("orderService"));
    }
}
