//! # REGISTRY TYPE DEFINITIONS
//!
//! **CRITICAL**: Core data structures shared by every registry component.

use crate::errors::BoxError;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// **MANAGED INSTANCE**
///
/// Opaque shared value produced by a construction callback. Identity is
/// pointer identity (`Arc::ptr_eq`).
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Zero-argument, possibly-failing construction of a finished instance.
pub type ConstructionCallback<'a> = Box<dyn FnOnce() -> Result<Instance, BoxError> + 'a>;

/// Producer of an early (possibly not fully wired) reference for an
/// identifier that is still in creation.
pub type EarlyFactory = Box<dyn FnOnce() -> Result<Instance, BoxError> + Send>;

/// Post-processing applied to production-step results.
pub type PostProcessor = Arc<dyn Fn(Instance, &str) -> Result<Instance, BoxError> + Send + Sync>;

/// Wrap any value as a managed instance.
pub fn instance<T: Any + Send + Sync>(value: T) -> Instance {
    Arc::new(value)
}

/// **NULL-VALUE SENTINEL**
///
/// Stands in for a production step that produced nothing, so presence checks
/// can tell "produced null" apart from "absent". Every null result gets its
/// own allocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NullInstance;

impl NullInstance {
    /// A fresh sentinel instance.
    pub fn new_instance() -> Instance {
        Arc::new(NullInstance)
    }
}

/// Whether `value` is a null-value sentinel.
pub fn is_null_instance(value: &Instance) -> bool {
    value.downcast_ref::<NullInstance>().is_some()
}

/// **CREATION STATE**
///
/// Where an identifier currently sits in the instance lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationState {
    /// Not known to any tier.
    Absent,
    /// An early factory is pending.
    FactoryRegistered,
    /// An early reference has been handed out.
    EarlyExposed,
    /// Construction is running, nothing exposed yet.
    InCreation,
    /// A finished instance is cached.
    Finished,
}

/// **REGISTRY LIFECYCLE**
///
/// `Active -> Destroying -> Destroyed`; `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Accepting creation.
    Active,
    /// `destroy_all` is running.
    Destroying,
    /// Shut down for good.
    Destroyed,
}

impl LifecycleState {
    /// Whether new instances may still be created.
    pub fn allows_creation(self) -> bool {
        matches!(self, LifecycleState::Active)
    }
}

/// **DISPOSAL HOOK**
///
/// Teardown operation invoked exactly once when its identifier is destroyed.
pub trait DisposalHook: Send {
    /// Release whatever the instance holds.
    fn dispose(self: Box<Self>) -> Result<(), BoxError>;
}

impl<F> DisposalHook for F
where
    F: FnOnce() -> Result<(), BoxError> + Send,
{
    fn dispose(self: Box<Self>) -> Result<(), BoxError> {
        (*self)()
    }
}

/// **PRODUCTION STEP**
///
/// Indirect construction: may run once (shared) or on every request
/// (non-shared). `Ok(None)` means the step produced null.
pub trait ProductionStep {
    /// Produce the value.
    fn produce(&self) -> Result<Option<Instance>, BoxError>;

    /// Declared type of the produced value, if known up front.
    fn product_type(&self) -> Result<Option<&'static str>, BoxError> {
        Ok(None)
    }
}

impl<F> ProductionStep for F
where
    F: Fn() -> Result<Option<Instance>, BoxError>,
{
    fn produce(&self) -> Result<Option<Instance>, BoxError> {
        self()
    }
}

/// **CONSTRUCTION REQUEST**
///
/// What an upstream configuration component hands the registry for one
/// shared identifier.
pub struct ConstructionRequest<'a> {
    /// Identifier to create.
    pub id: String,
    /// Identifiers that must be destroyed after this one.
    pub depends_on: Vec<String>,
    /// Opt this identifier out of the re-entrant creation check.
    pub excluded_from_reentrancy_check: bool,
    /// The construction itself.
    pub callback: ConstructionCallback<'a>,
}

impl<'a> ConstructionRequest<'a> {
    /// **CONSTRUCTOR**
    pub fn new<F>(id: impl Into<String>, callback: F) -> Self
    where
        F: FnOnce() -> Result<Instance, BoxError> + 'a,
    {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            excluded_from_reentrancy_check: false,
            callback: Box::new(callback),
        }
    }

    /// **WITH DEPENDS-ON**
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    /// **WITH REENTRANCY EXCLUSION**
    pub fn excluded(mut self, excluded: bool) -> Self {
        self.excluded_from_reentrancy_check = excluded;
        self
    }
}

impl fmt::Debug for ConstructionRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructionRequest")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field(
                "excluded_from_reentrancy_check",
                &self.excluded_from_reentrancy_check,
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_instances_are_distinct() {
        let a = NullInstance::new_instance();
        let b = NullInstance::new_instance();
        assert!(is_null_instance(&a));
        assert!(is_null_instance(&b));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_regular_instance_is_not_null() {
        let value = instance(42_u32);
        assert!(!is_null_instance(&value));
        assert_eq!(value.downcast_ref::<u32>(), Some(&42));
    }

    #[test]
    fn test_closure_disposal_hook() {
        let hook: Box<dyn DisposalHook> = Box::new(|| -> Result<(), BoxError> { Err("closed twice".into()) });
        let err = hook.dispose().unwrap_err();
        assert_eq!(err.to_string(), "closed twice");
    }

    #[test]
    fn test_construction_request_builder() {
        let request = ConstructionRequest::new("orderService", || Ok(instance("order")))
            .depends_on(["paymentGateway", "inventory"])
            .excluded(true);
        assert_eq!(request.id, "orderService");
        assert_eq!(request.depends_on, vec!["paymentGateway", "inventory"]);
        assert!(request.excluded_from_reentrancy_check);
    }

    #[test]
    fn test_lifecycle_allows_creation_only_when_active() {
        assert!(LifecycleState::Active.allows_creation());
        assert!(!LifecycleState::Destroying.allows_creation());
        assert!(!LifecycleState::Destroyed.allows_creation());
    }
}
