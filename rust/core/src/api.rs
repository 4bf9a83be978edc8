pub use crate::alias::{AliasResolver, AliasTable, IdentityAliases};
pub use crate::config::RegistryConfig;
pub use crate::errors::{error_codes, BoxError, RegistryError, Result};
pub use crate::registry::{
    CreationMark, CreationTracker, DependencyGraph, DestructionCoordinator, DestructionReport,
    DisposalFailure, FactoryObjectResolver, InstanceCache, SingletonRegistry,
};
pub use crate::types::{
    instance, is_null_instance, ConstructionCallback, ConstructionRequest, CreationState,
    DisposalHook, EarlyFactory, Instance, LifecycleState, NullInstance, PostProcessor,
    ProductionStep,
};
