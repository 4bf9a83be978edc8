//! # REGISTRY
//!
//! The lifecycle engine: creation tracking, the tiered instance cache, the
//! dependency graph, destruction ordering and production steps, wired
//! together by [`SingletonRegistry`].

/// Tiered instance cache.
pub mod cache;
/// Dependency-ordered teardown.
pub mod destruction;
/// Products of indirect production steps.
pub mod factory;
/// Dependency and containment edges.
pub mod graph;
/// The registry facade.
#[allow(clippy::module_inception)]
pub mod registry;
/// In-creation bookkeeping.
pub mod tracker;

pub use cache::InstanceCache;
pub use destruction::{DestructionCoordinator, DestructionReport, DisposalFailure};
pub use factory::FactoryObjectResolver;
pub use graph::DependencyGraph;
pub use registry::SingletonRegistry;
pub use tracker::{CreationMark, CreationTracker};
