//! # REGISTRY CORE LIBRARY
//!
//! **OBJECT LIFECYCLE REGISTRY FOR SHARED INSTANCES**
//!
//! **ARCHITECTURE**: Tiered instance cache, creation tracker, dependency graph
//! and destruction coordinator behind one [`SingletonRegistry`] facade
//! **GUARANTEE**: One instance per identifier, cycles broken through early
//! references, dependents always destroyed before their dependencies
//! **COMPATIBILITY**: Any number of independent registries per process

pub mod alias;
/// Flat re-export of the public surface.
pub mod api;
pub mod config;
pub mod errors;
pub mod registry;
pub mod types;

pub use crate::errors::{RegistryError, Result};
pub use crate::registry::SingletonRegistry;
