use crate::registry::cache::InstanceCache;
use crate::registry::graph::DependencyGraph;
use crate::types::DisposalHook;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// One disposal hook that failed or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposalFailure {
    /// Identifier whose hook failed.
    pub id: String,
    /// Error or panic message.
    pub message: String,
}

/// **DESTRUCTION REPORT**
///
/// **PURPOSE**: What a destruction pass did. Hook failures never abort the
/// pass; they are logged and collected here instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestructionReport {
    /// Identifiers whose hook ran, in invocation order.
    pub disposed: Vec<String>,
    /// Hooks that failed or panicked.
    pub failures: Vec<DisposalFailure>,
}

impl DestructionReport {
    /// No hook failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: DestructionReport) {
        self.disposed.extend(other.disposed);
        self.failures.extend(other.failures);
    }
}

/// **DESTRUCTION COORDINATOR**
///
/// **PURPOSE**: Owns disposal hooks and tears identifiers down in dependency
/// order: dependents first, then the identifier's own hook, then whatever it
/// contains.
/// **GUARANTEE**: Every hook runs at most once. A failing or panicking hook is
/// reported and the pass continues.
#[derive(Default)]
pub struct DestructionCoordinator {
    hooks: Mutex<IndexMap<String, Box<dyn DisposalHook>>>,
}

impl DestructionCoordinator {
    /// Coordinator without hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the hook for `id`. A second registration replaces the first
    /// but keeps its position in the destruction order.
    pub fn register_hook(&self, id: &str, hook: Box<dyn DisposalHook>) {
        if self.hooks.lock().insert(id.to_string(), hook).is_some() {
            log::debug!("Replaced disposal hook for '{}'", id);
        }
    }

    /// Whether a hook is pending for `id`.
    pub fn has_hook(&self, id: &str) -> bool {
        self.hooks.lock().contains_key(id)
    }

    /// Number of pending hooks.
    pub fn hook_count(&self) -> usize {
        self.hooks.lock().len()
    }

    /// Destroy `id` and, first, everything that depends on it.
    pub fn destroy_one(
        &self,
        cache: &InstanceCache,
        graph: &DependencyGraph,
        id: &str,
    ) -> DestructionReport {
        let mut report = DestructionReport::default();
        self.destroy_into(cache, graph, id, &mut report);
        report
    }

    /// Destroy every identifier with a hook, most recently registered first,
    /// then clear all remaining state. The cache ends up `Destroyed` and
    /// rejects further creation.
    ///
    /// Only the first call does anything; later or nested calls return an
    /// empty report.
    pub fn destroy_all(&self, cache: &InstanceCache, graph: &DependencyGraph) -> DestructionReport {
        if !cache.begin_destruction() {
            log::debug!(
                "Registry already {:?}, skipping destruction",
                cache.lifecycle()
            );
            return DestructionReport::default();
        }
        log::debug!("Destroying shared instances in {:?}", cache);

        let mut report = DestructionReport::default();
        let ids: Vec<String> = self.hooks.lock().keys().cloned().collect();
        for id in ids.iter().rev() {
            report.merge(self.destroy_one(cache, graph, id));
        }

        graph.clear();
        cache.clear();
        cache.tracker().clear();
        let leftover = std::mem::take(&mut *self.hooks.lock());
        if !leftover.is_empty() {
            log::warn!(
                "Discarding {} disposal hook(s) registered during shutdown",
                leftover.len()
            );
        }
        cache.finish_destruction();

        if !report.is_clean() {
            log::warn!(
                "Shutdown finished with {} failed disposal hook(s)",
                report.failures.len()
            );
        }
        report
    }

    fn destroy_into(
        &self,
        cache: &InstanceCache,
        graph: &DependencyGraph,
        id: &str,
        report: &mut DestructionReport,
    ) {
        cache.remove(id);
        let hook = self.hooks.lock().shift_remove(id);

        let dependents = graph.take_dependents(id);
        if !dependents.is_empty() {
            log::debug!(
                "Destroying dependents {:?} before '{}'",
                dependents,
                id
            );
        }
        for dependent in &dependents {
            self.destroy_into(cache, graph, dependent, report);
        }

        if let Some(hook) = hook {
            log::debug!("Invoking disposal hook for '{}'", id);
            match panic::catch_unwind(AssertUnwindSafe(|| hook.dispose())) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log::error!("Disposal hook for '{}' failed: {}", id, err);
                    report.failures.push(DisposalFailure {
                        id: id.to_string(),
                        message: err.to_string(),
                    });
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log::error!("Disposal hook for '{}' panicked: {}", id, message);
                    report.failures.push(DisposalFailure {
                        id: id.to_string(),
                        message,
                    });
                }
            }
            report.disposed.push(id.to_string());
        }

        for inner in graph.take_contained(id) {
            self.destroy_into(cache, graph, &inner, report);
        }

        graph.forget(id);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "disposal hook panicked".to_string()
    }
}

impl fmt::Debug for DestructionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestructionCoordinator")
            .field("hooks", &self.hooks.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}
