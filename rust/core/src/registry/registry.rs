use crate::alias::{AliasResolver, IdentityAliases};
use crate::config::RegistryConfig;
use crate::errors::{BoxError, RegistryError, Result};
use crate::registry::cache::InstanceCache;
use crate::registry::destruction::{DestructionCoordinator, DestructionReport};
use crate::registry::factory::FactoryObjectResolver;
use crate::registry::graph::DependencyGraph;
use crate::types::{
    ConstructionRequest, CreationState, DisposalHook, Instance, LifecycleState, PostProcessor,
    ProductionStep,
};
use std::fmt;
use std::sync::Arc;

/// **SINGLETON REGISTRY**
///
/// **PURPOSE**: One registry scope. Creates each shared instance at most once,
/// breaks construction cycles through early references, records dependency
/// and containment edges, and tears everything down in dependency order.
/// **GUARANTEE**: Every identifier is canonicalized through the configured
/// [`AliasResolver`] before it reaches the cache or the graph.
///
/// Independent registries share nothing, so several can coexist in one process.
pub struct SingletonRegistry {
    config: RegistryConfig,
    aliases: Arc<dyn AliasResolver>,
    cache: InstanceCache,
    graph: DependencyGraph,
    destruction: DestructionCoordinator,
    products: FactoryObjectResolver,
}

impl SingletonRegistry {
    /// **CONSTRUCTOR**: default configuration, no aliases.
    pub fn new() -> Self {
        Self::build(RegistryConfig::default())
    }

    /// **CONSTRUCTOR**: validated configuration.
    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RegistryConfig) -> Self {
        Self {
            cache: InstanceCache::new(&config),
            config,
            aliases: Arc::new(IdentityAliases),
            graph: DependencyGraph::new(),
            destruction: DestructionCoordinator::new(),
            products: FactoryObjectResolver::new(),
        }
    }

    /// Resolve identifiers through `aliases` from now on.
    pub fn with_aliases(mut self, aliases: Arc<dyn AliasResolver>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Post-process produced values with `post_processor`.
    pub fn with_post_processor(mut self, post_processor: PostProcessor) -> Self {
        self.products = self.products.with_post_processor(post_processor);
        self
    }

    /// Configuration this registry was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn canonical(&self, id: &str) -> String {
        self.aliases.canonical_name(id)
    }

    fn checked_canonical(&self, id: &str) -> Result<String> {
        self.config.validate_identifier(id)?;
        Ok(self.canonical(id))
    }

    // ============================================================================================
    // CREATION
    // ============================================================================================

    /// Finished instance for `id`, or its early reference while `id` is in
    /// creation. Absent identifiers yield `Ok(None)`.
    pub fn get(&self, id: &str) -> Result<Option<Instance>> {
        self.cache.get(&self.canonical(id))
    }

    /// Return the instance for `id`, running `callback` exactly once to create it.
    pub fn get_or_create<F>(&self, id: &str, callback: F) -> Result<Instance>
    where
        F: FnOnce() -> std::result::Result<Instance, BoxError>,
    {
        let id = self.checked_canonical(id)?;
        self.cache.get_or_create(&id, callback)
    }

    /// Apply a full construction request: exclusion flag, depends-on edges,
    /// then creation.
    pub fn create(&self, request: ConstructionRequest<'_>) -> Result<Instance> {
        let ConstructionRequest {
            id,
            depends_on,
            excluded_from_reentrancy_check,
            callback,
        } = request;
        let id = self.checked_canonical(&id)?;

        if excluded_from_reentrancy_check {
            self.cache.tracker().set_excluded(&id, true);
        }
        for dependency in &depends_on {
            let dependency = self.checked_canonical(dependency)?;
            if self.graph.is_dependent(&id, &dependency) {
                return Err(RegistryError::CircularDependsOn { id, dependency });
            }
            self.graph.register_dependency(&dependency, &id);
        }

        self.cache.get_or_create(&id, callback)
    }

    /// Bind an externally built instance to `id`.
    pub fn register_instance(&self, id: &str, instance: Instance) -> Result<()> {
        let id = self.checked_canonical(id)?;
        self.cache.register_instance(&id, instance)
    }

    /// Expose an early-reference producer for `id` while it is being created.
    pub fn register_factory<F>(&self, id: &str, factory: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<Instance, BoxError> + Send + 'static,
    {
        let id = self.checked_canonical(id)?;
        self.cache.register_factory(&id, factory);
        Ok(())
    }

    /// Drop every cached tier for `id` without running its disposal hook.
    pub fn remove(&self, id: &str) {
        self.cache.remove(&self.canonical(id));
    }

    /// Record a non-fatal error against the creation in progress.
    pub fn on_suppressed_error(&self, error: impl fmt::Display) {
        self.cache.on_suppressed_error(error);
    }

    // ============================================================================================
    // INTROSPECTION
    // ============================================================================================

    /// Whether a finished instance exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.cache.contains(&self.canonical(id))
    }

    /// Number of registered identifiers.
    pub fn count(&self) -> usize {
        self.cache.count()
    }

    /// Registered identifiers in registration order.
    pub fn list_identifiers(&self) -> Vec<String> {
        self.cache.identifiers()
    }

    /// Which tier `id` currently sits in.
    pub fn state(&self, id: &str) -> CreationState {
        self.cache.state(&self.canonical(id))
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> LifecycleState {
        self.cache.lifecycle()
    }

    /// Passing `false` excludes `id` from the reentrancy check; `true` lifts
    /// the exclusion again.
    pub fn set_currently_in_creation(&self, id: &str, in_creation: bool) {
        self.cache
            .tracker()
            .set_excluded(&self.canonical(id), !in_creation);
    }

    /// In creation and subject to the reentrancy check.
    pub fn is_currently_in_creation(&self, id: &str) -> bool {
        self.cache
            .tracker()
            .is_checked_in_creation(&self.canonical(id))
    }

    /// Raw in-creation state, ignoring exclusions.
    pub fn is_actually_in_creation(&self, id: &str) -> bool {
        self.cache.tracker().is_in_creation(&self.canonical(id))
    }

    // ============================================================================================
    // DEPENDENCY GRAPH
    // ============================================================================================

    /// Record that `dependent_id` depends on `dependency_id`.
    pub fn register_dependency(&self, dependency_id: &str, dependent_id: &str) {
        self.graph
            .register_dependency(&self.canonical(dependency_id), &self.canonical(dependent_id));
    }

    /// Record that `outer_id` owns `inner_id`.
    pub fn register_containment(&self, inner_id: &str, outer_id: &str) {
        self.graph
            .register_containment(&self.canonical(inner_id), &self.canonical(outer_id));
    }

    /// Whether `candidate_id` transitively depends on `id`.
    pub fn is_dependent(&self, id: &str, candidate_id: &str) -> bool {
        self.graph
            .is_dependent(&self.canonical(id), &self.canonical(candidate_id))
    }

    /// Direct dependents of `id`.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.graph.dependents_of(&self.canonical(id))
    }

    /// Direct dependencies of `id`.
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.graph.dependencies_of(&self.canonical(id))
    }

    /// Whether anything depends on `id`.
    pub fn has_dependents(&self, id: &str) -> bool {
        self.graph.has_dependents(&self.canonical(id))
    }

    // ============================================================================================
    // DESTRUCTION
    // ============================================================================================

    /// Run `hook` when `id` is destroyed. Re-registering replaces the previous hook.
    pub fn register_disposal_hook<H>(&self, id: &str, hook: H) -> Result<()>
    where
        H: DisposalHook + 'static,
    {
        let id = self.checked_canonical(id)?;
        self.destruction.register_hook(&id, Box::new(hook));
        Ok(())
    }

    /// Whether a hook is pending for `id`.
    pub fn has_disposal_hook(&self, id: &str) -> bool {
        self.destruction.has_hook(&self.canonical(id))
    }

    /// Destroy `id` after everything that depends on it.
    pub fn destroy_one(&self, id: &str) -> DestructionReport {
        self.destruction
            .destroy_one(&self.cache, &self.graph, &self.canonical(id))
    }

    /// Destroy every identifier; the registry rejects creation afterwards.
    pub fn destroy_all(&self) -> DestructionReport {
        self.destruction.destroy_all(&self.cache, &self.graph)
    }

    /// End this registry scope.
    pub fn shutdown(&self) -> DestructionReport {
        log::debug!("Shutting down registry");
        self.destroy_all()
    }

    // ============================================================================================
    // PRODUCTION STEPS
    // ============================================================================================

    /// Value produced by `step` for `id`; see [`FactoryObjectResolver::resolve`].
    pub fn resolve_product(
        &self,
        id: &str,
        step: &dyn ProductionStep,
        is_shared: bool,
        should_post_process: bool,
    ) -> Result<Instance> {
        let id = self.checked_canonical(id)?;
        self.products
            .resolve(&self.cache, &id, step, is_shared, should_post_process)
    }

    /// Shared product cached for `id`, if any.
    pub fn cached_product(&self, id: &str) -> Option<Instance> {
        self.products.cached_product(&self.cache, &self.canonical(id))
    }

    /// Declared product type of `step`, `None` when unknown or failing.
    pub fn product_type(&self, step: &dyn ProductionStep) -> Option<&'static str> {
        self.products.product_type(step)
    }
}

impl Default for SingletonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonRegistry")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("destruction", &self.destruction)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasTable;
    use crate::types::instance;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, OnceLock};
    use std::thread;
    use std::time::Duration;

    struct Node {
        name: &'static str,
        peer: OnceLock<Instance>,
    }

    fn node(name: &'static str) -> Arc<Node> {
        Arc::new(Node {
            name,
            peer: OnceLock::new(),
        })
    }

    /// Create `id` the way an upstream wiring component would: allocate,
    /// expose an early factory, resolve the peer, then finish.
    fn create_node(
        registry: &SingletonRegistry,
        id: &'static str,
        peer_id: &'static str,
    ) -> Result<Instance> {
        registry.get_or_create(id, || {
            let me = node(id);
            let early = me.clone();
            registry.register_factory(id, move || Ok(early as Instance))?;

            let peer = match registry.get(peer_id)? {
                Some(peer) => peer,
                None => create_node(registry, peer_id, id)?,
            };
            let _ = me.peer.set(peer);
            Ok(me as Instance)
        })
    }

    #[test]
    fn test_circular_reference_resolved_through_early_reference() {
        let registry = SingletonRegistry::new();

        let a = create_node(&registry, "A", "B").unwrap();

        let a = a.downcast::<Node>().unwrap();
        let b = registry.get("B").unwrap().unwrap().downcast::<Node>().unwrap();
        assert_eq!(a.name, "A");
        assert_eq!(b.name, "B");
        let b_peer = b.peer.get().unwrap().clone().downcast::<Node>().unwrap();
        assert!(Arc::ptr_eq(&b_peer, &a));
        assert_eq!(registry.state("A"), CreationState::Finished);
        assert_eq!(registry.state("B"), CreationState::Finished);
        assert!(!registry.is_actually_in_creation("A"));
    }

    #[test]
    fn test_direct_reentrancy_fails() {
        let registry = SingletonRegistry::new();

        let err = registry
            .get_or_create("A", || {
                registry.get_or_create("A", || Ok(instance(0_u8)))?;
                Ok(instance(1_u8))
            })
            .unwrap_err();

        assert!(matches!(
            err.innermost(),
            RegistryError::CurrentlyInCreation { id } if id == "A"
        ));
        assert_eq!(registry.state("A"), CreationState::Absent);
    }

    #[test]
    fn test_concurrent_single_construction() {
        const THREADS: usize = 8;
        let registry = SingletonRegistry::new();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);

        let results: Vec<Instance> = thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        registry
                            .get_or_create("X", || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(20));
                                Ok(instance(String::from("x")))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[test]
    fn test_create_registers_depends_on_edges() {
        let registry = SingletonRegistry::new();
        registry
            .create(
                ConstructionRequest::new("orderService", || Ok(instance("orders")))
                    .depends_on(["paymentGateway", "inventory"]),
            )
            .unwrap();

        assert_eq!(
            registry.dependencies_of("orderService"),
            vec!["paymentGateway", "inventory"]
        );
        assert!(registry.has_dependents("paymentGateway"));
        assert!(registry.is_dependent("inventory", "orderService"));
    }

    #[test]
    fn test_create_rejects_circular_depends_on() {
        let registry = SingletonRegistry::new();
        registry.register_dependency("a", "b");

        let err = registry
            .create(ConstructionRequest::new("a", || Ok(instance(1_u8))).depends_on(["b"]))
            .unwrap_err();

        assert!(matches!(
            err,
            RegistryError::CircularDependsOn { id, dependency } if id == "a" && dependency == "b"
        ));
        assert!(!registry.contains("a"));
    }

    #[test]
    fn test_excluded_request_skips_reentrancy_check() {
        let registry = SingletonRegistry::new();
        let inner = registry
            .create(
                ConstructionRequest::new("scoped", || {
                    assert!(!registry.is_currently_in_creation("scoped"));
                    Ok(instance("scoped"))
                })
                .excluded(true),
            )
            .unwrap();

        assert_eq!(inner.downcast_ref::<&str>(), Some(&"scoped"));
        registry.set_currently_in_creation("scoped", true);
        assert!(!registry.cache.tracker().is_excluded("scoped"));
    }

    #[test]
    fn test_aliases_resolve_to_canonical_identifier() {
        let aliases = Arc::new(AliasTable::default());
        aliases.register_alias("dataSource", "db").unwrap();
        let registry = SingletonRegistry::new().with_aliases(aliases.clone());

        registry.register_instance("db", instance(5_i32)).unwrap();

        assert!(registry.contains("dataSource"));
        assert_eq!(registry.list_identifiers(), vec!["dataSource"]);
        assert!(registry.register_instance("dataSource", instance(6_i32)).is_err());
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        let registry = SingletonRegistry::with_config(RegistryConfig {
            max_identifier_len: 4,
            ..RegistryConfig::default()
        })
        .unwrap();

        let err = registry.register_instance("", instance(1_u8)).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidIdentifier { .. }));
        let err = registry.get_or_create("toolong", || Ok(instance(1_u8))).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_suppressed_errors_attached_to_failure() {
        let registry = SingletonRegistry::new();

        let err = registry
            .get_or_create("svc", || {
                registry.on_suppressed_error("optional cache unavailable");
                Err("required socket missing".into())
            })
            .unwrap_err();

        assert_eq!(err.suppressed(), ["optional cache unavailable".to_string()]);
    }

    #[test]
    fn test_shutdown_blocks_creation() {
        let registry = SingletonRegistry::new();
        let disposed = Arc::new(Mutex::new(Vec::new()));
        registry.register_instance("db", instance("db")).unwrap();
        let sink = disposed.clone();
        registry
            .register_disposal_hook("db", move || -> std::result::Result<(), BoxError> {
                sink.lock().push("db");
                Ok(())
            })
            .unwrap();

        let report = registry.shutdown();

        assert_eq!(report.disposed, vec!["db"]);
        assert_eq!(*disposed.lock(), vec!["db"]);
        assert_eq!(registry.lifecycle(), LifecycleState::Destroyed);
        assert_eq!(registry.count(), 0);
        let err = registry.get_or_create("db", || Ok(instance(1_u8))).unwrap_err();
        assert!(matches!(err, RegistryError::CreationNotAllowed { .. }));
    }

    #[test]
    fn test_remove_purges_products() {
        let registry = SingletonRegistry::new();
        registry.register_instance("conn", instance("factory")).unwrap();
        let step = || -> std::result::Result<Option<Instance>, BoxError> { Ok(Some(instance(3_u8))) };

        registry.resolve_product("conn", &step, true, false).unwrap();
        assert!(registry.cached_product("conn").is_some());

        registry.remove("conn");
        assert!(registry.cached_product("conn").is_none());
        assert!(!registry.contains("conn"));
    }
}
