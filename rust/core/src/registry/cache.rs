use crate::config::RegistryConfig;
use crate::errors::{BoxError, RegistryError, Result};
use crate::registry::tracker::{CreationMark, CreationTracker};
use crate::types::{CreationState, EarlyFactory, Instance, LifecycleState};
use indexmap::IndexSet;
use parking_lot::{ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// State guarded by the coarse reentrant lock.
#[derive(Default)]
pub(crate) struct Tiers {
    /// Provisional references handed out while their owner is still in creation.
    early: HashMap<String, Instance>,
    /// Pending early-reference producers, consumed on first use.
    factories: HashMap<String, EarlyFactory>,
    /// Every identifier that reached the finished or factory tier, in order.
    registered: IndexSet<String>,
    /// Results cached by the factory object resolver.
    products: HashMap<String, Instance>,
    /// Errors collected during the outermost creation in progress.
    suppressed: Option<Vec<String>>,
}

/// **INSTANCE CACHE (TIERED)**
///
/// **PURPOSE**: Finished instances, early references and pending early
/// factories for every identifier, plus the cycle-breaking lookup.
/// **GUARANTEE**: At most one finished instance per identifier. Committing an
/// instance removes its early reference and factory under the same lock.
///
/// Locking:
/// - one coarse [`ReentrantMutex`] serializes every tier transition and is held
///   across construction callbacks, so a second thread asking for the same
///   identifier waits for the first construction instead of running its own;
/// - the finished tier additionally sits behind an `RwLock` so lookups of
///   finished instances never wait for unrelated constructions;
/// - the `RefCell` inside the coarse lock is only borrowed for short, local
///   updates and never across a callback, which is what lets callbacks
///   re-enter the cache on the same thread.
pub struct InstanceCache {
    tiers: ReentrantMutex<RefCell<Tiers>>,
    finished: RwLock<HashMap<String, Instance>>,
    tracker: CreationTracker,
    lifecycle: RwLock<LifecycleState>,
    allow_early_references: bool,
    suppressed_error_limit: usize,
}

impl InstanceCache {
    /// Empty cache in the `Active` state.
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            tiers: ReentrantMutex::new(RefCell::new(Tiers::default())),
            finished: RwLock::new(HashMap::new()),
            tracker: CreationTracker::new(),
            lifecycle: RwLock::new(LifecycleState::Active),
            allow_early_references: config.allow_early_references,
            suppressed_error_limit: config.suppressed_error_limit,
        }
    }

    /// The creation tracker shared by every tier.
    pub fn tracker(&self) -> &CreationTracker {
        &self.tracker
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle.read()
    }

    // ============================================================================================
    // LOOKUP
    // ============================================================================================

    /// Finished instance for `id`, or an early reference if `id` is in creation.
    ///
    /// A registered early factory runs at most once; its result is cached in
    /// the early tier and the factory entry is dropped.
    pub fn get(&self, id: &str) -> Result<Option<Instance>> {
        self.lookup(id, self.allow_early_references)
    }

    /// Finished instance only; never touches the early tiers.
    pub fn get_finished(&self, id: &str) -> Option<Instance> {
        self.finished.read().get(id).cloned()
    }

    fn lookup(&self, id: &str, allow_early: bool) -> Result<Option<Instance>> {
        if let Some(found) = self.get_finished(id) {
            log::trace!("Returning cached instance of '{}'", id);
            return Ok(Some(found));
        }
        if !self.tracker.is_in_creation(id) {
            return Ok(None);
        }

        let guard = self.tiers.lock();
        // The creation may have completed while we waited for the lock.
        if let Some(found) = self.get_finished(id) {
            return Ok(Some(found));
        }
        let early = guard.borrow().early.get(id).cloned();
        if early.is_some() || !allow_early {
            return Ok(early);
        }

        let factory = guard.borrow_mut().factories.remove(id);
        let Some(factory) = factory else {
            return Ok(None);
        };
        let early = factory().map_err(|source| RegistryError::ConstructionFailed {
            id: id.to_string(),
            source,
            suppressed: Vec::new(),
        })?;
        log::debug!("Exposing early reference to '{}' (circular reference)", id);
        guard
            .borrow_mut()
            .early
            .insert(id.to_string(), early.clone());
        Ok(Some(early))
    }

    // ============================================================================================
    // CREATION
    // ============================================================================================

    /// Return the finished instance for `id`, running `callback` to create it
    /// if there is none yet.
    pub fn get_or_create<F>(&self, id: &str, callback: F) -> Result<Instance>
    where
        F: FnOnce() -> std::result::Result<Instance, BoxError>,
    {
        let guard = self.tiers.lock();
        if let Some(found) = self.get_finished(id) {
            return Ok(found);
        }
        if !self.lifecycle().allows_creation() {
            return Err(RegistryError::CreationNotAllowed { id: id.to_string() });
        }

        log::debug!("Creating shared instance of '{}'", id);
        let scope = CreationScope::open(self, &guard, id)?;
        let outcome = callback();
        let (ended, suppressed) = scope.close();

        match outcome {
            Ok(instance) => {
                ended?;
                self.commit(&guard, id, instance.clone())?;
                Ok(instance)
            }
            Err(source) => {
                {
                    let mut tiers = guard.borrow_mut();
                    tiers.early.remove(id);
                    tiers.factories.remove(id);
                }
                if let Some(existing) = self.get_finished(id) {
                    log::debug!(
                        "Creation of '{}' failed but an instance appeared meanwhile: {}",
                        id,
                        source
                    );
                    return Ok(existing);
                }
                guard.borrow_mut().registered.shift_remove(id);
                if let Err(err) = ended {
                    log::error!("Creation bookkeeping for '{}' is inconsistent: {}", id, err);
                }
                Err(RegistryError::ConstructionFailed {
                    id: id.to_string(),
                    source,
                    suppressed,
                })
            }
        }
    }

    /// Directly bind an externally built instance to `id`.
    ///
    /// Rejected with `CurrentlyInCreation` while `id` is being constructed,
    /// unless `id` is excluded from the reentrancy check.
    pub fn register_instance(&self, id: &str, instance: Instance) -> Result<()> {
        let guard = self.tiers.lock();
        if !self.lifecycle().allows_creation() {
            return Err(RegistryError::CreationNotAllowed { id: id.to_string() });
        }
        if self.tracker.is_checked_in_creation(id) {
            return Err(RegistryError::CurrentlyInCreation { id: id.to_string() });
        }
        self.commit(&guard, id, instance)
    }

    /// Expose a producer of early references for `id` while it is in creation.
    /// Ignored once `id` is finished.
    pub fn register_factory<F>(&self, id: &str, factory: F)
    where
        F: FnOnce() -> std::result::Result<Instance, BoxError> + Send + 'static,
    {
        let guard = self.tiers.lock();
        if self.finished.read().contains_key(id) {
            return;
        }
        let factory: EarlyFactory = Box::new(factory);
        let mut tiers = guard.borrow_mut();
        tiers.factories.insert(id.to_string(), factory);
        tiers.early.remove(id);
        tiers.registered.insert(id.to_string());
    }

    fn commit(&self, tiers: &RefCell<Tiers>, id: &str, instance: Instance) -> Result<()> {
        let mut finished = self.finished.write();
        if finished.contains_key(id) {
            return Err(RegistryError::DuplicateRegistration { id: id.to_string() });
        }
        finished.insert(id.to_string(), instance);
        let mut tiers = tiers.borrow_mut();
        tiers.factories.remove(id);
        tiers.early.remove(id);
        tiers.registered.insert(id.to_string());
        Ok(())
    }

    /// Record a non-fatal error against the outermost creation in progress.
    pub fn on_suppressed_error(&self, error: impl fmt::Display) {
        let guard = self.tiers.lock();
        let mut tiers = guard.borrow_mut();
        let Some(suppressed) = tiers.suppressed.as_mut() else {
            return;
        };
        if suppressed.len() < self.suppressed_error_limit {
            suppressed.push(error.to_string());
        } else {
            log::warn!("Dropping suppressed error beyond limit: {}", error);
        }
    }

    // ============================================================================================
    // REMOVAL & INTROSPECTION
    // ============================================================================================

    /// Purge every tier for `id`.
    pub fn remove(&self, id: &str) {
        let guard = self.tiers.lock();
        self.finished.write().remove(id);
        let mut tiers = guard.borrow_mut();
        tiers.early.remove(id);
        tiers.factories.remove(id);
        tiers.products.remove(id);
        tiers.registered.shift_remove(id);
    }

    /// Drop every tier, keeping the lifecycle state.
    pub fn clear(&self) {
        let guard = self.tiers.lock();
        self.finished.write().clear();
        let mut tiers = guard.borrow_mut();
        tiers.early.clear();
        tiers.factories.clear();
        tiers.products.clear();
        tiers.registered.clear();
    }

    /// Whether a finished instance exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.finished.read().contains_key(id)
    }

    /// Number of registered identifiers.
    pub fn count(&self) -> usize {
        self.tiers.lock().borrow().registered.len()
    }

    /// Registered identifiers in registration order.
    pub fn identifiers(&self) -> Vec<String> {
        self.tiers.lock().borrow().registered.iter().cloned().collect()
    }

    /// Which tier `id` currently sits in.
    pub fn state(&self, id: &str) -> CreationState {
        if self.contains(id) {
            return CreationState::Finished;
        }
        let guard = self.tiers.lock();
        let tiers = guard.borrow();
        if tiers.early.contains_key(id) {
            CreationState::EarlyExposed
        } else if tiers.factories.contains_key(id) {
            CreationState::FactoryRegistered
        } else if self.tracker.is_in_creation(id) {
            CreationState::InCreation
        } else {
            CreationState::Absent
        }
    }

    // ============================================================================================
    // CRATE-INTERNAL HOOKS
    // ============================================================================================

    /// Run `f` while holding the coarse lock.
    pub(crate) fn locked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.tiers.lock();
        f()
    }

    pub(crate) fn cached_product(&self, id: &str) -> Option<Instance> {
        self.tiers.lock().borrow().products.get(id).cloned()
    }

    pub(crate) fn store_product(&self, id: &str, product: Instance) {
        self.tiers
            .lock()
            .borrow_mut()
            .products
            .insert(id.to_string(), product);
    }

    /// Flip to `Destroying` once no other thread is mid-construction.
    ///
    /// Only an `Active` cache moves on; returns whether this call did so.
    pub(crate) fn begin_destruction(&self) -> bool {
        let _guard = self.tiers.lock();
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle != LifecycleState::Active {
            return false;
        }
        *lifecycle = LifecycleState::Destroying;
        true
    }

    pub(crate) fn finish_destruction(&self) {
        let _guard = self.tiers.lock();
        *self.lifecycle.write() = LifecycleState::Destroyed;
    }
}

impl Default for InstanceCache {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

impl fmt::Debug for InstanceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCache")
            .field("finished", &self.finished.read().len())
            .field("lifecycle", &self.lifecycle())
            .field("in_creation", &self.tracker.active())
            .finish_non_exhaustive()
    }
}

/// In-creation mark plus suppressed-error collection for one identifier,
/// both cleared on every exit path (including a panicking callback).
struct CreationScope<'a> {
    mark: Option<CreationMark<'a>>,
    tiers: &'a RefCell<Tiers>,
    records_suppressed: bool,
}

impl<'a> CreationScope<'a> {
    fn open(cache: &'a InstanceCache, tiers: &'a RefCell<Tiers>, id: &'a str) -> Result<Self> {
        let mark = cache.tracker.mark(id)?;
        let records_suppressed = {
            let mut tiers = tiers.borrow_mut();
            let outermost = tiers.suppressed.is_none();
            if outermost {
                tiers.suppressed = Some(Vec::new());
            }
            outermost
        };
        Ok(Self {
            mark: Some(mark),
            tiers,
            records_suppressed,
        })
    }

    /// End the creation; yields the tracker outcome and any suppressed errors
    /// this scope was collecting.
    fn close(mut self) -> (Result<()>, Vec<String>) {
        let suppressed = self.take_suppressed();
        let ended = match self.mark.take() {
            Some(mark) => mark.finish(),
            None => Ok(()),
        };
        (ended, suppressed)
    }

    fn take_suppressed(&self) -> Vec<String> {
        if !self.records_suppressed {
            return Vec::new();
        }
        self.tiers.borrow_mut().suppressed.take().unwrap_or_default()
    }
}

impl Drop for CreationScope<'_> {
    fn drop(&mut self) {
        if self.mark.is_some() {
            self.take_suppressed();
        }
    }
}
