use crate::errors::{RegistryError, Result};
use crate::registry::cache::InstanceCache;
use crate::types::{Instance, NullInstance, PostProcessor, ProductionStep};
use std::fmt;

/// **FACTORY OBJECT RESOLVER**
///
/// **PURPOSE**: Serves values obtained through a production step rather than
/// direct construction. Shared products are cached next to the instance tiers
/// under the same coarse lock; non-shared products are produced (and
/// post-processed) on every call.
#[derive(Default, Clone)]
pub struct FactoryObjectResolver {
    post_processor: Option<PostProcessor>,
}

impl FactoryObjectResolver {
    /// Resolver without post-processing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the post-processing step applied to produced values.
    pub fn with_post_processor(mut self, post_processor: PostProcessor) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    /// Resolve the product for `id`.
    ///
    /// Products are only cached when `is_shared` and `cache` holds a finished
    /// instance for `id`. While `id` is in creation a post-processed request
    /// gets the raw, uncached value so a half-wired product is never cached.
    pub fn resolve(
        &self,
        cache: &InstanceCache,
        id: &str,
        step: &dyn ProductionStep,
        is_shared: bool,
        should_post_process: bool,
    ) -> Result<Instance> {
        if is_shared && cache.contains(id) {
            return cache.locked(|| self.resolve_shared(cache, id, step, should_post_process));
        }

        let product = self.produce(cache, id, step)?;
        if should_post_process {
            return self.post_process(product, id);
        }
        Ok(product)
    }

    fn resolve_shared(
        &self,
        cache: &InstanceCache,
        id: &str,
        step: &dyn ProductionStep,
        should_post_process: bool,
    ) -> Result<Instance> {
        if let Some(cached) = cache.cached_product(id) {
            return Ok(cached);
        }
        let mut product = self.produce(cache, id, step)?;
        // A re-entrant call from inside the step may have cached a product already.
        if let Some(already_there) = cache.cached_product(id) {
            return Ok(already_there);
        }

        if should_post_process {
            if cache.tracker().is_in_creation(id) {
                log::debug!("Returning unprocessed product of '{}' (still in creation)", id);
                return Ok(product);
            }
            let mark = cache.tracker().mark(id)?;
            let processed = self.post_process(product, id);
            mark.finish()?;
            product = processed?;
        }

        if cache.contains(id) {
            cache.store_product(id, product.clone());
        }
        Ok(product)
    }

    fn produce(
        &self,
        cache: &InstanceCache,
        id: &str,
        step: &dyn ProductionStep,
    ) -> Result<Instance> {
        let produced = step
            .produce()
            .map_err(|source| RegistryError::ConstructionFailed {
                id: id.to_string(),
                source,
                suppressed: Vec::new(),
            })?;
        match produced {
            Some(product) => Ok(product),
            None if cache.tracker().is_in_creation(id) => {
                Err(RegistryError::ProductionDuringCreationReturnedNull { id: id.to_string() })
            }
            None => Ok(NullInstance::new_instance()),
        }
    }

    fn post_process(&self, product: Instance, id: &str) -> Result<Instance> {
        match &self.post_processor {
            Some(post_process) => {
                post_process(product, id).map_err(|source| RegistryError::PostProcessingFailed {
                    id: id.to_string(),
                    source,
                })
            }
            None => Ok(product),
        }
    }

    /// Declared product type of `step`; failures are logged and treated as unknown.
    pub fn product_type(&self, step: &dyn ProductionStep) -> Option<&'static str> {
        match step.product_type() {
            Ok(product_type) => product_type,
            Err(err) => {
                log::warn!(
                    "Production step failed to report its product type, treating it as unknown: {}",
                    err
                );
                None
            }
        }
    }

    /// Shared product cached for `id`, if any.
    pub fn cached_product(&self, cache: &InstanceCache, id: &str) -> Option<Instance> {
        cache.cached_product(id)
    }
}

impl fmt::Debug for FactoryObjectResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryObjectResolver")
            .field("post_processor", &self.post_processor.is_some())
            .finish()
    }
}
