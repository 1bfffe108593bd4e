//! The public face of the crate: one object exposing registration and dispatch.
//!
//! A [`Mediator`] owns a [`Registry`] and an [`InstanceCache`] and drives them
//! through a [`Dispatcher`]. It is an ordinary value with no global state, so
//! independent mediators can coexist (in tests, for instance). Clones share
//! the same registry, cache and executor.

use crate::descriptor::{OwnerId, TargetDescriptor};
use crate::discovery::{discover_owner, DiscoveryAdapter, Owner};
use crate::dispatcher::{DispatchMetrics, Dispatcher};
use crate::error::Result;
use crate::instance_cache::InstanceCache;
use crate::registry::{Registration, Registry};
use crate::runtime_config::MediatorConfig;
use crate::worker_pool::{Completion, Executor, WorkerPool};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// In-process mediator for request and notification targets.
#[derive(Clone)]
pub struct Mediator {
    config: MediatorConfig,
    registry: Arc<Registry>,
    instances: Arc<InstanceCache>,
    dispatcher: Dispatcher,
}

impl Mediator {
    /// Create a mediator that runs asynchronous dispatches on `executor`.
    #[must_use]
    pub fn new(config: MediatorConfig, executor: Arc<dyn Executor>) -> Self {
        let registry = Arc::new(Registry::new(config.empty_name_handling));
        let instances = Arc::new(InstanceCache::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&instances), executor);

        info!(
            registration_policy = ?config.registration_policy,
            empty_name_handling = ?config.empty_name_handling,
            "Mediator created"
        );

        Mediator {
            config,
            registry,
            instances,
            dispatcher,
        }
    }

    /// Create a mediator backed by a `may` [`WorkerPool`] sized from `config.workers`.
    ///
    /// # Safety
    ///
    /// Spawns coroutines; see [`WorkerPool::new`].
    pub unsafe fn with_worker_pool(config: MediatorConfig) -> Self {
        // SAFETY: forwarded to the caller.
        let pool = unsafe { WorkerPool::new(config.workers.clone()) };
        Self::new(config, Arc::new(pool))
    }

    #[must_use]
    pub fn config(&self) -> &MediatorConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn instances(&self) -> &Arc<InstanceCache> {
        &self.instances
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        self.dispatcher.metrics()
    }

    /// Bind a single descriptor.
    pub fn register(&self, descriptor: TargetDescriptor) -> Registration {
        self.registry.register(descriptor)
    }

    /// Bind a sequence of descriptors.
    pub fn register_batch<I>(&self, descriptors: I) -> Vec<Registration>
    where
        I: IntoIterator<Item = TargetDescriptor>,
    {
        self.registry.register_batch(descriptors)
    }

    /// Bind every target declared by `T`, if the registration policy admits it.
    pub fn register_owner<T: Owner>(&self) -> Vec<Registration> {
        self.registry
            .register_batch(discover_owner::<T>(self.config.registration_policy))
    }

    /// Bind every target the adapter discovers under the registration policy.
    pub fn register_catalog<A>(&self, adapter: &A) -> Vec<Registration>
    where
        A: DiscoveryAdapter + ?Sized,
    {
        self.registry
            .register_batch(adapter.discover(self.config.registration_policy))
    }

    /// Remove every binding declared by `owner`.
    pub fn unregister(&self, owner: &OwnerId) -> usize {
        self.registry.unregister(owner)
    }

    /// Remove every binding declared by `T`.
    pub fn unregister_owner<T: Owner>(&self) -> usize {
        self.registry.unregister(&T::owner_id())
    }

    /// Remove every binding of every owner the adapter knows.
    pub fn unregister_catalog<A>(&self, adapter: &A) -> usize
    where
        A: DiscoveryAdapter + ?Sized,
    {
        adapter
            .owner_ids()
            .iter()
            .map(|owner| self.registry.unregister(owner))
            .sum()
    }

    /// Clear every binding and drop every cached receiver.
    pub fn unregister_all(&self) {
        self.registry.unregister_all();
        self.instances.reset();
    }

    /// See [`Dispatcher::request`].
    pub fn request(&self, name: &str, args: &[Value]) -> Result<Option<Value>> {
        self.dispatcher.request(name, args)
    }

    /// See [`Dispatcher::notify`].
    pub fn notify(&self, name: &str, args: &[Value]) -> Result<usize> {
        self.dispatcher.notify(name, args)
    }

    /// See [`Dispatcher::request_async`].
    pub fn request_async(&self, name: &str, args: &[Value]) -> Completion<Option<Value>> {
        self.dispatcher.request_async(name, args)
    }

    /// See [`Dispatcher::notify_async`].
    pub fn notify_async(&self, name: &str, args: &[Value]) -> Completion<usize> {
        self.dispatcher.notify_async(name, args)
    }
}
