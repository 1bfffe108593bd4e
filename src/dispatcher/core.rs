//! Dispatcher core module - lookup, receiver resolution and invocation.

use crate::descriptor::TargetDescriptor;
use crate::error::{HandlerError, MediatorError, Result, SubscriberFailure};
use crate::ids::DispatchId;
use crate::instance_cache::{panic_message, InstanceCache};
use crate::registry::Registry;
use crate::worker_pool::{Completion, Executor};
use may::sync::mpsc;
use serde_json::Value;
use smallvec::SmallVec;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Maximum arguments carried inline across an asynchronous hop
/// Most targets take a handful of arguments.
pub const MAX_INLINE_ARGS: usize = 4;

/// Owned argument list moved into asynchronous jobs.
pub type ArgVec = SmallVec<[Value; MAX_INLINE_ARGS]>;

/// Counters for dispatch activity.
///
/// All counters use relaxed atomics; they are for monitoring, not coordination.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    requests: AtomicU64,
    notifications: AtomicU64,
    lookup_misses: AtomicU64,
    handler_failures: AtomicU64,
    async_submitted: AtomicU64,
}

impl DispatchMetrics {
    /// Total `request` calls, synchronous or via a worker
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Total `notify` calls, synchronous or via a worker
    #[must_use]
    pub fn notification_count(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Calls addressed to a name nobody was bound to
    #[must_use]
    pub fn lookup_miss_count(&self) -> u64 {
        self.lookup_misses.load(Ordering::Relaxed)
    }

    /// Individual handler invocations that failed, panicked or could not get a receiver
    #[must_use]
    pub fn handler_failure_count(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Jobs accepted by the executor
    #[must_use]
    pub fn async_submitted_count(&self) -> u64 {
        self.async_submitted.load(Ordering::Relaxed)
    }
}

/// Invokes request and notification targets.
///
/// Stateless apart from the shared registry, instance cache and executor it
/// orchestrates; cloning is cheap and clones share everything.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    instances: Arc<InstanceCache>,
    executor: Arc<dyn Executor>,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        instances: Arc<InstanceCache>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Dispatcher {
            registry,
            instances,
            executor,
            metrics: Arc::new(DispatchMetrics::default()),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Invoke the request target bound to `name`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(value))` - The handler's result (`Value::Null` for unit handlers)
    /// * `Ok(None)` - No target is bound to `name`
    /// * `Err(_)` - The handler failed or its receiver could not be constructed
    pub fn request(&self, name: &str, args: &[Value]) -> Result<Option<Value>> {
        let dispatch_id = DispatchId::new();
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);

        let Some(target) = self.registry.request_target(name) else {
            self.metrics.lookup_misses.fetch_add(1, Ordering::Relaxed);
            debug!(
                dispatch_id = %dispatch_id,
                name = %name,
                "No request target bound"
            );
            return Ok(None);
        };

        debug!(
            dispatch_id = %dispatch_id,
            name = %name,
            owner = %target.owner(),
            handler_name = %target.handler_name(),
            arg_count = args.len(),
            "Request dispatched"
        );

        self.invoke(dispatch_id, name, &target, args).map(Some)
    }

    /// Invoke every subscriber of `name`, in subscription order.
    ///
    /// # Returns
    ///
    /// * `Ok(n)` - All `n` subscribers ran successfully (`0` when nobody is subscribed)
    /// * `Err(MediatorError::SubscriberFailures { .. })` - Every subscriber ran; some failed
    pub fn notify(&self, name: &str, args: &[Value]) -> Result<usize> {
        let dispatch_id = DispatchId::new();
        self.metrics.notifications.fetch_add(1, Ordering::Relaxed);

        // Snapshot: registration changes during the loop do not affect it.
        let Some(subscribers) = self.registry.subscribers(name) else {
            self.metrics.lookup_misses.fetch_add(1, Ordering::Relaxed);
            debug!(
                dispatch_id = %dispatch_id,
                name = %name,
                "No notification subscribers"
            );
            return Ok(0);
        };

        debug!(
            dispatch_id = %dispatch_id,
            name = %name,
            subscribers = subscribers.len(),
            "Notification dispatched"
        );

        let mut failures = Vec::new();
        for target in &subscribers {
            if let Err(error) = self.invoke(dispatch_id, name, target, args) {
                failures.push(SubscriberFailure {
                    owner: target.owner().clone(),
                    handler: target.handler_name().to_string(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(subscribers.len())
        } else {
            warn!(
                dispatch_id = %dispatch_id,
                name = %name,
                invoked = subscribers.len(),
                failed = failures.len(),
                "Notification completed with subscriber failures"
            );
            Err(MediatorError::SubscriberFailures {
                name: name.to_string(),
                invoked: subscribers.len(),
                failures,
            })
        }
    }

    /// Run [`Dispatcher::request`] on the executor.
    pub fn request_async(&self, name: &str, args: &[Value]) -> Completion<Option<Value>> {
        self.spawn(name, args, |dispatcher, name, args| dispatcher.request(name, args))
    }

    /// Run [`Dispatcher::notify`] on the executor.
    pub fn notify_async(&self, name: &str, args: &[Value]) -> Completion<usize> {
        self.spawn(name, args, |dispatcher, name, args| dispatcher.notify(name, args))
    }

    fn spawn<T, F>(&self, name: &str, args: &[Value], work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&Dispatcher, &str, &[Value]) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let refused_tx = tx.clone();
        let this = self.clone();
        let job_name = name.to_string();
        let args: ArgVec = args.iter().cloned().collect();

        let submitted = self.executor.submit(Box::new(move || {
            let outcome = work(&this, job_name.as_str(), args.as_slice());
            if tx.send(outcome).is_err() {
                debug!(name = %job_name, "Completion dropped before the result arrived");
            }
        }));

        match submitted {
            Ok(()) => {
                self.metrics.async_submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(name = %name, error = %e, "Executor refused asynchronous dispatch");
                if refused_tx.send(Err(e)).is_err() {
                    debug!(name = %name, "Completion dropped before the result arrived");
                }
            }
        }
        drop(refused_tx);

        Completion::new(name.to_string(), rx)
    }

    /// Resolve the receiver and run one handler with panic containment.
    fn invoke(
        &self,
        dispatch_id: DispatchId,
        name: &str,
        target: &TargetDescriptor,
        args: &[Value],
    ) -> Result<Value> {
        let receiver = match self.instances.get(target.owner(), target.factory().as_ref()) {
            Ok(receiver) => receiver,
            Err(source) => {
                self.metrics.handler_failures.fetch_add(1, Ordering::Relaxed);
                return Err(MediatorError::Construction {
                    owner: target.owner().clone(),
                    source,
                });
            }
        };

        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| target.invoke(receiver.as_ref(), args)))
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(value) => {
                debug!(
                    dispatch_id = %dispatch_id,
                    name = %name,
                    owner = %target.owner(),
                    handler_name = %target.handler_name(),
                    execution_time_us = start.elapsed().as_micros() as u64,
                    "Handler execution complete"
                );
                Ok(value)
            }
            Err(source) => {
                self.metrics.handler_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    dispatch_id = %dispatch_id,
                    name = %name,
                    owner = %target.owner(),
                    handler_name = %target.handler_name(),
                    error = %source,
                    "Handler failed"
                );
                Err(MediatorError::Handler {
                    target: name.to_string(),
                    source,
                })
            }
        }
    }
}
