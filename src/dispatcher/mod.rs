//! # Dispatcher Module
//!
//! The dispatcher turns a name and an argument list into handler invocations.
//!
//! ## Request Flow
//!
//! 1. Look the name up in the [`Registry`](crate::registry::Registry) (read lock, clone, release)
//! 2. Fetch or construct the owner's receiver through the [`InstanceCache`](crate::instance_cache::InstanceCache)
//! 3. Invoke the handler outside any lock, with panic containment
//!
//! ## Notifications
//!
//! `notify` iterates a snapshot of the subscriber list taken at call time, in
//! subscription order. Each subscriber is isolated: a failing or panicking
//! subscriber is recorded and the remaining ones still run. Failures are
//! reported together once the iteration is complete.
//!
//! ## Asynchronous Dispatch
//!
//! `request_async` / `notify_async` submit the synchronous call to an injected
//! [`Executor`](crate::worker_pool::Executor) and return a
//! [`Completion`](crate::worker_pool::Completion). Ordering between async calls
//! is whatever the executor's queue gives; there is no cancellation.
//!
//! ## Error Handling
//!
//! - Unknown names are not errors: `request` yields `Ok(None)`, `notify` yields `Ok(0)`
//! - Handler failures and panics become [`MediatorError::Handler`](crate::error::MediatorError::Handler)
//! - Factory failures become [`MediatorError::Construction`](crate::error::MediatorError::Construction)

mod core;

pub use self::core::{ArgVec, DispatchMetrics, Dispatcher, MAX_INLINE_ARGS};
