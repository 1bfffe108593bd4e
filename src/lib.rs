//! # correos
//!
//! **correos** is an in-process mediator: components register named handlers and
//! other components reach them by name, without holding references to each other.
//!
//! ## Overview
//!
//! Two interaction shapes are supported:
//!
//! - **Requests** have exactly one handler per name and return a value.
//! - **Notifications** have any number of subscribers per name and return nothing.
//!
//! Handlers are methods on an *owner* type. The owner's receiver is built lazily
//! on first use, at most once, and shared by every handler of that owner.
//! Both shapes can be dispatched synchronously or handed to an executor.
//!
//! ## Architecture
//!
//! - **[`descriptor`]** - Target descriptors, receiver factories, argument helpers
//! - **[`discovery`]** - The [`Owner`] trait, [`Catalog`], registration policy
//! - **[`registry`]** - Name tables for requests and notification subscribers
//! - **[`instance_cache`]** - Lazy, at-most-once receiver construction
//! - **[`dispatcher`]** - Synchronous and asynchronous dispatch
//! - **[`worker_pool`]** - Executor seam and the `may` coroutine worker pool
//! - **[`mediator`]** - The facade tying the pieces together
//! - **[`runtime_config`]** - Environment and YAML configuration
//! - **[`logging`]** - Optional `tracing` subscriber setup
//!
//! ### Dispatch Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Caller
//!     participant Mediator
//!     participant Registry
//!     participant Cache as InstanceCache
//!     participant Handler
//!
//!     Caller->>Mediator: request("sum", [1, 2])
//!     Mediator->>Registry: request_target("sum")
//!     alt Name Not Bound
//!         Registry-->>Caller: Ok(None)
//!     end
//!     Registry-->>Mediator: TargetDescriptor (clone)
//!     Mediator->>Cache: get(owner, factory)
//!     Note over Cache: factory runs once per owner
//!     Cache-->>Mediator: receiver
//!     Mediator->>Handler: invoke(receiver, args)
//!     alt Handler Fails or Panics
//!         Handler-->>Caller: Err(MediatorError::Handler)
//!     end
//!     Handler-->>Caller: Ok(Some(value))
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use correos::{targets, Mediator, MediatorConfig, Value};
//!
//! #[derive(Default)]
//! struct Calc;
//!
//! #[targets(labeled)]
//! impl Calc {
//!     #[request(name = "sum")]
//!     fn add(&self, a: i64, b: i64) -> i64 {
//!         a + b
//!     }
//! }
//!
//! let runtime = tokio::runtime::Runtime::new().expect("runtime");
//! let mediator = Mediator::new(MediatorConfig::default(), Arc::new(runtime.handle().clone()));
//! mediator.register_owner::<Calc>();
//!
//! let sum = mediator.request("sum", &[Value::from(2), Value::from(3)]).expect("dispatch");
//! assert_eq!(sum, Some(Value::from(5)));
//! ```
//!
//! ## Runtime Considerations
//!
//! Synchronous dispatch runs on the caller's thread. Asynchronous dispatch goes
//! through an [`Executor`]: either the bundled [`WorkerPool`] on the `may`
//! coroutine runtime (stack size via `CORREOS_STACK_SIZE`) or a tokio
//! `runtime::Handle`, which runs jobs on its blocking pool.

extern crate self as correos;

pub mod descriptor;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod instance_cache;
pub mod logging;
pub mod mediator;
pub mod registry;
pub mod runtime_config;
pub mod worker_pool;

pub use correos_macros::targets;
pub use descriptor::{OwnerId, TargetDescriptor, TargetKind};
pub use discovery::{Catalog, DiscoveryAdapter, Owner, RegistrationPolicy};
pub use dispatcher::{DispatchMetrics, Dispatcher};
pub use error::{HandlerError, MediatorError};
pub use mediator::Mediator;
pub use registry::{EmptyNameHandling, Registration, Registry};
pub use runtime_config::MediatorConfig;
pub use serde_json::Value;
pub use worker_pool::{Completion, Executor, WorkerPool, WorkerPoolConfig};
