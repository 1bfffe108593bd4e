//! # Instance Cache
//!
//! Lazily materialises and retains exactly one receiver per owner.
//!
//! Each owner gets its own [`OnceCell`] slot inside a [`DashMap`]. The map's
//! shard lock is held only long enough to fetch or insert the slot; the factory
//! itself runs under the slot's single-initialisation guard, so concurrent
//! first use of one owner constructs once while other owners proceed
//! unhindered. A factory that fails leaves the slot empty and the next caller
//! retries.
//!
//! A factory that asks for its own owner's receiver (directly, or by
//! dispatching to one of the owner's targets) would wait on its own slot
//! forever. The cache tracks the owners under construction on the current
//! thread and fails such a call with a [`ConstructionError`] instead.

use crate::descriptor::{OwnerId, Receiver, ReceiverFactory};
use crate::error::ConstructionError;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

type Slot = Arc<OnceCell<Receiver>>;

thread_local! {
    static CONSTRUCTING: RefCell<Vec<OwnerId>> = const { RefCell::new(Vec::new()) };
}

/// Marks `owner` as under construction on this thread until dropped.
struct ConstructionGuard;

impl ConstructionGuard {
    fn enter(owner: &OwnerId) -> Self {
        CONSTRUCTING.with(|owners| owners.borrow_mut().push(owner.clone()));
        ConstructionGuard
    }

    fn is_constructing(owner: &OwnerId) -> bool {
        CONSTRUCTING.with(|owners| owners.borrow().contains(owner))
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        CONSTRUCTING.with(|owners| {
            owners.borrow_mut().pop();
        });
    }
}

/// Owner-keyed cache of singleton receivers.
#[derive(Default)]
pub struct InstanceCache {
    instances: DashMap<OwnerId, Slot>,
}

impl InstanceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the owner's receiver, constructing it with `factory` on first use.
    pub fn get(
        &self,
        owner: &OwnerId,
        factory: &dyn ReceiverFactory,
    ) -> Result<Receiver, ConstructionError> {
        let slot = self.slot(owner);
        if let Some(receiver) = slot.get() {
            return Ok(Arc::clone(receiver));
        }

        if ConstructionGuard::is_constructing(owner) {
            error!(owner = %owner, "Receiver requested by its own factory");
            return Err(ConstructionError(format!(
                "receiver for '{owner}' requested while it is being constructed"
            )));
        }

        slot.get_or_try_init(|| {
            debug!(owner = %owner, "Constructing receiver");
            let _guard = ConstructionGuard::enter(owner);
            match catch_unwind(AssertUnwindSafe(|| factory.construct(owner))) {
                Ok(Ok(receiver)) => Ok(receiver),
                Ok(Err(e)) => {
                    error!(owner = %owner, error = %e, "Receiver construction failed");
                    Err(e)
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(owner = %owner, panic_message = %message, "Receiver factory panicked");
                    Err(ConstructionError(format!("factory panicked: {message}")))
                }
            }
        })
        .map(Arc::clone)
    }

    /// The owner's receiver if it has already been constructed.
    #[must_use]
    pub fn peek(&self, owner: &OwnerId) -> Option<Receiver> {
        self.instances
            .get(owner)
            .and_then(|slot| slot.get().map(Arc::clone))
    }

    /// Drop the owner's receiver; the next dispatch constructs a new one.
    pub fn evict(&self, owner: &OwnerId) -> bool {
        self.instances.remove(owner).is_some()
    }

    /// Drop every cached receiver.
    pub fn reset(&self) {
        let dropped = self.instances.len();
        self.instances.clear();
        debug!(dropped = dropped, "Instance cache reset");
    }

    /// Number of owners with a constructed receiver.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, owner: &OwnerId) -> Slot {
        if let Some(slot) = self.instances.get(owner) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.instances.entry(owner.clone()).or_default().value())
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
