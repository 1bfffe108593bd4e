//! # Registry
//!
//! Holds the name → handler bindings.
//!
//! - Request names bind exactly one descriptor. Re-registering a bound name is
//!   ignored: the first registration stays authoritative.
//! - Notification names bind an ordered subscriber list. Insertion order is
//!   subscription order and identical descriptors are not deduplicated.
//!
//! All mutations and lookups go through one `RwLock` scoped to the two maps.
//! Lookups hand out clones (a descriptor is a handful of `Arc`s), so no lock is
//! held while a handler runs.

use crate::descriptor::{OwnerId, TargetDescriptor, TargetKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// How a descriptor with an empty declared name is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyNameHandling {
    /// Use the handler's own short name
    AssignMethodName,
    /// Use `owner + "." + handler short name`
    #[default]
    AssignFullMethodName,
    /// Discard the descriptor
    Skip,
}

impl EmptyNameHandling {
    /// Parse from a config string such as `assign_method_name` (case-insensitive, `-` or `_`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "assign_method_name" => Some(Self::AssignMethodName),
            "assign_full_method_name" => Some(Self::AssignFullMethodName),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }

    /// The key a descriptor is stored under, or `None` when it must be skipped.
    #[must_use]
    pub fn resolve(self, descriptor: &TargetDescriptor) -> Option<String> {
        let declared = descriptor.declared_name();
        if !declared.is_empty() {
            return Some(declared.to_string());
        }
        match self {
            EmptyNameHandling::AssignFullMethodName => Some(format!(
                "{}.{}",
                descriptor.owner(),
                descriptor.handler_name()
            )),
            EmptyNameHandling::AssignMethodName => Some(descriptor.handler_name().to_string()),
            EmptyNameHandling::Skip => None,
        }
    }
}

/// What a single `register` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// A new request binding was created
    Bound(String),
    /// The request name was already bound; nothing changed
    Duplicate(String),
    /// The descriptor was appended to a notification's subscribers
    Subscribed { name: String, position: usize },
    /// The declared name was empty and the policy is `Skip`
    Skipped,
}

impl Registration {
    /// True when the call created a binding.
    #[must_use]
    pub fn is_binding(&self) -> bool {
        matches!(self, Registration::Bound(_) | Registration::Subscribed { .. })
    }
}

#[derive(Default)]
struct Tables {
    requests: HashMap<String, TargetDescriptor>,
    notifications: HashMap<String, Vec<TargetDescriptor>>,
}

/// Name → handler bindings for requests and notifications.
pub struct Registry {
    tables: RwLock<Tables>,
    empty_names: EmptyNameHandling,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(EmptyNameHandling::default())
    }
}

impl Registry {
    #[must_use]
    pub fn new(empty_names: EmptyNameHandling) -> Self {
        Registry {
            tables: RwLock::new(Tables::default()),
            empty_names,
        }
    }

    #[must_use]
    pub fn empty_name_handling(&self) -> EmptyNameHandling {
        self.empty_names
    }

    /// Bind one descriptor under its resolved name.
    pub fn register(&self, descriptor: TargetDescriptor) -> Registration {
        let Some(name) = self.empty_names.resolve(&descriptor) else {
            warn!(
                owner = %descriptor.owner(),
                handler_name = %descriptor.handler_name(),
                kind = %descriptor.kind(),
                "Skipping target with empty name"
            );
            return Registration::Skipped;
        };

        let mut tables = self.write();
        match descriptor.kind() {
            TargetKind::Request => {
                if let Some(existing) = tables.requests.get(&name) {
                    warn!(
                        name = %name,
                        owner = %descriptor.owner(),
                        handler_name = %descriptor.handler_name(),
                        bound_owner = %existing.owner(),
                        "Request target already bound - ignoring duplicate"
                    );
                    return Registration::Duplicate(name);
                }
                debug!(
                    name = %name,
                    owner = %descriptor.owner(),
                    handler_name = %descriptor.handler_name(),
                    total_requests = tables.requests.len() + 1,
                    "Request target bound"
                );
                tables.requests.insert(name.clone(), descriptor);
                Registration::Bound(name)
            }
            TargetKind::Notification => {
                let subscribers = tables.notifications.entry(name.clone()).or_default();
                let position = subscribers.len();
                debug!(
                    name = %name,
                    owner = %descriptor.owner(),
                    handler_name = %descriptor.handler_name(),
                    position = position,
                    "Notification subscriber added"
                );
                subscribers.push(descriptor);
                Registration::Subscribed { name, position }
            }
        }
    }

    /// Apply [`Registry::register`] to every descriptor, in order.
    pub fn register_batch<I>(&self, descriptors: I) -> Vec<Registration>
    where
        I: IntoIterator<Item = TargetDescriptor>,
    {
        let outcomes: Vec<Registration> = descriptors
            .into_iter()
            .map(|d| self.register(d))
            .collect();
        info!(
            submitted = outcomes.len(),
            bound = outcomes.iter().filter(|r| r.is_binding()).count(),
            "Registered target batch"
        );
        outcomes
    }

    /// Remove every binding declared by `owner`. Returns how many were removed.
    ///
    /// Request bindings of the owner are dropped whole; notification lists lose
    /// only that owner's entries, and a list left empty is removed.
    pub fn unregister(&self, owner: &OwnerId) -> usize {
        let mut tables = self.write();

        let before = tables.requests.len();
        tables.requests.retain(|_, d| d.owner() != owner);
        let mut removed = before - tables.requests.len();

        tables.notifications.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|d| d.owner() != owner);
            removed += before - subscribers.len();
            !subscribers.is_empty()
        });

        info!(owner = %owner, removed = removed, "Owner unregistered");
        removed
    }

    /// Clear both tables.
    pub fn unregister_all(&self) {
        let mut tables = self.write();
        let requests = tables.requests.len();
        let notifications = tables.notifications.len();
        tables.requests.clear();
        tables.notifications.clear();
        info!(
            requests = requests,
            notifications = notifications,
            "All targets unregistered"
        );
    }

    /// The descriptor bound to a request name.
    #[must_use]
    pub fn request_target(&self, name: &str) -> Option<TargetDescriptor> {
        self.read().requests.get(name).cloned()
    }

    /// Snapshot of a notification's subscribers, in subscription order.
    #[must_use]
    pub fn subscribers(&self, name: &str) -> Option<Vec<TargetDescriptor>> {
        self.read().notifications.get(name).cloned()
    }

    #[must_use]
    pub fn contains_request(&self, name: &str) -> bool {
        self.read().requests.contains_key(name)
    }

    #[must_use]
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.read().notifications.get(name).map_or(0, Vec::len)
    }

    /// Bound request names, sorted.
    #[must_use]
    pub fn request_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().requests.keys().cloned().collect();
        names.sort();
        names
    }

    /// Notification names with at least one subscriber, sorted.
    #[must_use]
    pub fn notification_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().notifications.keys().cloned().collect();
        names.sort();
        names
    }

    /// Description of the request target, or of the first subscriber that has one.
    #[must_use]
    pub fn description(&self, name: &str) -> Option<String> {
        let tables = self.read();
        if let Some(d) = tables.requests.get(name) {
            return d.description().map(str::to_string);
        }
        tables
            .notifications
            .get(name)?
            .iter()
            .find_map(|d| d.description().map(str::to_string))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let tables = self.read();
        tables.requests.is_empty() && tables.notifications.is_empty()
    }

    // The maps stay consistent even if a holder panicked, since no handler
    // code runs under the lock.
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}
