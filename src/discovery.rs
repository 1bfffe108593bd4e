//! # Discovery
//!
//! The registry never inspects code; it consumes descriptors. This module is
//! the boundary that produces them.
//!
//! - [`Owner`] is implemented by each type that declares targets, usually via
//!   the `#[targets]` attribute on its `impl` block.
//! - [`Catalog`] groups owners into a unit that can be registered and
//!   unregistered as a whole.
//! - [`DiscoveryAdapter`] is the seam the mediator consumes: it yields
//!   descriptors already filtered by [`RegistrationPolicy`].
//!
//! ```rust
//! use correos::{targets, Catalog, DiscoveryAdapter, RegistrationPolicy};
//!
//! #[derive(Default)]
//! struct Calc;
//!
//! #[targets(owner = "Calc", labeled)]
//! impl Calc {
//!     #[request(name = "sum", description = "Adds two integers")]
//!     fn add(&self, a: i64, b: i64) -> i64 {
//!         a + b
//!     }
//! }
//!
//! let catalog = Catalog::new().with::<Calc>();
//! let found = catalog.discover(RegistrationPolicy::LabeledOnly);
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].declared_name(), "sum");
//! ```

use crate::descriptor::{OwnerId, TargetDescriptor};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which owners discovery considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Only owners carrying the explicit opt-in label
    #[default]
    LabeledOnly,
    /// Every owner
    All,
}

impl RegistrationPolicy {
    /// Parse from a config string such as `labeled_only` (case-insensitive, `-` or `_`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "labeled_only" | "labelled_only" => Some(Self::LabeledOnly),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// Whether an owner with the given label state passes this policy.
    #[must_use]
    pub fn admits(self, labeled: bool) -> bool {
        match self {
            RegistrationPolicy::LabeledOnly => labeled,
            RegistrationPolicy::All => true,
        }
    }
}

/// A type that declares request and notification targets.
pub trait Owner: Send + Sync + 'static {
    /// Whether the owner opted in to registration under `LabeledOnly`.
    const LABELED: bool = false;

    /// Identity used for instance caching and unregistration.
    fn owner_id() -> OwnerId {
        OwnerId::of::<Self>()
    }

    /// Every target the owner declares, labeled or not.
    fn targets() -> Vec<TargetDescriptor>;
}

/// Produces descriptors for registration.
pub trait DiscoveryAdapter {
    /// Descriptors of every owner admitted by `policy`.
    fn discover(&self, policy: RegistrationPolicy) -> Vec<TargetDescriptor>;

    /// Identities of every owner this adapter knows, admitted or not.
    fn owner_ids(&self) -> Vec<OwnerId>;
}

/// Descriptors of `T`, or nothing when `policy` does not admit it.
pub fn discover_owner<T: Owner>(policy: RegistrationPolicy) -> Vec<TargetDescriptor> {
    if !policy.admits(T::LABELED) {
        debug!(
            owner = %T::owner_id(),
            policy = ?policy,
            "Owner not labeled - skipped by registration policy"
        );
        return Vec::new();
    }
    T::targets()
}

#[derive(Clone, Copy)]
struct OwnerEntry {
    owner_id: fn() -> OwnerId,
    labeled: bool,
    targets: fn() -> Vec<TargetDescriptor>,
}

/// A named group of owners, registered and unregistered together.
#[derive(Clone, Default)]
pub struct Catalog {
    owners: Vec<OwnerEntry>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an owner (builder form).
    #[must_use]
    pub fn with<T: Owner>(mut self) -> Self {
        self.add::<T>();
        self
    }

    /// Add an owner.
    pub fn add<T: Owner>(&mut self) -> &mut Self {
        self.owners.push(OwnerEntry {
            owner_id: T::owner_id,
            labeled: T::LABELED,
            targets: T::targets,
        });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl DiscoveryAdapter for Catalog {
    fn discover(&self, policy: RegistrationPolicy) -> Vec<TargetDescriptor> {
        let mut found = Vec::new();
        for entry in &self.owners {
            if !policy.admits(entry.labeled) {
                let owner = (entry.owner_id)();
                debug!(
                    owner = %owner,
                    policy = ?policy,
                    "Owner not labeled - skipped by registration policy"
                );
                continue;
            }
            found.extend((entry.targets)());
        }
        found
    }

    fn owner_ids(&self) -> Vec<OwnerId> {
        self.owners.iter().map(|entry| (entry.owner_id)()).collect()
    }
}
