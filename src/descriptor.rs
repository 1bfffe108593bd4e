//! # Target Descriptors
//!
//! A [`TargetDescriptor`] is the unit handed to the registry: it names the owner
//! that declares a handler, the handler's own short name, the symbolic name it
//! was declared under (possibly empty), an optional description, its kind and
//! the two capabilities the dispatcher needs at call time, the erased handler
//! and a factory for the owner's receiver.
//!
//! Descriptors are normally produced by the `#[targets]` attribute (see
//! [`crate::discovery`]), but they can be assembled by hand:
//!
//! ```rust
//! use correos::descriptor::{arg, reply, TargetDescriptor};
//!
//! #[derive(Default)]
//! struct Calc;
//!
//! let add = TargetDescriptor::request::<Calc>("add")
//!     .owner("Calc")
//!     .name("sum")
//!     .handler(|_calc, args| {
//!         let a: i64 = arg(args, 0)?;
//!         let b: i64 = arg(args, 1)?;
//!         reply(a + b)
//!     });
//!
//! assert_eq!(add.declared_name(), "sum");
//! ```

use crate::error::{ConstructionError, HandlerError, HandlerResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A receiver instance shared by every handler of one owner.
pub type Receiver = Arc<dyn Any + Send + Sync>;

/// Type-erased handler: receives the owner's instance and the positional arguments.
pub type HandlerFn = Arc<dyn Fn(&(dyn Any + Send + Sync), &[Value]) -> HandlerResult + Send + Sync>;

/// Stable identity of the type or module that declares handlers.
///
/// Keys the instance cache and batch unregistration.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(Arc<str>);

impl OwnerId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        OwnerId(id.into())
    }

    /// Identity derived from the Rust type path of `T`.
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        OwnerId::new(std::any::type_name::<T>())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({:?})", &*self.0)
    }
}

impl Borrow<str> for OwnerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        OwnerId::new(s)
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        OwnerId::new(s)
    }
}

/// Interaction shape of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Exactly one handler per name, returns a value
    Request,
    /// Zero or more subscribers per name, fire-and-forget
    Notification,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Request => f.write_str("request"),
            TargetKind::Notification => f.write_str("notification"),
        }
    }
}

/// Capability that produces a fresh receiver for an owner.
///
/// The instance cache calls it at most once per owner per cache lifetime.
///
/// A factory may dispatch to other owners, but not to its own: the owner's
/// receiver does not exist yet, so such a call fails with a
/// [`ConstructionError`] rather than waiting on itself.
pub trait ReceiverFactory: Send + Sync {
    fn construct(&self, owner: &OwnerId) -> Result<Receiver, ConstructionError>;
}

impl<F> ReceiverFactory for F
where
    F: Fn(&OwnerId) -> Result<Receiver, ConstructionError> + Send + Sync,
{
    fn construct(&self, owner: &OwnerId) -> Result<Receiver, ConstructionError> {
        self(owner)
    }
}

/// Factory that builds receivers with `T::default()`.
pub struct DefaultFactory<T>(PhantomData<fn() -> T>);

impl<T> DefaultFactory<T> {
    #[must_use]
    pub fn new() -> Self {
        DefaultFactory(PhantomData)
    }
}

impl<T> Default for DefaultFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default + Send + Sync + 'static> ReceiverFactory for DefaultFactory<T> {
    fn construct(&self, _owner: &OwnerId) -> Result<Receiver, ConstructionError> {
        Ok(Arc::new(T::default()))
    }
}

/// A named, invocable handler as handed to the registry.
#[derive(Clone)]
pub struct TargetDescriptor {
    owner: OwnerId,
    handler_name: Arc<str>,
    declared_name: Arc<str>,
    description: Option<Arc<str>>,
    kind: TargetKind,
    handler: HandlerFn,
    factory: Arc<dyn ReceiverFactory>,
}

impl TargetDescriptor {
    /// Start a descriptor for a handler declared on `T`, constructed by `factory`.
    ///
    /// The owner identity defaults to `T`'s type path and the declared name to
    /// empty; override them on the builder.
    pub fn builder<T, F>(kind: TargetKind, handler_name: &str, factory: F) -> DescriptorBuilder<T>
    where
        T: Send + Sync + 'static,
        F: ReceiverFactory + 'static,
    {
        DescriptorBuilder {
            kind,
            owner: OwnerId::of::<T>(),
            handler_name: Arc::from(handler_name),
            declared_name: Arc::from(""),
            description: None,
            factory: Arc::new(factory),
            _owner: PhantomData,
        }
    }

    /// Request descriptor on a default-constructible owner.
    pub fn request<T>(handler_name: &str) -> DescriptorBuilder<T>
    where
        T: Default + Send + Sync + 'static,
    {
        Self::builder(TargetKind::Request, handler_name, DefaultFactory::<T>::new())
    }

    /// Notification descriptor on a default-constructible owner.
    pub fn notification<T>(handler_name: &str) -> DescriptorBuilder<T>
    where
        T: Default + Send + Sync + 'static,
    {
        Self::builder(TargetKind::Notification, handler_name, DefaultFactory::<T>::new())
    }

    #[must_use]
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// The handler's own short name (the method name).
    #[must_use]
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// The symbolic name as authored; may be empty.
    #[must_use]
    pub fn declared_name(&self) -> &str {
        &self.declared_name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    #[must_use]
    pub fn factory(&self) -> &Arc<dyn ReceiverFactory> {
        &self.factory
    }

    /// Run the handler against `receiver`.
    pub(crate) fn invoke(&self, receiver: &(dyn Any + Send + Sync), args: &[Value]) -> HandlerResult {
        (self.handler)(receiver, args)
    }
}

impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDescriptor")
            .field("owner", &self.owner)
            .field("handler_name", &self.handler_name)
            .field("declared_name", &self.declared_name)
            .field("description", &self.description)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Builder returned by [`TargetDescriptor::builder`].
pub struct DescriptorBuilder<T> {
    kind: TargetKind,
    owner: OwnerId,
    handler_name: Arc<str>,
    declared_name: Arc<str>,
    description: Option<Arc<str>>,
    factory: Arc<dyn ReceiverFactory>,
    _owner: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> DescriptorBuilder<T> {
    /// Override the owner identity.
    #[must_use]
    pub fn owner(mut self, owner: impl Into<OwnerId>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Symbolic name the target is reachable under. Empty defers to `EmptyNameHandling`.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.declared_name = Arc::from(name);
        self
    }

    #[must_use]
    pub fn description(mut self, description: &str) -> Self {
        if description.is_empty() {
            self.description = None;
        } else {
            self.description = Some(Arc::from(description));
        }
        self
    }

    /// Finish the descriptor with a handler that runs on a `&T` receiver.
    pub fn handler<F>(self, handler_fn: F) -> TargetDescriptor
    where
        F: Fn(&T, &[Value]) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: HandlerFn = Arc::new(move |receiver: &(dyn Any + Send + Sync), args: &[Value]| {
            match receiver.downcast_ref::<T>() {
                Some(this) => handler_fn(this, args),
                None => Err(HandlerError::ReceiverType {
                    expected: std::any::type_name::<T>(),
                }),
            }
        });

        TargetDescriptor {
            owner: self.owner,
            handler_name: self.handler_name,
            declared_name: self.declared_name,
            description: self.description,
            kind: self.kind,
            handler,
            factory: self.factory,
        }
    }
}

/// Fail with [`HandlerError::Arity`] unless exactly `expected` arguments were passed.
pub fn expect_arity(args: &[Value], expected: usize) -> Result<(), HandlerError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(HandlerError::Arity {
            expected,
            actual: args.len(),
        })
    }
}

/// Decode positional argument `index`.
pub fn arg<A: DeserializeOwned>(args: &[Value], index: usize) -> Result<A, HandlerError> {
    let value = args.get(index).ok_or(HandlerError::Arity {
        expected: index + 1,
        actual: args.len(),
    })?;
    A::deserialize(value).map_err(|source| HandlerError::Argument { index, source })
}

/// Encode a handler's return value. `()` becomes `Value::Null`.
pub fn reply<R: Serialize>(value: R) -> HandlerResult {
    serde_json::to_value(value).map_err(HandlerError::Encode)
}
