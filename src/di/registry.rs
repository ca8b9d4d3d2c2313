use crate::di::descriptor::{ArgValue, Callable};
use crate::error::{Result, WeftError};
use dashmap::DashMap;
use std::borrow::Cow;
use std::sync::Arc;

/// Maximum transitive alias hops before the chain is declared circular.
pub const ALIAS_DEPTH_LIMIT: usize = 32;

/// Abstract identifier a binding is registered under.
///
/// Typically the name of a trait or concrete type, or a free-form alias
/// string. `ServiceId::of::<T>()` derives the canonical id for a type.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ServiceId(Cow<'static, str>);

impl ServiceId {
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        Self(id.into())
    }

    /// The canonical id for a Rust type.
    pub fn of<T: ?Sized>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for ServiceId {
    fn from(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }
}

impl From<String> for ServiceId {
    fn from(id: String) -> Self {
        Self(Cow::Owned(id))
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a bound id produces an instance.
#[derive(Clone)]
pub enum Resolution {
    /// Construct through a type descriptor; dependencies are resolved
    /// per parameter.
    Class(Arc<Callable>),
    /// Invoke a factory closure; its parameters are resolved the same
    /// way as constructor parameters.
    Factory(Arc<Callable>),
    /// Return an existing instance directly.
    Instance(ArgValue),
    /// Defer to another id.
    Alias(ServiceId),
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Class(c) => write!(f, "Class({})", c.target()),
            Resolution::Factory(c) => write!(f, "Factory({})", c.target()),
            Resolution::Instance(_) => write!(f, "Instance"),
            Resolution::Alias(id) => write!(f, "Alias({})", id),
        }
    }
}

/// One registry entry: a resolution strategy plus its lifecycle.
#[derive(Clone, Debug)]
pub struct BindingEntry {
    pub resolution: Resolution,
    pub singleton: bool,
}

/// Thread-safe map from abstract id to resolution strategy.
///
/// Mutated only through explicit bind/unbind calls; resolution itself
/// never writes here (singleton caching lives on the container).
#[derive(Clone)]
pub struct BindingRegistry {
    // Shared so cloned handles observe the same bindings.
    bindings: Arc<DashMap<ServiceId, BindingEntry>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self {
            bindings: Arc::new(DashMap::new()),
        }
    }

    /// Bind `id` with prototype lifecycle. Rebinding silently replaces.
    pub fn bind(&self, id: ServiceId, resolution: Resolution) {
        self.bindings.insert(
            id,
            BindingEntry {
                resolution,
                singleton: false,
            },
        );
    }

    /// Bind `id` with singleton lifecycle.
    pub fn bind_singleton(&self, id: ServiceId, resolution: Resolution) {
        self.bindings.insert(
            id,
            BindingEntry {
                resolution,
                singleton: true,
            },
        );
    }

    /// Install a pre-built entry, used by scope restore.
    pub(crate) fn bind_entry(&self, id: ServiceId, entry: BindingEntry) {
        self.bindings.insert(id, entry);
    }

    /// Alias `id` to `target`. Aliases resolve transitively.
    pub fn alias(&self, id: ServiceId, target: ServiceId) {
        self.bind(id, Resolution::Alias(target));
    }

    /// Remove a binding. Unbinding a never-bound id is a no-op.
    pub fn unbind(&self, id: &ServiceId) -> Option<BindingEntry> {
        self.bindings.remove(id).map(|(_, entry)| entry)
    }

    pub fn has(&self, id: &ServiceId) -> bool {
        self.bindings.contains_key(id)
    }

    /// Return the binding descriptor without resolving anything.
    pub fn get(&self, id: &ServiceId) -> Option<BindingEntry> {
        self.bindings.get(id).map(|entry| entry.clone())
    }

    /// Follow alias links until a non-alias entry (or an unbound id) is
    /// reached. Fails past [`ALIAS_DEPTH_LIMIT`] hops.
    pub fn resolve_alias(&self, id: &ServiceId) -> Result<ServiceId> {
        let mut current = id.clone();
        for _ in 0..ALIAS_DEPTH_LIMIT {
            match self.get(&current) {
                Some(BindingEntry {
                    resolution: Resolution::Alias(target),
                    ..
                }) => current = target,
                _ => return Ok(current),
            }
        }
        Err(WeftError::CircularAlias {
            id: id.to_string(),
            limit: ALIAS_DEPTH_LIMIT,
        })
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for BindingRegistry {
    fn default() -> Self {
        Self::new()
    }
}
