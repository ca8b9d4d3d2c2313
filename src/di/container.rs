use crate::di::descriptor::{arg, downcast_arg, ArgValue, Callable};
use crate::di::registry::{BindingEntry, BindingRegistry, Resolution, ServiceId};
use crate::di::resolver::{resolve_arguments, Overrides};
use crate::error::{Result, WeftError};
use dashmap::DashMap;
use std::sync::Arc;

/// Saved state of one binding slot, restored when a scope is popped.
struct ScopeFrame {
    binding: Option<BindingEntry>,
    cached: Option<ArgValue>,
}

/// Thread-safe dependency injection container.
///
/// Orchestrates resolution over a [`BindingRegistry`]: singleton caching,
/// descriptor-driven auto-wiring for unbound concrete types, argument
/// resolution for factories and free callables, and a stack of temporary
/// scope overrides used by the HTTP layer to make per-request services
/// (cookie jar, session) resolvable during one dispatch.
///
/// Cloning is cheap and shares all state, like handing out another
/// handle to the same container.
#[derive(Clone)]
pub struct Container {
    registry: BindingRegistry,
    // Arc-shared so every cloned handle addresses the same container.
    descriptors: Arc<DashMap<ServiceId, Arc<Callable>>>,
    singletons: Arc<DashMap<ServiceId, ArgValue>>,
    scopes: Arc<DashMap<ServiceId, Vec<ScopeFrame>>>,
}

impl Container {
    pub fn new() -> Self {
        Self {
            registry: BindingRegistry::new(),
            descriptors: Arc::new(DashMap::new()),
            singletons: Arc::new(DashMap::new()),
            scopes: Arc::new(DashMap::new()),
        }
    }

    // ---- registration -------------------------------------------------

    /// Bind `id` with prototype lifecycle. Rebinding replaces the entry
    /// and drops any cached singleton for the id.
    pub fn bind(&self, id: ServiceId, resolution: Resolution) {
        self.singletons.remove(&id);
        self.registry.bind(id, resolution);
    }

    /// Bind `id` with singleton lifecycle: the first resolution is
    /// cached and reused.
    pub fn bind_singleton(&self, id: ServiceId, resolution: Resolution) {
        self.singletons.remove(&id);
        self.registry.bind_singleton(id, resolution);
    }

    /// Bind an existing instance under `id`. Implicitly singleton.
    pub fn bind_instance<T: Send + Sync + 'static>(&self, id: ServiceId, instance: T) {
        self.bind_value(id, arg(instance));
    }

    /// Bind an already type-erased value under `id`. Implicitly singleton.
    pub fn bind_value(&self, id: ServiceId, value: ArgValue) {
        self.registry
            .bind_singleton(id.clone(), Resolution::Instance(value.clone()));
        self.singletons.insert(id, value);
    }

    /// Register an instance under its own type id (`resolve::<T>()` sugar).
    pub fn register<T: Send + Sync + 'static>(&self, instance: T) {
        self.bind_instance(ServiceId::of::<T>(), instance);
    }

    /// Register an auto-wiring descriptor for a concrete type. Consulted
    /// when `make` is asked for an id with no explicit binding.
    pub fn register_type(&self, id: ServiceId, descriptor: Callable) {
        self.descriptors.insert(id, Arc::new(descriptor));
    }

    /// Alias `id` to `target`.
    pub fn alias(&self, id: ServiceId, target: ServiceId) {
        self.registry.alias(id, target);
    }

    /// Remove a binding and its cached singleton. No-op when unbound.
    pub fn unbind(&self, id: &ServiceId) {
        self.registry.unbind(id);
        self.singletons.remove(id);
    }

    pub fn has(&self, id: &ServiceId) -> bool {
        self.registry.has(id) || self.descriptors.contains_key(id)
    }

    /// The binding descriptor for `id`, without resolving anything.
    pub fn get_binding(&self, id: &ServiceId) -> Option<BindingEntry> {
        self.registry.get(id)
    }

    // ---- resolution ---------------------------------------------------

    /// Resolve or instantiate `id`.
    ///
    /// A cached singleton instance wins; in that case `overrides` are
    /// ignored (long-standing, surprising, intentional). Otherwise the
    /// binding's strategy runs: constructors and factories get their
    /// parameters resolved left-to-right, instances return directly, and
    /// an unbound id falls back to a registered auto-wiring descriptor.
    pub fn make(&self, id: &ServiceId, overrides: &Overrides) -> Result<ArgValue> {
        self.make_inner(id, overrides, &mut Vec::new())
    }

    /// `make` with no overrides.
    pub fn get(&self, id: &ServiceId) -> Result<ArgValue> {
        self.make(id, &Overrides::new())
    }

    /// Resolve by type and downcast to `Arc<T>`.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let value = self.get(&ServiceId::of::<T>())?;
        downcast_arg(&value)
    }

    /// Resolve arguments for an arbitrary callable and invoke it.
    /// Resolution follows the same rules as construction.
    pub fn invoke(&self, callable: &Callable, overrides: &Overrides) -> Result<ArgValue> {
        let args = resolve_arguments(self, callable, overrides, &mut Vec::new())?;
        callable.call(args)
    }

    pub(crate) fn make_inner(
        &self,
        id: &ServiceId,
        overrides: &Overrides,
        stack: &mut Vec<ServiceId>,
    ) -> Result<ArgValue> {
        let id = self.registry.resolve_alias(id)?;

        if let Some(cached) = self.singletons.get(&id) {
            return Ok(cached.clone());
        }

        let entry = match self.registry.get(&id) {
            Some(entry) => entry,
            None => match self.descriptors.get(&id) {
                Some(descriptor) => BindingEntry {
                    resolution: Resolution::Class(descriptor.clone()),
                    singleton: false,
                },
                None => {
                    return Err(WeftError::NotFound { id: id.to_string() });
                }
            },
        };

        let value = match &entry.resolution {
            Resolution::Instance(value) => value.clone(),
            Resolution::Class(callable) | Resolution::Factory(callable) => {
                self.construct(&id, callable, overrides, stack)?
            }
            // resolve_alias already flattened alias chains.
            Resolution::Alias(target) => {
                return Err(WeftError::Internal(format!(
                    "unflattened alias {id} -> {target}"
                )));
            }
        };

        if entry.singleton {
            self.singletons.insert(id, value.clone());
        }
        Ok(value)
    }

    fn construct(
        &self,
        id: &ServiceId,
        callable: &Callable,
        overrides: &Overrides,
        stack: &mut Vec<ServiceId>,
    ) -> Result<ArgValue> {
        if stack.contains(id) {
            let mut path: Vec<&str> = stack.iter().map(ServiceId::as_str).collect();
            path.push(id.as_str());
            return Err(WeftError::CircularDependency {
                cycle: path.join(" -> "),
            });
        }

        tracing::debug!(id = %id, target = callable.target(), "constructing");

        stack.push(id.clone());
        let result = resolve_arguments(self, callable, overrides, stack)
            .and_then(|args| callable.call(args));
        stack.pop();
        result
    }

    // ---- scope overrides ----------------------------------------------

    /// Save the current binding and cache state for `id` and install
    /// `value` as a temporary singleton resolution.
    ///
    /// Frames nest per id and must be popped in strict LIFO order. The
    /// push/pop pairing is a per-request discipline: one logical request
    /// runs it on a single synchronous call chain, and pairs are never
    /// interleaved across requests. Prefer [`Container::scoped`], which
    /// restores on drop no matter how the wrapped code exits.
    pub fn push_scope(&self, id: ServiceId, value: ArgValue) {
        let frame = ScopeFrame {
            binding: self.registry.get(&id),
            cached: self.singletons.get(&id).map(|v| v.clone()),
        };
        self.scopes.entry(id.clone()).or_default().push(frame);
        self.bind_value(id, value);
    }

    /// Restore the state saved by the matching [`Container::push_scope`].
    pub fn pop_scope(&self, id: &ServiceId) -> Result<()> {
        let frame = self
            .scopes
            .get_mut(id)
            .and_then(|mut stack| stack.pop())
            .ok_or_else(|| WeftError::ScopeMismatch {
                message: format!("pop_scope('{id}') without matching push"),
            })?;

        match frame.binding {
            Some(entry) => self.registry.bind_entry(id.clone(), entry),
            None => {
                self.registry.unbind(id);
            }
        }
        match frame.cached {
            Some(value) => {
                self.singletons.insert(id.clone(), value);
            }
            None => {
                self.singletons.remove(id);
            }
        }
        Ok(())
    }

    /// Scoped acquisition: push now, pop when the returned guard drops.
    /// This is the mechanism by which per-request services become the
    /// "current" resolution only for the active request.
    pub fn scoped(&self, id: ServiceId, value: ArgValue) -> ScopeGuard {
        self.push_scope(id.clone(), value);
        ScopeGuard {
            container: self.clone(),
            id,
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores a scope override when dropped, on every exit path.
pub struct ScopeGuard {
    container: Container,
    id: ServiceId,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Err(err) = self.container.pop_scope(&self.id) {
            // Unbalanced pops indicate a discipline violation elsewhere;
            // a Drop impl cannot propagate it.
            tracing::warn!(id = %self.id, error = %err, "scope restore failed");
        }
    }
}
