use crate::di::container::Container;
use crate::di::descriptor::Callable;
use crate::di::registry::{Resolution, ServiceId};

/// Builder for configuring a container at application bootstrap.
///
/// # Example
/// ```
/// use weft::di::{Callable, ContainerBuilder, Resolution, ServiceId, arg};
/// use std::sync::Arc;
///
/// let container = ContainerBuilder::new()
///     .instance(ServiceId::new("app.name"), "weft".to_string())
///     .singleton(
///         ServiceId::new("clock"),
///         Resolution::Factory(Arc::new(Callable::new("clock_factory", vec![], |_| {
///             Ok(arg(std::time::Instant::now()))
///         }))),
///     )
///     .build();
/// assert!(container.has(&ServiceId::new("clock")));
/// ```
pub struct ContainerBuilder {
    container: Container,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            container: Container::new(),
        }
    }

    /// Bind with prototype lifecycle.
    pub fn bind(self, id: ServiceId, resolution: Resolution) -> Self {
        self.container.bind(id, resolution);
        self
    }

    /// Bind with singleton lifecycle.
    pub fn singleton(self, id: ServiceId, resolution: Resolution) -> Self {
        self.container.bind_singleton(id, resolution);
        self
    }

    /// Bind an existing instance (implicitly singleton).
    pub fn instance<T: Send + Sync + 'static>(self, id: ServiceId, instance: T) -> Self {
        self.container.bind_instance(id, instance);
        self
    }

    /// Register an instance under its own type id.
    pub fn register<T: Send + Sync + 'static>(self, instance: T) -> Self {
        self.container.register(instance);
        self
    }

    /// Register an auto-wiring descriptor for a concrete type.
    pub fn describe(self, id: ServiceId, descriptor: Callable) -> Self {
        self.container.register_type(id, descriptor);
        self
    }

    /// Alias one id to another.
    pub fn alias(self, id: ServiceId, target: ServiceId) -> Self {
        self.container.alias(id, target);
        self
    }

    pub fn build(self) -> Container {
        self.container
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
