mod builder;
mod container;
mod descriptor;
mod extractor;
mod registry;
mod resolver;

pub use builder::ContainerBuilder;
pub use container::{Container, ScopeGuard};
pub use extractor::{BindingId, HasContainer, Inject, InjectNamed};
pub use descriptor::{arg, arg_arc, downcast_arg, ArgValue, Callable, ParamSpec, ResolvedArgs};
pub use registry::{BindingEntry, BindingRegistry, Resolution, ServiceId, ALIAS_DEPTH_LIMIT};
pub use resolver::Overrides;
