use crate::di::registry::ServiceId;
use crate::error::{Result, WeftError};
use std::any::Any;
use std::sync::Arc;

/// A type-erased argument or resolved instance moving through the container.
///
/// The inner value is `Arc<T>` for some concrete `T`; typed access goes
/// through [`downcast_arg`] or [`ResolvedArgs`].
pub type ArgValue = Arc<dyn Any + Send + Sync>;

/// Wrap an owned value as an [`ArgValue`].
pub fn arg<T: Send + Sync + 'static>(value: T) -> ArgValue {
    Arc::new(value)
}

/// Coerce an already-shared `Arc<T>` into an [`ArgValue`] without re-wrapping.
pub fn arg_arc<T: Send + Sync + 'static>(value: Arc<T>) -> ArgValue {
    value
}

/// Downcast an [`ArgValue`] to `Arc<T>`.
pub fn downcast_arg<T: Send + Sync + 'static>(value: &ArgValue) -> Result<Arc<T>> {
    value
        .clone()
        .downcast::<T>()
        .map_err(|_| WeftError::DowncastFailed {
            type_name: std::any::type_name::<T>().to_string(),
        })
}

type DefaultFn = Arc<dyn Fn() -> ArgValue + Send + Sync>;

/// One declared parameter of a [`Callable`].
///
/// Mirrors what reflection would report about a constructor parameter:
/// a name, an optionally declared service type, an optional default and
/// a variadic flag. The resolver consults these in order.
#[derive(Clone)]
pub struct ParamSpec {
    name: &'static str,
    service: Option<ServiceId>,
    default: Option<DefaultFn>,
    variadic: bool,
}

impl ParamSpec {
    /// A parameter whose declared type resolves through the container.
    pub fn service(name: &'static str, id: ServiceId) -> Self {
        Self {
            name,
            service: Some(id),
            default: None,
            variadic: false,
        }
    }

    /// An untyped parameter. Only an override or a default can satisfy it.
    pub fn untyped(name: &'static str) -> Self {
        Self {
            name,
            service: None,
            default: None,
            variadic: false,
        }
    }

    /// A variadic tail parameter. Binds an empty sequence when nothing
    /// else supplies it.
    pub fn variadic(name: &'static str) -> Self {
        Self {
            name,
            service: None,
            default: None,
            variadic: true,
        }
    }

    /// Attach a default value, used when no override applies and the
    /// declared type (if any) cannot be resolved.
    pub fn with_default<F>(mut self, default: F) -> Self
    where
        F: Fn() -> ArgValue + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(default));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn service_id(&self) -> Option<&ServiceId> {
        self.service.as_ref()
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    pub(crate) fn default_value(&self) -> Option<ArgValue> {
        self.default.as_ref().map(|f| f())
    }
}

impl std::fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("service", &self.service)
            .field("has_default", &self.default.is_some())
            .field("variadic", &self.variadic)
            .finish()
    }
}

/// The ordered arguments computed by the resolver, consumed positionally
/// by the callable's body.
pub struct ResolvedArgs {
    values: Vec<ArgValue>,
    cursor: usize,
    target: String,
}

impl ResolvedArgs {
    pub(crate) fn new(target: &str, values: Vec<ArgValue>) -> Self {
        Self {
            values,
            cursor: 0,
            target: target.to_string(),
        }
    }

    /// Take the next argument as `Arc<T>`.
    pub fn take<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let value = self.take_value()?;
        downcast_arg(&value)
    }

    /// Take the next argument untyped.
    pub fn take_value(&mut self) -> Result<ArgValue> {
        let value = self
            .values
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| WeftError::Internal(format!(
                "{}: argument list exhausted at position {}",
                self.target, self.cursor
            )))?;
        self.cursor += 1;
        Ok(value)
    }

    /// Take the next argument as a variadic sequence of `Arc<T>`.
    pub fn take_variadic<T: Send + Sync + 'static>(&mut self) -> Result<Vec<Arc<T>>> {
        let value = self.take_value()?;
        let items = downcast_arg::<Vec<ArgValue>>(&value)?;
        items.iter().map(downcast_arg::<T>).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for ResolvedArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedArgs")
            .field("target", &self.target)
            .field("len", &self.values.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

type CallFn = Arc<dyn Fn(ResolvedArgs) -> Result<ArgValue> + Send + Sync>;

/// An invocable target: a constructor, a factory closure or a free
/// function, described by its ordered parameter list.
///
/// This is the explicit stand-in for runtime constructor reflection:
/// each resolvable type supplies its own descriptor.
///
/// # Example
/// ```
/// use weft::di::{Callable, ParamSpec, ServiceId, arg};
/// use std::sync::Arc;
///
/// struct Greeter { prefix: Arc<String> }
///
/// let descriptor = Callable::new(
///     "Greeter::new",
///     vec![ParamSpec::service("prefix", ServiceId::of::<String>())],
///     |mut args| {
///         let prefix = args.take::<String>()?;
///         Ok(arg(Greeter { prefix }))
///     },
/// );
/// ```
#[derive(Clone)]
pub struct Callable {
    target: String,
    params: Vec<ParamSpec>,
    call: CallFn,
}

impl Callable {
    pub fn new<F>(target: impl Into<String>, params: Vec<ParamSpec>, call: F) -> Self
    where
        F: Fn(ResolvedArgs) -> Result<ArgValue> + Send + Sync + 'static,
    {
        Self {
            target: target.into(),
            params,
            call: Arc::new(call),
        }
    }

    /// Diagnostic name used in resolver error messages.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub(crate) fn call(&self, args: ResolvedArgs) -> Result<ArgValue> {
        (self.call)(args)
    }
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callable")
            .field("target", &self.target)
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_roundtrip() {
        let value = arg(42i32);
        let back = downcast_arg::<i32>(&value).unwrap();
        assert_eq!(*back, 42);
    }

    #[test]
    fn downcast_mismatch_fails() {
        let value = arg("hello".to_string());
        let err = downcast_arg::<i32>(&value).unwrap_err();
        assert!(matches!(err, WeftError::DowncastFailed { .. }));
    }

    #[test]
    fn resolved_args_consume_in_order() {
        let mut args = ResolvedArgs::new("test", vec![arg(1i32), arg("two".to_string())]);
        assert_eq!(*args.take::<i32>().unwrap(), 1);
        assert_eq!(*args.take::<String>().unwrap(), "two");
        assert!(args.take_value().is_err());
    }

    #[test]
    fn variadic_args_downcast_elementwise() {
        let seq: Vec<ArgValue> = vec![arg(1i32), arg(2i32)];
        let mut args = ResolvedArgs::new("test", vec![arg(seq)]);
        let items = args.take_variadic::<i32>().unwrap();
        assert_eq!(items.iter().map(|v| **v).collect::<Vec<_>>(), vec![1, 2]);
    }
}
