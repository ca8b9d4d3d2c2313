use crate::di::container::Container;
use crate::di::descriptor::{arg, ArgValue, Callable, ResolvedArgs};
use crate::di::registry::ServiceId;
use crate::error::{Result, WeftError};
use std::collections::HashMap;

/// Caller-supplied arguments, keyed by parameter name. Override values
/// are used verbatim with no coercion.
#[derive(Clone, Default)]
pub struct Overrides {
    values: HashMap<String, ArgValue>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chainable insert.
    ///
    /// # Example
    /// ```
    /// use weft::di::{Overrides, arg};
    ///
    /// let overrides = Overrides::new().with("limit", arg(25usize));
    /// assert!(overrides.get("limit").is_some());
    /// ```
    pub fn with(mut self, name: impl Into<String>, value: ArgValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Compute the ordered argument list for `callable`.
///
/// Parameters resolve left-to-right, each by the first applicable rule:
/// named override, declared service via the container, declared default,
/// empty sequence for a variadic tail. A parameter none of those cover
/// fails with `UnresolvableParameter`.
///
/// `stack` carries the ids currently being resolved; the container uses
/// it to detect resolution cycles.
pub(crate) fn resolve_arguments(
    container: &Container,
    callable: &Callable,
    overrides: &Overrides,
    stack: &mut Vec<ServiceId>,
) -> Result<ResolvedArgs> {
    let mut values = Vec::with_capacity(callable.params().len());

    for param in callable.params() {
        if let Some(value) = overrides.get(param.name()) {
            values.push(value.clone());
            continue;
        }

        if let Some(id) = param.service_id() {
            match container.make_inner(id, &Overrides::new(), stack) {
                Ok(value) => {
                    values.push(value);
                    continue;
                }
                // A missing binding falls through to the default and
                // variadic rules; real resolution failures propagate.
                Err(WeftError::NotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        if let Some(value) = param.default_value() {
            values.push(value);
            continue;
        }

        if param.is_variadic() {
            values.push(arg(Vec::<ArgValue>::new()));
            continue;
        }

        return Err(WeftError::UnresolvableParameter {
            parameter: param.name().to_string(),
            target: callable.target().to_string(),
        });
    }

    Ok(ResolvedArgs::new(callable.target(), values))
}
