use crate::di::{downcast_arg, Container, ServiceId};
use crate::error::WeftError;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

/// Axum extractor resolving a service by its type id.
///
/// Resolution failures reject with the crate's error type, so an
/// unbound or cyclic dependency surfaces as the same response an
/// erroring middleware would produce.
///
/// # Example
/// ```ignore
/// async fn get_user(
///     Inject(users): Inject<UserService>,
///     Path(id): Path<String>,
/// ) -> Result<Json<User>, WeftError> {
///     let user = users.find_one(id).await?;
///     Ok(Json(user))
/// }
/// ```
pub struct Inject<T>(pub Arc<T>);

/// Extractor resolving a service by an explicit binding id, for
/// aliases and free-form string bindings. The target type is whatever
/// the binding produces.
///
/// The id comes from a [`BindingId`] marker, so each named injection
/// is its own zero-sized type:
///
/// ```ignore
/// struct PrimaryDb;
/// impl BindingId for PrimaryDb {
///     fn id() -> ServiceId {
///         ServiceId::new("db.primary")
///     }
/// }
///
/// async fn list(InjectNamed(db, _): InjectNamed<Database, PrimaryDb>) { /* ... */ }
/// ```
pub struct InjectNamed<T, K>(pub Arc<T>, pub std::marker::PhantomData<K>);

/// Names a container binding for [`InjectNamed`].
pub trait BindingId {
    fn id() -> ServiceId;
}

/// Exposes the container from the router state.
pub trait HasContainer {
    fn container(&self) -> &Container;
}

impl<S, T> FromRequestParts<S> for Inject<T>
where
    S: Send + Sync + HasContainer,
    T: 'static + Send + Sync,
{
    type Rejection = WeftError;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        state.container().resolve::<T>().map(Inject)
    }
}

impl<S, T, K> FromRequestParts<S> for InjectNamed<T, K>
where
    S: Send + Sync + HasContainer,
    T: 'static + Send + Sync,
    K: BindingId,
{
    type Rejection = WeftError;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let value = state.container().get(&K::id())?;
        Ok(InjectNamed(downcast_arg(&value)?, std::marker::PhantomData))
    }
}

impl<T> std::ops::Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> Clone for Inject<T> {
    fn clone(&self) -> Self {
        Inject(Arc::clone(&self.0))
    }
}
