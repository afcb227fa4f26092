use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::user::{User, UserId};
use crate::errors::ApplicationError;
use crate::store::ExpenseStore;

/// What the transport layer knows about the caller of one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub session_user_id: Option<UserId>,
    pub correlation_id: String,
}

impl CallerContext {
    pub fn for_user(user_id: UserId, correlation_id: impl Into<String>) -> Self {
        Self { session_user_id: Some(user_id), correlation_id: correlation_id.into() }
    }

    pub fn anonymous(correlation_id: impl Into<String>) -> Self {
        Self { session_user_id: None, correlation_id: correlation_id.into() }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_caller(&self, context: &CallerContext) -> Result<User, ApplicationError>;
}

/// Trusts the session's user id and looks the user up in the store.
pub struct SessionIdentityProvider<S: ExpenseStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ExpenseStore + ?Sized> SessionIdentityProvider<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: ExpenseStore + ?Sized> IdentityProvider for SessionIdentityProvider<S> {
    async fn resolve_caller(&self, context: &CallerContext) -> Result<User, ApplicationError> {
        let Some(user_id) = &context.session_user_id else {
            return Err(ApplicationError::Unauthenticated);
        };

        match self.store.find_user(user_id).await? {
            Some(user) => Ok(user),
            None => {
                tracing::warn!(
                    event_name = "identity.unknown_session_user",
                    correlation_id = %context.correlation_id,
                    user_id = %user_id,
                    "session refers to a user that does not exist"
                );
                Err(ApplicationError::Unauthenticated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{CallerContext, IdentityProvider, SessionIdentityProvider};
    use crate::domain::user::{Role, User, UserId};
    use crate::errors::ApplicationError;
    use crate::store::{ExpenseStore, InMemoryStore};

    #[tokio::test]
    async fn session_user_is_resolved_through_the_store() {
        let store = Arc::new(InMemoryStore::default());
        store
            .save_user(User {
                id: UserId("3".to_owned()),
                name: "Ramesh".to_owned(),
                email: "ramesh@example.com".to_owned(),
                role: Role::Employee,
                manager_id: Some(UserId("2".to_owned())),
            })
            .await
            .expect("save");
        let provider = SessionIdentityProvider::new(store);

        let caller = provider
            .resolve_caller(&CallerContext::for_user(UserId("3".to_owned()), "req-1"))
            .await
            .expect("resolve");
        assert_eq!(caller.name, "Ramesh");
    }

    #[tokio::test]
    async fn missing_or_unknown_session_is_unauthenticated() {
        let provider = SessionIdentityProvider::new(Arc::new(InMemoryStore::default()));

        let anonymous = provider.resolve_caller(&CallerContext::anonymous("req-2")).await;
        assert_eq!(anonymous, Err(ApplicationError::Unauthenticated));

        let stale = provider
            .resolve_caller(&CallerContext::for_user(UserId("404".to_owned()), "req-3"))
            .await;
        assert_eq!(stale, Err(ApplicationError::Unauthenticated));
    }
}
