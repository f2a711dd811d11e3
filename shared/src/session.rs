use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::error::AppError;
use crate::model::UserId;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthStatus {
    Initializing,
    Authenticated(UserId),
    Failed(AppError),
    SignedOut,
}

/// Shared handle to the signed-in user, written by the auth layer and read
/// by screens.
#[derive(Clone)]
pub struct AuthSession {
    status: Arc<watch::Sender<AuthStatus>>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    #[must_use]
    pub fn new() -> Self {
        let (status, _) = watch::channel(AuthStatus::Initializing);
        Self {
            status: Arc::new(status),
        }
    }

    #[must_use]
    pub fn signed_in(user_id: UserId) -> Self {
        let session = Self::new();
        session.set_status(AuthStatus::Authenticated(user_id));
        session
    }

    pub fn set_status(&self, status: AuthStatus) {
        match &status {
            AuthStatus::Authenticated(user_id) => info!(user_id = %user_id, "session authenticated"),
            AuthStatus::Failed(error) => info!(code = error.code(), "session failed"),
            AuthStatus::Initializing => info!("session initializing"),
            AuthStatus::SignedOut => info!("session signed out"),
        }
        self.status.send_replace(status);
    }

    #[must_use]
    pub fn status(&self) -> AuthStatus {
        self.status.borrow().clone()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<UserId> {
        match &*self.status.borrow() {
            AuthStatus::Authenticated(user_id) => Some(user_id.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.status.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_current_user_only_when_authenticated() {
        let session = AuthSession::new();
        assert_eq!(session.current_user(), None);

        session.set_status(AuthStatus::Authenticated(UserId::new("u-1")));
        assert_eq!(session.current_user(), Some(UserId::new("u-1")));

        session.set_status(AuthStatus::Failed(AppError::new(ErrorKind::Authentication, "expired")));
        assert_eq!(session.current_user(), None);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let session = AuthSession::new();
        let mut rx = session.subscribe();
        let writer = session.clone();

        writer.set_status(AuthStatus::SignedOut);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AuthStatus::SignedOut);
    }
}
