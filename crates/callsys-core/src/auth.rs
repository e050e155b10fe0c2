//! Operator authentication and the permission gate.
//!
//! Accounts come from configuration. A login stores a session under a
//! random token with a time-to-live; each authenticated request refreshes
//! it. Chat-bot adapters present a shared bot token instead.

use callsys_db::StateStore;
use callsys_types::{Permission, Session};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{SessionConfig, UserConfig};
use crate::error::QueueError;

/// Verifies credentials and sessions.
#[derive(Debug, Clone)]
pub struct Authenticator {
    state: StateStore,
    users: Vec<UserConfig>,
    ttl_secs: u64,
    bot_token: Option<String>,
}

impl Authenticator {
    /// Authenticator for the configured accounts.
    pub fn new(state: StateStore, users: Vec<UserConfig>, sessions: &SessionConfig) -> Self {
        Self {
            state,
            users,
            ttl_secs: sessions.ttl_secs,
            bot_token: sessions.bot_token.clone().filter(|t| !t.is_empty()),
        }
    }

    /// Check a username and password and open a session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, QueueError> {
        let Some(user) = self
            .users
            .iter()
            .find(|u| u.username == username && constant_time_eq(&u.password, password))
        else {
            warn!(username, "login rejected");
            return Err(QueueError::Unauthorized);
        };

        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            username: user.username.clone(),
            role: user.role,
            nickname: user.display_name().to_owned(),
        };
        self.state.put_session(&session, self.ttl_secs).await?;
        info!(username, role = session.role.as_str(), "operator logged in");
        Ok(session)
    }

    /// Close a session. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> Result<(), QueueError> {
        self.state.delete_session(token).await?;
        Ok(())
    }

    /// Resolve a token to its live session, refreshing the time-to-live.
    pub async fn authenticate(&self, token: &str) -> Result<Session, QueueError> {
        if token.is_empty() {
            return Err(QueueError::Unauthorized);
        }
        self.state
            .touch_session(token, self.ttl_secs)
            .await?
            .ok_or(QueueError::Unauthorized)
    }

    /// Resolve a token and require `permission`.
    pub async fn authorize(&self, token: &str, permission: Permission) -> Result<Session, QueueError> {
        let session = self.authenticate(token).await?;
        require(&session, permission)?;
        Ok(session)
    }

    /// Check the chat-bot adapter token. Without a configured token every
    /// bot request is rejected.
    pub fn verify_bot(&self, token: &str) -> Result<(), QueueError> {
        match &self.bot_token {
            Some(expected) if constant_time_eq(expected, token) => Ok(()),
            _ => Err(QueueError::Unauthorized),
        }
    }
}

/// Require that `session`'s role grants `permission`.
pub fn require(session: &Session, permission: Permission) -> Result<(), QueueError> {
    if session.role.satisfies(permission) {
        Ok(())
    } else {
        Err(QueueError::Forbidden(permission))
    }
}

fn constant_time_eq(expected: &str, given: &str) -> bool {
    expected.len() == given.len()
        && expected
            .bytes()
            .zip(given.bytes())
            .fold(0_u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use callsys_types::Role;

    use super::*;

    fn user(username: &str, role: Role) -> UserConfig {
        UserConfig {
            username: username.to_owned(),
            password: "pw".to_owned(),
            role,
            nickname: String::new(),
        }
    }

    fn authenticator(bot_token: Option<&str>) -> Authenticator {
        Authenticator::new(
            StateStore::in_memory(),
            vec![user("alice", Role::Operator), user("root", Role::Admin)],
            &SessionConfig {
                ttl_secs: 60,
                bot_token: bot_token.map(ToOwned::to_owned),
            },
        )
    }

    #[tokio::test]
    async fn login_authenticate_logout() {
        let auth = authenticator(None);
        assert!(matches!(
            auth.login("alice", "wrong").await,
            Err(QueueError::Unauthorized)
        ));

        let session = auth.login("alice", "pw").await.unwrap();
        assert_eq!(session.nickname, "alice");
        assert_eq!(auth.authenticate(&session.token).await.unwrap(), session);

        auth.logout(&session.token).await.unwrap();
        assert!(matches!(
            auth.authenticate(&session.token).await,
            Err(QueueError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn permissions_follow_role_order() {
        let auth = authenticator(None);
        let operator = auth.login("alice", "pw").await.unwrap();
        assert!(auth.authorize(&operator.token, Permission::Call).await.is_ok());
        assert!(matches!(
            auth.authorize(&operator.token, Permission::Settings).await,
            Err(QueueError::Forbidden(Permission::Settings))
        ));

        let admin = auth.login("root", "pw").await.unwrap();
        assert!(auth.authorize(&admin.token, Permission::Settings).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_expire_without_use() {
        let auth = authenticator(None);
        let session = auth.login("alice", "pw").await.unwrap();
        tokio::time::advance(std::time::Duration::from_secs(45)).await;
        assert!(auth.authenticate(&session.token).await.is_ok());
        tokio::time::advance(std::time::Duration::from_secs(45)).await;
        assert!(auth.authenticate(&session.token).await.is_ok());
        tokio::time::advance(std::time::Duration::from_secs(61)).await;
        assert!(auth.authenticate(&session.token).await.is_err());
    }

    #[test]
    fn bot_token_required() {
        assert!(authenticator(None).verify_bot("anything").is_err());
        let auth = authenticator(Some("s3cret"));
        assert!(auth.verify_bot("s3cret").is_ok());
        assert!(auth.verify_bot("s3cre").is_err());
    }
}
