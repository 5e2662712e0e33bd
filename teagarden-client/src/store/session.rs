//! Session lifecycle: restoring a stored token, login and logout.

use super::state::Session;
use super::{OpKey, OperationKind, Store};
use crate::error::StoreResult;
use crate::gateway::LoginRequest;
use crate::persistence::AuthToken;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use std::future::Future;
use teagarden_core::{require_non_empty, User, UserId, UserRole};

/// Claims carried in the payload segment of a session token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    pub sub: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: UserRole,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("Token is not a JWT")]
    NotJwt,
    #[error("Claims are not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("Claims are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TokenClaims {
    /// Decode the claims without verifying the signature.
    pub fn decode(token: &str) -> Result<Self, ClaimsError> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
            _ => return Err(ClaimsError::NotJwt),
        };
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.sub.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            profile_picture: None,
        }
    }
}

impl Store {
    /// Resume the session from the stored token. Any problem with the token
    /// ends in a quiet logout.
    pub fn restore_session(&self) -> bool {
        let restored = match self.tokens.load() {
            Ok(Some(token)) => match TokenClaims::decode(token.as_str()) {
                Ok(claims) if !claims.is_expired() => Some((claims.to_user(), token)),
                Ok(_) => {
                    tracing::warn!("Stored session token has expired");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stored session token is unreadable");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored session token");
                None
            }
        };

        let logged_in = restored.is_some();
        match restored {
            Some((user, token)) => {
                tracing::info!(user = %user.id, "Session restored");
                self.gateway.set_bearer_token(Some(token.as_str().to_string()));
                self.mutate(|state| state.session = Session::logged_in(user, token));
            }
            None => {
                if let Err(e) = self.tokens.clear() {
                    tracing::warn!(error = %e, "Failed to clear stored token");
                }
                self.gateway.set_bearer_token(None);
                self.mutate(|state| state.session = Session::logged_out());
            }
        }
        logged_in
    }

    pub fn login(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = StoreResult<User>> + Send + '_ {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let mut ticket = self.queue.ticket(OpKey::Session);
        async move {
            ticket.ready().await;
            require_non_empty("email", &request.email)?;
            require_non_empty("password", &request.password)?;

            let response = match self.gateway.login(&request).await {
                Ok(response) => response,
                Err(err) => return Err(self.fail(OperationKind::Login, OpKey::Session, err.into())),
            };

            let token = AuthToken::new(response.token);
            if let Err(e) = self.tokens.save(&token) {
                tracing::warn!(error = %e, "Failed to persist session token");
            }
            self.gateway.set_bearer_token(Some(token.as_str().to_string()));
            let user = response.user;
            self.mutate(|state| {
                state.session = Session::logged_in(user.clone(), token);
                self.succeed(state, OperationKind::Login, OpKey::Session);
            });
            tracing::info!(user = %user.id, "Logged in");
            Ok(user)
        }
    }

    /// End the session locally, then tell the server. The server call is
    /// best effort.
    pub fn logout(&self) -> impl Future<Output = ()> + Send + '_ {
        let mut ticket = self.queue.ticket(OpKey::Session);
        async move {
            ticket.ready().await;
            self.mutate(|state| {
                state.session = Session::logged_out();
                state.ledger.clear_all_errors();
            });
            if let Err(e) = self.tokens.clear() {
                tracing::warn!(error = %e, "Failed to clear stored token");
            }
            if let Err(e) = self.gateway.logout().await {
                tracing::debug!(error = %e, "Server logout failed");
            }
            self.gateway.set_bearer_token(None);
            tracing::info!("Logged out");
        }
    }
}
