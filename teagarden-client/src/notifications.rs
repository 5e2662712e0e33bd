//! User-facing notifications raised by the App controller.

use crate::error::{ErrorKind, StoreError};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// Follow-up the UI may offer next to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Retry,
    Login,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub action: Option<NotificationAction>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            action: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Error notification carrying the store's message. Network failures
    /// offer a retry, rejected sessions a login.
    pub fn from_error(error: &StoreError) -> Self {
        let notification = Self::new(NotificationLevel::Error, error.message());
        match error.kind() {
            ErrorKind::Network => notification.with_action(NotificationAction::Retry),
            ErrorKind::Unauthorized => notification.with_action(NotificationAction::Login),
            _ => notification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, GatewayErrorKind};

    #[test]
    fn test_from_error_picks_action() {
        let network = StoreError::from(GatewayError::network("connection refused"));
        let n = Notification::from_error(&network);
        assert_eq!(n.level, NotificationLevel::Error);
        assert_eq!(n.action, Some(NotificationAction::Retry));

        let denied = StoreError::from(GatewayError::new(GatewayErrorKind::Unauthorized, "expired"));
        assert_eq!(
            Notification::from_error(&denied).action,
            Some(NotificationAction::Login)
        );

        let missing = StoreError::from(GatewayError::new(GatewayErrorKind::NotFound, "gone"));
        let n = Notification::from_error(&missing);
        assert_eq!(n.message, "gone");
        assert_eq!(n.action, None);
    }
}
