use chrono::{DateTime, Utc};

/// An authenticated user, as handed over by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    pub email: Option<String>,
    /// `None` for sessions that do not expire (local CLI use).
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.user_id.is_empty() && self.expires_at.is_none_or(|t| now < t)
    }
}
