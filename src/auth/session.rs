use serde::Serialize;

pub const GUEST: &str = "Guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    BearerToken,
    ApiKey,
}

/// Identity of the caller for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Guest,
    User { user: String, method: AuthMethod },
}

impl Session {
    pub fn user(user: impl Into<String>, method: AuthMethod) -> Self {
        Session::User {
            user: user.into(),
            method,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Session::Guest)
    }

    /// Login name, or `"Guest"`.
    pub fn user_id(&self) -> &str {
        match self {
            Session::Guest => GUEST,
            Session::User { user, .. } => user,
        }
    }
}
