//! Authentication mode resolution
//!
//! Resolved once per run, before any operation is attempted.

use std::fmt;

/// Mask used wherever a secret would otherwise be printed.
const MASK: &str = "***";

/// Raw credential inputs as given on the command line or in config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    /// Overrides the schema's default apiKey scheme
    pub security_name: Option<String>,
}

/// How every request of the run is authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    None,
    Basic {
        username: String,
        password: String,
    },
    ApiKey {
        token: String,
        /// Explicit scheme name; `None` selects the schema default
        scheme: Option<String>,
    },
}

impl Credentials {
    /// Basic when both username and password are present, else apiKey when a
    /// token is present, else none.
    #[must_use]
    pub fn resolve(&self) -> AuthMode {
        match (&self.username, &self.password, &self.token) {
            (Some(username), Some(password), _) => AuthMode::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            (_, _, Some(token)) => AuthMode::ApiKey {
                token: token.clone(),
                scheme: self.security_name.clone(),
            },
            _ => AuthMode::None,
        }
    }
}

impl AuthMode {
    /// Short description without secrets, for logs.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Basic { username, .. } => format!("basic ({username})"),
            Self::ApiKey { scheme: Some(s), .. } => format!("apiKey ({s})"),
            Self::ApiKey { scheme: None, .. } => "apiKey (default scheme)".to_string(),
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &MASK)
                .finish(),
            Self::ApiKey { scheme, .. } => f
                .debug_struct("ApiKey")
                .field("token", &MASK)
                .field("scheme", scheme)
                .finish(),
        }
    }
}
