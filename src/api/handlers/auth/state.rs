//! Auth state and configuration shared by the gateway handlers.

use secrecy::SecretString;

use crate::directory::AccountDirectory;
use crate::token::{SessionTokenAuthority, DEFAULT_SESSION_TTL_SECONDS};

const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:3000";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_origin: String,
    session_ttl_seconds: i64,
    session_cookie_secure: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRONTEND_ORIGIN.to_string())
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_origin: String) -> Self {
        Self {
            frontend_origin,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_cookie_secure: false,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_cookie_secure(mut self, secure: bool) -> Self {
        self.session_cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn frontend_origin(&self) -> &str {
        &self.frontend_origin
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    /// Only mark cookies secure when the site is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.session_cookie_secure
    }
}

pub struct AuthState {
    config: AuthConfig,
    directory: AccountDirectory,
    tokens: SessionTokenAuthority,
}

impl AuthState {
    /// The token ttl and the cookie `Max-Age` both come from `config`.
    #[must_use]
    pub fn new(config: AuthConfig, directory: AccountDirectory, jwt_secret: &SecretString) -> Self {
        let tokens = SessionTokenAuthority::new(jwt_secret, config.session_ttl_seconds());
        Self {
            config,
            directory,
            tokens,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn directory(&self) -> &AccountDirectory {
        &self.directory
    }

    #[must_use]
    pub fn tokens(&self) -> &SessionTokenAuthority {
        &self.tokens
    }
}
