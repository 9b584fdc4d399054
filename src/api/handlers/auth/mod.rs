//! Authentication gateway: register, login, logout, verify, mailcheck, and
//! the session guard for protected routes.

pub mod login;
pub mod mailcheck;
pub mod register;
pub mod session;
pub mod state;
pub mod types;

pub use self::session::{require_session, AuthenticatedPrincipal, SESSION_COOKIE_NAME};
pub use self::state::{AuthConfig, AuthState};
