use crate::{
    api::{self, AuthConfig},
    broker::SshConfig,
};
use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub session_ttl_seconds: i64,
    pub cookie_secure: bool,
    pub frontend_origin: String,
    pub ssh: SshConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(
        port = args.port,
        frontend_origin = %args.frontend_origin,
        ssh = ?args.ssh,
        "Starting server"
    );

    let auth_config = AuthConfig::new(args.frontend_origin)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_session_cookie_secure(args.cookie_secure);

    api::new(args.port, args.dsn, args.jwt_secret, auth_config, args.ssh).await
}
