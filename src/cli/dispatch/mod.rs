//! Map validated CLI arguments to an [`Action`].

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, ssh, ARG_DSN, ARG_PORT};
use anyhow::Result;

/// Map CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_DSN}"))?;

    let auth_opts = auth::Options::parse(matches)?;
    let ssh_opts = ssh::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        cookie_secure: auth_opts.cookie_secure,
        frontend_origin: auth_opts.frontend_origin,
        ssh: ssh_opts.ssh_config(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn with_env<F: FnOnce()>(dsn: Option<&str>, secret: Option<&str>, f: F) {
        temp_env::with_vars(
            [
                ("NUCLEUS_PORT", None),
                ("NUCLEUS_DSN", dsn),
                ("NUCLEUS_JWT_SECRET", secret),
                ("NUCLEUS_SESSION_TTL_SECONDS", None),
                ("NUCLEUS_COOKIE_SECURE", None),
                ("NUCLEUS_FRONTEND_ORIGIN", None),
                ("NUCLEUS_SSH_CONNECT_TIMEOUT_SECONDS", None),
                ("NUCLEUS_SSH_COMMAND_TIMEOUT_SECONDS", None),
                ("NUCLEUS_SSH_KNOWN_HOSTS", None),
                ("NUCLEUS_SSH_INSECURE_ACCEPT_ANY_HOST_KEY", None),
            ],
            f,
        );
    }

    #[test]
    fn builds_server_action() {
        with_env(
            Some("postgres://nucleus@localhost:5432/nucleus"),
            Some("signing-secret"),
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["nucleus"]);
                let Ok(Action::Server(args)) = handler(&matches) else {
                    panic!("expected server action");
                };
                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn, "postgres://nucleus@localhost:5432/nucleus");
                assert_eq!(args.jwt_secret.expose_secret(), "signing-secret");
                assert_eq!(args.session_ttl_seconds, 86_400);
            },
        );
    }

    #[test]
    fn dsn_required() {
        with_env(None, Some("signing-secret"), || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["nucleus"]);
            let result = handler(&matches);
            assert!(result
                .err()
                .is_some_and(|err| err.to_string().contains("--dsn")));
        });
    }

    #[test]
    fn jwt_secret_required() {
        with_env(Some("postgres://localhost/nucleus"), None, || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["nucleus"]);
            let result = handler(&matches);
            assert!(result
                .err()
                .is_some_and(|err| err.to_string().contains("--jwt-secret")));
        });
    }

    #[test]
    fn empty_jwt_secret_rejected() {
        with_env(Some("postgres://localhost/nucleus"), Some(""), || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["nucleus"]);
            assert!(handler(&matches).is_err());
        });
    }
}
