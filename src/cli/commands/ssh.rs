use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{path::PathBuf, time::Duration};

use crate::broker::{HostKeyPolicy, SshConfig};

pub const ARG_SSH_CONNECT_TIMEOUT_SECONDS: &str = "ssh-connect-timeout-seconds";
pub const ARG_SSH_COMMAND_TIMEOUT_SECONDS: &str = "ssh-command-timeout-seconds";
pub const ARG_SSH_KNOWN_HOSTS: &str = "ssh-known-hosts";
pub const ARG_SSH_INSECURE: &str = "ssh-insecure-accept-any-host-key";

#[derive(Debug)]
pub struct Options {
    pub connect_timeout_seconds: u64,
    pub command_timeout_seconds: u64,
    pub known_hosts: Option<PathBuf>,
    pub insecure_accept_any_host_key: bool,
}

impl Options {
    /// Parse SSH client arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a timeout is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_seconds = |id: &str| -> anyhow::Result<u64> {
            match matches.get_one::<u64>(id).copied() {
                Some(0) => anyhow::bail!("--{id} must be greater than zero"),
                Some(seconds) => Ok(seconds),
                None => anyhow::bail!("missing required argument: --{id}"),
            }
        };

        Ok(Self {
            connect_timeout_seconds: read_seconds(ARG_SSH_CONNECT_TIMEOUT_SECONDS)?,
            command_timeout_seconds: read_seconds(ARG_SSH_COMMAND_TIMEOUT_SECONDS)?,
            known_hosts: matches
                .get_one::<String>(ARG_SSH_KNOWN_HOSTS)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            insecure_accept_any_host_key: matches.get_flag(ARG_SSH_INSECURE),
        })
    }

    #[must_use]
    pub fn ssh_config(&self) -> SshConfig {
        let policy = if self.insecure_accept_any_host_key {
            HostKeyPolicy::AcceptAny
        } else {
            HostKeyPolicy::KnownHosts(self.known_hosts.clone())
        };

        SshConfig::new()
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_seconds))
            .with_command_timeout(Duration::from_secs(self.command_timeout_seconds))
            .with_host_key_policy(policy)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SSH_CONNECT_TIMEOUT_SECONDS)
                .long(ARG_SSH_CONNECT_TIMEOUT_SECONDS)
                .help("Bound on TCP connect, handshake and authentication")
                .env("NUCLEUS_SSH_CONNECT_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SSH_COMMAND_TIMEOUT_SECONDS)
                .long(ARG_SSH_COMMAND_TIMEOUT_SECONDS)
                .help("Bound on a single remote command run")
                .env("NUCLEUS_SSH_COMMAND_TIMEOUT_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SSH_KNOWN_HOSTS)
                .long(ARG_SSH_KNOWN_HOSTS)
                .help("known_hosts file used to verify remote host keys")
                .long_help("known_hosts file used to verify remote host keys (default: ~/.ssh/known_hosts)")
                .env("NUCLEUS_SSH_KNOWN_HOSTS"),
        )
        .arg(
            Arg::new(ARG_SSH_INSECURE)
                .long(ARG_SSH_INSECURE)
                .help("Skip host key verification (insecure)")
                .env("NUCLEUS_SSH_INSECURE_ACCEPT_ANY_HOST_KEY")
                .action(ArgAction::SetTrue)
                .conflicts_with(ARG_SSH_KNOWN_HOSTS),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("nucleus"))
    }

    fn cleared<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("NUCLEUS_SSH_CONNECT_TIMEOUT_SECONDS", None::<&str>),
                ("NUCLEUS_SSH_COMMAND_TIMEOUT_SECONDS", None),
                ("NUCLEUS_SSH_KNOWN_HOSTS", None),
                ("NUCLEUS_SSH_INSECURE_ACCEPT_ANY_HOST_KEY", None),
            ],
            f,
        );
    }

    #[test]
    fn defaults_verify_host_keys() {
        cleared(|| {
            let matches = command().get_matches_from(["nucleus"]);
            let options = Options::parse(&matches).unwrap();
            let config = options.ssh_config();
            assert_eq!(config.connect_timeout(), Duration::from_secs(10));
            assert_eq!(config.command_timeout(), Duration::from_secs(300));
            assert_eq!(config.host_key_policy(), &HostKeyPolicy::KnownHosts(None));
        });
    }

    #[test]
    fn known_hosts_path() {
        cleared(|| {
            let matches =
                command().get_matches_from(["nucleus", "--ssh-known-hosts", "/etc/ssh/known"]);
            let config = Options::parse(&matches).unwrap().ssh_config();
            assert_eq!(
                config.host_key_policy(),
                &HostKeyPolicy::KnownHosts(Some(PathBuf::from("/etc/ssh/known")))
            );
        });
    }

    #[test]
    fn insecure_opt_out() {
        cleared(|| {
            let matches =
                command().get_matches_from(["nucleus", "--ssh-insecure-accept-any-host-key"]);
            let config = Options::parse(&matches).unwrap().ssh_config();
            assert_eq!(config.host_key_policy(), &HostKeyPolicy::AcceptAny);
        });
    }

    #[test]
    fn insecure_conflicts_with_known_hosts() {
        cleared(|| {
            let result = command().try_get_matches_from([
                "nucleus",
                "--ssh-insecure-accept-any-host-key",
                "--ssh-known-hosts",
                "/tmp/known",
            ]);
            assert_eq!(
                result.map_err(|e| e.kind()).err(),
                Some(clap::error::ErrorKind::ArgumentConflict)
            );
        });
    }

    #[test]
    fn zero_timeout_is_rejected() {
        cleared(|| {
            let matches =
                command().get_matches_from(["nucleus", "--ssh-command-timeout-seconds", "0"]);
            assert!(Options::parse(&matches).is_err());
        });
    }

    #[test]
    fn reads_env() {
        temp_env::with_vars(
            [
                ("NUCLEUS_SSH_CONNECT_TIMEOUT_SECONDS", Some("3")),
                ("NUCLEUS_SSH_COMMAND_TIMEOUT_SECONDS", Some("30")),
                ("NUCLEUS_SSH_KNOWN_HOSTS", None),
                ("NUCLEUS_SSH_INSECURE_ACCEPT_ANY_HOST_KEY", Some("true")),
            ],
            || {
                let matches = command().get_matches_from(["nucleus"]);
                let options = Options::parse(&matches).unwrap();
                assert_eq!(options.connect_timeout_seconds, 3);
                assert_eq!(options.command_timeout_seconds, 30);
                assert!(options.insecure_accept_any_host_key);
            },
        );
    }
}
