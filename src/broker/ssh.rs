use async_trait::async_trait;
use russh::keys::{HashAlg, PublicKey};
use russh::{client, ChannelMsg, Disconnect};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ExecutionError, ExecutionRequest, RemoteShell};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// How the remote host key is checked during the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept only keys present in a known_hosts file. `None` means the
    /// user's default `~/.ssh/known_hosts`.
    KnownHosts(Option<PathBuf>),
    /// Accept any key. Only for trusted networks.
    AcceptAny,
}

#[derive(Clone, Debug)]
pub struct SshConfig {
    connect_timeout: Duration,
    command_timeout: Duration,
    host_key_policy: HostKeyPolicy,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SshConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            host_key_policy: HostKeyPolicy::KnownHosts(None),
        }
    }

    /// Bound on TCP connect, handshake, and authentication, each.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound on the command from exec until the channel closes.
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    #[must_use]
    pub fn host_key_policy(&self) -> &HostKeyPolicy {
        &self.host_key_policy
    }
}

/// SSH password-authenticated shell; one fresh connection per run.
#[derive(Clone, Debug, Default)]
pub struct SshShell {
    config: SshConfig,
}

impl SshShell {
    #[must_use]
    pub fn new(config: SshConfig) -> Self {
        if config.host_key_policy == HostKeyPolicy::AcceptAny {
            warn!("SSH host key verification is disabled; any remote key will be accepted");
        }
        Self { config }
    }

    async fn connect(
        &self,
        request: &ExecutionRequest,
    ) -> Result<client::Handle<HostKeyVerifier>, ExecutionError> {
        let limit = self.config.connect_timeout;
        let target = format!("{}:{}", request.host, request.port);

        let stream = timeout(limit, TcpStream::connect((request.host.as_str(), request.port)))
            .await
            .map_err(|_| ExecutionError::ConnectionFailed(format!("timed out connecting to {target}")))?
            .map_err(|err| ExecutionError::ConnectionFailed(format!("{target}: {err}")))?;

        debug!(%target, "TCP connection established");

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.config.command_timeout),
            ..client::Config::default()
        });
        let verifier = HostKeyVerifier {
            host: request.host.clone(),
            port: request.port,
            policy: self.config.host_key_policy.clone(),
        };

        let mut handle = timeout(limit, client::connect_stream(config, stream, verifier))
            .await
            .map_err(|_| ExecutionError::AuthenticationFailed("handshake timed out".to_string()))?
            .map_err(|err| ExecutionError::AuthenticationFailed(format!("handshake failed: {err}")))?;

        let auth = timeout(
            limit,
            handle.authenticate_password(
                request.username.clone(),
                request.password.expose_secret().to_string(),
            ),
        )
        .await
        .map_err(|_| ExecutionError::AuthenticationFailed("authentication timed out".to_string()))?
        .map_err(|err| ExecutionError::AuthenticationFailed(err.to_string()))?;

        match auth {
            client::AuthResult::Success => Ok(handle),
            client::AuthResult::Failure { .. } => {
                disconnect(&handle).await;
                Err(ExecutionError::AuthenticationFailed(
                    "password rejected".to_string(),
                ))
            }
        }
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run(
        &self,
        request: &ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, ExecutionError> {
        let handle = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ExecutionError::Cancelled),
            handle = self.connect(request) => handle?,
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ExecutionError::Cancelled),
            result = timeout(self.config.command_timeout, run_command(&handle, &request.command)) => {
                result.unwrap_or_else(|_| Err(ExecutionError::CommandFailed("timed out".to_string())))
            }
        };

        disconnect(&handle).await;

        result
    }
}

async fn run_command(
    handle: &client::Handle<HostKeyVerifier>,
    command: &str,
) -> Result<Vec<u8>, ExecutionError> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|err| ExecutionError::SessionFailed(err.to_string()))?;

    channel
        .exec(true, command)
        .await
        .map_err(|err| ExecutionError::CommandFailed(err.to_string()))?;

    let mut output = Vec::new();
    let mut exit_status = None;

    let failure = loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => output.extend_from_slice(&data),
            Some(ChannelMsg::ExtendedData { data, .. }) => output.extend_from_slice(&data),
            Some(ChannelMsg::ExitStatus { exit_status: status }) => exit_status = Some(status),
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                break Some(format!("terminated by signal {signal_name:?}"));
            }
            Some(ChannelMsg::Failure) => {
                break Some("remote refused to execute the command".to_string());
            }
            Some(ChannelMsg::Close) | None => break None,
            Some(_) => {}
        }
    };

    if let Err(err) = channel.close().await {
        debug!(error = %err, "channel already closed");
    }

    if let Some(reason) = failure {
        return Err(ExecutionError::CommandFailed(reason));
    }

    match exit_status {
        Some(0) => Ok(output),
        Some(code) => Err(ExecutionError::CommandFailed(format!(
            "exited with status {code}"
        ))),
        None => Err(ExecutionError::CommandFailed(
            "no exit status received".to_string(),
        )),
    }
}

async fn disconnect(handle: &client::Handle<HostKeyVerifier>) {
    if let Err(err) = handle
        .disconnect(Disconnect::ByApplication, "", "en")
        .await
    {
        warn!(error = %err, "Failed to disconnect SSH session");
    }
}

struct HostKeyVerifier {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl client::Handler for HostKeyVerifier {
    type Error = russh::Error;

    async fn check_server_key(&mut self, key: &PublicKey) -> Result<bool, Self::Error> {
        let fingerprint = key.fingerprint(HashAlg::Sha256);

        let known_hosts = match &self.policy {
            HostKeyPolicy::AcceptAny => {
                warn!(host = %self.host, %fingerprint, "Accepting host key without verification");
                return Ok(true);
            }
            HostKeyPolicy::KnownHosts(path) => path,
        };

        let checked = match known_hosts {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, key, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, key),
        };

        match checked {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!(host = %self.host, port = self.port, %fingerprint, "Unknown host key, rejecting");
                Ok(false)
            }
            Err(err) => {
                warn!(host = %self.host, port = self.port, %fingerprint, error = %err, "Host key verification failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_verify_host_keys() {
        let config = SshConfig::new();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.command_timeout(), Duration::from_secs(300));
        assert_eq!(config.host_key_policy(), &HostKeyPolicy::KnownHosts(None));
    }

    #[test]
    fn builder_overrides() {
        let config = SshConfig::new()
            .with_connect_timeout(Duration::from_secs(1))
            .with_command_timeout(Duration::from_secs(2))
            .with_host_key_policy(HostKeyPolicy::AcceptAny);
        assert_eq!(config.connect_timeout(), Duration::from_secs(1));
        assert_eq!(config.command_timeout(), Duration::from_secs(2));
        assert_eq!(config.host_key_policy(), &HostKeyPolicy::AcceptAny);
    }

    #[tokio::test]
    async fn cancelled_before_connect() {
        let shell = SshShell::new(SshConfig::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = ExecutionRequest {
            username: "root".to_string(),
            password: "pw".to_string().into(),
            // TEST-NET-1, never routable
            host: "192.0.2.1".to_string(),
            port: 22,
            command: "true".to_string(),
        };
        let err = shell.run(&request, cancel).await.unwrap_err();
        assert_eq!(err, ExecutionError::Cancelled);
    }
}
