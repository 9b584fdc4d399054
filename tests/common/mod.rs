//! In-process SSH server used by the integration tests.
//!
//! Accepts one fixed password and answers a few canned `exec` commands:
//! - `greet`: writes `hello` to stdout and `careful` to stderr, exits 0
//! - `fail`: writes `boom` to stderr, exits 3
//! - `hang`: never replies
//!
//! Anything else exits 127.

#![allow(dead_code)]

use anyhow::{Context, Result};
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::{Algorithm, PrivateKey, PublicKey};
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub const SSH_USER: &str = "deploy";
pub const SSH_PASSWORD: &str = "correct horse";

pub struct TestSshServer {
    pub port: u16,
    pub public_key: PublicKey,
}

impl TestSshServer {
    /// Bind to an ephemeral loopback port and serve connections in the background.
    pub async fn start() -> Result<Self> {
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
            .context("Failed to generate host key")?;
        let public_key = key.public_key().clone();

        let config = Arc::new(server::Config {
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            keys: vec![key],
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let config = config.clone();
                tokio::spawn(async move {
                    if let Ok(session) = server::run_stream(config, stream, CannedHandler).await {
                        let _ = session.await;
                    }
                });
            }
        });

        Ok(Self { port, public_key })
    }

    /// Write this server's host key into a `known_hosts` file at `path`.
    pub fn learn_into(&self, path: &Path) -> Result<()> {
        russh::keys::known_hosts::learn_known_hosts_path("127.0.0.1", self.port, &self.public_key, path)
            .context("Failed to write known_hosts entry")?;
        Ok(())
    }
}

struct CannedHandler;

impl server::Handler for CannedHandler {
    type Error = anyhow::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == SSH_USER && password == SSH_PASSWORD {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let _ = session.channel_success(channel);

        let exit_status = match data {
            b"greet" => {
                let _ = session.data(channel, CryptoVec::from_slice(b"hello\n"));
                let _ = session.extended_data(channel, 1, CryptoVec::from_slice(b"careful\n"));
                0
            }
            b"fail" => {
                let _ = session.extended_data(channel, 1, CryptoVec::from_slice(b"boom\n"));
                3
            }
            b"hang" => return Ok(()),
            _ => 127,
        };

        let _ = session.exit_status_request(channel, exit_status);
        let _ = session.eof(channel);
        let _ = session.close(channel);
        Ok(())
    }
}
