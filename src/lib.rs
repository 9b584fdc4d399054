//! # Nucleus (session-gated remote execution)
//!
//! `nucleus` authenticates principals, issues signed 24h session tokens carried
//! in an HTTP-only `jwt` cookie, and lets an authenticated caller run a single
//! command on a remote host over SSH.
//!
//! ## Sessions
//!
//! Tokens are HS256 JWTs whose subject is the principal id as a decimal
//! string. There is no server-side revocation: logout only clears the cookie.
//! Malformed, forged, and expired tokens all produce the same `401`.
//!
//! ## Remote execution
//!
//! Every `/execute` call writes an audit row (principal, remote user, host,
//! port) before connecting, then opens one SSH connection, runs one command,
//! returns stdout and stderr combined, and disconnects. Nothing is pooled or
//! retried. Host keys are verified against `known_hosts` unless explicitly
//! disabled.

pub mod api;
pub mod broker;
pub mod cli;
pub mod directory;
pub mod hasher;
pub mod storage;
pub mod token;

use std::time::SystemTime;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Current Unix time in seconds.
#[must_use]
pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
