//! Error Types
//!
//! Typed errors for the relay core, the command parser and the file-transfer
//! collaborator. Application edges wrap these in `anyhow::Error`.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Operator input that was rejected before any component ran
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// `reverse` without a usable port
    #[error("Usage: reverse <port>")]
    InvalidPort,

    /// `put`/`get` with the wrong number of arguments
    #[error("Usage: {verb} <target> <username>")]
    TransferArguments { verb: &'static str },
}

/// Failures that end a `reverse` invocation before or instead of serving a peer
#[derive(Error, Debug)]
pub enum ListenerError {
    /// Socket could not be bound (port in use, permission denied)
    #[error("Failed to bind listener to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Bound socket could not be put into listening state
    #[error("Failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Accept failed with a non-transient error
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// Secure file transfer failures
#[derive(Error, Debug)]
pub enum TransferError {
    /// TCP connect to the SSH endpoint failed or timed out
    #[error("Failed to connect to {host}: {message}")]
    Connect { host: String, message: String },

    /// SSH protocol error (handshake, channel, SFTP subsystem)
    #[error("{0}")]
    Ssh(#[from] ssh2::Error),

    /// Credentials were rejected
    #[error("Authentication failed for {user}@{host}")]
    Authentication { host: String, user: String },

    /// Local file could not be read or written
    #[error("{path}: {source}")]
    LocalFile {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Copy between local and remote file failed mid-stream
    #[error("Transfer interrupted: {0}")]
    Stream(#[source] io::Error),
}
