//! SFTP Client
//!
//! `ssh2` is blocking; async callers run these methods inside
//! `tokio::task::spawn_blocking`.

use ssh2::{Session, Sftp};
use std::fs::File;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::TransferError;

/// Which way a file moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl TransferDirection {
    /// Console verb for this direction
    pub fn verb(&self) -> &'static str {
        match self {
            TransferDirection::Upload => "put",
            TransferDirection::Download => "get",
        }
    }
}

/// Remote SSH endpoint and login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl TransferTarget {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
        }
    }

    fn resolve(&self) -> Result<SocketAddr, TransferError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| self.connect_error(e.to_string()))?
            .next()
            .ok_or_else(|| self.connect_error("no addresses resolved".to_string()))
    }

    fn connect_error(&self, message: String) -> TransferError {
        TransferError::Connect {
            host: self.host.clone(),
            message,
        }
    }
}

/// Authenticated SFTP session to one host
pub struct SftpClient {
    session: Session,
    sftp: Sftp,
    target: TransferTarget,
}

impl SftpClient {
    /// Connect, handshake and authenticate with a password
    pub fn connect(
        target: &TransferTarget,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, TransferError> {
        let addr = target.resolve()?;
        debug!("Connecting to SSH endpoint {}", addr);

        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| target.connect_error(e.to_string()))?;
        set_socket_timeouts(&tcp, Some(timeout));

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp.try_clone().map_err(|e| target.connect_error(e.to_string()))?);
        session.set_timeout(duration_millis(timeout));
        session.handshake()?;

        session
            .userauth_password(&target.user, password)
            .map_err(|_| authentication_error(target))?;

        if !session.authenticated() {
            return Err(authentication_error(target));
        }

        // Transfers may take longer than the connect timeout
        session.set_timeout(0);
        set_socket_timeouts(&tcp, None);
        let sftp = session.sftp()?;
        info!("SFTP session established with {}@{}", target.user, target.host);

        Ok(Self {
            session,
            sftp,
            target: target.clone(),
        })
    }

    /// Copy a local file to the remote host, returning the bytes written
    pub fn upload(&self, local: &Path, remote: &Path) -> Result<u64, TransferError> {
        let mut local_file = File::open(local).map_err(|source| TransferError::LocalFile {
            path: local.display().to_string(),
            source,
        })?;
        let mut remote_file = self.sftp.create(remote)?;

        let bytes =
            std::io::copy(&mut local_file, &mut remote_file).map_err(TransferError::Stream)?;
        info!(
            "Uploaded {} bytes from {} to {}:{}",
            bytes,
            local.display(),
            self.target.host,
            remote.display()
        );
        Ok(bytes)
    }

    /// Copy a remote file to the local machine, returning the bytes written
    pub fn download(&self, remote: &Path, local: &Path) -> Result<u64, TransferError> {
        let mut remote_file = self.sftp.open(remote)?;
        let mut local_file = File::create(local).map_err(|source| TransferError::LocalFile {
            path: local.display().to_string(),
            source,
        })?;

        let bytes =
            std::io::copy(&mut remote_file, &mut local_file).map_err(TransferError::Stream)?;
        info!(
            "Downloaded {} bytes from {}:{} to {}",
            bytes,
            self.target.host,
            remote.display(),
            local.display()
        );
        Ok(bytes)
    }

    /// Run one transfer in `direction` between the given paths
    pub fn transfer(
        &self,
        direction: TransferDirection,
        local: &Path,
        remote: &Path,
    ) -> Result<u64, TransferError> {
        match direction {
            TransferDirection::Upload => self.upload(local, remote),
            TransferDirection::Download => self.download(remote, local),
        }
    }

    /// Close the SFTP channel and the SSH session
    pub fn close(self) {
        let Self { session, sftp, .. } = self;
        drop(sftp);
        if let Err(e) = session.disconnect(None, "closing", None) {
            debug!("SSH disconnect failed: {}", e);
        }
    }
}

fn authentication_error(target: &TransferTarget) -> TransferError {
    TransferError::Authentication {
        host: target.host.clone(),
        user: target.user.clone(),
    }
}

fn set_socket_timeouts(tcp: &TcpStream, timeout: Option<Duration>) {
    if let Err(e) = tcp.set_read_timeout(timeout) {
        warn!("Failed to set SSH socket read timeout: {}", e);
    }
    if let Err(e) = tcp.set_write_timeout(timeout) {
        warn!("Failed to set SSH socket write timeout: {}", e);
    }
}

fn duration_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn test_direction_verbs() {
        assert_eq!(TransferDirection::Upload.verb(), "put");
        assert_eq!(TransferDirection::Download.verb(), "get");
    }

    #[test]
    fn test_socket_timeouts_cleared() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let tcp = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        set_socket_timeouts(&tcp, Some(Duration::from_secs(3)));
        assert_eq!(tcp.read_timeout().unwrap(), Some(Duration::from_secs(3)));

        set_socket_timeouts(&tcp, None);
        assert_eq!(tcp.read_timeout().unwrap(), None);
        assert_eq!(tcp.write_timeout().unwrap(), None);
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let target = TransferTarget::new("127.0.0.1", port, "operator");

        let result = SftpClient::connect(&target, "secret", Duration::from_secs(2));
        assert!(matches!(result, Err(TransferError::Connect { .. })));
    }

    #[test]
    fn test_non_ssh_server_fails_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n");
            }
        });

        let target = TransferTarget::new("127.0.0.1", port, "operator");
        let result = SftpClient::connect(&target, "secret", Duration::from_secs(2));
        assert!(matches!(result, Err(TransferError::Ssh(_))));

        server.join().unwrap();
    }
}
