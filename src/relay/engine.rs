//! Relay Engine

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{InputRelayWorker, OperatorInput, RelaySession, SessionOutcome};
use crate::activity::ActivityLog;
use crate::config::Config;
use crate::error::ListenerError;

/// Tunables for the accept loop and the output relay loop
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub bind_host: IpAddr,
    pub backlog: u32,
    pub accept_poll_interval: Duration,
    pub read_chunk_size: usize,
    pub worker_shutdown_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            backlog: 5,
            accept_poll_interval: Duration::from_secs(1),
            read_chunk_size: 4096,
            worker_shutdown_timeout: Duration::from_secs(2),
        }
    }
}

/// Cancellation handles for one `reverse` invocation
#[derive(Debug, Clone, Default)]
pub struct RelayControl {
    /// Stops waiting for a peer; has no effect once a peer is connected
    pub cancel: CancellationToken,
    /// Ends the session in any state, including while a peer is connected
    pub terminate: CancellationToken,
}

/// Listening socket owned by a single `reverse` invocation
///
/// Dropping the endpoint closes the socket.
#[derive(Debug)]
pub struct ListenEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ListenEndpoint {
    /// Bind and listen on `addr`
    pub fn bind(addr: SocketAddr, backlog: u32) -> Result<Self, ListenerError> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|source| ListenerError::Bind { addr, source })?;

        // Lets a fresh session reuse a port whose previous peer is still in
        // TIME_WAIT. Two live listeners on one port still conflict.
        #[cfg(unix)]
        socket
            .set_reuseaddr(true)
            .map_err(|source| ListenerError::Bind { addr, source })?;

        socket
            .bind(addr)
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let listener = socket
            .listen(backlog)
            .map_err(|source| ListenerError::Listen { addr, source })?;

        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Listen { addr, source })?;

        debug!("Listen endpoint bound to {} (backlog {})", local_addr, backlog);
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Runs one reverse-listener session at a time
pub struct RelayEngine {
    settings: RelaySettings,
    activity: ActivityLog,
}

impl RelayEngine {
    /// Create a new relay engine with default settings
    pub fn new(activity: ActivityLog) -> Self {
        Self::with_settings(RelaySettings::default(), activity)
    }

    /// Create a new relay engine with custom settings
    pub fn with_settings(settings: RelaySettings, activity: ActivityLog) -> Self {
        Self { settings, activity }
    }

    /// Create a new relay engine from configuration
    pub fn from_config(config: &Config, activity: ActivityLog) -> Self {
        let listener = &config.listener;
        Self::with_settings(
            RelaySettings {
                bind_host: listener.bind_host,
                backlog: listener.backlog,
                accept_poll_interval: listener.accept_poll_interval,
                read_chunk_size: listener.read_chunk_size,
                worker_shutdown_timeout: listener.worker_shutdown_timeout,
            },
            activity,
        )
    }

    /// Bind the listen endpoint for `port` on the configured host
    pub fn bind(&self, port: u16) -> Result<ListenEndpoint, ListenerError> {
        let addr = SocketAddr::new(self.settings.bind_host, port);
        ListenEndpoint::bind(addr, self.settings.backlog)
    }

    /// Listen on `port`, serve one peer, and return when it disconnects,
    /// the operator cancels before a peer arrives, or the session is
    /// terminated
    pub async fn start<W>(
        &self,
        port: u16,
        input: &OperatorInput,
        display: &mut W,
        control: RelayControl,
    ) -> Result<SessionOutcome, ListenerError>
    where
        W: AsyncWrite + Unpin,
    {
        let endpoint = self.bind(port)?;
        self.run(endpoint, input, display, control).await
    }

    /// Serve one peer on an already bound endpoint
    ///
    /// The endpoint is consumed and closed before this returns, after the
    /// peer channel (if any) has been closed.
    pub async fn run<W>(
        &self,
        endpoint: ListenEndpoint,
        input: &OperatorInput,
        display: &mut W,
        control: RelayControl,
    ) -> Result<SessionOutcome, ListenerError>
    where
        W: AsyncWrite + Unpin,
    {
        let local_addr = endpoint.local_addr();
        let port = local_addr.port();
        let session = Arc::new(RelaySession::new(
            uuid::Uuid::new_v4().to_string(),
            local_addr,
        ));

        notify(display, &format!("Listening on port {}\n\n", port)).await;
        self.activity
            .success(format!("Started listener on port {}", port));
        info!("Listening for a peer on {}", local_addr);

        let accepted = self.accept_peer(&endpoint, &control).await;
        let (stream, peer_addr) = match accepted {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                notify(display, "\nListener interrupted. Closing listener.\n").await;
                self.activity.warning("Listener interrupted by user");
                return Ok(self.finish(session, endpoint, SessionKind::Cancelled));
            }
            Err(e) => {
                session.close();
                drop(endpoint);
                return Err(e);
            }
        };

        session.mark_connected(peer_addr);
        notify(display, &format!("Connection received from {}\n", peer_addr)).await;
        self.activity
            .success(format!("Connection received from {}", peer_addr));

        if control.cancel.is_cancelled() {
            debug!("Interrupt arrived after {} connected; relay continues", peer_addr);
        }

        let (reader, writer) = stream.into_split();
        let worker = InputRelayWorker::spawn(
            input.clone(),
            writer,
            Arc::clone(&session),
            self.activity.clone(),
        );

        let end = self
            .relay_output(reader, display, &session, &control.terminate)
            .await;

        let worker_exit = worker.stop(self.settings.worker_shutdown_timeout).await;
        debug!("Peer channel with {} closed (worker: {:?})", peer_addr, worker_exit);

        let kind = match end {
            RelayEnd::PeerClosed => {
                self.activity
                    .info(format!("Connection from {} closed", peer_addr));
                SessionKind::Disconnected
            }
            RelayEnd::PeerFailed(e) => {
                self.activity
                    .error(format!("Connection from {} terminated: {}", peer_addr, e));
                SessionKind::Failed(e.to_string())
            }
            RelayEnd::DisplayFailed(e) => {
                self.activity.error(format!(
                    "Display error while relaying from {}: {}",
                    peer_addr, e
                ));
                SessionKind::Failed(format!("display: {}", e))
            }
            RelayEnd::Terminated => {
                notify(display, "\nSession terminated. Closing connection.\n").await;
                self.activity
                    .warning(format!("Connection from {} closed on termination request", peer_addr));
                SessionKind::Terminated
            }
        };

        Ok(self.finish(session, endpoint, kind))
    }

    /// Bounded-wait accept loop
    ///
    /// Each wait lasts at most `accept_poll_interval`; cancellation is
    /// checked before every wait and observed during it.
    async fn accept_peer(
        &self,
        endpoint: &ListenEndpoint,
        control: &RelayControl,
    ) -> Result<Option<(TcpStream, SocketAddr)>, ListenerError> {
        let poll = self.settings.accept_poll_interval;

        loop {
            if control.cancel.is_cancelled() || control.terminate.is_cancelled() {
                return Ok(None);
            }

            tokio::select! {
                biased;
                _ = control.cancel.cancelled() => return Ok(None),
                _ = control.terminate.cancelled() => return Ok(None),
                accepted = timeout(poll, endpoint.listener.accept()) => match accepted {
                    Err(_) => {
                        trace!("No peer on {} within {:?}", endpoint.local_addr, poll);
                    }
                    Ok(Ok(pair)) => return Ok(Some(pair)),
                    Ok(Err(e)) if is_transient_accept_error(&e) => {
                        warn!("Transient accept error on {}: {}", endpoint.local_addr, e);
                    }
                    Ok(Err(e)) => return Err(ListenerError::Accept(e)),
                },
            }
        }
    }

    /// Copy peer output to the display until EOF, an error, or termination
    ///
    /// Every chunk is flushed before the next read.
    async fn relay_output<R, W>(
        &self,
        mut reader: R,
        display: &mut W,
        session: &RelaySession,
        terminate: &CancellationToken,
    ) -> RelayEnd
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.settings.read_chunk_size];

        loop {
            let read = tokio::select! {
                biased;
                _ = terminate.cancelled() => return RelayEnd::Terminated,
                read = reader.read(&mut buf) => read,
            };

            let n = match read {
                Ok(0) => return RelayEnd::PeerClosed,
                Ok(n) => n,
                Err(e) => return RelayEnd::PeerFailed(e),
            };

            session.add_bytes_from_peer(n as u64);

            let written = tokio::select! {
                biased;
                _ = terminate.cancelled() => return RelayEnd::Terminated,
                written = write_flushed(display, &buf[..n]) => written,
            };

            if let Err(e) = written {
                return RelayEnd::DisplayFailed(e);
            }
        }
    }

    fn finish(
        &self,
        session: Arc<RelaySession>,
        endpoint: ListenEndpoint,
        kind: SessionKind,
    ) -> SessionOutcome {
        session.close();
        drop(endpoint);
        debug!("Listen endpoint {} closed", session.local_addr);
        session.log_stats();

        let summary = session.summary();
        match kind {
            SessionKind::Cancelled => SessionOutcome::Cancelled(summary),
            SessionKind::Disconnected => SessionOutcome::PeerDisconnected(summary),
            SessionKind::Terminated => SessionOutcome::Terminated(summary),
            SessionKind::Failed(error) => SessionOutcome::TransportError { summary, error },
        }
    }
}

enum SessionKind {
    Cancelled,
    Disconnected,
    Terminated,
    Failed(String),
}

/// Why the output relay loop stopped
enum RelayEnd {
    PeerClosed,
    PeerFailed(io::Error),
    DisplayFailed(io::Error),
    Terminated,
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

async fn write_flushed<W>(display: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    display.write_all(bytes).await?;
    display.flush().await
}

/// Status line for the operator; a broken display is not fatal here
async fn notify<W>(display: &mut W, message: &str)
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = write_flushed(display, message.as_bytes()).await {
        warn!("Failed to write to operator display: {}", e);
    }
}
