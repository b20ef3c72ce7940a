//! Relay Session

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Lifecycle of a single `reverse` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Listening,
    Connected,
    Closed,
}

/// Represents the one live relay session of a `reverse` invocation
#[derive(Debug)]
pub struct RelaySession {
    pub session_id: String,
    pub local_addr: SocketAddr,
    pub start_time: Instant,
    state: Mutex<SessionLifecycle>,
    bytes_from_peer: AtomicU64,
    bytes_to_peer: AtomicU64,
}

#[derive(Debug)]
struct SessionLifecycle {
    state: SessionState,
    peer_addr: Option<SocketAddr>,
}

/// Snapshot of a session once it has ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub local_addr: SocketAddr,
    pub peer_addr: Option<SocketAddr>,
    pub duration: Duration,
    pub bytes_from_peer: u64,
    pub bytes_to_peer: u64,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Operator interrupted the listener before any peer connected
    Cancelled(SessionSummary),
    /// Peer closed its side of the channel
    PeerDisconnected(SessionSummary),
    /// The session was ended by a termination request while connected
    Terminated(SessionSummary),
    /// Read or write on the channel failed; handled like a disconnect
    TransportError {
        summary: SessionSummary,
        error: String,
    },
}

impl SessionOutcome {
    pub fn summary(&self) -> &SessionSummary {
        match self {
            SessionOutcome::Cancelled(summary) => summary,
            SessionOutcome::PeerDisconnected(summary) => summary,
            SessionOutcome::Terminated(summary) => summary,
            SessionOutcome::TransportError { summary, .. } => summary,
        }
    }

    /// Whether a peer was ever served
    pub fn served_peer(&self) -> bool {
        self.summary().peer_addr.is_some()
    }
}

impl RelaySession {
    /// Create a new session in the `Listening` state
    pub fn new(session_id: String, local_addr: SocketAddr) -> Self {
        debug!("Creating relay session {} on {}", session_id, local_addr);

        Self {
            session_id,
            local_addr,
            start_time: Instant::now(),
            state: Mutex::new(SessionLifecycle {
                state: SessionState::Listening,
                peer_addr: None,
            }),
            bytes_from_peer: AtomicU64::new(0),
            bytes_to_peer: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle(|l| l.state)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.lifecycle(|l| l.peer_addr)
    }

    /// Move `Listening -> Connected`
    ///
    /// Returns false (and changes nothing) if the session already has a peer
    /// or is closed; a session serves at most one peer.
    pub fn mark_connected(&self, peer: SocketAddr) -> bool {
        self.lifecycle_mut(|l| {
            if l.state != SessionState::Listening {
                return false;
            }
            l.state = SessionState::Connected;
            l.peer_addr = Some(peer);
            true
        })
    }

    /// Move to `Closed`; idempotent
    pub fn close(&self) {
        self.lifecycle_mut(|l| l.state = SessionState::Closed);
    }

    pub fn bytes_from_peer(&self) -> u64 {
        self.bytes_from_peer.load(Ordering::Relaxed)
    }

    pub fn bytes_to_peer(&self) -> u64 {
        self.bytes_to_peer.load(Ordering::Relaxed)
    }

    pub fn add_bytes_from_peer(&self, bytes: u64) {
        self.bytes_from_peer.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_to_peer(&self, bytes: u64) {
        self.bytes_to_peer.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            local_addr: self.local_addr,
            peer_addr: self.peer_addr(),
            duration: self.duration(),
            bytes_from_peer: self.bytes_from_peer(),
            bytes_to_peer: self.bytes_to_peer(),
        }
    }

    /// Log session statistics
    pub fn log_stats(&self) {
        info!(
            session_id = %self.session_id,
            local_addr = %self.local_addr,
            peer_addr = ?self.peer_addr(),
            duration_ms = self.duration().as_millis(),
            bytes_from_peer = self.bytes_from_peer(),
            bytes_to_peer = self.bytes_to_peer(),
            "Relay session finished"
        );
    }

    fn lifecycle<T>(&self, f: impl FnOnce(&SessionLifecycle) -> T) -> T {
        match self.state.lock() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn lifecycle_mut<T>(&self, f: impl FnOnce(&mut SessionLifecycle) -> T) -> T {
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
