//! Input Relay Worker
//!
//! Forwards operator input units to the peer, one at a time and in order,
//! for the lifetime of one peer channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{OperatorInput, RelaySession};
use crate::activity::ActivityLog;

/// Why the worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Operator input reached end-of-input
    InputClosed,
    /// Writing to the peer failed
    WriteFailed,
    /// The engine tore the channel down
    Cancelled,
}

/// Background task writing operator input to the peer channel
pub struct InputRelayWorker {
    handle: JoinHandle<WorkerExit>,
    cancel: CancellationToken,
}

impl InputRelayWorker {
    /// Start forwarding `input` into `writer`
    ///
    /// The worker is the only writer on the channel, so units reach the peer
    /// in the order they were read.
    pub fn spawn<W>(
        input: OperatorInput,
        writer: W,
        session: Arc<RelaySession>,
        activity: ActivityLog,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let exit = forward_input(input, writer, &session, &activity, token).await;
            debug!("Input relay worker for {} stopped: {:?}", session.session_id, exit);
            exit
        });

        Self { handle, cancel }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the worker and wait up to `grace` for it to exit
    ///
    /// A worker that does not exit in time is aborted, so teardown never
    /// waits on a blocked write.
    pub async fn stop(mut self, grace: Duration) -> WorkerExit {
        self.cancel.cancel();

        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(exit)) => exit,
            Ok(Err(e)) => {
                warn!("Input relay worker failed: {}", e);
                WorkerExit::Cancelled
            }
            Err(_) => {
                warn!("Input relay worker did not stop within {:?}, aborting", grace);
                self.handle.abort();
                WorkerExit::Cancelled
            }
        }
    }
}

async fn forward_input<W>(
    input: OperatorInput,
    mut writer: W,
    session: &RelaySession,
    activity: &ActivityLog,
    cancel: CancellationToken,
) -> WorkerExit
where
    W: AsyncWrite + Unpin,
{
    loop {
        let unit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return WorkerExit::Cancelled,
            unit = input.next_unit() => unit,
        };

        let Some(unit) = unit else {
            return WorkerExit::InputClosed;
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => return WorkerExit::Cancelled,
            written = writer.write_all(&unit) => written,
        };

        if let Err(e) = written {
            // The engine sees the same failure on its read side and cleans up.
            activity.error(format!("Input handling error: {}", e));
            return WorkerExit::WriteFailed;
        }

        session.add_bytes_to_peer(unit.len() as u64);
    }
}
