//! Operator Interrupt Handling
//!
//! Turns Ctrl+C (and SIGTERM on unix) into broadcast notifications so the
//! console can decide what an interrupt means in its current state: a hint at
//! the prompt, cancellation while a listener waits for a peer.

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::Result;

/// Kind of interrupt the operator sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Ctrl+C / SIGINT
    Cancel,
    /// SIGTERM
    Terminate,
}

/// Broadcasts operator interrupts to interested components
pub struct InterruptCoordinator {
    interrupt_tx: broadcast::Sender<Interrupt>,
    signal_task: Option<JoinHandle<()>>,
}

impl InterruptCoordinator {
    /// Create a coordinator that does not yet listen for OS signals
    pub fn new() -> Self {
        let (interrupt_tx, _) = broadcast::channel(16);

        Self {
            interrupt_tx,
            signal_task: None,
        }
    }

    /// Get a receiver for interrupt notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Interrupt> {
        self.interrupt_tx.subscribe()
    }

    /// Deliver an interrupt to all current subscribers
    pub fn notify(&self, interrupt: Interrupt) {
        self.notifier().notify(interrupt);
    }

    /// Cloneable handle that can raise interrupts from anywhere
    pub fn notifier(&self) -> InterruptNotifier {
        InterruptNotifier {
            interrupt_tx: self.interrupt_tx.clone(),
        }
    }

    /// Start translating OS signals into interrupts
    ///
    /// Installing the handler replaces the default Ctrl+C behavior, so the
    /// process is no longer killed by SIGINT while the coordinator lives.
    pub fn listen_for_signals(&mut self) -> Result<()> {
        if self.signal_task.is_some() {
            return Ok(());
        }

        info!("Starting interrupt signal listener");
        let notifier = self.notifier();

        #[cfg(unix)]
        let task = {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::spawn(async move {
                loop {
                    let interrupt = tokio::select! {
                        result = signal::ctrl_c() => match result {
                            Ok(()) => Interrupt::Cancel,
                            Err(e) => {
                                warn!("Ctrl+C handler failed: {}", e);
                                break;
                            }
                        },
                        received = sigterm.recv() => match received {
                            Some(()) => Interrupt::Terminate,
                            None => break,
                        },
                    };
                    debug!("Received {:?}", interrupt);
                    notifier.notify(interrupt);
                }
            })
        };

        #[cfg(windows)]
        let task = tokio::spawn(async move {
            while signal::ctrl_c().await.is_ok() {
                debug!("Received Ctrl+C");
                notifier.notify(Interrupt::Cancel);
            }
        });

        self.signal_task = Some(task);
        Ok(())
    }

    /// Cancel `token` on the next interrupt of any kind
    ///
    /// The watch ends when the returned guard is dropped.
    pub fn cancel_on_interrupt(&self, token: CancellationToken) -> InterruptGuard {
        let mut rx = self.subscribe();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                received = rx.recv() => {
                    if received.is_ok() {
                        debug!("Interrupt received, cancelling listener");
                    }
                    token.cancel();
                }
            }
        });

        InterruptGuard { handle }
    }

    /// Cancel `token` on the next [`Interrupt::Terminate`]; Ctrl+C is ignored
    pub fn cancel_on_terminate(&self, token: CancellationToken) -> InterruptGuard {
        let mut rx = self.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = token.cancelled() => return,
                    received = rx.recv() => received,
                };

                match received {
                    Ok(Interrupt::Terminate) => {
                        debug!("Terminate received, ending relay session");
                        token.cancel();
                        return;
                    }
                    Ok(Interrupt::Cancel) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        InterruptGuard { handle }
    }
}

impl Default for InterruptCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.signal_task.take() {
            task.abort();
        }
    }
}

/// Raises interrupts on behalf of an [`InterruptCoordinator`]
#[derive(Clone)]
pub struct InterruptNotifier {
    interrupt_tx: broadcast::Sender<Interrupt>,
}

impl InterruptNotifier {
    pub fn notify(&self, interrupt: Interrupt) {
        if self.interrupt_tx.send(interrupt).is_err() {
            debug!("Interrupt {:?} had no subscribers", interrupt);
        }
    }
}

/// Stops an interrupt watch when dropped
pub struct InterruptGuard {
    handle: JoinHandle<()>,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
