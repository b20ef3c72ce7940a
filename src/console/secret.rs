//! Echo suppression for secret prompts

#[cfg(unix)]
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};
#[cfg(unix)]
use tracing::{debug, warn};

/// Terminal echo stays off while this guard lives
///
/// Only the tty's echo flag changes. Input is still read by the console's
/// single reader, so no keystrokes are lost to a second consumer.
pub struct EchoGuard {
    #[cfg(unix)]
    saved: Termios,
}

impl EchoGuard {
    /// Turn echo off on stdin; `None` when stdin is not a terminal
    #[cfg(unix)]
    pub fn disable() -> Option<Self> {
        let saved = match termios::tcgetattr(std::io::stdin()) {
            Ok(attrs) => attrs,
            Err(e) => {
                debug!("Not suppressing echo, stdin is not a terminal: {}", e);
                return None;
            }
        };

        let mut silent = saved.clone();
        silent.local_flags.remove(LocalFlags::ECHO);
        if let Err(e) = termios::tcsetattr(std::io::stdin(), SetArg::TCSANOW, &silent) {
            warn!("Failed to turn off terminal echo: {}", e);
            return None;
        }

        Some(Self { saved })
    }

    #[cfg(not(unix))]
    pub fn disable() -> Option<Self> {
        None
    }
}

#[cfg(unix)]
impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(std::io::stdin(), SetArg::TCSANOW, &self.saved) {
            warn!("Failed to restore terminal echo: {}", e);
        }
    }
}
