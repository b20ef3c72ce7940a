//! Operator Input
//!
//! Operator keystrokes arrive on a dedicated blocking reader thread and are
//! handed to async consumers through a bounded channel. The console reads
//! whole lines from it; the input relay worker forwards raw units.

use bytes::{Bytes, BytesMut};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

const INPUT_CHANNEL_CAPACITY: usize = 64;
const READ_BUFFER_SIZE: usize = 1024;

/// Shared, cloneable view of the operator's input stream
///
/// All clones consume from the same stream, so a unit is delivered to exactly
/// one reader. Bytes left over after a line are kept for the next reader.
#[derive(Clone)]
pub struct OperatorInput {
    state: Arc<Mutex<InputState>>,
}

struct InputState {
    rx: mpsc::Receiver<Bytes>,
    pending: BytesMut,
}

impl InputState {
    async fn next_unit(&mut self) -> Option<Bytes> {
        if !self.pending.is_empty() {
            return Some(self.pending.split().freeze());
        }
        self.rx.recv().await
    }

    async fn read_line(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let line = self.pending.split_to(pos + 1);
                return Some(decode_line(&line));
            }

            match self.rx.recv().await {
                Some(chunk) => self.pending.extend_from_slice(&chunk),
                None if self.pending.is_empty() => return None,
                None => {
                    let rest = self.pending.split();
                    return Some(decode_line(&rest));
                }
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.trim_end_matches(['\n', '\r']).to_string()
}

impl OperatorInput {
    /// Create an input stream fed by the returned sender
    pub fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let state = InputState {
            rx,
            pending: BytesMut::new(),
        };
        (
            tx,
            Self {
                state: Arc::new(Mutex::new(state)),
            },
        )
    }

    /// Input stream backed by the process's standard input
    pub fn from_stdin() -> Self {
        Self::spawn_reader(std::io::stdin())
    }

    /// Pump a blocking reader into a new input stream on its own thread
    ///
    /// The thread is detached: it ends at end-of-input, on a read error, or
    /// once every [`OperatorInput`] clone has been dropped.
    pub fn spawn_reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, input) = Self::channel(INPUT_CHANNEL_CAPACITY);

        let spawned = std::thread::Builder::new()
            .name("operator-input".to_string())
            .spawn(move || pump(reader, tx));

        if let Err(e) = spawned {
            warn!("Failed to start operator input thread: {}", e);
        }

        input
    }

    /// Next raw unit of input, `None` at end-of-input
    ///
    /// Cancel-safe: dropping the future never loses a unit.
    pub async fn next_unit(&self) -> Option<Bytes> {
        self.state.lock().await.next_unit().await
    }

    /// Next line without its terminator, `None` at end-of-input
    ///
    /// Cancel-safe: partially received lines stay buffered.
    pub async fn read_line(&self) -> Option<String> {
        self.state.lock().await.read_line().await
    }
}

fn pump<R: Read>(mut reader: R, tx: mpsc::Sender<Bytes>) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("Operator input reached end-of-input");
                break;
            }
            Ok(n) => {
                if tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                    debug!("Operator input has no consumers left");
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Operator input read failed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_lines_split_across_units() {
        let (tx, input) = OperatorInput::channel(8);
        tx.send(Bytes::from_static(b"rev")).await.unwrap();
        tx.send(Bytes::from_static(b"erse 4444\r\nhel")).await.unwrap();
        tx.send(Bytes::from_static(b"p\n")).await.unwrap();
        drop(tx);

        assert_eq!(input.read_line().await.as_deref(), Some("reverse 4444"));
        assert_eq!(input.read_line().await.as_deref(), Some("help"));
        assert_eq!(input.read_line().await, None);
    }

    #[tokio::test]
    async fn test_leftover_bytes_become_next_unit() {
        let (tx, input) = OperatorInput::channel(8);
        tx.send(Bytes::from_static(b"exit\nid\n")).await.unwrap();

        assert_eq!(input.read_line().await.as_deref(), Some("exit"));
        assert_eq!(input.next_unit().await, Some(Bytes::from_static(b"id\n")));
    }

    #[tokio::test]
    async fn test_unterminated_last_line() {
        let (tx, input) = OperatorInput::channel(8);
        tx.send(Bytes::from_static(b"whoami")).await.unwrap();
        drop(tx);

        assert_eq!(input.read_line().await.as_deref(), Some("whoami"));
        assert_eq!(input.next_unit().await, None);
    }

    #[tokio::test]
    async fn test_reader_thread_reaches_eof() {
        let input = OperatorInput::spawn_reader(Cursor::new(b"one\ntwo\n".to_vec()));

        assert_eq!(input.read_line().await.as_deref(), Some("one"));
        assert_eq!(input.read_line().await.as_deref(), Some("two"));
        assert_eq!(input.read_line().await, None);
    }
}
