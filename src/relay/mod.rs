//! Listener Relay Module
//! 
//! Single-peer reverse listener: accepts one peer, relays its output to the
//! operator display and the operator's keystrokes back to the peer.

pub mod engine;
pub mod input;
pub mod session;
pub mod worker;

pub use engine::{ListenEndpoint, RelayControl, RelayEngine, RelaySettings};
pub use input::OperatorInput;
pub use session::{RelaySession, SessionOutcome, SessionState, SessionSummary};
pub use worker::{InputRelayWorker, WorkerExit};
