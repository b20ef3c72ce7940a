//! Console Module
//!
//! The operator-facing dispatcher: prompt, command parsing, history and
//! completion, and the glue to the relay engine, the local shell and the
//! file-transfer client.

pub mod command;
pub mod completion;
pub mod dispatcher;
pub mod history;
pub mod secret;

pub use command::{parse_port, Command, RESERVED_COMMANDS};
pub use completion::{complete, ConsoleMode};
pub use dispatcher::Console;
pub use history::History;
