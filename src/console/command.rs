//! Command Parsing

use crate::error::UsageError;
use crate::transfer::TransferDirection;

/// Commands available at the home prompt, with their help text
pub const RESERVED_COMMANDS: &[(&str, &str)] = &[
    ("help", "Displays a list of available commands"),
    ("shell", "Enter interactive shell mode"),
    ("reverse", "Start a reverse shell listener"),
    ("put", "Upload a file via SSH"),
    ("get", "Download a file via SSH"),
    ("history", "Show command history"),
    ("exit", "Exit the program"),
];

/// A parsed home-prompt line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Help,
    Shell,
    Reverse(u16),
    Transfer {
        direction: TransferDirection,
        target: String,
        user: String,
    },
    History,
    Exit,
    Invalid(UsageError),
    Unknown(String),
}

impl Command {
    /// Parse one operator line; the verb is case-insensitive
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(verb) = parts.first() else {
            return Command::Empty;
        };

        match verb.to_lowercase().as_str() {
            "help" if parts.len() == 1 => Command::Help,
            "shell" if parts.len() == 1 => Command::Shell,
            "history" if parts.len() == 1 => Command::History,
            "exit" if parts.len() == 1 => Command::Exit,
            "reverse" => match parse_port(parts.get(1).copied()) {
                Ok(port) => Command::Reverse(port),
                Err(e) => Command::Invalid(e),
            },
            "put" => transfer(TransferDirection::Upload, &parts),
            "get" => transfer(TransferDirection::Download, &parts),
            _ => Command::Unknown(line.to_string()),
        }
    }
}

fn transfer(direction: TransferDirection, parts: &[&str]) -> Command {
    match parts {
        [_, target, user] => Command::Transfer {
            direction,
            target: target.to_string(),
            user: user.to_string(),
        },
        _ => Command::Invalid(UsageError::TransferArguments {
            verb: direction.verb(),
        }),
    }
}

/// Validate a `reverse` port argument
///
/// Only plain decimal digits in `1..=65535` are accepted.
pub fn parse_port(arg: Option<&str>) -> Result<u16, UsageError> {
    let arg = arg.ok_or(UsageError::InvalidPort)?;

    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UsageError::InvalidPort);
    }

    match arg.parse::<u16>() {
        Ok(0) | Err(_) => Err(UsageError::InvalidPort),
        Ok(port) => Ok(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_bounds() {
        assert_eq!(parse_port(Some("1")), Ok(1));
        assert_eq!(parse_port(Some("5000")), Ok(5000));
        assert_eq!(parse_port(Some("65535")), Ok(65535));

        for bad in ["0", "-1", "+80", "65536", "80a", "", " 80"] {
            assert_eq!(parse_port(Some(bad)), Err(UsageError::InvalidPort), "{:?}", bad);
        }
        assert_eq!(parse_port(None), Err(UsageError::InvalidPort));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("  HELP "), Command::Help);
        assert_eq!(Command::parse("Reverse 4444"), Command::Reverse(4444));
        assert_eq!(
            Command::parse("reverse"),
            Command::Invalid(UsageError::InvalidPort)
        );
        assert_eq!(
            Command::parse("get 10.0.0.5 root"),
            Command::Transfer {
                direction: TransferDirection::Download,
                target: "10.0.0.5".to_string(),
                user: "root".to_string(),
            }
        );
        assert_eq!(
            Command::parse("put 10.0.0.5"),
            Command::Invalid(UsageError::TransferArguments { verb: "put" })
        );
        assert_eq!(
            Command::parse("exit now"),
            Command::Unknown("exit now".to_string())
        );
        assert_eq!(Command::parse("ls -la"), Command::Unknown("ls -la".to_string()));
    }
}
