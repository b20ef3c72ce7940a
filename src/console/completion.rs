//! Tab Completion

use std::io;
use std::path::Path;

use super::command::RESERVED_COMMANDS;

/// Where the operator currently is; decides what completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleMode {
    #[default]
    Home,
    Shell,
}

/// Candidates for `prefix` in `mode`
///
/// Home mode completes command names; shell mode completes the given
/// directory entries. Results are sorted.
pub fn complete(mode: ConsoleMode, prefix: &str, entries: &[String]) -> Vec<String> {
    let mut options: Vec<String> = match mode {
        ConsoleMode::Home => RESERVED_COMMANDS
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| name.starts_with(prefix))
            .map(str::to_string)
            .collect(),
        ConsoleMode::Shell => entries
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .cloned()
            .collect(),
    };
    options.sort();
    options
}

/// Names of the entries in `dir`
pub fn directory_entries(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// The word being completed in `line`: the last whitespace-separated token
pub fn completion_prefix(line: &str) -> &str {
    if line.ends_with(char::is_whitespace) {
        return "";
    }
    line.split_whitespace().last().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_mode_completes_commands() {
        assert_eq!(complete(ConsoleMode::Home, "re", &[]), vec!["reverse"]);
        assert_eq!(complete(ConsoleMode::Home, "h", &[]), vec!["help", "history"]);
        assert!(complete(ConsoleMode::Home, "zz", &[]).is_empty());
    }

    #[test]
    fn test_shell_mode_completes_entries() {
        let entries = vec![
            "src".to_string(),
            "Cargo.toml".to_string(),
            "scripts".to_string(),
        ];
        assert_eq!(
            complete(ConsoleMode::Shell, "s", &entries),
            vec!["scripts", "src"]
        );
        // Command names are not offered in shell mode
        assert!(complete(ConsoleMode::Shell, "rev", &entries).is_empty());
    }

    #[test]
    fn test_completion_prefix() {
        assert_eq!(completion_prefix("rev"), "rev");
        assert_eq!(completion_prefix("cat sr"), "sr");
        assert_eq!(completion_prefix("cat "), "");
    }

    #[test]
    fn test_directory_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("loot.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("logs")).unwrap();

        let mut names = directory_entries(dir.path()).unwrap();
        names.sort();
        assert_eq!(names, vec!["logs", "loot.txt"]);
    }
}
