//! Allow/deny list file storage

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Which of the two policy list files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Allow,
    Deny,
}

impl ListKind {
    fn file_name(self) -> &'static str {
        match self {
            ListKind::Allow => "allow.txt",
            ListKind::Deny => "deny.txt",
        }
    }

    /// Contents written on first run.
    pub fn default_content(self) -> &'static str {
        match self {
            ListKind::Allow => DEFAULT_ALLOW_LIST,
            ListKind::Deny => DEFAULT_DENY_LIST,
        }
    }
}

const DEFAULT_ALLOW_LIST: &str = "\
// Processes matching a line below keep normal priority while foregrounded.
// One image name per line; * and ? globs are allowed, // starts a comment.
explorer.exe
taskmgr.exe
dwm.exe
powerguard-daemon.exe
";

const DEFAULT_DENY_LIST: &str = "\
// Processes matching a line below are always throttled, even when they
// also match the allow list.
";

/// Default location of a list file, next to the daemon config.
pub fn list_path(kind: ListKind) -> PathBuf {
    directories::ProjectDirs::from("", "", "powerguard")
        .map(|dirs| dirs.config_dir().join(kind.file_name()))
        .unwrap_or_else(|| PathBuf::from(kind.file_name()))
}

/// Read a list file, creating it with default contents on first run.
pub fn load_list(kind: ListKind, path: &Path) -> io::Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            save_list(path, kind.default_content())?;
            Ok(kind.default_content().to_string())
        }
        Err(e) => Err(e),
    }
}

/// Overwrite a list file, creating parent directories as needed.
pub fn save_list(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}
