//! File-name patterns for local data files
//!
//! Patterns look like shell globs (`data/*.csv`,
//! `data/2019_all_contracts_prime_transactions_*.csv`). Wildcards are only
//! allowed in the final path component: `*` matches any run of characters,
//! `?` exactly one.

use regex::Regex;
use spendlake_common::{Result, SpendlakeError};
use std::fmt;
use std::path::{Path, PathBuf};

/// A directory plus a wildcard pattern for file names inside it
#[derive(Debug, Clone)]
pub struct FilePattern {
    dir: PathBuf,
    name_glob: String,
    name: Regex,
}

impl FilePattern {
    /// Parse `dir/name-glob`; a bare name-glob means the current directory
    pub fn new(pattern: &str) -> Result<Self> {
        let path = Path::new(pattern);
        let name_glob = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SpendlakeError::Config(format!("Pattern '{}' has no file name", pattern))
            })?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        Self::in_dir(dir, name_glob)
    }

    pub fn in_dir(dir: impl Into<PathBuf>, name_glob: &str) -> Result<Self> {
        let dir = dir.into();
        if dir.to_string_lossy().contains(|c: char| c == '*' || c == '?') {
            return Err(SpendlakeError::Config(format!(
                "Wildcards are only supported in file names, not in '{}'",
                dir.display()
            )));
        }

        let name = Regex::new(&glob_to_regex(name_glob)).map_err(|e| {
            SpendlakeError::Config(format!("Invalid file pattern '{}': {}", name_glob, e))
        })?;

        Ok(Self {
            dir,
            name_glob: name_glob.to_string(),
            name,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.name.is_match(file_name)
    }

    /// Regular files in the directory whose names match, sorted by name
    ///
    /// A missing directory matches nothing.
    pub fn matching_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if self.matches(name) {
                    files.push(entry.path());
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

impl fmt::Display for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir.join(&self.name_glob).display())
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    pattern.push('$');
    pattern
}

/// Base name of a path as UTF-8, or an error naming the path
pub fn file_name_str(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SpendlakeError::Config(format!("'{}' has no file name", path.display())))
}
