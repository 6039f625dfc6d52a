use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// True when `file_name` matches `pattern`, ignoring case.
pub fn matches(pattern: &Pattern, file_name: &str) -> bool {
    pattern.matches_with(file_name, MATCH_OPTIONS)
}

/// Lists the regular files directly inside `dir` whose name matches
/// `pattern`, sorted by file name. Subdirectories are not visited.
///
/// A missing or unreadable `dir` is an error.
pub fn scan_directory(dir: &Path, pattern: &Pattern) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();

        if !matches(pattern, &name) {
            debug!("Skipping {}", name);
            continue;
        }

        if !entry.path().is_file() {
            debug!("Skipping {}: not a file", name);
            continue;
        }

        files.push(entry.into_path());
    }

    Ok(files)
}
