//! Per-user directories and small string helpers
//!
//! Locations follow the XDG Base Directory specification:
//!
//! - Config: `~/.config/zia-provider/` - `provider.json`
//! - Data: `~/.local/share/zia-provider/` - CLI state file (`state.json`)
//! - State: `~/.local/state/zia-provider/` - diagnostic log and audit log
//!
//! Platforms without a state directory (macOS, Windows) use the data
//! directory for logs.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "zscaler", "zia-provider")
}

pub fn get_config_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.config_dir().to_path_buf())
}

pub fn get_data_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.data_dir().to_path_buf())
}

pub fn get_state_dir() -> Option<PathBuf> {
    let pd = project_dirs()?;
    Some(pd.state_dir().unwrap_or_else(|| pd.data_dir()).to_path_buf())
}

/// Creates `dir` and its parents, owner-only on Unix.
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .mode(0o700)
            .recursive(true)
            .create(dir)
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
    }
}

/// Creates the data and state directories.
pub fn ensure_dirs() -> std::io::Result<()> {
    for dir in [get_data_dir(), get_state_dir()].into_iter().flatten() {
        create_private_dir(&dir)?;
    }
    Ok(())
}

/// Cuts `s` to at most `max_len` bytes on a char boundary, ending in `...`.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let budget = max_len.saturating_sub(3);
    let end = s
        .char_indices()
        .map(|(idx, c)| idx + c.len_utf8())
        .take_while(|&end| end <= budget)
        .last()
        .unwrap_or(0);
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_strings() {
        assert_eq!(truncate_string("EDIT_LOCK", 20), "EDIT_LOCK");
    }

    #[test]
    fn test_truncate_respects_limit() {
        let cut = truncate_string("Rule with rank 7 is not allowed", 12);
        assert_eq!(cut, "Rule with...");
        assert!(cut.len() <= 12);
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        let cut = truncate_string("règle numéro un", 8);
        assert!(cut.len() <= 8);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_create_private_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        create_private_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
