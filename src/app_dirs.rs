use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Centralized application directory resolution
pub struct AppDirs {
    state_dir: PathBuf,
}

impl AppDirs {
    /// Uses `override_dir` when given, else `$HOME/.local/state/slideflow`,
    /// else the platform data directory, else the working directory.
    pub fn resolve(override_dir: Option<&Path>) -> Self {
        let state_dir = if let Some(dir) = override_dir {
            dir.to_path_buf()
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("slideflow")
        } else if let Some(proj_dirs) = ProjectDirs::from("", "", "slideflow") {
            proj_dirs.data_local_dir().to_path_buf()
        } else {
            PathBuf::from(".slideflow")
        };
        Self { state_dir }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("presentations.db")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.state_dir.join("slides")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("slideflow.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_dir_is_used_verbatim() {
        let dirs = AppDirs::resolve(Some(Path::new("/tmp/sf")));
        assert_eq!(dirs.db_path(), PathBuf::from("/tmp/sf/presentations.db"));
        assert_eq!(dirs.media_dir(), PathBuf::from("/tmp/sf/slides"));
        assert_eq!(dirs.log_path(), PathBuf::from("/tmp/sf/slideflow.log"));
    }
}
