use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".autoapply"))
            .unwrap_or_else(|| PathBuf::from(".autoapply"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn workspace(&self) -> PathBuf {
        self.base.join("workspace")
    }

    /// Per-session browser user-data directories.
    pub fn browser_dir(&self) -> PathBuf {
        self.workspace().join("browser")
    }

    /// Screenshot captures are persisted here; tools return the path, not bytes.
    pub fn media_dir(&self) -> PathBuf {
        self.workspace().join("media")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_base() {
        let paths = Paths::with_base(PathBuf::from("/tmp/aa-test"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/aa-test/config.json"));
        assert!(paths.media_dir().starts_with("/tmp/aa-test/workspace"));
        assert!(paths.browser_dir().starts_with("/tmp/aa-test/workspace"));
    }
}
