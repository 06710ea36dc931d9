use crate::error::{DownloadError, DownloadResult};

pub const DEFAULT_DEBUG_PATH: &str = "debug.log";
pub const DEFAULT_MAX_THREADS: usize = 10;

/// Per-downloader configuration. Mutation goes through the facade's
/// validating setters; `validate` is re-checked before every invocation.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub input: String,
    pub output: String,
    pub skip_space_check: bool,
    pub debug: bool,
    pub debug_path: String,
    pub max_threads: usize,
}

impl DownloaderConfig {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            skip_space_check: false,
            debug: false,
            debug_path: DEFAULT_DEBUG_PATH.to_string(),
            max_threads: DEFAULT_MAX_THREADS,
        }
    }

    pub fn validate(&self) -> DownloadResult<()> {
        if self.input.trim().is_empty() {
            return Err(DownloadError::InvalidConfig(
                "input path must not be empty".to_string(),
            ));
        }
        if self.output.trim().is_empty() {
            return Err(DownloadError::InvalidConfig(
                "output path must not be empty".to_string(),
            ));
        }
        if self.max_threads == 0 {
            return Err(DownloadError::InvalidConfig(
                "max_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DownloaderConfig::new("in.m3u8", "out");
        assert!(!config.skip_space_check);
        assert!(!config.debug);
        assert_eq!(config.debug_path, "debug.log");
        assert_eq!(config.max_threads, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_threads_is_invalid() {
        let mut config = DownloaderConfig::new("in.m3u8", "out");
        config.max_threads = 0;
        assert!(matches!(
            config.validate(),
            Err(DownloadError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_paths_are_invalid() {
        let config = DownloaderConfig::new("", "out");
        assert!(config.validate().is_err());
        let config = DownloaderConfig::new("in.m3u8", "  ");
        assert!(config.validate().is_err());
    }
}
