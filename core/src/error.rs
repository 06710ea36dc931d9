use thiserror::Error;

/// Errors surfaced by the downloader. One family; `kind` gives a stable
/// machine-readable tag for each variant.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("no network connection: {0}")]
    NoNetwork(String),
    #[error("input playlist unreachable: {0}")]
    InputUnreachable(String),
    #[error("\"{0}\" is not identified as either a media or a master playlist")]
    NotAPlaylist(String),
    #[error("\"{0}\" is a master playlist; use download_master_playlist instead")]
    WrongMethodMaster(String),
    #[error("\"{0}\" is a media playlist; use download_playlist instead")]
    WrongMethodMedia(String),
    #[error("variant \"{0}\" did not resolve to a media playlist")]
    MalformedMaster(String),
    #[error("{0}")]
    VariantAmbiguous(String),
    #[error("no variant matched name=\"{name}\", bandwidth=\"{bandwidth}\", resolution=\"{resolution}\"")]
    VariantNotFound {
        name: String,
        bandwidth: String,
        resolution: String,
    },
    #[error("not enough free space: required {required} bytes, available {available} bytes")]
    InsufficientSpace { required: u64, available: u64 },
    #[error("segment {index} ({uri}) failed after retries: {cause}")]
    SegmentFetchFailed {
        index: usize,
        uri: String,
        cause: String,
    },
    #[error("failed to assemble output: {0}")]
    BuildFailed(String),
    #[error("playlist is encrypted ({0}); encrypted streams are not supported")]
    EncryptedUnsupported(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::NoNetwork(_) => "no_network",
            DownloadError::InputUnreachable(_) => "input_unreachable",
            DownloadError::NotAPlaylist(_) => "not_a_playlist",
            DownloadError::WrongMethodMaster(_) => "wrong_method_master",
            DownloadError::WrongMethodMedia(_) => "wrong_method_media",
            DownloadError::MalformedMaster(_) => "malformed_master",
            DownloadError::VariantAmbiguous(_) => "variant_ambiguous",
            DownloadError::VariantNotFound { .. } => "variant_not_found",
            DownloadError::InsufficientSpace { .. } => "insufficient_space",
            DownloadError::SegmentFetchFailed { .. } => "segment_fetch_failed",
            DownloadError::BuildFailed(_) => "build_failed",
            DownloadError::EncryptedUnsupported(_) => "encrypted_unsupported",
            DownloadError::InvalidConfig(_) => "invalid_config",
            DownloadError::Cancelled => "cancelled",
        }
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
