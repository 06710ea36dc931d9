pub mod config;
pub mod debug;
pub mod downloader;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod net;
pub mod playlist;
pub mod progress;
pub mod segment;
pub mod space;
pub mod variant;


pub use crate::config::DownloaderConfig;
pub use crate::downloader::{DownloadState, M3u8Downloader};
pub use crate::error::{DownloadError, DownloadResult};
pub use crate::fetch::CancelHandle;
pub use crate::playlist::{PlaylistDocument, PlaylistKind};
pub use crate::segment::SegmentPlan;
pub use crate::variant::{Variant, VariantQuery};
