use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{DownloadError, DownloadResult};
use crate::playlist::{PlaylistDocument, END_LIST_TAG, KEY_TAG, SEGMENT_TAG};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSegment {
    pub index: usize,
    pub uri: String,
}

/// Ordered list of absolute segment URIs from a media playlist. Read-only
/// after construction; the final output must preserve this order.
#[derive(Debug, Clone)]
pub struct SegmentPlan {
    segments: Vec<PlannedSegment>,
}

impl SegmentPlan {
    /// Walks the media playlist. Every `#EXTINF` tag is paired with the next
    /// URI line; `#EXT-X-ENDLIST` (or EOF) ends the walk; an `#EXT-X-KEY`
    /// tag aborts, encrypted streams are unsupported.
    pub fn from_document(doc: &PlaylistDocument) -> DownloadResult<Self> {
        let mut segments = Vec::new();
        let mut pending_segment = false;

        for line in &doc.lines {
            if line.starts_with(END_LIST_TAG) {
                break;
            }
            if line.starts_with(KEY_TAG) {
                return Err(DownloadError::EncryptedUnsupported(doc.source.clone()));
            }
            if line.starts_with(SEGMENT_TAG) {
                pending_segment = true;
            } else if pending_segment && !line.starts_with('#') {
                segments.push(PlannedSegment {
                    index: segments.len(),
                    uri: doc.resolve(line)?,
                });
                pending_segment = false;
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PlannedSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work for the fetch pool. Each job owns a disjoint temp path;
/// no two workers ever write the same file.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub index: usize,
    pub uri: String,
    pub temp_path: PathBuf,
    pub state: JobState,
    pub bytes: u64,
}

impl FetchJob {
    pub fn new(segment: &PlannedSegment, dir: &Path, base: &str) -> Self {
        Self {
            index: segment.index,
            uri: segment.uri.clone(),
            temp_path: part_path(dir, base, segment.index),
            state: JobState::Pending,
            bytes: 0,
        }
    }
}

/// `<dir>/<base>.<index>.part`, the in-flight download target.
pub fn part_path(dir: &Path, base: &str, index: usize) -> PathBuf {
    dir.join(format!("{base}.{index}.part"))
}

/// `<dir>/<base>.<index>.ts`, the stable per-segment name kept when merge=false.
pub fn retained_path(dir: &Path, base: &str, index: usize) -> PathBuf {
    dir.join(format!("{base}.{index}.ts"))
}
