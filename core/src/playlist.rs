use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;
use url::Url;

use crate::error::{DownloadError, DownloadResult};
use crate::net::{FetchRequest, NetClient, NetError};

pub const HEADER_TAG: &str = "#EXTM3U";
pub const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";
pub const MEDIA_TAG: &str = "#EXT-X-MEDIA:";
pub const SEGMENT_TAG: &str = "#EXTINF";
pub const END_LIST_TAG: &str = "#EXT-X-ENDLIST";
pub const KEY_TAG: &str = "#EXT-X-KEY:";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum PlaylistKind {
    Media,
    Master,
    Unknown,
}

impl PlaylistKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistKind::Media => "media",
            PlaylistKind::Master => "master",
            PlaylistKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PlaylistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base used to resolve relative references. URL inputs keep the document
/// URL itself so standard URL resolution strips the final path segment;
/// local inputs keep the parent directory.
#[derive(Debug, Clone)]
pub enum BaseUri {
    Url(Url),
    Dir(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PlaylistDocument {
    pub source: String,
    pub base: BaseUri,
    pub lines: Vec<String>,
    pub kind: PlaylistKind,
}

impl PlaylistDocument {
    /// True when the first non-blank line carries the `#EXTM3U` header.
    pub fn has_header(&self) -> bool {
        self.lines
            .first()
            .map(|line| line.starts_with(HEADER_TAG))
            .unwrap_or(false)
    }

    /// Resolves a segment or variant reference against this document.
    /// Absolute references pass through untouched.
    pub fn resolve(&self, reference: &str) -> DownloadResult<String> {
        if reference.contains("://") {
            return Ok(reference.to_string());
        }
        match &self.base {
            BaseUri::Url(url) => url
                .join(reference)
                .map(|joined| joined.to_string())
                .map_err(|err| {
                    DownloadError::NotAPlaylist(format!(
                        "cannot resolve reference \"{reference}\": {err}"
                    ))
                }),
            BaseUri::Dir(dir) => Ok(dir.join(reference).to_string_lossy().into_owned()),
        }
    }
}

fn parse_http_url(source: &str) -> Option<Url> {
    let url = Url::parse(source).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn classify(lines: &[String]) -> PlaylistKind {
    if lines.iter().any(|line| line.starts_with(STREAM_INF_TAG)) {
        PlaylistKind::Master
    } else if lines.iter().any(|line| line.starts_with(SEGMENT_TAG)) {
        PlaylistKind::Media
    } else {
        PlaylistKind::Unknown
    }
}

/// Retrieves an M3U8 document from a URL or a local path and classifies it.
pub fn load_playlist(net: &dyn NetClient, source: &str) -> DownloadResult<PlaylistDocument> {
    let (text, base) = match parse_http_url(source) {
        Some(url) => {
            let resp = net.get(&FetchRequest::new(source)).map_err(|err| match err {
                NetError::Offline(cause) => DownloadError::NoNetwork(cause),
                NetError::Transport(cause) => DownloadError::InputUnreachable(cause),
            })?;
            if !resp.is_success() {
                return Err(DownloadError::InputUnreachable(format!(
                    "\"{source}\" returned status {}",
                    resp.status_code
                )));
            }
            (
                String::from_utf8_lossy(&resp.body).into_owned(),
                BaseUri::Url(url),
            )
        }
        None => {
            let text = fs::read_to_string(source).map_err(|err| {
                DownloadError::InputUnreachable(format!("cannot read \"{source}\": {err}"))
            })?;
            let dir = Path::new(source)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            (text, BaseUri::Dir(dir))
        }
    };

    let lines = split_lines(&text);
    let kind = classify(&lines);
    debug!("classified {source} as {kind} ({} lines)", lines.len());

    Ok(PlaylistDocument {
        source: source.to_string(),
        base,
        lines,
        kind,
    })
}

/// Splits a tag's comma-separated attribute list into key/value pairs.
/// Commas inside quoted values do not split; quotes are stripped.
pub(crate) fn parse_attribute_list(input: &str) -> Vec<(String, String)> {
    let mut parts = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                buf.push(ch);
            }
            ',' if !in_quotes => parts.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    if !buf.is_empty() {
        parts.push(buf);
    }

    parts
        .iter()
        .filter_map(|part| part.split_once('='))
        .map(|(key, value)| {
            (
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            )
        })
        .collect()
}

/// Attribute payload of a tag line, e.g. everything after `#EXT-X-STREAM-INF:`.
pub(crate) fn tag_attributes(line: &str) -> &str {
    line.split_once(':').map(|(_, rest)| rest).unwrap_or("")
}
