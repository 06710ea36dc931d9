use std::collections::HashSet;

use log::{debug, warn};
use serde::Serialize;

use crate::error::{DownloadError, DownloadResult};
use crate::playlist::{
    parse_attribute_list, tag_attributes, PlaylistDocument, MEDIA_TAG, STREAM_INF_TAG,
};

/// One selectable rendition of a master playlist. Bandwidth and resolution
/// stay strings: selection is plain string equality against caller input.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Variant {
    pub name: Option<String>,
    pub bandwidth: Option<String>,
    pub resolution: Option<String>,
    pub uri: String,
}

impl Variant {
    /// `{name: "720", bandwidth: "2149280", resolution: "1280x720"}`, with
    /// empty strings standing in for missing attributes.
    pub fn describe(&self) -> String {
        format!(
            "{{name: \"{}\", bandwidth: \"{}\", resolution: \"{}\"}}",
            self.name.as_deref().unwrap_or(""),
            self.bandwidth.as_deref().unwrap_or(""),
            self.resolution.as_deref().unwrap_or("")
        )
    }
}

/// Selection keys for `select_variant`. Unset keys do not filter.
#[derive(Debug, Clone, Default)]
pub struct VariantQuery {
    pub name: Option<String>,
    pub bandwidth: Option<String>,
    pub resolution: Option<String>,
}

impl VariantQuery {
    pub fn new(
        name: Option<&str>,
        bandwidth: Option<&str>,
        resolution: Option<&str>,
    ) -> Self {
        Self {
            name: name.map(str::to_string),
            bandwidth: bandwidth.map(str::to_string),
            resolution: resolution.map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.bandwidth.is_none() && self.resolution.is_none()
    }

    fn matches(&self, variant: &Variant) -> bool {
        if let Some(name) = &self.name {
            if variant.name.as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(bandwidth) = &self.bandwidth {
            if variant.bandwidth.as_deref() != Some(bandwidth.as_str()) {
                return false;
            }
        }
        if let Some(resolution) = &self.resolution {
            if variant.resolution.as_deref() != Some(resolution.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Walks a master document and builds the variant index from
/// `#EXT-X-STREAM-INF` entries and named `#EXT-X-MEDIA` video entries.
/// Duplicate URIs keep the first occurrence.
pub fn extract_variants(doc: &PlaylistDocument) -> DownloadResult<Vec<Variant>> {
    let mut variants = Vec::new();
    let mut seen = HashSet::new();

    for (i, line) in doc.lines.iter().enumerate() {
        if line.starts_with(STREAM_INF_TAG) {
            let uri_line = match doc.lines.get(i + 1) {
                Some(next) if !next.starts_with('#') => next,
                _ => continue,
            };
            let mut name = None;
            let mut bandwidth = None;
            let mut resolution = None;
            for (key, value) in parse_attribute_list(tag_attributes(line)) {
                match key.as_str() {
                    "NAME" => name = Some(value),
                    "BANDWIDTH" => bandwidth = Some(value),
                    "RESOLUTION" => resolution = Some(value),
                    _ => {}
                }
            }
            let uri = doc.resolve(uri_line)?;
            if seen.insert(uri.clone()) {
                variants.push(Variant {
                    name,
                    bandwidth,
                    resolution,
                    uri,
                });
            }
        } else if line.starts_with(MEDIA_TAG) {
            let mut media_type = None;
            let mut name = None;
            let mut uri = None;
            for (key, value) in parse_attribute_list(tag_attributes(line)) {
                match key.as_str() {
                    "TYPE" => media_type = Some(value),
                    "NAME" => name = Some(value),
                    "URI" => uri = Some(value),
                    _ => {}
                }
            }
            if media_type.as_deref() != Some("VIDEO") {
                continue;
            }
            let (Some(name), Some(uri)) = (name, uri) else {
                continue;
            };
            let uri = doc.resolve(&uri)?;
            if seen.insert(uri.clone()) {
                variants.push(Variant {
                    name: Some(name),
                    bandwidth: None,
                    resolution: None,
                    uri,
                });
            }
        }
    }

    debug!("extracted {} variants from {}", variants.len(), doc.source);
    Ok(variants)
}

fn enumerate_variants(variants: &[Variant]) -> String {
    let listing = variants
        .iter()
        .map(|variant| format!("    {}", variant.describe()))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "found {} variants in the master playlist; provide name, bandwidth, or resolution \
         to pick one:\n[\n{}\n]",
        variants.len(),
        listing
    )
}

/// Picks exactly one variant. A single-entry index auto-selects; otherwise
/// the provided keys filter by equality. Several survivors with keys given
/// keep the first occurrence.
pub fn select_variant(variants: &[Variant], query: &VariantQuery) -> DownloadResult<Variant> {
    if variants.len() == 1 {
        return Ok(variants[0].clone());
    }

    let matched: Vec<&Variant> = variants
        .iter()
        .filter(|variant| query.matches(variant))
        .collect();

    match matched.as_slice() {
        [] => Err(DownloadError::VariantNotFound {
            name: query.name.clone().unwrap_or_default(),
            bandwidth: query.bandwidth.clone().unwrap_or_default(),
            resolution: query.resolution.clone().unwrap_or_default(),
        }),
        [only] => Ok((*only).clone()),
        _ if query.is_empty() => {
            let listing = enumerate_variants(variants);
            warn!("{listing}");
            Err(DownloadError::VariantAmbiguous(listing))
        }
        [first, ..] => Ok((*first).clone()),
    }
}
