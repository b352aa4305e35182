use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

/// Segment index that marks attachments served from the service's own API.
const SERVICE_SEGMENT_INDEX: usize = 3;

/// Paths need at least this many `/`-separated segments.
const MIN_SEGMENTS: usize = SERVICE_SEGMENT_INDEX + 1;

const API_SEGMENT: &str = "api";

#[derive(Debug, Error)]
pub enum PathError {
    #[error("attachment path '{path}' has {found} segment(s), expected at least 4")]
    TooFewSegments { path: String, found: usize },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("feed item #{index} is malformed")]
    MalformedItem {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("feed item #{index} has an unusable attachment")]
    Path {
        index: usize,
        #[source]
        source: PathError,
    },
}

/// A story-feed item as the service sends it; only the fields we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    pub header_subtext: String,
    pub contents: RawContents,
}

#[derive(Debug, Deserialize)]
pub struct RawContents {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "attachment_list")]
    pub attachments: Option<Vec<RawAttachment>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AttachmentField {
    List(Vec<RawAttachment>),
    Map(serde_json::Map<String, Value>),
}

/// Text-only posts may send `{}` instead of a list; treat it like `null`.
fn attachment_list<'de, D>(deserializer: D) -> Result<Option<Vec<RawAttachment>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<AttachmentField>::deserialize(deserializer)? {
        Some(AttachmentField::List(list)) => Ok(Some(list)),
        Some(AttachmentField::Map(map)) if map.is_empty() => Ok(None),
        Some(AttachmentField::Map(_)) => Err(D::Error::custom(
            "attachments must be a list of objects with a path",
        )),
        None => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
pub struct RawAttachment {
    pub path: String,
}

/// Lower bound on attachment days, compared as plain strings.
///
/// Only meaningful when written in the same zero-padded form as the feed's
/// days (`YYYY-MM-DD`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cutoff(Option<String>);

impl Cutoff {
    pub fn new(not_before: Option<String>) -> Self {
        Self(not_before)
    }

    pub fn excludes(&self, day: &str) -> bool {
        matches!(&self.0, Some(not_before) if day < not_before.as_str())
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Named view over the fixed layout of an attachment URL:
/// `scheme://host/<service>/.../<base_name>/<day>/<a>/<b>`.
#[derive(Debug, PartialEq, Eq)]
pub struct AttachmentPath<'a> {
    pub service_segment: &'a str,
    pub base_name: &'a str,
    pub day: &'a str,
    /// Last two segments joined with `_`.
    pub local_name: String,
}

impl<'a> AttachmentPath<'a> {
    pub fn parse(path: &'a str) -> Result<Self, PathError> {
        let segments: Vec<&str> = path.split('/').collect();
        let n = segments.len();
        if n < MIN_SEGMENTS {
            return Err(PathError::TooFewSegments {
                path: path.to_string(),
                found: n,
            });
        }

        Ok(Self {
            service_segment: segments[SERVICE_SEGMENT_INDEX],
            base_name: segments[n - 4],
            day: segments[n - 3],
            local_name: segments[n - 2..].join("_"),
        })
    }

    pub fn is_api_hosted(&self) -> bool {
        self.service_segment == API_SEGMENT
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub name: String,
    pub url: String,
}

/// One post with the attachments that survived filtering.
///
/// `base_name` and `day` come from the first surviving attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub description: Option<String>,
    pub group: String,
    pub base_name: String,
    pub day: String,
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub entries: Vec<ContentEntry>,
    /// Number of attachments across all entries.
    pub total: usize,
}

/// Spaces become underscores; nothing else is touched.
pub fn sanitize_group(label: &str) -> String {
    label.replace(' ', "_")
}

pub fn extract_entries(items: &[Value], cutoff: &Cutoff) -> Result<Extraction, ExtractError> {
    let mut extraction = Extraction::default();

    for (index, value) in items.iter().enumerate() {
        let item = RawItem::deserialize(value)
            .map_err(|source| ExtractError::MalformedItem { index, source })?;

        let entry =
            extract_entry(item, cutoff).map_err(|source| ExtractError::Path { index, source })?;

        if let Some(entry) = entry {
            extraction.total += entry.attachments.len();
            extraction.entries.push(entry);
        }
    }

    Ok(extraction)
}

fn extract_entry(item: RawItem, cutoff: &Cutoff) -> Result<Option<ContentEntry>, PathError> {
    let attachments = match item.contents.attachments {
        Some(attachments) if !attachments.is_empty() => attachments,
        _ => return Ok(None),
    };

    let mut origin: Option<(String, String)> = None;
    let mut refs = Vec::with_capacity(attachments.len());

    for attachment in attachments {
        let path = AttachmentPath::parse(&attachment.path)?;

        if path.is_api_hosted() {
            tracing::debug!(path = %attachment.path, "skipping api-hosted attachment");
            continue;
        }
        if cutoff.excludes(path.day) {
            tracing::debug!(path = %attachment.path, day = path.day, "skipping attachment before cutoff");
            continue;
        }

        origin.get_or_insert_with(|| (path.base_name.to_string(), path.day.to_string()));
        refs.push(AttachmentRef {
            name: path.local_name,
            url: attachment.path,
        });
    }

    let Some((base_name, day)) = origin else {
        return Ok(None);
    };

    Ok(Some(ContentEntry {
        description: item.contents.body,
        group: sanitize_group(&item.header_subtext),
        base_name,
        day,
        attachments: refs,
    }))
}
