//! Container listing parser.
//!
//! The anonymous list endpoint answers with an `EnumerationResults` document.
//! Older service versions put `Url`, `Size` and `LastModified` directly under
//! each `Blob`; newer ones nest size and timestamp under `Properties` and drop
//! `Url`. Both shapes are accepted.

use chrono::{DateTime, Utc};
use quick_xml::errors::IllFormedError;
use quick_xml::events::{BytesText, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::BlobRecord;

const XML_MARKER: &str = "<?xml";

/// Raw text of one `Blob` element's children, as found in the document.
#[derive(Debug, Default)]
struct BlobEntry {
    name: Option<String>,
    url: Option<String>,
    size: Option<String>,
    last_modified: Option<String>,
    content_length: Option<String>,
    properties_last_modified: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Url,
    Size,
    LastModified,
    ContentLength,
    PropertiesLastModified,
}

impl Field {
    fn under_blob(name: &[u8]) -> Option<Self> {
        match name {
            b"Name" => Some(Field::Name),
            b"Url" => Some(Field::Url),
            b"Size" => Some(Field::Size),
            b"LastModified" => Some(Field::LastModified),
            _ => None,
        }
    }

    fn under_properties(name: &[u8]) -> Option<Self> {
        match name {
            b"Content-Length" => Some(Field::ContentLength),
            b"Last-Modified" => Some(Field::PropertiesLastModified),
            _ => None,
        }
    }
}

impl BlobEntry {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Name => &mut self.name,
            Field::Url => &mut self.url,
            Field::Size => &mut self.size,
            Field::LastModified => &mut self.last_modified,
            Field::ContentLength => &mut self.content_length,
            Field::PropertiesLastModified => &mut self.properties_last_modified,
        }
    }

    fn push_text(&mut self, field: Field, text: &str) {
        self.slot(field).get_or_insert_with(String::new).push_str(text);
    }
}

/// Drop everything before the `<?xml` declaration.
///
/// The listing endpoint may prefix the document with bytes from a
/// compatibility transform (typically a mis-decoded byte order mark).
/// A body without a declaration is returned unchanged.
pub fn strip_preamble(body: &str) -> &str {
    match body.find(XML_MARKER) {
        Some(start) => &body[start..],
        None => body,
    }
}

/// Parse a listing body into records, in document order.
///
/// `container_url` is used to build a blob URL when the entry carries none.
/// A malformed or empty document yields an empty listing. Entries whose
/// size or timestamp cannot be read are skipped.
pub fn parse_listing(body: &str, container_url: &str) -> Vec<BlobRecord> {
    let document = strip_preamble(body);
    if document.trim().is_empty() {
        warn!("container listing is empty");
        return Vec::new();
    }

    let entries = match read_entries(document) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "container listing is not a valid enumeration document");
            return Vec::new();
        }
    };

    let records: Vec<BlobRecord> = entries
        .into_iter()
        .filter_map(|entry| to_record(entry, container_url))
        .collect();

    debug!(count = records.len(), "parsed container listing");
    records
}

fn path_is(path: &[Vec<u8>], expected: &[&[u8]]) -> bool {
    path.len() == expected.len() && path.iter().zip(expected).all(|(a, b)| a.as_slice() == *b)
}

fn text_of(text: &BytesText<'_>) -> Result<String, quick_xml::Error> {
    Ok(text.unescape()?.into_owned())
}

/// Collect `EnumerationResults/Blobs/Blob` entries without altering their text.
fn read_entries(document: &str) -> Result<Vec<BlobEntry>, quick_xml::Error> {
    const BLOB: &[&[u8]] = &[b"EnumerationResults", b"Blobs", b"Blob"];
    const PROPERTIES: &[&[u8]] = &[b"EnumerationResults", b"Blobs", b"Blob", b"Properties"];

    let mut reader = Reader::from_str(document);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut entries = Vec::new();
    let mut current: Option<BlobEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                if path_is(&path, &BLOB[..2]) && name == b"Blob" {
                    current = Some(BlobEntry::default());
                } else if current.is_some() && path_is(&path, BLOB) {
                    field = Field::under_blob(&name);
                } else if current.is_some() && path_is(&path, PROPERTIES) {
                    field = Field::under_properties(&name);
                }
                path.push(name);
            }
            Event::Text(t) => {
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    entry.push_text(field, &text_of(&t)?);
                }
            }
            Event::CData(c) => {
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    entry.push_text(field, &String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                path.pop();
                field = None;
                if path_is(&path, &BLOB[..2]) {
                    entries.extend(current.take());
                }
            }
            Event::Eof => {
                return match path.pop() {
                    Some(open) => Err(IllFormedError::MissingEndTag(
                        String::from_utf8_lossy(&open).into_owned(),
                    )
                    .into()),
                    None => Ok(entries),
                };
            }
            _ => {}
        }
    }
}

fn to_record(entry: BlobEntry, container_url: &str) -> Option<BlobRecord> {
    let Some(name) = entry.name.filter(|n| !n.is_empty()) else {
        warn!("skipping blob entry without a name");
        return None;
    };

    let size = match entry.size.or(entry.content_length).as_deref().map(str::trim) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(size) => size,
            Err(e) => {
                warn!(name = %name, size = %raw, error = %e, "skipping blob with unreadable size");
                return None;
            }
        },
        None => {
            warn!(name = %name, "skipping blob without a size");
            return None;
        }
    };

    let last_modified = match entry
        .last_modified
        .or(entry.properties_last_modified)
        .as_deref()
        .map(str::trim)
    {
        Some(raw) => match parse_http_date(raw) {
            Some(at) => at,
            None => {
                warn!(name = %name, last_modified = %raw, "skipping blob with unreadable timestamp");
                return None;
            }
        },
        None => {
            warn!(name = %name, "skipping blob without a timestamp");
            return None;
        }
    };

    let url = match entry.url.filter(|u| !u.is_empty()) {
        Some(url) => url,
        None => format!("{}/{}", container_url.trim_end_matches('/'), name),
    };

    Some(BlobRecord {
        name,
        url,
        size,
        last_modified,
    })
}

/// Parse an RFC 1123 date as sent by the storage service.
fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .map(|at| at.with_timezone(&Utc))
        .ok()
}
