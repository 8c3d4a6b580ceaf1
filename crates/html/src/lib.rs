//! HTML content processing for mail filtering.
//!
//! Feed [`process_part_full`] the bytes of a `text/html` part — however
//! malformed — and get back an [`HtmlContent`]: a tolerant document tree
//! with balance diagnostics, the text a reader would actually see, and the
//! derived artifacts scoring runs on (outbound URLs, embedded and external
//! images, per-tag visual blocks with invisible-region exceptions).
//!
//! Nothing here validates HTML. Browsers render broken markup, spammers
//! know it, so the parser recovers from everything and records what it saw
//! in [`ContentFlags`].

mod attr;
mod content;
mod entities;
mod extract;
mod imgprobe;
mod parser;
mod postpass;
mod tags;
mod tree;

pub use content::{
    ComponentKind, ContentFlags, ExceptionKind, Extra, HtmlContent, HtmlImage, HtmlTag, ImageFlags,
    ImageIdx, ProcessException, TagIdx, MAX_TAGS,
};
pub use imgprobe::{probe, ImageDims, ImageFormat};
pub use parser::{process_part, process_part_full};
pub use tags::{by_id, by_name, Tag, TagDef, TagFlags, N_TAGS};

use memchr::{memchr, memchr2};

/// Catalog id for a (lowercase) tag name.
pub fn tag_id_by_name(name: &str) -> Option<Tag> {
    tags::by_name(name).map(|def| def.tag)
}

/// Catalog name for a tag id.
pub fn tag_name_by_id(tag: Tag) -> &'static str {
    tags::by_id(tag).name
}

/// Whether a MIME content type labels an HTML part.
pub fn is_html(content_type: &Option<String>) -> bool {
    let Some(value) = content_type.as_deref() else {
        return false;
    };
    contains_ignore_ascii_case(value, b"text/html")
        || contains_ignore_ascii_case(value, b"application/xhtml")
}

fn contains_ignore_ascii_case(haystack: &str, needle: &[u8]) -> bool {
    let hay = haystack.as_bytes();
    let n = needle.len();
    if n == 0 {
        return true;
    }
    if hay.len() < n {
        return false;
    }
    let first = needle[0];
    let (a, b) = if first.is_ascii_alphabetic() {
        (first.to_ascii_lowercase(), first.to_ascii_uppercase())
    } else {
        (first, first)
    };
    let mut i = 0;
    while i + n <= hay.len() {
        let rel = if a == b {
            memchr(a, &hay[i..])
        } else {
            memchr2(a, b, &hay[i..])
        };
        let Some(rel) = rel else {
            return false;
        };
        let pos = i + rel;
        if pos + n <= hay.len() && hay[pos..pos + n].eq_ignore_ascii_case(needle) {
            return true;
        }
        i = pos + 1;
    }
    false
}
