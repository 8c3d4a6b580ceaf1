//! URL model shared by the content-processing engine.
//!
//! A [`Url`] pairs the raw string extracted from a message part with its
//! parsed form and the scanner annotations accumulated for it. The
//! [`UrlSet`] is the per-message de-duplication structure: the same target
//! reached from several parts keeps one entry whose flags are merged and
//! whose count grows.

use bitflags::bitflags;
use std::collections::HashMap;

bitflags! {
    /// Scanner annotations attached to an extracted URL.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct UrlFlags: u32 {
        /// Found inside the query string of another URL.
        const QUERY = 1 << 0;
        /// Referenced as an image source.
        const IMAGE = 1 << 1;
        /// Appeared as the displayed text of a link.
        const DISPLAYED = 1 << 2;
        /// Displayed text named a different host than the link target.
        const PHISHED = 1 << 3;
        /// Reserved for the subject-line correlation pass.
        const SUBJECT = 1 << 4;
    }
}

#[derive(Clone, Debug)]
pub struct Url {
    raw: String,
    inner: url::Url,
    pub flags: UrlFlags,
    pub count: usize,
}

impl Url {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    pub fn host(&self) -> Option<&str> {
        self.inner.host_str()
    }

    pub fn query(&self) -> Option<&str> {
        self.inner.query()
    }

    pub fn path(&self) -> &str {
        self.inner.path()
    }

    /// For `mailto:` URLs, whether a non-empty local part is present.
    pub fn has_mail_user(&self) -> bool {
        if self.scheme() != "mailto" {
            return false;
        }
        match self.inner.path().find('@') {
            Some(at) => at > 0,
            None => false,
        }
    }
}

/// Parse a single URL candidate.
///
/// Control bytes and surrounding ASCII whitespace are trimmed first; the
/// candidate must carry a scheme (`parse` fails on scheme-less input, which
/// is the caller's cue to resolve against a base first). Parse failures
/// yield `None`, never an error.
pub fn parse_url(input: &str) -> Option<Url> {
    let trimmed =
        input.trim_matches(|c: char| c.is_ascii_whitespace() || c.is_ascii_control());
    if trimmed.is_empty() {
        return None;
    }
    let inner = url::Url::parse(trimmed).ok()?;
    Some(Url {
        raw: trimmed.to_string(),
        inner,
        flags: UrlFlags::empty(),
        count: 1,
    })
}

/// Outcome of [`UrlSet::add_or_increase`]; both variants carry the index of
/// the surviving entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted(usize),
    Existing(usize),
}

/// Insertion-ordered, string-keyed URL de-duplication set.
#[derive(Debug, Default)]
pub struct UrlSet {
    index: HashMap<String, usize>,
    urls: Vec<Url>,
}

impl UrlSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Url> {
        self.urls.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.urls.iter()
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.index.contains_key(raw)
    }

    /// Insert a URL, or merge it into the existing entry with the same raw
    /// string: flags are OR-ed together and the count is bumped.
    pub fn add_or_increase(&mut self, url: Url) -> AddOutcome {
        if let Some(&i) = self.index.get(url.as_str()) {
            let existing = &mut self.urls[i];
            existing.flags |= url.flags;
            existing.count += 1;
            AddOutcome::Existing(i)
        } else {
            let i = self.urls.len();
            self.index.insert(url.as_str().to_string(), i);
            self.urls.push(url);
            AddOutcome::Inserted(i)
        }
    }

    /// Merge flags into an already-present entry, keyed by raw string.
    /// Returns whether the entry existed.
    pub fn flag(&mut self, raw: &str, flags: UrlFlags) -> bool {
        match self.index.get(raw) {
            Some(&i) => {
                self.urls[i].flags |= flags;
                true
            }
            None => false,
        }
    }
}

fn is_url_end(b: u8) -> bool {
    b.is_ascii_whitespace()
        || matches!(b, b'"' | b'\'' | b'<' | b'>' | b'(' | b')' | b'[' | b']' | b'{' | b'}' | b'|')
}

fn scheme_start(bytes: &[u8], colon: usize) -> Option<usize> {
    let mut start = colon;
    while start > 0 {
        let b = bytes[start - 1];
        if b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.' {
            start -= 1;
        } else {
            break;
        }
    }
    (start < colon && bytes[start].is_ascii_alphabetic()).then_some(start)
}

fn span_end(bytes: &[u8], from: usize) -> usize {
    let mut end = from;
    while end < bytes.len() && !is_url_end(bytes[end]) {
        end += 1;
    }
    // Trailing punctuation is almost never part of the target.
    while end > from && matches!(bytes[end - 1], b'.' | b',' | b';' | b':' | b'!' | b'?') {
        end -= 1;
    }
    end
}

/// Find URLs embedded in plain text.
///
/// Recognized shapes: `scheme://...` spans, bare `www.` spans (promoted to
/// `http://`), and `mailto:` addresses. A `mailto:` without a local part is
/// rejected. Byte offsets into `text` are returned alongside each URL.
pub fn find_urls(text: &str) -> Vec<(usize, Url)> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();

    let mut i = 0;
    while let Some(rel) = text[i..].find("://") {
        let colon = i + rel;
        let Some(start) = scheme_start(bytes, colon) else {
            i = colon + 3;
            continue;
        };
        let end = span_end(bytes, colon + 3);
        if end > colon + 3
            && let Some(url) = parse_url(&text[start..end])
        {
            found.push((start, url));
        }
        i = end.max(colon + 3);
    }

    let mut i = 0;
    while let Some(rel) = text[i..].find("www.") {
        let start = i + rel;
        let boundary = start == 0 || is_url_end(bytes[start - 1]);
        let end = span_end(bytes, start);
        // Skip spans already captured as part of a scheme-full URL.
        let inside_scheme = found
            .iter()
            .any(|(s, u)| start >= *s && start < s + u.as_str().len());
        if boundary && !inside_scheme && end > start + 4 {
            let promoted = format!("http://{}", &text[start..end]);
            if let Some(url) = parse_url(&promoted) {
                found.push((start, url));
            }
        }
        i = end.max(start + 4);
    }

    let mut i = 0;
    while let Some(rel) = text[i..].find("mailto:") {
        let start = i + rel;
        let end = span_end(bytes, start);
        if let Some(url) = parse_url(&text[start..end])
            && url.has_mail_user()
        {
            found.push((start, url));
        }
        i = end.max(start + 7);
    }

    found.sort_by_key(|(pos, _)| *pos);
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_url_requires_scheme() {
        assert!(parse_url("http://example.com/a").is_some());
        assert!(parse_url("example.com/a").is_none());
        assert!(parse_url("   ").is_none());
    }

    #[test]
    fn parse_url_trims_whitespace_and_controls() {
        let url = parse_url(" \thttp://example.com/\r\n").expect("url");
        assert_eq!(url.as_str(), "http://example.com/");
        assert_eq!(url.host(), Some("example.com"));
    }

    #[test]
    fn mailto_user_detection() {
        assert!(parse_url("mailto:user@example.com").expect("url").has_mail_user());
        assert!(!parse_url("mailto:@example.com").expect("url").has_mail_user());
        assert!(!parse_url("mailto:example.com").expect("url").has_mail_user());
        assert!(!parse_url("http://example.com").expect("url").has_mail_user());
    }

    #[test]
    fn set_deduplicates_and_merges_flags() {
        let mut set = UrlSet::new();
        let mut a = parse_url("http://example.com/x").expect("url");
        a.flags = UrlFlags::IMAGE;
        assert_eq!(set.add_or_increase(a), AddOutcome::Inserted(0));

        let mut b = parse_url("http://example.com/x").expect("url");
        b.flags = UrlFlags::QUERY;
        assert_eq!(set.add_or_increase(b), AddOutcome::Existing(0));

        let merged = set.get(0).expect("entry");
        assert_eq!(merged.count, 2);
        assert!(merged.flags.contains(UrlFlags::IMAGE | UrlFlags::QUERY));
    }

    #[test]
    fn set_flag_by_raw_string() {
        let mut set = UrlSet::new();
        set.add_or_increase(parse_url("http://a.example/").expect("url"));
        assert!(set.flag("http://a.example/", UrlFlags::PHISHED));
        assert!(!set.flag("http://b.example/", UrlFlags::PHISHED));
        assert!(set.get(0).expect("entry").flags.contains(UrlFlags::PHISHED));
    }

    #[test]
    fn find_urls_spots_scheme_spans() {
        let found = find_urls("click http://evil.example/login now");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, 6);
        assert_eq!(found[0].1.host(), Some("evil.example"));
    }

    #[test]
    fn find_urls_promotes_www_spans() {
        let found = find_urls("visit www.example.com today");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.host(), Some("example.com"));
    }

    #[test]
    fn find_urls_does_not_double_count_www_inside_scheme() {
        let found = find_urls("http://www.example.com/path");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.scheme(), "http");
    }

    #[test]
    fn find_urls_rejects_mailto_without_user() {
        assert!(find_urls("write to mailto:@example.com please").is_empty());
        let found = find_urls("write to mailto:who@example.com please");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn find_urls_strips_trailing_punctuation() {
        let found = find_urls("see http://example.com/page.");
        assert_eq!(found[0].1.as_str(), "http://example.com/page");
    }
}
