//! Tag specializers: once a tag is parsed and linked, these derive the
//! artifacts downstream scoring consumes — URLs (base-resolved and
//! de-duplicated), image descriptors, visual blocks, and the displayed-URL
//! checks that catch `<a href=evil>good-looking-text</a>` tricks.

use crate::content::{
    ComponentKind, ContentFlags, ExceptionKind, Extra, HtmlContent, HtmlImage, ImageFlags,
    ImageIdx, ProcessException, TagIdx,
};
use crate::imgprobe;
use crate::tags::TagFlags;
use base64::prelude::{BASE64_STANDARD, BASE64_STANDARD_NO_PAD};
use base64::Engine;
use memchr::memchr;
use urls::{parse_url, AddOutcome, Url, UrlFlags, UrlSet};

/// Resolve an `href` value, possibly against the document base.
///
/// - `scheme://` anywhere makes it absolute.
/// - `data:` never yields a URL here; the image path owns those.
/// - `/path` (but not `//host`) is resolved against the base's origin.
/// - anything else relative is appended to the full base string, with a `/`
///   inserted when the base has no path component.
pub(crate) fn resolve_href(href: &str, base: Option<&Url>) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.contains("://") {
        return parse_url(href);
    }
    if href.len() >= 5 && href[..5].eq_ignore_ascii_case("data:") {
        return None;
    }
    if let Some(base) = base {
        if href.starts_with('/') && !href.starts_with("//") {
            let host = base.host()?;
            return parse_url(&format!("{}://{}{}", base.scheme(), host, href));
        }
        let base_str = base.as_str();
        let need_slash = !base_str.ends_with('/') && base.path() == "/";
        return parse_url(&format!(
            "{}{}{}",
            base_str,
            if need_slash { "/" } else { "" },
            href
        ));
    }
    parse_url(href)
}

/// Compute the URL of a tag carrying a link target. Stores it as the tag's
/// `extra` when nothing else claimed that slot.
pub(crate) fn process_url_tag(hc: &mut HtmlContent, idx: TagIdx) -> Option<Url> {
    let href = hc.tag(idx).first_component_str(ComponentKind::Href)?;
    let url = resolve_href(&href, hc.base_url.as_ref())?;
    let tag = hc.tag_mut(idx);
    if matches!(tag.extra, Extra::None) {
        tag.extra = Extra::Url(url.clone());
    }
    Some(url)
}

/// Scan the query string of a newly inserted URL for embedded URLs, then
/// record the URL itself in the per-part list.
pub(crate) fn process_query_url(
    url: &Url,
    url_set: &mut UrlSet,
    mut part_urls: Option<&mut Vec<Url>>,
) {
    if let Some(query) = url.query() {
        for (_, mut found) in urls::find_urls(query) {
            if found.scheme() == "mailto" && !found.has_mail_user() {
                continue;
            }
            log::debug!(
                target: "html",
                "found url {} in query of {}",
                found.as_str(),
                url.as_str()
            );
            found.flags |= UrlFlags::QUERY;
            if let AddOutcome::Inserted(i) = url_set.add_or_increase(found)
                && let Some(part_urls) = part_urls.as_deref_mut()
            {
                part_urls.push(url_set.get(i).expect("just inserted").clone());
            }
        }
    }

    if let Some(part_urls) = part_urls {
        part_urls.push(url.clone());
    }
}

fn find_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Leading unsigned integer of an attribute value (`"120"`, `" 120px"`).
fn parse_uint_prefix(value: &[u8]) -> Option<u32> {
    let start = value.iter().position(|b| !b.is_ascii_whitespace())?;
    let digits: &[u8] = &value[start..];
    let end = digits
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    std::str::from_utf8(&digits[..end]).ok()?.parse().ok()
}

/// Dig a dimension out of a style string: the first digit run following the
/// property name, allowing only spaces, `=` and `:` in between.
fn style_dimension(style: &[u8], name: &[u8]) -> Option<u32> {
    let at = find_ci(style, name)?;
    let rest = &style[at + name.len()..];
    for (i, &b) in rest.iter().enumerate() {
        if b.is_ascii_digit() {
            return parse_uint_prefix(&rest[i..]);
        }
        if !b.is_ascii_whitespace() && b != b'=' && b != b':' {
            return None;
        }
    }
    None
}

/// Decode a `data:*;base64,...` payload and probe its header for
/// dimensions. Decode failures just leave the descriptor without metadata.
fn process_data_image(img: &mut HtmlImage, href: &str) {
    let bytes = href.as_bytes();
    let Some(semi) = memchr(b';', bytes) else {
        return;
    };
    let Some(payload) = href[semi + 1..].strip_prefix("base64,") else {
        return;
    };
    let cleaned: Vec<u8> = payload
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let decoded = BASE64_STANDARD.decode(&cleaned).or_else(|_| {
        let trimmed_len = cleaned.iter().rposition(|&b| b != b'=').map_or(0, |p| p + 1);
        BASE64_STANDARD_NO_PAD.decode(&cleaned[..trimmed_len])
    });
    match decoded {
        Ok(data) => {
            img.embedded_dims = imgprobe::probe(&data);
            if let Some(dims) = img.embedded_dims {
                log::debug!(
                    target: "html",
                    "detected {:?} image of size {} x {} in data url",
                    dims.format,
                    dims.width,
                    dims.height
                );
            }
        }
        Err(err) => {
            log::debug!(target: "html", "bad base64 in data url: {err}");
        }
    }
}

/// Build the image descriptor for `<img>` (and icon `<link>`) tags:
/// classify the source, resolve dimensions, fold `alt` text into the
/// extracted text.
pub(crate) fn process_img_tag(
    hc: &mut HtmlContent,
    idx: TagIdx,
    mut url_set: Option<&mut UrlSet>,
    mut part_urls: Option<&mut Vec<Url>>,
) {
    let mut img = HtmlImage {
        tag: idx,
        src: String::new(),
        url: None,
        flags: ImageFlags::default(),
        embedded_dims: None,
        width: 0,
        height: 0,
    };
    hc.tag_mut(idx).flags |= TagFlags::IMAGE;

    for ci in 0..hc.tag(idx).components.len() {
        let (kind, value) = {
            let (k, v) = &hc.tag(idx).components[ci];
            (*k, v.clone())
        };
        match kind {
            ComponentKind::Href if !value.is_empty() => {
                let href = String::from_utf8_lossy(&value).into_owned();
                img.src = href.clone();
                if href.starts_with("cid:") {
                    img.flags |= ImageFlags::EMBEDDED;
                } else if href.starts_with("data:") {
                    img.flags |= ImageFlags::EMBEDDED | ImageFlags::DATA;
                    process_data_image(&mut img, &href);
                    hc.flags |= ContentFlags::HAS_DATA_URLS;
                } else {
                    img.flags |= ImageFlags::EXTERNAL;
                    if let Some(mut url) = parse_url(&href) {
                        url.flags |= UrlFlags::IMAGE;
                        img.url = Some(url.clone());
                        if let Some(set) = url_set.as_deref_mut()
                            && let AddOutcome::Inserted(i) = set.add_or_increase(url)
                            && let Some(part_urls) = part_urls.as_deref_mut()
                        {
                            part_urls.push(set.get(i).expect("just inserted").clone());
                        }
                    }
                }
            }
            ComponentKind::Height => {
                if let Some(v) = parse_uint_prefix(&value) {
                    img.height = v;
                }
            }
            ComponentKind::Width => {
                if let Some(v) = parse_uint_prefix(&value) {
                    img.width = v;
                }
            }
            ComponentKind::Style => {
                if img.height == 0
                    && let Some(v) = style_dimension(&value, b"height")
                {
                    img.height = v;
                }
                if img.width == 0
                    && let Some(v) = style_dimension(&value, b"width")
                {
                    img.width = v;
                }
            }
            ComponentKind::Alt => {
                // Alt text is what the reader sees; keep it in the extracted
                // text, padded so it never glues onto neighbours.
                if hc.parsed.last().is_some_and(|b| !b.is_ascii_whitespace()) {
                    hc.parsed.push(b' ');
                }
                hc.parsed.extend_from_slice(&value);
                if hc.parsed.last().is_some_and(|b| !b.is_ascii_whitespace()) {
                    hc.parsed.push(b' ');
                }
            }
            _ => {}
        }
    }

    if let Some(dims) = img.embedded_dims {
        if img.height == 0 {
            img.height = dims.height;
        }
        if img.width == 0 {
            img.width = dims.width;
        }
    }

    let image_idx = ImageIdx(hc.images.len() as u32);
    hc.images.push(img);
    hc.tag_mut(idx).extra = Extra::Image(image_idx);
}

/// `<link rel="icon">` is an image fetch in disguise.
pub(crate) fn process_link_tag(
    hc: &mut HtmlContent,
    idx: TagIdx,
    url_set: Option<&mut UrlSet>,
    part_urls: Option<&mut Vec<Url>>,
) {
    let is_icon = hc
        .tag(idx)
        .first_component(ComponentKind::Rel)
        .is_some_and(|rel| rel.trim_ascii().eq_ignore_ascii_case(b"icon"));
    if is_icon {
        process_img_tag(hc, idx, url_set, part_urls);
    }
}

/// Attach the visual block for a tag that carries one: `color`/`bgcolor`
/// attributes layered over whatever the `style` attribute declares.
pub(crate) fn process_block_tag(hc: &mut HtmlContent, idx: TagIdx) {
    let mut fg = None;
    let mut bg = None;
    let mut style_block = None;

    for (kind, value) in &hc.tag(idx).components {
        match kind {
            ComponentKind::Color if fg.is_none() => {
                fg = css::parse_color(&String::from_utf8_lossy(value));
            }
            ComponentKind::Bgcolor if bg.is_none() => {
                bg = css::parse_color(&String::from_utf8_lossy(value));
            }
            ComponentKind::Style if style_block.is_none() => {
                style_block = Some(css::parse_block(&String::from_utf8_lossy(value)));
            }
            _ => {}
        }
    }

    let mut block = style_block.unwrap_or_default();
    if fg.is_some() {
        block.fg_color = fg;
    }
    if bg.is_some() {
        block.bg_color = bg;
    }
    hc.tag_mut(idx).block = Some(block);
}

/// Compare the text displayed for a link against its target. A displayed
/// URL pointing at a different host flags the target as phishing and emits
/// an exception over the displayed slice.
pub(crate) fn check_displayed_url(
    hc: &HtmlContent,
    exceptions: Option<&mut Vec<ProcessException>>,
    url_set: Option<&mut UrlSet>,
    href_offset: usize,
    target: &Url,
) {
    if href_offset >= hc.parsed.len() {
        return;
    }
    let display = String::from_utf8_lossy(&hc.parsed[href_offset..]).into_owned();
    let Some((_, displayed_url)) = urls::find_urls(&display).into_iter().next() else {
        return;
    };

    let mismatch = match (displayed_url.host(), target.host()) {
        (Some(shown), Some(actual)) => !shown.eq_ignore_ascii_case(actual),
        _ => false,
    };
    if !mismatch {
        return;
    }

    log::debug!(
        target: "html",
        "displayed url {} disagrees with target {}",
        displayed_url.as_str(),
        target.as_str()
    );
    if let Some(set) = url_set {
        set.flag(target.as_str(), UrlFlags::PHISHED);
        let mut displayed = displayed_url;
        displayed.flags |= UrlFlags::DISPLAYED;
        set.add_or_increase(displayed);
    }
    if let Some(exceptions) = exceptions {
        exceptions.push(ProcessException {
            pos: href_offset,
            len: hc.parsed.len() - href_offset,
            kind: ExceptionKind::DisplayedUrlMismatch,
            tag: None,
        });
    }
}
