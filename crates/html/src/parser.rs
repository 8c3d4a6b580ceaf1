//! The outer document state machine.
//!
//! One pass over the raw bytes, cursor `p` and run-start `c`. Tag innards
//! are fed byte-by-byte to the attribute micro-parser; completed tags go
//! through the tree builder and then the specializers. Text lands in
//! `parsed` with whitespace collapsed to single spaces and structural line
//! breaks injected for `br`/`hr`/`p`/`tr`/`div`.
//!
//! Browsers do not reject broken HTML and neither does this parser: every
//! malformed construct downgrades to a flag and a state transition, and the
//! input is always consumed to the end.

use crate::attr::TagParser;
use crate::content::{
    ContentFlags, HtmlContent, ProcessException, TagIdx,
};
use crate::entities::decode_entities_tail;
use crate::extract;
use crate::postpass;
use crate::tags::{Tag, TagFlags};
use crate::tree;
use css::Stylesheet;
use memchr::memchr;
use urls::{AddOutcome, Url, UrlSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Start,
    TagBegin,
    SgmlTag,
    XmlTag,
    XmlTagEnd,
    CompoundTag,
    CommentTag,
    CommentContent,
    SgmlContent,
    TagContent,
    TagEnd,
    ContentIgnore,
    ContentWrite,
    ContentStyle,
    ContentIgnoreSp,
}

/// Flush the pending text run `[c, p)` into `parsed`, decoding entities in
/// place when the run contained `&`, and keep the content tag's span
/// bookkeeping current.
fn flush_run(
    hc: &mut HtmlContent,
    input: &[u8],
    c: usize,
    p: usize,
    need_decode: bool,
    content_tag: Option<TagIdx>,
) {
    if p <= c {
        return;
    }
    let old_len = hc.parsed.len();
    if let Some(ct) = content_tag
        && hc.tag(ct).content_length == 0
    {
        hc.tag_mut(ct).content_offset = old_len;
    }
    hc.parsed.extend_from_slice(&input[c..p]);
    let len = if need_decode {
        decode_entities_tail(&mut hc.parsed, old_len)
    } else {
        p - c
    };
    if let Some(ct) = content_tag {
        hc.tag_mut(ct).content_length += len;
    }
}

/// Append the single space a collapsed whitespace run stands for, unless
/// the output already ends in whitespace.
fn append_space(hc: &mut HtmlContent, content_tag: Option<TagIdx>) {
    if hc.parsed.last().is_none_or(|b| b.is_ascii_whitespace()) {
        return;
    }
    hc.parsed.push(b' ');
    if let Some(ct) = content_tag {
        if hc.tag(ct).content_length == 0 {
            // The span has not started yet; the space stays outside it.
            hc.tag_mut(ct).content_offset = hc.parsed.len();
        } else {
            hc.tag_mut(ct).content_length += 1;
        }
    }
}

/// Structural line break for `br`/`hr` and `p`/`tr`/`div`, skipped when the
/// output already ends with a newline.
fn append_line_break(hc: &mut HtmlContent, content_tag: Option<TagIdx>) {
    if hc.parsed.is_empty() || hc.parsed.last() == Some(&b'\n') {
        return;
    }
    hc.parsed.extend_from_slice(b"\r\n");
    if let Some(ct) = content_tag {
        if hc.tag(ct).content_length == 0 {
            hc.tag_mut(ct).content_offset = hc.parsed.len();
        } else {
            hc.tag_mut(ct).content_length += 2;
        }
    }
}

/// The nearest enclosing open `<a>` that already has a URL, excluding the
/// tag currently being processed.
fn open_outer_anchor(hc: &HtmlContent, stack: &[TagIdx], current: TagIdx) -> Option<Url> {
    stack
        .iter()
        .rev()
        .filter(|&&i| i != current)
        .find_map(|&i| {
            let tag = hc.tag(i);
            if tag.id == Some(Tag::A)
                && !tag.flags.contains(TagFlags::CLOSED)
                && let crate::content::Extra::Url(url) = &tag.extra
            {
                Some(url.clone())
            } else {
                None
            }
        })
}

/// Process one text/html part without CSS handling or shared sinks.
pub fn process_part(input: &[u8]) -> HtmlContent {
    process_part_full(input, None, None, None, false)
}

/// Process one text/html part.
///
/// `exceptions`, `url_set` and `part_urls` are caller-owned sinks shared
/// across the parts of a message; `allow_css` enables `<style>` parsing and
/// the visibility post-pass. There are no fatal errors: whatever the input,
/// a usable [`HtmlContent`] comes back.
pub fn process_part_full(
    input: &[u8],
    mut exceptions: Option<&mut Vec<ProcessException>>,
    mut url_set: Option<&mut UrlSet>,
    mut part_urls: Option<&mut Vec<Url>>,
    allow_css: bool,
) -> HtmlContent {
    let mut hc = HtmlContent::new();

    let end = input.len();
    let mut p = 0usize;
    let mut c = 0usize;
    let mut state = State::Start;

    let mut closing = false;
    let mut need_decode = false;
    let mut save_space = false;
    let mut obrace = 0usize;
    let mut ebrace = 0usize;

    let mut cur_tag: Option<TagIdx> = None;
    let mut content_tag: Option<TagIdx> = None;
    let mut cur_url: Option<Url> = None;
    let mut href_offset: Option<usize> = None;
    let mut stack: Vec<TagIdx> = Vec::new();
    let mut tag_parser = TagParser::default();

    while p < end {
        let t = input[p];

        match state {
            State::Start => {
                if t == b'<' {
                    state = State::TagBegin;
                } else {
                    // No leading tag; treat the whole thing as content.
                    hc.flags |= ContentFlags::BAD_START;
                    state = State::ContentWrite;
                }
            }

            State::TagBegin => match t {
                b'<' => {
                    p += 1;
                    closing = false;
                }
                b'!' => {
                    state = State::SgmlTag;
                    p += 1;
                }
                b'?' => {
                    state = State::XmlTag;
                    hc.flags |= ContentFlags::XML;
                    p += 1;
                }
                b'/' => {
                    closing = true;
                    p += 1;
                }
                b'>' => {
                    // Empty tag.
                    hc.flags |= ContentFlags::BAD_ELEMENTS;
                    state = State::TagEnd;
                }
                _ => {
                    state = State::TagContent;
                    tag_parser.reset();
                    cur_tag = Some(hc.alloc_tag());
                }
            },

            State::SgmlTag => match t {
                b'[' => {
                    state = State::CompoundTag;
                    obrace = 1;
                    ebrace = 0;
                    p += 1;
                }
                b'-' => {
                    state = State::CommentTag;
                    p += 1;
                }
                _ => state = State::SgmlContent,
            },

            State::XmlTag => {
                if t == b'?' {
                    state = State::XmlTagEnd;
                    p += 1;
                } else if t == b'>' {
                    hc.flags |= ContentFlags::BAD_ELEMENTS;
                    state = State::TagEnd;
                } else {
                    // XML prologues carry nothing we score on.
                    p += 1;
                }
            }

            State::XmlTagEnd => {
                if t == b'>' {
                    state = State::TagEnd;
                } else {
                    hc.flags |= ContentFlags::BAD_ELEMENTS;
                    p += 1;
                }
            }

            State::CompoundTag => {
                if t == b'[' {
                    obrace += 1;
                    p += 1;
                } else if t == b']' {
                    ebrace += 1;
                    p += 1;
                } else if t == b'>' && obrace == ebrace {
                    state = State::TagEnd;
                } else {
                    p += 1;
                }
            }

            State::CommentTag => {
                if t != b'-' {
                    hc.flags |= ContentFlags::BAD_ELEMENTS;
                    state = State::TagEnd;
                } else {
                    p += 1;
                    ebrace = 0;
                    // Comment text must not start with `>` or `->`.
                    if input.get(p) == Some(&b'-') && input.get(p + 1) == Some(&b'>') {
                        hc.flags |= ContentFlags::BAD_ELEMENTS;
                        p += 1;
                        state = State::TagEnd;
                    } else if input.get(p) == Some(&b'>') {
                        hc.flags |= ContentFlags::BAD_ELEMENTS;
                        state = State::TagEnd;
                    } else {
                        state = State::CommentContent;
                    }
                }
            }

            State::CommentContent => {
                if t == b'-' {
                    ebrace += 1;
                    p += 1;
                } else if t == b'>' && ebrace >= 2 {
                    state = State::TagEnd;
                } else {
                    ebrace = 0;
                    p += 1;
                }
            }

            State::SgmlContent => {
                if t == b'>' {
                    state = State::TagEnd;
                    cur_tag = None;
                } else {
                    p += 1;
                }
            }

            State::TagContent => {
                if let Some(idx) = cur_tag {
                    tag_parser.step(&mut hc.flags, &mut hc.all_tags[idx.index()], input, p);
                }
                if t == b'>' {
                    if closing {
                        if let Some(idx) = cur_tag {
                            let tag = &mut hc.all_tags[idx.index()];
                            tag.flags |= TagFlags::CLOSING;
                            if tag.flags.contains(TagFlags::CLOSED) {
                                // `</div/>` and friends.
                                hc.flags |= ContentFlags::BAD_ELEMENTS;
                            }
                        }
                        closing = false;
                    }
                    state = State::TagEnd;
                } else {
                    p += 1;
                }
            }

            State::TagEnd => {
                tag_parser.reset();

                if let Some(idx) = cur_tag {
                    let accepted = tree::process_tag(&mut hc, idx, &mut stack);
                    if accepted {
                        state = State::ContentWrite;
                        need_decode = false;
                    } else if hc.tag(idx).id == Some(Tag::Style) {
                        state = State::ContentStyle;
                    } else {
                        state = State::ContentIgnore;
                    }

                    if let Some(id) = hc.tag(idx).id {
                        let flags = hc.tag(idx).flags;
                        if flags.contains(TagFlags::UNIQUE)
                            && !flags.contains(TagFlags::CLOSING)
                            && hc.tags_seen.get(id)
                        {
                            hc.flags |= ContentFlags::DUPLICATE_ELEMENTS;
                        }
                        hc.tags_seen.set(id);
                    }

                    if !hc
                        .tag(idx)
                        .flags
                        .intersects(TagFlags::CLOSED | TagFlags::CLOSING)
                    {
                        content_tag = Some(idx);
                    }

                    if matches!(
                        hc.tag(idx).id,
                        Some(Tag::Br | Tag::Hr | Tag::P | Tag::Tr | Tag::Div)
                    ) {
                        append_line_break(&mut hc, content_tag);
                        save_space = false;
                    }

                    let tag_id = hc.tag(idx).id;
                    let tag_flags = hc.tag(idx).flags;
                    let closing_tag = tag_flags.contains(TagFlags::CLOSING);

                    if tag_flags.contains(TagFlags::HREF) {
                        if !closing_tag
                            && let Some(url) = extract::process_url_tag(&mut hc, idx)
                        {
                            let mut current = url;
                            if let Some(set) = url_set.as_deref_mut() {
                                match set.add_or_increase(current.clone()) {
                                    AddOutcome::Inserted(i) => {
                                        let inserted =
                                            set.get(i).expect("just inserted").clone();
                                        extract::process_query_url(
                                            &inserted,
                                            set,
                                            part_urls.as_deref_mut(),
                                        );
                                        current = inserted;
                                    }
                                    AddOutcome::Existing(i) => {
                                        current = set.get(i).expect("existing entry").clone();
                                    }
                                }
                            }
                            cur_url = Some(current);
                            href_offset = Some(hc.parsed.len());
                        }

                        if tag_id == Some(Tag::A) {
                            if !closing_tag {
                                // An <a> opening inside another open <a>:
                                // whatever text accumulated so far was
                                // displayed for the outer link.
                                if let Some(outer) = open_outer_anchor(&hc, &stack, idx)
                                    && let Some(off) = href_offset
                                {
                                    extract::check_displayed_url(
                                        &hc,
                                        exceptions.as_deref_mut(),
                                        url_set.as_deref_mut(),
                                        off,
                                        &outer,
                                    );
                                }
                            } else {
                                if let (Some(url), Some(off)) = (cur_url.as_ref(), href_offset)
                                    && hc.parsed.len() > off
                                {
                                    extract::check_displayed_url(
                                        &hc,
                                        exceptions.as_deref_mut(),
                                        url_set.as_deref_mut(),
                                        off,
                                        url,
                                    );
                                }
                                href_offset = None;
                                cur_url = None;
                            }
                        }
                    } else if tag_id == Some(Tag::Base)
                        && !closing_tag
                        && hc.base_url.is_none()
                    {
                        // Base belongs in head, but mail HTML puts it
                        // anywhere; only the first one counts.
                        if let Some(url) = extract::process_url_tag(&mut hc, idx) {
                            log::debug!(target: "html", "got valid base tag: {}", url.as_str());
                            hc.base_url = Some(url);
                            hc.tag_mut(idx).flags |= TagFlags::HREF;
                        } else {
                            log::debug!(target: "html", "got invalid base tag");
                        }
                    }

                    if tag_id == Some(Tag::Img) && !closing_tag {
                        extract::process_img_tag(
                            &mut hc,
                            idx,
                            url_set.as_deref_mut(),
                            part_urls.as_deref_mut(),
                        );
                    } else if tag_id == Some(Tag::Link) && !closing_tag {
                        extract::process_link_tag(
                            &mut hc,
                            idx,
                            url_set.as_deref_mut(),
                            part_urls.as_deref_mut(),
                        );
                    }

                    if tag_flags.contains(TagFlags::BLOCK) && !closing_tag {
                        extract::process_block_tag(&mut hc, idx);
                    }
                } else {
                    state = State::ContentWrite;
                }

                p += 1;
                c = p;
                cur_tag = None;
            }

            State::ContentIgnore => {
                if t != b'<' {
                    p += 1;
                } else {
                    state = State::TagBegin;
                }
            }

            State::ContentWrite => {
                if t != b'<' {
                    if t == b'&' {
                        need_decode = true;
                        p += 1;
                    } else if t.is_ascii_whitespace() {
                        save_space = true;
                        flush_run(&mut hc, input, c, p, need_decode, content_tag);
                        c = p;
                        state = State::ContentIgnoreSp;
                        p += 1;
                    } else {
                        if save_space {
                            append_space(&mut hc, content_tag);
                            save_space = false;
                        }
                        p += 1;
                    }
                } else {
                    flush_run(&mut hc, input, c, p, need_decode, content_tag);
                    content_tag = None;
                    state = State::TagBegin;
                }
            }

            State::ContentStyle => {
                // Find the first `</` and require an s/S after it; anything
                // else means the style element never closes properly.
                let rest = &input[p..];
                let mut close = None;
                let mut off = 0;
                while let Some(rel) = memchr(b'<', &rest[off..]) {
                    let at = off + rel;
                    if rest.get(at + 1) == Some(&b'/') {
                        close = Some(at);
                        break;
                    }
                    off = at + 1;
                }

                match close {
                    Some(at) if rest.get(at + 2).map(u8::to_ascii_lowercase) == Some(b's') => {
                        if allow_css {
                            let css_text = String::from_utf8_lossy(&rest[..at]);
                            hc.stylesheet
                                .get_or_insert_with(Stylesheet::new)
                                .extend_from_css(&css_text);
                        }
                        p += at;
                        state = State::TagBegin;
                    }
                    _ => state = State::ContentIgnore,
                }
            }

            State::ContentIgnoreSp => {
                if !t.is_ascii_whitespace() {
                    c = p;
                    state = State::ContentWrite;
                } else {
                    p += 1;
                }
            }
        }
    }

    // Text still pending at end of input is content the reader would see.
    if state == State::ContentWrite {
        flush_run(&mut hc, input, c, end, need_decode, content_tag);
    }

    postpass::run(&mut hc, exceptions.as_deref_mut(), allow_css);

    hc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed_str(hc: &HtmlContent) -> String {
        String::from_utf8_lossy(hc.parsed_text()).into_owned()
    }

    #[test]
    fn whitespace_collapses_to_single_spaces() {
        let hc = process_part(b"<html><body>a  \t b\n\n  c</body></html>");
        assert_eq!(parsed_str(&hc), "a b c");
    }

    #[test]
    fn collapsed_space_never_follows_whitespace() {
        let hc = process_part(b"<div>a </div> <div> b</div>");
        let parsed = hc.parsed_text();
        for pair in parsed.windows(2) {
            assert!(
                !(pair[0].is_ascii_whitespace() && pair[1] == b' '),
                "space inserted after whitespace in {:?}",
                String::from_utf8_lossy(parsed)
            );
        }
    }

    #[test]
    fn entities_in_text_are_decoded() {
        let hc = process_part(b"<p>Tom &amp; Jerry &#215; 2</p>");
        assert_eq!(parsed_str(&hc), "Tom & Jerry \u{d7} 2\r\n");
    }

    #[test]
    fn block_closings_inject_line_breaks() {
        let hc = process_part(b"<div>one</div><div>two</div>");
        assert_eq!(parsed_str(&hc), "one\r\ntwo\r\n");
    }

    #[test]
    fn br_injects_a_single_break() {
        let hc = process_part(b"<p>one<br>two</p>");
        assert_eq!(parsed_str(&hc), "one\r\ntwo\r\n");
    }

    #[test]
    fn text_across_inline_tags_keeps_spacing() {
        let hc = process_part(b"<p>Hello <b>world</b> again</p>");
        assert_eq!(parsed_str(&hc), "Hello world again\r\n");
    }

    #[test]
    fn trailing_text_without_closing_tag_is_kept() {
        let hc = process_part(b"<p>hello");
        assert_eq!(parsed_str(&hc), "hello");
    }

    #[test]
    fn bad_start_is_flagged_and_content_kept() {
        let hc = process_part(b"plain text, no markup");
        assert!(hc.flags.contains(ContentFlags::BAD_START));
        assert_eq!(parsed_str(&hc), "plain text, no markup");
    }

    #[test]
    fn xml_prologue_sets_flag() {
        let hc = process_part(b"<?xml version=\"1.0\"?><html><body>x</body></html>");
        assert!(hc.flags.contains(ContentFlags::XML));
        assert_eq!(parsed_str(&hc), "x");
    }

    #[test]
    fn comments_are_invisible() {
        let hc = process_part(b"<html><body>a<!-- hidden -- more -->b</body></html>");
        assert_eq!(parsed_str(&hc), "ab");
        assert!(!hc.flags.contains(ContentFlags::BAD_ELEMENTS));
    }

    #[test]
    fn empty_comment_is_bad() {
        let hc = process_part(b"<html><body><!-->x</body></html>");
        assert!(hc.flags.contains(ContentFlags::BAD_ELEMENTS));
    }

    #[test]
    fn cdata_blocks_are_skipped() {
        let hc = process_part(b"<html><body><![CDATA[<div>not real</div>]]>text</body></html>");
        assert_eq!(parsed_str(&hc), "text");
    }

    #[test]
    fn head_content_is_not_extracted() {
        let hc = process_part(b"<html><head><title>Subject!</title></head><body>real</body></html>");
        assert_eq!(parsed_str(&hc), "real");
        assert!(hc.tag_seen("title"));
    }

    #[test]
    fn script_bodies_are_ignored() {
        let hc = process_part(b"<html><body><script>alert('x')</script>after</body></html>");
        assert_eq!(parsed_str(&hc), "after");
    }

    #[test]
    fn unknown_tag_content_is_ignored_until_next_tag() {
        let hc = process_part(b"<html><body><blink>gone</blink><b>kept</b></body></html>");
        assert!(hc.flags.contains(ContentFlags::UNKNOWN_ELEMENTS));
        assert_eq!(parsed_str(&hc), "kept");
    }

    #[test]
    fn empty_tag_is_bad_elements() {
        let hc = process_part(b"<html><body><>x</body></html>");
        assert!(hc.flags.contains(ContentFlags::BAD_ELEMENTS));
        assert_eq!(parsed_str(&hc), "x");
    }

    #[test]
    fn duplicate_unique_tag_is_flagged() {
        let hc = process_part(b"<html><body>x</body><body>y</body></html>");
        assert!(hc.flags.contains(ContentFlags::DUPLICATE_ELEMENTS));
    }

    #[test]
    fn closing_tags_do_not_trigger_duplicates() {
        let hc = process_part(b"<html><body>x</body></html>");
        assert!(!hc.flags.contains(ContentFlags::DUPLICATE_ELEMENTS));
    }

    #[test]
    fn content_span_covers_direct_text() {
        let hc = process_part(b"<html><div>abc</div></html>");
        let div = hc
            .pre_order()
            .into_iter()
            .find(|&i| hc.tag_name(i) == "div")
            .expect("div in tree");
        let tag = hc.tag(div);
        let span = &hc.parsed_text()[tag.content_offset..tag.content_offset + 3];
        assert_eq!(span, b"abc");
    }

    #[test]
    fn base_url_is_set_once() {
        let hc = process_part(
            b"<html><base href=\"http://first.example/\"><base href=\"http://second.example/\"></html>",
        );
        assert_eq!(
            hc.base_url.as_ref().map(|u| u.as_str()),
            Some("http://first.example/")
        );
    }

    #[test]
    fn anchor_urls_reach_the_shared_set() {
        let mut set = UrlSet::new();
        let hc = process_part_full(
            b"<div><a href=\"http://example.com\">x</a></div>",
            None,
            Some(&mut set),
            None,
            false,
        );
        assert!(set.contains("http://example.com"));
        assert_eq!(hc.debug_structure(), "+div;++a;");
    }

    #[test]
    fn repeated_anchor_url_bumps_count() {
        let mut set = UrlSet::new();
        process_part_full(
            b"<div><a href=\"http://example.com/x\">a</a><a href=\"http://example.com/x\">b</a></div>",
            None,
            Some(&mut set),
            None,
            false,
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(0).expect("entry").count, 2);
    }

    #[test]
    fn style_content_is_parsed_not_extracted() {
        let hc = process_part_full(
            b"<html><style>p{display:none}</style><p>hidden</p></html>",
            None,
            None,
            None,
            true,
        );
        assert_eq!(parsed_str(&hc), "hidden\r\n");
        assert!(hc.stylesheet.is_some());
    }

    #[test]
    fn unterminated_style_skips_to_the_next_tag() {
        let hc = process_part(b"<html><body><style>p{color:red}<p>visible</body></html>");
        assert_eq!(parsed_str(&hc), "visible");
    }

    #[test]
    fn tag_cap_truncates_tree_but_consumes_input() {
        let mut input = Vec::new();
        input.extend_from_slice(b"<html>");
        for _ in 0..9000 {
            input.extend_from_slice(b"<div>x</div>");
        }
        input.extend_from_slice(b"</html>");
        let hc = process_part(&input);
        assert!(hc.flags.contains(ContentFlags::TOO_MANY_TAGS));
        assert!(hc.total_tags <= crate::content::MAX_TAGS);
        // Every text chunk still made it into the extracted text.
        assert!(parsed_str(&hc).len() >= 9000);
    }
}
