//! Structural corpus: literal inputs against their expected tree dumps,
//! plus the flag, URL, image and visibility behaviors that ride along.

use html::{
    process_part, process_part_full, ContentFlags, ExceptionKind, HtmlContent, ImageFlags, TagIdx,
};
use urls::UrlSet;

fn dump(input: &[u8]) -> (HtmlContent, String) {
    let hc = process_part_full(input, None, None, None, true);
    let dump = hc.debug_structure();
    (hc, dump)
}

#[test]
fn tree_structure_corpus() {
    let cases: &[(&[u8], &str)] = &[
        (b"<html><!DOCTYPE html><body>", "+html;++body;"),
        (b"<html><div><div></div></div></html>", "+html;++div;+++div;"),
        (b"<html><div><div></div></html>", "+html;++div;+++div;"),
        (b"<html><div><div></div></html></div>", "+html;++div;+++div;"),
        (b"<p><p><a></p></a></a>", "+p;++p;+++a;"),
        (b"<div><a href=\"http://example.com\"></div></a>", "+div;++a;"),
        (
            b"<html><!DOCTYPE html><body><head><body></body></html></body></html>",
            "+html;++body;+++head;++++body;",
        ),
    ];

    for (input, expected) in cases {
        let (_, actual) = dump(input);
        assert_eq!(
            &actual,
            expected,
            "structure mismatch for {:?}",
            String::from_utf8_lossy(input)
        );
    }
}

#[test]
fn misnested_same_tag_sets_unbalanced() {
    let (hc, _) = dump(b"<p><p><a></p></a></a>");
    assert!(hc.flags.contains(ContentFlags::UNBALANCED));
}

#[test]
fn duplicate_body_sets_duplicate_elements() {
    let (hc, _) = dump(b"<html><!DOCTYPE html><body><head><body></body></html></body></html>");
    assert!(hc.flags.contains(ContentFlags::DUPLICATE_ELEMENTS));
}

#[test]
fn anchor_href_is_collected() {
    let mut set = UrlSet::new();
    let hc = process_part_full(
        b"<div><a href=\"http://example.com\"></div></a>",
        None,
        Some(&mut set),
        None,
        true,
    );
    assert_eq!(hc.debug_structure(), "+div;++a;");
    assert!(set.contains("http://example.com"));
}

#[test]
fn data_url_image_is_embedded() {
    let hc = process_part(b"<img src=\"data:image/png;base64,iVBORw0KGgo=\">");
    assert!(hc.flags.contains(ContentFlags::HAS_DATA_URLS));
    assert_eq!(hc.images().len(), 1);
    let img = &hc.images()[0];
    assert!(img.flags.contains(ImageFlags::EMBEDDED | ImageFlags::DATA));
    assert!(!img.flags.contains(ImageFlags::EXTERNAL));
}

#[test]
fn data_url_image_dimensions_are_probed() {
    // A one-chunk PNG header claiming 3x7 pixels, base64 of:
    // sig + IHDR(len 13) + 3 + 7 + bit depth/color/etc.
    let mut png = vec![137u8, 80, 78, 71, 13, 10, 26, 10];
    png.extend_from_slice(&13u32.to_be_bytes());
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&3u32.to_be_bytes());
    png.extend_from_slice(&7u32.to_be_bytes());
    png.extend_from_slice(&[8, 2, 0, 0, 0]);
    let encoded = {
        use base64::prelude::BASE64_STANDARD;
        use base64::Engine;
        BASE64_STANDARD.encode(&png)
    };
    let input = format!("<img src=\"data:image/png;base64,{encoded}\">");
    let hc = process_part(input.as_bytes());
    let img = &hc.images()[0];
    assert_eq!((img.width, img.height), (3, 7));
}

#[test]
fn cid_image_is_found_by_content_id() {
    let hc = process_part(b"<html><body><img src=\"cid:logo@corp\" width=100 height=50></body></html>");
    let img = hc.find_embedded_image("logo@corp").expect("embedded image");
    assert_eq!((img.width, img.height), (100, 50));
    assert!(hc.find_embedded_image("missing@corp").is_none());
}

#[test]
fn image_dimensions_fall_back_to_style() {
    let hc = process_part(b"<img src=\"cid:x@y\" style=\"width: 600; height: 1px\">");
    let img = &hc.images()[0];
    assert_eq!((img.width, img.height), (600, 1));
}

#[test]
fn image_alt_text_joins_parsed_output() {
    let hc = process_part(b"<html><body>see<img src=\"cid:x@y\" alt=\"the offer\">now</body></html>");
    assert_eq!(
        String::from_utf8_lossy(hc.parsed_text()),
        "see the offer now"
    );
}

#[test]
fn external_image_url_is_flagged_in_set() {
    let mut set = UrlSet::new();
    process_part_full(
        b"<img src=\"http://tracker.example/pixel.gif\">",
        None,
        Some(&mut set),
        None,
        false,
    );
    let url = set.iter().next().expect("image url collected");
    assert!(url.flags.contains(urls::UrlFlags::IMAGE));
}

#[test]
fn icon_link_is_treated_as_image() {
    let mut set = UrlSet::new();
    let hc = process_part_full(
        b"<link rel=\"icon\" href=\"http://brand.example/favicon.ico\">",
        None,
        Some(&mut set),
        None,
        false,
    );
    assert_eq!(hc.images().len(), 1);
    assert!(set.contains("http://brand.example/favicon.ico"));
}

#[test]
fn stylesheet_link_is_not_an_image() {
    let hc = process_part(b"<link rel=\"stylesheet\" href=\"http://x.example/a.css\">");
    assert!(hc.images().is_empty());
}

#[test]
fn relative_href_resolves_against_base() {
    let mut set = UrlSet::new();
    process_part_full(
        b"<html><base href=\"http://e.com/\"><a href=\"/foo\">x</a></html>",
        None,
        Some(&mut set),
        None,
        false,
    );
    assert!(set.contains("http://e.com/foo"), "resolved {:?}", set.iter().map(|u| u.as_str()).collect::<Vec<_>>());
}

#[test]
fn hidden_style_region_becomes_invisible_exception() {
    let mut exceptions = Vec::new();
    let hc = process_part_full(
        b"<style>p{display:none}</style><p>hidden</p>",
        Some(&mut exceptions),
        None,
        None,
        true,
    );
    let parsed = hc.parsed_text();
    let invisible: Vec<_> = exceptions
        .iter()
        .filter(|e| e.kind == ExceptionKind::Invisible)
        .collect();
    assert_eq!(invisible.len(), 1);
    let e = invisible[0];
    assert!(e.pos + e.len <= parsed.len());
    assert_eq!(&parsed[e.pos..e.pos + 6], b"hidden");
}

#[test]
fn displayed_url_mismatch_is_reported() {
    let mut exceptions = Vec::new();
    let mut set = UrlSet::new();
    process_part_full(
        b"<div><a href=\"http://evil.example/\">http://bank.example/login</a></div>",
        Some(&mut exceptions),
        Some(&mut set),
        None,
        false,
    );
    assert!(exceptions
        .iter()
        .any(|e| e.kind == ExceptionKind::DisplayedUrlMismatch));
    let target = set.iter().find(|u| u.host() == Some("evil.example")).expect("target url");
    assert!(target.flags.contains(urls::UrlFlags::PHISHED));
    let displayed = set.iter().find(|u| u.host() == Some("bank.example")).expect("displayed url");
    assert!(displayed.flags.contains(urls::UrlFlags::DISPLAYED));
}

#[test]
fn matching_displayed_url_is_not_phishing() {
    let mut exceptions = Vec::new();
    let mut set = UrlSet::new();
    process_part_full(
        b"<div><a href=\"http://example.com/a\">http://example.com/b</a></div>",
        Some(&mut exceptions),
        Some(&mut set),
        None,
        false,
    );
    assert!(exceptions.is_empty());
    assert!(set.iter().all(|u| !u.flags.contains(urls::UrlFlags::PHISHED)));
}

#[test]
fn query_embedded_url_lands_in_part_urls() {
    let mut set = UrlSet::new();
    let mut part_urls = Vec::new();
    process_part_full(
        b"<div><a href=\"http://redir.example/?u=http://target.example/x\">go</a></div>",
        None,
        Some(&mut set),
        Some(&mut part_urls),
        false,
    );
    assert!(set.contains("http://target.example/x"));
    assert!(part_urls.iter().any(|u| u.host() == Some("target.example")));
    assert!(part_urls.iter().any(|u| u.host() == Some("redir.example")));
}

fn rebuild_html(hc: &HtmlContent, idx: TagIdx, out: &mut String) {
    out.push('<');
    out.push_str(hc.tag_name(idx));
    out.push('>');
    for &child in &hc.tag(idx).children {
        rebuild_html(hc, child, out);
    }
    out.push_str("</");
    out.push_str(hc.tag_name(idx));
    out.push('>');
}

#[test]
fn structure_dump_is_stable_under_reparse() {
    let inputs: &[&[u8]] = &[
        b"<html><div><div></div></div></html>",
        b"<html><body><table><tr><td></td></tr></table></body></html>",
        b"<div><ul><li></li><li></li></ul></div>",
    ];
    for input in inputs {
        let (hc, first_dump) = dump(input);
        let root = hc.root().expect("tree");
        let mut rebuilt = String::new();
        rebuild_html(&hc, root, &mut rebuilt);
        let (_, second_dump) = dump(rebuilt.as_bytes());
        assert_eq!(
            first_dump,
            second_dump,
            "re-parse of {rebuilt:?} changed structure"
        );
    }
}

#[test]
fn parse_is_deterministic() {
    let input = b"<html><body><div><a href=\"http://e.com/\">x</a></div></body></html>";
    let (_, a) = dump(input);
    let (_, b) = dump(input);
    assert_eq!(a, b);
}
