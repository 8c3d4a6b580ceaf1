//! Post-parse traversals.
//!
//! Two walks over the finished tree: a post-order pass summing child text
//! spans into their parents, and a pre-order pass that resolves stylesheet
//! blocks, computes visibility and emits invisible-region exceptions. The
//! pre-order pass also hands each tag's block down to its children, so a
//! `display:none` container hides everything under it unless a child
//! overrides the field itself.

use crate::content::{ComponentKind, ExceptionKind, HtmlContent, ProcessException, TagIdx};

/// Aggregate `content_length` bottom-up.
fn sum_content_lengths(hc: &mut HtmlContent) {
    for idx in hc.post_order() {
        let total: usize = hc
            .tag(idx)
            .children
            .iter()
            .map(|&child| hc.tag(child).content_length)
            .sum();
        hc.tag_mut(idx).content_length += total;
    }
}

/// Whether the parent of `idx` renders; a missing parent or a parent
/// without a block counts as visible.
fn parent_visible(hc: &HtmlContent, idx: TagIdx) -> bool {
    match hc.tag(idx).parent {
        None => true,
        Some(parent) => hc
            .tag(parent)
            .block
            .as_ref()
            .is_none_or(|block| block.is_visible()),
    }
}

/// A visible tag inside an invisible parent carves its span back out of the
/// parent's exception: shrink at either edge, split in the middle.
fn carve_visible_span(
    exceptions: &mut Vec<ProcessException>,
    hc: &HtmlContent,
    idx: TagIdx,
) {
    let Some(parent) = hc.tag(idx).parent else {
        return;
    };

    let mut suffix = None;
    {
        let Some(last) = exceptions.last_mut() else {
            return;
        };
        if last.kind != ExceptionKind::Invisible || last.tag != Some(parent) {
            return;
        }

        let tag_pos = hc.tag(idx).content_offset;
        let tag_len = hc.tag(idx).content_length;
        if tag_len == 0 || tag_pos < last.pos || tag_pos + tag_len > last.pos + last.len {
            return;
        }

        if tag_pos + tag_len == last.pos + last.len {
            // Visible tail.
            last.len -= tag_len;
        } else if tag_pos == last.pos {
            // Visible head.
            last.len -= tag_len;
            last.pos += tag_len;
        } else {
            // Visible middle: prefix keeps the existing entry, the suffix
            // becomes a new one.
            let prefix_len = tag_pos - last.pos;
            let suffix_len = last.len - prefix_len - tag_len;
            last.len = prefix_len;
            suffix = Some(ProcessException {
                pos: tag_pos + tag_len,
                len: suffix_len,
                kind: ExceptionKind::Invisible,
                tag: last.tag,
            });
        }
    }
    if let Some(suffix) = suffix {
        exceptions.push(suffix);
    }
}

/// Resolve blocks and visibility in document order, emitting exceptions for
/// regions a reader cannot see.
fn propagate_blocks(hc: &mut HtmlContent, mut exceptions: Option<&mut Vec<ProcessException>>) {
    for idx in hc.pre_order() {
        if let Some(sheet) = hc.stylesheet.as_ref() {
            let tag = hc.tag(idx);
            let css_block = sheet.block_for(
                &tag.name,
                tag.first_component_str(ComponentKind::Id).as_deref(),
                tag.first_component_str(ComponentKind::Class).as_deref(),
            );
            if let Some(css_block) = css_block {
                match &mut hc.tag_mut(idx).block {
                    Some(block) => block.propagate(&css_block),
                    slot @ None => *slot = Some(css_block),
                }
            }
        }

        let Some(mut block) = hc.tag(idx).block.clone() else {
            continue;
        };
        block.compute_visibility();

        if let Some(exceptions) = exceptions.as_deref_mut() {
            if !block.is_visible() {
                if parent_visible(hc, idx) {
                    let pos = hc.tag(idx).content_offset;
                    let len = hc
                        .tag(idx)
                        .content_length
                        .min(hc.parsed.len().saturating_sub(pos));
                    exceptions.push(ProcessException {
                        pos,
                        len,
                        kind: ExceptionKind::Invisible,
                        tag: Some(idx),
                    });
                }
            } else {
                carve_visible_span(exceptions, hc, idx);
            }
        }

        hc.tag_mut(idx).block = Some(block.clone());

        for ci in 0..hc.tag(idx).children.len() {
            let child = hc.tag(idx).children[ci];
            match &mut hc.tag_mut(child).block {
                Some(child_block) => child_block.propagate(&block),
                slot @ None => *slot = Some(block.clone()),
            }
        }
    }
}

/// Run both traversals. Visibility work is skipped entirely when CSS
/// handling is off.
pub(crate) fn run(
    hc: &mut HtmlContent,
    exceptions: Option<&mut Vec<ProcessException>>,
    allow_css: bool,
) {
    sum_content_lengths(hc);
    if allow_css {
        propagate_blocks(hc, exceptions);
    }
}
