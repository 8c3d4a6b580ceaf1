//! Tree building over the tag arena.
//!
//! Completed tags are linked under the current open tag (the stack top, the
//! root as a fallback), with the recovery rules mail clients force on us:
//! misnested closings close the nearest matching open ancestor, a repeated
//! same-id non-block tag is reparented one level up, head-only subtrees are
//! kept in the tree but their text is ignored.
//!
//! Returns accept/reject: accept routes the document parser back to content
//! writing, reject routes it to content-ignore (or style capture).

use crate::content::{ContentFlags, HtmlContent, TagIdx, MAX_TAGS};
use crate::tags::TagFlags;

/// Close the nearest not-yet-closed matching opener on the stack. A match
/// that is not the top is swapped up first so the nesting of other open
/// tags survives. `false` means there was nothing to pair with.
fn check_balance(hc: &mut HtmlContent, idx: TagIdx, stack: &mut Vec<TagIdx>) -> bool {
    let id = hc.tag(idx).id;
    let found = stack
        .iter()
        .rposition(|&open| {
            let open_tag = hc.tag(open);
            !open_tag.flags.contains(TagFlags::CLOSED) && open_tag.id == id
        });

    match found {
        Some(pos) => {
            hc.tag_mut(stack[pos]).flags |= TagFlags::CLOSED;
            let top = stack.len() - 1;
            if pos != top {
                stack.swap(pos, top);
            }
            stack.pop();
            true
        }
        None => false,
    }
}

/// Link a completed tag into the tree. The return value drives the outer
/// state machine: `true` resumes content writing, `false` ignores the
/// content that follows.
pub(crate) fn process_tag(hc: &mut HtmlContent, idx: TagIdx, stack: &mut Vec<TagIdx>) -> bool {
    if hc.total_tags >= MAX_TAGS {
        hc.flags |= ContentFlags::TOO_MANY_TAGS;
    }

    if hc.tag(idx).id.is_none() {
        // Unknown tags stay in the arena but never join the tree.
        hc.total_tags += 1;
        return false;
    }

    let parent = stack.last().copied().or(hc.root_tag);
    hc.tag_mut(idx).parent = parent;

    let flags = hc.tag(idx).flags;

    if !flags.intersects(TagFlags::INLINE | TagFlags::EMPTY) {
        if flags.intersects(TagFlags::CLOSING | TagFlags::CLOSED) {
            if parent.is_none() {
                log::debug!(target: "html", "closing </{}> with no parent", hc.tag(idx).name);
                return false;
            }
            if hc.total_tags < MAX_TAGS {
                if !check_balance(hc, idx, stack) {
                    log::debug!(
                        target: "html",
                        "unpaired closing </{}>",
                        hc.tag(idx).name
                    );
                    hc.flags |= ContentFlags::UNBALANCED;
                }
                hc.total_tags += 1;
            }
        } else {
            if let Some(parent_idx) = parent {
                let parent_flags = hc.tag(parent_idx).flags;
                if parent_flags.contains(TagFlags::IGNORE) {
                    hc.tag_mut(idx).flags |= TagFlags::IGNORE;
                }

                if !flags.contains(TagFlags::CLOSED)
                    && !parent_flags.contains(TagFlags::BLOCK)
                    && hc.tag(parent_idx).id == hc.tag(idx).id
                {
                    // Something like <a>bla<a>foo: reparent one level up and
                    // keep going.
                    hc.flags |= ContentFlags::UNBALANCED;
                    hc.tag_mut(idx).parent = hc.tag(parent_idx).parent;
                    if hc.total_tags < MAX_TAGS {
                        hc.tag_mut(parent_idx).children.push(idx);
                        stack.push(idx);
                        hc.total_tags += 1;
                    }
                    return true;
                }

                if hc.total_tags < MAX_TAGS {
                    hc.tag_mut(parent_idx).children.push(idx);
                    if !hc.tag(idx).flags.contains(TagFlags::CLOSED) {
                        stack.push(idx);
                    }
                    hc.total_tags += 1;
                }
            } else if !flags.intersects(TagFlags::HEAD | TagFlags::UNKNOWN | TagFlags::IGNORE) {
                // A head-only tag cannot anchor visible content; leaving the
                // root unset lets a later body-level tag claim it.
                hc.root_tag = Some(idx);
            }

            if hc
                .tag(idx)
                .flags
                .intersects(TagFlags::HEAD | TagFlags::UNKNOWN | TagFlags::IGNORE)
            {
                hc.tag_mut(idx).flags |= TagFlags::IGNORE;
                return false;
            }
        }
    } else {
        // Inline or void tag: a leaf wherever it lands.
        if let Some(parent_idx) = parent {
            if hc.total_tags < MAX_TAGS {
                hc.tag_mut(parent_idx).children.push(idx);
                hc.total_tags += 1;
            }
            if hc
                .tag(parent_idx)
                .flags
                .intersects(TagFlags::HEAD | TagFlags::UNKNOWN | TagFlags::IGNORE)
            {
                hc.tag_mut(idx).flags |= TagFlags::IGNORE;
                return false;
            }
        }
    }

    true
}
