//! The processed-document model.
//!
//! `HtmlContent` owns everything the parser produces: the tag arena, the
//! extracted text, image descriptors and per-document flags. The tree is a
//! view over the arena — parent/child links are [`TagIdx`] indices, never
//! owning handles, so dropping the content releases the whole tree at once.

use crate::tags::{self, Tag, TagFlags, TagSeen};
use bitflags::bitflags;
use css::{Block, Stylesheet};
use urls::Url;

/// Ignore tags once this many have been linked into the tree.
pub const MAX_TAGS: usize = 8192;

bitflags! {
    /// Per-document diagnostics; every malformed condition is recovered by
    /// flagging, never by failing.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ContentFlags: u32 {
        /// Input did not begin with `<`.
        const BAD_START = 1 << 0;
        /// Malformed tag or comment syntax encountered.
        const BAD_ELEMENTS = 1 << 1;
        /// At least one tag name missing from the catalog.
        const UNKNOWN_ELEMENTS = 1 << 2;
        /// `<?xml ...?>` seen.
        const XML = 1 << 3;
        /// Unpaired closing tag or same-tag misnesting.
        const UNBALANCED = 1 << 4;
        /// Tag cap hit; the tree is truncated.
        const TOO_MANY_TAGS = 1 << 5;
        /// A unique tag appeared twice.
        const DUPLICATE_ELEMENTS = 1 << 6;
        /// At least one `data:` image.
        const HAS_DATA_URLS = 1 << 7;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ImageFlags: u32 {
        /// `cid:` reference into another MIME part.
        const EMBEDDED = 1 << 0;
        /// Fetched from the network.
        const EXTERNAL = 1 << 1;
        /// Inline `data:` payload.
        const DATA = 1 << 2;
    }
}

/// Index into [`HtmlContent::all_tags`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TagIdx(pub(crate) u32);

impl TagIdx {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into [`HtmlContent::images`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageIdx(pub(crate) u32);

/// Recognized attribute kinds; everything else is consumed and discarded.
/// `href`, `src` and `action` all collapse into [`ComponentKind::Href`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentKind {
    Name,
    Href,
    Color,
    Bgcolor,
    Style,
    Class,
    Width,
    Height,
    Size,
    Rel,
    Alt,
    Id,
}

/// Specializer output attached to a tag.
#[derive(Clone, Debug, Default)]
pub enum Extra {
    #[default]
    None,
    Url(Url),
    Image(ImageIdx),
}

#[derive(Debug, Default)]
pub struct HtmlTag {
    /// Catalog id; `None` for unknown or broken tags.
    pub id: Option<Tag>,
    /// Lowercased, entity-decoded name.
    pub name: String,
    pub flags: TagFlags,
    /// `(kind, decoded value)` pairs in source order. Duplicates are kept;
    /// consumers read the first occurrence.
    pub components: Vec<(ComponentKind, Vec<u8>)>,
    pub parent: Option<TagIdx>,
    pub children: Vec<TagIdx>,
    pub extra: Extra,
    pub block: Option<Block>,
    /// Byte span of this tag's text inside `parsed`; after the post-pass the
    /// length includes all descendants.
    pub content_offset: usize,
    pub content_length: usize,
}

impl HtmlTag {
    pub fn first_component(&self, kind: ComponentKind) -> Option<&[u8]> {
        self.components
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v.as_slice())
    }

    pub(crate) fn first_component_str(&self, kind: ComponentKind) -> Option<String> {
        self.first_component(kind)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn is_closing(&self) -> bool {
        self.flags.contains(TagFlags::CLOSING)
    }
}

#[derive(Debug)]
pub struct HtmlImage {
    pub tag: TagIdx,
    /// The raw `src`/`href` value, scheme prefix included.
    pub src: String,
    pub url: Option<Url>,
    pub flags: ImageFlags,
    /// Dimensions probed out of a `data:` payload.
    pub embedded_dims: Option<crate::imgprobe::ImageDims>,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    /// The covered text is not readable when rendered.
    Invisible,
    /// Displayed link text names a different host than the link target.
    DisplayedUrlMismatch,
}

/// A `[pos, pos+len)` annotation over the extracted text, consumed by
/// downstream scoring. The sink is ordered newest-last; the post-pass only
/// ever adjusts the most recent entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessException {
    pub pos: usize,
    pub len: usize,
    pub kind: ExceptionKind,
    /// The tag the exception was emitted for, when there is one.
    pub tag: Option<TagIdx>,
}

#[derive(Debug, Default)]
pub struct HtmlContent {
    pub(crate) parsed: Vec<u8>,
    pub(crate) all_tags: Vec<HtmlTag>,
    pub(crate) root_tag: Option<TagIdx>,
    pub(crate) images: Vec<HtmlImage>,
    /// First successfully parsed `<base href>`; set at most once.
    pub base_url: Option<Url>,
    pub(crate) stylesheet: Option<Stylesheet>,
    pub(crate) tags_seen: TagSeen,
    pub flags: ContentFlags,
    pub total_tags: usize,
}

impl HtmlContent {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The extracted human-visible text (UTF-8 unless the input itself was
    /// not).
    pub fn parsed_text(&self) -> &[u8] {
        &self.parsed
    }

    pub fn root(&self) -> Option<TagIdx> {
        self.root_tag
    }

    pub fn tag(&self, idx: TagIdx) -> &HtmlTag {
        &self.all_tags[idx.index()]
    }

    pub(crate) fn tag_mut(&mut self, idx: TagIdx) -> &mut HtmlTag {
        &mut self.all_tags[idx.index()]
    }

    pub(crate) fn alloc_tag(&mut self) -> TagIdx {
        let idx = TagIdx(self.all_tags.len() as u32);
        self.all_tags.push(HtmlTag::default());
        idx
    }

    pub fn tag_name(&self, idx: TagIdx) -> &str {
        &self.tag(idx).name
    }

    pub fn images(&self) -> &[HtmlImage] {
        &self.images
    }

    pub fn image(&self, idx: ImageIdx) -> &HtmlImage {
        &self.images[idx.0 as usize]
    }

    /// Whether a tag with this (lowercase) name was seen anywhere in the
    /// input, closings included.
    pub fn tag_seen(&self, name: &str) -> bool {
        tags::by_name(name).is_some_and(|def| self.tags_seen.get(def.tag))
    }

    /// Linear scan for an embedded image whose `cid:` matches.
    pub fn find_embedded_image(&self, cid: &str) -> Option<&HtmlImage> {
        self.images.iter().find(|img| {
            img.flags.contains(ImageFlags::EMBEDDED)
                && img.src.strip_prefix("cid:").unwrap_or(&img.src) == cid
        })
    }

    /// Pre-order tag indices, root first. Tags never linked into the tree
    /// (unknown, broken, over-cap) are not visited.
    pub(crate) fn pre_order(&self) -> Vec<TagIdx> {
        let mut order = Vec::new();
        let Some(root) = self.root_tag else {
            return order;
        };
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            for &child in self.tag(idx).children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Post-order tag indices: every tag after all of its children.
    pub(crate) fn post_order(&self) -> Vec<TagIdx> {
        let mut order = self.pre_order();
        order.reverse();
        order
    }

    /// Structural dump: one `+`-prefixed, `;`-terminated name per tree node,
    /// depth encoded as the number of pluses.
    pub fn debug_structure(&self) -> String {
        let mut out = String::new();
        let Some(root) = self.root_tag else {
            return out;
        };
        let mut stack = vec![(root, 1usize)];
        while let Some((idx, level)) = stack.pop() {
            for _ in 0..level {
                out.push('+');
            }
            out.push_str(&self.tag(idx).name);
            out.push(';');
            for &child in self.tag(idx).children.iter().rev() {
                stack.push((child, level + 1));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked_pair() -> HtmlContent {
        let mut hc = HtmlContent::new();
        let root = hc.alloc_tag();
        let child = hc.alloc_tag();
        hc.tag_mut(root).name = "html".into();
        hc.tag_mut(child).name = "body".into();
        hc.tag_mut(child).parent = Some(root);
        hc.tag_mut(root).children.push(child);
        hc.root_tag = Some(root);
        hc
    }

    #[test]
    fn debug_structure_encodes_depth() {
        let hc = linked_pair();
        assert_eq!(hc.debug_structure(), "+html;++body;");
    }

    #[test]
    fn traversal_orders_are_consistent() {
        let hc = linked_pair();
        let pre: Vec<_> = hc.pre_order().iter().map(|i| hc.tag_name(*i).to_string()).collect();
        let post: Vec<_> = hc.post_order().iter().map(|i| hc.tag_name(*i).to_string()).collect();
        assert_eq!(pre, ["html", "body"]);
        assert_eq!(post, ["body", "html"]);
    }

    #[test]
    fn first_component_wins_over_duplicates() {
        let mut tag = HtmlTag::default();
        tag.components.push((ComponentKind::Href, b"http://first/".to_vec()));
        tag.components.push((ComponentKind::Href, b"http://second/".to_vec()));
        assert_eq!(tag.first_component(ComponentKind::Href), Some(&b"http://first/"[..]));
    }

    #[test]
    fn embedded_image_lookup_strips_cid_prefix() {
        let mut hc = HtmlContent::new();
        let tag = hc.alloc_tag();
        hc.images.push(HtmlImage {
            tag,
            src: "cid:part1@example".into(),
            url: None,
            flags: ImageFlags::EMBEDDED,
            embedded_dims: None,
            width: 0,
            height: 0,
        });
        assert!(hc.find_embedded_image("part1@example").is_some());
        assert!(hc.find_embedded_image("other@example").is_none());
    }
}
