//! Static tag catalog: name ↔ id plus the class flags the tree builder and
//! specializers dispatch on.
//!
//! The catalog is process-wide immutable data; lookups by name use binary
//! search over the sorted table, lookups by id index it directly (variant
//! order and table order are the same, checked by tests).

use bitflags::bitflags;

bitflags! {
    /// Catalog class flags plus the flags the parser discovers per tag
    /// instance.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TagFlags: u32 {
        /// Inline content model; never opens a block on the stack.
        const INLINE = 1 << 0;
        /// Void element; cannot hold content.
        const EMPTY = 1 << 1;
        /// Head-only metadata; its content is not rendered.
        const HEAD = 1 << 2;
        /// Reserved for tags whose content model is not known.
        const UNKNOWN = 1 << 3;
        /// At most one instance per document.
        const UNIQUE = 1 << 4;
        /// Carries a link target (`href`/`src`/`action`).
        const HREF = 1 << 5;
        /// Carries a visual block (colors, style, visibility).
        const BLOCK = 1 << 6;

        // Discovered while parsing, per tag instance:
        /// `</...>` closing tag.
        const CLOSING = 1 << 16;
        /// Self-closed (`/>` or `/` inside the tag).
        const CLOSED = 1 << 17;
        /// Malformed beyond use.
        const BROKEN = 1 << 18;
        /// Content under this tag is not part of the readable text.
        const IGNORE = 1 << 19;
        /// Produced an image descriptor.
        const IMAGE = 1 << 20;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TagDef {
    pub tag: Tag,
    pub name: &'static str,
    pub flags: TagFlags,
}

macro_rules! tag_catalog {
    ($( $variant:ident, $name:literal, $flags:expr; )+) => {
        /// Recognized tag ids. Unknown tag names get no id at all.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Tag {
            $($variant,)+
        }

        pub const N_TAGS: usize = [$(Tag::$variant,)+].len();

        /// Sorted by name; same order as the `Tag` variants.
        static TAG_DEFS: [TagDef; N_TAGS] = [
            $(TagDef { tag: Tag::$variant, name: $name, flags: $flags },)+
        ];
    };
}

const NONE: TagFlags = TagFlags::empty();
const INLINE: TagFlags = TagFlags::INLINE;
const EMPTY: TagFlags = TagFlags::EMPTY;
const HEAD: TagFlags = TagFlags::HEAD;
const UNIQUE: TagFlags = TagFlags::UNIQUE;
const HREF: TagFlags = TagFlags::HREF;
const BLOCK: TagFlags = TagFlags::BLOCK;

tag_catalog! {
    A, "a", HREF;
    Abbr, "abbr", INLINE;
    Acronym, "acronym", INLINE;
    Address, "address", BLOCK;
    Applet, "applet", NONE;
    Area, "area", EMPTY.union(HREF);
    Article, "article", BLOCK;
    Aside, "aside", BLOCK;
    B, "b", INLINE;
    Base, "base", EMPTY.union(HEAD);
    Bdo, "bdo", INLINE;
    Big, "big", INLINE;
    Blockquote, "blockquote", BLOCK;
    Body, "body", UNIQUE.union(BLOCK);
    Br, "br", EMPTY.union(INLINE);
    Button, "button", NONE;
    Caption, "caption", BLOCK;
    Center, "center", BLOCK;
    Cite, "cite", INLINE;
    Code, "code", INLINE;
    Col, "col", EMPTY;
    Colgroup, "colgroup", NONE;
    Dd, "dd", BLOCK;
    Dfn, "dfn", INLINE;
    Dir, "dir", BLOCK;
    Div, "div", BLOCK;
    Dl, "dl", BLOCK;
    Dt, "dt", BLOCK;
    Em, "em", INLINE;
    Embed, "embed", EMPTY;
    Fieldset, "fieldset", NONE;
    Figcaption, "figcaption", BLOCK;
    Figure, "figure", BLOCK;
    Font, "font", INLINE.union(BLOCK);
    Footer, "footer", BLOCK;
    Form, "form", HREF;
    Frame, "frame", EMPTY;
    Frameset, "frameset", NONE;
    H1, "h1", BLOCK;
    H2, "h2", BLOCK;
    H3, "h3", BLOCK;
    H4, "h4", BLOCK;
    H5, "h5", BLOCK;
    H6, "h6", BLOCK;
    Head, "head", UNIQUE.union(HEAD);
    Header, "header", BLOCK;
    Hr, "hr", EMPTY;
    Html, "html", UNIQUE.union(BLOCK);
    I, "i", INLINE;
    Iframe, "iframe", NONE;
    Img, "img", EMPTY.union(INLINE);
    Input, "input", EMPTY.union(INLINE);
    Kbd, "kbd", INLINE;
    Label, "label", INLINE;
    Legend, "legend", NONE;
    Li, "li", BLOCK;
    Link, "link", EMPTY.union(HEAD);
    Main, "main", BLOCK;
    Map, "map", NONE;
    Marquee, "marquee", BLOCK;
    Menu, "menu", BLOCK;
    Meta, "meta", EMPTY.union(HEAD);
    Nav, "nav", BLOCK;
    Noframes, "noframes", HEAD;
    Noscript, "noscript", HEAD;
    Object, "object", NONE;
    Ol, "ol", BLOCK;
    Optgroup, "optgroup", NONE;
    Option, "option", NONE;
    P, "p", BLOCK;
    Param, "param", EMPTY;
    Pre, "pre", BLOCK;
    Q, "q", INLINE;
    S, "s", INLINE;
    Samp, "samp", INLINE;
    Script, "script", HEAD;
    Section, "section", BLOCK;
    Select, "select", NONE;
    Small, "small", INLINE;
    Source, "source", EMPTY;
    Span, "span", INLINE.union(BLOCK);
    Strike, "strike", INLINE;
    Strong, "strong", INLINE;
    Style, "style", HEAD;
    Sub, "sub", INLINE;
    Sup, "sup", INLINE;
    Table, "table", BLOCK;
    Tbody, "tbody", BLOCK;
    Td, "td", BLOCK;
    Textarea, "textarea", NONE;
    Tfoot, "tfoot", BLOCK;
    Th, "th", BLOCK;
    Thead, "thead", BLOCK;
    Title, "title", UNIQUE.union(HEAD);
    Tr, "tr", BLOCK;
    Track, "track", EMPTY;
    Tt, "tt", INLINE;
    U, "u", INLINE;
    Ul, "ul", BLOCK;
    Var, "var", INLINE;
    Wbr, "wbr", EMPTY.union(INLINE);
}

pub fn by_name(name: &str) -> Option<&'static TagDef> {
    TAG_DEFS
        .binary_search_by(|def| def.name.cmp(name))
        .ok()
        .map(|i| &TAG_DEFS[i])
}

pub fn by_id(tag: Tag) -> &'static TagDef {
    let def = &TAG_DEFS[tag as usize];
    debug_assert!(def.tag == tag, "catalog order must match variant order");
    def
}

/// Fixed bitset over tag ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TagSeen {
    bits: [u64; N_TAGS.div_ceil(64)],
}

impl TagSeen {
    pub fn get(&self, tag: Tag) -> bool {
        let i = tag as usize;
        self.bits[i / 64] & (1 << (i % 64)) != 0
    }

    pub fn set(&mut self, tag: Tag) {
        let i = tag as usize;
        self.bits[i / 64] |= 1 << (i % 64);
    }
}
