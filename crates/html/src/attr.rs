//! Attribute micro-parser: the per-byte state machine run for every byte
//! between `<` and `>` of a tag.
//!
//! The machine owns no text; `saved` and `name_start` are offsets into the
//! input so the surrounding buffers may reallocate freely. Values are copied
//! out, entity-decoded in place and stored on the tag as they complete.
//! Duplicate attributes of one kind are all stored; consumers read the first.

use crate::content::{ComponentKind, ContentFlags, HtmlTag};
use crate::entities::decode_entities_owned;
use crate::tags::{self, TagFlags};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum AttrState {
    #[default]
    Start,
    Name,
    SpacesAfterName,
    AttrName,
    SpacesBeforeEq,
    Equal,
    SpacesAfterEq,
    StartDquote,
    DqValue,
    EndDquote,
    StartSquote,
    SqValue,
    EndSquote,
    Value,
    SpacesAfterParam,
    IgnoreBadTag,
}

/// Tag-local parser state; reset for every new tag.
#[derive(Debug, Default)]
pub(crate) struct TagParser {
    state: AttrState,
    /// Start offset of the attribute name or value being accumulated.
    saved: Option<usize>,
    /// Start offset of the tag name.
    name_start: Option<usize>,
    component: Option<ComponentKind>,
}

fn is_graph(b: u8) -> bool {
    b.is_ascii_graphic()
}

/// The closed, case-insensitive attribute map. `name` is already
/// entity-decoded and lowercased.
fn component_from_name(name: &[u8]) -> Option<ComponentKind> {
    match name {
        b"name" => Some(ComponentKind::Name),
        b"href" | b"src" | b"action" => Some(ComponentKind::Href),
        b"color" => Some(ComponentKind::Color),
        b"bgcolor" => Some(ComponentKind::Bgcolor),
        b"style" => Some(ComponentKind::Style),
        b"class" => Some(ComponentKind::Class),
        b"width" => Some(ComponentKind::Width),
        b"height" => Some(ComponentKind::Height),
        b"size" => Some(ComponentKind::Size),
        b"rel" => Some(ComponentKind::Rel),
        b"alt" => Some(ComponentKind::Alt),
        b"id" => Some(ComponentKind::Id),
        _ => None,
    }
}

/// Lowercase a decoded tag or attribute name, UTF-8 aware (lossy on broken
/// sequences).
fn normalize_name(raw: &[u8]) -> String {
    let decoded = decode_entities_owned(raw);
    String::from_utf8_lossy(&decoded)
        .chars()
        .flat_map(char::to_lowercase)
        .collect()
}

impl TagParser {
    pub(crate) fn reset(&mut self) {
        *self = TagParser::default();
    }

    fn resolve_component(&mut self, input: &[u8], name_end: usize) {
        let Some(start) = self.saved else {
            self.component = None;
            return;
        };
        if name_end <= start {
            self.component = None;
            self.saved = None;
            return;
        }
        let decoded = decode_entities_owned(&input[start..name_end]);
        let lowered: Vec<u8> = decoded.iter().map(u8::to_ascii_lowercase).collect();
        self.component = component_from_name(&lowered);
        if self.component.is_none() {
            // Unknown attributes are consumed but never stored.
            self.saved = None;
        }
    }

    /// Walk back over trailing non-alphanumeric bytes of an attribute name.
    fn trimmed_name_end(&self, input: &[u8], pos: usize) -> usize {
        let start = self.saved.unwrap_or(pos);
        let mut end = pos;
        while end > start + 1 && !input[end - 1].is_ascii_alphanumeric() {
            end -= 1;
        }
        end
    }

    fn store_component(&mut self, tag: &mut HtmlTag, input: &[u8], pos: usize) {
        if let (Some(start), Some(kind)) = (self.saved, self.component)
            && pos > start
        {
            let value = decode_entities_owned(&input[start..pos]);
            tag.components.push((kind, value));
        }
        self.saved = None;
        self.component = None;
    }

    fn finish_name(
        &mut self,
        flags: &mut ContentFlags,
        tag: &mut HtmlTag,
        input: &[u8],
        pos: usize,
    ) {
        let start = self.name_start.unwrap_or(pos);
        if input[pos] == b'/' {
            tag.flags |= TagFlags::CLOSED;
        }
        if pos <= start {
            *flags |= ContentFlags::BAD_ELEMENTS;
            tag.id = None;
            tag.flags |= TagFlags::BROKEN;
            self.state = AttrState::IgnoreBadTag;
            return;
        }
        tag.name = normalize_name(&input[start..pos]);
        match tags::by_name(&tag.name) {
            Some(def) => {
                tag.id = Some(def.tag);
                tag.flags |= def.flags;
            }
            None => {
                *flags |= ContentFlags::UNKNOWN_ELEMENTS;
                tag.id = None;
            }
        }
        self.state = AttrState::SpacesAfterName;
    }

    /// Feed one byte at `pos`. The caller hands the whole tag slice so the
    /// machine can peek one byte ahead for `/>`.
    pub(crate) fn step(
        &mut self,
        flags: &mut ContentFlags,
        tag: &mut HtmlTag,
        input: &[u8],
        pos: usize,
    ) {
        let b = input[pos];
        let next = input.get(pos + 1).copied();

        match self.state {
            AttrState::Start => {
                if !b.is_ascii_alphabetic() && !b.is_ascii_whitespace() {
                    *flags |= ContentFlags::BAD_ELEMENTS;
                    tag.id = None;
                    tag.flags |= TagFlags::BROKEN;
                    self.state = AttrState::IgnoreBadTag;
                } else if b.is_ascii_alphabetic() {
                    self.name_start = Some(pos);
                    self.state = AttrState::Name;
                }
            }

            AttrState::Name => {
                if b.is_ascii_whitespace() || b == b'>' || b == b'/' {
                    self.finish_name(flags, tag, input, pos);
                }
            }

            AttrState::AttrName => {
                if self.saved.is_none() {
                    self.state = AttrState::IgnoreBadTag;
                } else if b == b'=' {
                    self.resolve_component(input, pos);
                    self.state = AttrState::Equal;
                } else if b == b'"' {
                    // Attribute name running straight into a quote.
                    let end = self.trimmed_name_end(input, pos);
                    self.resolve_component(input, end);
                    self.state = AttrState::StartDquote;
                } else if b.is_ascii_whitespace() {
                    self.resolve_component(input, pos);
                    self.state = AttrState::SpacesBeforeEq;
                } else if b == b'/' {
                    tag.flags |= TagFlags::CLOSED;
                } else if !is_graph(b) {
                    let end = self.trimmed_name_end(input, pos);
                    self.resolve_component(input, end);
                    if self.component.is_some() {
                        self.saved = Some(pos + 1);
                    }
                    self.state = AttrState::Value;
                }
            }

            AttrState::SpacesAfterName => {
                if !b.is_ascii_whitespace() {
                    self.saved = Some(pos);
                    if b == b'/' {
                        tag.flags |= TagFlags::CLOSED;
                    } else if b != b'>' {
                        self.state = AttrState::AttrName;
                    }
                }
            }

            AttrState::SpacesBeforeEq => {
                if b == b'=' {
                    self.state = AttrState::Equal;
                } else if !b.is_ascii_whitespace() {
                    if b == b'>' {
                        // Bare attribute at the end of the tag; nothing to
                        // store.
                    } else if b == b'"' || b == b'\'' {
                        // A quote with no equals sign; give up on the tag.
                        *flags |= ContentFlags::BAD_ELEMENTS;
                        tag.flags |= TagFlags::BROKEN;
                        self.state = AttrState::IgnoreBadTag;
                    } else {
                        // Previous attribute had no value; this byte starts
                        // the next name.
                        self.state = AttrState::AttrName;
                        self.saved = Some(pos);
                    }
                }
            }

            AttrState::Equal => {
                if b.is_ascii_whitespace() {
                    self.state = AttrState::SpacesAfterEq;
                } else if b == b'"' {
                    self.state = AttrState::StartDquote;
                } else if b == b'\'' {
                    self.state = AttrState::StartSquote;
                } else {
                    if self.saved.is_some() {
                        self.saved = Some(pos);
                    }
                    self.state = AttrState::Value;
                }
            }

            AttrState::SpacesAfterEq => {
                if b == b'"' {
                    self.state = AttrState::StartDquote;
                } else if b == b'\'' {
                    self.state = AttrState::StartSquote;
                } else if !b.is_ascii_whitespace() {
                    if self.saved.is_some() {
                        self.saved = Some(pos);
                    }
                    self.state = AttrState::Value;
                }
            }

            AttrState::StartDquote => {
                if b == b'"' {
                    // Empty value; store nothing.
                    self.saved = None;
                    self.state = AttrState::SpacesAfterParam;
                } else {
                    if self.saved.is_some() {
                        self.saved = Some(pos);
                    }
                    self.state = AttrState::DqValue;
                }
            }

            AttrState::StartSquote => {
                if b == b'\'' {
                    self.saved = None;
                    self.state = AttrState::SpacesAfterParam;
                } else {
                    if self.saved.is_some() {
                        self.saved = Some(pos);
                    }
                    self.state = AttrState::SqValue;
                }
            }

            AttrState::DqValue => {
                if b == b'"' {
                    self.store_component(tag, input, pos);
                    self.state = AttrState::EndDquote;
                }
            }

            AttrState::SqValue => {
                if b == b'\'' {
                    self.store_component(tag, input, pos);
                    self.state = AttrState::EndSquote;
                }
            }

            AttrState::Value => {
                if b == b'/' && next == Some(b'>') {
                    tag.flags |= TagFlags::CLOSED;
                    self.store_component(tag, input, pos);
                } else if b.is_ascii_whitespace() || b == b'>' || b == b'"' {
                    // A naked quote ends the value exactly like whitespace.
                    self.store_component(tag, input, pos);
                    self.state = AttrState::SpacesAfterParam;
                }
            }

            AttrState::EndDquote | AttrState::EndSquote => {
                if b.is_ascii_whitespace() {
                    self.state = AttrState::SpacesAfterParam;
                } else if b == b'/' && next == Some(b'>') {
                    tag.flags |= TagFlags::CLOSED;
                } else if b != b'>' {
                    // Next attribute starts with no space in between.
                    self.state = AttrState::AttrName;
                    self.saved = Some(pos);
                }
            }

            AttrState::SpacesAfterParam => {
                if !b.is_ascii_whitespace() {
                    if b == b'/' && next == Some(b'>') {
                        tag.flags |= TagFlags::CLOSED;
                    }
                    if b != b'>' {
                        self.state = AttrState::AttrName;
                        self.saved = Some(pos);
                    }
                }
            }

            AttrState::IgnoreBadTag => {}
        }
    }
}
