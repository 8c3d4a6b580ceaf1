//! Visual blocks: the per-element style summary the scanner cares about.
//!
//! A [`Block`] holds only the handful of properties that decide whether a
//! region of extracted text is readable, plus the colors used by downstream
//! heuristics. Unset fields mean "not specified here"; they are filled in
//! from the parent via [`Block::propagate`] (single-level inheritance only).

use crate::values::Color;
use crate::Declaration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Display {
    Inline,
    Block,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Per-channel distance below which foreground and background are treated as
/// the same color (white-on-white tricks and friends).
const SAME_COLOR_DISTANCE: u32 = 16;

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub fg_color: Option<Color>,
    pub bg_color: Option<Color>,
    pub display: Option<Display>,
    pub visibility: Option<Visibility>,
    pub font_size: Option<f32>,
    pub opacity: Option<f32>,
    /// Computed by [`Block::compute_visibility`]; an undefined block is
    /// visible until proven otherwise.
    pub visible: bool,
}

impl Default for Block {
    fn default() -> Self {
        Self {
            fg_color: None,
            bg_color: None,
            display: None,
            visibility: None,
            font_size: None,
            opacity: None,
            visible: true,
        }
    }
}

impl Block {
    pub fn is_undefined(&self) -> bool {
        self.fg_color.is_none()
            && self.bg_color.is_none()
            && self.display.is_none()
            && self.visibility.is_none()
            && self.font_size.is_none()
            && self.opacity.is_none()
    }

    /// Fill unset fields from `parent`. Set fields always win; the computed
    /// `visible` flag is not copied, callers recompute it after propagation.
    pub fn propagate(&mut self, parent: &Block) {
        if self.fg_color.is_none() {
            self.fg_color = parent.fg_color;
        }
        if self.bg_color.is_none() {
            self.bg_color = parent.bg_color;
        }
        if self.display.is_none() {
            self.display = parent.display;
        }
        if self.visibility.is_none() {
            self.visibility = parent.visibility;
        }
        if self.font_size.is_none() {
            self.font_size = parent.font_size;
        }
        if self.opacity.is_none() {
            self.opacity = parent.opacity;
        }
    }

    pub fn compute_visibility(&mut self) {
        self.visible = self.computed_visible();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    fn computed_visible(&self) -> bool {
        if self.display == Some(Display::None) {
            return false;
        }
        if self.visibility == Some(Visibility::Hidden) {
            return false;
        }
        if let Some(opacity) = self.opacity
            && opacity <= 0.01
        {
            return false;
        }
        if let Some(size) = self.font_size
            && size <= 0.0
        {
            return false;
        }
        if let Some(fg) = self.fg_color {
            if fg.alpha == 0 {
                return false;
            }
            if let Some(bg) = self.bg_color
                && bg.alpha > 0
                && fg.channel_distance(&bg) < SAME_COLOR_DISTANCE
            {
                return false;
            }
        }
        true
    }

    pub(crate) fn apply(&mut self, decl: &Declaration) {
        match decl.name.as_str() {
            "color" => {
                if let Some(color) = crate::parse_color(&decl.value) {
                    self.fg_color = Some(color);
                }
            }
            "background-color" => {
                if let Some(color) = crate::parse_color(&decl.value) {
                    self.bg_color = Some(color);
                }
            }
            "background" => {
                // Shorthand; take the first token that reads as a color.
                if let Some(color) = decl.value.split_whitespace().find_map(crate::parse_color) {
                    self.bg_color = Some(color);
                }
            }
            "display" => {
                self.display = match decl.value.to_ascii_lowercase().as_str() {
                    "none" => Some(Display::None),
                    "inline" | "inline-block" => Some(Display::Inline),
                    "block" | "table" | "table-row" | "table-cell" | "flex" | "grid" => {
                        Some(Display::Block)
                    }
                    _ => self.display,
                };
            }
            "visibility" => {
                self.visibility = match decl.value.to_ascii_lowercase().as_str() {
                    "hidden" | "collapse" => Some(Visibility::Hidden),
                    "visible" => Some(Visibility::Visible),
                    _ => self.visibility,
                };
            }
            "font-size" => {
                if let Some(size) = parse_font_size(&decl.value) {
                    self.font_size = Some(size);
                }
            }
            "opacity" => {
                if let Ok(v) = decl.value.trim().parse::<f32>() {
                    self.opacity = Some(v.clamp(0.0, 1.0));
                }
            }
            _ => {}
        }
    }
}

/// Numeric prefix of a font-size value; `0`, `0px`, `1pt`, `12px` all parse,
/// keywords do not.
fn parse_font_size(value: &str) -> Option<f32> {
    let v = value.trim();
    let digits_end = v
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(v.len());
    if digits_end == 0 {
        return None;
    }
    let num = v[..digits_end].parse::<f32>().ok()?;
    num.is_finite().then_some(num)
}

/// Parse a `style` attribute's declaration list into a [`Block`].
pub fn parse_block(input: &str) -> Block {
    let mut block = Block::default();
    for decl in crate::parse_declarations(input) {
        block.apply(&decl);
    }
    block
}
