//! Minimal CSS support for the content scanner.
//!
//! This is deliberately not a browser CSS engine: it parses declaration
//! lists and flat rule sets well enough to answer one question — is the text
//! under a given element readable — and to surface the colors downstream
//! heuristics look at. Selector support is limited to type, `#id`, `.class`
//! and `*`; at-rules and combinators are skipped with a log line.

mod block;
mod values;

pub use block::{parse_block, Block, Display, Visibility};
pub use values::{parse_color, Color};

/// A single CSS property: `color: red`.
#[derive(Clone, Debug, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
}

impl Declaration {
    /// One `name: value` pair. The name folds to ASCII lowercase (the
    /// `Block` property matcher keys on it); the value keeps its case for
    /// the color and keyword parsers to deal with. Pairs without a colon or
    /// with an empty name yield nothing.
    fn parse(pair: &str) -> Option<Declaration> {
        let colon = pair.find(':')?;
        let name = pair[..colon].trim();
        if name.is_empty() {
            return None;
        }
        Some(Declaration {
            name: name.to_ascii_lowercase(),
            value: pair[colon + 1..].trim().to_string(),
        })
    }
}

/// Parse a declaration list (`color: red; font-size: 12px`).
pub fn parse_declarations(input: &str) -> Vec<Declaration> {
    input.split(';').filter_map(Declaration::parse).collect()
}

#[derive(Clone, Debug, PartialEq)]
enum Selector {
    Universal,
    Type(String),
    Id(String),
    Class(String),
}

fn is_type_name(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

impl Selector {
    /// One simple selector: `*`, a bare type name, `#id` or `.class`.
    /// Combinators, pseudo-classes and attribute selectors are out of
    /// scope for the scanner and yield nothing.
    fn parse(raw: &str) -> Option<Selector> {
        let raw = raw.trim();
        let mut rest = raw.chars();
        match rest.next()? {
            '*' if raw.len() == 1 => Some(Selector::Universal),
            '#' => {
                let id = rest.as_str().trim();
                (!id.is_empty()).then(|| Selector::Id(id.to_string()))
            }
            '.' => {
                let class = rest.as_str().trim();
                (!class.is_empty()).then(|| Selector::Class(class.to_string()))
            }
            _ if is_type_name(raw) => Some(Selector::Type(raw.to_ascii_lowercase())),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
struct Rule {
    selectors: Vec<Selector>,
    block: Block,
}

/// Flat rule set accumulated across the `<style>` elements of one document.
#[derive(Clone, Debug, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

impl Stylesheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Parse a stylesheet body and append its rules.
    ///
    /// Unsupported or malformed selectors and empty rule bodies are skipped,
    /// never fatal; partial results are kept.
    pub fn extend_from_css(&mut self, input: &str) {
        let input = strip_comments(input);
        for raw_block in input.split('}') {
            let Some((selector_str, declaration_str)) = raw_block.split_once('{') else {
                continue;
            };
            let selectors: Vec<Selector> = selector_str
                .split(',')
                .filter_map(Selector::parse)
                .collect();
            if selectors.is_empty() {
                if !selector_str.trim().is_empty() {
                    log::debug!(
                        target: "css",
                        "skipping unsupported selector list: {}",
                        selector_str.trim()
                    );
                }
                continue;
            }
            let declarations = parse_declarations(declaration_str);
            if declarations.is_empty() {
                continue;
            }
            let mut block = Block::default();
            for decl in &declarations {
                block.apply(decl);
            }
            if block.is_undefined() {
                continue;
            }
            self.rules.push(Rule { selectors, block });
        }
    }

    /// Merge the blocks of every rule matching the element, in rule order
    /// (later rules override earlier ones for fields they set).
    pub fn block_for(
        &self,
        tag_name: &str,
        id_attr: Option<&str>,
        class_attr: Option<&str>,
    ) -> Option<Block> {
        let mut merged: Option<Block> = None;
        for rule in &self.rules {
            let matched = rule.selectors.iter().any(|sel| match sel {
                Selector::Universal => true,
                Selector::Type(t) => tag_name.eq_ignore_ascii_case(t),
                Selector::Id(want) => id_attr.is_some_and(|v| v == want),
                Selector::Class(want) => class_attr
                    .is_some_and(|v| v.split_whitespace().any(|c| c == want)),
            });
            if !matched {
                continue;
            }
            match &mut merged {
                None => merged = Some(rule.block.clone()),
                Some(acc) => {
                    // Later rule wins: fill its unset fields from what we
                    // have so far, then replace the accumulator.
                    let mut next = rule.block.clone();
                    next.propagate(acc);
                    *acc = next;
                }
            }
        }
        merged
    }
}
