//! A CSS selector subset for locating elements in a [`Document`](crate::Document).
//!
//! Supported: type (`div`, `*`), `#id`, `.class`, attribute selectors
//! (`[name]`, `[name="v"]`, `[name*="v"]`, `[name^="v"]`, `[name$="v"]`,
//! `[name~="v"]`), descendant and child (`>`) combinators, and
//! comma-separated lists.

use crate::element::ElementRef;
use crate::errors::DomError;

/// Represents ways to locate an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A parsed selector list; matches when any alternative matches
    Css {
        source: String,
        alternatives: Vec<ComplexSelector>,
    },
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

/// Compounds joined by combinators, e.g. `nav.sidebar > a[href]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    compounds: Vec<CompoundSelector>,
    /// `combinators[i]` sits between `compounds[i]` and `compounds[i + 1]`.
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttributeSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelector {
    pub name: String,
    pub op: AttributeOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeOp {
    Exists,
    Equals(String),
    Contains(String),
    Prefix(String),
    Suffix(String),
    /// `~=`: whitespace-separated word match
    Word(String),
}

impl Selector {
    pub fn parse(source: &str) -> Result<Selector, DomError> {
        let alternatives = Parser::new(source)
            .parse_list()
            .map_err(|reason| DomError::InvalidSelector(format!("{source:?}: {reason}")))?;
        Ok(Selector::Css {
            source: source.trim().to_string(),
            alternatives,
        })
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Selector::Css { .. })
    }

    pub fn matches(&self, element: &ElementRef<'_>) -> bool {
        match self {
            Selector::Css { alternatives, .. } => {
                alternatives.iter().any(|complex| complex.matches(element))
            }
            Selector::Invalid(_) => false,
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css { source, .. } => write!(f, "{source}"),
            Selector::Invalid(reason) => write!(f, "<invalid: {reason}>"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        match Selector::parse(s) {
            Ok(selector) => selector,
            Err(e) => Selector::Invalid(e.to_string()),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

impl From<&Selector> for Selector {
    fn from(s: &Selector) -> Self {
        s.clone()
    }
}

impl ComplexSelector {
    fn matches(&self, element: &ElementRef<'_>) -> bool {
        match self.compounds.len() {
            0 => false,
            n => self.matches_at(n - 1, element),
        }
    }

    fn matches_at(&self, index: usize, element: &ElementRef<'_>) -> bool {
        if !self.compounds[index].matches(element) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match self.combinators[index - 1] {
            Combinator::Child => element
                .parent()
                .is_some_and(|parent| self.matches_at(index - 1, &parent)),
            Combinator::Descendant => element
                .ancestors()
                .any(|ancestor| self.matches_at(index - 1, &ancestor)),
        }
    }
}

impl CompoundSelector {
    fn matches(&self, element: &ElementRef<'_>) -> bool {
        let node = element.node();
        if node.is_text() {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !node.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|class| element.has_class(class))
            && self.attributes.iter().all(|attr| attr.matches(element))
    }
}

impl AttributeSelector {
    fn matches(&self, element: &ElementRef<'_>) -> bool {
        let Some(actual) = element.attr(&self.name) else {
            return false;
        };
        match &self.op {
            AttributeOp::Exists => true,
            AttributeOp::Equals(v) => actual == v,
            AttributeOp::Contains(v) => !v.is_empty() && actual.contains(v.as_str()),
            AttributeOp::Prefix(v) => !v.is_empty() && actual.starts_with(v.as_str()),
            AttributeOp::Suffix(v) => !v.is_empty() && actual.ends_with(v.as_str()),
            AttributeOp::Word(v) => actual.split_ascii_whitespace().any(|w| w == v),
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Returns true when any whitespace was skipped.
    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(format!("expected '{expected}', found '{c}'")),
            None => Err(format!("expected '{expected}', found end of input")),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<ComplexSelector>, String> {
        let mut list = Vec::new();
        loop {
            self.skip_ws();
            list.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                None => return Ok(list),
                Some(c) => return Err(format!("unexpected '{c}' at position {}", self.pos)),
            }
        }
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, String> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    combinators.push(Combinator::Child);
                }
                Some(_) if had_ws => combinators.push(Combinator::Descendant),
                Some(c) => return Err(format!("unexpected '{c}' at position {}", self.pos)),
            }
            compounds.push(self.parse_compound()?);
        }
        Ok(ComplexSelector {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<CompoundSelector, String> {
        let start = self.pos;
        let mut compound = CompoundSelector::default();

        match self.peek() {
            Some('*') => self.pos += 1,
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attributes.push(self.attribute()?);
                }
                _ => break,
            }
        }

        if self.pos == start {
            return Err(match self.peek() {
                Some(c) => format!("expected a selector at position {start}, found '{c}'"),
                None => "expected a selector, found end of input".to_string(),
            });
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<AttributeSelector, String> {
        self.skip_ws();
        let name = self.ident()?;
        self.skip_ws();

        let op = match self.bump() {
            Some(']') => {
                return Ok(AttributeSelector {
                    name,
                    op: AttributeOp::Exists,
                })
            }
            Some('=') => '=',
            Some(c @ ('*' | '^' | '$' | '~')) => {
                self.expect('=')?;
                c
            }
            Some(c) => return Err(format!("unexpected '{c}' in attribute selector")),
            None => return Err("unterminated attribute selector".to_string()),
        };

        self.skip_ws();
        let value = self.value()?;
        self.skip_ws();
        self.expect(']')?;

        let op = match op {
            '*' => AttributeOp::Contains(value),
            '^' => AttributeOp::Prefix(value),
            '$' => AttributeOp::Suffix(value),
            '~' => AttributeOp::Word(value),
            _ => AttributeOp::Equals(value),
        };
        Ok(AttributeSelector { name, op })
    }

    fn value(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some('\\') => {
                            if let Some(c) = self.bump() {
                                value.push(c);
                            }
                        }
                        Some(c) if c == quote => return Ok(value),
                        Some(c) => value.push(c),
                        None => return Err("unterminated string".to_string()),
                    }
                }
            }
            _ => self.ident(),
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(format!("expected an identifier at position {start}"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Document, Node};

    fn page() -> Document {
        Document::new(
            Node::element("html").child(
                Node::element("body")
                    .child(
                        Node::element("nav").class("sidebar").child(
                            Node::element("a")
                                .attr("href", "https://accounts.google.com/SignOutOptions")
                                .attr("aria-label", "Google Account: Jane (jane@example.com)")
                                .with_text("Jane"),
                        ),
                    )
                    .child(
                        Node::element("div").attr("id", "main").child(
                            Node::element("button")
                                .class("send-button")
                                .class("submit")
                                .attr("aria-label", "Send message"),
                        ),
                    ),
            ),
        )
    }

    #[test]
    fn test_parse_compound_parts() {
        let selector = Selector::parse("button.send-button.submit[aria-label=\"Send message\"]")
            .expect("valid selector");
        match selector {
            Selector::Css { alternatives, .. } => {
                assert_eq!(alternatives.len(), 1);
                let compound = &alternatives[0].compounds[0];
                assert_eq!(compound.tag.as_deref(), Some("button"));
                assert_eq!(compound.classes, vec!["send-button", "submit"]);
                assert_eq!(
                    compound.attributes[0].op,
                    AttributeOp::Equals("Send message".to_string())
                );
            }
            _ => panic!("Expected Css selector"),
        }
    }

    #[test]
    fn test_invalid_selectors() {
        for source in ["", "div >", "[aria-label", "a[href=\"x]", "div!", ".", "a[href|=x]"] {
            let selector = Selector::from(source);
            assert!(!selector.is_valid(), "{source:?} should be invalid");
        }
    }

    #[test]
    fn test_attribute_operators() {
        let doc = page();
        assert!(doc
            .query_selector("a[href*=\"accounts.google.com\"][aria-label*=\"@\"]")
            .is_some());
        assert!(doc.query_selector("a[href^='https://accounts']").is_some());
        assert!(doc.query_selector("a[href$=SignOutOptions]").is_some());
        assert!(doc.query_selector("button[class~=submit]").is_some());
        assert!(doc.query_selector("button[class~=sub]").is_none());
        assert!(doc.query_selector("a[title]").is_none());
    }

    #[test]
    fn test_combinators() {
        let doc = page();
        assert!(doc.query_selector("nav.sidebar a").is_some());
        assert!(doc.query_selector("nav.sidebar > a").is_some());
        assert!(doc.query_selector("body > a").is_none());
        assert!(doc.query_selector("html a").is_some());
        assert!(doc.query_selector("#main > button.send-button").is_some());
        assert!(doc.query_selector("#main nav").is_none());
    }

    #[test]
    fn test_selector_list_document_order() {
        let doc = page();
        let matches = doc.query_selector_all("button, a");
        let tags: Vec<&str> = matches.iter().map(|e| e.tag()).collect();
        assert_eq!(tags, vec!["a", "button"]);
    }

    #[test]
    fn test_invalid_selector_matches_nothing() {
        let doc = page();
        assert!(doc.query_selector("button[").is_none());
        assert!(doc.query_selector_all(">>").is_empty());
    }
}
