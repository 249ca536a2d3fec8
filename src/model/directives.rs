//! `// pxx :: ...` export directives.
//!
//! A directive comment holds a comma-separated list of directives:
//!
//! ```text
//! // pxx :: export
//! // pxx :: hide()
//! // pxx :: instance(["float", "3"]), instance("sum3d", ["double", "3"])
//! ```
//!
//! The same lexer as the C++ frontend tokenizes the directive text.

use serde::Serialize;
use smol_str::SmolStr;

use super::ExportMark;
use crate::frontend::{SyntaxKind, tokenize};

/// An `instance(...)` directive: template arguments in parameter order and
/// an optional entry-point name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceDirective {
    pub name: Option<SmolStr>,
    pub args: Vec<String>,
}

/// Settings attached to one declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    /// The last `export` or `hide`, if any.
    pub mark: Option<ExportMark>,
    pub instances: Vec<InstanceDirective>,
}

impl Directives {
    pub fn is_empty(&self) -> bool {
        self.mark.is_none() && self.instances.is_empty()
    }
}

/// Parse the directives out of a block of `//` comments.
///
/// Comments that are not directives are ignored. Malformed directives are
/// dropped; each yields one message in the returned list.
pub fn parse_directives(comments: &[String]) -> (Directives, Vec<String>) {
    let mut directives = Directives::default();
    let mut errors = Vec::new();
    for comment in comments {
        let Some(body) = directive_body(comment) else {
            continue;
        };
        match DirectiveParser::new(body).parse_list() {
            Ok(items) => {
                for item in items {
                    match item {
                        Item::Export => directives.mark = Some(ExportMark::Exported),
                        Item::Hide => directives.mark = Some(ExportMark::Hidden),
                        Item::Instance(instance) => directives.instances.push(instance),
                    }
                }
            }
            Err(message) => errors.push(format!("malformed pxx directive `{}`: {message}", comment.trim())),
        }
    }
    (directives, errors)
}

/// The text after `//  pxx ::`, if `comment` is a directive.
fn directive_body(comment: &str) -> Option<&str> {
    let blank = [' ', '\t'];
    let rest = comment.trim_start_matches(blank).strip_prefix("//")?;
    let rest = rest.trim_start_matches(blank).strip_prefix("pxx")?;
    rest.trim_start_matches(blank).strip_prefix("::")
}

enum Item {
    Export,
    Hide,
    Instance(InstanceDirective),
}

struct DirectiveParser<'a> {
    tokens: Vec<(SyntaxKind, &'a str)>,
    pos: usize,
}

impl<'a> DirectiveParser<'a> {
    fn new(text: &'a str) -> Self {
        let tokens = tokenize(text)
            .into_iter()
            .filter(|t| !t.kind.is_trivia())
            .map(|t| (t.kind, t.text))
            .collect();
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> Option<(SyntaxKind, &'a str)> {
        self.tokens.get(self.pos).copied()
    }

    fn eat(&mut self, kind: SyntaxKind) -> bool {
        if self.current().is_some_and(|(k, _)| k == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: SyntaxKind, what: &str) -> Result<(), String> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> String {
        match self.current() {
            Some((_, text)) => format!("expected {what}, found `{text}`"),
            None => format!("expected {what}"),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Item>, String> {
        let mut items = vec![self.parse_item()?];
        while self.eat(SyntaxKind::COMMA) {
            items.push(self.parse_item()?);
        }
        match self.current() {
            None => Ok(items),
            Some(_) => Err(self.unexpected("`,` or end of directive")),
        }
    }

    fn parse_item(&mut self) -> Result<Item, String> {
        let name = match self.current() {
            Some((SyntaxKind::IDENT, name)) => name,
            _ => return Err(self.unexpected("directive name")),
        };
        self.pos += 1;
        match name {
            "export" | "hide" => {
                if self.eat(SyntaxKind::L_PAREN) {
                    self.expect(SyntaxKind::R_PAREN, "`)`")?;
                }
                Ok(if name == "export" { Item::Export } else { Item::Hide })
            }
            "instance" => {
                self.expect(SyntaxKind::L_PAREN, "`(`")?;
                let mut entry = None;
                if let Some((SyntaxKind::STRING, text)) = self.current() {
                    self.pos += 1;
                    entry = Some(SmolStr::new(unquote(text)));
                    self.expect(SyntaxKind::COMMA, "`,`")?;
                }
                let args = self.parse_string_list()?;
                self.expect(SyntaxKind::R_PAREN, "`)`")?;
                Ok(Item::Instance(InstanceDirective { name: entry, args }))
            }
            other => Err(format!("unknown directive `{other}`")),
        }
    }

    fn parse_string_list(&mut self) -> Result<Vec<String>, String> {
        self.expect(SyntaxKind::L_BRACKET, "`[`")?;
        let mut items = Vec::new();
        loop {
            match self.current() {
                Some((SyntaxKind::STRING, text)) => {
                    self.pos += 1;
                    items.push(unquote(text));
                }
                _ => return Err(self.unexpected("string")),
            }
            if !self.eat(SyntaxKind::COMMA) {
                break;
            }
        }
        self.expect(SyntaxKind::R_BRACKET, "`]`")?;
        Ok(items)
    }
}

fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}
