//! Bracket-matching pretty printer.
//!
//! Works on serialized markup rather than a parsed tree: the text is split at
//! every `>` / `<` boundary and each fragment is indented by a depth counter.
//! Leaf text must not contain unescaped angle brackets, which holds for
//! anything written by [`super::rss`].

use once_cell::sync::Lazy;
use regex::Regex;

const INDENT: &str = "\t";
const LINE_BREAK: &str = "\r\n";

static TAG_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s*<").expect("tag gap pattern is valid"));

/// Put every tag pair on its own line, indented one tab per nesting level.
///
/// Lines are separated by CRLF and the output has no trailing line break.
///
/// # Examples
///
/// ```ignore
/// let out = format_xml("<root><item>x</item></root>");
/// assert_eq!(out, "<root>\r\n\t<item>x</item>\r\n</root>");
/// ```
pub fn format_xml(xml: &str) -> String {
    let xml = xml.trim();
    if xml.is_empty() {
        return String::new();
    }

    let nodes: Vec<&str> = TAG_GAP.split(xml).collect();
    let last = nodes.len() - 1;
    let mut depth = 0usize;
    let mut lines = Vec::with_capacity(nodes.len());

    for (i, node) in nodes.iter().enumerate() {
        if closes(node) {
            depth = depth.saturating_sub(1);
        }

        let mut text = *node;
        if i == 0 {
            text = text.strip_prefix('<').unwrap_or(text);
        }
        if i == last {
            text = text.strip_suffix('>').unwrap_or(text);
        }
        lines.push(format!("{}<{}>", INDENT.repeat(depth), text));

        if opens(node) {
            depth += 1;
        }
    }

    lines.join(LINE_BREAK)
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A closing tag: `/name...`.
fn closes(node: &str) -> bool {
    let mut chars = node.chars();
    chars.next() == Some('/') && chars.next().is_some_and(is_word)
}

/// An opening tag with nothing else on its line: a word start, no inner `>`,
/// and not self-closing.
fn opens(node: &str) -> bool {
    let node = node.strip_prefix('<').unwrap_or(node);
    let mut chars = node.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return false;
    };
    is_word(first) && last != '/' && !chars.as_str().contains('>')
}
