//! Document transforms applied before a chart enters the site json.

use std::collections::HashMap;

use crate::chart::ChartDocument;

/// Output of a [`Transform`]: the text to publish and the link targets the
/// document references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Derived {
    /// Text stored in the aggregate for this chart.
    pub text: String,
    /// Link and image destinations in document order, without duplicates.
    pub references: Vec<String>,
}

/// Turns a chart into its aggregate text and reference list.
pub trait Transform: Send + Sync {
    /// Transforms `doc`.
    fn transform(&self, doc: &ChartDocument) -> Derived;
}

/// Publishes the raw chart text and collects the destinations of markdown
/// links, images, autolinks, and used reference-style links in the body.
///
/// Fenced code blocks and code spans are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkTransform;

impl Transform for LinkTransform {
    fn transform(&self, doc: &ChartDocument) -> Derived {
        Derived {
            text: doc.text.clone(),
            references: links(&doc.body),
        }
    }
}

/// Extracts link destinations from markdown text.
pub fn links(markdown: &str) -> Vec<String> {
    let (prose, definitions) = split_prose(markdown);
    let mut scanner = Scanner {
        definitions,
        found: Vec::new(),
    };
    scanner.scan(&prose);
    scanner.found
}

/// Separates prose from fenced code and collects reference definitions.
///
/// Returns the prose lines joined with `\n` and a map from normalized label
/// to destination.
fn split_prose(markdown: &str) -> (String, HashMap<String, String>) {
    let mut prose = String::with_capacity(markdown.len());
    let mut definitions = HashMap::new();
    let mut fence: Option<(u8, usize)> = None;

    for line in markdown.lines() {
        let trimmed = strip_indent(line);
        if let Some((marker, len)) = fence {
            if let Some(run) = fence_run(trimmed) {
                if run.0 == marker && run.1 >= len && trimmed[run.1..].trim().is_empty() {
                    fence = None;
                }
            }
            continue;
        }
        if let Some(run) = fence_run(trimmed) {
            fence = Some(run);
            continue;
        }
        if let Some((label, dest)) = definition(trimmed) {
            definitions.entry(label).or_insert(dest);
            continue;
        }
        prose.push_str(line);
        prose.push('\n');
    }
    (prose, definitions)
}

/// Strips up to three leading spaces; more makes an indented line.
fn strip_indent(line: &str) -> &str {
    let spaces = line.bytes().take_while(|&b| b == b' ').count();
    if spaces <= 3 {
        &line[spaces..]
    } else {
        line
    }
}

/// Returns the marker byte and run length if `line` opens or closes a
/// code fence.
fn fence_run(line: &str) -> Option<(u8, usize)> {
    let marker = *line.as_bytes().first()?;
    if marker != b'`' && marker != b'~' {
        return None;
    }
    let len = line.bytes().take_while(|&b| b == marker).count();
    (len >= 3).then_some((marker, len))
}

/// Parses `[label]: destination "title"`.
fn definition(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix('[')?;
    let close = rest.find("]:")?;
    let label = normalize_label(&rest[..close]);
    if label.is_empty() {
        return None;
    }
    let dest = rest[close + 2..].split_whitespace().next()?;
    let dest = dest
        .strip_prefix('<')
        .and_then(|d| d.strip_suffix('>'))
        .unwrap_or(dest);
    Some((label, dest.to_string()))
}

/// Case-folds a label and collapses its internal whitespace.
fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

struct Scanner {
    definitions: HashMap<String, String>,
    found: Vec<String>,
}

impl Scanner {
    fn push(&mut self, dest: &str) {
        if !dest.is_empty() && !self.found.iter().any(|f| f == dest) {
            self.found.push(dest.to_string());
        }
    }

    fn lookup(&mut self, label: &str) -> bool {
        match self.definitions.get(&normalize_label(label)).cloned() {
            Some(dest) => {
                self.push(&dest);
                true
            }
            None => false,
        }
    }

    fn scan(&mut self, text: &str) {
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'`' => i = skip_code_span(bytes, i),
                b'<' => i = self.autolink(text, i),
                b'[' => i = self.link(text, i),
                _ => i += 1,
            }
        }
    }

    /// `<scheme:...>`; returns the index to resume at.
    fn autolink(&mut self, text: &str, start: usize) -> usize {
        let rest = &text[start + 1..];
        let Some(end) = rest.find('>') else {
            return start + 1;
        };
        let inner = &rest[..end];
        let is_link = !inner.is_empty()
            && !inner.contains(char::is_whitespace)
            && (inner.contains("://") || inner.starts_with("mailto:"));
        if is_link {
            self.push(inner);
            start + end + 2
        } else {
            start + 1
        }
    }

    /// `[text](dest)`, `[text][label]`, `[label][]`, or `[label]`, with an
    /// optional `!` before it; returns the index to resume at.
    fn link(&mut self, text: &str, start: usize) -> usize {
        let bytes = text.as_bytes();
        let Some(close) = matching_bracket(bytes, start) else {
            return start + 1;
        };
        let label = &text[start + 1..close];
        // Images and links nested in the label come first.
        self.scan(label);

        let after = close + 1;
        match bytes.get(after) {
            Some(b'(') => match inline_destination(text, after) {
                Some((dest, end)) => {
                    self.push(dest);
                    end
                }
                None => after,
            },
            Some(b'[') => {
                let Some(ref_close) = text[after + 1..].find(']').map(|p| after + 1 + p) else {
                    return after;
                };
                let reference = &text[after + 1..ref_close];
                let reference = if reference.trim().is_empty() {
                    label
                } else {
                    reference
                };
                self.lookup(reference);
                ref_close + 1
            }
            _ => {
                self.lookup(label);
                after
            }
        }
    }
}

/// Skips a code span opened by the backtick run at `start`. An unmatched run
/// is literal text.
fn skip_code_span(bytes: &[u8], start: usize) -> usize {
    let run = bytes[start..].iter().take_while(|&&b| b == b'`').count();
    let mut i = start + run;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let close = bytes[i..].iter().take_while(|&&b| b == b'`').count();
            if close == run {
                return i + close;
            }
            i += close;
        } else {
            i += 1;
        }
    }
    start + run
}

/// Index of the `]` closing the `[` at `open`, honoring nesting and escapes.
fn matching_bracket(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Parses `(dest "title")` starting at the `(`; returns the destination and
/// the index after the closing `)`.
fn inline_destination(text: &str, open: usize) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    let mut i = open + 1;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    let (dest, mut i) = if bytes.get(i) == Some(&b'<') {
        let end = i + 1 + text[i + 1..].find('>')?;
        (&text[i + 1..end], end + 1)
    } else {
        let start = i;
        let mut depth = 0usize;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 1,
                b'(' => depth += 1,
                b')' if depth == 0 => break,
                b')' => depth -= 1,
                b if b.is_ascii_whitespace() => break,
                _ => {}
            }
            i += 1;
        }
        (&text[start..i.min(bytes.len())], i)
    };

    // Skip an optional title up to the closing paren.
    let mut quote = None;
    while i < bytes.len() {
        match (bytes[i], quote) {
            (b')', None) => return Some((dest, i + 1)),
            (b'"' | b'\'', None) => quote = Some(bytes[i]),
            (b, Some(q)) if b == q => quote = None,
            _ => {}
        }
        i += 1;
    }
    None
}
