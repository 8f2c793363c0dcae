//! Text extraction from SVG figures.
//!
//! Only the XML structure needed to find character data is understood:
//! elements, comments, processing instructions, the doctype, CDATA
//! sections, and the predefined and numeric entities. Element nesting is
//! checked so a truncated figure is reported rather than half-read.

/// Errors from reading an SVG document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SvgError {
    /// The document is not UTF-8.
    #[error("svg is not valid UTF-8")]
    NotUtf8,

    /// A markup construct runs to the end of the input.
    #[error("unterminated {construct} at byte {offset}")]
    Unterminated {
        /// What was left open, e.g. `comment`.
        construct: &'static str,
        /// Byte offset where it starts.
        offset: usize,
    },

    /// A tag has no name.
    #[error("malformed tag at byte {offset}")]
    MalformedTag {
        /// Byte offset of the `<`.
        offset: usize,
    },

    /// An end tag does not match the innermost open element.
    #[error("element <{expected}> closed by </{found}> at byte {offset}")]
    Mismatched {
        /// Innermost open element, or empty if none is open.
        expected: String,
        /// Name in the end tag.
        found: String,
        /// Byte offset of the end tag.
        offset: usize,
    },

    /// The document ends inside an element.
    #[error("element <{name}> is never closed")]
    Unclosed {
        /// The innermost open element.
        name: String,
    },

    /// An entity reference is unknown or malformed.
    #[error("invalid entity `&{entity};` at byte {offset}")]
    Entity {
        /// The entity text between `&` and `;`.
        entity: String,
        /// Byte offset of the `&`.
        offset: usize,
    },
}

/// Returns the character data segments of an XML document whose trimmed
/// text is non-empty, in document order, with entities decoded.
///
/// Each run of text between two pieces of markup is one segment, and each
/// CDATA section is its own segment.
pub fn character_data(data: &[u8]) -> Result<Vec<String>, SvgError> {
    let text = std::str::from_utf8(data).map_err(|_| SvgError::NotUtf8)?;
    let mut segments = Vec::new();
    let mut open: Vec<&str> = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        if !rest.starts_with('<') {
            let end = rest.find('<').map_or(text.len(), |i| pos + i);
            let decoded = decode_entities(&text[pos..end], pos)?;
            if !decoded.trim().is_empty() {
                segments.push(decoded);
            }
            pos = end;
        } else if rest.starts_with("<!--") {
            pos = skip_past(text, pos, "-->", "comment")?;
        } else if let Some(body) = rest.strip_prefix("<![CDATA[") {
            let end = body.find("]]>").ok_or(SvgError::Unterminated {
                construct: "CDATA section",
                offset: pos,
            })?;
            let cdata = &body[..end];
            if !cdata.trim().is_empty() {
                segments.push(cdata.to_string());
            }
            pos += "<![CDATA[".len() + end + "]]>".len();
        } else if rest.starts_with("<?") {
            pos = skip_past(text, pos, "?>", "processing instruction")?;
        } else if rest.starts_with("<!") {
            pos = skip_declaration(text, pos)?;
        } else if let Some(body) = rest.strip_prefix("</") {
            let end = body.find('>').ok_or(SvgError::Unterminated {
                construct: "end tag",
                offset: pos,
            })?;
            let name = body[..end].trim();
            match open.pop() {
                Some(expected) if expected == name => {}
                expected => {
                    return Err(SvgError::Mismatched {
                        expected: expected.unwrap_or_default().to_string(),
                        found: name.to_string(),
                        offset: pos,
                    })
                }
            }
            pos += 2 + end + 1;
        } else {
            let (name, end, self_closing) = start_tag(text, pos)?;
            if !self_closing {
                open.push(name);
            }
            pos = end;
        }
    }

    match open.pop() {
        Some(name) => Err(SvgError::Unclosed {
            name: name.to_string(),
        }),
        None => Ok(segments),
    }
}

/// Returns the index just past the first `terminator` after `pos`.
fn skip_past(
    text: &str,
    pos: usize,
    terminator: &str,
    construct: &'static str,
) -> Result<usize, SvgError> {
    text[pos + 2..]
        .find(terminator)
        .map(|i| pos + 2 + i + terminator.len())
        .ok_or(SvgError::Unterminated {
            construct,
            offset: pos,
        })
}

/// Skips `<!DOCTYPE ...>`, including a bracketed internal subset.
fn skip_declaration(text: &str, pos: usize) -> Result<usize, SvgError> {
    let mut depth = 0usize;
    let mut quote = None;
    for (i, c) in text[pos + 2..].char_indices() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            (_, Some(_)) => {}
            ('[', None) => depth += 1,
            (']', None) => depth = depth.saturating_sub(1),
            ('>', None) if depth == 0 => return Ok(pos + 2 + i + 1),
            _ => {}
        }
    }
    Err(SvgError::Unterminated {
        construct: "declaration",
        offset: pos,
    })
}

/// Parses a start tag at `pos`; returns its name, the index past `>`, and
/// whether it was self-closing. Attribute values may contain `>`.
fn start_tag(text: &str, pos: usize) -> Result<(&str, usize, bool), SvgError> {
    let body = &text[pos + 1..];
    let name_len = body
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(body.len());
    if name_len == 0 {
        return Err(SvgError::MalformedTag { offset: pos });
    }
    let name = &body[..name_len];

    let mut quote = None;
    let mut prev = ' ';
    for (i, c) in body[name_len..].char_indices() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            ('>', None) => return Ok((name, pos + 1 + name_len + i + 1, prev == '/')),
            _ => {}
        }
        prev = c;
    }
    Err(SvgError::Unterminated {
        construct: "start tag",
        offset: pos,
    })
}

/// Decodes the predefined and numeric entities in a text run starting at
/// byte `base` of the document.
fn decode_entities(raw: &str, base: usize) -> Result<String, SvgError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let offset = base + (raw.len() - rest.len()) + amp;
        let after = &rest[amp + 1..];
        let semi = after.find(';').ok_or_else(|| SvgError::Entity {
            entity: after.chars().take(8).collect(),
            offset,
        })?;
        let entity = &after[..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => numeric_entity(entity),
        };
        match decoded {
            Some(c) => out.push(c),
            None => {
                return Err(SvgError::Entity {
                    entity: entity.to_string(),
                    offset,
                })
            }
        }
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn numeric_entity(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}
