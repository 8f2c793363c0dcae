//! Parser for `{{ }}` action templates.
//!
//! The parser builds just enough structure to find which other templates a
//! template includes: text, plain actions, comments, `template` calls, and
//! the `if`/`range`/`with` blocks that may contain them. Pipelines are kept
//! as raw text.

use std::collections::HashSet;

/// Errors from parsing a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A `{{` has no matching `}}`.
    #[error("{name}:{line}: unclosed action")]
    UnclosedAction {
        /// Template name.
        name: String,
        /// Line of the `{{`.
        line: usize,
    },

    /// A `/*` comment is not closed by `*/}}`.
    #[error("{name}:{line}: unclosed comment")]
    UnclosedComment {
        /// Template name.
        name: String,
        /// Line of the comment.
        line: usize,
    },

    /// An action contains nothing.
    #[error("{name}:{line}: missing value for command")]
    EmptyAction {
        /// Template name.
        name: String,
        /// Line of the action.
        line: usize,
    },

    /// `else` or `end` with no open block.
    #[error("{name}:{line}: unexpected {{{{{keyword}}}}}")]
    Unexpected {
        /// The stray keyword.
        keyword: String,
        /// Template name.
        name: String,
        /// Line of the action.
        line: usize,
    },

    /// A block is still open at the end of the input.
    #[error("{name}:{line}: unexpected EOF in {keyword} block")]
    MissingEnd {
        /// Keyword that opened the block.
        keyword: String,
        /// Template name.
        name: String,
        /// Line the block opened on.
        line: usize,
    },

    /// A block keyword with no pipeline.
    #[error("{name}:{line}: missing value for {keyword}")]
    MissingPipeline {
        /// The block keyword.
        keyword: String,
        /// Template name.
        name: String,
        /// Line of the action.
        line: usize,
    },

    /// A `template` action whose first argument is not a quoted name.
    #[error("{name}:{line}: template action needs a quoted template name")]
    TemplateName {
        /// Template name.
        name: String,
        /// Line of the action.
        line: usize,
    },

    /// `define` and `block` are not supported; templates live one per file.
    #[error("{name}:{line}: {{{{{keyword}}}}} is not supported")]
    Unsupported {
        /// The keyword.
        keyword: String,
        /// Template name.
        name: String,
        /// Line of the action.
        line: usize,
    },
}

/// The kind of a block action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `{{if}}`
    If,
    /// `{{range}}`
    Range,
    /// `{{with}}`
    With,
}

impl BlockKind {
    fn keyword(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::Range => "range",
            BlockKind::With => "with",
        }
    }
}

/// A node of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Literal text, after trim markers were applied.
    Text(String),
    /// A plain action's pipeline.
    Action(String),
    /// Comment contents.
    Comment(String),
    /// `{{template "name" pipeline}}`.
    Template {
        /// The included template.
        name: String,
        /// Argument pipeline, if any.
        pipeline: Option<String>,
    },
    /// `if`, `range`, or `with`. `else if` nests a block in `otherwise`.
    Block {
        /// Which block.
        kind: BlockKind,
        /// Controlling pipeline.
        pipeline: String,
        /// Nodes run when the pipeline is non-empty.
        body: Vec<Node>,
        /// Nodes of the `else` branch.
        otherwise: Option<Vec<Node>>,
    },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    /// Name the template was parsed under.
    pub name: String,
    /// Top-level nodes.
    pub root: Vec<Node>,
}

impl Tree {
    /// Names of the templates this tree includes, in first-occurrence order
    /// without duplicates.
    pub fn references(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        collect_references(&self.root, &mut seen, &mut names);
        names
    }
}

fn collect_references(nodes: &[Node], seen: &mut HashSet<String>, names: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Template { name, .. } => {
                if seen.insert(name.clone()) {
                    names.push(name.clone());
                }
            }
            Node::Block {
                body, otherwise, ..
            } => {
                collect_references(body, seen, names);
                if let Some(otherwise) = otherwise {
                    collect_references(otherwise, seen, names);
                }
            }
            Node::Text(_) | Node::Action(_) | Node::Comment(_) => {}
        }
    }
}

/// Parses template source into a [`Tree`].
pub trait TemplateParser: Send + Sync {
    /// Parses `text` as the template called `name`.
    fn parse(&self, name: &str, text: &str) -> Result<Tree, ParseError>;
}

/// The built-in parser for `{{ }}` action templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionParser;

impl TemplateParser for ActionParser {
    fn parse(&self, name: &str, text: &str) -> Result<Tree, ParseError> {
        Parser::new(name, text).run()
    }
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// An open block awaiting its `end`.
struct Frame {
    kind: BlockKind,
    pipeline: String,
    line: usize,
    body: Vec<Node>,
    otherwise: Option<Vec<Node>>,
    /// Opened by `else if`; its `end` also closes the enclosing frame.
    chained: bool,
}

struct Parser<'a> {
    name: &'a str,
    text: &'a str,
    pos: usize,
    root: Vec<Node>,
    stack: Vec<Frame>,
}

impl<'a> Parser<'a> {
    fn new(name: &'a str, text: &'a str) -> Self {
        Self {
            name,
            text,
            pos: 0,
            root: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn line_at(&self, pos: usize) -> usize {
        1 + self.text[..pos].matches('\n').count()
    }

    /// The node list new nodes are appended to.
    fn current(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(frame) => frame.otherwise.as_mut().unwrap_or(&mut frame.body),
            None => &mut self.root,
        }
    }

    fn push_text(&mut self, text: &str) {
        if !text.is_empty() {
            self.current().push(Node::Text(text.to_string()));
        }
    }

    fn run(mut self) -> Result<Tree, ParseError> {
        let source = self.text;
        let mut trim_next = false;
        while let Some(found) = source[self.pos..].find(OPEN) {
            let open = self.pos + found;
            let action_start = open + OPEN.len();
            let trim_left = source[action_start..].starts_with("- ")
                || source[action_start..].starts_with("-\t")
                || source[action_start..].starts_with("-\n");

            let mut text = &source[self.pos..open];
            if trim_next {
                text = text.trim_start();
            }
            if trim_left {
                text = text.trim_end();
            }
            self.push_text(text);

            let line = self.line_at(open);
            let inner_start = if trim_left { action_start + 1 } else { action_start };
            let (inner, after, trim_right) = self.action_body(inner_start, line)?;
            self.pos = after;
            trim_next = trim_right;
            self.action(inner.trim(), line)?;
        }

        let mut tail = &source[self.pos..];
        if trim_next {
            tail = tail.trim_start();
        }
        self.push_text(tail);

        if let Some(frame) = self.stack.pop() {
            return Err(ParseError::MissingEnd {
                keyword: frame.kind.keyword().to_string(),
                name: self.name.to_string(),
                line: frame.line,
            });
        }
        Ok(Tree {
            name: self.name.to_string(),
            root: self.root,
        })
    }

    /// Finds the end of the action starting at `start`. Returns the inner
    /// text, the index after `}}`, and whether a right trim marker was
    /// present. String and raw-string literals may contain `}}`.
    fn action_body(&self, start: usize, line: usize) -> Result<(&'a str, usize, bool), ParseError> {
        let text = self.text;
        let rest = &text[start..];

        if rest.trim_start().starts_with("/*") {
            let end = rest.find("*/").ok_or_else(|| ParseError::UnclosedComment {
                name: self.name.to_string(),
                line,
            })?;
            let after_comment = &rest[end + 2..];
            let (trim_right, skip) = if after_comment.starts_with(" -}}") {
                (true, 4)
            } else if after_comment.starts_with(CLOSE) {
                (false, 2)
            } else {
                return Err(ParseError::UnclosedComment {
                    name: self.name.to_string(),
                    line,
                });
            };
            let inner = &rest[..end + 2];
            return Ok((inner, start + end + 2 + skip, trim_right));
        }

        let bytes = rest.as_bytes();
        let mut quote: Option<u8> = None;
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            match quote {
                Some(b'"') if b == b'\\' => i += 1,
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None if b == b'"' || b == b'`' || b == b'\'' => quote = Some(b),
                None if bytes[i..].starts_with(CLOSE.as_bytes()) => {
                    let trim_right = i >= 2
                        && bytes[i - 1] == b'-'
                        && matches!(bytes[i - 2], b' ' | b'\t' | b'\n');
                    let inner_end = if trim_right { i - 1 } else { i };
                    return Ok((&rest[..inner_end], start + i + CLOSE.len(), trim_right));
                }
                None => {}
            }
            i += 1;
        }
        Err(ParseError::UnclosedAction {
            name: self.name.to_string(),
            line,
        })
    }

    fn action(&mut self, inner: &str, line: usize) -> Result<(), ParseError> {
        if let Some(comment) = inner.strip_prefix("/*").and_then(|c| c.strip_suffix("*/")) {
            self.current().push(Node::Comment(comment.to_string()));
            return Ok(());
        }
        if inner.is_empty() {
            return Err(ParseError::EmptyAction {
                name: self.name.to_string(),
                line,
            });
        }

        let (keyword, args) = match inner.find(char::is_whitespace) {
            Some(i) => (&inner[..i], inner[i..].trim()),
            None => (inner, ""),
        };
        match keyword {
            "if" => self.open(BlockKind::If, args, line, false),
            "range" => self.open(BlockKind::Range, args, line, false),
            "with" => self.open(BlockKind::With, args, line, false),
            "else" => self.otherwise(args, line),
            "end" => self.end(line),
            "template" => {
                let node = self.template(args, line)?;
                self.current().push(node);
                Ok(())
            }
            "define" | "block" => Err(ParseError::Unsupported {
                keyword: keyword.to_string(),
                name: self.name.to_string(),
                line,
            }),
            _ => {
                self.current().push(Node::Action(inner.to_string()));
                Ok(())
            }
        }
    }

    fn open(
        &mut self,
        kind: BlockKind,
        pipeline: &str,
        line: usize,
        chained: bool,
    ) -> Result<(), ParseError> {
        if pipeline.is_empty() {
            return Err(ParseError::MissingPipeline {
                keyword: kind.keyword().to_string(),
                name: self.name.to_string(),
                line,
            });
        }
        self.stack.push(Frame {
            kind,
            pipeline: pipeline.to_string(),
            line,
            body: Vec::new(),
            otherwise: None,
            chained,
        });
        Ok(())
    }

    /// `{{else}}`, `{{else if ...}}`, or `{{else with ...}}`.
    fn otherwise(&mut self, args: &str, line: usize) -> Result<(), ParseError> {
        let name = self.name;
        let stray = || ParseError::Unexpected {
            keyword: "else".to_string(),
            name: name.to_string(),
            line,
        };
        let frame = self.stack.last_mut().ok_or_else(stray)?;
        if frame.otherwise.is_some() {
            return Err(stray());
        }
        frame.otherwise = Some(Vec::new());

        if args.is_empty() {
            return Ok(());
        }
        let (keyword, rest) = match args.find(char::is_whitespace) {
            Some(i) => (&args[..i], args[i..].trim()),
            None => (args, ""),
        };
        match keyword {
            "if" => self.open(BlockKind::If, rest, line, true),
            "with" => self.open(BlockKind::With, rest, line, true),
            _ => Err(stray()),
        }
    }

    fn end(&mut self, line: usize) -> Result<(), ParseError> {
        loop {
            let frame = self.stack.pop().ok_or_else(|| ParseError::Unexpected {
                keyword: "end".to_string(),
                name: self.name.to_string(),
                line,
            })?;
            let chained = frame.chained;
            let node = Node::Block {
                kind: frame.kind,
                pipeline: frame.pipeline,
                body: frame.body,
                otherwise: frame.otherwise,
            };
            self.current().push(node);
            if !chained {
                return Ok(());
            }
        }
    }

    fn template(&self, args: &str, line: usize) -> Result<Node, ParseError> {
        let bad_name = || ParseError::TemplateName {
            name: self.name.to_string(),
            line,
        };
        let (name, rest) = match args.as_bytes().first() {
            Some(b'`') => {
                let end = args[1..].find('`').ok_or_else(bad_name)?;
                (args[1..1 + end].to_string(), &args[end + 2..])
            }
            Some(b'"') => unquote(args).ok_or_else(bad_name)?,
            _ => return Err(bad_name()),
        };
        if name.is_empty() {
            return Err(bad_name());
        }
        let rest = rest.trim();
        Ok(Node::Template {
            name,
            pipeline: (!rest.is_empty()).then(|| rest.to_string()),
        })
    }
}

/// Decodes a leading double-quoted string; returns it and the remaining
/// input.
fn unquote(s: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut chars = s.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((out, &s[i + 1..])),
            '\\' => {
                let (_, escaped) = chars.next()?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
            '\n' => return None,
            c => out.push(c),
        }
    }
    None
}
