//! Charts: the content document that marks a directory of the site.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use atlas_common::FileStamp;

/// A directory's content document, located but not yet read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    src: PathBuf,
    root: PathBuf,
}

/// Header fields taken from the first three `%` lines of a chart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartMeta {
    /// First header line.
    pub title: String,
    /// Second header line.
    pub authors: String,
    /// Third header line.
    pub date: String,
}

/// A chart as read from disk.
#[derive(Debug, Clone)]
pub struct ChartDocument {
    /// Parsed header, empty if the chart has none.
    pub meta: ChartMeta,
    /// The complete file contents.
    pub text: String,
    /// The contents after the header.
    pub body: String,
    /// Stamp of the file taken from the handle it was read through.
    pub stamp: FileStamp,
}

impl Chart {
    /// A chart stored at `src` inside the chart tree rooted at `root`.
    pub fn new(src: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            root: root.into(),
        }
    }

    /// Path of the chart file.
    pub fn src(&self) -> &Path {
        &self.src
    }

    /// Root of the chart tree this chart belongs to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the chart file.
    pub fn dir(&self) -> &Path {
        self.src.parent().unwrap_or(Path::new(""))
    }

    /// The chart's site-relative address: its directory relative to the
    /// root, `/`-separated with a trailing `/`. The root chart's slug is
    /// empty.
    pub fn slug(&self) -> String {
        let Ok(rel) = self.dir().strip_prefix(&self.root) else {
            return String::new();
        };
        let mut slug = String::new();
        for part in rel.iter() {
            slug.push_str(&part.to_string_lossy());
            slug.push('/');
        }
        slug
    }

    /// Reads the chart file and splits off its header.
    pub fn read(&self) -> io::Result<ChartDocument> {
        let mut file = File::open(&self.src)?;
        let meta = file.metadata()?;
        let stamp = FileStamp::from_metadata(&meta)?;
        let mut text = String::with_capacity(meta.len() as usize);
        file.read_to_string(&mut text)?;

        let (meta, body) = split_header(&text);
        Ok(ChartDocument {
            meta,
            body: body.to_string(),
            text,
            stamp,
        })
    }
}

/// Splits a `%`-prefixed three-line header from the body.
///
/// The header is recognized only when the document has more than three
/// lines and each of the first three starts with `%`.
fn split_header(text: &str) -> (ChartMeta, &str) {
    let mut parts = text.splitn(4, '\n');
    let (Some(title), Some(authors), Some(date), Some(body)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return (ChartMeta::default(), text);
    };
    if ![title, authors, date].iter().all(|line| line.starts_with('%')) {
        return (ChartMeta::default(), text);
    }
    let field = |line: &str| line.trim_start_matches(['%', ' ']).to_string();
    let meta = ChartMeta {
        title: field(title),
        authors: field(authors),
        date: field(date),
    };
    (meta, body)
}

/// Locates the chart for a directory.
///
/// An error of kind [`io::ErrorKind::NotFound`] means the directory has no
/// chart; any other error is a real failure.
pub trait ContentResolver: Send + Sync {
    /// Finds the chart in `dir`, which lies inside the tree rooted at `root`.
    fn resolve(&self, dir: &Path, root: &Path) -> io::Result<Chart>;
}

/// Resolves a chart as the first existing regular file with one of the
/// configured index names.
#[derive(Debug, Clone)]
pub struct IndexResolver {
    index_names: Vec<String>,
}

impl IndexResolver {
    /// A resolver trying `index_names` in order.
    pub fn new(index_names: Vec<String>) -> Self {
        Self { index_names }
    }
}

impl Default for IndexResolver {
    fn default() -> Self {
        Self::new(vec!["index.txt".to_string(), "index.text".to_string()])
    }
}

impl ContentResolver for IndexResolver {
    fn resolve(&self, dir: &Path, root: &Path) -> io::Result<Chart> {
        for name in &self.index_names {
            let src = dir.join(name);
            match std::fs::metadata(&src) {
                Ok(meta) if meta.is_file() => return Ok(Chart::new(src, root)),
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no index file in {}", dir.display()),
        ))
    }
}
