//! Read-only probe of tabular data files.
//!
//! Reads just enough of a position or data file to populate column pickers
//! before anything is committed. Never touches the project document.

use log::{debug, error};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

#[derive(Debug)]
pub enum ProbeError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// File holds no non-blank line.
    Empty(PathBuf),
    /// Header line is not valid delimited text.
    Header {
        path: PathBuf,
        source: csv::Error,
    },
}

impl Display for ProbeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read `{}`: {source}", path.display()),
            Self::Empty(path) => write!(f, "`{}` has no header line", path.display()),
            Self::Header { path, source } => {
                write!(f, "unreadable header in `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ProbeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Header { source, .. } => Some(source),
            Self::Empty(_) => None,
        }
    }
}

/// Column separator detected from the header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Comma,
    Semicolon,
    Whitespace,
}

impl Delimiter {
    /// Picks the first separator present outside quotes, in order tab,
    /// comma, semicolon.
    pub fn detect(line: &str) -> Self {
        let mut quoted = false;
        let unquoted: String = line
            .chars()
            .filter(|c| {
                if *c == '"' {
                    quoted = !quoted;
                }
                !quoted
            })
            .collect();
        if unquoted.contains('\t') {
            Self::Tab
        } else if unquoted.contains(',') {
            Self::Comma
        } else if unquoted.contains(';') {
            Self::Semicolon
        } else {
            Self::Whitespace
        }
    }

    /// Splits one line into trimmed cells; quoted cells may hold the
    /// separator.
    pub fn split(self, line: &str) -> Result<Vec<String>, csv::Error> {
        let line = line.trim();
        let separator = match self {
            Self::Tab => b'\t',
            Self::Comma => b',',
            Self::Semicolon => b';',
            Self::Whitespace => return Ok(WHITESPACE_RE.split(line).map(clean_cell).collect()),
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(separator)
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(line.as_bytes());
        let mut record = csv::StringRecord::new();
        reader.read_record(&mut record)?;
        Ok(record.iter().map(clean_cell).collect())
    }
}

/// What a column picker needs to know about one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProbe {
    /// Total lines, header included.
    pub line_count: usize,
    pub delimiter: Delimiter,
    /// Header names, or `Column 1..n` when the first line is data.
    pub columns: Vec<String>,
}

impl FileProbe {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }
}

/// Counts lines and reads header columns of `path`.
pub fn probe_columns(path: impl AsRef<Path>) -> Result<FileProbe, ProbeError> {
    let path = path.as_ref();
    let started_at = Instant::now();
    let result = read_probe(path);
    match &result {
        Ok(probe) => debug!(
            "event=file_probe module=probe status=ok duration_ms={} path={} lines={} columns={}",
            started_at.elapsed().as_millis(),
            path.display(),
            probe.line_count,
            probe.columns.len()
        ),
        Err(err) => error!(
            "event=file_probe module=probe status=error duration_ms={} path={} error={}",
            started_at.elapsed().as_millis(),
            path.display(),
            err
        ),
    }
    result
}

fn read_probe(path: &Path) -> Result<FileProbe, ProbeError> {
    let io_error = |source| ProbeError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = BufReader::new(File::open(path).map_err(io_error)?);

    let mut line_count = 0;
    let mut header: Option<String> = None;
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let read = reader.read_until(b'\n', &mut buffer).map_err(io_error)?;
        if read == 0 {
            break;
        }
        line_count += 1;
        if header.is_none() {
            let line = String::from_utf8_lossy(&buffer);
            let line = line.trim_start_matches('\u{feff}');
            if !line.trim().is_empty() {
                header = Some(line.to_string());
            }
        }
    }

    let header = header.ok_or_else(|| ProbeError::Empty(path.to_path_buf()))?;
    let delimiter = Delimiter::detect(header.trim());
    let cells = delimiter
        .split(&header)
        .map_err(|source| ProbeError::Header {
            path: path.to_path_buf(),
            source,
        })?;
    let columns = if cells.iter().all(|cell| cell.parse::<f64>().is_ok()) {
        (1..=cells.len()).map(|n| format!("Column {n}")).collect()
    } else {
        cells
    };
    Ok(FileProbe {
        line_count,
        delimiter,
        columns,
    })
}

fn clean_cell(cell: &str) -> String {
    let cell = cell.trim();
    cell.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(cell)
        .to_string()
}
