//! Flat source file reader with encoding and delimiter auto-detection.
//!
//! Every field is kept as the exact text found in the file: no trimming, no
//! quote stripping beyond CSV framing, no type coercion. Interpretation is the
//! job of the Clean stage.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{SourceError, SourceResult};

/// One data row of a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// 1-based data row index (the header is not counted).
    pub number: usize,
    /// Raw values, one per header.
    pub values: Vec<String>,
}

/// A decoded source file.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub path: PathBuf,
    /// Detected encoding
    pub encoding: String,
    /// Detected delimiter
    pub delimiter: char,
    /// Column headers
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl SourceTable {
    /// File name used for the `_source_file` audit column.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes with the given encoding. Unknown encodings fall back to lossy
/// UTF-8. A leading byte-order mark is removed.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };
    match decoded.strip_prefix('\u{FEFF}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse decoded content into a [`SourceTable`].
pub fn parse_content(path: &Path, content: &str, encoding: String) -> SourceResult<SourceTable> {
    if content.trim().is_empty() {
        return Err(SourceError::EmptyFile(path.to_path_buf()));
    }
    let delimiter = detect_delimiter(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let csv_err = |source| SourceError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(SourceError::NoHeaders(path.to_path_buf()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        let values = (0..headers.len())
            .map(|i| record.get(i).unwrap_or("").to_string())
            .collect();
        rows.push(SourceRow {
            number: rows.len() + 1,
            values,
        });
    }

    Ok(SourceTable {
        path: path.to_path_buf(),
        encoding,
        delimiter,
        headers,
        rows,
    })
}

/// Read a source file with auto-detection of encoding and delimiter.
pub fn read_source(path: &Path) -> SourceResult<SourceTable> {
    let bytes = fs::read(path).map_err(|source| SourceError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(SourceError::EmptyFile(path.to_path_buf()));
    }

    let encoding = detect_encoding(&bytes);
    let content = decode_content(&bytes, &encoding);
    let table = parse_content(path, &content, encoding)?;

    debug!(
        file = %path.display(),
        encoding = %table.encoding,
        delimiter = ?table.delimiter,
        rows = table.rows.len(),
        "read source file"
    );
    Ok(table)
}

fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

/// Find the source file matching a `*`/`?` wildcard pattern.
///
/// Snapshot exports are date-stamped, so when several files match the
/// lexicographically greatest name (the latest snapshot) wins.
pub fn resolve_source_file(dir: &Path, pattern: &str) -> SourceResult<PathBuf> {
    let missing = || SourceError::Missing {
        dir: dir.to_path_buf(),
        pattern: pattern.to_string(),
    };
    let entries = fs::read_dir(dir).map_err(|_| missing())?;
    let matcher = wildcard_regex(pattern).map_err(|_| missing())?;

    let mut matches: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| matcher.is_match(n))
        })
        .collect();
    matches.sort();
    matches.pop().ok_or_else(missing)
}
