//! Cleaning operations
//!
//! Named, ordered operations applied per column during the Clean stage:
//! null standardization, encoding repair, case normalization and type
//! coercion. Values arrive as JSON strings (everything is text after import)
//! and may leave as typed JSON values.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default spellings treated as null by [`CleaningOp::StandardizeNull`].
pub const DEFAULT_NULL_LITERALS: &[&str] = &[
    "", "null", "none", "nil", "n/a", "na", "#n/a", "-", "--", "?", "nan", "(null)",
];

static NON_DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9.\-]").unwrap());
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Context shared by all cleaning operations of one run.
#[derive(Debug, Clone)]
pub struct CleanContext {
    /// Lower-cased, trimmed spellings that mean "no value".
    pub null_literals: Vec<String>,
}

impl CleanContext {
    pub fn new<S: AsRef<str>>(null_literals: &[S]) -> Self {
        Self {
            null_literals: null_literals
                .iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    pub fn is_null_literal(&self, value: &str) -> bool {
        let normalized = value.trim().to_lowercase();
        normalized.is_empty() || self.null_literals.iter().any(|n| *n == normalized)
    }
}

impl Default for CleanContext {
    fn default() -> Self {
        Self::new(DEFAULT_NULL_LITERALS)
    }
}

/// All available cleaning operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CleaningOp {
    /// Replace null-literal spellings (and blank text) with JSON null
    StandardizeNull,

    /// Repair UTF-8 text that was mis-decoded as Windows-1252 ("Ã©" → "é")
    RepairEncoding,

    /// Remove leading and trailing whitespace
    Trim,

    /// Collapse internal whitespace runs to a single space
    CollapseWhitespace,

    /// Convert to uppercase
    Uppercase,

    /// Convert to lowercase
    Lowercase,

    /// Capitalize the first letter of every word
    TitleCase,

    /// Coerce to an integer (thousands separators tolerated)
    ToInteger,

    /// Coerce to a plain decimal string (currency symbols and separators removed)
    ToDecimal,

    /// Coerce to an ISO date (`YYYY-MM-DD`)
    ToDate {
        #[serde(default)]
        day_first: bool,
    },

    /// Coerce to a boolean
    ToBoolean,

    /// Remove all non-digit characters
    DigitsOnly,

    /// Pad string at start to reach target length
    PadStart {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: char,
    },

    /// Replace using regex pattern
    Replace {
        pattern: String,
        #[serde(default)]
        value: String,
    },
}

fn default_pad_char() -> char {
    '0'
}

const TRUE_VALUES: &[&str] = &["true", "t", "1", "yes", "y", "x", "active"];
const FALSE_VALUES: &[&str] = &["false", "f", "0", "no", "n", "inactive"];

impl CleaningOp {
    /// Operation name as used in logs and configuration snapshots.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StandardizeNull => "standardize_null",
            Self::RepairEncoding => "repair_encoding",
            Self::Trim => "trim",
            Self::CollapseWhitespace => "collapse_whitespace",
            Self::Uppercase => "uppercase",
            Self::Lowercase => "lowercase",
            Self::TitleCase => "title_case",
            Self::ToInteger => "to_integer",
            Self::ToDecimal => "to_decimal",
            Self::ToDate { .. } => "to_date",
            Self::ToBoolean => "to_boolean",
            Self::DigitsOnly => "digits_only",
            Self::PadStart { .. } => "pad_start",
            Self::Replace { .. } => "replace",
        }
    }

    /// Apply this operation to a value.
    ///
    /// Null passes through every operation unchanged. A coercion that cannot
    /// be performed returns `Err` with a message; the caller keeps the input
    /// value and records a row warning.
    pub fn apply(&self, value: &Value, ctx: &CleanContext) -> Result<Value, String> {
        let text = match value {
            Value::Null => return Ok(Value::Null),
            Value::String(s) => s.as_str(),
            // Already coerced by an earlier operation.
            other => return Ok(other.clone()),
        };

        match self {
            Self::StandardizeNull => Ok(if ctx.is_null_literal(text) {
                Value::Null
            } else {
                value.clone()
            }),
            Self::RepairEncoding => Ok(Value::String(repair_encoding(text))),
            Self::Trim => Ok(Value::String(text.trim().to_string())),
            Self::CollapseWhitespace => Ok(Value::String(
                WHITESPACE_RUN.replace_all(text.trim(), " ").to_string(),
            )),
            Self::Uppercase => Ok(Value::String(text.to_uppercase())),
            Self::Lowercase => Ok(Value::String(text.to_lowercase())),
            Self::TitleCase => Ok(Value::String(title_case(text))),
            Self::ToInteger => to_integer(text),
            Self::ToDecimal => to_decimal(text),
            Self::ToDate { day_first } => to_date(text, *day_first),
            Self::ToBoolean => to_boolean(text),
            Self::DigitsOnly => Ok(Value::String(
                text.chars().filter(|c| c.is_ascii_digit()).collect(),
            )),
            Self::PadStart { length, char } => {
                let len = text.chars().count();
                if len >= *length {
                    Ok(value.clone())
                } else {
                    let padding: String = std::iter::repeat(*char).take(length - len).collect();
                    Ok(Value::String(format!("{}{}", padding, text)))
                }
            }
            Self::Replace { pattern, value: replacement } => Regex::new(pattern)
                .map(|re| Value::String(re.replace_all(text, replacement.as_str()).to_string()))
                .map_err(|e| format!("invalid replace pattern: {}", e)),
        }
    }
}

/// Undo the classic UTF-8-read-as-Windows-1252 corruption.
///
/// Text is only rewritten when re-encoding succeeds losslessly and the bytes
/// form valid UTF-8; otherwise the input is returned with a leading BOM and
/// replacement characters removed.
pub fn repair_encoding(text: &str) -> String {
    let stripped: String = text
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| *c != '\u{fffd}')
        .collect();

    let looks_mojibake = stripped
        .chars()
        .any(|c| matches!(c, 'Ã' | 'Â' | 'â' | 'Ð' | 'Ñ' | 'à'));
    if !looks_mojibake {
        return stripped;
    }

    let (bytes, _, had_errors) = encoding_rs::WINDOWS_1252.encode(&stripped);
    if had_errors {
        return stripped;
    }
    match String::from_utf8(bytes.into_owned()) {
        Ok(repaired) => repaired,
        Err(_) => stripped,
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn to_integer(text: &str) -> Result<Value, String> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '_'))
        .collect();
    // "12.0" is a common spreadsheet artefact for integer columns.
    let cleaned = cleaned.strip_suffix(".0").unwrap_or(&cleaned);
    cleaned
        .parse::<i64>()
        .map(|n| Value::Number(n.into()))
        .map_err(|_| format!("'{}' is not an integer", text))
}

fn to_decimal(text: &str) -> Result<Value, String> {
    let trimmed = text.trim();
    let negative = trimmed.starts_with('-') || (trimmed.starts_with('(') && trimmed.ends_with(')'));
    let digits = NON_DECIMAL.replace_all(trimmed, "").replace('-', "");
    let normalized = if negative { format!("-{}", digits) } else { digits };
    if DECIMAL.is_match(&normalized) {
        Ok(Value::String(normalized))
    } else {
        Err(format!("'{}' is not a decimal number", text))
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%b-%Y", "%d %b %Y", "%b %d, %Y", "%Y%m%d"];
const MONTH_FIRST: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%m/%d/%y"];
const DAY_FIRST: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y"];

/// Parse a legacy date string in any supported format.
pub fn parse_date(text: &str, day_first: bool) -> Option<NaiveDate> {
    let trimmed = text.trim();
    // Drop a trailing time component ("2010-01-05 00:00:00").
    let date_part = trimmed
        .split_once(' ')
        .filter(|(d, t)| t.contains(':') && !d.is_empty())
        .map(|(d, _)| d)
        .unwrap_or(trimmed);

    let ambiguous = if day_first { DAY_FIRST } else { MONTH_FIRST };
    DATE_FORMATS
        .iter()
        .chain(ambiguous.iter())
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

fn to_date(text: &str, day_first: bool) -> Result<Value, String> {
    parse_date(text, day_first)
        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .ok_or_else(|| format!("'{}' is not a recognised date", text))
}

fn to_boolean(text: &str) -> Result<Value, String> {
    let lower = text.trim().to_lowercase();
    if TRUE_VALUES.contains(&lower.as_str()) {
        Ok(Value::Bool(true))
    } else if FALSE_VALUES.contains(&lower.as_str()) {
        Ok(Value::Bool(false))
    } else {
        Err(format!("'{}' is not a boolean", text))
    }
}
