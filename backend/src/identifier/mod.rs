//! Composite-identifier parser.
//!
//! Decomposes one legacy class-offering code such as `2010T1E-582-A-A1A`
//! into term, program, time-of-day, level, section and (optionally) a
//! component or explicit course code.
//!
//! ```text
//!  2010T1E  -  582  -  A  -  A1A  [- Grammar]
//!  term        prog    tod   level+section   component / course
//! ```
//!
//! Parsing never fails: an identifier that cannot be fully understood comes
//! back with a best-effort partial result, a quality flag and warnings. The
//! accept/reject decision belongs to the Validate stage.

pub mod patterns;
pub mod programs;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use crate::models::Record;

pub use patterns::{resolve_part4, Part4Input, Part4Match, Part4Resolution, PatternKind, PART4_PATTERNS};

/// Section value used when part 4 cannot be resolved.
pub const UNKNOWN_SECTION: &str = "unknown";

/// Section assigned to level-only spellings (single-section offerings).
pub const DEFAULT_SECTION: &str = "A";

/// How much of the identifier was understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseQuality {
    Complete,
    Warning,
    Error,
}

impl ParseQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Structured decomposition of one composite identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIdentifier {
    pub raw: String,
    pub term_code: String,
    pub program_code: String,
    pub program_name: String,
    pub program_known: bool,
    /// Multi-component offering that needs a session record.
    pub is_language: bool,
    pub time_of_day: String,
    pub level: String,
    pub section: String,
    pub component: Option<String>,
    pub course_code: Option<String>,
    pub standardized_code: String,
    pub pattern: Option<PatternKind>,
    pub quality: ParseQuality,
    pub remainder: Option<String>,
    pub warnings: Vec<String>,
}

impl ParsedIdentifier {
    fn empty(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            term_code: String::new(),
            program_code: String::new(),
            program_name: String::new(),
            program_known: false,
            is_language: false,
            time_of_day: String::new(),
            level: String::new(),
            section: UNKNOWN_SECTION.to_string(),
            component: None,
            course_code: None,
            standardized_code: String::new(),
            pattern: None,
            quality: ParseQuality::Error,
            remainder: None,
            warnings: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.quality == ParseQuality::Error
    }

    /// Attach every derived field to a cleaned record.
    pub fn write_to(&self, record: &mut Record) {
        let text = |s: &str| Value::String(s.to_string());
        let optional = |s: &Option<String>| s.as_deref().map(text).unwrap_or(Value::Null);

        record.insert(fields::TERM.into(), text(&self.term_code));
        record.insert(fields::PROGRAM_CODE.into(), text(&self.program_code));
        record.insert(fields::PROGRAM.into(), text(&self.program_name));
        record.insert(fields::PROGRAM_KNOWN.into(), Value::Bool(self.program_known));
        record.insert(fields::IS_LANGUAGE.into(), Value::Bool(self.is_language));
        record.insert(fields::TIME_OF_DAY.into(), text(&self.time_of_day));
        record.insert(fields::LEVEL.into(), text(&self.level));
        record.insert(fields::SECTION.into(), text(&self.section));
        record.insert(fields::COMPONENT.into(), optional(&self.component));
        record.insert(fields::COURSE_CODE.into(), optional(&self.course_code));
        record.insert(fields::STANDARDIZED_CODE.into(), text(&self.standardized_code));
        record.insert(
            fields::PATTERN.into(),
            self.pattern.map(|p| text(p.as_str())).unwrap_or(Value::Null),
        );
        record.insert(fields::QUALITY.into(), text(self.quality.as_str()));
        record.insert(fields::REMAINDER.into(), optional(&self.remainder));
        record.insert(
            fields::WARNINGS.into(),
            if self.warnings.is_empty() {
                Value::Null
            } else {
                Value::String(self.warnings.join("; "))
            },
        );
    }
}

/// Column names of the derived identifier fields in cleaned tables.
pub mod fields {
    pub const TERM: &str = "class_term";
    pub const PROGRAM_CODE: &str = "program_code";
    pub const PROGRAM: &str = "program";
    pub const PROGRAM_KNOWN: &str = "program_known";
    pub const IS_LANGUAGE: &str = "is_language";
    pub const TIME_OF_DAY: &str = "time_of_day";
    pub const LEVEL: &str = "level";
    pub const SECTION: &str = "section";
    pub const COMPONENT: &str = "component";
    pub const COURSE_CODE: &str = "course_code";
    pub const STANDARDIZED_CODE: &str = "standardized_code";
    pub const PATTERN: &str = "parse_pattern";
    pub const QUALITY: &str = "parse_quality";
    pub const REMAINDER: &str = "parse_remainder";
    pub const WARNINGS: &str = "parse_warnings";

    /// All derived columns, in output order.
    pub const ALL: [&str; 15] = [
        TERM,
        PROGRAM_CODE,
        PROGRAM,
        PROGRAM_KNOWN,
        IS_LANGUAGE,
        TIME_OF_DAY,
        LEVEL,
        SECTION,
        COMPONENT,
        COURSE_CODE,
        STANDARDIZED_CODE,
        PATTERN,
        QUALITY,
        REMAINDER,
        WARNINGS,
    ];
}

// =============================================================================
// Course catalog
// =============================================================================

/// Existence check against the destination course catalog.
pub trait CourseCatalog {
    fn contains(&self, code: &str) -> bool;
}

/// Skips the existence check.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCatalog;

impl CourseCatalog for NoCatalog {
    fn contains(&self, _code: &str) -> bool {
        true
    }
}

/// A fixed set of known course codes (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    codes: HashSet<String>,
}

impl StaticCatalog {
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(|c| c.as_ref().trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Load one code per line; blank lines and `#` comments are ignored.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_codes(
            content.lines().filter(|l| !l.trim_start().starts_with('#')),
        ))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl CourseCatalog for StaticCatalog {
    fn contains(&self, code: &str) -> bool {
        self.codes.contains(&code.trim().to_uppercase())
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Split the text after part 3 into (part 4, part 5, remainder).
///
/// Part 4 may itself contain dashes (`M-BEGINNER`, `BEGINNER-B`), so the
/// whole tail is tried first, then each dash position from the right; the
/// longest prefix that a pattern rule accepts is part 4. Trying short prefixes
/// first would let a bare level name take the section letter as a component.
fn split_tail(tail: &str, tod: &str, max_level: u32) -> (String, Option<String>, Option<String>) {
    let resolves = |text: &str| {
        matches!(
            resolve_part4(&Part4Input {
                text,
                time_of_day: tod,
                max_level
            }),
            Part4Resolution::Matched { .. }
        )
    };

    if resolves(tail) {
        return (tail.to_string(), None, None);
    }
    let dashes: Vec<usize> = tail.match_indices('-').map(|(i, _)| i).collect();
    let split_at = dashes
        .iter()
        .rev()
        .copied()
        .find(|&i| resolves(&tail[..i]))
        .or_else(|| dashes.first().copied());

    match split_at {
        None => (tail.to_string(), None, None),
        Some(i) => {
            let part4 = tail[..i].to_string();
            let rest = &tail[i + 1..];
            match rest.split_once('-') {
                Some((part5, remainder)) => (
                    part4,
                    Some(part5.to_string()),
                    Some(remainder.to_string()),
                ),
                None => (part4, Some(rest.to_string()), None),
            }
        }
    }
}

/// Parse one composite identifier. Pure: the same input and catalog always
/// produce the same output.
pub fn parse_identifier(raw: &str, catalog: &dyn CourseCatalog) -> ParsedIdentifier {
    let mut parsed = ParsedIdentifier::empty(raw);
    let text = raw.trim().to_uppercase();

    let mut head = text.splitn(4, '-');
    let term = head.next().unwrap_or("").trim();
    let program = head.next().map(str::trim);
    let tod = head.next().map(str::trim);
    let tail = head.next().map(str::trim);

    parsed.term_code = term.to_string();
    if let Some(code) = program {
        let (name, known) = programs::program_name(code);
        parsed.program_code = code.to_string();
        parsed.program_name = name;
        parsed.program_known = known;
        parsed.is_language = programs::is_language_program(&parsed.program_name);
    }
    parsed.time_of_day = tod.unwrap_or("").to_string();

    let tail = match tail {
        Some(t) if !term.is_empty() && !t.is_empty() => t,
        _ => {
            parsed.warnings.push(format!(
                "expected 4-5 dash-separated parts, found {}",
                text.split('-').filter(|p| !p.trim().is_empty()).count()
            ));
            parsed.level = text.rsplit('-').next().unwrap_or("").to_string();
            parsed.standardized_code = parsed.program_name.clone();
            return parsed;
        }
    };

    if !parsed.program_known {
        parsed.warnings.push(format!(
            "unknown program code '{}', kept as-is",
            parsed.program_code
        ));
    }

    let max_level = programs::max_level(&parsed.program_name);
    let (part4, part5, remainder) = split_tail(tail, &parsed.time_of_day, max_level);

    let resolution = resolve_part4(&Part4Input {
        text: &part4,
        time_of_day: &parsed.time_of_day,
        max_level,
    });

    let mut time_hint = None;
    match resolution {
        Part4Resolution::Matched { pattern, value } => {
            parsed.pattern = Some(pattern);
            match value {
                Part4Match::Course {
                    course_code,
                    level,
                    section,
                } => {
                    parsed.course_code = Some(course_code);
                    parsed.level = programs::format_level(level);
                    parsed.section = section.to_string();
                }
                Part4Match::LevelSection {
                    level,
                    section,
                    time_hint: hint,
                } => {
                    parsed.level = programs::format_level(level);
                    parsed.section = section.to_string();
                    time_hint = hint;
                }
                Part4Match::Level { level, time_hint: hint } => {
                    parsed.level = programs::format_level(level);
                    parsed.section = DEFAULT_SECTION.to_string();
                    time_hint = hint;
                }
            }
        }
        Part4Resolution::Unmatched { raw } => {
            parsed.warnings.push(format!(
                "level/section '{}' matches no known pattern",
                raw
            ));
            parsed.level = raw;
            parsed.section = UNKNOWN_SECTION.to_string();
        }
    }

    if let Some(hint) = time_hint {
        if !parsed.time_of_day.starts_with(hint) {
            parsed.warnings.push(format!(
                "time prefix '{}' disagrees with time-of-day '{}'",
                hint, parsed.time_of_day
            ));
        }
    }

    if let Some(part5) = part5.filter(|p| !p.is_empty()) {
        if parsed.is_language {
            parsed.component = Some(part5);
        } else {
            if let Some(existing) = &parsed.course_code {
                if *existing != part5 {
                    parsed.warnings.push(format!(
                        "explicit course '{}' overrides '{}' from level part",
                        part5, existing
                    ));
                }
            }
            parsed.course_code = Some(part5);
        }
    }

    if let Some(extra) = remainder.filter(|r| !r.is_empty()) {
        parsed
            .warnings
            .push(format!("unparsed trailing text '{}'", extra));
        parsed.remainder = Some(extra);
    }

    parsed.standardized_code = match (&parsed.course_code, parsed.is_language) {
        (Some(course), false) => course.clone(),
        _ => format!("{}-{}", parsed.program_name, parsed.level),
    };

    if !catalog.contains(&parsed.standardized_code) {
        parsed.warnings.push(format!(
            "course '{}' not found in catalog",
            parsed.standardized_code
        ));
    }

    parsed.quality = if parsed.warnings.is_empty() {
        ParseQuality::Complete
    } else {
        ParseQuality::Warning
    };
    parsed
}
