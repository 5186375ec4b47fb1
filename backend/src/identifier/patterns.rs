//! Ordered pattern rules for the ambiguous fourth identifier part.
//!
//! The fourth part of a composite identifier packs level and section in a
//! dozen historical spellings, several of which overlap. The rules below are
//! evaluated top to bottom and the first rule whose matcher accepts the text
//! *and* whose builder produces a result wins. Reordering them changes the
//! result for ambiguous inputs (e.g. `BEGINNER-A` is a time confirmation when
//! the time-of-day is `A`, and a section otherwise).

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::programs::{is_section_letter, level_from_name};

/// Explicit inputs for resolving part 4. No hidden state.
#[derive(Debug, Clone, Copy)]
pub struct Part4Input<'a> {
    /// Upper-cased, trimmed part-4 text.
    pub text: &'a str,
    /// Upper-cased time-of-day code from part 3.
    pub time_of_day: &'a str,
    /// Highest valid level for the resolved program.
    pub max_level: u32,
}

/// Which rule produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    ExplicitCourse,
    TimeLevelSection,
    TimeDashLevelName,
    SlashDelimited,
    BareLevelSection,
    LevelNameTimeConfirmed,
    LevelNameSection,
    BareLevelName,
}

impl PatternKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExplicitCourse => "explicit_course",
            Self::TimeLevelSection => "time_level_section",
            Self::TimeDashLevelName => "time_dash_level_name",
            Self::SlashDelimited => "slash_delimited",
            Self::BareLevelSection => "bare_level_section",
            Self::LevelNameTimeConfirmed => "level_name_time_confirmed",
            Self::LevelNameSection => "level_name_section",
            Self::BareLevelName => "bare_level_name",
        }
    }
}

/// Tagged result of resolving part 4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part4Match {
    /// A course code with its own level digit and a section letter.
    Course {
        course_code: String,
        level: u32,
        section: char,
    },
    /// Level and section; `time_hint` is a time-of-day letter embedded in the text.
    LevelSection {
        level: u32,
        section: char,
        time_hint: Option<char>,
    },
    /// Level only (single-section offering).
    Level { level: u32, time_hint: Option<char> },
}

/// Outcome of evaluating the ordered rule list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part4Resolution {
    Matched { pattern: PatternKind, value: Part4Match },
    Unmatched { raw: String },
}

type Builder = fn(&Captures<'_>, &Part4Input<'_>) -> Option<Part4Match>;

/// One rule: a matcher (regex) paired with a builder that may still reject.
pub struct Part4Pattern {
    pub kind: PatternKind,
    matcher: &'static Lazy<Regex>,
    build: Builder,
}

impl Part4Pattern {
    fn apply(&self, input: &Part4Input<'_>) -> Option<Part4Match> {
        let caps = self.matcher.captures(input.text)?;
        (self.build)(&caps, input)
    }
}

static EXPLICIT_COURSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]{2,5})-?([1-9])(\d{2})([A-Z])$").unwrap());
static TIME_LEVEL_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z])(\d{1,2})([A-Z])$").unwrap());
static TIME_DASH_LEVEL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z])-([A-Z][A-Z ]*[A-Z])$").unwrap());
static SLASH_DELIMITED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z])/(\d{1,2})/([A-Z])$").unwrap());
static BARE_LEVEL_SECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2})([A-Z])$").unwrap());
static LEVEL_NAME_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Z -]*[A-Z])-([A-Z])$").unwrap());
static LEVEL_NAME_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Z -]*[A-Z])[ /_-]([A-Z])$").unwrap());
static BARE_LEVEL_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z][A-Z -]*[A-Z])$").unwrap());

fn letter(caps: &Captures<'_>, i: usize) -> Option<char> {
    caps.get(i)?.as_str().chars().next()
}

fn bounded_level(caps: &Captures<'_>, i: usize, input: &Part4Input<'_>) -> Option<u32> {
    let level: u32 = caps.get(i)?.as_str().parse().ok()?;
    (1..=input.max_level).contains(&level).then_some(level)
}

fn section(caps: &Captures<'_>, i: usize) -> Option<char> {
    letter(caps, i).filter(|c| is_section_letter(*c))
}

fn build_explicit_course(caps: &Captures<'_>, _input: &Part4Input<'_>) -> Option<Part4Match> {
    let subject = caps.get(1)?.as_str();
    let level: u32 = caps.get(2)?.as_str().parse().ok()?;
    let number = caps.get(3)?.as_str();
    Some(Part4Match::Course {
        course_code: format!("{}-{}{}", subject, level, number),
        level,
        section: section(caps, 4)?,
    })
}

fn build_time_level_section(caps: &Captures<'_>, input: &Part4Input<'_>) -> Option<Part4Match> {
    Some(Part4Match::LevelSection {
        level: bounded_level(caps, 2, input)?,
        section: section(caps, 3)?,
        time_hint: letter(caps, 1),
    })
}

fn build_time_dash_level_name(caps: &Captures<'_>, _input: &Part4Input<'_>) -> Option<Part4Match> {
    Some(Part4Match::Level {
        level: level_from_name(caps.get(2)?.as_str())?,
        time_hint: letter(caps, 1),
    })
}

fn build_slash_delimited(caps: &Captures<'_>, input: &Part4Input<'_>) -> Option<Part4Match> {
    Some(Part4Match::LevelSection {
        level: bounded_level(caps, 2, input)?,
        section: section(caps, 3)?,
        time_hint: letter(caps, 1),
    })
}

fn build_bare_level_section(caps: &Captures<'_>, input: &Part4Input<'_>) -> Option<Part4Match> {
    Some(Part4Match::LevelSection {
        level: bounded_level(caps, 1, input)?,
        section: section(caps, 2)?,
        time_hint: None,
    })
}

fn build_level_name_time(caps: &Captures<'_>, input: &Part4Input<'_>) -> Option<Part4Match> {
    // Only a redundant confirmation of part 3; otherwise the trailing letter
    // is a section and a later rule handles it.
    let hint = letter(caps, 2)?;
    if !input.time_of_day.starts_with(hint) || input.time_of_day.len() != 1 {
        return None;
    }
    Some(Part4Match::Level {
        level: level_from_name(caps.get(1)?.as_str())?,
        time_hint: Some(hint),
    })
}

fn build_level_name_section(caps: &Captures<'_>, _input: &Part4Input<'_>) -> Option<Part4Match> {
    Some(Part4Match::LevelSection {
        level: level_from_name(caps.get(1)?.as_str())?,
        section: section(caps, 2)?,
        time_hint: None,
    })
}

fn build_bare_level_name(caps: &Captures<'_>, _input: &Part4Input<'_>) -> Option<Part4Match> {
    Some(Part4Match::Level {
        level: level_from_name(caps.get(1)?.as_str())?,
        time_hint: None,
    })
}

/// The rule list, in evaluation order.
pub static PART4_PATTERNS: [Part4Pattern; 8] = [
    Part4Pattern {
        kind: PatternKind::ExplicitCourse,
        matcher: &EXPLICIT_COURSE,
        build: build_explicit_course,
    },
    Part4Pattern {
        kind: PatternKind::TimeLevelSection,
        matcher: &TIME_LEVEL_SECTION,
        build: build_time_level_section,
    },
    Part4Pattern {
        kind: PatternKind::TimeDashLevelName,
        matcher: &TIME_DASH_LEVEL_NAME,
        build: build_time_dash_level_name,
    },
    Part4Pattern {
        kind: PatternKind::SlashDelimited,
        matcher: &SLASH_DELIMITED,
        build: build_slash_delimited,
    },
    Part4Pattern {
        kind: PatternKind::BareLevelSection,
        matcher: &BARE_LEVEL_SECTION,
        build: build_bare_level_section,
    },
    Part4Pattern {
        kind: PatternKind::LevelNameTimeConfirmed,
        matcher: &LEVEL_NAME_TIME,
        build: build_level_name_time,
    },
    Part4Pattern {
        kind: PatternKind::LevelNameSection,
        matcher: &LEVEL_NAME_SECTION,
        build: build_level_name_section,
    },
    Part4Pattern {
        kind: PatternKind::BareLevelName,
        matcher: &BARE_LEVEL_NAME,
        build: build_bare_level_name,
    },
];

/// Evaluate the rules in order; first match wins.
pub fn resolve_part4(input: &Part4Input<'_>) -> Part4Resolution {
    PART4_PATTERNS
        .iter()
        .find_map(|pattern| {
            pattern.apply(input).map(|value| Part4Resolution::Matched {
                pattern: pattern.kind,
                value,
            })
        })
        .unwrap_or_else(|| Part4Resolution::Unmatched {
            raw: input.text.to_string(),
        })
}
