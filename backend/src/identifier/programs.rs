//! Program and level reference tables.
//!
//! The legacy export encodes programs as numeric codes. Whether an offering
//! is a multi-component language class or a single-component academic course
//! is a property of the resolved program *name*, never the raw code.

/// Section letters a class offering may carry.
pub const SECTION_LETTERS: &[char] = &['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];

/// Level ceiling used when a program has no declared maximum.
pub const DEFAULT_MAX_LEVEL: u32 = 12;

/// One known program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Program {
    pub code: &'static str,
    pub name: &'static str,
    pub language: bool,
    pub max_level: u32,
}

/// Legacy program code → program. Codes are matched exactly after trimming.
pub const PROGRAMS: &[Program] = &[
    Program { code: "582", name: "IEAP", language: true, max_level: 4 },
    Program { code: "583", name: "GESL", language: true, max_level: 12 },
    Program { code: "584", name: "EHSS", language: true, max_level: 12 },
    Program { code: "585", name: "EXPRESS", language: true, max_level: 6 },
    Program { code: "586", name: "WKEND", language: true, max_level: 8 },
    Program { code: "587", name: "ELT", language: true, max_level: 6 },
    Program { code: "600", name: "BA", language: false, max_level: 4 },
    Program { code: "610", name: "MBA", language: false, max_level: 2 },
    Program { code: "620", name: "MED", language: false, max_level: 2 },
    Program { code: "630", name: "FOUNDATION", language: false, max_level: 2 },
];

/// Resolve a legacy program code to its name. Unknown codes pass through
/// unchanged; that is a soft failure, not an error.
pub fn program_name(code: &str) -> (String, bool) {
    let code = code.trim();
    match PROGRAMS.iter().find(|p| p.code == code) {
        Some(p) => (p.name.to_string(), true),
        None => (code.to_uppercase(), false),
    }
}

/// Look a program up by its resolved name.
pub fn by_name(name: &str) -> Option<&'static Program> {
    PROGRAMS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Multi-component (session-bearing) programs are decided by name.
pub fn is_language_program(name: &str) -> bool {
    by_name(name).is_some_and(|p| p.language)
}

/// Highest valid level for a program name.
pub fn max_level(name: &str) -> u32 {
    by_name(name).map(|p| p.max_level).unwrap_or(DEFAULT_MAX_LEVEL)
}

/// Named levels, keyed by their upper-case spelling with separators removed.
const LEVEL_NAMES: &[(&str, u32)] = &[
    ("BEGINNER", 1),
    ("BEG", 1),
    ("ELEMENTARY", 2),
    ("ELEM", 2),
    ("PREINTERMEDIATE", 3),
    ("PREINT", 3),
    ("INTERMEDIATE", 4),
    ("INT", 4),
    ("UPPERINTERMEDIATE", 5),
    ("UPPERINT", 5),
    ("ADVANCED", 6),
    ("ADV", 6),
];

/// Resolve a level name ("Pre-Intermediate", "UPPER INT") to its number.
pub fn level_from_name(name: &str) -> Option<u32> {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    LEVEL_NAMES
        .iter()
        .find(|(n, _)| *n == key)
        .map(|(_, level)| *level)
}

/// Two-digit, zero-padded level text.
pub fn format_level(level: u32) -> String {
    format!("{:02}", level)
}

pub fn is_section_letter(c: char) -> bool {
    SECTION_LETTERS.contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_lookup() {
        assert_eq!(program_name("582"), ("IEAP".to_string(), true));
        assert_eq!(program_name(" 600 "), ("BA".to_string(), true));
        assert_eq!(program_name("999"), ("999".to_string(), false));
    }

    #[test]
    fn test_language_decided_by_name() {
        assert!(is_language_program("IEAP"));
        assert!(is_language_program("gesl"));
        assert!(!is_language_program("BA"));
        assert!(!is_language_program("582"));
    }

    #[test]
    fn test_level_names() {
        assert_eq!(level_from_name("Beginner"), Some(1));
        assert_eq!(level_from_name("PRE-INTERMEDIATE"), Some(3));
        assert_eq!(level_from_name("upper int"), Some(5));
        assert_eq!(level_from_name("Expert"), None);
        assert_eq!(format_level(3), "03");
        assert_eq!(max_level("IEAP"), 4);
        assert_eq!(max_level("UNKNOWN"), DEFAULT_MAX_LEVEL);
    }
}
