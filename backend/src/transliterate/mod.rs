//! Legacy visual-order Khmer to Unicode transliteration.
//!
//! Legacy fonts store glyphs in the order they are typed, which is the order
//! they are drawn, not the logical reading order Unicode requires. Each line
//! is converted in three steps:
//!
//! 1. strip non-printable characters;
//! 2. four adjacent-pair reordering passes (order matters, each pass relies
//!    on the previous ones);
//! 3. substitute glyphs through the primary, then the supplementary map.
//!
//! Text that already contains Khmer code points, or that contains no legacy
//! glyph at all, is returned unchanged.

pub mod glyphs;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use glyphs::GlyphRole;

/// Traceability context for one conversion. The engine itself is stateless.
#[derive(Debug, Clone, Serialize)]
pub struct TransliterationContext<'a> {
    pub table: &'a str,
    pub source_column: &'a str,
    pub target_column: &'a str,
    pub row: usize,
    pub run_id: Uuid,
}

/// Khmer and Khmer Symbols blocks.
pub fn contains_target_script(text: &str) -> bool {
    text.chars()
        .any(|c| matches!(c, '\u{1780}'..='\u{17FF}' | '\u{19E0}'..='\u{19FF}'))
}

/// Whether any character is a known legacy glyph key.
pub fn contains_legacy_glyphs(text: &str) -> bool {
    text.chars().any(glyphs::is_legacy_key)
}

/// Whether any legacy glyph key lies outside ASCII. Plain Latin text never
/// has one, so this tells a legacy-font value from an English note.
pub fn contains_non_ascii_legacy_glyphs(text: &str) -> bool {
    text.chars().any(|c| !c.is_ascii() && glyphs::is_legacy_key(c))
}

/// Whether [`transliterate`] would change `text`.
pub fn needs_conversion(text: &str) -> bool {
    !text.is_empty() && !contains_target_script(text) && contains_legacy_glyphs(text)
}

fn is_printable(c: char) -> bool {
    !c.is_control() && !matches!(c, '\u{200B}'..='\u{200F}' | '\u{FEFF}' | '\u{00AD}')
}

/// One left-to-right scan swapping adjacent pairs that satisfy `swap`.
/// After a swap the scan resumes past the swapped pair.
fn reorder_pass(chars: &mut [char], swap: impl Fn(GlyphRole, GlyphRole) -> bool) {
    let mut i = 0;
    while i + 1 < chars.len() {
        if swap(glyphs::role(chars[i]), glyphs::role(chars[i + 1])) {
            chars.swap(i, i + 1);
            i += 2;
        } else {
            i += 1;
        }
    }
}

/// Apply the four reordering passes in their fixed order.
pub fn reorder(chars: &mut [char]) {
    use GlyphRole::*;

    // (a) subscript-RO marker typed before its base consonant
    reorder_pass(chars, |a, b| a == CoengMarker && b == Base);
    // (b) pre-vowel typed before its base consonant
    reorder_pass(chars, |a, b| a == PreVowel && b == Base);
    // (c) subscripts and shifters belong before the vowel / RO marker
    reorder_pass(chars, |a, b| {
        matches!(a, PreVowel | CoengMarker) && matches!(b, Subscript | Shifter)
    });
    // (d) subscript-RO precedes the vowel
    reorder_pass(chars, |a, b| a == PreVowel && b == CoengMarker);
}

fn substitute(chars: impl Iterator<Item = char>, map: fn(char) -> Option<&'static str>) -> String {
    let mut out = String::new();
    for c in chars {
        match map(c) {
            Some(mapped) => out.push_str(mapped),
            None => out.push(c),
        }
    }
    out
}

fn convert_line(line: &str) -> String {
    let mut chars: Vec<char> = line.chars().filter(|c| is_printable(*c)).collect();
    reorder(&mut chars);
    let primary = substitute(chars.into_iter(), glyphs::primary);
    substitute(primary.chars(), glyphs::supplementary)
}

/// Convert legacy-encoded text to Unicode Khmer.
///
/// Always returns a value; empty, already-converted and non-legacy input is
/// returned unchanged.
pub fn transliterate(text: &str) -> String {
    if !needs_conversion(text) {
        return text.to_string();
    }
    text.split('\n')
        .map(|line| {
            let (body, cr) = match line.strip_suffix('\r') {
                Some(body) => (body, "\r"),
                None => (line, ""),
            };
            format!("{}{}", convert_line(body), cr)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// [`transliterate`] with a traceability context attached to the log.
pub fn transliterate_with(text: &str, ctx: &TransliterationContext<'_>) -> String {
    let converted = transliterate(text);
    if converted != text {
        debug!(
            table = ctx.table,
            source = ctx.source_column,
            target = ctx.target_column,
            row = ctx.row,
            run_id = %ctx.run_id,
            "transliterated legacy text"
        );
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_consonant_vowel() {
        // ka + aa
        assert_eq!(transliterate("ka"), "\u{1780}\u{17B6}");
    }

    #[test]
    fn test_pre_vowel_moves_after_consonant() {
        // Typed: e + ka  →  ka + e
        assert_eq!(transliterate("ek"), "\u{1780}\u{17C1}");
    }

    #[test]
    fn test_coeng_ro_moves_after_consonant() {
        // Typed: RO-marker + ka  →  ka + coeng + ro
        assert_eq!(transliterate("®k"), "\u{1780}\u{17D2}\u{179A}");
    }

    #[test]
    fn test_pre_vowel_with_coeng_ro() {
        // Typed: e + RO-marker + ka  →  ka + coeng + ro + e
        assert_eq!(transliterate("e®k"), "\u{1780}\u{17D2}\u{179A}\u{17C1}");
    }

    #[test]
    fn test_pre_vowel_with_subscript() {
        // Typed: e + sa + subscript-ta  →  sa + coeng + ta + e
        assert_eq!(transliterate("esÍ"), "\u{179F}\u{17D2}\u{178F}\u{17C1}");
    }

    #[test]
    fn test_shifter_before_vowel() {
        // Typed: e + ba + shifter  →  ba + shifter + e
        assert_eq!(transliterate("ebÊ"), "\u{1794}\u{17C9}\u{17C1}");
    }

    #[test]
    fn test_two_consonants_keep_order() {
        // Typed: RO-marker + ka + ta  →  ka + coeng + ro + ta
        assert_eq!(transliterate("®kt"), "\u{1780}\u{17D2}\u{179A}\u{178F}");
    }

    #[test]
    fn test_multi_codepoint_token_and_supplementary() {
        assert_eq!(transliterate("Þ"), "\u{17B2}\u{17D2}\u{1799}");
        assert_eq!(transliterate("ÿ"), "\u{17DB}");
    }

    #[test]
    fn test_lines_are_converted_independently() {
        assert_eq!(transliterate("ek\nka"), "\u{1780}\u{17C1}\n\u{1780}\u{17B6}");
    }

    #[test]
    fn test_non_printables_are_stripped() {
        assert_eq!(transliterate("k\u{0007}a"), "\u{1780}\u{17B6}");
    }

    #[test]
    fn test_guard_already_unicode() {
        let unicode = "\u{1780}\u{17B6} ka";
        assert_eq!(transliterate(unicode), unicode);
    }

    #[test]
    fn test_guard_no_legacy_glyphs() {
        assert_eq!(transliterate("   "), "   ");
        assert_eq!(transliterate("@#&"), "@#&");
        assert_eq!(transliterate(""), "");
    }

    #[test]
    fn test_idempotent_under_guard() {
        let once = transliterate("e®kÞ");
        let twice = transliterate(&once);
        assert_eq!(once, twice);
    }
}
