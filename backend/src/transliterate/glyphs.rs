//! Legacy Khmer font glyph tables.
//!
//! The legacy fonts reuse ASCII and Latin-1 code points for Khmer glyphs.
//! Text is stored in keystroke order: a pre-vowel or the subscript-RO glyph is
//! typed *before* the consonant it attaches to, because that is where it is
//! drawn.

/// Role of a legacy glyph for the reordering passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphRole {
    /// A base consonant.
    Base,
    /// A vowel drawn (at least partly) to the left of its consonant.
    PreVowel,
    /// The subscript-RO marker, also drawn to the left.
    CoengMarker,
    /// A subscript consonant drawn below its base.
    Subscript,
    /// A register shifter diacritic.
    Shifter,
    Other,
}

/// Base consonants.
pub const BASE_CONSONANTS: &[(char, &str)] = &[
    ('k', "\u{1780}"),
    ('x', "\u{1781}"),
    ('K', "\u{1782}"),
    ('X', "\u{1783}"),
    ('g', "\u{1784}"),
    ('c', "\u{1785}"),
    ('q', "\u{1786}"),
    ('C', "\u{1787}"),
    ('Q', "\u{1788}"),
    ('j', "\u{1789}"),
    ('d', "\u{178A}"),
    ('z', "\u{178B}"),
    ('D', "\u{178C}"),
    ('Z', "\u{178D}"),
    ('N', "\u{178E}"),
    ('t', "\u{178F}"),
    ('f', "\u{1790}"),
    ('T', "\u{1791}"),
    ('F', "\u{1792}"),
    ('n', "\u{1793}"),
    ('b', "\u{1794}"),
    ('p', "\u{1795}"),
    ('B', "\u{1796}"),
    ('P', "\u{1797}"),
    ('m', "\u{1798}"),
    ('y', "\u{1799}"),
    ('r', "\u{179A}"),
    ('l', "\u{179B}"),
    ('v', "\u{179C}"),
    ('s', "\u{179F}"),
    ('h', "\u{17A0}"),
    ('L', "\u{17A1}"),
    ('G', "\u{17A2}"),
];

/// Vowels typed before their consonant.
pub const PRE_VOWELS: &[(char, &str)] = &[
    ('e', "\u{17C1}"),
    ('E', "\u{17C2}"),
    ('é', "\u{17C3}"),
    ('o', "\u{17C4}"),
    ('O', "\u{17C5}"),
];

/// The subscript-RO glyph.
pub const COENG_MARKERS: &[(char, &str)] = &[('®', "\u{17D2}\u{179A}")];

/// Subscript consonant glyphs, each a coeng sign plus a consonant.
pub const SUBSCRIPTS: &[(char, &str)] = &[
    ('À', "\u{17D2}\u{1780}"),
    ('Á', "\u{17D2}\u{1781}"),
    ('Â', "\u{17D2}\u{1782}"),
    ('Ã', "\u{17D2}\u{1784}"),
    ('Ä', "\u{17D2}\u{1785}"),
    ('Å', "\u{17D2}\u{1787}"),
    ('Æ', "\u{17D2}\u{1789}"),
    ('Ì', "\u{17D2}\u{178A}"),
    ('Í', "\u{17D2}\u{178F}"),
    ('Î', "\u{17D2}\u{1790}"),
    ('Ï', "\u{17D2}\u{1791}"),
    ('Ð', "\u{17D2}\u{1793}"),
    ('Ñ', "\u{17D2}\u{1794}"),
    ('Ò', "\u{17D2}\u{1796}"),
    ('Ó', "\u{17D2}\u{1798}"),
    ('Ô', "\u{17D2}\u{1799}"),
    ('Õ', "\u{17D2}\u{179B}"),
    ('Ö', "\u{17D2}\u{179C}"),
    ('Ø', "\u{17D2}\u{179F}"),
    ('Ù', "\u{17D2}\u{17A0}"),
    ('Ú', "\u{17D2}\u{17A2}"),
];

/// Register shifters.
pub const SHIFTERS: &[(char, &str)] = &[('Ê', "\u{17C9}"), ('Ë', "\u{17CA}")];

/// Remaining entries of the primary map: post vowels, signs, digits,
/// punctuation and the one multi-codepoint ligature.
pub const PRIMARY_OTHERS: &[(char, &str)] = &[
    ('a', "\u{17B6}"),
    ('i', "\u{17B7}"),
    ('I', "\u{17B8}"),
    ('w', "\u{17B9}"),
    ('W', "\u{17BA}"),
    ('u', "\u{17BB}"),
    ('U', "\u{17BC}"),
    ('Y', "\u{17BD}"),
    ('M', "\u{17C6}"),
    ('H', "\u{17C7}"),
    ('S', "\u{17CB}"),
    ('0', "\u{17E0}"),
    ('1', "\u{17E1}"),
    ('2', "\u{17E2}"),
    ('3', "\u{17E3}"),
    ('4', "\u{17E4}"),
    ('5', "\u{17E5}"),
    ('6', "\u{17E6}"),
    ('7', "\u{17E7}"),
    ('8', "\u{17E8}"),
    ('9', "\u{17E9}"),
    ('¼', "\u{17D4}"),
    ('½', "\u{17D5}"),
    ('ß', "\u{17D7}"),
    // "ឲ្យ" is a single glyph in the legacy fonts.
    ('Þ', "\u{17B2}\u{17D2}\u{1799}"),
];

/// Legacy glyphs only present in some font revisions.
pub const SUPPLEMENTARY: &[(char, &str)] = &[
    ('ã', "\u{17A5}"),
    ('å', "\u{17A7}"),
    ('æ', "\u{17AA}"),
    ('è', "\u{17AF}"),
    ('ì', "\u{17B1}"),
    ('ÿ', "\u{17DB}"),
];

fn contains(table: &[(char, &str)], c: char) -> bool {
    table.iter().any(|(k, _)| *k == c)
}

/// Classify a legacy glyph for the reordering passes.
pub fn role(c: char) -> GlyphRole {
    if contains(BASE_CONSONANTS, c) {
        GlyphRole::Base
    } else if contains(PRE_VOWELS, c) {
        GlyphRole::PreVowel
    } else if contains(COENG_MARKERS, c) {
        GlyphRole::CoengMarker
    } else if contains(SUBSCRIPTS, c) {
        GlyphRole::Subscript
    } else if contains(SHIFTERS, c) {
        GlyphRole::Shifter
    } else {
        GlyphRole::Other
    }
}

/// Primary map lookup.
pub fn primary(c: char) -> Option<&'static str> {
    [
        BASE_CONSONANTS,
        PRE_VOWELS,
        COENG_MARKERS,
        SUBSCRIPTS,
        SHIFTERS,
        PRIMARY_OTHERS,
    ]
    .iter()
    .find_map(|table| table.iter().find(|(k, _)| *k == c).map(|(_, v)| *v))
}

/// Supplementary map lookup.
pub fn supplementary(c: char) -> Option<&'static str> {
    SUPPLEMENTARY.iter().find(|(k, _)| *k == c).map(|(_, v)| *v)
}

/// Whether `c` is any known legacy glyph key.
pub fn is_legacy_key(c: char) -> bool {
    primary(c).is_some() || supplementary(c).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_unique_across_tables() {
        let mut seen = HashSet::new();
        for table in [
            BASE_CONSONANTS,
            PRE_VOWELS,
            COENG_MARKERS,
            SUBSCRIPTS,
            SHIFTERS,
            PRIMARY_OTHERS,
            SUPPLEMENTARY,
        ] {
            for (k, _) in table {
                assert!(seen.insert(*k), "duplicate key {:?}", k);
            }
        }
    }

    #[test]
    fn test_roles() {
        assert_eq!(role('k'), GlyphRole::Base);
        assert_eq!(role('e'), GlyphRole::PreVowel);
        assert_eq!(role('®'), GlyphRole::CoengMarker);
        assert_eq!(role('Ó'), GlyphRole::Subscript);
        assert_eq!(role('Ê'), GlyphRole::Shifter);
        assert_eq!(role('a'), GlyphRole::Other);
    }
}
