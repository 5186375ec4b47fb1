//! Property tests for the allocation, validation, transliteration, parsing
//! and scheduling invariants.

use proptest::prelude::*;

// =============================================================================
// Allocation
// =============================================================================

mod allocation_props {
    use super::*;
    use legacymig::{allocate_equal, Money};

    proptest! {
        /// Lines always sum to the total, whatever the split.
        #[test]
        fn equal_split_sums_exactly(cents in 0i64..1_000_000_000, n in 1usize..25) {
            let targets: Vec<String> = (0..n).map(|i| format!("T{}", i)).collect();
            let result = allocate_equal(Money::from_cents(cents), &targets);

            prop_assert_eq!(result.lines.len(), n);
            prop_assert_eq!(result.allocated(), Money::from_cents(cents));

            let base = result.lines[0].amount;
            for line in &result.lines[..n - 1] {
                prop_assert_eq!(line.amount, base);
            }
            prop_assert!(result.lines[n - 1].amount >= base);
        }

        /// Money parsing never panics.
        #[test]
        fn money_parse_never_panics(input in "\\PC{0,20}") {
            let _ = Money::parse(&input);
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

mod validation_props {
    use super::*;
    use legacymig::models::audit;
    use legacymig::pipeline::validate::{run, ERRORS_COLUMN};
    use legacymig::{
        ColumnRule, ColumnType, PipelineRun, Record, StageTable, TableConfiguration, TableKind,
        ValidationPriority,
    };
    use serde_json::{json, Value};

    fn config() -> TableConfiguration {
        TableConfiguration::new("props", "props*.csv", TableKind::Reference)
            .column(
                ColumnRule::new("ID", "id", ColumnType::Text)
                    .priority(ValidationPriority::Critical)
                    .pattern(r"^S\d+$"),
            )
            .column(ColumnRule::new("N", "n", ColumnType::Integer).nullable().range(Some(0.0), Some(10.0)))
    }

    proptest! {
        /// Every row lands in exactly one output; invalid rows carry errors.
        #[test]
        fn rows_are_partitioned(
            rows in prop::collection::vec(
                (prop::option::of("[SX]?[0-9]{0,3}"), prop::option::of(-5i64..20)),
                0..40,
            ),
            chunk in 1usize..8,
        ) {
            let mut table = StageTable::new("props", vec!["id".into(), "n".into()]);
            for (i, (id, n)) in rows.iter().enumerate() {
                let mut record = Record::new();
                record.insert(audit::SOURCE_ROW.into(), json!(i + 1));
                record.insert("id".into(), id.clone().map(Value::String).unwrap_or(Value::Null));
                record.insert("n".into(), n.map(|n| json!(n)).unwrap_or(Value::Null));
                table.records.push(record);
            }

            let mut pipeline_run = PipelineRun::new("props");
            let out = run(&table, &config(), None, chunk, &mut pipeline_run).unwrap();

            prop_assert_eq!(out.counts.processed, rows.len());
            prop_assert_eq!(out.valid.len() + out.invalid.len(), rows.len());
            for record in &out.invalid.records {
                let errors = record[ERRORS_COLUMN].as_array().cloned().unwrap_or_default();
                prop_assert!(!errors.is_empty());
            }
            for record in &out.valid.records {
                prop_assert!(!record.contains_key(ERRORS_COLUMN));
            }
        }
    }
}

// =============================================================================
// Transliteration
// =============================================================================

mod transliterate_props {
    use super::*;
    use legacymig::{contains_legacy_glyphs, contains_target_script, transliterate};

    proptest! {
        /// Text already holding Khmer code points is never touched.
        #[test]
        fn khmer_text_is_unchanged(
            prefix in "\\PC{0,20}",
            khmer in proptest::char::range('\u{1780}', '\u{17FF}'),
            suffix in "\\PC{0,20}",
        ) {
            let text = format!("{}{}{}", prefix, khmer, suffix);
            prop_assert_eq!(transliterate(&text), text);
        }

        /// Text without legacy glyphs is never touched.
        #[test]
        fn plain_text_is_unchanged(text in "\\PC{0,40}") {
            prop_assume!(!contains_legacy_glyphs(&text));
            prop_assert_eq!(transliterate(&text), text);
        }

        /// Converting converted text again changes nothing.
        #[test]
        fn second_pass_is_a_no_op(text in "[a-zA-Z0-9 ]{1,30}") {
            let once = transliterate(&text);
            prop_assume!(contains_target_script(&once));
            prop_assert_eq!(transliterate(&once), once);
        }
    }
}

// =============================================================================
// Identifier parsing
// =============================================================================

mod identifier_props {
    use super::*;
    use legacymig::{parse_identifier, NoCatalog};

    fn identifier_like() -> impl Strategy<Value = String> {
        "[0-9]{4}T[1-3][A-Z]?-58[0-9]-[AMEP]-[A-Z]?[0-9]{1,2}[A-H]?(-[A-Za-z]{3,8})?"
    }

    proptest! {
        /// Same input, same output.
        #[test]
        fn parse_is_reproducible(raw in identifier_like()) {
            prop_assert_eq!(parse_identifier(&raw, &NoCatalog), parse_identifier(&raw, &NoCatalog));
        }

        /// Never panics on arbitrary text.
        #[test]
        fn parse_never_panics(raw in "\\PC{0,40}") {
            let _ = parse_identifier(&raw, &NoCatalog);
        }
    }
}

// =============================================================================
// Scheduling
// =============================================================================

mod registry_props {
    use super::*;
    use legacymig::{PipelineRegistry, PipelineSettings, TableConfiguration, TableKind};

    /// Table `i` may depend on any table before it, so the graph is acyclic.
    fn dag() -> impl Strategy<Value = Vec<Vec<bool>>> {
        (1usize..9).prop_flat_map(|n| {
            (0..n)
                .map(|i| prop::collection::vec(any::<bool>(), i))
                .collect::<Vec<_>>()
        })
    }

    proptest! {
        #[test]
        fn order_respects_dependencies(edges in dag()) {
            let n = edges.len();
            // Reverse naming so alphabetical order alone is never enough
            let name = |i: usize| format!("t{:02}", n - i);

            let configs: Vec<TableConfiguration> = edges
                .iter()
                .enumerate()
                .map(|(i, deps)| {
                    let deps: Vec<String> = deps
                        .iter()
                        .enumerate()
                        .filter(|(_, on)| **on)
                        .map(|(j, _)| name(j))
                        .collect();
                    let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                    TableConfiguration::new(&name(i), "x*.csv", TableKind::Reference).depends_on(&deps)
                })
                .collect();

            let registry = PipelineRegistry::new(configs, &PipelineSettings::default()).unwrap();
            let order = registry.processing_order();
            prop_assert_eq!(order.len(), n);

            let position = |table: &str| order.iter().position(|t| t == table);
            for (i, deps) in edges.iter().enumerate() {
                for (j, on) in deps.iter().enumerate() {
                    if *on {
                        prop_assert!(position(&name(j)) < position(&name(i)));
                    }
                }
            }
        }
    }
}
