//! Property tests for the splitter, row repair and descriptor invariants.

use proptest::prelude::*;
use sqlimport_core::{
    normalize_line, split_fields, ColumnSpec, DescriptorOptions, FieldType, LoadDescriptor,
    MaxLength, SmallDateTimeTag, RECORD_TERMINATOR,
};

/// Fields with no delimiter or quote characters.
fn plain_field() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _.-]{0,8}"
}

/// Fields that are either plain or fully wrapped in quotes (balanced).
fn balanced_field() -> impl Strategy<Value = String> {
    prop_oneof![
        plain_field(),
        "[a-z0-9 ,|]{0,6}".prop_map(|inner| format!("\"{}\"", inner)),
    ]
}

#[test]
fn test_quoted_comma_yields_three_fields() {
    let fields = split_fields("a,\"b,c\",d", ',');
    assert_eq!(fields.len(), 3);
    assert_eq!(fields, vec!["a", "\"b,c\"", "d"]);
}

#[test]
fn test_normalizer_pads_short_line() {
    assert_eq!(normalize_line("1,2,3", ',', 5), "1,2,3,,");
}

#[test]
fn test_normalizer_trims_long_line() {
    assert_eq!(normalize_line("1,2,3,4,5,6,7", ',', 5), "1,2,3,4,5");
}

#[test]
fn test_normalizer_is_not_stable_with_unbalanced_quote() {
    let once = normalize_line("\"a,b,c,d,e,f", ',', 3).into_owned();
    let twice = normalize_line(&once, ',', 3).into_owned();
    assert_ne!(once, twice);
    assert!(twice.starts_with(&once));
}

#[test]
fn test_every_known_type_maps_to_one_tag() {
    let table = [
        ("INT", "SQLINT"),
        ("BIGINT", "SQLBIGINT"),
        ("SMALLINT", "SQLSMALLINT"),
        ("TINYINT", "SQLTINYINT"),
        ("BIT", "SQLBIT"),
        ("DECIMAL", "SQLDECIMAL"),
        ("NUMERIC", "SQLNUMERIC"),
        ("MONEY", "SQLMONEY"),
        ("SMALLMONEY", "SQLSMALLMONEY"),
        ("FLOAT", "SQLFLT8"),
        ("REAL", "SQLFLT4"),
        ("DATETIME", "SQLDATETIME"),
        ("DATETIME2", "SQLDATETIME"),
        ("DATE", "SQLDATE"),
        ("TIME", "SQLTIME"),
        ("DATETIMEOFFSET", "SQLDATETIMEOFFSET"),
        ("SMALLDATETIME", "SQLSMALLDDATETIME"),
        ("VARCHAR", "SQLVARYCHAR"),
    ];
    for (name, tag) in table {
        for spelling in [name.to_string(), name.to_lowercase()] {
            assert_eq!(
                FieldType::from_type_name(&spelling).tag(SmallDateTimeTag::Legacy),
                tag,
                "type {}",
                spelling
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn test_split_round_trip(fields in prop::collection::vec(plain_field(), 1..12)) {
        let line = fields.join(",");
        let parsed: Vec<String> = split_fields(&line, ',').into_iter().map(String::from).collect();
        prop_assert_eq!(parsed, fields);
    }

    #[test]
    fn test_split_round_trip_pipe(fields in prop::collection::vec(plain_field(), 1..12)) {
        let line = fields.join("|");
        prop_assert_eq!(split_fields(&line, '|').len(), fields.len());
    }

    #[test]
    fn test_normalize_is_idempotent(
        fields in prop::collection::vec(balanced_field(), 1..12),
        target in 1usize..10,
    ) {
        let line = fields.join(",");
        let once = normalize_line(&line, ',', target).into_owned();
        let twice = normalize_line(&once, ',', target).into_owned();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_reaches_target(
        fields in prop::collection::vec(plain_field(), 1..15),
        target in 1usize..10,
    ) {
        let line = fields.join(",");
        let normalized = normalize_line(&line, ',', target);
        prop_assert_eq!(split_fields(&normalized, ',').len(), target);
    }

    #[test]
    fn test_descriptor_terminators(n in 1usize..40, delimiter in prop::sample::select(vec![',', '|', '\t', ';'])) {
        let columns: Vec<ColumnSpec> = (0..n)
            .map(|i| ColumnSpec::new(i as u32 + 1, format!("c{}", i), "varchar", MaxLength::Bounded(10)))
            .collect();
        let descriptor = LoadDescriptor::build(&columns, delimiter, DescriptorOptions::default()).unwrap();
        prop_assert_eq!(descriptor.column_count(), n);
        for (idx, entry) in descriptor.entries().iter().enumerate() {
            prop_assert_eq!(entry.field.ordinal as usize, idx + 1);
            if idx == n - 1 {
                prop_assert_eq!(entry.field.terminator.as_str(), RECORD_TERMINATOR);
            } else {
                prop_assert_eq!(entry.field.terminator.clone(), delimiter.to_string());
            }
        }
    }

    #[test]
    fn test_unknown_type_names_fall_back(name in "[a-z]{1,12}") {
        // never panics; known names map elsewhere, everything else is text
        let tag = FieldType::from_type_name(&name).tag(SmallDateTimeTag::Legacy);
        prop_assert!(tag.starts_with("SQL"));
    }
}
